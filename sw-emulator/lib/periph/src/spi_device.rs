/*++

Licensed under the Apache-2.0 license.

File Name:

    spi_device.rs

Abstract:

    File contains the TPM portion of the SPI device peripheral. The firmware
    side sees a register block (command/address buffer, read and write FIFOs,
    hardware-served TPM registers); the host side queues TPM-over-SPI
    transactions and collects their results.

--*/

use spi_tpm_emu_bus::{ActionHandle, Bus, BusError, Clock, Timer};
use spi_tpm_emu_types::{RvAddr, RvData, RvSize};
use spi_tpm_registers::spi_device::{
    self as regs, INTR, TPM_CAP_FIELDS, TPM_CFG_FIELDS, TPM_CMD_ADDR_FIELDS, TPM_STATUS_FIELDS,
};
use spi_tpm_registers::tpm::{self, offset};
use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};
use tock_registers::LocalRegisterCopy;

use crate::Irq;

/// Timing knobs of the emulated SPI link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpiDeviceConfig {
    /// Cycles needed to clock one write-payload byte in from the host.
    pub byte_cycles: u64,

    /// Idle cycles the host leaves between two transactions.
    pub inter_transaction_gap: u64,
}
impl Default for SpiDeviceConfig {
    fn default() -> Self {
        Self {
            byte_cycles: 8,
            inter_transaction_gap: 64,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostError {
    /// A TPM transfer must be 1 to 64 bytes long.
    InvalidLength(usize),
}
impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::InvalidLength(len) => write!(
                f,
                "invalid TPM transfer length {len} (expected 1..={})",
                tpm::MAX_TRANSFER_SIZE
            ),
        }
    }
}
impl std::error::Error for HostError {}

/// A single TPM-over-SPI transaction as issued by the host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TpmTransaction {
    Read { address: u32, length: usize },
    Write { address: u32, data: Vec<u8> },
}

impl TpmTransaction {
    pub fn read(address: u32, length: usize) -> Result<Self, HostError> {
        check_length(length)?;
        Ok(TpmTransaction::Read { address, length })
    }

    pub fn write(address: u32, data: impl Into<Vec<u8>>) -> Result<Self, HostError> {
        let data = data.into();
        check_length(data.len())?;
        Ok(TpmTransaction::Write { address, data })
    }

    pub fn address(&self) -> u32 {
        match self {
            TpmTransaction::Read { address, .. } | TpmTransaction::Write { address, .. } => {
                *address
            }
        }
    }

    pub fn length(&self) -> usize {
        match self {
            TpmTransaction::Read { length, .. } => *length,
            TpmTransaction::Write { data, .. } => data.len(),
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, TpmTransaction::Read { .. })
    }

    /// The command byte clocked out ahead of the address.
    pub fn command(&self) -> u8 {
        let size = (self.length() - 1) as u8 & tpm::COMMAND_SIZE_MASK;
        if self.is_read() {
            tpm::COMMAND_READ | size
        } else {
            size
        }
    }
}

fn check_length(length: usize) -> Result<(), HostError> {
    if (1..=tpm::MAX_TRANSFER_SIZE).contains(&length) {
        Ok(())
    } else {
        Err(HostError::InvalidLength(length))
    }
}

/// A transaction the host has finished, with its cycle stamps.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompletedTransaction {
    pub transaction: TpmTransaction,

    /// Bytes returned to the host. Empty for writes; shorter than requested
    /// if the responder dropped the read.
    pub response: Vec<u8>,

    /// Cycle at which the header went out on the wire.
    pub started_at: u64,

    /// Cycle at which the host observed completion.
    pub completed_at: u64,

    /// The read was answered by the hardware register bank without
    /// involving firmware.
    pub served_by_hardware: bool,
}

impl CompletedTransaction {
    pub fn latency(&self) -> u64 {
        self.completed_at.wrapping_sub(self.started_at)
    }
}

/// Values the hardware returns for TPM register reads when return-by-hardware
/// is enabled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct HwRegisters {
    access: [u8; 5],
    sts: u32,
    intf_capability: u32,
    int_enable: u32,
    int_vector: u32,
    int_status: u32,
    did_vid: u32,
    rid: u32,
}

struct ActiveTransaction {
    transaction: TpmTransaction,
    started_at: u64,
    header_taken: bool,
    payload: VecDeque<u8>,
}

pub struct SpiDeviceRegs {
    config: SpiDeviceConfig,
    timer: Timer,
    irq: Irq,

    intr_test: LocalRegisterCopy<u32, INTR::Register>,
    intr_enable: LocalRegisterCopy<u32, INTR::Register>,
    tpm_cfg: LocalRegisterCopy<u32, TPM_CFG_FIELDS::Register>,
    hw: HwRegisters,

    cmd_addr: Option<u32>,
    read_fifo: VecDeque<u8>,
    write_fifo: VecDeque<u8>,

    active: Option<ActiveTransaction>,
    queue: VecDeque<TpmTransaction>,
    completed: VecDeque<CompletedTransaction>,
    byte_action: Option<ActionHandle>,
    start_action: Option<ActionHandle>,
}

impl SpiDeviceRegs {
    /// Register revision reported in TPM_CAP.
    const TPM_CAP_REV: u32 = 0x2;

    /// log2 of the largest transfer the FIFOs accept.
    const TPM_CAP_MAX_SIZE_LOG2: u32 = 6;

    fn new(clock: &Clock, irq: Irq, config: SpiDeviceConfig) -> Self {
        Self {
            config,
            timer: clock.timer(),
            irq,
            intr_test: LocalRegisterCopy::new(0),
            intr_enable: LocalRegisterCopy::new(0),
            tpm_cfg: LocalRegisterCopy::new(0),
            hw: HwRegisters::default(),
            cmd_addr: None,
            read_fifo: VecDeque::new(),
            write_fifo: VecDeque::new(),
            active: None,
            queue: VecDeque::new(),
            completed: VecDeque::new(),
            byte_action: None,
            start_action: None,
        }
    }

    fn intr_state(&self) -> u32 {
        let mut state = self.intr_test;
        if self.cmd_addr.is_some() {
            state.modify(INTR::TPM_HEADER_NOT_EMPTY::SET);
        }
        state.get()
    }

    fn update_irq(&self) {
        self.irq
            .set_level(self.intr_state() & self.intr_enable.get() != 0);
    }

    fn tpm_cap(&self) -> u32 {
        let mut cap = LocalRegisterCopy::<u32, TPM_CAP_FIELDS::Register>::new(0);
        cap.modify(
            TPM_CAP_FIELDS::REV.val(Self::TPM_CAP_REV)
                + TPM_CAP_FIELDS::LOCALITY::SET
                + TPM_CAP_FIELDS::MAX_WR_SIZE.val(Self::TPM_CAP_MAX_SIZE_LOG2)
                + TPM_CAP_FIELDS::MAX_RD_SIZE.val(Self::TPM_CAP_MAX_SIZE_LOG2),
        );
        cap.get()
    }

    fn tpm_status(&self) -> u32 {
        let mut status = LocalRegisterCopy::<u32, TPM_STATUS_FIELDS::Register>::new(0);
        if self.cmd_addr.is_some() {
            status.modify(TPM_STATUS_FIELDS::CMDADDR_NOTEMPTY::SET);
        }
        status.modify(TPM_STATUS_FIELDS::WRFIFO_DEPTH.val(self.write_fifo.len() as u32));
        status.get()
    }

    fn read_reg(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        if addr == regs::TPM_WRITE_FIFO {
            return Ok(self.write_fifo.pop_front().map_or(0, RvData::from));
        }
        if size != RvSize::Word {
            return Err(BusError::LoadAccessFault);
        }
        let val = match addr {
            regs::INTR_STATE => self.intr_state(),
            regs::INTR_ENABLE => self.intr_enable.get(),
            regs::INTR_TEST => 0,
            regs::TPM_CAP => self.tpm_cap(),
            regs::TPM_CFG => self.tpm_cfg.get(),
            regs::TPM_STATUS => self.tpm_status(),
            regs::TPM_ACCESS_0 => u32::from_le_bytes([
                self.hw.access[0],
                self.hw.access[1],
                self.hw.access[2],
                self.hw.access[3],
            ]),
            regs::TPM_ACCESS_1 => self.hw.access[4].into(),
            regs::TPM_STS => self.hw.sts,
            regs::TPM_INTF_CAPABILITY => self.hw.intf_capability,
            regs::TPM_INT_ENABLE => self.hw.int_enable,
            regs::TPM_INT_VECTOR => self.hw.int_vector,
            regs::TPM_INT_STATUS => self.hw.int_status,
            regs::TPM_DID_VID => self.hw.did_vid,
            regs::TPM_RID => self.hw.rid,
            regs::TPM_CMD_ADDR => self.pop_cmd_addr(),
            _ => return Err(BusError::LoadAccessFault),
        };
        Ok(val)
    }

    fn write_reg(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError> {
        if addr == regs::TPM_READ_FIFO {
            let len = usize::from(size);
            if !matches!(size, RvSize::Byte | RvSize::HalfWord | RvSize::Word) {
                return Err(BusError::StoreAccessFault);
            }
            self.read_fifo.extend(&val.to_le_bytes()[..len]);
            self.check_read_complete();
            return Ok(());
        }
        if size != RvSize::Word {
            return Err(BusError::StoreAccessFault);
        }
        match addr {
            regs::INTR_STATE => {
                self.intr_test.set(self.intr_test.get() & !val);
                let ack = LocalRegisterCopy::<u32, INTR::Register>::new(val);
                if ack.is_set(INTR::TPM_HEADER_NOT_EMPTY) {
                    self.acknowledge();
                }
            }
            regs::INTR_ENABLE => self.intr_enable.set(val),
            regs::INTR_TEST => self.intr_test.set(self.intr_test.get() | val),
            regs::TPM_CFG => self.tpm_cfg.set(val),
            regs::TPM_ACCESS_0 => self.hw.access[..4].copy_from_slice(&val.to_le_bytes()),
            regs::TPM_ACCESS_1 => self.hw.access[4] = val as u8,
            regs::TPM_STS => self.hw.sts = val,
            regs::TPM_INTF_CAPABILITY => self.hw.intf_capability = val,
            regs::TPM_INT_ENABLE => self.hw.int_enable = val,
            regs::TPM_INT_VECTOR => self.hw.int_vector = val,
            regs::TPM_INT_STATUS => self.hw.int_status = val,
            regs::TPM_DID_VID => self.hw.did_vid = val,
            regs::TPM_RID => self.hw.rid = val,
            _ => return Err(BusError::StoreAccessFault),
        }
        self.update_irq();
        Ok(())
    }

    fn pop_cmd_addr(&mut self) -> u32 {
        let Some(val) = self.cmd_addr.take() else {
            return 0;
        };
        if let Some(active) = self.active.as_mut() {
            active.header_taken = true;
        }
        self.update_irq();
        val
    }

    /// Firmware cleared TPM_HEADER_NOT_EMPTY: it is done with the transaction
    /// whose header it consumed.
    fn acknowledge(&mut self) {
        if !self.active.as_ref().is_some_and(|a| a.header_taken) {
            return;
        }
        let response = self.drain_response();
        if let Some(action) = self.byte_action.take() {
            self.timer.cancel(action);
        }
        self.write_fifo.clear();
        self.complete_active(response, false);
    }

    fn check_read_complete(&mut self) {
        let ready = match &self.active {
            Some(ActiveTransaction {
                transaction: TpmTransaction::Read { length, .. },
                header_taken: true,
                ..
            }) => self.read_fifo.len() >= *length,
            _ => false,
        };
        if ready {
            let response = self.drain_response();
            self.complete_active(response, false);
        }
    }

    fn drain_response(&mut self) -> Vec<u8> {
        match self.active.as_ref().map(|a| &a.transaction) {
            Some(TpmTransaction::Read { length, .. }) => {
                let n = (*length).min(self.read_fifo.len());
                let response = self.read_fifo.drain(..n).collect();
                self.read_fifo.clear();
                response
            }
            _ => Vec::new(),
        }
    }

    fn complete_active(&mut self, response: Vec<u8>, served_by_hardware: bool) {
        let Some(active) = self.active.take() else {
            return;
        };
        self.completed.push_back(CompletedTransaction {
            transaction: active.transaction,
            response,
            started_at: active.started_at,
            completed_at: self.timer.now(),
            served_by_hardware,
        });
        self.schedule_next_start();
    }

    fn schedule_next_start(&mut self) {
        if self.active.is_none() && self.start_action.is_none() && !self.queue.is_empty() {
            self.start_action = Some(
                self.timer
                    .schedule_poll_in(self.config.inter_transaction_gap.max(1)),
            );
        }
    }

    fn start_next(&mut self) {
        let Some(transaction) = self.queue.pop_front() else {
            return;
        };
        let now = self.timer.now();
        if let Some(response) = self.hw_response(&transaction) {
            self.active = Some(ActiveTransaction {
                transaction,
                started_at: now,
                header_taken: false,
                payload: VecDeque::new(),
            });
            self.complete_active(response, true);
            return;
        }

        self.read_fifo.clear();
        let mut cmd_addr = LocalRegisterCopy::<u32, TPM_CMD_ADDR_FIELDS::Register>::new(0);
        cmd_addr.modify(
            TPM_CMD_ADDR_FIELDS::CMD.val(transaction.command().into())
                + TPM_CMD_ADDR_FIELDS::ADDR.val(transaction.address() & 0x00ff_ffff),
        );
        self.cmd_addr = Some(cmd_addr.get());

        let payload = match &transaction {
            TpmTransaction::Write { data, .. } => data.iter().copied().collect(),
            TpmTransaction::Read { .. } => VecDeque::new(),
        };
        if !payload.is_empty() {
            self.byte_action = Some(self.timer.schedule_poll_in(self.config.byte_cycles.max(1)));
        }
        self.active = Some(ActiveTransaction {
            transaction,
            started_at: now,
            header_taken: false,
            payload,
        });
        self.update_irq();
    }

    /// Answer for reads the hardware serves on its own, or None if the read
    /// must be forwarded to firmware.
    fn hw_response(&self, transaction: &TpmTransaction) -> Option<Vec<u8>> {
        let TpmTransaction::Read { address, length } = *transaction else {
            return None;
        };
        if !self.tpm_cfg.is_set(TPM_CFG_FIELDS::EN)
            || self.tpm_cfg.is_set(TPM_CFG_FIELDS::HW_REG_DIS)
            || self.tpm_cfg.read(TPM_CFG_FIELDS::TPM_MODE) != 0
            || length > 4
        {
            return None;
        }
        let prefix_mask = tpm::ADDRESS_PREFIX_MASK & 0x00ff_ffff;
        if !self.tpm_cfg.is_set(TPM_CFG_FIELDS::TPM_REG_CHK_DIS)
            && address & prefix_mask != tpm::ADDRESS_PREFIX & prefix_mask
        {
            return None;
        }
        let locality = ((address >> 12) & 0xf) as usize;
        if locality >= self.hw.access.len() {
            return None;
        }
        let val = match (address & 0x0fff) as u16 {
            offset::ACCESS => self.hw.access[locality].into(),
            offset::INT_ENABLE => self.hw.int_enable,
            offset::INT_VECTOR => self.hw.int_vector,
            offset::INT_STATUS => self.hw.int_status,
            offset::INTF_CAPABILITY => self.hw.intf_capability,
            offset::STS => self.hw.sts,
            offset::DID_VID => self.hw.did_vid,
            offset::RID => self.hw.rid,
            _ => return None,
        };
        Some(val.to_le_bytes()[..length].to_vec())
    }

    fn poll(&mut self) {
        if self.timer.fired(&mut self.byte_action) {
            if let Some(active) = self.active.as_mut() {
                if let Some(byte) = active.payload.pop_front() {
                    self.write_fifo.push_back(byte);
                }
                if !active.payload.is_empty() {
                    self.byte_action =
                        Some(self.timer.schedule_poll_in(self.config.byte_cycles.max(1)));
                }
            }
        }
        if self.timer.fired(&mut self.start_action) {
            self.start_next();
        }
    }

    fn is_idle(&self) -> bool {
        self.active.is_none() && self.queue.is_empty() && self.start_action.is_none()
    }
}

/// Firmware-facing view of the SPI device: a register block on the bus.
#[derive(Clone)]
pub struct SpiDevice {
    regs: Rc<RefCell<SpiDeviceRegs>>,
}

impl SpiDevice {
    pub fn new(clock: &Clock, irq: Irq, config: SpiDeviceConfig) -> Self {
        Self {
            regs: Rc::new(RefCell::new(SpiDeviceRegs::new(clock, irq, config))),
        }
    }

    /// Host-facing view sharing the same peripheral state.
    pub fn host(&self) -> SpiHost {
        SpiHost {
            regs: Rc::clone(&self.regs),
        }
    }

    /// Memory map size.
    pub fn mmap_size(&self) -> RvAddr {
        regs::MMAP_SIZE
    }
}

impl Bus for SpiDevice {
    /// Read data of specified size from given address
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        self.regs.borrow_mut().read_reg(size, addr)
    }

    /// Write data of specified size to given address
    fn write(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError> {
        self.regs.borrow_mut().write_reg(size, addr, val)
    }

    fn poll(&mut self) {
        self.regs.borrow_mut().poll();
    }
}

/// The SPI host driving TPM transactions into the device.
#[derive(Clone)]
pub struct SpiHost {
    regs: Rc<RefCell<SpiDeviceRegs>>,
}

impl SpiHost {
    /// Queue a transaction. It goes out on the wire once every earlier one
    /// has completed and the inter-transaction gap has elapsed.
    pub fn queue(&self, transaction: TpmTransaction) {
        let mut regs = self.regs.borrow_mut();
        regs.queue.push_back(transaction);
        regs.schedule_next_start();
    }

    /// Nothing in flight, nothing queued.
    pub fn is_idle(&self) -> bool {
        self.regs.borrow().is_idle()
    }

    pub fn take_completed(&self) -> Vec<CompletedTransaction> {
        self.regs.borrow_mut().completed.drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        let regs = self.regs.borrow();
        regs.queue.len() + usize::from(regs.active.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spi_tpm_registers::spi_device::TPM_CFG_FIELDS;

    const STS_ADDR: u32 = 0x00d4_0018;

    fn device(clock: &Clock) -> (SpiDevice, SpiHost, Irq) {
        let irq = Irq::new();
        let dev = SpiDevice::new(clock, irq.clone(), SpiDeviceConfig::default());
        let host = dev.host();
        (dev, host, irq)
    }

    fn run(clock: &Clock, dev: &mut SpiDevice, cycles: u64) {
        for _ in 0..cycles {
            clock.increment_and_poll(1, dev);
        }
    }

    fn header_bit() -> u32 {
        INTR::TPM_HEADER_NOT_EMPTY::SET.value
    }

    #[test]
    fn test_transaction_command_byte() {
        assert_eq!(
            TpmTransaction::write(STS_ADDR, [0xa1, 0xb2, 0xc3, 0xd4])
                .unwrap()
                .command(),
            0x03
        );
        assert_eq!(TpmTransaction::read(STS_ADDR, 4).unwrap().command(), 0x83);
        assert_eq!(TpmTransaction::read(STS_ADDR, 64).unwrap().command(), 0xbf);
        assert_eq!(
            TpmTransaction::read(STS_ADDR, 65),
            Err(HostError::InvalidLength(65))
        );
        assert_eq!(
            TpmTransaction::write(STS_ADDR, vec![]),
            Err(HostError::InvalidLength(0))
        );
    }

    #[test]
    fn test_header_raises_irq_when_enabled() {
        let clock = Clock::new();
        let (mut dev, host, irq) = device(&clock);
        host.queue(TpmTransaction::read(STS_ADDR, 4).unwrap());
        run(&clock, &mut dev, 100);

        assert_eq!(
            dev.read(RvSize::Word, regs::TPM_STATUS).unwrap() & 1,
            1,
            "CMDADDR_NOTEMPTY"
        );
        assert_eq!(
            dev.read(RvSize::Word, regs::INTR_STATE).unwrap(),
            header_bit()
        );
        assert!(!irq.is_high());

        dev.write(RvSize::Word, regs::INTR_ENABLE, header_bit())
            .unwrap();
        assert!(irq.is_high());

        let cmd_addr = dev.read(RvSize::Word, regs::TPM_CMD_ADDR).unwrap();
        assert_eq!(cmd_addr, 0x83d4_0018);
        assert!(!irq.is_high());
        assert_eq!(dev.read(RvSize::Word, regs::TPM_CMD_ADDR).unwrap(), 0);
    }

    #[test]
    fn test_read_completes_when_response_written() {
        let clock = Clock::new();
        let (mut dev, host, _irq) = device(&clock);
        host.queue(TpmTransaction::read(STS_ADDR, 3).unwrap());
        run(&clock, &mut dev, 100);
        dev.read(RvSize::Word, regs::TPM_CMD_ADDR).unwrap();

        dev.write(RvSize::HalfWord, regs::TPM_READ_FIFO, 0xb2a1)
            .unwrap();
        assert!(host.take_completed().is_empty());
        dev.write(RvSize::Byte, regs::TPM_READ_FIFO, 0xc3).unwrap();

        let done = host.take_completed();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].response, vec![0xa1, 0xb2, 0xc3]);
        assert!(!done[0].served_by_hardware);
        assert!(host.is_idle());
    }

    #[test]
    fn test_write_payload_trickles_into_fifo() {
        let clock = Clock::new();
        let (mut dev, host, _irq) = device(&clock);
        host.queue(TpmTransaction::write(STS_ADDR, [1, 2, 3, 4]).unwrap());
        // Gap elapses, header posted, but no payload byte clocked yet.
        run(&clock, &mut dev, 64);
        let depth = |dev: &mut SpiDevice| dev.read(RvSize::Word, regs::TPM_STATUS).unwrap() >> 16;
        assert_eq!(depth(&mut dev), 0);

        run(&clock, &mut dev, 8);
        assert_eq!(depth(&mut dev), 1);
        run(&clock, &mut dev, 24);
        assert_eq!(depth(&mut dev), 4);

        assert_eq!(dev.read(RvSize::Word, regs::TPM_CMD_ADDR).unwrap(), 0x03d4_0018);
        let bytes: Vec<u32> = (0..4)
            .map(|_| dev.read(RvSize::Byte, regs::TPM_WRITE_FIFO).unwrap())
            .collect();
        assert_eq!(bytes, vec![1, 2, 3, 4]);

        assert!(host.take_completed().is_empty());
        dev.write(RvSize::Word, regs::INTR_STATE, header_bit())
            .unwrap();
        let done = host.take_completed();
        assert_eq!(done.len(), 1);
        assert!(done[0].response.is_empty());
        assert_eq!(done[0].latency(), 96 - 64);
    }

    #[test]
    fn test_ack_before_header_taken_is_ignored() {
        let clock = Clock::new();
        let (mut dev, host, _irq) = device(&clock);
        host.queue(TpmTransaction::read(STS_ADDR, 1).unwrap());
        run(&clock, &mut dev, 100);
        dev.write(RvSize::Word, regs::INTR_STATE, header_bit())
            .unwrap();
        assert!(host.take_completed().is_empty());
        // Status-type interrupt: still asserted while the header is held.
        assert_eq!(
            dev.read(RvSize::Word, regs::INTR_STATE).unwrap(),
            header_bit()
        );
    }

    #[test]
    fn test_dropped_read_completes_short_on_ack() {
        let clock = Clock::new();
        let (mut dev, host, _irq) = device(&clock);
        host.queue(TpmTransaction::read(0x00d4_0ffc, 4).unwrap());
        run(&clock, &mut dev, 100);
        dev.read(RvSize::Word, regs::TPM_CMD_ADDR).unwrap();
        dev.write(RvSize::Word, regs::INTR_STATE, header_bit())
            .unwrap();
        let done = host.take_completed();
        assert_eq!(done.len(), 1);
        assert!(done[0].response.is_empty());
    }

    #[test]
    fn test_return_by_hardware() {
        let clock = Clock::new();
        let (mut dev, host, _irq) = device(&clock);
        dev.write(RvSize::Word, regs::TPM_CFG, TPM_CFG_FIELDS::EN::SET.value)
            .unwrap();
        dev.write(RvSize::Word, regs::TPM_ACCESS_0, 0x0302_0100)
            .unwrap();
        dev.write(RvSize::Word, regs::TPM_ACCESS_1, 0x04).unwrap();
        dev.write(RvSize::Word, regs::TPM_DID_VID, 0x1234_1234)
            .unwrap();

        host.queue(TpmTransaction::read(0x00d4_0f00, 4).unwrap());
        host.queue(TpmTransaction::read(0x00d4_4000, 1).unwrap());
        // FIFO reads always go to firmware.
        host.queue(TpmTransaction::read(0x00d4_0024, 4).unwrap());
        run(&clock, &mut dev, 400);

        let done = host.take_completed();
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].response, vec![0x34, 0x12, 0x34, 0x12]);
        assert!(done[0].served_by_hardware);
        assert_eq!(done[1].response, vec![0x04]);
        assert_eq!(dev.read(RvSize::Word, regs::TPM_CMD_ADDR).unwrap(), 0x83d4_0024);
    }

    #[test]
    fn test_hw_prefix_check_forwards_foreign_addresses() {
        let clock = Clock::new();
        let (mut dev, host, _irq) = device(&clock);
        dev.write(RvSize::Word, regs::TPM_CFG, TPM_CFG_FIELDS::EN::SET.value)
            .unwrap();
        host.queue(TpmTransaction::read(0x00aa_0018, 4).unwrap());
        run(&clock, &mut dev, 100);
        assert!(host.take_completed().is_empty());
        assert_eq!(dev.read(RvSize::Word, regs::TPM_CMD_ADDR).unwrap(), 0x83aa_0018);
    }

    #[test]
    fn test_bad_access_size_faults() {
        let clock = Clock::new();
        let (mut dev, _host, _irq) = device(&clock);
        assert_eq!(
            dev.read(RvSize::Byte, regs::TPM_STATUS),
            Err(BusError::LoadAccessFault)
        );
        assert_eq!(
            dev.write(RvSize::HalfWord, regs::TPM_STS, 0),
            Err(BusError::StoreAccessFault)
        );
        assert_eq!(
            dev.read(RvSize::Word, 0x0ffc),
            Err(BusError::LoadAccessFault)
        );
        assert_eq!(
            dev.read(RvSize::Word, regs::TPM_CAP).unwrap(),
            0x0066_0102
        );
    }
}
