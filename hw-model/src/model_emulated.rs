// Licensed under the Apache-2.0 license

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use spi_tpm_emu_bus::{Bus, BusError, Clock};
use spi_tpm_emu_periph::{CompletedTransaction, Irq, SpiDevice, SpiHost};
use spi_tpm_emu_types::RvSize;
use spi_tpm_registers::spi_device::{self as regs, INTR};
use spi_tpm_responder::{
    LoopStats, Notification, Responder, ResponderConfig, Shutdown, SpiDeviceTpm, TimeSource,
};

use crate::bus_logger::BusLogger;
use crate::script::{HostScript, ScriptError};
use crate::{HwModel, InitParams};

/// The responder as wired up on the emulated platform.
pub type EmulatedResponder =
    Responder<SpiDeviceTpm<BusLogger<SpiDevice>>, EmulatedHart, EmulatedTime>;

/// State shared by every handle onto the emulated platform.
struct Platform {
    clock: Clock,
    device: RefCell<SpiDevice>,
    irq: Irq,
    host: SpiHost,

    /// Set by the header interrupt handler.
    header_flag: Arc<AtomicBool>,

    /// Global interrupt enable of the hart.
    interrupts_enabled: Cell<bool>,

    shutdown: Shutdown,
}

impl Platform {
    fn header_bit() -> u32 {
        INTR::TPM_HEADER_NOT_EMPTY::SET.value
    }

    /// Run the clock forward to the next scheduled action and deliver any
    /// interrupt it raised. Returns false if nothing is scheduled.
    fn step(&self) -> bool {
        let Some(delta) = self.clock.next_action_in() else {
            return false;
        };
        self.clock
            .increment_and_poll(delta, &mut *self.device.borrow_mut());
        self.deliver_interrupts();
        true
    }

    /// Run the clock forward `cycles`, servicing every action on the way.
    fn advance(&self, cycles: u64) {
        let target = self.clock.now().wrapping_add(cycles);
        loop {
            let remaining = target.wrapping_sub(self.clock.now());
            if remaining == 0 {
                break;
            }
            let delta = self
                .clock
                .next_action_in()
                .map_or(remaining, |next| next.min(remaining));
            self.clock
                .increment_and_poll(delta, &mut *self.device.borrow_mut());
            self.deliver_interrupts();
        }
    }

    fn deliver_interrupts(&self) {
        if self.interrupts_enabled.get() && self.irq.is_high() {
            self.header_isr();
        }
    }

    /// Flag the header and mask its source until the responder re-arms it.
    fn header_isr(&self) {
        self.header_flag.store(true, Ordering::SeqCst);
        if let Err(err) = self.update_intr_enable(|enable| enable & !Self::header_bit()) {
            error!("header isr: unable to disable interrupt: {err}");
        }
    }

    fn update_intr_enable(&self, f: impl FnOnce(u32) -> u32) -> Result<(), BusError> {
        let mut device = self.device.borrow_mut();
        let enable = device.read(RvSize::Word, regs::INTR_ENABLE)?;
        device.write(RvSize::Word, regs::INTR_ENABLE, f(enable))
    }
}

/// The hart's view of the header interrupt.
pub struct EmulatedHart {
    platform: Rc<Platform>,
}

impl Notification for EmulatedHart {
    fn signal_pending(&self) -> bool {
        self.platform.header_flag.load(Ordering::SeqCst)
    }

    fn mask(&mut self) {
        self.platform.interrupts_enabled.set(false);
    }

    fn unmask(&mut self) {
        self.platform.interrupts_enabled.set(true);
        self.platform.deliver_interrupts();
    }

    /// Returns once the header line is asserted or its handler has run.
    fn wait_for_interrupt(&mut self) {
        let platform = &self.platform;
        while !platform.irq.is_high() && !platform.header_flag.load(Ordering::SeqCst) {
            if platform.shutdown.is_requested() {
                return;
            }
            if !platform.step() {
                if !platform.host.is_idle() {
                    warn!("host stalled with {} transactions pending", platform.host.pending());
                }
                info!("host script exhausted at cycle {}", platform.clock.now());
                platform.shutdown.request();
                return;
            }
        }
    }

    fn clear_and_rearm(&mut self) -> Result<(), BusError> {
        let platform = &self.platform;
        platform.header_flag.store(false, Ordering::SeqCst);
        platform
            .device
            .borrow_mut()
            .write(RvSize::Word, regs::INTR_STATE, Platform::header_bit())?;
        platform.update_intr_enable(|enable| enable | Platform::header_bit())?;
        platform.deliver_interrupts();
        Ok(())
    }
}

/// The hart's cycle counter. Busy-waiting lets the rest of the platform run.
pub struct EmulatedTime {
    platform: Rc<Platform>,
}

impl TimeSource for EmulatedTime {
    fn now(&self) -> u64 {
        self.platform.clock.now()
    }

    fn busy_wait(&mut self, cycles: u64) {
        self.platform.advance(cycles);
    }
}

/// What a scripted run produced.
#[derive(Debug, Clone)]
pub struct Report {
    /// Host view of every finished transaction, in completion order.
    pub completed: Vec<CompletedTransaction>,
    pub stats: LoopStats,

    /// Cycle count when the run stopped.
    pub cycles: u64,

    /// Response delay programmed when the run stopped.
    pub final_delay: u32,
}

pub struct ModelEmulated {
    platform: Rc<Platform>,
}

impl ModelEmulated {
    pub fn clock(&self) -> &Clock {
        &self.platform.clock
    }

    /// Request that the responder stop at its next idle point.
    pub fn shutdown(&self) -> Shutdown {
        self.platform.shutdown.clone()
    }

    /// MMIO driver for the SPI device, as the responder firmware sees it.
    pub fn transport(&self) -> SpiDeviceTpm<BusLogger<SpiDevice>> {
        let device = self.platform.device.borrow().clone();
        SpiDeviceTpm::new(BusLogger::new("spi", device))
    }

    pub fn hart(&self) -> EmulatedHart {
        EmulatedHart {
            platform: Rc::clone(&self.platform),
        }
    }

    pub fn time(&self) -> EmulatedTime {
        EmulatedTime {
            platform: Rc::clone(&self.platform),
        }
    }

    pub fn responder(&self, config: &ResponderConfig) -> EmulatedResponder {
        Responder::new(self.transport(), self.hart(), self.time(), config)
    }

    /// Queue `script` on the host, bring the responder up and serve until the
    /// script is exhausted or the iteration bound is hit.
    pub fn run_script(
        &mut self,
        script: &HostScript,
        config: &ResponderConfig,
    ) -> Result<Report, ScriptError> {
        for transaction in script.transactions()? {
            self.platform.host.queue(transaction);
        }

        let mut responder = self.responder(config);
        if let Err(err) = responder.init(config, &script.identity()) {
            error!("responder init failed: {err}");
        }
        // The platform enables the header interrupt once the responder is up.
        let mut hart = self.hart();
        if let Err(err) = self
            .platform
            .update_intr_enable(|enable| enable | Platform::header_bit())
        {
            error!("unable to enable header interrupt: {err}");
        }
        hart.unmask();

        let stats = responder.run(&self.platform.shutdown).clone();
        Ok(Report {
            completed: self.platform.host.take_completed(),
            stats,
            cycles: self.platform.clock.now(),
            final_delay: responder.state().delay(),
        })
    }
}

impl HwModel for ModelEmulated {
    type TBus = SpiDevice;

    fn new(params: InitParams) -> Self {
        let clock = Clock::new();
        let irq = Irq::new();
        let device = SpiDevice::new(&clock, irq.clone(), params.spi);
        let host = device.host();
        Self {
            platform: Rc::new(Platform {
                clock,
                device: RefCell::new(device),
                irq,
                host,
                header_flag: Arc::new(AtomicBool::new(false)),
                interrupts_enabled: Cell::new(false),
                shutdown: Shutdown::new(),
            }),
        }
    }

    fn step(&mut self) {
        self.platform.step();
    }

    fn host(&self) -> SpiHost {
        self.platform.host.clone()
    }

    fn spi_bus(&mut self) -> SpiDevice {
        self.platform.device.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spi_tpm_emu_periph::TpmTransaction;

    #[test]
    fn test_isr_flags_and_masks_header() {
        let mut model = ModelEmulated::new(InitParams::default());
        let mut hart = model.hart();
        model
            .platform
            .update_intr_enable(|_| Platform::header_bit())
            .unwrap();
        hart.unmask();

        model
            .host()
            .queue(TpmTransaction::read(0x00d4_0018, 4).unwrap());
        hart.wait_for_interrupt();
        assert!(hart.signal_pending());
        assert_eq!(model.clock().now(), 64);

        let mut bus = model.spi_bus();
        assert_eq!(bus.read(RvSize::Word, regs::INTR_ENABLE), Ok(0));
        assert!(!model.platform.irq.is_high());
    }

    #[test]
    fn test_masked_interrupt_is_delivered_on_unmask() {
        let model = ModelEmulated::new(InitParams::default());
        let mut hart = model.hart();
        model
            .platform
            .update_intr_enable(|_| Platform::header_bit())
            .unwrap();

        hart.mask();
        model
            .host()
            .queue(TpmTransaction::read(0x00d4_0018, 4).unwrap());
        hart.wait_for_interrupt();
        assert!(model.platform.irq.is_high());
        assert!(!hart.signal_pending());

        hart.unmask();
        assert!(hart.signal_pending());
    }

    #[test]
    fn test_wait_requests_shutdown_when_idle() {
        let model = ModelEmulated::new(InitParams::default());
        let mut hart = model.hart();
        hart.wait_for_interrupt();
        assert!(model.shutdown().is_requested());
    }

    #[test]
    fn test_busy_wait_advances_clock() {
        let model = ModelEmulated::new(InitParams::default());
        let mut time = model.time();
        time.busy_wait(480);
        assert_eq!(time.now(), 480);
        assert_eq!(model.clock().now(), 480);
    }
}
