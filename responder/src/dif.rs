/*++

Licensed under the Apache-2.0 license.

File Name:

    dif.rs

Abstract:

    File contains the MMIO driver for the TPM portion of the SPI device.

--*/

use spi_tpm_emu_types::{Bus, BusError, RvData, RvSize};
use spi_tpm_registers::spi_device::{
    self as regs, TPM_ACCESS_FIELDS, TPM_CFG_FIELDS, TPM_CMD_ADDR_FIELDS, TPM_DID_VID_FIELDS,
    TPM_RID_FIELDS, TPM_STATUS_FIELDS,
};
use tock_registers::LocalRegisterCopy;

use crate::command::CommandHeader;
use crate::config::{InterfaceConfig, TpmIdentity};
use crate::error::PullError;
use crate::hal::TpmTransport;

/// Drives the SPI device registers over a `Bus` whose address 0 is the
/// start of the SPI device block.
pub struct SpiDeviceTpm<B: Bus> {
    bus: B,
}

impl<B: Bus> SpiDeviceTpm<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&mut self) -> &mut B {
        &mut self.bus
    }

    fn read_reg(&mut self, addr: u32) -> Result<RvData, BusError> {
        self.bus.read(RvSize::Word, addr)
    }

    fn write_reg(&mut self, addr: u32, val: RvData) -> Result<(), BusError> {
        self.bus.write(RvSize::Word, addr, val)
    }

    fn status(&mut self) -> Result<LocalRegisterCopy<u32, TPM_STATUS_FIELDS::Register>, BusError> {
        Ok(LocalRegisterCopy::new(self.read_reg(regs::TPM_STATUS)?))
    }
}

impl<B: Bus> TpmTransport for SpiDeviceTpm<B> {
    fn configure(&mut self, config: &InterfaceConfig) -> Result<(), BusError> {
        let mut cfg = LocalRegisterCopy::<u32, TPM_CFG_FIELDS::Register>::new(0);
        cfg.modify(
            TPM_CFG_FIELDS::EN::SET
                + TPM_CFG_FIELDS::TPM_MODE::Fifo
                + TPM_CFG_FIELDS::HW_REG_DIS.val((!config.return_by_hardware).into())
                + TPM_CFG_FIELDS::TPM_REG_CHK_DIS.val((!config.address_prefix_check).into())
                + TPM_CFG_FIELDS::INVALID_LOCALITY.val(config.locality_check.into()),
        );
        self.write_reg(regs::TPM_CFG, cfg.get())
    }

    fn seed_hw_registers(&mut self, identity: &TpmIdentity) -> Result<(), BusError> {
        let mut access = LocalRegisterCopy::<u32, TPM_ACCESS_FIELDS::Register>::new(0);
        access.modify(
            TPM_ACCESS_FIELDS::ACCESS_0.val(identity.access[0].into())
                + TPM_ACCESS_FIELDS::ACCESS_1.val(identity.access[1].into())
                + TPM_ACCESS_FIELDS::ACCESS_2.val(identity.access[2].into())
                + TPM_ACCESS_FIELDS::ACCESS_3.val(identity.access[3].into()),
        );
        self.write_reg(regs::TPM_ACCESS_0, access.get())?;
        self.write_reg(regs::TPM_ACCESS_1, identity.access[4].into())?;
        self.write_reg(regs::TPM_STS, identity.sts)?;
        self.write_reg(regs::TPM_INTF_CAPABILITY, identity.intf_capability)?;
        self.write_reg(regs::TPM_INT_ENABLE, identity.int_enable)?;
        self.write_reg(regs::TPM_INT_VECTOR, identity.int_vector)?;
        self.write_reg(regs::TPM_INT_STATUS, identity.int_status)?;

        let mut did_vid = LocalRegisterCopy::<u32, TPM_DID_VID_FIELDS::Register>::new(0);
        did_vid.modify(
            TPM_DID_VID_FIELDS::VID.val(identity.vendor_id.into())
                + TPM_DID_VID_FIELDS::DID.val(identity.device_id.into()),
        );
        self.write_reg(regs::TPM_DID_VID, did_vid.get())?;

        let mut rid = LocalRegisterCopy::<u32, TPM_RID_FIELDS::Register>::new(0);
        rid.modify(TPM_RID_FIELDS::RID.val(identity.revision.into()));
        self.write_reg(regs::TPM_RID, rid.get())
    }

    fn get_header(&mut self) -> Result<Option<CommandHeader>, BusError> {
        if !self.status()?.is_set(TPM_STATUS_FIELDS::CMDADDR_NOTEMPTY) {
            return Ok(None);
        }
        let cmd_addr =
            LocalRegisterCopy::<u32, TPM_CMD_ADDR_FIELDS::Register>::new(
                self.read_reg(regs::TPM_CMD_ADDR)?,
            );
        Ok(Some(CommandHeader::new(
            cmd_addr.read(TPM_CMD_ADDR_FIELDS::CMD) as u8,
            cmd_addr.read(TPM_CMD_ADDR_FIELDS::ADDR),
        )))
    }

    fn write_response(&mut self, data: &[u8]) -> Result<(), BusError> {
        let mut words = data.chunks_exact(4);
        for word in words.by_ref() {
            let val = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            self.bus.write(RvSize::Word, regs::TPM_READ_FIFO, val)?;
        }
        for byte in words.remainder() {
            self.bus
                .write(RvSize::Byte, regs::TPM_READ_FIFO, (*byte).into())?;
        }
        Ok(())
    }

    fn read_request(&mut self, buf: &mut [u8]) -> Result<(), PullError> {
        let depth = self.status()?.read(TPM_STATUS_FIELDS::WRFIFO_DEPTH) as usize;
        if depth < buf.len() {
            return Err(PullError::NotYetAvailable);
        }
        for byte in buf.iter_mut() {
            *byte = self.bus.read(RvSize::Byte, regs::TPM_WRITE_FIFO)? as u8;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spi_tpm_emu_bus::testing::FakeBus;

    #[test]
    fn test_configure() {
        let mut dif = SpiDeviceTpm::new(FakeBus::new());
        dif.configure(&InterfaceConfig::default()).unwrap();
        // EN | HW_REG_DIS | INVALID_LOCALITY
        assert_eq!(dif.bus().log.take(), "write(RvSize::Word, 0x804, 0x15)\n");

        dif.configure(&InterfaceConfig {
            return_by_hardware: true,
            address_prefix_check: false,
            locality_check: false,
        })
        .unwrap();
        assert_eq!(dif.bus().log.take(), "write(RvSize::Word, 0x804, 0x9)\n");
    }

    #[test]
    fn test_seed_hw_registers() {
        let mut dif = SpiDeviceTpm::new(FakeBus::new());
        dif.seed_hw_registers(&TpmIdentity::default()).unwrap();
        assert_eq!(
            dif.bus().log.take(),
            "write(RvSize::Word, 0x80c, 0x3020100)\n\
             write(RvSize::Word, 0x810, 0x4)\n\
             write(RvSize::Word, 0x814, 0xa1b2c3d4)\n\
             write(RvSize::Word, 0x818, 0xa1b2c3d4)\n\
             write(RvSize::Word, 0x81c, 0xb1b2b3b4)\n\
             write(RvSize::Word, 0x820, 0xa1b2c3d4)\n\
             write(RvSize::Word, 0x824, 0xa1b2c3d4)\n\
             write(RvSize::Word, 0x828, 0x12341234)\n\
             write(RvSize::Word, 0x82c, 0xee)\n"
        );
    }

    #[test]
    fn test_seed_access_localities() {
        let mut dif = SpiDeviceTpm::new(FakeBus::new());
        let identity = TpmIdentity {
            access: [0xa0, 0xa1, 0xa2, 0xa3, 0xa4],
            ..Default::default()
        };
        dif.seed_hw_registers(&identity).unwrap();
        let log = dif.bus().log.take();
        let mut lines = log.lines();
        assert_eq!(lines.next(), Some("write(RvSize::Word, 0x80c, 0xa3a2a1a0)"));
        assert_eq!(lines.next(), Some("write(RvSize::Word, 0x810, 0xa4)"));
    }

    #[test]
    fn test_get_header() {
        let mut dif = SpiDeviceTpm::new(FakeBus::new());
        dif.bus().read_queue.extend([Ok(0), Ok(1), Ok(0x83d4_0018)]);

        assert_eq!(dif.get_header(), Ok(None));
        assert_eq!(
            dif.get_header(),
            Ok(Some(CommandHeader::new(0x83, 0x00d4_0018)))
        );
        assert_eq!(
            dif.bus().log.take(),
            "read(RvSize::Word, 0x808)\nread(RvSize::Word, 0x808)\nread(RvSize::Word, 0x830)\n"
        );
    }

    #[test]
    fn test_write_response_words_then_bytes() {
        let mut dif = SpiDeviceTpm::new(FakeBus::new());
        dif.write_response(&[0xa1, 0xb2, 0xc3, 0xd4, 0x01, 0x02])
            .unwrap();
        assert_eq!(
            dif.bus().log.take(),
            "write(RvSize::Word, 0x834, 0xd4c3b2a1)\n\
             write(RvSize::Byte, 0x834, 0x1)\n\
             write(RvSize::Byte, 0x834, 0x2)\n"
        );
    }

    #[test]
    fn test_read_request_waits_for_full_payload() {
        let mut dif = SpiDeviceTpm::new(FakeBus::new());
        let mut buf = [0u8; 2];

        dif.bus().read_queue.push_back(Ok(1 << 16));
        assert_eq!(dif.read_request(&mut buf), Err(PullError::NotYetAvailable));
        assert_eq!(dif.bus().log.take(), "read(RvSize::Word, 0x808)\n");

        dif.bus()
            .read_queue
            .extend([Ok(2 << 16), Ok(0xaa), Ok(0xbb)]);
        assert_eq!(dif.read_request(&mut buf), Ok(()));
        assert_eq!(buf, [0xaa, 0xbb]);

        dif.bus().read_result = Err(BusError::LoadAccessFault);
        assert_eq!(
            dif.read_request(&mut buf),
            Err(PullError::Bus(BusError::LoadAccessFault))
        );
    }
}
