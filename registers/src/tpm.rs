// Licensed under the Apache-2.0 license

//! TPM-over-SPI address space constants, as seen on the wire.

/// Fixed prefix carried by every TPM-local address.
pub const ADDRESS_PREFIX: u32 = 0x00D4_0000;
/// Bits of an address that must equal `ADDRESS_PREFIX`.
pub const ADDRESS_PREFIX_MASK: u32 = 0xFFFF_0000;

/// Command byte bit 7: 1 = read, 0 = write.
pub const COMMAND_READ: u8 = 0x80;
/// Command byte bits 5:0: transfer size minus one.
pub const COMMAND_SIZE_MASK: u8 = 0x3f;

/// Largest transfer a single command can describe.
pub const MAX_TRANSFER_SIZE: usize = COMMAND_SIZE_MASK as usize + 1;

/// TPM register offsets (low 16 bits of a TPM-local address).
pub mod offset {
    pub const ACCESS: u16 = 0x0000;
    pub const INT_ENABLE: u16 = 0x0008;
    pub const INT_VECTOR: u16 = 0x000C;
    pub const INT_STATUS: u16 = 0x0010;
    pub const INTF_CAPABILITY: u16 = 0x0014;
    pub const STS: u16 = 0x0018;
    pub const DATA_FIFO: u16 = 0x0024;
    pub const INTERFACE_ID: u16 = 0x0030;
    pub const XDATA_FIFO: u16 = 0x0080;
    pub const DID_VID: u16 = 0x0F00;
    pub const RID: u16 = 0x0F04;
}
