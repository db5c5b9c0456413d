// Licensed under the Apache-2.0 license

//! Register offsets and fields for the TPM portion of the SPI device block.
//! Shared by the emulated peripheral and the responder's MMIO driver.

use tock_registers::register_bitfields;

/// Interrupt State Register
pub const INTR_STATE: u32 = 0x0000;
/// Interrupt Enable Register
pub const INTR_ENABLE: u32 = 0x0004;
/// Interrupt Test Register
pub const INTR_TEST: u32 = 0x0008;
/// TPM HWIP Capability register.
pub const TPM_CAP: u32 = 0x0800;
/// TPM Configuration register.
pub const TPM_CFG: u32 = 0x0804;
/// TPM submodule state register.
pub const TPM_STATUS: u32 = 0x0808;
/// TPM_ACCESS_x register, localities 0 to 3.
pub const TPM_ACCESS_0: u32 = 0x080c;
/// TPM_ACCESS_x register, locality 4.
pub const TPM_ACCESS_1: u32 = 0x0810;
/// TPM_STS_x register.
pub const TPM_STS: u32 = 0x0814;
/// TPM_INTF_CAPABILITY
pub const TPM_INTF_CAPABILITY: u32 = 0x0818;
/// TPM_INT_ENABLE
pub const TPM_INT_ENABLE: u32 = 0x081c;
/// TPM_INT_VECTOR
pub const TPM_INT_VECTOR: u32 = 0x0820;
/// TPM_INT_STATUS
pub const TPM_INT_STATUS: u32 = 0x0824;
/// TPM_DID/ TPM_VID register
pub const TPM_DID_VID: u32 = 0x0828;
/// TPM_RID
pub const TPM_RID: u32 = 0x082c;
/// TPM Command and Address buffer
pub const TPM_CMD_ADDR: u32 = 0x0830;
/// TPM Read command return data FIFO.
pub const TPM_READ_FIFO: u32 = 0x0834;
/// TPM Write command received data FIFO.
pub const TPM_WRITE_FIFO: u32 = 0x0838;

/// Size of the register block in bytes.
pub const MMAP_SIZE: u32 = 0x1000;

register_bitfields![u32,
    /// Common Interrupt Offsets
    pub INTR [
        TPM_HEADER_NOT_EMPTY OFFSET(11) NUMBITS(1) [],
    ],
    pub TPM_CAP_FIELDS [
        REV OFFSET(0) NUMBITS(8) [],
        LOCALITY OFFSET(8) NUMBITS(1) [],
        MAX_WR_SIZE OFFSET(16) NUMBITS(3) [],
        MAX_RD_SIZE OFFSET(20) NUMBITS(3) [],
    ],
    pub TPM_CFG_FIELDS [
        EN OFFSET(0) NUMBITS(1) [],
        TPM_MODE OFFSET(1) NUMBITS(1) [
            Fifo = 0,
            Crb = 1,
        ],
        HW_REG_DIS OFFSET(2) NUMBITS(1) [],
        TPM_REG_CHK_DIS OFFSET(3) NUMBITS(1) [],
        INVALID_LOCALITY OFFSET(4) NUMBITS(1) [],
    ],
    pub TPM_STATUS_FIELDS [
        CMDADDR_NOTEMPTY OFFSET(0) NUMBITS(1) [],
        WRFIFO_DEPTH OFFSET(16) NUMBITS(7) [],
    ],
    pub TPM_ACCESS_FIELDS [
        ACCESS_0 OFFSET(0) NUMBITS(8) [],
        ACCESS_1 OFFSET(8) NUMBITS(8) [],
        ACCESS_2 OFFSET(16) NUMBITS(8) [],
        ACCESS_3 OFFSET(24) NUMBITS(8) [],
    ],
    pub TPM_DID_VID_FIELDS [
        VID OFFSET(0) NUMBITS(16) [],
        DID OFFSET(16) NUMBITS(16) [],
    ],
    pub TPM_RID_FIELDS [
        RID OFFSET(0) NUMBITS(8) [],
    ],
    pub TPM_CMD_ADDR_FIELDS [
        ADDR OFFSET(0) NUMBITS(24) [],
        CMD OFFSET(24) NUMBITS(8) [],
    ],
];
