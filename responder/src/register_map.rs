/*++

Licensed under the Apache-2.0 license.

File Name:

    register_map.rs

Abstract:

    File contains the address decode from TPM-local offsets to emulated
    register storage.

--*/

use spi_tpm_emu_types::emu_enum;
use spi_tpm_registers::tpm;

/// Number of fixed-size registers held by the emulated state.
pub const SCALAR_REGISTER_COUNT: usize = 9;

/// Width of every scalar register, in bytes.
pub const SCALAR_WIDTH: usize = 4;

/// Size of the buffer behind both FIFO aliases.
pub const FIFO_SIZE: usize = tpm::MAX_TRANSFER_SIZE;

emu_enum!(
    /// TPM register named by the low 16 bits of a TPM-local address.
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    pub TpmRegister;
    u16;
    {
        Access = 0x0000,
        IntEnable = 0x0008,
        IntVector = 0x000C,
        IntStatus = 0x0010,
        IntfCapability = 0x0014,
        Sts = 0x0018,
        DataFifo = 0x0024,
        InterfaceId = 0x0030,
        XdataFifo = 0x0080,
        DidVid = 0x0F00,
        Rid = 0x0F04,
    };
    Unknown
);

impl TpmRegister {
    /// DATA_FIFO and XDATA_FIFO, which share one buffer.
    pub fn is_fifo(self) -> bool {
        matches!(self, TpmRegister::DataFifo | TpmRegister::XdataFifo)
    }
}

/// Where the bytes of a register live.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Storage {
    /// Index into the scalar register file.
    Scalar(usize),

    /// The shared FIFO buffer.
    Fifo,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RegisterEntry {
    pub register: TpmRegister,
    pub storage: Storage,

    /// Longest transfer the register accepts; 0 disables it.
    pub max_width: usize,
}

const fn scalar(register: TpmRegister, index: usize) -> RegisterEntry {
    RegisterEntry {
        register,
        storage: Storage::Scalar(index),
        max_width: SCALAR_WIDTH,
    }
}

const fn fifo(register: TpmRegister) -> RegisterEntry {
    RegisterEntry {
        register,
        storage: Storage::Fifo,
        max_width: FIFO_SIZE,
    }
}

const REGISTER_MAP: [RegisterEntry; 11] = [
    scalar(TpmRegister::Access, 0),
    scalar(TpmRegister::IntEnable, 1),
    scalar(TpmRegister::IntVector, 2),
    scalar(TpmRegister::IntStatus, 3),
    scalar(TpmRegister::IntfCapability, 4),
    scalar(TpmRegister::Sts, 5),
    fifo(TpmRegister::DataFifo),
    scalar(TpmRegister::InterfaceId, 6),
    fifo(TpmRegister::XdataFifo),
    scalar(TpmRegister::DidVid, 7),
    scalar(TpmRegister::Rid, 8),
];

/// Low 16 bits of a TPM-local address.
pub fn offset(address: u32) -> u16 {
    (address & 0xffff) as u16
}

/// Whether `address` carries the fixed TPM prefix.
pub fn has_prefix(address: u32) -> bool {
    address & tpm::ADDRESS_PREFIX_MASK == tpm::ADDRESS_PREFIX
}

/// Look up the storage behind `address`. Only the low 16 bits take part.
pub fn resolve(address: u32) -> Option<RegisterEntry> {
    let register = TpmRegister::from(offset(address));
    if !register.is_valid() {
        return None;
    }
    REGISTER_MAP
        .iter()
        .find(|entry| entry.register == register)
        .copied()
}

/// Storage slot of a scalar register, or None for the FIFO aliases.
pub fn scalar_index(register: TpmRegister) -> Option<usize> {
    if !register.is_valid() {
        return None;
    }
    match resolve(u16::from(register).into())?.storage {
        Storage::Scalar(index) => Some(index),
        Storage::Fifo => None,
    }
}
