/*++

Licensed under the Apache-2.0 license.

File Name:

    state.rs

Abstract:

    File contains the emulated TPM register file, FIFO buffer and response
    delay counter.

--*/

use crate::config::TpmIdentity;
use crate::register_map::{
    scalar_index, Storage, TpmRegister, FIFO_SIZE, SCALAR_REGISTER_COUNT, SCALAR_WIDTH,
};

/// All mutable emulation state. One instance lives for the whole run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TpmState {
    registers: [[u8; SCALAR_WIDTH]; SCALAR_REGISTER_COUNT],
    fifo: [u8; FIFO_SIZE],
    delay: u32,
}

impl Default for TpmState {
    fn default() -> Self {
        Self::new()
    }
}

impl TpmState {
    /// All registers zero, FIFO empty, no delay.
    pub fn new() -> Self {
        Self {
            registers: [[0; SCALAR_WIDTH]; SCALAR_REGISTER_COUNT],
            fifo: [0; FIFO_SIZE],
            delay: 0,
        }
    }

    /// State seeded with `identity`. Locality 4's ACCESS byte has no slot
    /// here; only the peripheral's hardware bank carries it.
    pub fn with_identity(identity: &TpmIdentity) -> Self {
        let mut state = Self::new();
        state.seed(identity);
        state
    }

    pub fn seed(&mut self, identity: &TpmIdentity) {
        self.set_register(TpmRegister::Access, identity.access_word());
        self.set_register(TpmRegister::Sts, identity.sts);
        self.set_register(TpmRegister::IntfCapability, identity.intf_capability);
        self.set_register(TpmRegister::IntEnable, identity.int_enable);
        self.set_register(TpmRegister::IntVector, identity.int_vector);
        self.set_register(TpmRegister::IntStatus, identity.int_status);
        self.set_register(TpmRegister::InterfaceId, 0);
        self.set_register(TpmRegister::DidVid, identity.did_vid());
        self.set_register(TpmRegister::Rid, identity.revision.into());
    }

    pub fn storage(&self, storage: Storage) -> &[u8] {
        match storage {
            Storage::Scalar(index) => &self.registers[index],
            Storage::Fifo => &self.fifo,
        }
    }

    pub fn storage_mut(&mut self, storage: Storage) -> &mut [u8] {
        match storage {
            Storage::Scalar(index) => &mut self.registers[index],
            Storage::Fifo => &mut self.fifo,
        }
    }

    /// Little-endian value of a scalar register.
    pub fn register(&self, register: TpmRegister) -> Option<u32> {
        scalar_index(register).map(|index| u32::from_le_bytes(self.registers[index]))
    }

    /// Returns false if `register` is not a scalar register.
    pub fn set_register(&mut self, register: TpmRegister, value: u32) -> bool {
        match scalar_index(register) {
            Some(index) => {
                self.registers[index] = value.to_le_bytes();
                true
            }
            None => false,
        }
    }

    pub fn fifo(&self) -> &[u8; FIFO_SIZE] {
        &self.fifo
    }

    pub fn fifo_mut(&mut self) -> &mut [u8; FIFO_SIZE] {
        &mut self.fifo
    }

    /// Programmed response delay, in delay units. 0 disables it.
    pub fn delay(&self) -> u32 {
        self.delay
    }

    pub fn set_delay(&mut self, delay: u32) {
        self.delay = delay;
    }
}
