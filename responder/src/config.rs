/*++

Licensed under the Apache-2.0 license.

File Name:

    config.rs

Abstract:

    File contains the responder configuration and the one-time identity
    values seeded before the event loop starts.

--*/

/// What to do with an address that lacks the TPM prefix.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum PrefixPolicy {
    /// Log it and serve the transaction from the low 16 bits.
    #[default]
    Permissive,

    /// Log it and drop the transaction.
    Strict,
}

/// TPM interface settings programmed into the peripheral.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct InterfaceConfig {
    /// Let the peripheral answer short register reads on its own.
    pub return_by_hardware: bool,

    /// Have the peripheral check the address prefix before answering.
    pub address_prefix_check: bool,

    /// Have the peripheral reject localities it does not implement.
    pub locality_check: bool,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            return_by_hardware: false,
            address_prefix_check: true,
            locality_check: true,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResponderConfig {
    pub prefix_policy: PrefixPolicy,

    /// Stop after this many transactions. None runs until shutdown.
    pub iterations: Option<u32>,

    /// Cycles per unit of programmed response delay. 480 cycles is 20us at
    /// the nominal 24 MHz clock.
    pub delay_quantum_cycles: u64,

    /// Give up pulling a write payload after this many cycles.
    pub pull_deadline_cycles: u64,

    /// Cycles to back off between pull attempts.
    pub pull_poll_cycles: u64,

    pub interface: InterfaceConfig,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            prefix_policy: PrefixPolicy::Permissive,
            iterations: None,
            delay_quantum_cycles: 480,
            pull_deadline_cycles: 1_000_000,
            pull_poll_cycles: 16,
            interface: InterfaceConfig::default(),
        }
    }
}

/// Identity and initial register values, written both into the emulated
/// register file and into the peripheral's hardware-served bank.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TpmIdentity {
    pub vendor_id: u16,
    pub device_id: u16,
    pub revision: u8,

    /// TPM_ACCESS byte for localities 0 through 4.
    pub access: [u8; 5],

    pub sts: u32,
    pub intf_capability: u32,
    pub int_enable: u32,
    pub int_vector: u32,
    pub int_status: u32,
}

impl TpmIdentity {
    /// TPM_DID_VID: vendor in the low half, device in the high half.
    pub fn did_vid(&self) -> u32 {
        u32::from(self.vendor_id) | u32::from(self.device_id) << 16
    }

    /// TPM_ACCESS as one little-endian word covering localities 0 to 3.
    pub fn access_word(&self) -> u32 {
        u32::from_le_bytes([self.access[0], self.access[1], self.access[2], self.access[3]])
    }
}

impl Default for TpmIdentity {
    fn default() -> Self {
        Self {
            vendor_id: 0x1234,
            device_id: 0x1234,
            revision: 0xee,
            access: [0, 1, 2, 3, 4],
            sts: 0xa1b2_c3d4,
            intf_capability: 0xa1b2_c3d4,
            int_enable: 0xb1b2_b3b4,
            int_vector: 0xa1b2_c3d4,
            int_status: 0xa1b2_c3d4,
        }
    }
}
