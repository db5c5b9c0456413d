/*++

Licensed under the Apache-2.0 license.

File Name:

    error.rs

Abstract:

    File contains the error types reported by the TPM responder.

--*/

use crate::register_map::TpmRegister;
use spi_tpm_emu_types::BusError;
use std::fmt;

/// Failure to pull a write payload out of the peripheral.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PullError {
    /// Fewer bytes than requested have arrived so far. Retry later.
    NotYetAvailable,

    /// The peripheral faulted on the register bus.
    Bus(BusError),
}

impl From<BusError> for PullError {
    fn from(err: BusError) -> Self {
        PullError::Bus(err)
    }
}

impl fmt::Display for PullError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullError::NotYetAvailable => f.write_str("write payload not yet available"),
            PullError::Bus(err) => write!(f, "bus error: {err}"),
        }
    }
}

impl std::error::Error for PullError {}

/// Why a transaction was dropped without (complete) data movement.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AbortReason {
    /// The low 16 bits of the address name no TPM register.
    UnresolvedAddress { address: u32 },

    /// The transfer is longer than the target register.
    OversizeRequest {
        register: TpmRegister,
        length: usize,
        max_width: usize,
    },

    /// The address lacks the TPM prefix and the strict policy is active.
    PrefixMismatch { address: u32 },

    /// The write payload never fully arrived before the pull deadline.
    Timeout { attempts: u32 },

    /// The peripheral faulted on the register bus.
    Peripheral(BusError),
}

impl From<BusError> for AbortReason {
    fn from(err: BusError) -> Self {
        AbortReason::Peripheral(err)
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::UnresolvedAddress { address } => {
                write!(f, "no TPM register at address {address:#010x}")
            }
            AbortReason::OversizeRequest {
                register,
                length,
                max_width,
            } => write!(
                f,
                "{length}-byte transfer exceeds {register} width of {max_width} bytes"
            ),
            AbortReason::PrefixMismatch { address } => {
                write!(f, "address {address:#010x} lacks the TPM prefix")
            }
            AbortReason::Timeout { attempts } => {
                write!(f, "write payload timed out after {attempts} attempts")
            }
            AbortReason::Peripheral(err) => write!(f, "peripheral fault: {err}"),
        }
    }
}

impl std::error::Error for AbortReason {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            AbortReason::OversizeRequest {
                register: TpmRegister::Access,
                length: 5,
                max_width: 4
            }
            .to_string(),
            "5-byte transfer exceeds Access width of 4 bytes"
        );
        assert_eq!(
            AbortReason::UnresolvedAddress {
                address: 0x00d4_0ffc
            }
            .to_string(),
            "no TPM register at address 0x00d40ffc"
        );
        assert_eq!(
            PullError::from(BusError::LoadAccessFault).to_string(),
            "bus error: load access fault"
        );
    }
}
