/*++

Licensed under the Apache-2.0 license.

File Name:

    command.rs

Abstract:

    File contains the command header decode and the transfer of a single
    transaction between the peripheral and the emulated TPM state.

--*/

use bitfield::bitfield;
use log::{debug, trace, warn};

use crate::config::{PrefixPolicy, ResponderConfig};
use crate::delay;
use crate::error::{AbortReason, PullError};
use crate::hal::{TimeSource, TpmTransport};
use crate::register_map::{self, TpmRegister, FIFO_SIZE};
use crate::state::TpmState;

bitfield! {
    /// TPM-over-SPI command byte
    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    pub struct CommandByte(u8);

    /// Set for reads, clear for writes
    pub is_read, _: 7;

    /// Reserved
    pub reserved, _: 6;

    /// Transfer size minus one
    pub u8, size_field, _: 5, 0;
}

impl From<CommandByte> for u8 {
    fn from(command: CommandByte) -> u8 {
        command.0
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Direction {
    Read,
    Write,
}

/// A command byte plus the address that followed it on the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CommandHeader {
    pub command: CommandByte,
    pub address: u32,
}

impl CommandHeader {
    pub fn new(command: u8, address: u32) -> Self {
        Self {
            command: CommandByte(command),
            address,
        }
    }

    pub fn direction(&self) -> Direction {
        if self.command.is_read() {
            Direction::Read
        } else {
            Direction::Write
        }
    }

    /// Transfer length in bytes, 1 through 64.
    pub fn length(&self) -> usize {
        usize::from(self.command.size_field()) + 1
    }

    pub fn has_valid_prefix(&self) -> bool {
        register_map::has_prefix(self.address)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Outcome {
    Completed {
        register: TpmRegister,
        direction: Direction,
        bytes: usize,

        /// Pull attempts for writes; always 1 for reads.
        attempts: u32,

        /// Cycles spent in the programmed response delay.
        delay_cycles: u64,
    },
    Aborted(AbortReason),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }
}

/// Serves one transaction at a time against a `TpmState`.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    prefix_policy: PrefixPolicy,
    delay_quantum_cycles: u64,
    pull_deadline_cycles: u64,
    pull_poll_cycles: u64,
}

impl CommandProcessor {
    pub fn new(config: &ResponderConfig) -> Self {
        Self {
            prefix_policy: config.prefix_policy,
            delay_quantum_cycles: config.delay_quantum_cycles,
            pull_deadline_cycles: config.pull_deadline_cycles,
            pull_poll_cycles: config.pull_poll_cycles.max(1),
        }
    }

    /// Check the prefix, hold off for the programmed delay, then move the
    /// data. Never fatal: every failure comes back as `Outcome::Aborted`.
    pub fn process(
        &self,
        header: &CommandHeader,
        state: &mut TpmState,
        transport: &mut impl TpmTransport,
        time: &mut impl TimeSource,
    ) -> Outcome {
        let address = header.address;
        if !header.has_valid_prefix() {
            match self.prefix_policy {
                PrefixPolicy::Permissive => {
                    warn!("[tpm] invalid address prefix {address:#010x}, serving offset anyway")
                }
                PrefixPolicy::Strict => {
                    warn!("[tpm] invalid address prefix {address:#010x}, dropped");
                    return Outcome::Aborted(AbortReason::PrefixMismatch { address });
                }
            }
        }

        let delay_cycles =
            delay::apply_delay(state, address, self.delay_quantum_cycles, time);

        let Some(entry) = register_map::resolve(address) else {
            warn!("[tpm] no register at offset {:#06x}", register_map::offset(address));
            return Outcome::Aborted(AbortReason::UnresolvedAddress { address });
        };
        let length = header.length();
        if entry.max_width == 0 || length > entry.max_width {
            let reason = AbortReason::OversizeRequest {
                register: entry.register,
                length,
                max_width: entry.max_width,
            };
            warn!("[tpm] {reason}");
            return Outcome::Aborted(reason);
        }

        let direction = header.direction();
        let attempts = match direction {
            Direction::Read => {
                let data = &state.storage(entry.storage)[..length];
                trace!("[tpm] {} -> {data:02x?}", entry.register);
                if let Err(err) = transport.write_response(data) {
                    warn!("[tpm] response push failed: {err}");
                    return Outcome::Aborted(AbortReason::Peripheral(err));
                }
                1
            }
            Direction::Write => {
                let mut buf = [0u8; FIFO_SIZE];
                let buf = &mut buf[..length];
                let attempts = match self.pull(transport, time, buf) {
                    Ok(attempts) => attempts,
                    Err(reason) => {
                        warn!("[tpm] {} write dropped: {reason}", entry.register);
                        return Outcome::Aborted(reason);
                    }
                };
                trace!("[tpm] {} <- {buf:02x?}", entry.register);
                state.storage_mut(entry.storage)[..length].copy_from_slice(buf);
                attempts
            }
        };
        debug!(
            "[tpm] {direction:?} {} ({length} bytes, {attempts} attempts)",
            entry.register
        );
        Outcome::Completed {
            register: entry.register,
            direction,
            bytes: length,
            attempts,
            delay_cycles,
        }
    }

    /// Retry the pull until the whole payload is there or the deadline
    /// passes. Returns the number of attempts.
    fn pull(
        &self,
        transport: &mut impl TpmTransport,
        time: &mut impl TimeSource,
        buf: &mut [u8],
    ) -> Result<u32, AbortReason> {
        let start = time.now();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match transport.read_request(buf) {
                Ok(()) => return Ok(attempts),
                Err(PullError::NotYetAvailable) => {
                    if time.now().wrapping_sub(start) >= self.pull_deadline_cycles {
                        return Err(AbortReason::Timeout { attempts });
                    }
                    time.busy_wait(self.pull_poll_cycles);
                }
                Err(PullError::Bus(err)) => return Err(AbortReason::Peripheral(err)),
            }
        }
    }
}
