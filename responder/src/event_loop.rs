/*++

Licensed under the Apache-2.0 license.

File Name:

    event_loop.rs

Abstract:

    File contains the responder main loop: wait for a command header, serve
    it, acknowledge the peripheral and scan for a delay reprogram.

--*/

use log::{debug, error, info, warn};
use smlang::statemachine;
use spi_tpm_emu_types::BusError;

use crate::command::{CommandProcessor, Direction, Outcome};
use crate::config::{ResponderConfig, TpmIdentity};
use crate::delay;
use crate::error::AbortReason;
use crate::hal::{Notification, Shutdown, TimeSource, TpmTransport};
use crate::state::TpmState;

statemachine! {
    derive_states: [Clone, Copy, Debug],
    transitions: {
        // CurrentState Event = NextState

        // the interrupt handler flagged a header
        *Idle + HeaderReady = HeaderPending,

        // header popped from the peripheral, or nothing was held
        HeaderPending + HeaderFetched = Processing,
        HeaderPending + HeaderMissing = Acknowledged,

        Processing + TransferDone = Acknowledged,

        // flag cleared, peripheral acknowledged, interrupt re-enabled
        Acknowledged + Rearmed = Idle,
    }
}

/// State machine extended variables.
pub struct Context;

impl StateMachineContext for Context {}

/// Running totals kept by the event loop.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct LoopStats {
    /// Header notifications handled.
    pub iterations: u32,
    pub reads: u32,
    pub writes: u32,
    pub unresolved: u32,
    pub oversize: u32,

    /// Addresses without the TPM prefix, served or not.
    pub prefix_mismatches: u32,

    /// Transactions dropped by the strict prefix policy.
    pub prefix_drops: u32,

    pub timeouts: u32,

    /// Bus faults while moving transaction data.
    pub transfer_faults: u32,

    /// Bus faults while fetching headers or re-arming.
    pub peripheral_faults: u32,

    /// Notifications with no header behind them.
    pub spurious: u32,

    pub delay_reprograms: u32,

    /// Pull attempts beyond the first, summed over all writes.
    pub pull_retries: u64,

    /// Cycles spent in programmed response delays.
    pub delay_cycles: u64,
}

impl LoopStats {
    pub fn completed(&self) -> u32 {
        self.reads + self.writes
    }

    /// Transactions dropped after their header was fetched.
    pub fn aborted(&self) -> u32 {
        self.unresolved + self.oversize + self.prefix_drops + self.timeouts + self.transfer_faults
    }

    fn record(&mut self, outcome: &Outcome) {
        match *outcome {
            Outcome::Completed {
                direction,
                attempts,
                delay_cycles,
                ..
            } => {
                match direction {
                    Direction::Read => self.reads += 1,
                    Direction::Write => self.writes += 1,
                }
                self.pull_retries += u64::from(attempts.saturating_sub(1));
                self.delay_cycles = self.delay_cycles.saturating_add(delay_cycles);
            }
            Outcome::Aborted(reason) => match reason {
                AbortReason::UnresolvedAddress { .. } => self.unresolved += 1,
                AbortReason::OversizeRequest { .. } => self.oversize += 1,
                AbortReason::PrefixMismatch { .. } => self.prefix_drops += 1,
                AbortReason::Timeout { attempts } => {
                    self.timeouts += 1;
                    self.pull_retries += u64::from(attempts.saturating_sub(1));
                }
                AbortReason::Peripheral(_) => self.transfer_faults += 1,
            },
        }
    }
}

/// The TPM responder: owns the emulated state and the three seams it is
/// driven through.
pub struct Responder<T: TpmTransport, N: Notification, S: TimeSource> {
    transport: T,
    notifier: N,
    time: S,
    state: TpmState,
    processor: CommandProcessor,
    iterations: Option<u32>,
    stats: LoopStats,
    machine: StateMachine<Context>,
}

impl<T: TpmTransport, N: Notification, S: TimeSource> Responder<T, N, S> {
    pub fn new(transport: T, notifier: N, time: S, config: &ResponderConfig) -> Self {
        Self {
            transport,
            notifier,
            time,
            state: TpmState::new(),
            processor: CommandProcessor::new(config),
            iterations: config.iterations,
            stats: LoopStats::default(),
            machine: StateMachine::new(Context),
        }
    }

    /// One-time setup: enable the TPM interface and seed both the emulated
    /// registers and the peripheral's hardware bank with `identity`.
    pub fn init(
        &mut self,
        config: &ResponderConfig,
        identity: &TpmIdentity,
    ) -> Result<(), BusError> {
        self.transport.configure(&config.interface)?;
        self.transport.seed_hw_registers(identity)?;
        self.state.seed(identity);
        info!(
            "[tpm] responder ready: vendor {:#06x} device {:#06x} revision {:#04x}",
            identity.vendor_id, identity.device_id, identity.revision
        );
        Ok(())
    }

    /// Serve transactions until the iteration bound is reached or `shutdown`
    /// is requested.
    pub fn run(&mut self, shutdown: &Shutdown) -> &LoopStats {
        while self
            .iterations
            .map_or(true, |bound| self.stats.iterations < bound)
        {
            if !self.step(shutdown) {
                info!("[tpm] shutdown requested");
                break;
            }
        }
        info!(
            "[tpm] served {} transactions, {} aborted",
            self.stats.completed(),
            self.stats.aborted()
        );
        &self.stats
    }

    /// Wait for and serve a single transaction. Returns false if `shutdown`
    /// was requested while idle.
    pub fn step(&mut self, shutdown: &Shutdown) -> bool {
        if !self.notifier.block_until_signaled(shutdown) {
            return false;
        }
        self.advance(Events::HeaderReady);
        self.stats.iterations += 1;

        let header = match self.transport.get_header() {
            Ok(Some(header)) => Some(header),
            Ok(None) => {
                debug!("[tpm] notification without a header");
                self.stats.spurious += 1;
                None
            }
            Err(err) => {
                error!("[tpm] failed to fetch header: {err}");
                self.stats.peripheral_faults += 1;
                None
            }
        };

        match header {
            Some(header) => {
                self.advance(Events::HeaderFetched);
                if !header.has_valid_prefix() {
                    self.stats.prefix_mismatches += 1;
                }
                let outcome = self.processor.process(
                    &header,
                    &mut self.state,
                    &mut self.transport,
                    &mut self.time,
                );
                self.stats.record(&outcome);
                self.advance(Events::TransferDone);
                self.acknowledge();
                match outcome {
                    Outcome::Completed { register, .. } => info!(
                        "[tpm] cmd {:#04x} addr {:#08x} {register}: ok",
                        u8::from(header.command), header.address
                    ),
                    Outcome::Aborted(reason) => warn!(
                        "[tpm] cmd {:#04x} addr {:#08x}: {reason}",
                        u8::from(header.command), header.address
                    ),
                }
            }
            None => {
                self.advance(Events::HeaderMissing);
                self.acknowledge();
            }
        }

        if delay::scan_and_update(&mut self.state).is_some() {
            self.stats.delay_reprograms += 1;
        }
        true
    }

    fn acknowledge(&mut self) {
        if let Err(err) = self.notifier.clear_and_rearm() {
            error!("[tpm] failed to re-arm header interrupt: {err}");
            self.stats.peripheral_faults += 1;
        }
        self.advance(Events::Rearmed);
    }

    fn advance(&mut self, event: Events) {
        if self.machine.process_event(event).is_err() {
            error!(
                "[tpm] invalid event loop transition from {:?}",
                self.machine.state()
            );
        }
    }

    pub fn loop_state(&self) -> States {
        *self.machine.state()
    }

    pub fn state(&self) -> &TpmState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TpmState {
        &mut self.state
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn notifier(&mut self) -> &mut N {
        &mut self.notifier
    }

    pub fn time(&mut self) -> &mut S {
        &mut self.time
    }
}
