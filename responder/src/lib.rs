/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the SPI TPM responder library: a TPM register
    and FIFO shim served through the SPI device's command header mechanism.

--*/

mod command;
mod config;
pub mod delay;
mod dif;
mod error;
mod event_loop;
mod hal;
pub mod register_map;
mod state;
pub mod testing;

pub use command::{CommandByte, CommandHeader, CommandProcessor, Direction, Outcome};
pub use config::{InterfaceConfig, PrefixPolicy, ResponderConfig, TpmIdentity};
pub use dif::SpiDeviceTpm;
pub use error::{AbortReason, PullError};
pub use event_loop::{LoopStats, Responder, States as LoopState};
pub use hal::{Notification, Shutdown, TimeSource, TpmTransport};
pub use register_map::{RegisterEntry, Storage, TpmRegister};
pub use state::TpmState;
