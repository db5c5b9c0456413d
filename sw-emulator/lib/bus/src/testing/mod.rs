/*++

Licensed under the Apache-2.0 license.

File Name:

    mod.rs

Abstract:

    File contains exports for fakes and helpers used to test Bus users.

--*/
mod fake_bus;
mod log;

pub use fake_bus::FakeBus;
pub use log::Log;
