/*++

Licensed under the Apache-2.0 license.

File Name:

    delay.rs

Abstract:

    File contains the programmable response delay: enforcement before a
    transaction and reprogramming from a control pattern in the FIFO.

--*/

use arrayref::array_ref;
use log::{debug, info};

use crate::hal::TimeSource;
use crate::register_map::{self, TpmRegister};
use crate::state::TpmState;

/// Little-endian word in FIFO bytes 0..4 that marks bytes 4..8 as a new
/// delay value.
pub const DELAY_MAGIC: u32 = 0x0102_0304;

/// Busy-wait `delay * quantum_cycles` cycles unless `address` targets one of
/// the FIFO aliases. Returns the cycles waited.
pub fn apply_delay(
    state: &TpmState,
    address: u32,
    quantum_cycles: u64,
    time: &mut impl TimeSource,
) -> u64 {
    let delay = state.delay();
    if delay == 0 {
        return 0;
    }
    if TpmRegister::from(register_map::offset(address)).is_fifo() {
        return 0;
    }
    let cycles = u64::from(delay).saturating_mul(quantum_cycles);
    debug!("[tpm] delaying response by {delay} units ({cycles} cycles)");
    time.busy_wait(cycles);
    cycles
}

/// Consume a delay control pattern left in the FIFO, if any. Returns the
/// new delay.
pub fn scan_and_update(state: &mut TpmState) -> Option<u32> {
    let fifo = state.fifo();
    let magic = u32::from_le_bytes(*array_ref!(fifo, 0, 4));
    if magic != DELAY_MAGIC {
        return None;
    }
    let delay = u32::from_le_bytes(*array_ref!(fifo, 4, 4));
    state.fifo_mut()[..8].fill(0);
    state.set_delay(delay);
    info!("[tpm] response delay set to {delay}");
    Some(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTime;
    use spi_tpm_emu_bus::testing::Log;

    fn load(state: &mut TpmState, bytes: &[u8]) {
        state.fifo_mut()[..bytes.len()].copy_from_slice(bytes);
    }

    #[test]
    fn test_magic_sets_delay_and_is_consumed() {
        let mut state = TpmState::new();
        load(&mut state, &[4, 3, 2, 1, 7, 0, 0, 0, 0x99]);
        assert_eq!(scan_and_update(&mut state), Some(7));
        assert_eq!(state.delay(), 7);
        assert_eq!(&state.fifo()[..9], &[0, 0, 0, 0, 0, 0, 0, 0, 0x99]);

        // One-shot: a second scan sees nothing.
        assert_eq!(scan_and_update(&mut state), None);
        assert_eq!(state.delay(), 7);
    }

    #[test]
    fn test_magic_can_clear_delay() {
        let mut state = TpmState::new();
        state.set_delay(12);
        load(&mut state, &[4, 3, 2, 1, 0, 0, 0, 0]);
        assert_eq!(scan_and_update(&mut state), Some(0));
        assert_eq!(state.delay(), 0);
    }

    #[test]
    fn test_other_patterns_ignored() {
        let mut state = TpmState::new();
        load(&mut state, &[1, 2, 3, 4, 7, 0, 0, 0]);
        assert_eq!(scan_and_update(&mut state), None);
        assert_eq!(state.delay(), 0);
        assert_eq!(&state.fifo()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_apply_delay() {
        let log = Log::new();
        let mut time = FakeTime::new(log.clone());
        let mut state = TpmState::new();

        assert_eq!(apply_delay(&state, 0x00d4_0018, 480, &mut time), 0);
        state.set_delay(2);
        assert_eq!(apply_delay(&state, 0x00d4_0018, 480, &mut time), 960);
        assert_eq!(apply_delay(&state, 0x00d4_0024, 480, &mut time), 0);
        assert_eq!(apply_delay(&state, 0x00d4_0080, 480, &mut time), 0);
        // Unmapped offsets still wait.
        assert_eq!(apply_delay(&state, 0x00d4_0ffc, 480, &mut time), 960);

        assert_eq!(log.take(), "busy_wait(960)\nbusy_wait(960)\n");
        assert_eq!(time.now(), 1920);
    }

    #[test]
    fn test_apply_delay_saturates() {
        let log = Log::new();
        let mut time = FakeTime::new(log.clone());
        let mut state = TpmState::new();
        load(&mut state, &[4, 3, 2, 1, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(scan_and_update(&mut state), Some(u32::MAX));

        assert_eq!(
            apply_delay(&state, 0x00d4_0018, u64::MAX, &mut time),
            u64::MAX
        );
        assert_eq!(log.take(), format!("busy_wait({})\n", u64::MAX));
    }
}
