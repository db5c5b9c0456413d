/*++

Licensed under the Apache-2.0 license.

File Name:

    log.rs

Abstract:

    File contains a shared text log used to record call ordering in tests.

--*/
use std::{
    cell::{Ref, RefCell},
    fmt::Write,
    ops::Deref,
    rc::Rc,
};

/// A type for logging actions without needing &mut self. Fakes for the
/// peripheral, notification and time seams all write into one `Log` so a
/// test can assert on the interleaving of their calls.
///
/// When `Log` is cloned, the clones all share the same underlying buffer.
///
/// * Example
///
/// ```
/// use spi_tpm_emu_bus::testing::Log;
/// use std::fmt::Write;
///
/// let log = Log::new();
/// writeln!(log.w(), "mask()").unwrap();
/// writeln!(log.w(), "unmask()").unwrap();
/// assert_eq!(log.lines(), vec!["mask()", "unmask()"]);
/// assert_eq!("mask()\nunmask()\n", log.take());
/// assert_eq!("", log.take());
/// ```
#[derive(Clone)]
pub struct Log {
    log: Rc<RefCell<String>>,
}
impl Log {
    /// Construct an empty `Log`.
    pub fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(String::new())),
        }
    }

    /// Access the contents of the log without modifying it.
    pub fn as_str(&self) -> impl Deref<Target = str> + '_ {
        Ref::map(self.log.borrow(), String::as_str)
    }

    /// Copies out the logged lines without modifying the log.
    pub fn lines(&self) -> Vec<String> {
        self.log.borrow().lines().map(str::to_owned).collect()
    }

    /// Replaces the existing contents of the log with an empty string, and
    /// returns the previous contents.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    /// returns a writer that can be use with write!() or writeln!().
    pub fn w(&self) -> impl Write + '_ {
        LogWriter { log: &self.log }
    }
}
impl Default for Log {
    fn default() -> Self {
        Self::new()
    }
}

struct LogWriter<'a> {
    log: &'a RefCell<String>,
}
impl Write for LogWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        Write::write_str(&mut *self.log.borrow_mut(), s)
    }
}
