// Licensed under the Apache-2.0 license

use std::cell::Cell;
use std::rc::Rc;

/// A single level-sensitive interrupt line. The peripheral drives it, the
/// platform's interrupt logic samples it. Clones share the same wire.
#[derive(Clone, Default)]
pub struct Irq {
    level: Rc<Cell<bool>>,
}
impl Irq {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level of the interrupt line (true means asserted).
    pub fn set_level(&self, is_high: bool) {
        self.level.set(is_high);
    }

    pub fn is_high(&self) -> bool {
        self.level.get()
    }
}
