//! "Deferred action, cancel on success" scope guard (`spec.md` §9), used to
//! unwind partially-constructed state when an init routine fails partway
//! through (image allocation, worker creation, device creation).

use log::warn;

pub struct Rollback {
    actions: Vec<Box<dyn FnOnce()>>,
    armed: bool,
}

impl Rollback {
    pub fn new() -> Self {
        Rollback { actions: Vec::new(), armed: true }
    }

    /// Record an undo action for a resource that was just acquired.
    pub fn on_unwind(&mut self, action: impl FnOnce() + 'static) {
        self.actions.push(Box::new(action));
    }

    /// Disarm the guard once every resource has been acquired successfully.
    /// Recorded actions are discarded without running.
    pub fn disarm(mut self) {
        self.armed = false;
        self.actions.clear();
    }
}

impl Default for Rollback {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if !self.actions.is_empty() {
            warn!("unwinding {} partially-acquired resource(s) after init failure", self.actions.len());
        }
        for action in self.actions.drain(..).rev() {
            action();
        }
    }
}
