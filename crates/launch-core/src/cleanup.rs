//! Deferred teardown.
//!
//! Setup steps hand back [`CleanupAction`]s which are pushed onto a
//! [`CleanupStack`]. The stack runs every action once, in the order it was
//! registered, either explicitly through [`CleanupStack::run_all`] or when it
//! is dropped.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

pub struct CleanupAction {
    label: String,
    action: Box<dyn FnOnce()>,
}

impl CleanupAction {
    pub fn new(label: impl Into<String>, action: impl FnOnce() + 'static) -> Self {
        Self {
            label: label.into(),
            action: Box::new(action),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs the action, returning `false` if it panicked.
    pub fn invoke(self) -> bool {
        let CleanupAction { label, action } = self;
        debug!("Running cleanup: {}", label);
        match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(()) => true,
            Err(_) => {
                error!("Cleanup '{}' panicked; continuing with remaining cleanups", label);
                false
            }
        }
    }
}

impl fmt::Debug for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct CleanupStack {
    actions: Vec<CleanupAction>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: CleanupAction) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.actions.iter().map(CleanupAction::label).collect()
    }

    /// Runs every registered action in registration order.
    ///
    /// Returns the number of actions that panicked. The stack is empty
    /// afterwards, so a later drop does nothing.
    pub fn run_all(&mut self) -> usize {
        self.actions
            .drain(..)
            .map(CleanupAction::invoke)
            .filter(|ok| !ok)
            .count()
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            self.run_all();
        }
    }
}
