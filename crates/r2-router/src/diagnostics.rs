//! Last-error state of a node.

use r2_packet::Fault;
use tracing::warn;

/// The most recent failure and the status indicator.
///
/// Set by any failing operation, cleared only by `Initialize`, `Reset` or an
/// explicit [`Diagnostics::clear`]. A success never clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    last: Option<Fault>,
    status: bool,
}

impl Diagnostics {
    /// Empty diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    pub fn set(&mut self, fault: Fault) {
        warn!(code = %fault.code, info = fault.info, "diagnostics set");
        self.last = Some(fault);
    }

    /// Forget the last failure.
    pub fn clear(&mut self) {
        self.last = None;
    }

    /// The last failure, if any.
    pub fn last(&self) -> Option<Fault> {
        self.last
    }

    /// Whether a failure is pending.
    pub fn is_error(&self) -> bool {
        self.last.is_some()
    }

    /// Status indicator state.
    pub fn status(&self) -> bool {
        self.status
    }

    /// Change the status indicator. Returns whether it changed.
    pub fn set_status(&mut self, on: bool) -> bool {
        let changed = self.status != on;
        self.status = on;
        changed
    }
}
