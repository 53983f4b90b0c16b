use parking_lot::RwLock;
use std::sync::Arc;

/// Process-wide admission flag. Cloning shares the same flag.
///
/// Setting it only stops new top-level requests from being admitted; work that
/// was already admitted runs to completion. The report worker stops on its own
/// cancellation token, not on this flag.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    shutdown: Arc<RwLock<bool>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.read()
    }

    pub fn set_shutdown(&self, shutdown: bool) {
        *self.shutdown.write() = shutdown;
    }
}
