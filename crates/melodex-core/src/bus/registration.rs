//! Sink registration handle — `spec.md` §9's "events instead of delegate
//! handles" adaptation: the bus owns the subscriber slot, and the caller
//! holds a plain handle that unregisters on drop instead of a kept-alive
//! platform delegate object.

use std::sync::{Arc, RwLock};

use super::events::{ProgressEvent, QueueStatsEvent, StatusEvent};

/// The three callbacks registered together via `RegisterCallbacks` —
/// `spec.md` §6.
#[derive(Clone)]
pub struct Callbacks {
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
    pub status: Arc<dyn Fn(StatusEvent) + Send + Sync>,
    pub stats: Arc<dyn Fn(QueueStatsEvent) + Send + Sync>,
}

/// Handle returned by [`super::CallbackBus::register`]. Clears the
/// registration on drop, but only if no newer registration has since
/// replaced it (checked by generation number, the same pattern
/// `control::JobControl` uses for attempt tokens).
pub struct SinkRegistration {
    sinks: Arc<RwLock<Option<(u64, Callbacks)>>>,
    generation: u64,
}

impl SinkRegistration {
    pub(super) fn new(sinks: Arc<RwLock<Option<(u64, Callbacks)>>>, generation: u64) -> Self {
        Self { sinks, generation }
    }
}

impl Drop for SinkRegistration {
    fn drop(&mut self) {
        let mut guard = self.sinks.write().unwrap();
        if matches!(guard.as_ref(), Some((gen, _)) if *gen == self.generation) {
            *guard = None;
        }
    }
}
