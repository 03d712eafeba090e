use chat_backend::RunStatus;

/// Where the tracker's current value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    /// Nothing observed since the last reset.
    Initial,
    Snapshot,
    Event,
}

/// Last observed run status of the active chat.
///
/// Both writers overwrite; there is no versioning, so a feed event may land
/// on top of a snapshot value that was already stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatusTracker {
    status: RunStatus,
    source: StatusSource,
}

impl RunStatusTracker {
    #[must_use]
    pub fn new(initial: RunStatus) -> Self {
        Self {
            status: initial,
            source: StatusSource::Initial,
        }
    }

    pub fn set_from_snapshot(&mut self, status: RunStatus) {
        self.status = status;
        self.source = StatusSource::Snapshot;
    }

    pub fn set_from_event(&mut self, status: RunStatus) {
        self.status = status;
        self.source = StatusSource::Event;
    }

    pub fn reset(&mut self, initial: RunStatus) {
        *self = Self::new(initial);
    }

    #[must_use]
    pub fn current(&self) -> &RunStatus {
        &self.status
    }

    #[must_use]
    pub fn source(&self) -> StatusSource {
        self.source
    }
}

impl Default for RunStatusTracker {
    fn default() -> Self {
        Self::new(RunStatus::default())
    }
}
