use std::time::Duration;

/// Connection settings applied when a datastore is opened.
#[derive(Debug, Clone)]
pub struct DatastoreConfig {
    /// How long a statement waits on a lock held by another connection
    /// before failing with `SQLITE_BUSY`.
    pub busy_timeout: Duration,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl DatastoreConfig {
    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}
