use crate::metadata::ActivityMetadata;

/// Default number of past activity codes kept per context when history
/// tracking is compiled in.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// Construction-time settings for a [`WaitContext`](crate::WaitContext).
#[derive(Debug, Clone)]
pub struct WaitContextConfig {
    /// Maximum number of past activity codes retained. Only consulted when the
    /// `track-history` feature is enabled; older entries are evicted first.
    pub history_capacity: usize,
    /// Metadata the context starts out with.
    pub initial_metadata: ActivityMetadata,
}

impl Default for WaitContextConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            initial_metadata: ActivityMetadata::default(),
        }
    }
}
