//! Tunables of the instance manager.

/// Runtime configuration for [`crate::manager::ModelManager`].
///
/// Both values only influence performance, never the rendered result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Upper bound (exclusive) of pending slots that are still uploaded one record
    /// at a time. Once this many slots are dirty, the next sync uploads the whole
    /// live range in a single write instead. `0` disables patch uploads entirely.
    pub max_patch_count: usize,
    /// Slot capacity the arena allocates on its first growth. Later growth doubles.
    pub initial_capacity: usize,
}

impl ManagerConfig {
    pub const DEFAULT_MAX_PATCH_COUNT: usize = 128;
    pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self {
            max_patch_count: Self::DEFAULT_MAX_PATCH_COUNT,
            initial_capacity: Self::DEFAULT_INITIAL_CAPACITY,
        }
    }

    pub fn with_max_patch_count(mut self, max_patch_count: usize) -> Self {
        self.max_patch_count = max_patch_count;
        self
    }

    /// A capacity of zero is bumped to one so the first growth always makes room.
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity.max(1);
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}
