//! Store configuration.

/// Configuration for opening an [`IndexStore`](crate::IndexStore).
#[derive(Debug, Clone)]
pub struct Config {
    /// Sync the log backend to disk after every appended record.
    pub sync_on_append: bool,

    /// Lock stripes per hash table. Rounded up to a power of two.
    pub stripes: usize,

    /// Cut a torn tail off the log once replay has finished.
    pub truncate_torn_tail: bool,

    /// Largest record body accepted on append and on replay.
    pub max_record_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_on_append: true,
            stripes: 64,
            truncate_torn_tail: true,
            max_record_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync after every append.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }

    /// Sets the number of lock stripes per table.
    #[must_use]
    pub const fn stripes(mut self, count: usize) -> Self {
        self.stripes = count;
        self
    }

    /// Sets whether a torn tail is truncated after replay.
    #[must_use]
    pub const fn truncate_torn_tail(mut self, value: bool) -> Self {
        self.truncate_torn_tail = value;
        self
    }

    /// Sets the maximum record body size.
    #[must_use]
    pub const fn max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = size;
        self
    }

    /// Stripe count actually used: at least one, rounded up to a power of two.
    #[must_use]
    pub fn effective_stripes(&self) -> usize {
        self.stripes.max(1).next_power_of_two()
    }
}
