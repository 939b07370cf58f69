//! Snapshot subsystem configuration.

/// Default write buffer capacity: 10 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Default scan batch size in items.
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Configuration for the snapshot subsystem.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Capacity of the reusable write buffer, allocated once at service
    /// construction. Must be at least as large as the largest single
    /// record the engine can produce.
    pub buffer_size: usize,

    /// Maximum number of items requested from the scanner per probe.
    pub batch_size: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            buffer_size: DEFAULT_BUFFER_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SnapshotConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the write buffer capacity.
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Set the scan batch size.
    pub fn with_batch_size(mut self, items: usize) -> Self {
        self.batch_size = items;
        self
    }

    /// Small buffer and batch for tests, so overflow paths are exercised
    /// without megabytes of fixture data.
    pub fn for_testing() -> Self {
        SnapshotConfig {
            buffer_size: 4096,
            batch_size: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SnapshotConfig::new();
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_builder_overrides() {
        let config = SnapshotConfig::new()
            .with_buffer_size(1024)
            .with_batch_size(2);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.batch_size, 2);
    }
}
