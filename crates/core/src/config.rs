//! Processor configuration

/// Construction-time configuration for a transaction processor.
///
/// The defaults match the sizing the benchmark workloads expect: an
/// eight-thread worker pool over a storage preloaded with one million
/// records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Number of worker threads executing transactions.
    pub worker_threads: usize,
    /// Number of records seeded into storage (keys `0..preload_keys`,
    /// value 0, never-written timestamp) so workloads find every record
    /// they name.
    pub preload_keys: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            worker_threads: 8,
            preload_keys: 1_000_000,
        }
    }
}

impl ProcessorConfig {
    /// A small configuration for tests: fewer workers, a storage seeded
    /// with just enough records to exercise the schedulers without paying
    /// the full preload on every construction.
    pub fn for_testing() -> Self {
        ProcessorConfig {
            worker_threads: 4,
            preload_keys: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_benchmark_sizing() {
        let config = ProcessorConfig::default();
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.preload_keys, 1_000_000);
    }

    #[test]
    fn testing_config_is_smaller() {
        let config = ProcessorConfig::for_testing();
        assert!(config.preload_keys < ProcessorConfig::default().preload_keys);
        assert!(config.worker_threads > 0);
    }
}
