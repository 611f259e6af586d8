//! Single-version record store
//!
//! A sharded concurrent map of `key -> (value, last-write stamp)`. Writes
//! are serialized by the schedulers that use this backend (the serial loop,
//! lock ownership, or the single validator thread), but optimistic workers
//! read concurrently with the validator's writes, so the map itself must
//! tolerate that. DashMap gives lock-free reads and sharded writes.
//!
//! The write stamp is a monotonic-clock reading taken by the caller at
//! apply time, not the writer's id: optimistic validation compares stamps
//! against transaction start times, which live on the same clock.

use dashmap::DashMap;
use strand_core::{Key, Timestamp, TxnId, Value};

#[derive(Debug, Clone, Copy)]
struct Record {
    value: Value,
    last_write_at: Timestamp,
}

/// Single-version key/value store with last-write stamps.
pub struct Store {
    records: DashMap<Key, Record>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Store {
            records: DashMap::new(),
        }
    }

    /// Seed keys `0..n` with value 0 and a never-written stamp, so
    /// workloads find every record they name.
    pub fn preload(&self, n: u64) {
        for key in 0..n {
            self.records.insert(
                key,
                Record {
                    value: 0,
                    last_write_at: 0,
                },
            );
        }
    }

    /// Look up the value of `key`.
    pub fn read(&self, key: Key) -> Option<Value> {
        self.records.get(&key).map(|record| record.value)
    }

    /// Upsert `key` to `value`, stamping the write with `now`.
    ///
    /// `txn_id` identifies the writing transaction for tracing only; the
    /// stamp the validator compares against is the clock reading.
    pub fn write(&self, key: Key, value: Value, txn_id: TxnId, now: Timestamp) {
        tracing::trace!(key, value, txn_id, "store write");
        self.records.insert(
            key,
            Record {
                value,
                last_write_at: now,
            },
        );
    }

    /// The stamp of the last write to `key`, or 0 if the key is absent or
    /// has never been written.
    pub fn timestamp(&self, key: Key) -> Timestamp {
        self.records
            .get(&key)
            .map(|record| record.last_write_at)
            .unwrap_or(0)
    }

    /// Number of records present.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are present.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_absent_key() {
        let store = Store::new();
        assert_eq!(store.read(7), None);
    }

    #[test]
    fn write_then_read() {
        let store = Store::new();
        store.write(7, 42, 1, 100);
        assert_eq!(store.read(7), Some(42));
        assert_eq!(store.timestamp(7), 100);
    }

    #[test]
    fn timestamp_of_absent_key_is_zero() {
        let store = Store::new();
        assert_eq!(store.timestamp(99), 0);
    }

    #[test]
    fn overwrite_updates_value_and_stamp() {
        let store = Store::new();
        store.write(3, 10, 1, 50);
        store.write(3, 20, 2, 75);
        assert_eq!(store.read(3), Some(20));
        assert_eq!(store.timestamp(3), 75);
    }

    #[test]
    fn preload_seeds_zeroed_records() {
        let store = Store::new();
        store.preload(64);
        assert_eq!(store.len(), 64);
        assert_eq!(store.read(0), Some(0));
        assert_eq!(store.read(63), Some(0));
        assert_eq!(store.timestamp(63), 0);
        assert_eq!(store.read(64), None);
    }
}
