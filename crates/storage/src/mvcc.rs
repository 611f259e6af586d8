//! Multi-version record store
//!
//! Every key owns a chain of versions, newest first, plus a mutex that
//! serializes all inspection and mutation of that chain. A version records
//! its writer's id and the greatest id of any reader that observed it; a
//! write is admissible only when no younger-than-the-writer reader has
//! already observed the version the write would shadow.
//!
//! The per-key lock is the mutex guard itself: [`MvccStorage::chain`]
//! hands out the key's `Arc<Mutex<VersionChain>>`, and every chain
//! operation is a method on the guarded value, so holding the guard is
//! holding the key lock. The multi-key commit phase collects guards in
//! key-sorted order before checking or installing anything.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use strand_core::{Key, TxnId, Value};

/// One entry in a key's version chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// The written value.
    pub value: Value,
    /// Id of the transaction that wrote this version.
    pub version_id: TxnId,
    /// Greatest id of any transaction that has read this version. Starts
    /// at the writer's own id.
    pub max_read_id: TxnId,
}

/// A key's versions, newest first.
#[derive(Debug, Clone, Default)]
pub struct VersionChain {
    versions: VecDeque<Version>,
}

impl VersionChain {
    /// Index of the version with the greatest `version_id <= id`, if any.
    fn visible_index(&self, id: TxnId) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, version) in self.versions.iter().enumerate() {
            if version.version_id <= id
                && best.map_or(true, |b| version.version_id > self.versions[b].version_id)
            {
                best = Some(i);
            }
        }
        best
    }

    /// Read the version visible to `reader_id`: the one with the greatest
    /// `version_id <= reader_id`. Records the read by raising that
    /// version's `max_read_id`. `None` if the chain is empty or every
    /// version is newer than the reader.
    pub fn read(&mut self, reader_id: TxnId) -> Option<Value> {
        let index = self.visible_index(reader_id)?;
        let version = &mut self.versions[index];
        if version.max_read_id < reader_id {
            version.max_read_id = reader_id;
        }
        Some(version.value)
    }

    /// Whether a write by `writer_id` is admissible.
    ///
    /// True when the chain is empty, or when the version the write would
    /// shadow (greatest `version_id <= writer_id`) has been read by no
    /// transaction younger than the writer. A non-empty chain whose
    /// versions are all newer than the writer rejects the write: the
    /// writer cannot slot a version beneath history it never observed.
    pub fn check_write(&self, writer_id: TxnId) -> bool {
        if self.versions.is_empty() {
            return true;
        }
        match self.visible_index(writer_id) {
            Some(index) => self.versions[index].max_read_id <= writer_id,
            None => false,
        }
    }

    /// Install a new version at the head of the chain. Callers must have
    /// seen `check_write(writer_id)` return true under the same guard.
    pub fn install(&mut self, value: Value, writer_id: TxnId) {
        self.versions.push_front(Version {
            value,
            version_id: writer_id,
            max_read_id: writer_id,
        });
    }

    /// Number of versions in the chain.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// True when the chain holds no versions.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// The version visible to `id`, without recording a read.
    pub fn visible(&self, id: TxnId) -> Option<&Version> {
        self.visible_index(id).map(|index| &self.versions[index])
    }
}

/// Multi-version key/value store: per-key version chains behind per-key
/// mutexes.
pub struct MvccStorage {
    chains: DashMap<Key, Arc<Mutex<VersionChain>>>,
}

impl MvccStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        MvccStorage {
            chains: DashMap::new(),
        }
    }

    /// Seed keys `0..n` with an initial version `(value 0, writer 0)`.
    pub fn preload(&self, n: u64) {
        for key in 0..n {
            let chain = self.chain(key);
            chain.lock().install(0, 0);
        }
    }

    /// The chain (and its mutex) for `key`, created empty on first use.
    /// Holding the returned guard is holding the key's lock.
    pub fn chain(&self, key: Key) -> Arc<Mutex<VersionChain>> {
        self.chains.entry(key).or_default().clone()
    }

    /// Lock `key`'s chain and read the version visible to `reader_id`.
    pub fn read(&self, key: Key, reader_id: TxnId) -> Option<Value> {
        let chain = Arc::clone(self.chains.get(&key)?.value());
        let mut guard = chain.lock();
        guard.read(reader_id)
    }

    /// Lock `key`'s chain and test whether a write by `writer_id` is
    /// admissible. Single-key convenience; the commit phase holds all its
    /// guards across check and install instead.
    pub fn check_write(&self, key: Key, writer_id: TxnId) -> bool {
        let chain = match self.chains.get(&key) {
            Some(entry) => Arc::clone(entry.value()),
            None => return true,
        };
        let guard = chain.lock();
        guard.check_write(writer_id)
    }

    /// Lock `key`'s chain and install a new version.
    pub fn write(&self, key: Key, value: Value, writer_id: TxnId) {
        let chain = self.chain(key);
        chain.lock().install(value, writer_id);
    }
}

impl Default for MvccStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Builds a chain from (value, writer, read ceiling) triples, oldest
    // first. A ceiling above the writer is applied through a read.
    fn chain_with(versions: &[(Value, TxnId, TxnId)]) -> VersionChain {
        let mut chain = VersionChain::default();
        for &(value, version_id, max_read_id) in versions {
            chain.install(value, version_id);
            if max_read_id > version_id {
                chain.read(max_read_id);
            }
        }
        chain
    }

    #[test]
    fn read_picks_greatest_version_at_or_below_reader() {
        let mut chain = chain_with(&[(10, 1, 1), (20, 3, 3), (30, 5, 5)]);
        assert_eq!(chain.read(4), Some(20));
        assert_eq!(chain.read(5), Some(30));
        assert_eq!(chain.read(100), Some(30));
        assert_eq!(chain.read(1), Some(10));
    }

    #[test]
    fn read_below_oldest_version_finds_nothing() {
        let mut chain = chain_with(&[(10, 5, 5)]);
        assert_eq!(chain.read(4), None);
    }

    #[test]
    fn read_records_the_reader_id() {
        let mut chain = chain_with(&[(10, 1, 1)]);
        chain.read(7);
        assert_eq!(chain.visible(7).unwrap().max_read_id, 7);
        // An older reader never lowers the ceiling.
        chain.read(3);
        assert_eq!(chain.visible(7).unwrap().max_read_id, 7);
    }

    #[test]
    fn check_write_on_empty_chain_is_admissible() {
        let chain = VersionChain::default();
        assert!(chain.check_write(1));
    }

    #[test]
    fn check_write_allows_when_no_younger_reader_observed() {
        // Writer 1 installed a version, reader 2 observed it; writer 3 may
        // shadow it because 2 <= 3.
        let chain = chain_with(&[(100, 1, 2)]);
        assert!(chain.check_write(3));
    }

    #[test]
    fn check_write_rejects_when_younger_reader_observed() {
        // Reader 5 observed writer 1's version; writer 3 would shadow a
        // version that reader 5 already consumed.
        let chain = chain_with(&[(100, 1, 5)]);
        assert!(!chain.check_write(3));
        // A writer at or past the read ceiling is fine again.
        assert!(chain.check_write(5));
        assert!(chain.check_write(6));
    }

    #[test]
    fn check_write_rejects_below_all_versions() {
        let chain = chain_with(&[(100, 5, 5)]);
        assert!(!chain.check_write(3));
    }

    #[test]
    fn install_makes_value_visible_to_writer_and_younger_readers() {
        let mut chain = chain_with(&[(100, 1, 2)]);
        assert!(chain.check_write(4));
        chain.install(200, 4);
        assert_eq!(chain.read(4), Some(200));
        assert_eq!(chain.read(9), Some(200));
        // Readers between the two writers still see the old version.
        assert_eq!(chain.read(3), Some(100));
    }

    #[test]
    fn storage_read_on_absent_key_finds_nothing() {
        let storage = MvccStorage::new();
        assert_eq!(storage.read(7, 10), None);
    }

    #[test]
    fn storage_check_write_on_absent_key_is_admissible() {
        let storage = MvccStorage::new();
        assert!(storage.check_write(7, 10));
    }

    #[test]
    fn storage_write_then_read_round_trip() {
        let storage = MvccStorage::new();
        storage.write(7, 42, 3);
        assert_eq!(storage.read(7, 3), Some(42));
        assert_eq!(storage.read(7, 2), None);
    }

    #[test]
    fn preload_seeds_version_zero() {
        let storage = MvccStorage::new();
        storage.preload(16);
        assert_eq!(storage.read(0, 1), Some(0));
        assert_eq!(storage.read(15, 1), Some(0));
        assert_eq!(storage.read(16, 1), None);
    }
}
