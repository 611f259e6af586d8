//! Transaction processor: four schedulers over one lifecycle
//!
//! A processor owns a request queue, a result queue, a mode-specific
//! storage backend, a fixed worker pool, and one dedicated scheduler
//! thread. `submit` stamps each transaction with the next id from a
//! monotone counter and enqueues it; the scheduler thread dispatches per
//! mode; `get_result` hands completed transactions back in completion
//! order.
//!
//! Restarts never surface to the client: a transaction thrown back by
//! optimistic validation, a multi-version write rejection, or a wound-wait
//! rollback re-enters the request queue with a fresh (strictly larger) id,
//! so every conflict resolution is monotone and the oldest transaction
//! always makes progress.

use crate::lock_manager::{LockManager, LockMode};
use crate::txn::{Txn, TxnStatus};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use strand_core::{Key, ProcessorConfig, StrandError, StrandResult, TxnId};
use strand_runtime::{MonotonicClock, StaticThreadPool, WorkQueue};
use strand_storage::{MvccStorage, Store, VersionChain};

/// Concurrency-control mode, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcMode {
    /// One transaction at a time on the scheduler thread.
    Serial,
    /// Deterministic two-phase locking with wound-wait.
    Locking,
    /// Optimistic execution, serial validation.
    Occ,
    /// Multi-version reads with per-key write admission.
    Mvcc,
}

// Why a restarted attempt went back to the request queue. Recovered
// invisibly; recorded for tracing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestartReason {
    // A record in the foot-print was written after this attempt started.
    ValidationConflict { key: Key },
    // A version this attempt would shadow was already read by a younger
    // transaction.
    WriteRejected { key: Key },
    // An older transaction wounded this attempt while it was still
    // acquiring locks.
    Wounded,
}

enum Backend {
    Single(Store),
    Mvcc(MvccStorage),
}

// Lock-table state shared by locking-mode workers. One mutex guards all of
// it; wound marks live beside the lock table so that wounding an owner and
// observing the wound are both ordinary operations under that mutex.
struct LockState {
    manager: LockManager,
    wounded: HashSet<TxnId>,
}

struct Core {
    mode: CcMode,
    clock: MonotonicClock,
    requests: WorkQueue<Txn>,
    completed: WorkQueue<Txn>,
    results: WorkQueue<Txn>,
    next_unique_id: AtomicU64,
    backend: Backend,
    locks: Mutex<LockState>,
    pool: StaticThreadPool,
}

impl Core {
    fn store(&self) -> &Store {
        match &self.backend {
            Backend::Single(store) => store,
            Backend::Mvcc(_) => unreachable!("single-version store requested in MVCC mode"),
        }
    }

    fn mvcc(&self) -> &MvccStorage {
        match &self.backend {
            Backend::Mvcc(storage) => storage,
            Backend::Single(_) => unreachable!("MVCC store requested in a single-version mode"),
        }
    }

    fn fresh_id(&self) -> TxnId {
        self.next_unique_id.fetch_add(1, Ordering::SeqCst)
    }

    // Throw an attempt back to the request queue under a fresh id.
    fn restart(&self, mut txn: Txn, reason: RestartReason) {
        let old_id = txn.unique_id();
        txn.reset_for_retry();
        let id = self.fresh_id();
        txn.assign_id(id);
        tracing::debug!(old_id, new_id = id, ?reason, "restarting transaction");
        self.requests.push(txn);
    }

    // Stamp the attempt, read its foot-print from the single-version
    // store, and run the program.
    fn execute_txn(&self, txn: &mut Txn) {
        txn.begin_attempt(self.clock.now());
        let store = self.store();
        let read_keys: Vec<_> = txn.readset().iter().copied().collect();
        for key in read_keys {
            if let Some(value) = store.read(key) {
                txn.record_read(key, value);
            }
        }
        let write_keys: Vec<_> = txn.writeset().iter().copied().collect();
        for key in write_keys {
            if let Some(value) = store.read(key) {
                txn.record_read(key, value);
            }
        }
        txn.run_program();
    }

    // Flush the attempt's buffered writes to the single-version store.
    fn apply_writes(&self, txn: &Txn) {
        let store = self.store();
        for (&key, &value) in txn.writes() {
            store.write(key, value, txn.unique_id(), self.clock.now());
        }
    }

    // Promote a completed attempt to its terminal state, applying writes
    // on commit. A status outside the two completed states here is a
    // programming error in the scheduler, not a recoverable condition.
    fn commit_or_abort(&self, mut txn: Txn) -> Txn {
        match txn.status() {
            TxnStatus::CompletedCommit => {
                self.apply_writes(&txn);
                txn.set_status(TxnStatus::Committed);
                tracing::trace!(txn_id = txn.unique_id(), "committed");
            }
            TxnStatus::CompletedAbort => {
                txn.set_status(TxnStatus::Aborted);
                tracing::trace!(txn_id = txn.unique_id(), "aborted by program");
            }
            status => panic!("completed transaction has invalid status {status:?}"),
        }
        txn
    }
}

/// A multi-mode transaction processor over an in-memory key/value store.
pub struct TxnProcessor {
    core: Arc<Core>,
    scheduler: Option<JoinHandle<()>>,
}

impl TxnProcessor {
    /// Build a processor with the default configuration (eight workers,
    /// one million preloaded records).
    pub fn new(mode: CcMode) -> Self {
        Self::with_config(mode, ProcessorConfig::default())
    }

    /// Build a processor: construct and preload the mode's storage
    /// backend, spawn the worker pool, and start the scheduler thread.
    pub fn with_config(mode: CcMode, config: ProcessorConfig) -> Self {
        let backend = match mode {
            CcMode::Mvcc => {
                let storage = MvccStorage::new();
                storage.preload(config.preload_keys);
                Backend::Mvcc(storage)
            }
            _ => {
                let store = Store::new();
                store.preload(config.preload_keys);
                Backend::Single(store)
            }
        };
        let core = Arc::new(Core {
            mode,
            clock: MonotonicClock::new(),
            requests: WorkQueue::new(),
            completed: WorkQueue::new(),
            results: WorkQueue::new(),
            next_unique_id: AtomicU64::new(1),
            backend,
            locks: Mutex::new(LockState {
                manager: LockManager::new(),
                wounded: HashSet::new(),
            }),
            pool: StaticThreadPool::new(config.worker_threads),
        });
        let scheduler = {
            let core = Arc::clone(&core);
            std::thread::Builder::new()
                .name("strand-scheduler".to_string())
                .spawn(move || run_scheduler(&core))
                .expect("failed to spawn scheduler thread")
        };
        TxnProcessor {
            core,
            scheduler: Some(scheduler),
        }
    }

    /// The mode this processor was built in.
    pub fn mode(&self) -> CcMode {
        self.core.mode
    }

    /// Hand a transaction to the processor. Assigns its id and enqueues it
    /// without blocking.
    ///
    /// # Errors
    /// Returns [`StrandError::Shutdown`] once the processor has shut down.
    pub fn submit(&self, mut txn: Txn) -> StrandResult<()> {
        if !self.core.pool.is_active() {
            return Err(StrandError::Shutdown);
        }
        let id = self.core.fresh_id();
        txn.assign_id(id);
        tracing::trace!(txn_id = id, "transaction submitted");
        self.core.requests.push(txn);
        Ok(())
    }

    /// Block until the next transaction completes and return it, in
    /// completion (not submission) order. Never times out.
    pub fn get_result(&self) -> Txn {
        loop {
            if let Some(txn) = self.core.results.pop() {
                return txn;
            }
            std::thread::sleep(Duration::from_micros(10));
        }
    }

    /// Return the next completed transaction if one is already available.
    pub fn try_get_result(&self) -> Option<Txn> {
        self.core.results.pop()
    }

    /// Stop the scheduler thread and join the worker pool. In-flight
    /// transactions finish; queued requests are abandoned.
    pub fn shutdown(&mut self) {
        self.core.pool.shutdown();
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TxnProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_scheduler(core: &Arc<Core>) {
    match core.mode {
        CcMode::Serial => run_serial(core),
        CcMode::Locking => run_locking(core),
        CcMode::Occ => run_occ(core),
        CcMode::Mvcc => run_mvcc(core),
    }
}

// Serial: execute and commit each request inline on the scheduler thread.
// Commit order is submission order.
fn run_serial(core: &Arc<Core>) {
    while core.pool.is_active() {
        if let Some(mut txn) = core.requests.pop() {
            core.execute_txn(&mut txn);
            let txn = core.commit_or_abort(txn);
            core.results.push(txn);
        } else {
            std::thread::yield_now();
        }
    }
}

// Locking: hand each request to a worker, which acquires its whole lock
// foot-print before executing.
fn run_locking(core: &Arc<Core>) {
    while core.pool.is_active() {
        if let Some(txn) = core.requests.pop() {
            let worker_core = Arc::clone(core);
            if core
                .pool
                .run_task(move || lock_and_execute(&worker_core, txn))
                .is_err()
            {
                break;
            }
        } else {
            // Ready signals are bookkeeping the spinning workers do not
            // consume; keep the queue from accumulating.
            core.locks.lock().manager.drain_ready();
            std::thread::yield_now();
        }
    }
}

// Two-phase locking worker. Acquires read-set locks then write-set locks,
// each set in key order; that fixed order is what makes the locking
// deterministic. Conflicts resolve by wound-wait: a blocked requester
// waits on older owners and wounds younger ones, and a wounded transaction
// rolls itself back at its next acquisition step and retries under a
// fresh id.
fn lock_and_execute(core: &Arc<Core>, mut txn: Txn) {
    let plan: Vec<(Key, LockMode)> = txn
        .readset()
        .iter()
        .map(|&key| (key, LockMode::Shared))
        .chain(txn.writeset().iter().map(|&key| (key, LockMode::Exclusive)))
        .collect();

    for &(key, mode) in &plan {
        let mut traced_wait = false;
        loop {
            let mut state = core.locks.lock();
            if state.wounded.remove(&txn.unique_id()) {
                release_all(&mut state, &txn);
                drop(state);
                tracing::debug!(txn_id = txn.unique_id(), key, "wounded while acquiring");
                core.restart(txn, RestartReason::Wounded);
                return;
            }
            let granted = match mode {
                LockMode::Shared => state.manager.read_lock(txn.unique_id(), key),
                LockMode::Exclusive => state.manager.write_lock(txn.unique_id(), key),
            };
            if granted {
                break;
            }
            if !traced_wait {
                tracing::trace!(txn_id = txn.unique_id(), key, ?mode, "waiting for lock");
                traced_wait = true;
            }
            // Blocked: wait on older owners, wound younger ones. A younger
            // owner that has already finished acquiring holds every lock
            // it wants and will release soon; its stale mark is discarded
            // when it does.
            for owner in state.manager.status(key).owners() {
                if owner > txn.unique_id() && state.wounded.insert(owner) {
                    tracing::trace!(victim = owner, by = txn.unique_id(), key, "wound");
                }
            }
            drop(state);
            std::thread::yield_now();
        }
    }

    // Last look at the wound mark before leaving the acquisition phase;
    // from here on the transaction owns its whole foot-print and cannot
    // deadlock, so it is allowed to finish.
    {
        let mut state = core.locks.lock();
        if state.wounded.remove(&txn.unique_id()) {
            release_all(&mut state, &txn);
            drop(state);
            tracing::debug!(txn_id = txn.unique_id(), "wounded before execution");
            core.restart(txn, RestartReason::Wounded);
            return;
        }
    }

    core.execute_txn(&mut txn);
    let txn = core.commit_or_abort(txn);

    {
        let mut state = core.locks.lock();
        release_all(&mut state, &txn);
        // Discard a wound that arrived after the acquisition phase ended.
        state.wounded.remove(&txn.unique_id());
    }
    core.results.push(txn);
}

fn release_all(state: &mut LockState, txn: &Txn) {
    for &key in txn.readset() {
        state.manager.release(txn.unique_id(), key);
    }
    for &key in txn.writeset() {
        state.manager.release(txn.unique_id(), key);
    }
    state.manager.forget(txn.unique_id());
}

// Optimistic: workers execute against the live store without locks; this
// thread then validates completions one at a time, which makes commit
// order the validation order.
fn run_occ(core: &Arc<Core>) {
    while core.pool.is_active() {
        if let Some(mut txn) = core.requests.pop() {
            let worker_core = Arc::clone(core);
            let dispatched = core.pool.run_task(move || {
                worker_core.execute_txn(&mut txn);
                worker_core.completed.push(txn);
            });
            if dispatched.is_err() {
                break;
            }
        }

        while let Some(mut txn) = core.completed.pop() {
            match txn.status() {
                TxnStatus::CompletedAbort => {
                    // The program's own decision; no validation or retry.
                    txn.set_status(TxnStatus::Aborted);
                    core.results.push(txn);
                    continue;
                }
                TxnStatus::CompletedCommit => {}
                status => panic!("completed transaction has invalid status {status:?}"),
            }
            match validate_footprint(core, &txn) {
                Some(key) => {
                    core.restart(txn, RestartReason::ValidationConflict { key });
                }
                None => {
                    core.apply_writes(&txn);
                    txn.set_status(TxnStatus::Committed);
                    tracing::trace!(txn_id = txn.unique_id(), "committed");
                    core.results.push(txn);
                }
            }
        }
        std::thread::yield_now();
    }
}

// A transaction validates only if nothing in its foot-print was written
// after its attempt started. Returns the first conflicting key.
fn validate_footprint(core: &Core, txn: &Txn) -> Option<Key> {
    let store = core.store();
    txn.readset()
        .iter()
        .chain(txn.writeset().iter())
        .find(|&&key| store.timestamp(key) > txn.start_time())
        .copied()
}

// Multi-version: workers read under per-key mutexes, then admit their
// writes under all write-key mutexes at once.
fn run_mvcc(core: &Arc<Core>) {
    while core.pool.is_active() {
        if let Some(txn) = core.requests.pop() {
            let worker_core = Arc::clone(core);
            if core
                .pool
                .run_task(move || mvcc_execute(&worker_core, txn))
                .is_err()
            {
                break;
            }
        } else {
            std::thread::yield_now();
        }
    }
}

fn mvcc_execute(core: &Arc<Core>, mut txn: Txn) {
    txn.begin_attempt(core.clock.now());
    let storage = core.mvcc();
    let reader_id = txn.unique_id();
    let read_keys: Vec<_> = txn.readset().iter().copied().collect();
    for key in read_keys {
        if let Some(value) = storage.read(key, reader_id) {
            txn.record_read(key, value);
        }
    }
    let write_keys: Vec<_> = txn.writeset().iter().copied().collect();
    for key in write_keys {
        if let Some(value) = storage.read(key, reader_id) {
            txn.record_read(key, value);
        }
    }
    txn.run_program();

    match txn.status() {
        TxnStatus::CompletedAbort => {
            txn.set_status(TxnStatus::Aborted);
            tracing::trace!(txn_id = reader_id, "aborted by program");
            core.results.push(txn);
            return;
        }
        TxnStatus::CompletedCommit => {}
        status => panic!("completed transaction has invalid status {status:?}"),
    }

    // Admission: take every write-key mutex in key order, check them all,
    // then install them all, or restart under a fresh id.
    let chains: Vec<(Key, Arc<parking_lot::Mutex<VersionChain>>)> = txn
        .writeset()
        .iter()
        .map(|&key| (key, storage.chain(key)))
        .collect();
    let mut guards: Vec<_> = chains.iter().map(|(_, chain)| chain.lock()).collect();

    let mut rejected = None;
    for ((key, _), guard) in chains.iter().zip(guards.iter()) {
        if !guard.check_write(txn.unique_id()) {
            rejected = Some(*key);
            break;
        }
    }

    match rejected {
        Some(key) => {
            drop(guards);
            core.restart(txn, RestartReason::WriteRejected { key });
        }
        None => {
            for ((key, _), guard) in chains.iter().zip(guards.iter_mut()) {
                if let Some(&value) = txn.writes().get(key) {
                    guard.install(value, txn.unique_id());
                }
            }
            drop(guards);
            txn.set_status(TxnStatus::Committed);
            tracing::trace!(txn_id = txn.unique_id(), "committed");
            core.results.push(txn);
        }
    }
}
