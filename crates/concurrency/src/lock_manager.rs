//! Lock manager: per-key shared/exclusive request queues
//!
//! Each key owns an ordered queue of lock requests in which every granted
//! request precedes every blocked one:
//! - if the head is exclusive, it is the sole owner and everything behind
//!   it waits;
//! - otherwise the prefix of shared requests up to the first exclusive
//!   request owns, and the exclusive request and everything after it wait.
//!
//! Granted shared requests are inserted at the front (joining the owner
//! prefix even while an exclusive request waits behind it); blocked
//! requests are appended. A queue that empties is dropped from the table.
//!
//! The manager is internally single-threaded: the locking scheduler holds
//! one global mutex across every call. Blocked transactions are tracked in
//! a wait-count map, and a transaction whose last blocking acquisition is
//! granted by a release is emitted on the ready queue exactly once.
//!
//! Acquisition is idempotent: re-requesting a `(txn, key)` pair that is
//! already queued reports current ownership instead of stacking duplicate
//! requests, so callers may poll the same acquisition until it is granted.

use std::collections::{HashMap, VecDeque};
use strand_core::{Key, TxnId};

/// Mode of a lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared access; compatible with other shared owners.
    Shared,
    /// Exclusive access; the sole owner.
    Exclusive,
}

/// What `status` reports for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    /// No requests are queued for the key.
    Unlocked,
    /// The shared owner group, in queue order.
    Shared(Vec<TxnId>),
    /// The single exclusive owner.
    Exclusive(TxnId),
}

impl LockStatus {
    /// The current owners, in queue order.
    pub fn owners(&self) -> Vec<TxnId> {
        match self {
            LockStatus::Unlocked => Vec::new(),
            LockStatus::Shared(owners) => owners.clone(),
            LockStatus::Exclusive(owner) => vec![*owner],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LockRequest {
    mode: LockMode,
    txn: TxnId,
}

// Ids of the requests currently granted: the head alone if exclusive,
// otherwise the shared prefix.
fn owner_ids(queue: &VecDeque<LockRequest>) -> Vec<TxnId> {
    match queue.front() {
        None => Vec::new(),
        Some(head) if head.mode == LockMode::Exclusive => vec![head.txn],
        Some(_) => queue
            .iter()
            .take_while(|request| request.mode == LockMode::Shared)
            .map(|request| request.txn)
            .collect(),
    }
}

enum Acquisition {
    Granted,
    // Granted by collapsing a queued upgrade into the existing shared
    // request; the queued request's wait contribution is retired.
    GrantedCollapse,
    Blocked,
    BlockedNewWait,
}

/// Per-key lock queues with wait-count and ready-queue bookkeeping.
pub struct LockManager {
    lock_table: HashMap<Key, VecDeque<LockRequest>>,
    txn_waits: HashMap<TxnId, usize>,
    ready: VecDeque<TxnId>,
}

impl LockManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        LockManager {
            lock_table: HashMap::new(),
            txn_waits: HashMap::new(),
            ready: VecDeque::new(),
        }
    }

    /// Request a shared lock on `key` for `txn`. Returns whether the lock
    /// is held on return.
    pub fn read_lock(&mut self, txn: TxnId, key: Key) -> bool {
        let acquisition = {
            let queue = self.lock_table.entry(key).or_default();
            let owners = owner_ids(queue).len();
            if let Some(pos) = queue.iter().position(|request| request.txn == txn) {
                if pos < owners {
                    Acquisition::Granted
                } else {
                    Acquisition::Blocked
                }
            } else {
                match queue.front() {
                    None => {
                        queue.push_front(LockRequest {
                            mode: LockMode::Shared,
                            txn,
                        });
                        Acquisition::Granted
                    }
                    Some(head) if head.mode == LockMode::Shared => {
                        queue.push_front(LockRequest {
                            mode: LockMode::Shared,
                            txn,
                        });
                        Acquisition::Granted
                    }
                    Some(_) => {
                        queue.push_back(LockRequest {
                            mode: LockMode::Shared,
                            txn,
                        });
                        Acquisition::BlockedNewWait
                    }
                }
            }
        };
        self.settle(txn, acquisition)
    }

    /// Request an exclusive lock on `key` for `txn`. Returns whether the
    /// lock is held on return.
    ///
    /// A transaction that already holds the key shared and alone is
    /// upgraded in place; one that already holds it exclusive is granted
    /// idempotently. Otherwise the exclusive request queues behind the
    /// current owners.
    pub fn write_lock(&mut self, txn: TxnId, key: Key) -> bool {
        let acquisition = {
            let queue = self.lock_table.entry(key).or_default();
            let owners = owner_ids(queue).len();
            let shared_pos = queue
                .iter()
                .position(|r| r.txn == txn && r.mode == LockMode::Shared);
            let exclusive_pos = queue
                .iter()
                .position(|r| r.txn == txn && r.mode == LockMode::Exclusive);
            match (shared_pos, exclusive_pos) {
                // Already the exclusive owner.
                (_, Some(pos)) if pos < owners => Acquisition::Granted,
                // Sole shared owner with a queued upgrade: collapse the
                // queued request into an in-place upgrade.
                (Some(pos), Some(upgrade)) if pos < owners && owners == 1 => {
                    let _ = queue.remove(upgrade);
                    queue[pos].mode = LockMode::Exclusive;
                    Acquisition::GrantedCollapse
                }
                // An exclusive request is already queued and still blocked.
                (_, Some(_)) => Acquisition::Blocked,
                (Some(pos), None) => {
                    if pos < owners && owners == 1 {
                        // Sole shared owner: upgrade in place.
                        queue[pos].mode = LockMode::Exclusive;
                        Acquisition::Granted
                    } else if pos < owners {
                        // Shared owner with company: queue the upgrade.
                        queue.push_back(LockRequest {
                            mode: LockMode::Exclusive,
                            txn,
                        });
                        Acquisition::BlockedNewWait
                    } else {
                        // A blocked shared request escalates in place; its
                        // wait contribution carries over.
                        queue[pos].mode = LockMode::Exclusive;
                        Acquisition::Blocked
                    }
                }
                (None, None) => {
                    if queue.is_empty() {
                        queue.push_back(LockRequest {
                            mode: LockMode::Exclusive,
                            txn,
                        });
                        Acquisition::Granted
                    } else {
                        queue.push_back(LockRequest {
                            mode: LockMode::Exclusive,
                            txn,
                        });
                        Acquisition::BlockedNewWait
                    }
                }
            }
        };
        self.settle(txn, acquisition)
    }

    fn settle(&mut self, txn: TxnId, acquisition: Acquisition) -> bool {
        match acquisition {
            Acquisition::Granted => true,
            Acquisition::GrantedCollapse => {
                self.retire_wait(txn, false);
                true
            }
            Acquisition::Blocked => false,
            Acquisition::BlockedNewWait => {
                *self.txn_waits.entry(txn).or_insert(0) += 1;
                false
            }
        }
    }

    /// Release `txn`'s request on `key`, granted or not. Idempotent: a
    /// pair that holds no request is a no-op. Requests promoted into the
    /// owner group by the removal have their wait counts retired, and a
    /// transaction whose count reaches zero lands on the ready queue.
    pub fn release(&mut self, txn: TxnId, key: Key) {
        let Some(queue) = self.lock_table.get_mut(&key) else {
            return;
        };
        let Some(pos) = queue.iter().position(|request| request.txn == txn) else {
            return;
        };
        let owners_before = owner_ids(queue);
        let was_waiting = pos >= owners_before.len();
        let _ = queue.remove(pos);
        let owners_after = owner_ids(queue);
        let now_empty = queue.is_empty();

        if was_waiting {
            // The request left the queue without ever being granted; its
            // wait contribution disappears without a ready signal.
            self.retire_wait(txn, false);
        }
        for &owner in &owners_after {
            if !owners_before.contains(&owner) {
                self.retire_wait(owner, true);
            }
        }
        if now_empty {
            self.lock_table.remove(&key);
        }
    }

    // Drop one wait contribution for `txn`; when the count reaches zero
    // the transaction is emitted on the ready queue (at most once per
    // zero-crossing) if `signal` is set.
    fn retire_wait(&mut self, txn: TxnId, signal: bool) {
        if let Some(count) = self.txn_waits.get_mut(&txn) {
            *count -= 1;
            if *count == 0 {
                self.txn_waits.remove(&txn);
                if signal {
                    self.ready.push_back(txn);
                }
            }
        }
    }

    /// Current lock state of `key`: the owner group and its mode.
    pub fn status(&self, key: Key) -> LockStatus {
        let Some(queue) = self.lock_table.get(&key) else {
            return LockStatus::Unlocked;
        };
        match queue.front() {
            None => LockStatus::Unlocked,
            Some(head) if head.mode == LockMode::Exclusive => LockStatus::Exclusive(head.txn),
            Some(_) => LockStatus::Shared(owner_ids(queue)),
        }
    }

    /// Pop the next transaction whose final blocking acquisition was
    /// granted by a release.
    pub fn pop_ready(&mut self) -> Option<TxnId> {
        self.ready.pop_front()
    }

    /// Discard all pending ready signals.
    pub fn drain_ready(&mut self) {
        self.ready.clear();
    }

    /// True while `txn` has blocked acquisitions outstanding.
    pub fn is_waiting(&self, txn: TxnId) -> bool {
        self.txn_waits.contains_key(&txn)
    }

    /// Drop all bookkeeping for `txn` (wait counts and ready signals)
    /// after its requests have been released, e.g. on a wound-wait
    /// rollback.
    pub fn forget(&mut self, txn: TxnId) {
        self.txn_waits.remove(&txn);
        self.ready.retain(|&ready| ready != txn);
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
