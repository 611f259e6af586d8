//! Transaction object and program contract
//!
//! A [`Txn`] carries the client's declared read and write sets, the buffered
//! reads and writes of the current attempt, a status that moves monotonically
//! within an attempt, and the opaque program that turns reads into writes.
//!
//! Restarting schedulers (optimistic validation failures, multi-version
//! write rejections, wound-wait rollbacks) reset an attempt with
//! [`Txn::reset_for_retry`]: buffers are cleared, the status returns to
//! `Incomplete`, and the processor hands out a fresh, larger id.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use strand_core::{Key, Timestamp, TxnId, Value};

/// Lifecycle status of a transaction attempt.
///
/// Within one attempt the transitions are monotone:
/// `Incomplete` → `CompletedCommit` → `Committed`, or
/// `Incomplete` → `CompletedAbort` → `Aborted`. A restart returns the
/// transaction to `Incomplete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    /// Not yet executed (or reset for a retry).
    Incomplete,
    /// The program ran and asked to commit; the scheduler has not yet
    /// applied the writes.
    CompletedCommit,
    /// The program ran and asked to abort.
    CompletedAbort,
    /// Writes applied; the terminal success state.
    Committed,
    /// Surfaced to the client as aborted; the terminal failure state.
    Aborted,
}

/// What a transaction program decided, given its reads.
pub enum ProgramOutcome {
    /// Commit, installing the produced writes.
    Commit(HashMap<Key, Value>),
    /// Abort; nothing is written.
    Abort,
}

/// The opaque program at the heart of a transaction: a pure function of
/// the buffered reads. It must not touch storage or other transactions;
/// schedulers may run it several times across restarts.
pub trait TxnProgram: Send {
    /// Produce the transaction's writes (or an abort decision) from the
    /// values read for its read and write sets.
    fn run(&self, reads: &HashMap<Key, Value>) -> ProgramOutcome;
}

impl<F> TxnProgram for F
where
    F: Fn(&HashMap<Key, Value>) -> ProgramOutcome + Send,
{
    fn run(&self, reads: &HashMap<Key, Value>) -> ProgramOutcome {
        self(reads)
    }
}

/// A transaction: declared key sets, buffered attempt state, and program.
pub struct Txn {
    unique_id: TxnId,
    readset: BTreeSet<Key>,
    writeset: BTreeSet<Key>,
    reads: HashMap<Key, Value>,
    writes: HashMap<Key, Value>,
    status: TxnStatus,
    start_time: Timestamp,
    program: Box<dyn TxnProgram>,
}

impl Txn {
    /// Create a transaction over fixed read and write sets. The id stays 0
    /// until the processor assigns one at submission.
    pub fn new(
        readset: BTreeSet<Key>,
        writeset: BTreeSet<Key>,
        program: impl TxnProgram + 'static,
    ) -> Self {
        Txn {
            unique_id: 0,
            readset,
            writeset,
            reads: HashMap::new(),
            writes: HashMap::new(),
            status: TxnStatus::Incomplete,
            start_time: 0,
            program: Box::new(program),
        }
    }

    /// The id of the current attempt. Strictly positive once submitted.
    pub fn unique_id(&self) -> TxnId {
        self.unique_id
    }

    /// Keys the transaction declared it will read.
    pub fn readset(&self) -> &BTreeSet<Key> {
        &self.readset
    }

    /// Keys the transaction declared it may write.
    pub fn writeset(&self) -> &BTreeSet<Key> {
        &self.writeset
    }

    /// Values read during the current attempt.
    pub fn reads(&self) -> &HashMap<Key, Value> {
        &self.reads
    }

    /// Writes the program produced during the current attempt.
    pub fn writes(&self) -> &HashMap<Key, Value> {
        &self.writes
    }

    /// Current lifecycle status.
    pub fn status(&self) -> TxnStatus {
        self.status
    }

    /// Monotonic-clock reading taken at the start of the current attempt.
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// True once the transaction has committed.
    pub fn is_committed(&self) -> bool {
        self.status == TxnStatus::Committed
    }

    /// True once the transaction has aborted.
    pub fn is_aborted(&self) -> bool {
        self.status == TxnStatus::Aborted
    }

    pub(crate) fn assign_id(&mut self, id: TxnId) {
        self.unique_id = id;
    }

    pub(crate) fn begin_attempt(&mut self, now: Timestamp) {
        self.start_time = now;
    }

    pub(crate) fn record_read(&mut self, key: Key, value: Value) {
        self.reads.insert(key, value);
    }

    /// Run the program over the buffered reads, setting the status to the
    /// completed state matching its decision.
    pub(crate) fn run_program(&mut self) {
        match self.program.run(&self.reads) {
            ProgramOutcome::Commit(writes) => {
                self.writes = writes;
                self.status = TxnStatus::CompletedCommit;
            }
            ProgramOutcome::Abort => {
                self.writes.clear();
                self.status = TxnStatus::CompletedAbort;
            }
        }
    }

    /// Promote a completed attempt to its terminal state.
    pub(crate) fn set_status(&mut self, status: TxnStatus) {
        debug_assert!(
            matches!(
                (self.status, status),
                (TxnStatus::CompletedCommit, TxnStatus::Committed)
                    | (TxnStatus::CompletedAbort, TxnStatus::Aborted)
            ),
            "illegal status transition {:?} -> {:?}",
            self.status,
            status
        );
        self.status = status;
    }

    /// Clear the attempt's buffers and return to `Incomplete` ahead of a
    /// restart with a fresh id.
    pub(crate) fn reset_for_retry(&mut self) {
        self.reads.clear();
        self.writes.clear();
        self.status = TxnStatus::Incomplete;
    }
}

impl fmt::Debug for Txn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Txn")
            .field("unique_id", &self.unique_id)
            .field("readset", &self.readset)
            .field("writeset", &self.writeset)
            .field("status", &self.status)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_program(key: Key) -> impl TxnProgram + 'static {
        move |reads: &HashMap<Key, Value>| {
            let current = reads.get(&key).copied().unwrap_or(0);
            ProgramOutcome::Commit(HashMap::from([(key, current + 1)]))
        }
    }

    #[test]
    fn new_txn_is_incomplete_and_unassigned() {
        let txn = Txn::new(BTreeSet::from([1]), BTreeSet::from([1]), copy_program(1));
        assert_eq!(txn.unique_id(), 0);
        assert_eq!(txn.status(), TxnStatus::Incomplete);
        assert!(txn.reads().is_empty());
        assert!(txn.writes().is_empty());
    }

    #[test]
    fn commit_program_buffers_writes() {
        let mut txn = Txn::new(BTreeSet::from([1]), BTreeSet::from([1]), copy_program(1));
        txn.record_read(1, 41);
        txn.run_program();
        assert_eq!(txn.status(), TxnStatus::CompletedCommit);
        assert_eq!(txn.writes().get(&1), Some(&42));
    }

    #[test]
    fn abort_program_buffers_nothing() {
        let mut txn = Txn::new(
            BTreeSet::from([1]),
            BTreeSet::new(),
            |_reads: &HashMap<Key, Value>| ProgramOutcome::Abort,
        );
        txn.record_read(1, 5);
        txn.run_program();
        assert_eq!(txn.status(), TxnStatus::CompletedAbort);
        assert!(txn.writes().is_empty());
    }

    #[test]
    fn reset_clears_attempt_state() {
        let mut txn = Txn::new(BTreeSet::from([1]), BTreeSet::from([1]), copy_program(1));
        txn.record_read(1, 10);
        txn.run_program();
        txn.reset_for_retry();
        assert_eq!(txn.status(), TxnStatus::Incomplete);
        assert!(txn.reads().is_empty());
        assert!(txn.writes().is_empty());
    }

    #[test]
    fn rerunning_after_reset_uses_fresh_reads() {
        let mut txn = Txn::new(BTreeSet::from([1]), BTreeSet::from([1]), copy_program(1));
        txn.record_read(1, 0);
        txn.run_program();
        assert_eq!(txn.writes().get(&1), Some(&1));

        txn.reset_for_retry();
        txn.record_read(1, 7);
        txn.run_program();
        assert_eq!(txn.writes().get(&1), Some(&8));
    }

    #[test]
    fn completed_attempts_promote_to_terminal_states() {
        let mut txn = Txn::new(BTreeSet::new(), BTreeSet::from([1]), copy_program(1));
        txn.run_program();
        txn.set_status(TxnStatus::Committed);
        assert!(txn.is_committed());
    }
}
