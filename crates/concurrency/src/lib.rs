//! Concurrency control for the strand transaction processor
//!
//! Four interchangeable schedulers over a shared transaction lifecycle:
//! - Serial: one transaction at a time, trivially serializable
//! - Locking: deterministic two-phase locking with wound-wait
//! - Occ: optimistic execution with a serial validation pass
//! - Mvcc: multi-version reads with per-key write admission
//!
//! Clients construct a [`TxnProcessor`] in one mode, [`submit`] transactions
//! carrying a declared read set, write set, and program, and collect each
//! one back from [`get_result`] as committed or aborted, with committed
//! writes applied to storage in a serializable order.
//!
//! [`submit`]: TxnProcessor::submit
//! [`get_result`]: TxnProcessor::get_result

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lock_manager;
pub mod processor;
pub mod txn;

pub use lock_manager::{LockManager, LockMode, LockStatus};
pub use processor::{CcMode, TxnProcessor};
pub use txn::{ProgramOutcome, Txn, TxnProgram, TxnStatus};
