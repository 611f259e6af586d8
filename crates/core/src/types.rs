//! Foundational scalar types
//!
//! Records are opaque integers: a `Key` names a record, a `Value` is its
//! payload. Neither carries structure beyond equality, hashing, and the
//! total order the deterministic lock-acquisition phase relies on.

/// Identifies a record in storage.
pub type Key = u64;

/// The payload of a record.
pub type Value = u64;

/// Logical timestamp of a transaction attempt.
///
/// Strictly positive, assigned once at submission, and reassigned (always
/// growing) when a scheduler restarts an attempt. Ids are never reused, so
/// a smaller id always means an older transaction.
pub type TxnId = u64;

/// A reading of the process-local monotonic clock, in nanoseconds since the
/// clock was created. 0 means "never", e.g. a record that has not been
/// written since preload.
pub type Timestamp = u64;
