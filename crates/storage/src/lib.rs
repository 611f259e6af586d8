//! In-memory record stores for the strand transaction processor
//!
//! Two backends share this crate:
//! - [`Store`]: a single-version map of `key -> (value, last-write stamp)`,
//!   used by the serial, locking, and optimistic schedulers
//! - [`MvccStorage`]: a per-key version chain guarded by a per-key mutex,
//!   used by the multi-version scheduler

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod mvcc;
pub mod store;

pub use mvcc::{MvccStorage, Version, VersionChain};
pub use store::Store;
