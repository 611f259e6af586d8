//! Core types for the strand transaction processor
//!
//! This crate defines the foundational types shared by every layer:
//! - Key/Value: opaque 64-bit record identifiers and payloads
//! - TxnId: the monotone logical timestamp assigned per transaction attempt
//! - Timestamp: monotonic-clock readings used by optimistic validation
//! - ProcessorConfig: construction-time tuning knobs
//! - StrandError: the unified error type for the public API surface

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod types;

pub use config::ProcessorConfig;
pub use error::{StrandError, StrandResult};
pub use types::{Key, Timestamp, TxnId, Value};
