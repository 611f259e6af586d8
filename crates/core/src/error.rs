//! Error types for the strand transaction processor
//!
//! The public API surface has exactly one failure mode: interacting with a
//! processor (or its worker pool) after it has shut down. Everything the
//! schedulers recover from internally (optimistic validation conflicts,
//! multi-version write rejections, wound-wait rollbacks) never surfaces
//! as an error; those transactions are silently restarted and the client
//! only ever observes a committed or aborted result.

use thiserror::Error;

/// Unified error type for the processor API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StrandError {
    /// The processor has shut down and no longer accepts work.
    #[error("processor has shut down and no longer accepts work")]
    Shutdown,
}

/// Result alias used across the workspace.
pub type StrandResult<T> = Result<T, StrandError>;
