//! Error types for Trellis core values

use thiserror::Error;

use crate::operation::OperationStatus;

/// Errors raised by core value types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A deferred operation result was resumed after it had already resolved
    #[error("operation result already resolved as {status:?}")]
    AlreadyResolved { status: OperationStatus },

    /// A deferred operation result was resumed while it was still waiting on
    /// the pending result it was previously resumed with
    #[error("operation result is already waiting on another pending result")]
    AlreadyAwaiting,
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
