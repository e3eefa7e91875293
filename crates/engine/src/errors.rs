//! Error types for the execution controller.

use std::time::Duration;

use graphrun_api::ApiError;
use graphrun_util::JsonStreamError;
use thiserror::Error;

/// Failures surfaced by [`crate::ExecutionController`] operations.
///
/// Whenever one of these ends a cycle the controller is already back to
/// `Idle` and no terminal lifecycle notification has been emitted.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("an execution is already running")]
    AlreadyRunning,

    #[error("no thread selected")]
    NoThreadSelected,

    #[error("no checkpoint to resume from")]
    NothingToResume,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Stream(#[from] JsonStreamError),

    #[error("execution cancelled")]
    Cancelled,

    #[error("execution timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

impl ExecutionError {
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }
}
