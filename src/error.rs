//! Outcomes of a single handler call.

use crate::jsonrpc;
use thiserror::Error;

/// Reason a call to a method handler did not produce a result.
///
/// Cancellation is kept apart from domain failures so a dispatcher can answer the client without
/// surfacing it to the user as an error.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum HandlerError {
    /// The cancellation signal fired before the handler completed.
    #[error("request was cancelled")]
    Cancelled,
    /// The handler could not produce a valid result.
    #[error(transparent)]
    Failed(jsonrpc::Error),
}

impl HandlerError {
    /// Returns `true` if the call was cancelled rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HandlerError::Cancelled)
    }

    /// Converts the outcome into the error object sent back to the client.
    pub fn into_rpc_error(self) -> jsonrpc::Error {
        match self {
            HandlerError::Cancelled => jsonrpc::Error::request_cancelled(),
            HandlerError::Failed(error) => error,
        }
    }
}

impl From<jsonrpc::Error> for HandlerError {
    fn from(error: jsonrpc::Error) -> Self {
        if error.is_cancellation() {
            HandlerError::Cancelled
        } else {
            HandlerError::Failed(error)
        }
    }
}

/// Error that occurs when calling a [`HandlerService`] after it has been shut down.
///
/// [`HandlerService`]: crate::HandlerService
#[derive(Clone, Debug, Error, PartialEq)]
#[error("handler service has shut down")]
pub struct ClosedError;
