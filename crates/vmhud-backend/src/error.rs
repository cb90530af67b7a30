//! Gateway error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a [`RemoteApi`](crate::gateway::RemoteApi) call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The remote-control library could not be located or loaded
    #[error("Remote library not available: {0}")]
    LibraryMissing(String),

    /// The library loaded but lacks an expected export
    #[error("Remote library {path:?} has no symbol {symbol}")]
    SymbolMissing { path: PathBuf, symbol: &'static str },

    /// A call returned a nonzero status code
    #[error("{call} returned {code}")]
    Call { call: &'static str, code: i32 },

    /// Parameter name can't be passed across the C boundary
    #[error("Invalid parameter name {0:?}")]
    InvalidName(String),

    /// The engine session went away underneath us
    #[error("Engine connection lost")]
    EngineLost,
}

impl GatewayError {
    /// Whether this failure means the session is gone (as opposed to one
    /// parameter being unreadable)
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::LibraryMissing(_)
                | GatewayError::SymbolMissing { .. }
                | GatewayError::EngineLost
        )
    }
}

/// Result type for gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;
