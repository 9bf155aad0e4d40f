use thiserror::Error;

/// Failures surfaced by the routing, liquidity and aggregation layers.
///
/// Transport and response failures are isolated per call or per chunk by the
/// callers; only `InvalidRange`/`InvalidPath` reach users as hard errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("transport failure: {0}")]
    TransientTransport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no liquidity for route")]
    NoLiquidity,

    #[error("invalid price range: {0}")]
    InvalidRange(String),

    #[error("invalid swap path: {0}")]
    InvalidPath(String),

    #[error("operation already in progress: {0}")]
    OperationInProgress(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Only transport failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::TransientTransport(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::TransientTransport(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_transient() {
        assert!(EngineError::TransientTransport("timeout".into()).is_transient());
        assert!(!EngineError::MalformedResponse("short".into()).is_transient());
        assert!(!EngineError::NoLiquidity.is_transient());
        assert!(!EngineError::InvalidRange("price <= 0".into()).is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = EngineError::OperationInProgress("pool-refresh".into());
        assert_eq!(err.to_string(), "operation already in progress: pool-refresh");
    }
}
