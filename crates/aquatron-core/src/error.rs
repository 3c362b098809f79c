use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Frame and payload errors
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Invalid feedback payload: expected {expected} bytes, got {actual}")]
    InvalidFeedbackPayload { expected: usize, actual: usize },

    #[error("Invalid settings payload: {0}")]
    InvalidSettingsPayload(String),

    // Configuration errors (rejected before any I/O)
    #[error("Invalid element count: {0} (must be 1-30)")]
    InvalidElementCount(usize),

    #[error("Invalid element symbol: '{0}'")]
    InvalidElementSymbol(String),

    #[error("Invalid transport mode: '{0}'")]
    InvalidTransportMode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    // Correlation errors
    #[error("Timeout after {timeout_ms}ms waiting for {kind}")]
    Timeout { kind: String, timeout_ms: u64 },

    #[error("A request waiting for {0} is already pending")]
    RequestPending(String),

    #[error("Request waiting for {0} was cancelled")]
    Cancelled(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error came from a correlator timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::InvalidFeedbackPayload {
            expected: 47,
            actual: 46,
        };
        assert_eq!(
            error.to_string(),
            "Invalid feedback payload: expected 47 bytes, got 46"
        );

        let error = Error::Timeout {
            kind: "device-ready".to_string(),
            timeout_ms: 2000,
        };
        assert_eq!(
            error.to_string(),
            "Timeout after 2000ms waiting for device-ready"
        );
        assert!(error.is_timeout());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let error: Error = io.into();
        assert!(matches!(error, Error::Io(_)));
        assert!(!error.is_timeout());
    }
}
