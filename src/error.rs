use std::time::Duration;

/// Errors surfaced by the Modbus-RTU codec and its transports.
///
/// Every variant is terminal for the call that produced it; nothing in
/// this crate retries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller supplied value is outside the protocol's valid domain.
    /// Detected before any I/O.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// The device stayed silent until the deadline elapsed.
    #[error("No response within {0:?}")]
    Timeout(Duration),
    /// Some bytes arrived, but not the number the operation requires.
    #[error("Incomplete response - expected={expected} received={actual} bytes")]
    IncompleteResponse { expected: usize, actual: usize },
    /// The frame has the expected length but fails the CRC16 check.
    #[error("CRC mismatch - calculated={calculated:#06X} received={received:#06X}")]
    CrcMismatch { calculated: u16, received: u16 },
    /// The frame is intact but does not answer the request that was sent.
    #[error("Unexpected response {field} - expected={expected:#X} received={received:#X}")]
    UnexpectedResponse {
        field: &'static str,
        expected: u16,
        received: u16,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_parameter(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
