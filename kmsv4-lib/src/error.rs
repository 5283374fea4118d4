use std::io;
use thiserror::Error;

/// Boxed error returned by policy implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The primary error type for the `kmsv4-lib` library.
#[derive(Error, Debug)]
pub enum KmsError {
    #[error("Contract violation: {what} must be {expected} bytes, got {actual}")]
    ContractViolation {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Payload of {0} bytes does not fit a u32 length field")]
    PayloadTooLarge(usize),

    #[error("Insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Length fields disagree: bodyLength1={first}, bodyLength2={second}")]
    LengthMismatch { first: u32, second: u32 },

    #[error("Invalid response marker: expected 0x00000200, got {0:#010x}")]
    InvalidMarker(u32),

    #[error("Body length {0} is too short to hold a 16-byte tag")]
    BodyTooShort(u32),

    #[error("Declared record size {expected} does not match {actual} bytes received")]
    DeclaredLengthMismatch { expected: usize, actual: usize },

    #[error("Tag does not match payload")]
    TagMismatch,

    #[error("Declared record size {declared} exceeds the {limit}-byte limit")]
    RecordTooLarge { declared: usize, limit: usize },

    #[error("Policy error")]
    Policy(#[source] BoxError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl KmsError {
    /// Malformed input from the peer; the request is rejected without a response.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            KmsError::InsufficientData { .. }
                | KmsError::LengthMismatch { .. }
                | KmsError::InvalidMarker(_)
                | KmsError::BodyTooShort(_)
                | KmsError::DeclaredLengthMismatch { .. }
                | KmsError::TagMismatch
                | KmsError::RecordTooLarge { .. }
        )
    }

    /// Programming error on our side; never worth retrying.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, KmsError::ContractViolation { .. } | KmsError::PayloadTooLarge(_))
    }
}
