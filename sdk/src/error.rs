//! SDK error types.
//!
//! Provides error types for validating domain values such as prices and
//! book levels.

/// SDK errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    /// Price outside the venue's 1-99 cent domain.
    #[error("invalid price: {0} (must be 1-99 cents)")]
    InvalidPrice(i64),

    /// Negative or otherwise unusable size.
    #[error("invalid size: {0}")]
    InvalidSize(i64),

    /// Unrecognised book side.
    #[error("invalid side: {0}")]
    InvalidSide(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SdkError::InvalidPrice(120);
        assert_eq!(err.to_string(), "invalid price: 120 (must be 1-99 cents)");
    }

    #[test]
    fn test_error_overflow() {
        let err = SdkError::Overflow;
        assert_eq!(err.to_string(), "arithmetic overflow");
    }
}
