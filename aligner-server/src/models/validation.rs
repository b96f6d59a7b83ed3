//! Validation error types

use std::fmt;

/// Validation error for domain models
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Required field was not supplied
    Missing { field: &'static str },

    /// Field is empty when it shouldn't be
    Empty { field: &'static str },

    /// Field exceeds maximum length
    TooLong { field: &'static str, max: usize },

    /// Value doesn't match required format
    InvalidFormat { field: &'static str, reason: &'static str },

    /// Numeric value outside its accepted range
    OutOfRange { field: &'static str, value: String, expected: &'static str },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { field } => write!(f, "{} is required", field),
            Self::Empty { field } => write!(f, "{} cannot be empty", field),
            Self::TooLong { field, max } => {
                write!(f, "{} exceeds maximum length of {} characters", field, max)
            }
            Self::InvalidFormat { field, reason } => {
                write!(f, "{}: {}", field, reason)
            }
            Self::OutOfRange {
                field,
                value,
                expected,
            } => {
                write!(f, "{} value {} is out of range (expected {})", field, value, expected)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ValidationError::TooLong {
            field: "awId",
            max: 255,
        };
        assert_eq!(
            err.to_string(),
            "awId exceeds maximum length of 255 characters"
        );

        let err = ValidationError::Missing { field: "userId" };
        assert_eq!(err.to_string(), "userId is required");
    }

    #[test]
    fn out_of_range_display() {
        let err = ValidationError::OutOfRange {
            field: "gaussianBlur",
            value: "4".into(),
            expected: "a positive odd number",
        };
        assert_eq!(
            err.to_string(),
            "gaussianBlur value 4 is out of range (expected a positive odd number)"
        );
    }
}
