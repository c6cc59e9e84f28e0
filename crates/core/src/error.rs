//! Rejections raised by the pure domain crates.
//!
//! Storage and capability failures never show up here; infra wraps this type
//! in its own error enums.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Operator or platform input that can never be applied as given:
    /// negative threshold, blank title, malformed email, out-of-range offset.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A rule was asked to combine records that do not belong together,
    /// e.g. a fact for one key applied to another key's item.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A shop, product or variant reference that is blank after trimming.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_rejected_detail() {
        assert_eq!(
            DomainError::validation("threshold quantity cannot be negative").to_string(),
            "validation failed: threshold quantity cannot be negative"
        );
        assert_eq!(
            DomainError::invalid_id("ShopId: blank").to_string(),
            "invalid identifier: ShopId: blank"
        );
    }
}
