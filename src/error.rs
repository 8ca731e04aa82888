//! Error types for PREP middleware operations.
//!
//! Negotiation and precondition failures are *not* errors: they are returned
//! as status-carrying [`EventsHeader`](crate::types::EventsHeader) values so
//! that callers can serialize them into the `Events` response header. The
//! variants here cover genuine faults.
//!
//! | Category | Variants | Surfaced as |
//! |----------|----------|-------------|
//! | Protocol | `HeaderParse`, `Serialize` | 500 on the offending request |
//! | Configuration | `Config` | 500, logged at startup or configure time |

use thiserror::Error;

/// Result type for PREP operations.
pub type Result<T> = std::result::Result<T, PrepError>;

/// Errors that can occur inside the PREP middleware.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PrepError {
    /// Failed to parse a structured-field header value.
    ///
    /// Covers both RFC 8941 syntax errors and the nested-parameter extension
    /// used by `Accept-Events` offers.
    #[error("Header parse error: {0}")]
    HeaderParse(String),

    /// Failed to serialize a structured-field value into a header string.
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Invalid middleware configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PrepError::HeaderParse("unterminated string".into());
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn test_serialize_error_display() {
        let err = PrepError::Serialize("bad token".into());
        assert!(err.to_string().contains("bad token"));
    }

    #[test]
    fn test_config_error_display() {
        let err = PrepError::Config("empty accept list".into());
        assert!(err.to_string().contains("empty accept list"));
    }
}
