//! Error handling for the query resolution pipeline
//!
//! This module provides idiomatic Rust error types using thiserror for
//! better error messages and proper error chain handling. Every variant
//! maps to a stable wire code via [`QueryError::code`]; the human-facing
//! boundary text comes from [`QueryError::user_message`].

use thiserror::Error;

/// Maximum number of follow-up refinements a conversation may apply.
pub const MAX_FOLLOW_UP_DEPTH: u32 = 3;

/// Main error type for the query pipeline
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Classification failed for '{question}': {reason}")]
    Classification { question: String, reason: String },

    #[error("Invalid filter range: {filter} minimum {min} exceeds maximum {max}")]
    InvalidFilterRange { filter: String, min: f64, max: f64 },

    #[error("Follow-up limit exceeded: {depth} refinements already applied (maximum {max})")]
    FollowUpLimitExceeded { depth: u32, max: u32 },

    #[error("Unknown query function '{name}'")]
    UnknownFunction { name: String },

    #[error("Transient connection failure after {attempts} attempts: {message}")]
    TransientConnection { attempts: u32, message: String },

    #[error("Query execution failed: {message}")]
    Execution { message: String },
}

impl QueryError {
    /// Stable machine-readable code carried in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidRequest { .. } => "invalid_request",
            QueryError::Classification { .. } => "classification_error",
            QueryError::InvalidFilterRange { .. } => "invalid_filter_range",
            QueryError::FollowUpLimitExceeded { .. } => "follow_up_limit_exceeded",
            QueryError::UnknownFunction { .. } => "unknown_function",
            QueryError::TransientConnection { .. } => "transient_connection_error",
            QueryError::Execution { .. } => "execution_error",
        }
    }

    /// Human-facing message for response envelopes. Diagnostic detail stays
    /// in the `Display` impl and the logs; this text is safe to show a user.
    pub fn user_message(&self) -> String {
        match self {
            QueryError::InvalidRequest { message } => message.clone(),
            QueryError::Classification { question, .. } => format!(
                "Could not understand the question: '{}'. Please try rephrasing.",
                question
            ),
            QueryError::InvalidFilterRange { filter, min, max } => format!(
                "The {} range is invalid: minimum {} is greater than maximum {}.",
                filter, min, max
            ),
            QueryError::FollowUpLimitExceeded { max, .. } => format!(
                "This conversation has reached the limit of {} follow-up questions. Please start a new question.",
                max
            ),
            QueryError::UnknownFunction { name } => {
                format!("The query type '{}' is not supported.", name)
            }
            QueryError::TransientConnection { .. } => {
                "The data store is temporarily unreachable. Please try again.".to_string()
            }
            QueryError::Execution { .. } => {
                "The query could not be executed against the data store.".to_string()
            }
        }
    }

    /// Shorthand for an empty/blank question rejection.
    pub fn empty_question() -> Self {
        QueryError::InvalidRequest {
            message: "Question must not be empty".to_string(),
        }
    }

    pub fn classification(question: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::Classification {
            question: question.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for pipeline operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes_are_stable() {
        assert_eq!(QueryError::empty_question().code(), "invalid_request");
        assert_eq!(
            QueryError::classification("q", "r").code(),
            "classification_error"
        );
        assert_eq!(
            QueryError::FollowUpLimitExceeded {
                depth: 3,
                max: MAX_FOLLOW_UP_DEPTH
            }
            .code(),
            "follow_up_limit_exceeded"
        );
        assert_eq!(
            QueryError::TransientConnection {
                attempts: 3,
                message: "reset".to_string()
            }
            .code(),
            "transient_connection_error"
        );
        assert_eq!(
            QueryError::UnknownFunction {
                name: "mystery".to_string()
            }
            .code(),
            "unknown_function"
        );
    }

    #[test]
    fn test_classification_user_message() {
        let err = QueryError::classification("show me the things", "model returned none");
        assert_eq!(
            err.user_message(),
            "Could not understand the question: 'show me the things'. Please try rephrasing."
        );
        // Diagnostic reason is kept out of the user message but stays in Display.
        assert!(err.to_string().contains("model returned none"));
    }

    #[test]
    fn test_range_error_construction() {
        let err = QueryError::InvalidFilterRange {
            filter: "fee".to_string(),
            min: 5_000_000.0,
            max: 1_000_000.0,
        };
        assert!(matches!(err, QueryError::InvalidFilterRange { .. }));
        assert!(err.user_message().contains("minimum"));
    }
}
