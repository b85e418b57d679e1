//! Error taxonomy for the bot engines.

use std::fmt;

/// Errors returned by engine operations to the command layer.
///
/// Timer races are deliberately absent: a resolve or fire path that finds
/// its record already gone treats that as success, not an error.
#[derive(Debug)]
pub enum EngineError {
    /// Malformed user input (bad time string, bad index). No state was mutated.
    Validation(String),
    /// The operation targeted a record that does not exist.
    NotFound(String),
    /// The requester is not allowed to perform the operation.
    Forbidden,
    /// Upstream provider failure.
    Provider(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::NotFound(msg) => write!(f, "{msg}"),
            Self::Forbidden => write!(f, "🔒 This command is for admins only!"),
            Self::Provider(msg) => write!(f, "provider error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_carries_message() {
        let err = EngineError::Validation("invalid time".to_string());
        assert_eq!(err.to_string(), "invalid time");
    }

    #[test]
    fn test_forbidden_is_user_facing() {
        assert!(EngineError::Forbidden.to_string().contains("admins only"));
    }
}
