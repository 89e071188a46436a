use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use shopkit_core::DataError;

pub type HandlerResult<T> = Result<T, HandlerError>;

/// Error returned by application handlers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("missing parameter: {0}")]
    MissingParam(String),

    #[error("invalid parameter {name}: '{value}'")]
    InvalidParam { name: String, value: String },
}

impl HandlerError {
    pub fn invalid_param(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Stable machine-readable code for outer layers.
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::Data(err) => err.kind(),
            HandlerError::MissingParam(_) => "missing_param",
            HandlerError::InvalidParam { .. } => "invalid_param",
        }
    }

    /// `{"error": code, "message": ..}` body.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "error": self.code(),
            "message": self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_errors_keep_their_kind() {
        let err = HandlerError::from(DataError::not_found("1"));
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.to_string(), DataError::not_found("1").to_string());
    }

    #[test]
    fn json_body_carries_code_and_message() {
        let body = HandlerError::invalid_param("id", "abc").to_json();
        assert_eq!(body["error"], "invalid_param");
        assert_eq!(body["message"], "invalid parameter id: 'abc'");
    }
}
