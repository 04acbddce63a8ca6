use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape used across storage and service layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

/// Failure of a domain operation. Raised before any mutation takes place, so the
/// aggregate is left exactly as it was.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainError {
    /// Malformed value object or missing required text.
    Validation { code: String, message: String },
    /// The acting user lacks the capability for the operation.
    Authorization { code: String, message: String },
}

impl DomainError {
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn authorization(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authorization {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Validation { code, .. } | Self::Authorization { code, .. } => code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. } | Self::Authorization { message, .. } => message,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization { .. })
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message())
    }
}

impl std::error::Error for DomainError {}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        let code = match &err {
            DomainError::Validation { .. } => "DOMAIN_VALIDATION",
            DomainError::Authorization { .. } => "DOMAIN_UNAUTHORIZED",
        };
        AppError::new(code, err.message().to_string()).with_details(err.code().to_string())
    }
}
