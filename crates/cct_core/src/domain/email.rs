use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Validated e-mail address. Only checks for a non-blank value containing `@`;
/// deliverability is the notifier's problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        if value.trim().is_empty() || !value.contains('@') {
            return Err(DomainError::validation(
                "EMAIL_INVALID",
                "Email must be non-empty and contain '@'",
            ));
        }
        Ok(Self(value.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Email {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Email::parse(s)
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Email::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_trims() {
        assert_eq!(Email::parse("a@b.com").unwrap().as_str(), "a@b.com");
        assert_eq!(Email::parse("  ops@example.org \n").unwrap().as_str(), "ops@example.org");
    }

    #[test]
    fn rejects_blank_and_missing_at() {
        for bad in ["", "   ", "nodomain"] {
            let err = Email::parse(bad).unwrap_err();
            assert!(err.is_validation(), "expected validation error for {bad:?}");
            assert_eq!(err.code(), "EMAIL_INVALID");
        }
    }

    #[test]
    fn deserialization_goes_through_validation() {
        let ok: Email = serde_json::from_str("\" x@y.z \"").unwrap();
        assert_eq!(ok.as_str(), "x@y.z");
        assert!(serde_json::from_str::<Email>("\"broken\"").is_err());
    }
}
