pub mod config;
pub mod db;
pub mod demo;
pub mod domain;
pub mod error;
pub mod identity;
pub mod notify;
pub mod repo;
pub mod service;
pub mod workspace;

#[cfg(test)]
mod tests {
    use super::error::{AppError, DomainError};

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new("DB_TEST", "db failed").with_retryable(false);
        assert_eq!(err.code, "DB_TEST");
        assert_eq!(err.message, "db failed");
        assert_eq!(err.retryable, false);
    }

    #[test]
    fn domain_errors_keep_their_code_as_details() {
        let err: AppError = DomainError::authorization("ROLE_NOT_ALLOWED", "nope").into();
        assert_eq!(err.code, "DOMAIN_UNAUTHORIZED");
        assert_eq!(err.details.as_deref(), Some("ROLE_NOT_ALLOWED"));
    }
}
