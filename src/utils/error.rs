use thiserror::Error;

pub type BotResult<T> = Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("External service error ({service}): {message}")]
    ExternalService { service: String, message: String },

    #[error("Payment error: {0}")]
    Payment(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Ticket error: {0}")]
    Ticket(String),
}

impl BotError {
    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        BotError::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            BotError::Network(err.to_string())
        } else {
            BotError::external("http", err.to_string())
        }
    }
}

/// Coarse error classification used by the recovery engine to pick a
/// remediation strategy. Derived from the variant first, then from
/// keywords in the display string for errors that arrive untyped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Payment,
    NotFound,
    Unauthorized,
    ServiceUnavailable,
    Validation,
    Unknown,
}

pub fn categorize(error: &BotError) -> ErrorCategory {
    match error {
        BotError::Validation(_) => ErrorCategory::Validation,
        BotError::Unauthorized(_) => ErrorCategory::Unauthorized,
        BotError::NotFound(_) => ErrorCategory::NotFound,
        BotError::Payment(_) => ErrorCategory::Payment,
        BotError::Network(_) => ErrorCategory::Network,
        BotError::Database(_) => ErrorCategory::ServiceUnavailable,
        BotError::ExternalService { .. } => categorize_message(&error.to_string()),
        BotError::Ticket(_) => categorize_message(&error.to_string()),
    }
}

fn categorize_message(message: &str) -> ErrorCategory {
    let msg = message.to_lowercase();
    if msg.contains("network") || msg.contains("timeout") {
        ErrorCategory::Network
    } else if msg.contains("payment") || msg.contains("paynow") {
        ErrorCategory::Payment
    } else if msg.contains("not found") || msg.contains("404") {
        ErrorCategory::NotFound
    } else if msg.contains("unauthorized") || msg.contains("403") {
        ErrorCategory::Unauthorized
    } else if msg.contains("service") || msg.contains("api") {
        ErrorCategory::ServiceUnavailable
    } else if msg.contains("validation") || msg.contains("invalid") {
        ErrorCategory::Validation
    } else {
        ErrorCategory::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_variants_map_directly() {
        assert_eq!(
            categorize(&BotError::Payment("gateway rejected".into())),
            ErrorCategory::Payment
        );
        assert_eq!(
            categorize(&BotError::Unauthorized("bad token".into())),
            ErrorCategory::Unauthorized
        );
        assert_eq!(
            categorize(&BotError::NotFound("event".into())),
            ErrorCategory::NotFound
        );
    }

    #[test]
    fn untyped_errors_fall_back_to_keywords() {
        let err = BotError::external("whatsapp", "request timeout after 30s");
        assert_eq!(categorize(&err), ErrorCategory::Network);

        let err = BotError::Ticket("pdf api unavailable".into());
        assert_eq!(categorize(&err), ErrorCategory::ServiceUnavailable);

        let err = BotError::Ticket("something odd happened".into());
        assert_eq!(categorize(&err), ErrorCategory::Unknown);
    }
}
