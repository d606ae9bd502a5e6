use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Span, error, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Body returned to callers for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Authentication(_) => "authentication_error",
            AppError::Authorization(_) => "authorization_error",
            AppError::PolicyViolation(_) => "policy_violation",
            AppError::NotFound(_) => "not_found_error",
            AppError::Conflict(_) => "conflict_error",
            AppError::Validation(_) => "validation_error",
            AppError::Timeout(_) => "timeout_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn log_and_record(&self, ctx: &str) {
        let current_span = Span::current();
        let is_valid_span = !current_span.is_none();

        let message = self.to_string();
        match self {
            AppError::Database(err) => {
                error!(error = %message, context = %ctx, db_error = %err, "Database error");
            }
            AppError::Authentication(msg) => {
                warn!(message = %msg, context = %ctx, "Authentication error");
            }
            AppError::Authorization(msg) => {
                warn!(message = %msg, context = %ctx, "Authorization error");
            }
            AppError::PolicyViolation(msg) => {
                warn!(message = %msg, context = %ctx, "Policy violation");
            }
            AppError::NotFound(msg) => {
                warn!(message = %msg, context = %ctx, "Not found error");
            }
            AppError::Conflict(msg) => {
                warn!(message = %msg, context = %ctx, "Conflict error");
            }
            AppError::Validation(msg) => {
                warn!(message = %msg, context = %ctx, "Validation error");
            }
            AppError::Timeout(msg) => {
                error!(message = %msg, context = %ctx, "Operation timed out");
            }
            AppError::Internal(msg) => {
                error!(message = %msg, context = %ctx, "Internal server error");
            }
        };

        if is_valid_span {
            current_span.record("error", tracing::field::display(true));
            current_span.record(ERROR_TYPE, tracing::field::display(self.kind()));
            current_span.record("error.message", tracing::field::display(&message));

            match self {
                AppError::Database(_) | AppError::Internal(_) | AppError::Timeout(_) => {
                    current_span.record(OTEL_STATUS_CODE, tracing::field::display("ERROR"));
                }
                _ => {}
            }
        }
    }

    pub fn status_code(&self) -> Status {
        match self {
            AppError::Database(_) => Status::InternalServerError,
            AppError::Authentication(_) => Status::Unauthorized,
            AppError::Authorization(_) => Status::Forbidden,
            AppError::PolicyViolation(_) => Status::BadRequest,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Conflict(_) => Status::BadRequest,
            AppError::Validation(_) => Status::BadRequest,
            AppError::Timeout(_) => Status::ServiceUnavailable,
            AppError::Internal(_) => Status::InternalServerError,
        }
    }

    /// Message safe to hand back to a caller. Store and internal failures
    /// are reported generically; their detail only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Timeout(_) => "Service temporarily unavailable".to_string(),
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::PolicyViolation(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Validation(msg) => msg.clone(),
        }
    }

    pub fn to_status_with_log(&self, context: &str) -> Status {
        self.log_and_record(context);
        self.status_code()
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        let status = self.to_status_with_log(&format!("Request to {} {}", req.method(), req.uri()));
        let body = ErrorResponse {
            error: self.kind().to_string(),
            message: self.public_message(),
        };
        Custom(status, Json(body)).respond_to(req)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &error {
            if db_err.is_unique_violation() {
                return AppError::Conflict("Record already exists".to_string());
            }
            if db_err.is_foreign_key_violation() {
                return AppError::Validation("Referenced record does not exist".to_string());
            }
        }
        AppError::Database(error)
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Cryptography error: {}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {}", error))
    }
}

impl From<rocket::tokio::task::JoinError> for AppError {
    fn from(error: rocket::tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Background task failed: {}", error))
    }
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        err.to_status_with_log("Error conversion into Status")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let err = AppError::Internal("connection refused at 10.0.0.4".to_string());
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.status_code(), Status::InternalServerError);

        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_policy_violation_maps_to_bad_request() {
        let err = AppError::PolicyViolation("Cannot demote the last admin".to_string());
        assert_eq!(err.status_code(), Status::BadRequest);
        assert_eq!(err.public_message(), "Cannot demote the last admin");
        assert_eq!(err.kind(), "policy_violation");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Authentication("x".into()).status_code(),
            Status::Unauthorized
        );
        assert_eq!(
            AppError::Authorization("x".into()).status_code(),
            Status::Forbidden
        );
        assert_eq!(AppError::NotFound("x".into()).status_code(), Status::NotFound);
        assert_eq!(AppError::Conflict("x".into()).status_code(), Status::BadRequest);
        assert_eq!(
            AppError::Timeout("x".into()).status_code(),
            Status::ServiceUnavailable
        );
    }
}
