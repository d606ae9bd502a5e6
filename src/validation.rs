use rocket::serde::json::{Error as JsonError, Json};
use tracing::warn;
use validator::{Validate, ValidationErrors};

use crate::error::AppError;

/// Flattens validator output into `field: message` pairs, sorted by field so
/// responses are stable.
pub fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .map(|(field, field_errors)| {
            let messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();
            (field.to_string(), messages.join(", "))
        })
        .collect();

    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .map(|(field, messages)| format!("{}: {}", field, messages))
        .collect::<Vec<_>>()
        .join("; ")
}

pub trait ValidateExt<T> {
    fn validated(self) -> Result<T, AppError>;
}

impl<T: Validate> ValidateExt<T> for Json<T> {
    fn validated(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate().map_err(|errors| {
            let message = describe(&errors);
            warn!(%message, "Request body failed validation");
            AppError::Validation(message)
        })?;
        Ok(inner)
    }
}

/// Unwraps a body taken as `Result<Json<T>, json::Error>`, so a payload that
/// does not parse becomes a 400 with a JSON error body instead of Rocket's
/// default catcher.
pub fn parse_body<T>(body: Result<Json<T>, JsonError<'_>>) -> Result<T, AppError> {
    match body {
        Ok(json) => Ok(json.into_inner()),
        Err(error) => {
            warn!(%error, "Rejected malformed request body");
            Err(AppError::Validation(match error {
                JsonError::Io(_) => "Could not read request body".to_string(),
                JsonError::Parse(_, parse_error) => format!("Invalid JSON: {}", parse_error),
            }))
        }
    }
}

impl<'r, T: Validate> ValidateExt<T> for Result<Json<T>, JsonError<'r>> {
    fn validated(self) -> Result<T, AppError> {
        Json(parse_body(self)?).validated()
    }
}
