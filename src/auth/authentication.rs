use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;
use tracing::Instrument;

use super::{SessionClaims, User, end_session, read_session};
use crate::db::{count_users, get_user, with_deadline};
use crate::env::AppConfig;
use crate::error::{AppError, ErrorResponse};

/// Why a protected request was turned away. Stored in the request-local
/// cache so the 401 catcher can report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRejection {
    Missing,
    Expired,
    SystemReset,
    UnknownUser,
}

impl SessionRejection {
    pub fn message(&self) -> &'static str {
        match self {
            SessionRejection::Missing => "Unauthorized access",
            SessionRejection::Expired => "Session expired",
            SessionRejection::SystemReset => "Session invalid - System reset",
            SessionRejection::UnknownUser => "Session invalid",
        }
    }
}

fn reject(request: &Request<'_>, rejection: SessionRejection) -> AppError {
    request.local_cache(|| rejection);
    AppError::Authentication(rejection.message().to_string())
}

async fn authenticate(request: &Request<'_>) -> Result<User, AppError> {
    let Some(claims) = read_session(request.cookies()) else {
        return Err(reject(request, SessionRejection::Missing));
    };

    if claims.is_expired() {
        return Err(reject(request, SessionRejection::Expired));
    }

    let pool = request
        .rocket()
        .state::<SqlitePool>()
        .ok_or_else(|| AppError::Internal("Database pool not found in managed state".into()))?;
    let config = request
        .rocket()
        .state::<AppConfig>()
        .ok_or_else(|| AppError::Internal("Config not found in managed state".into()))?;

    // Re-checked on every request: a wipe or restore may have removed every
    // account since this cookie was issued.
    let user_count = with_deadline(config.db_timeout(), count_users(pool)).await?;
    if user_count == 0 {
        return Err(reject(request, SessionRejection::SystemReset));
    }

    load_session_user(pool, config, request, claims).await
}

async fn load_session_user(
    pool: &SqlitePool,
    config: &AppConfig,
    request: &Request<'_>,
    claims: SessionClaims,
) -> Result<User, AppError> {
    match with_deadline(config.db_timeout(), get_user(pool, claims.user_id)).await {
        Ok(user) => Ok(user),
        Err(AppError::NotFound(_)) => Err(reject(request, SessionRejection::UnknownUser)),
        Err(err) => Err(err),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("user_auth_guard");

        match authenticate(request).instrument(auth_span.clone()).await {
            Ok(user) => {
                auth_span.in_scope(|| {
                    tracing::debug!(user_id = %user.id, role = %user.role, "User authenticated via session cookie");
                });
                Outcome::Success(user)
            }
            Err(err) => {
                let status = auth_span.in_scope(|| err.to_status_with_log("Session guard"));
                Outcome::Error((status, ()))
            }
        }
    }
}

/// Any 401 means the presented session is unusable, so the cookie is cleared
/// along with the response.
#[catch(401)]
pub fn unauthorized_api(req: &Request) -> Custom<Json<ErrorResponse>> {
    end_session(req.cookies());
    let rejection = req.local_cache(|| SessionRejection::Missing);

    Custom(
        Status::Unauthorized,
        Json(ErrorResponse {
            error: "authentication_error".to_string(),
            message: rejection.message().to_string(),
        }),
    )
}

#[catch(default)]
pub fn default_api(status: Status, _req: &Request) -> Custom<Json<ErrorResponse>> {
    let (error, message) = match status.code {
        400 | 422 => ("validation_error", "Invalid request"),
        403 => (
            "authorization_error",
            "You don't have permission to perform this action",
        ),
        404 => ("not_found_error", "Resource not found"),
        503 => ("timeout_error", "Service temporarily unavailable"),
        _ => ("internal_error", "Internal server error"),
    };

    Custom(
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
}
