use rocket::State;
use rocket::http::{CookieJar, Status};
use rocket::response::status::Custom;
use rocket::serde::json::{Error as JsonError, Json};
use rocket::serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};
use validator::Validate;

use super::{
    CheckAuthResponse, LoginResponse, MessageResponse, PinStatusResponse, PinVerifyResponse,
    ProfileResponse, StatusResponse,
};
use crate::auth::{
    Credentials, NewAccount, Permission, SessionClaims, User, end_session, start_session,
};
use crate::db::{
    count_users, create_first_admin, find_user_credentials, get_privacy_pin, set_privacy_pin,
    update_profile, with_deadline,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::validation::ValidateExt;

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SetupRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub school_name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    #[validate(length(max = 200, message = "Full name is too long"))]
    pub full_name: String,
    #[serde(default)]
    #[validate(length(max = 200, message = "School name is too long"))]
    pub school_name: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct PinRequest {
    #[validate(length(min = 1, message = "PIN is required"))]
    pub pin: String,
}

#[get("/status")]
pub async fn api_status(
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<StatusResponse>, AppError> {
    let users = with_deadline(config.db_timeout(), count_users(db)).await?;
    Ok(Json(StatusResponse {
        is_setup: users > 0,
    }))
}

/// Creates the first admin. Only succeeds while no account exists.
#[post("/setup", data = "<setup>")]
#[instrument(skip_all)]
pub async fn api_setup(
    setup: Result<Json<SetupRequest>, JsonError<'_>>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
    credentials: &State<Credentials>,
) -> Result<Custom<Json<MessageResponse>>, AppError> {
    let setup = setup.validated()?;

    // Cheap early exit before paying for a hash. The insert itself re-checks.
    if with_deadline(config.db_timeout(), count_users(db)).await? > 0 {
        return Err(AppError::Authorization(
            "System already initialized".to_string(),
        ));
    }

    let account = NewAccount {
        email: setup.email,
        password_hash: credentials.hash(&setup.password).await?,
        full_name: setup.full_name,
        school_name: setup.school_name,
    };

    let user_id = with_deadline(config.db_timeout(), create_first_admin(db, &account)).await?;
    info!(user_id, "System initialized");

    Ok(Custom(
        Status::Created,
        Json(MessageResponse::new("Admin setup complete")),
    ))
}

#[post("/login", data = "<login>")]
#[instrument(skip_all)]
pub async fn api_login(
    login: Result<Json<LoginRequest>, JsonError<'_>>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
    credentials: &State<Credentials>,
) -> Result<Json<LoginResponse>, AppError> {
    let login = login.validated()?;
    let invalid = || AppError::Authentication("Invalid credentials".to_string());

    let Some((user, digest)) =
        with_deadline(config.db_timeout(), find_user_credentials(db, &login.email)).await?
    else {
        warn!("Login attempt for unknown email");
        credentials.verify_decoy(&login.password).await;
        return Err(invalid());
    };

    if !credentials.verify(&login.password, &digest).await {
        warn!(user_id = user.id, "Login attempt with wrong password");
        return Err(invalid());
    }

    let ttl = config.session_ttl();
    start_session(cookies, SessionClaims::new(user.id, ttl), ttl);
    info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        role: user.role,
        has_pin: user.has_pin,
    }))
}

#[post("/logout")]
pub fn api_logout(cookies: &CookieJar<'_>) -> Json<MessageResponse> {
    end_session(cookies);
    Json(MessageResponse::new("Logged out"))
}

#[get("/check-auth")]
pub fn api_check_auth(_user: User) -> Json<CheckAuthResponse> {
    Json(CheckAuthResponse {
        authenticated: true,
    })
}

#[get("/user/profile")]
pub fn api_get_profile(user: User) -> Result<Json<ProfileResponse>, AppError> {
    user.require_permission(Permission::ViewOwnProfile)?;
    Ok(Json(ProfileResponse::from(user)))
}

#[put("/user/profile", data = "<profile>")]
pub async fn api_update_profile(
    profile: Result<Json<ProfileUpdateRequest>, JsonError<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::EditOwnProfile)?;
    let profile = profile.validated()?;

    with_deadline(
        config.db_timeout(),
        update_profile(db, user.id, &profile.full_name, &profile.school_name),
    )
    .await?;

    Ok(Json(MessageResponse::new("Profile updated")))
}

#[get("/user/pin")]
pub fn api_pin_status(user: User) -> Json<PinStatusResponse> {
    Json(PinStatusResponse {
        has_pin: user.has_pin,
    })
}

#[post("/user/pin", data = "<pin>")]
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn api_set_pin(
    pin: Result<Json<PinRequest>, JsonError<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
    credentials: &State<Credentials>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::EditOwnProfile)?;
    let pin = pin.validated()?;
    let digest = credentials.hash(&pin.pin).await?;

    with_deadline(
        config.db_timeout(),
        set_privacy_pin(db, user.id, Some(&digest)),
    )
    .await?;

    Ok(Json(MessageResponse::new("PIN set")))
}

#[delete("/user/pin")]
pub async fn api_remove_pin(
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::EditOwnProfile)?;
    with_deadline(config.db_timeout(), set_privacy_pin(db, user.id, None)).await?;
    Ok(Json(MessageResponse::new("PIN removed")))
}

/// A wrong pin is a 401 from the handler itself, so the session cookie is
/// left alone.
#[post("/user/verify-pin", data = "<pin>")]
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn api_verify_pin(
    pin: Result<Json<PinRequest>, JsonError<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
    credentials: &State<Credentials>,
) -> Result<Json<PinVerifyResponse>, AppError> {
    let pin = pin.validated()?;

    let stored = with_deadline(config.db_timeout(), get_privacy_pin(db, user.id)).await?;
    let valid = match stored {
        Some(digest) => credentials.verify(&pin.pin, &digest).await,
        None => false,
    };

    if !valid {
        return Err(AppError::Authentication("Invalid PIN".to_string()));
    }

    Ok(Json(PinVerifyResponse { valid }))
}
