use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::{Error as JsonError, Json};
use rocket::serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};
use validator::Validate;

use super::{
    InviteStatusResponse, InviteTokenResponse, JsonAttachment, MessageResponse, UserSummary,
};
use crate::auth::{Credentials, NewAccount, Permission, Role, User};
use crate::db::{
    create_invitation, delete_user, export_backup, list_users, peek_invitation,
    redeem_invitation, reset_database, restore_backup, update_user_role, with_deadline,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::{BackupSnapshot, RestoreSummary};
use crate::validation::{ValidateExt, parse_body};

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct RedeemRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RoleUpdateRequest {
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub message: String,
    pub restored: RestoreSummary,
}

/// Invitations always grant the assistant role; admins are made by promotion.
#[post("/invites")]
pub async fn api_create_invite(
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<InviteTokenResponse>, AppError> {
    user.require_permission(Permission::ManageInvites)?;

    let token = with_deadline(
        config.db_timeout(),
        create_invitation(db, Role::Assistant),
    )
    .await?;
    info!(issued_by = user.id, "Invitation issued");

    Ok(Json(InviteTokenResponse { token }))
}

#[get("/invites/<token>")]
pub async fn api_verify_invite(
    token: &str,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<InviteStatusResponse>, AppError> {
    let role = with_deadline(config.db_timeout(), peek_invitation(db, token)).await?;
    Ok(Json(InviteStatusResponse { role, valid: true }))
}

#[post("/invites/<token>", data = "<request>")]
#[instrument(skip_all)]
pub async fn api_redeem_invite(
    token: &str,
    request: Result<Json<RedeemRequest>, JsonError<'_>>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
    credentials: &State<Credentials>,
) -> Result<Custom<Json<MessageResponse>>, AppError> {
    let request = request.validated()?;

    // Skip the hash for tokens that are plainly dead. The redeem transaction
    // is still what decides.
    match with_deadline(config.db_timeout(), peek_invitation(db, token)).await {
        Ok(_) => {}
        Err(AppError::NotFound(message)) => return Err(AppError::Validation(message)),
        Err(err) => return Err(err),
    }

    let account = NewAccount {
        email: request.email,
        password_hash: credentials.hash(&request.password).await?,
        full_name: request.full_name,
        school_name: None,
    };

    let user_id = with_deadline(
        config.db_timeout(),
        redeem_invitation(db, token, &account),
    )
    .await?;
    info!(user_id, "Account created from invitation");

    Ok(Custom(
        Status::Created,
        Json(MessageResponse::new("Account created")),
    ))
}

#[get("/users")]
pub async fn api_list_users(
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    user.require_permission(Permission::ViewUsers)?;

    let users = with_deadline(config.db_timeout(), list_users(db)).await?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}

#[put("/users/<id>/role", data = "<update>")]
pub async fn api_update_user_role(
    id: i64,
    update: Result<Json<RoleUpdateRequest>, JsonError<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::EditUserRoles)?;
    let role: Role = parse_body(update)?.role.parse()?;

    with_deadline(config.db_timeout(), update_user_role(db, id, role)).await?;
    info!(target_user = id, %role, changed_by = user.id, "User role updated");

    Ok(Json(MessageResponse::new("Role updated")))
}

#[delete("/users/<id>")]
pub async fn api_delete_user(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::DeleteUsers)?;

    with_deadline(config.db_timeout(), delete_user(db, id)).await?;
    info!(target_user = id, deleted_by = user.id, "User deleted");

    Ok(Json(MessageResponse::new("User deleted")))
}

#[get("/backup")]
pub async fn api_export_backup(
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<JsonAttachment, AppError> {
    user.require_permission(Permission::ExportBackup)?;

    let snapshot = with_deadline(config.db_timeout(), export_backup(db)).await?;
    let body = serde_json::to_string(&snapshot)
        .map_err(|err| AppError::Internal(format!("Failed to encode backup: {}", err)))?;

    Ok(JsonAttachment::new(body, "backup.json"))
}

#[post("/restore", data = "<snapshot>")]
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn api_restore_backup(
    snapshot: Result<Json<BackupSnapshot>, JsonError<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<RestoreResponse>, AppError> {
    user.require_permission(Permission::RestoreBackup)?;
    let snapshot = parse_body(snapshot)?;

    let restored = with_deadline(config.db_timeout(), restore_backup(db, &snapshot)).await?;
    warn!(?restored, "Database restored from backup");

    Ok(Json(RestoreResponse {
        message: "Database restored".to_string(),
        restored,
    }))
}

#[delete("/reset")]
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn api_reset_database(
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::ResetDatabase)?;

    with_deadline(config.db_timeout(), reset_database(db)).await?;
    warn!("All student, goal and log records wiped");

    Ok(Json(MessageResponse::new("Database wiped successfully")))
}
