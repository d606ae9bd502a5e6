use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use super::insert_account;
use crate::auth::{NewAccount, Role};
use crate::error::AppError;

/// 128 random bits from the thread-local CSPRNG, hex encoded.
pub fn generate_token() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[instrument(skip(pool))]
pub async fn create_invitation(pool: &Pool<Sqlite>, role: Role) -> Result<String, AppError> {
    info!("Creating invitation");
    let token = generate_token();

    sqlx::query("INSERT INTO invitations (token, role) VALUES (?, ?)")
        .bind(&token)
        .bind(role.as_str())
        .execute(pool)
        .await?;

    Ok(token)
}

/// Read-only lookup. Unknown and already used tokens look the same.
#[instrument(skip_all)]
pub async fn peek_invitation(pool: &Pool<Sqlite>, token: &str) -> Result<Role, AppError> {
    let role: Option<String> =
        sqlx::query_scalar("SELECT role FROM invitations WHERE token = ? AND used = FALSE")
            .bind(token)
            .fetch_optional(pool)
            .await?;

    match role {
        Some(role) => role.parse(),
        None => Err(AppError::NotFound("Invalid invitation".to_string())),
    }
}

/// Consumes an invitation and creates the account it grants, atomically.
///
/// The token is claimed first with a conditional update, so of several
/// concurrent redemptions only one sees a row come back. If creating the
/// account fails afterwards (duplicate email, say) the transaction is
/// dropped uncommitted and the token stays usable.
#[instrument(skip_all, fields(email = %account.email))]
pub async fn redeem_invitation(
    pool: &Pool<Sqlite>,
    token: &str,
    account: &NewAccount,
) -> Result<i64, AppError> {
    info!("Redeeming invitation");
    let mut tx = pool.begin().await?;

    let role: Option<String> = sqlx::query_scalar(
        "UPDATE invitations SET used = TRUE WHERE token = ? AND used = FALSE RETURNING role",
    )
    .bind(token)
    .fetch_optional(&mut *tx)
    .await?;

    let role: Role = match role {
        Some(role) => role.parse()?,
        None => return Err(AppError::Validation("Invalid invitation".to_string())),
    };

    let user_id = insert_account(&mut *tx, account, role)
        .await
        .map_err(|err| match err {
            AppError::Conflict(_) => AppError::Conflict("Email already in use".to_string()),
            other => other,
        })?;

    tx.commit().await?;
    Ok(user_id)
}
