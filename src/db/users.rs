use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use crate::auth::{DbUser, NewAccount, Role, User, can_delete, can_demote};
use crate::error::AppError;

const USER_COLUMNS: &str =
    "id, email, role, full_name, school_name, privacy_pin IS NOT NULL AS has_pin";

#[derive(sqlx::FromRow)]
struct DbCredentials {
    #[sqlx(flatten)]
    user: DbUser,
    password_hash: String,
}

#[instrument(skip(pool))]
pub async fn count_users(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

async fn count_admins(conn: &mut SqliteConnection) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(conn)
        .await?;
    Ok(count)
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    let row = sqlx::query_as::<_, DbUser>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => User::try_from(user),
        None => Err(AppError::NotFound(format!("User {} not found", id))),
    }
}

#[instrument(skip(pool))]
pub async fn list_users(pool: &Pool<Sqlite>) -> Result<Vec<User>, AppError> {
    info!("Listing users");
    let rows = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users ORDER BY id ASC",
        USER_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(User::try_from).collect()
}

/// Looks a user up by email and returns it with the stored password digest.
#[instrument(skip(pool))]
pub async fn find_user_credentials(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<(User, String)>, AppError> {
    let row = sqlx::query_as::<_, DbCredentials>(&format!(
        "SELECT {}, password_hash FROM users WHERE email = ?",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some((User::try_from(row.user)?, row.password_hash))),
        None => Ok(None),
    }
}

/// Creates the initial admin. The insert only happens while the table is
/// empty, so two racing setup calls cannot both succeed.
#[instrument(skip_all, fields(email = %account.email))]
pub async fn create_first_admin(
    pool: &Pool<Sqlite>,
    account: &NewAccount,
) -> Result<i64, AppError> {
    info!("Creating first admin");
    let result = sqlx::query(
        "INSERT INTO users (email, password_hash, role, full_name, school_name)
         SELECT ?, ?, 'admin', ?, ?
         WHERE NOT EXISTS (SELECT 1 FROM users)",
    )
    .bind(&account.email)
    .bind(&account.password_hash)
    .bind(&account.full_name)
    .bind(&account.school_name)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Authorization(
            "System already initialized".to_string(),
        ));
    }

    Ok(result.last_insert_rowid())
}

#[instrument(skip_all, fields(email = %account.email, role = %role))]
pub async fn insert_account(
    conn: &mut SqliteConnection,
    account: &NewAccount,
    role: Role,
) -> Result<i64, AppError> {
    let result = sqlx::query(
        "INSERT INTO users (email, password_hash, role, full_name, school_name)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&account.email)
    .bind(&account.password_hash)
    .bind(role.as_str())
    .bind(&account.full_name)
    .bind(&account.school_name)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn update_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
    full_name: &str,
    school_name: &str,
) -> Result<(), AppError> {
    info!("Updating user profile");
    let result = sqlx::query("UPDATE users SET full_name = ?, school_name = ? WHERE id = ?")
        .bind(full_name)
        .bind(school_name)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_privacy_pin(pool: &Pool<Sqlite>, user_id: i64) -> Result<Option<String>, AppError> {
    let row: Option<Option<String>> =
        sqlx::query_scalar("SELECT privacy_pin FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    row.ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

/// Stores a pin digest, or clears the pin when `digest` is `None`.
#[instrument(skip(pool, digest))]
pub async fn set_privacy_pin(
    pool: &Pool<Sqlite>,
    user_id: i64,
    digest: Option<&str>,
) -> Result<(), AppError> {
    info!(clearing = digest.is_none(), "Updating privacy pin");
    let result = sqlx::query("UPDATE users SET privacy_pin = ? WHERE id = ?")
        .bind(digest)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }
    Ok(())
}

async fn current_role(conn: &mut SqliteConnection, user_id: i64) -> Result<Role, AppError> {
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

    match role {
        Some(role) => role.parse(),
        None => Err(AppError::NotFound(format!("User {} not found", user_id))),
    }
}

/// Changes a user's role without ever leaving the system adminless.
///
/// The check and the write share one transaction, and the `UPDATE` repeats
/// the admin count in its `WHERE` clause, so a concurrent demotion that
/// committed in between turns this write into a no-op instead of removing
/// the last admin.
#[instrument(skip(pool))]
pub async fn update_user_role(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_role: Role,
) -> Result<(), AppError> {
    info!("Updating user role");
    let mut tx = pool.begin().await?;

    let current = current_role(&mut *tx, user_id).await?;
    let admins = count_admins(&mut *tx).await?;

    if !can_demote(current, new_role, admins) {
        return Err(AppError::PolicyViolation(
            "Cannot demote the last admin".to_string(),
        ));
    }

    let result = sqlx::query(
        "UPDATE users SET role = ?
         WHERE id = ?
           AND (role != 'admin'
                OR ? = 'admin'
                OR (SELECT COUNT(*) FROM users WHERE role = 'admin') > 1)",
    )
    .bind(new_role.as_str())
    .bind(user_id)
    .bind(new_role.as_str())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        warn!("Role change lost a race with another admin change");
        return Err(AppError::PolicyViolation(
            "Cannot demote the last admin".to_string(),
        ));
    }

    tx.commit().await?;
    Ok(())
}

/// Deletes a user under the same last-admin guarantee as
/// [`update_user_role`]. Their tracking logs are kept with no author.
#[instrument(skip(pool))]
pub async fn delete_user(pool: &Pool<Sqlite>, user_id: i64) -> Result<(), AppError> {
    info!("Deleting user");
    let mut tx = pool.begin().await?;

    let current = current_role(&mut *tx, user_id).await?;
    let admins = count_admins(&mut *tx).await?;

    if !can_delete(current, admins) {
        return Err(AppError::PolicyViolation(
            "Cannot delete the last admin".to_string(),
        ));
    }

    let result = sqlx::query(
        "DELETE FROM users
         WHERE id = ?
           AND (role != 'admin'
                OR (SELECT COUNT(*) FROM users WHERE role = 'admin') > 1)",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        warn!("User deletion lost a race with another admin change");
        return Err(AppError::PolicyViolation(
            "Cannot delete the last admin".to_string(),
        ));
    }

    tx.commit().await?;
    Ok(())
}
