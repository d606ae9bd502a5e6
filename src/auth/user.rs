use serde::Serialize;

use super::{Permission, Role};
use crate::error::AppError;

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub full_name: String,
    pub school_name: String,
    pub has_pin: bool,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: i64,
    pub email: String,
    pub role: String,
    pub full_name: Option<String>,
    pub school_name: Option<String>,
    pub has_pin: bool,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        let role = user.role.parse::<Role>().map_err(|_| {
            AppError::Internal(format!("User {} has unknown role {}", user.id, user.role))
        })?;

        Ok(Self {
            id: user.id,
            email: user.email,
            role,
            full_name: user.full_name.unwrap_or_default(),
            school_name: user.school_name.unwrap_or_default(),
            has_pin: user.has_pin,
        })
    }
}

/// Fields supplied when an account is created by setup or invite redemption.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub school_name: Option<String>,
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.id,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(
                "You don't have permission to perform this action".to_string(),
            ))
        }
    }
}
