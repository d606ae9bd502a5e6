use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnProfile,
    EditOwnProfile,
    ViewRecords,
    EditRecords,
    ExportBackup,
    ViewUsers,

    ManageInvites,
    EditUserRoles,
    DeleteUsers,
    RestoreBackup,
    ResetDatabase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Assistant,
}

static ASSISTANT_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnProfile);
    permissions.insert(Permission::EditOwnProfile);
    permissions.insert(Permission::ViewRecords);
    permissions.insert(Permission::EditRecords);
    permissions.insert(Permission::ExportBackup);
    permissions.insert(Permission::ViewUsers);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(ASSISTANT_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageInvites);
    permissions.insert(Permission::EditUserRoles);
    permissions.insert(Permission::DeleteUsers);
    permissions.insert(Permission::RestoreBackup);
    permissions.insert(Permission::ResetDatabase);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Assistant => &ASSISTANT_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Assistant => "assistant",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assistant" => Ok(Role::Assistant),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::Validation(format!("Invalid role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
