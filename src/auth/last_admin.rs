//! The last-admin rule: once any user exists, at least one of them is an
//! admin. These checks are pure; the store re-asserts them inside the same
//! transaction as the write (see `db::users`).

use super::Role;

pub fn can_demote(current: Role, new_role: Role, admin_count: i64) -> bool {
    !(current == Role::Admin && new_role != Role::Admin && admin_count <= 1)
}

pub fn can_delete(current: Role, admin_count: i64) -> bool {
    !(current == Role::Admin && admin_count <= 1)
}
