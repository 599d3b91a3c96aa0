//! Role-based authorization gate.
//!
//! Every guarded operation is an [`Operation`] variant; the gate matches them
//! exhaustively, so adding an operation forces a decision about who may run it.

use std::fmt;

use super::AuthError;
use crate::models::auth::{Role, Session};

/// Role-gated operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation<'a> {
    ListAllUsers,
    ListUsersByRole,
    ManageTeams,
    MutateRoster,
    /// View the named user's profile.
    ViewProfile(&'a str),
    /// Edit the named user's profile.
    EditProfile(&'a str),
}

impl Operation<'_> {
    /// Roles allowed when the self-access exception does not apply.
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Operation::ListAllUsers | Operation::ManageTeams => &[Role::Admin],
            Operation::ListUsersByRole | Operation::MutateRoster => &[Role::Coach, Role::Admin],
            Operation::ViewProfile(_) | Operation::EditProfile(_) => &[Role::Admin],
        }
    }

    /// The identity whose owner may bypass the role check, if any.
    fn owner(&self) -> Option<&str> {
        match self {
            Operation::ViewProfile(target) | Operation::EditProfile(target) => Some(*target),
            Operation::ListAllUsers
            | Operation::ListUsersByRole
            | Operation::ManageTeams
            | Operation::MutateRoster => None,
        }
    }
}

impl fmt::Display for Operation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ListAllUsers => f.write_str("list_all_users"),
            Operation::ListUsersByRole => f.write_str("list_users_by_role"),
            Operation::ManageTeams => f.write_str("manage_teams"),
            Operation::MutateRoster => f.write_str("mutate_roster"),
            Operation::ViewProfile(target) => write!(f, "view_profile({target})"),
            Operation::EditProfile(target) => write!(f, "edit_profile({target})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }

    /// `Deny` becomes [`AuthError::Forbidden`] naming the operation.
    pub fn into_result(self, operation: &Operation<'_>) -> Result<(), AuthError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(AuthError::Forbidden(format!(
                "not allowed to perform {operation}"
            ))),
        }
    }
}

/// Decide whether `session` may perform `operation`.
///
/// Ownership grants access to one's own record regardless of role.
pub fn authorize(session: &Session, operation: &Operation<'_>) -> Decision {
    if operation.owner() == Some(session.subject.as_str()) {
        return Decision::Allow;
    }
    if operation.allowed_roles().contains(&session.role) {
        Decision::Allow
    } else {
        Decision::Deny
    }
}
