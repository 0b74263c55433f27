//! The authenticated caller of a lifecycle operation.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Role carried by a requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A regular user; may only touch resources they own.
    #[default]
    User,
    /// An operator; may view and mutate any resource.
    Admin,
}

/// Identity of whoever is asking for a lifecycle operation.
///
/// Authentication happens upstream; by the time a `Requester` reaches the core
/// its identity and role are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// The caller's user ID.
    pub user_id: UserId,
    /// The caller's role.
    #[serde(default)]
    pub role: Role,
}

impl Requester {
    /// A requester with the regular user role.
    #[must_use]
    pub const fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    /// A requester with the admin role.
    #[must_use]
    pub const fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    /// Returns true if the requester has the admin role.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Returns true if the requester may view or mutate a resource owned by `owner`.
    #[must_use]
    pub fn can_access(&self, owner: &UserId) -> bool {
        self.is_admin() || self.user_id == *owner
    }
}
