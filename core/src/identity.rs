//! Identity types: users, rides, roles and the acting principal.
//!
//! Rider and driver identities are owned by the external identity provider;
//! the engine only ever sees them as opaque [`UserId`]s. A single user may
//! hold both roles, which is why rides reference `UserId` on both sides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Identity of a rider or driver, issued by the identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ride
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RideId(Uuid);

impl RideId {
    /// Creates a new random `RideId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `RideId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RideId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Error returned when a role name is not recognised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct ParseRoleError(String);

/// A role granted by the identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May request rides and consent to matched drivers
    Rider,
    /// May report presence and accept, start and complete rides
    Driver,
    /// Operator access
    Admin,
}

impl Role {
    /// Wire representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rider => "rider",
            Self::Driver => "driver",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rider" => Ok(Self::Rider),
            "driver" => Ok(Self::Driver),
            "admin" => Ok(Self::Admin),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// The set of roles held by a user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    /// Empty role set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse a comma-separated role list such as `"rider,driver"`.
    ///
    /// Blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ParseRoleError`] for any name that is not a known role.
    pub fn parse_list(list: &str) -> Result<Self, ParseRoleError> {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(Role::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    /// Whether the role is held.
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// Grant a role.
    pub fn insert(&mut self, role: Role) {
        self.0.insert(role);
    }

    /// Iterate over held roles in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The authenticated principal performing an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    /// Stable identity
    pub user_id: UserId,
    /// Granted roles
    pub roles: RoleSet,
}

impl Actor {
    /// Create an actor with the given roles.
    #[must_use]
    pub fn new(user_id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().collect(),
        }
    }

    /// Convenience constructor for a rider-only actor.
    #[must_use]
    pub fn rider(user_id: UserId) -> Self {
        Self::new(user_id, [Role::Rider])
    }

    /// Convenience constructor for a driver-only actor.
    #[must_use]
    pub fn driver(user_id: UserId) -> Self {
        Self::new(user_id, [Role::Driver])
    }

    /// Whether the actor holds `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }
}
