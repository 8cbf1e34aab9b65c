//! Identity extraction.
//!
//! The identity provider sits in front of this service and forwards the
//! authenticated principal as trusted headers:
//!
//! - `x-user-id`: the user's UUID
//! - `x-user-roles`: comma-separated role names (`rider,driver`)

use crate::server::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use ride_dispatch_core::identity::{Actor, RoleSet, UserId};
use uuid::Uuid;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated user's roles.
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// Authenticated caller. Use as a handler parameter to require identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub Actor);

impl Identity {
    /// The caller as an engine actor.
    #[must_use]
    pub const fn actor(&self) -> &Actor {
        &self.0
    }

    /// The caller's user id.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.0.user_id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing user identity"))?;

        let user_id = Uuid::parse_str(raw_id.trim())
            .map(UserId::from_uuid)
            .map_err(|_| AppError::unauthorized("Invalid user identity"))?;

        let roles = match parts.headers.get(USER_ROLES_HEADER) {
            Some(value) => {
                let list = value
                    .to_str()
                    .map_err(|_| AppError::unauthorized("Invalid role list"))?;
                RoleSet::parse_list(list)
                    .map_err(|e| AppError::unauthorized(format!("Invalid role list: {e}")))?
            }
            None => RoleSet::new(),
        };

        Ok(Self(Actor { user_id, roles }))
    }
}
