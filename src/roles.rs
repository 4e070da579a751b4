/// Profile roles
///
/// Roles are a closed set validated when written; route allow-lists are plain
/// set-membership checks against the role carried by the session.
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Administrador,
    Seller,
    Moderator,
    /// Domain guest accounts
    Invitado,
}

impl Role {
    pub const ADMINS: &'static [Role] = &[Role::Admin, Role::Administrador];
    pub const MEMBERS: &'static [Role] = &[Role::User, Role::Admin, Role::Administrador];
    /// Roles a visitor may pick for themselves at sign-up
    pub const SELF_ASSIGNABLE: &'static [Role] = &[Role::User, Role::Seller];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Administrador => "administrador",
            Role::Seller => "seller",
            Role::Moderator => "moderator",
            Role::Invitado => "invitado",
        }
    }

    pub fn parse(s: &str) -> ApiResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "administrador" => Ok(Role::Administrador),
            "seller" => Ok(Role::Seller),
            "moderator" => Ok(Role::Moderator),
            "invitado" => Ok(Role::Invitado),
            _ => Err(ApiError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Allow-list check
    pub fn is_any_of(&self, allowed: &[Role]) -> bool {
        allowed.contains(self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_known_roles() {
        for role in [
            Role::User,
            Role::Admin,
            Role::Administrador,
            Role::Seller,
            Role::Moderator,
            Role::Invitado,
        ] {
            assert_eq!(Role::parse(role.as_str()).unwrap(), role);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Role::parse("ADMIN").unwrap(), Role::Admin);
    }

    #[test]
    fn test_unknown_role_rejected() {
        assert!(matches!(Role::parse("root"), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_allow_list_membership() {
        assert!(Role::Administrador.is_any_of(Role::ADMINS));
        assert!(!Role::Seller.is_any_of(Role::ADMINS));
        assert!(!Role::Invitado.is_any_of(Role::MEMBERS));
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Invitado).unwrap(), "\"invitado\"");
    }
}
