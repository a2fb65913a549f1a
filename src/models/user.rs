//! User and session models.
//!
//! Users are provisioned from the external auth provider: the provider's user id becomes
//! the primary key here. Requests are authenticated with server-issued session tokens
//! which are stored only as SHA-256 hashes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a user record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    /// Same id as the auth provider's user
    pub id: Uuid,

    pub email: String,

    pub name: Option<String>,

    /// Platform role (`USER`, `ADMIN`, `SUPER_ADMIN`)
    pub role: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Platform-wide role, distinct from a user's role inside an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformRole {
    User,
    Admin,
    SuperAdmin,
}

impl PlatformRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformRole::User => "USER",
            PlatformRole::Admin => "ADMIN",
            PlatformRole::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// Admins and super admins may use the `/api/admin` surface.
    pub fn is_admin(&self) -> bool {
        matches!(self, PlatformRole::Admin | PlatformRole::SuperAdmin)
    }
}

impl std::str::FromStr for PlatformRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(PlatformRole::User),
            "ADMIN" => Ok(PlatformRole::Admin),
            "SUPER_ADMIN" => Ok(PlatformRole::SuperAdmin),
            other => Err(format!("unknown platform role: {other}")),
        }
    }
}

/// A bearer session issued after a successful sign-in.
///
/// # Database Table
///
/// Maps to the `sessions` table. The raw token is returned to the client once and
/// never stored; `token_hash` holds its SHA-256 hex digest.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,

    /// Set to false on sign-out
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Public view of a user returned by the auth endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }
    }
}

/// Request body for `POST /api/auth/signup`.
#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub org_name: Option<String>,
}

/// Request body for `POST /api/auth/signin`.
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Query string of the OAuth/PKCE callback.
#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub code_verifier: Option<String>,
}

/// Returned after sign-in: the raw session token is only ever shown here.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub user: UserSummary,
    pub message: String,
}

/// The caller's session as seen by `GET /api/auth/session`.
#[derive(Debug, Serialize)]
pub struct CurrentSession {
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub user: UserSummary,
}

/// Request body for `PATCH /api/admin/users/{id}/role`.
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_role_round_trips_through_strings() {
        for role in [
            PlatformRole::User,
            PlatformRole::Admin,
            PlatformRole::SuperAdmin,
        ] {
            assert_eq!(role.as_str().parse::<PlatformRole>().unwrap(), role);
        }
        assert!("root".parse::<PlatformRole>().is_err());
    }

    #[test]
    fn only_admin_roles_reach_admin_surface() {
        assert!(!PlatformRole::User.is_admin());
        assert!(PlatformRole::Admin.is_admin());
        assert!(PlatformRole::SuperAdmin.is_admin());
    }
}
