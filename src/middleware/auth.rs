//! Session authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the session token from the Authorization header
//! 2. Hash it and look up an active, unexpired session
//! 3. Inject the authenticated user into the request
//! 4. Reject unauthorized requests with HTTP 401
//!
//! A second layer, [`require_admin`], guards the admin surface by platform role.

use crate::{
    db::DbPool,
    error::AppError,
    models::user::PlatformRole,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
///
/// Route handlers extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,

    /// Session the request was made with; sign-out deactivates it
    pub session_id: Uuid,

    pub email: String,

    pub name: Option<String>,

    pub role: PlatformRole,
}

impl AuthContext {
    pub fn is_super_admin(&self) -> bool {
        self.role == PlatformRole::SuperAdmin
    }
}

#[derive(sqlx::FromRow)]
struct SessionUser {
    session_id: Uuid,
    user_id: Uuid,
    email: String,
    name: Option<String>,
    role: String,
}

/// Session authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <token>` header from request
/// 2. Hash the `<token>` using SHA-256
/// 3. Query for a matching session that is active and not expired
/// 4. If found: inject `AuthContext` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request).ok_or(AppError::Unauthorized)?;
    let token_hash = hash_token(token);

    let record = sqlx::query_as::<_, SessionUser>(
        r#"
        SELECT s.id AS session_id, u.id AS user_id, u.email, u.name, u.role
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = $1 AND s.is_active = true AND s.expires_at > NOW()
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    let auth_context = AuthContext {
        user_id: record.user_id,
        session_id: record.session_id,
        email: record.email,
        name: record.name,
        role: record.role.parse().unwrap_or(PlatformRole::User),
    };

    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

/// Reject callers whose platform role is not `ADMIN` or `SUPER_ADMIN`.
///
/// Must run after [`auth_middleware`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let auth = request
        .extensions()
        .get::<AuthContext>()
        .ok_or(AppError::Unauthorized)?;

    if !auth.role.is_admin() {
        return Err(AppError::forbidden("Admin access required"));
    }

    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// SHA-256 hex digest of a session token. Only the digest is stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a new session token: 32 random bytes, hex encoded.
pub fn generate_session_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn hash_is_stable_hex_sha256() {
        let hash = hash_token("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash, hash_token("abc"));
    }

    #[test]
    fn generated_tokens_are_unique_64_char_hex() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn bearer_token_requires_prefix() {
        let request = Request::builder()
            .header("Authorization", "Bearer tok123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), Some("tok123"));

        let request = Request::builder()
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);

        let request = Request::builder()
            .header("Authorization", "Bearer ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);
    }
}
