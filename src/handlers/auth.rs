//! Sign-up, sign-in and session endpoints.
//!
//! - POST /api/auth/signup - Register with the auth provider and provision locally
//! - POST /api/auth/signin - Password sign-in, returns a bearer session token
//! - GET /auth/callback - OAuth/PKCE code exchange, returns a bearer session token
//! - GET /api/auth/session - Current session
//! - POST /api/auth/signout - Deactivate the current session

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        response::{ApiResponse, MessageResponse},
        user::{
            AuthCallbackQuery, CurrentSession, SessionResponse, SignInRequest, SignUpRequest,
            SignUpResponse, User, UserSummary,
        },
    },
    services::identity_service::{self, email_local_part},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 6;

/// Create an account.
///
/// # Request Body
///
/// ```json
/// {
///   "email": "writer@example.com",
///   "password": "correct horse",
///   "name": "Ada",
///   "org_name": "Run Wild Media"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the provisioned user; sign in to obtain a session
/// - **400**: missing fields or rejected by the auth provider
pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SignUpResponse>>), AppError> {
    let email = request.email.trim().to_lowercase();
    if email.is_empty() || request.password.is_empty() {
        return Err(AppError::invalid("Email and password are required"));
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| email_local_part(&email));

    let mut identity = state
        .identity
        .sign_up(&email, &request.password, &name)
        .await?;
    if identity.email.is_none() {
        identity.email = Some(email.clone());
    }

    let user = identity_service::provision_user(
        &state.pool,
        &identity,
        request.org_name.as_deref(),
        state.config.trial_credits,
    )
    .await?;

    Ok(ApiResponse::created(SignUpResponse {
        user: user.into(),
        message: "Account created successfully! You can now sign in.".to_string(),
    }))
}

/// Sign in with email and password.
///
/// # Response
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "token": "9f2c...e1",
///     "expires_at": "2025-02-01T10:00:00Z",
///     "user": { "id": "...", "email": "writer@example.com", "name": "Ada", "role": "USER" }
///   }
/// }
/// ```
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<ApiResponse<SessionResponse>>, AppError> {
    let email = request.email.trim().to_lowercase();
    if email.is_empty() || request.password.is_empty() {
        return Err(AppError::invalid("Email and password are required"));
    }

    let identity = state
        .identity
        .sign_in_with_password(&email, &request.password)
        .await?;
    let user = identity_service::provision_user(
        &state.pool,
        &identity,
        None,
        state.config.trial_credits,
    )
    .await?;

    start_session(&state, user).await.map(ApiResponse::ok)
}

/// Complete an OAuth sign-in by exchanging the authorization code.
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<AuthCallbackQuery>,
) -> Result<Json<ApiResponse<SessionResponse>>, AppError> {
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::invalid("code is required"))?;

    let identity = state
        .identity
        .exchange_code(&code, query.code_verifier.as_deref())
        .await?;
    let user = identity_service::provision_user(
        &state.pool,
        &identity,
        None,
        state.config.trial_credits,
    )
    .await?;

    start_session(&state, user).await.map(ApiResponse::ok)
}

async fn start_session(state: &AppState, user: User) -> Result<SessionResponse, AppError> {
    let (token, expires_at) =
        identity_service::issue_session(&state.pool, user.id, state.config.session_ttl_hours)
            .await?;
    tracing::info!(user_id = %user.id, "session issued");

    Ok(SessionResponse {
        token,
        expires_at,
        user: UserSummary::from(user),
    })
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<CurrentSession>>, AppError> {
    let session = identity_service::current_session(&state.pool, &auth).await?;
    Ok(ApiResponse::ok(session))
}

pub async fn sign_out(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    identity_service::revoke_session(&state.pool, auth.session_id).await?;
    tracing::info!(user_id = %auth.user_id, "signed out");
    Ok(ApiResponse::ok(MessageResponse::new("Signed out successfully")))
}
