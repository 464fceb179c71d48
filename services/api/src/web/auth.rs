//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use labmarket_core::validation::{FieldError, ValidationErrors};
use labmarket_core::{MarketError, PortError, SessionProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::middleware::SESSION_COOKIE;
use crate::web::state::{AppState, RequestSession};

const PASSWORD_MIN: usize = 6;
const EMAIL_MAX: usize = 254;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn validate_credentials(email: &str, password: &str) -> Result<String, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let email = email.trim().to_lowercase();
    if email.is_empty() || email.len() > EMAIL_MAX || !email.contains('@') {
        errors.push(FieldError::new("email", "Please enter a valid email address"));
    }
    if password.chars().count() < PASSWORD_MIN {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at least {} characters", PASSWORD_MIN),
        ));
    }
    if errors.is_empty() {
        Ok(email)
    } else {
        Err(errors)
    }
}

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    )
}

/// Issues a new login token for `user_id` and returns its cookie.
async fn start_session(state: &AppState, user_id: Uuid) -> ApiResult<String> {
    let token = Uuid::new_v4().to_string();
    let ttl = state.config.session_ttl();
    state
        .accounts
        .create_auth_session(&token, user_id, Utc::now() + ttl)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            ApiError::Port(e)
        })?;
    Ok(session_cookie(&token, ttl.num_seconds()))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Invalid email or password"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = validate_credentials(&req.email, &req.password).map_err(MarketError::from)?;

    match state.accounts.get_user_by_email(&email).await {
        Ok(_) => return Err(ApiError::Conflict("An account with this email already exists".to_string())),
        Err(PortError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    let user = state
        .accounts
        .create_user_with_email(&email, &password_hash)
        .await
        .map_err(|e| {
            error!("Failed to create user: {:?}", e);
            ApiError::Port(e)
        })?;
    info!("User {} signed up", user.user_id);

    let cookie = start_session(&state, user.user_id).await?;
    let response = AuthResponse {
        user_id: user.user_id,
        email: user.email.unwrap_or(email),
    };
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    let user_creds = match state.accounts.get_user_by_email(&email).await {
        Ok(creds) => creds,
        Err(PortError::NotFound(_)) => return Err(ApiError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();
    if !valid {
        warn!("Failed login for user {}", user_creds.user_id);
        return Err(ApiError::InvalidCredentials);
    }

    let cookie = start_session(&state, user_creds.user_id).await?;
    info!("User {} logged in", user_creds.user_id);
    let response = AuthResponse {
        user_id: user_creds.user_id,
        email: user_creds.email,
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_session): Extension<RequestSession>,
) -> ApiResult<impl IntoResponse> {
    let (Some(token), Some(session)) = (request_session.token, request_session.state.session())
    else {
        return Err(MarketError::AuthenticationRequired.into());
    };

    let hub = state.session_hub();
    hub.sign_in(token, session.clone());
    hub.sign_out().await?;

    Ok((StatusCode::OK, [(header::SET_COOKIE, session_cookie("", 0))]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_normalized_and_checked() {
        assert_eq!(
            validate_credentials("  Chem@Lab.Test ", "secret1").unwrap(),
            "chem@lab.test"
        );
        let errors = validate_credentials("not-an-email", "123").unwrap_err();
        assert!(errors.for_field("email").is_some());
        assert!(errors.for_field("password").is_some());
    }

    #[test]
    fn logout_cookie_expires_immediately() {
        assert!(session_cookie("", 0).starts_with("session=;"));
        assert!(session_cookie("", 0).ends_with("Max-Age=0"));
    }
}
