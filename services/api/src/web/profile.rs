//! services/api/src/web/profile.rs
//!
//! The signed-in user's own seller profile.

use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use labmarket_core::profile::{load_profile, save_profile, ProfilePage};
use labmarket_core::validation::ProfileDraft;
use labmarket_core::Profile;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{ApiResult, ErrorBody};
use crate::web::state::{AppState, RequestSession};

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ProfileRequest {
    pub full_name: String,
    pub company: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub full_name: String,
    pub company: Option<String>,
    /// Read-only; comes from the account, not the profile.
    pub email: Option<String>,
    pub verified: bool,
    /// False until the first save.
    pub exists: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<ProfilePage> for ProfileResponse {
    fn from(page: ProfilePage) -> Self {
        Self {
            full_name: page.draft.full_name,
            company: page.draft.company,
            email: page.email,
            verified: page.verified,
            exists: page.exists,
            updated_at: page.updated_at,
        }
    }
}

impl ProfileResponse {
    fn saved(profile: Profile, session_email: Option<String>) -> Self {
        Self {
            full_name: profile.full_name.unwrap_or_default(),
            company: profile.company,
            email: session_email,
            verified: profile.verified,
            exists: true,
            updated_at: Some(profile.updated_at),
        }
    }
}

/// GET /profile - The caller's profile, or empty defaults if none exists yet
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "The caller's profile", body = ProfileResponse),
        (status = 401, description = "Not signed in; redirects to sign-in", body = ErrorBody),
        (status = 502, description = "Could not load profile", body = ErrorBody)
    )
)]
pub async fn get_profile_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<RequestSession>,
) -> ApiResult<Json<ProfileResponse>> {
    let page = load_profile(app_state.profiles.as_ref(), &session.state).await?;
    Ok(Json(page.into()))
}

/// PUT /profile - Save full name and company
#[utoipa::path(
    put,
    path = "/profile",
    request_body = ProfileRequest,
    responses(
        (status = 200, description = "Profile saved", body = ProfileResponse),
        (status = 401, description = "Not signed in; redirects to sign-in", body = ErrorBody),
        (status = 422, description = "Invalid fields", body = ErrorBody)
    )
)]
pub async fn update_profile_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<RequestSession>,
    Json(req): Json<ProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    let draft = ProfileDraft {
        full_name: req.full_name,
        company: req.company,
    };
    let profile = save_profile(app_state.profiles.as_ref(), &session.state, &draft, Utc::now()).await?;
    let email = session
        .state
        .session()
        .and_then(|s| s.user.email.clone());
    Ok(Json(ProfileResponse::saved(profile, email)))
}
