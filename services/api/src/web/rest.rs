//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{ApiError, ApiResult, ErrorBody, FieldErrorBody};
use crate::web::auth::{AuthResponse, LoginRequest, SignupRequest};
use crate::web::profile::{ProfileRequest, ProfileResponse};
use crate::web::state::{AppState, RequestSession};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use labmarket_core::contact::{contact_seller, ContactStep, SellerContact};
use labmarket_core::collection::LoadState;
use labmarket_core::dashboard::Dashboard;
use labmarket_core::detail::{load_detail, SellerSummary};
use labmarket_core::guard::Capabilities;
use labmarket_core::listing_form::{ListingForm, Submitted};
use labmarket_core::validation::{FieldError, ListingDraft};
use labmarket_core::{
    CollectionView, Condition, Gate, Listing, ListingFilter, MarketError, Navigator, Route,
    Selection,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        browse_handler,
        detail_handler,
        create_listing_handler,
        edit_form_handler,
        update_listing_handler,
        delete_listing_handler,
        contact_seller_handler,
        dashboard_handler,
        crate::web::profile::get_profile_handler,
        crate::web::profile::update_profile_handler,
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
    ),
    components(
        schemas(
            ListingDto, ListingInput, PriceInput, BrowseResponse, DetailResponse, SellerDto,
            CapabilitiesDto, EditFormResponse, SubmitResponse, ContactResponse, SellerContactDto,
            DashboardResponse, ProfileRequest, ProfileResponse, SignupRequest, LoginRequest,
            AuthResponse, ErrorBody, FieldErrorBody
        )
    ),
    tags(
        (name = "Lab Equipment Marketplace API", description = "Browse, list and manage used laboratory equipment.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A listing as sent to the browser.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListingDto {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub brand: String,
    pub model: Option<String>,
    pub description: Option<String>,
    pub price: f64,
    pub condition: String,
    pub category: String,
    pub location: Option<String>,
    pub certification_status: String,
    pub availability_status: String,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Listing> for ListingDto {
    fn from(listing: &Listing) -> Self {
        let fields = &listing.fields;
        Self {
            id: listing.id,
            owner_id: listing.owner_id,
            name: fields.name.clone(),
            brand: fields.brand.clone(),
            model: fields.model.clone(),
            description: fields.description.clone(),
            price: fields.price,
            condition: fields.condition.to_string(),
            category: fields.category.clone(),
            location: fields.location.clone(),
            certification_status: listing.certification_status.as_str().to_string(),
            availability_status: listing.availability_status.as_str().to_string(),
            images: listing.images.clone(),
            tags: listing.tags.clone(),
            created_at: listing.created_at,
        }
    }
}

/// Price as typed into the form: a JSON number or a numeric string.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum PriceInput {
    Number(f64),
    Text(String),
}

impl Default for PriceInput {
    fn default() -> Self {
        PriceInput::Text(String::new())
    }
}

/// The listing form body. Missing fields count as empty and fail validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ListingInput {
    pub name: String,
    pub brand: String,
    pub model: Option<String>,
    pub description: Option<String>,
    pub price: PriceInput,
    pub condition: String,
    pub category: String,
    pub location: Option<String>,
}

impl From<ListingInput> for ListingDraft {
    fn from(input: ListingInput) -> Self {
        ListingDraft {
            name: input.name,
            brand: input.brand,
            model: input.model,
            description: input.description,
            price: match input.price {
                PriceInput::Number(n) => n.to_string(),
                PriceInput::Text(s) => s,
            },
            condition: input.condition,
            category: input.category,
            location: input.location,
        }
    }
}

impl From<&ListingDraft> for ListingInput {
    fn from(draft: &ListingDraft) -> Self {
        ListingInput {
            name: draft.name.clone(),
            brand: draft.brand.clone(),
            model: draft.model.clone(),
            description: draft.description.clone(),
            price: PriceInput::Text(draft.price.clone()),
            condition: draft.condition.clone(),
            category: draft.category.clone(),
            location: draft.location.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct BrowseQuery {
    /// Case-insensitive substring of name, brand or category.
    pub search: Option<String>,
    /// Exact category, or `all`.
    pub category: Option<String>,
    /// One of the condition values, or `all`.
    pub condition: Option<String>,
}

impl BrowseQuery {
    pub fn to_filter(&self) -> Result<ListingFilter, FieldError> {
        let selected = |raw: &Option<String>| {
            raw.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
                .map(str::to_string)
        };
        let condition = match selected(&self.condition) {
            None => Selection::All,
            Some(raw) => Selection::Only(
                raw.to_lowercase()
                    .parse::<Condition>()
                    .map_err(|_| FieldError::new("condition", format!("Unknown condition '{}'", raw)))?,
            ),
        };
        Ok(ListingFilter {
            search: self.search.clone().unwrap_or_default(),
            category: selected(&self.category).map_or(Selection::All, Selection::Only),
            condition,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BrowseResponse {
    pub items: Vec<ListingDto>,
    /// Distinct categories of every available listing, ignoring the active filters.
    pub categories: Vec<String>,
    pub conditions: Vec<String>,
    pub count: usize,
    pub summary: String,
}

impl BrowseResponse {
    pub fn from_view(view: &CollectionView) -> Self {
        let items: Vec<ListingDto> = view.visible().into_iter().map(ListingDto::from).collect();
        Self {
            count: items.len(),
            items,
            categories: view.categories().to_vec(),
            conditions: Condition::ALL.iter().map(|c| c.to_string()).collect(),
            summary: view.summary(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SellerDto {
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub verified: bool,
}

impl From<SellerSummary> for SellerDto {
    fn from(seller: SellerSummary) -> Self {
        Self {
            full_name: seller.full_name,
            company: seller.company,
            verified: seller.verified,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CapabilitiesDto {
    pub view: bool,
    pub edit: bool,
    pub delete: bool,
}

impl From<Capabilities> for CapabilitiesDto {
    fn from(c: Capabilities) -> Self {
        Self {
            view: c.view,
            edit: c.edit,
            delete: c.delete,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DetailResponse {
    pub listing: ListingDto,
    pub seller: Option<SellerDto>,
    pub capabilities: CapabilitiesDto,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EditFormResponse {
    pub listing_id: Uuid,
    pub draft: ListingInput,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    pub listing: ListingDto,
    pub redirect: String,
}

impl From<Submitted> for SubmitResponse {
    fn from(submitted: Submitted) -> Self {
        Self {
            listing: ListingDto::from(&submitted.listing),
            redirect: submitted.redirect.path(),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ConfirmQuery {
    /// Must be `true` for the action to happen.
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SellerContactDto {
    pub listing_id: Uuid,
    pub seller_name: Option<String>,
    pub company: Option<String>,
    pub verified: bool,
    /// Absent when the seller has no email on file.
    pub email: Option<String>,
}

impl From<SellerContact> for SellerContactDto {
    fn from(c: SellerContact) -> Self {
        Self {
            listing_id: c.listing_id,
            seller_name: c.seller_name,
            company: c.company,
            verified: c.verified,
            email: c.email,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContactResponse {
    /// Ask the buyer to confirm; nothing was looked up.
    ConfirmationRequired { listing_id: Uuid },
    Revealed { contact: SellerContactDto },
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardResponse {
    pub items: Vec<ListingDto>,
    pub count: usize,
    pub empty_message: Option<String>,
    /// Set when the last reload failed and `items` may be out of date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload_error: Option<String>,
}

impl DashboardResponse {
    pub fn from_dashboard(dashboard: &Dashboard) -> Self {
        let items: Vec<ListingDto> = dashboard.listings().iter().map(ListingDto::from).collect();
        let reload_error = match dashboard.view().load_state() {
            LoadState::Failed(_) => Some("Failed to load your equipment.".to_string()),
            _ => None,
        };
        Self {
            count: items.len(),
            items,
            empty_message: dashboard.empty_message().map(str::to_string),
            reload_error,
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// A navigator for one request, already told the request's identity.
fn navigator_for(route: Route, session: &RequestSession) -> Result<Navigator, MarketError> {
    let mut navigator = Navigator::new(route);
    match navigator.on_session_change(&session.state) {
        Gate::Render => Ok(navigator),
        Gate::Loading | Gate::Redirect(_) => Err(MarketError::AuthenticationRequired),
    }
}

async fn loaded_dashboard(state: &AppState, session: &RequestSession) -> ApiResult<(Dashboard, Navigator)> {
    let navigator = navigator_for(Route::Dashboard, session)?;
    let mut dashboard = Dashboard::new(state.equipment.clone());
    dashboard.load(&navigator, &session.state).await?;
    Ok((dashboard, navigator))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Browse available equipment.
///
/// Fetches every available listing once and applies the search, category and
/// condition filters to that set.
#[utoipa::path(
    get,
    path = "/equipment",
    params(BrowseQuery),
    responses(
        (status = 200, description = "Available listings, newest first", body = BrowseResponse),
        (status = 422, description = "Unknown condition filter", body = ErrorBody),
        (status = 502, description = "Store unavailable", body = ErrorBody)
    )
)]
pub async fn browse_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<RequestSession>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Json<BrowseResponse>> {
    let filter = query.to_filter().map_err(MarketError::from)?;
    let mut view = CollectionView::default();
    view.refresh(app_state.equipment.as_ref(), session.state.user_id())
        .await?;
    view.set_filter(filter);
    Ok(Json(BrowseResponse::from_view(&view)))
}

/// Show one listing with its seller and what the caller may do with it.
#[utoipa::path(
    get,
    path = "/equipment/{id}",
    params(("id" = Uuid, Path, description = "Listing id")),
    responses(
        (status = 200, description = "The listing", body = DetailResponse),
        (status = 404, description = "No such listing; redirects to browse", body = ErrorBody)
    )
)]
pub async fn detail_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<RequestSession>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DetailResponse>> {
    let detail = load_detail(
        app_state.equipment.as_ref(),
        app_state.profiles.as_ref(),
        &session.state,
        id,
    )
    .await?;
    Ok(Json(DetailResponse {
        listing: ListingDto::from(&detail.listing),
        seller: detail.seller.map(SellerDto::from),
        capabilities: detail.capabilities.into(),
    }))
}

/// Create a listing owned by the signed-in user.
#[utoipa::path(
    post,
    path = "/equipment",
    request_body = ListingInput,
    responses(
        (status = 201, description = "Listing created", body = SubmitResponse),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 422, description = "Invalid fields", body = ErrorBody)
    )
)]
pub async fn create_listing_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<RequestSession>,
    Json(input): Json<ListingInput>,
) -> ApiResult<impl IntoResponse> {
    let form = ListingForm::open(app_state.equipment.clone(), &session.state, None).await?;
    let submitted = form.submit(&session.state, &input.into()).await?;
    Ok((StatusCode::CREATED, Json(SubmitResponse::from(submitted))))
}

/// Prefill values for editing a listing. Only its owner gets them.
#[utoipa::path(
    get,
    path = "/equipment/{id}/edit",
    params(("id" = Uuid, Path, description = "Listing id")),
    responses(
        (status = 200, description = "Current values", body = EditFormResponse),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Not the owner; redirects to dashboard", body = ErrorBody),
        (status = 404, description = "No such listing", body = ErrorBody)
    )
)]
pub async fn edit_form_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<RequestSession>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EditFormResponse>> {
    let form = ListingForm::open(app_state.equipment.clone(), &session.state, Some(id)).await?;
    Ok(Json(EditFormResponse {
        listing_id: id,
        draft: ListingInput::from(form.draft()),
    }))
}

/// Rewrite the seller-editable fields of a listing.
#[utoipa::path(
    put,
    path = "/equipment/{id}",
    params(("id" = Uuid, Path, description = "Listing id")),
    request_body = ListingInput,
    responses(
        (status = 200, description = "Listing updated", body = SubmitResponse),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 422, description = "Invalid fields", body = ErrorBody)
    )
)]
pub async fn update_listing_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<RequestSession>,
    Path(id): Path<Uuid>,
    Json(input): Json<ListingInput>,
) -> ApiResult<Json<SubmitResponse>> {
    let form = ListingForm::open(app_state.equipment.clone(), &session.state, Some(id)).await?;
    let submitted = form.submit(&session.state, &input.into()).await?;
    Ok(Json(SubmitResponse::from(submitted)))
}

/// Delete one of the caller's listings. Requires `confirm=true`.
#[utoipa::path(
    delete,
    path = "/equipment/{id}",
    params(("id" = Uuid, Path, description = "Listing id"), ConfirmQuery),
    responses(
        (status = 200, description = "Deleted; the refreshed dashboard", body = DashboardResponse),
        (status = 401, description = "Not signed in", body = ErrorBody),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "No such listing", body = ErrorBody),
        (status = 409, description = "Deletion was not confirmed", body = ErrorBody)
    )
)]
pub async fn delete_listing_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<RequestSession>,
    Path(id): Path<Uuid>,
    Query(query): Query<ConfirmQuery>,
) -> ApiResult<Json<DashboardResponse>> {
    let (mut dashboard, navigator) = loaded_dashboard(&app_state, &session).await?;
    dashboard.request_delete(&session.state, id).await?;
    if !query.confirm {
        dashboard.cancel_delete();
        return Err(ApiError::Conflict(
            "Are you sure you want to delete this listing? Repeat with confirm=true.".to_string(),
        ));
    }
    dashboard.confirm_delete(&navigator, &session.state).await?;
    Ok(Json(DashboardResponse::from_dashboard(&dashboard)))
}

/// Reveal the seller's contact details. Needs a signed-in buyer and `confirm=true`.
#[utoipa::path(
    post,
    path = "/equipment/{id}/contact",
    params(("id" = Uuid, Path, description = "Listing id"), ConfirmQuery),
    responses(
        (status = 200, description = "Confirmation prompt, or the seller's details", body = ContactResponse),
        (status = 401, description = "Not signed in; redirects to sign-in", body = ErrorBody),
        (status = 404, description = "No such listing", body = ErrorBody)
    )
)]
pub async fn contact_seller_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<RequestSession>,
    Path(id): Path<Uuid>,
    Query(query): Query<ConfirmQuery>,
) -> ApiResult<Json<ContactResponse>> {
    let outcome = contact_seller(
        &session.state,
        id,
        query.confirm,
        app_state.equipment.as_ref(),
        app_state.profiles.as_ref(),
    )
    .await?;
    Ok(Json(match outcome {
        Ok(contact) => ContactResponse::Revealed {
            contact: contact.into(),
        },
        Err(ContactStep::AwaitingConfirmation { listing_id }) => {
            ContactResponse::ConfirmationRequired { listing_id }
        }
        Err(ContactStep::SignInRequired) => return Err(MarketError::AuthenticationRequired.into()),
    }))
}

/// Every listing the caller created, whatever its availability.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "The caller's listings, newest first", body = DashboardResponse),
        (status = 401, description = "Not signed in; redirects to sign-in", body = ErrorBody)
    )
)]
pub async fn dashboard_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<RequestSession>,
) -> ApiResult<Json<DashboardResponse>> {
    let (dashboard, _) = loaded_dashboard(&app_state, &session).await?;
    info!("Dashboard loaded with {} listings", dashboard.listings().len());
    Ok(Json(DashboardResponse::from_dashboard(&dashboard)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_prices_become_the_same_draft() {
        let from_number: ListingInput =
            serde_json::from_str(r#"{"name":"Vortex","price":125.5}"#).unwrap();
        let from_text: ListingInput =
            serde_json::from_str(r#"{"name":"Vortex","price":"125.5"}"#).unwrap();
        assert_eq!(ListingDraft::from(from_number).price, "125.5");
        assert_eq!(ListingDraft::from(from_text).price, "125.5");
    }

    #[test]
    fn missing_fields_are_empty_not_rejected() {
        let input: ListingInput = serde_json::from_str("{}").unwrap();
        let draft = ListingDraft::from(input);
        assert_eq!(draft.name, "");
        assert_eq!(draft.price, "");
    }

    #[test]
    fn all_and_blank_select_everything() {
        let query = BrowseQuery {
            search: None,
            category: Some("all".into()),
            condition: Some(" ".into()),
        };
        let filter = query.to_filter().unwrap();
        assert!(filter.is_default());
    }

    #[test]
    fn unknown_condition_is_a_field_error() {
        let query = BrowseQuery {
            condition: Some("refurbished".into()),
            ..BrowseQuery::default()
        };
        assert_eq!(query.to_filter().unwrap_err().field, "condition");
    }

    #[test]
    fn condition_filter_is_case_insensitive() {
        let query = BrowseQuery {
            condition: Some("Poor".into()),
            ..BrowseQuery::default()
        };
        assert_eq!(
            query.to_filter().unwrap().condition,
            Selection::Only(Condition::Poor)
        );
    }
}
