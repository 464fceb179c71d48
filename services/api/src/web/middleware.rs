//! services/api/src/web/middleware.rs
//!
//! Session resolution for every request, and the gate for owner-only routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use labmarket_core::{MarketError, SessionState};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::web::state::{AppState, RequestSession};

pub const SESSION_COOKIE: &str = "session";

/// Extracts the login token from the `session` cookie, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|h| h.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}

/// Middleware that resolves the session cookie into a `RequestSession`.
///
/// Never rejects: an absent, unknown or expired token resolves to
/// `Anonymous`. Only a failing account backend aborts the request.
pub async fn resolve_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(req.headers());
    let hub = state.session_hub();
    let resolved = hub.resolve(token.clone()).await?;
    debug!("Request session resolved as {:?}", resolved.user_id());

    let token = resolved.session().and(token);
    req.extensions_mut().insert(RequestSession {
        state: resolved,
        token,
    });
    Ok(next.run(req).await)
}

/// Middleware for owner-only routes: anonymous callers get a 401 that
/// redirects to the sign-in view.
pub async fn require_session(req: Request, next: Next) -> Result<Response, ApiError> {
    let authenticated = req
        .extensions()
        .get::<RequestSession>()
        .is_some_and(|s| matches!(s.state, SessionState::Authenticated(_)));
    if !authenticated {
        return Err(MarketError::AuthenticationRequired.into());
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_the_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; lang=en"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn cleared_or_missing_cookie_is_no_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_token(&headers), None);
    }
}
