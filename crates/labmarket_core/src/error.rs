//! crates/labmarket_core/src/error.rs
//!
//! User-facing error taxonomy for the listing lifecycle.

use crate::navigator::Route;
use crate::ports::PortError;
use crate::validation::{FieldError, ValidationErrors};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketError {
    /// One or more fields were rejected; reported inline, nothing was sent.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("You must be signed in to do that.")]
    AuthenticationRequired,

    #[error("You do not have permission to modify this listing.")]
    Unauthorized,

    #[error("Not found: {message}")]
    NotFound { message: String, fallback: Route },

    /// Any other store failure. Local state is left as it was.
    #[error("{0}")]
    Store(String),
}

impl MarketError {
    /// Where the client should go after this error, if anywhere.
    pub fn redirect(&self) -> Option<Route> {
        match self {
            MarketError::AuthenticationRequired => Some(Route::SignIn),
            MarketError::Unauthorized => Some(Route::Dashboard),
            MarketError::NotFound { fallback, .. } => Some(*fallback),
            MarketError::Validation(_) | MarketError::Store(_) => None,
        }
    }

    /// Replaces the redirect target of a `NotFound`; other errors pass through.
    pub fn with_fallback(self, route: Route) -> Self {
        match self {
            MarketError::NotFound { message, .. } => MarketError::NotFound {
                message,
                fallback: route,
            },
            other => other,
        }
    }
}

impl From<PortError> for MarketError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(message) => MarketError::NotFound {
                message,
                fallback: Route::Browse,
            },
            PortError::Unauthorized => MarketError::Unauthorized,
            PortError::Unexpected(message) => MarketError::Store(message),
        }
    }
}

impl From<ValidationErrors> for MarketError {
    fn from(e: ValidationErrors) -> Self {
        MarketError::Validation(e)
    }
}

impl From<FieldError> for MarketError {
    fn from(e: FieldError) -> Self {
        MarketError::Validation(e.into())
    }
}

/// A convenience type alias for `Result<T, MarketError>`.
pub type MarketResult<T> = Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_errors_map_onto_the_taxonomy() {
        assert_eq!(
            MarketError::from(PortError::Unauthorized),
            MarketError::Unauthorized
        );
        assert!(matches!(
            MarketError::from(PortError::Unexpected("boom".into())),
            MarketError::Store(m) if m == "boom"
        ));
        assert_eq!(
            MarketError::from(PortError::NotFound("x".into())).redirect(),
            Some(Route::Browse)
        );
    }

    #[test]
    fn validation_and_store_errors_stay_in_place() {
        assert_eq!(
            MarketError::Validation(ValidationErrors::default()).redirect(),
            None
        );
        assert_eq!(MarketError::Store("down".into()).redirect(), None);
        assert_eq!(
            MarketError::AuthenticationRequired.redirect(),
            Some(Route::SignIn)
        );
    }
}
