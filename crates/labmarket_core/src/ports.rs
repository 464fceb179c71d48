//! crates/labmarket_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the marketplace core.
//! These traits form the boundary of the hexagonal architecture: the hosted
//! authentication and record store are reached only through them, so the core
//! can be exercised against in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AvailabilityStatus, Listing, ListingFields, NewListing, Profile, ProfileFields, Session,
    SessionState, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Query Types
//=========================================================================================

/// Row filter for `EquipmentStore::list`. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingQuery {
    pub availability_status: Option<AvailabilityStatus>,
    pub owner_id: Option<Uuid>,
}

impl ListingQuery {
    /// Everything the public browse view may show.
    pub fn available() -> Self {
        Self {
            availability_status: Some(AvailabilityStatus::Available),
            owner_id: None,
        }
    }

    /// Everything one owner has listed, whatever its availability.
    pub fn owned_by(owner_id: Uuid) -> Self {
        Self {
            availability_status: None,
            owner_id: Some(owner_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortOrder {
    pub const NEWEST_FIRST: SortOrder = SortOrder {
        field: SortField::CreatedAt,
        direction: SortDirection::Descending,
    };
}

//=========================================================================================
// Subscriptions
//=========================================================================================

/// Callback invoked with the new state on every session change.
pub type SessionCallback = Box<dyn Fn(&SessionState) + Send + Sync>;

/// Handle returned by `SessionProvider::on_change`.
///
/// Dropping the handle unsubscribes, as does calling `unsubscribe`.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The equipment record collection.
///
/// Every call carries the acting user (`None` when anonymous). The store is
/// the system of record for authorization and must reject writes by anyone
/// other than the owner with `PortError::Unauthorized`, whatever the caller
/// checked beforehand.
#[async_trait]
pub trait EquipmentStore: Send + Sync {
    async fn list(
        &self,
        caller: Option<Uuid>,
        query: &ListingQuery,
        order: SortOrder,
    ) -> PortResult<Vec<Listing>>;

    /// Fails with `PortError::NotFound` when no such record exists.
    async fn get(&self, caller: Option<Uuid>, id: Uuid) -> PortResult<Listing>;

    async fn insert(&self, caller: Option<Uuid>, listing: NewListing) -> PortResult<Listing>;

    async fn update(
        &self,
        caller: Option<Uuid>,
        id: Uuid,
        fields: ListingFields,
    ) -> PortResult<Listing>;

    async fn delete(&self, caller: Option<Uuid>, id: Uuid) -> PortResult<()>;
}

/// Seller profiles, keyed by user id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` means no profile row exists yet, which is not an error.
    async fn get(&self, user_id: Uuid) -> PortResult<Option<Profile>>;

    /// Writes the owner-editable fields, creating the row if it is absent.
    async fn update(
        &self,
        user_id: Uuid,
        fields: ProfileFields,
        updated_at: DateTime<Utc>,
    ) -> PortResult<Profile>;
}

/// The hosted authentication backend: users and their login sessions.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn create_user_with_email(&self, email: &str, hashed_password: &str)
        -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the session behind `token`, or `NotFound` if it is unknown or expired.
    async fn validate_auth_session(&self, token: &str) -> PortResult<Session>;

    async fn delete_auth_session(&self, token: &str) -> PortResult<()>;
}

/// Issues the current identity and notifies subscribers when it changes.
///
/// The provider owns the session; everyone else only reads it or subscribes.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_session(&self) -> PortResult<Option<Session>>;

    fn on_change(&self, callback: SessionCallback) -> Subscription;

    async fn sign_out(&self) -> PortResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn subscription_cancels_once_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_unsubscribe_does_not_cancel_twice() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
