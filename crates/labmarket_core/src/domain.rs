//! crates/labmarket_core/src/domain.rs
//!
//! Defines the pure, core data structures for the marketplace.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Listing Enumerations
//=========================================================================================

/// Physical condition of a piece of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    New,
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Condition {
    /// Every condition, in the order the condition selector presents them.
    pub const ALL: [Condition; 5] = [
        Condition::New,
        Condition::Excellent,
        Condition::Good,
        Condition::Fair,
        Condition::Poor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::Excellent => "excellent",
            Condition::Good => "good",
            Condition::Fair => "fair",
            Condition::Poor => "poor",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Condition::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Certification of a listing. Set by the store, never by the seller's form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertificationStatus {
    Certified,
    #[default]
    Uncertified,
}

impl CertificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificationStatus::Certified => "certified",
            CertificationStatus::Uncertified => "uncertified",
        }
    }
}

impl FromStr for CertificationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "certified" => Ok(CertificationStatus::Certified),
            "uncertified" => Ok(CertificationStatus::Uncertified),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Public visibility of a listing. Only `Available` listings show up in browse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvailabilityStatus {
    #[default]
    Available,
    Sold,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityStatus::Available => "available",
            AvailabilityStatus::Sold => "sold",
        }
    }
}

impl FromStr for AvailabilityStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(AvailabilityStatus::Available),
            // Older rows used "unavailable" for the same state.
            "sold" | "unavailable" => Ok(AvailabilityStatus::Sold),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Returned when a stored string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

//=========================================================================================
// Equipment Listing
//=========================================================================================

/// The seller-editable part of a listing, already sanitized and validated.
///
/// This is the only shape an update may carry, so owner, creation time and
/// availability can never be rewritten through the edit path.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFields {
    pub name: String,
    pub brand: String,
    pub model: Option<String>,
    pub description: Option<String>,
    pub price: f64,
    pub condition: Condition,
    pub category: String,
    pub location: Option<String>,
}

/// A listing ready to be inserted. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewListing {
    pub fields: ListingFields,
    pub owner_id: Uuid,
    pub availability_status: AvailabilityStatus,
    pub images: Vec<String>,
    pub tags: Vec<String>,
}

impl NewListing {
    /// Binds validated fields to their creator with the creation defaults applied.
    pub fn for_owner(fields: ListingFields, owner_id: Uuid) -> Self {
        Self {
            fields,
            owner_id,
            availability_status: AvailabilityStatus::Available,
            images: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// A single equipment-for-sale record as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub fields: ListingFields,
    pub certification_status: CertificationStatus,
    pub availability_status: AvailabilityStatus,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    pub fn is_available(&self) -> bool {
        self.availability_status == AvailabilityStatus::Available
    }
}

//=========================================================================================
// Seller Profile
//=========================================================================================

/// The public seller profile, one-to-one with a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub company: Option<String>,
    /// Admin-controlled; never written by the owner.
    pub verified: bool,
    pub email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Owner-editable profile fields, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileFields {
    pub full_name: String,
    pub company: Option<String>,
}

//=========================================================================================
// Users and Sessions
//=========================================================================================

// Represents a user - used throughout app
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// The authenticated identity of the current client.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn user_id(&self) -> Uuid {
        self.user.user_id
    }
}

/// What the client currently knows about its identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// The session is still being resolved.
    #[default]
    Unknown,
    Anonymous,
    Authenticated(Session),
}

impl SessionState {
    pub fn from_session(session: Option<Session>) -> Self {
        match session {
            Some(session) => SessionState::Authenticated(session),
            None => SessionState::Anonymous,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.session().map(Session::user_id)
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, SessionState::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_parses_only_the_five_known_values() {
        for c in Condition::ALL {
            assert_eq!(c.as_str().parse::<Condition>(), Ok(c));
        }
        assert!("mint".parse::<Condition>().is_err());
        assert!("Good".parse::<Condition>().is_err());
    }

    #[test]
    fn new_listing_applies_creation_defaults() {
        let owner = Uuid::new_v4();
        let fields = ListingFields {
            name: "Olympus BX51".into(),
            brand: "Olympus".into(),
            model: None,
            description: None,
            price: 1200.0,
            condition: Condition::Excellent,
            category: "Microscopes".into(),
            location: None,
        };
        let listing = NewListing::for_owner(fields, owner);
        assert_eq!(listing.owner_id, owner);
        assert_eq!(listing.availability_status, AvailabilityStatus::Available);
        assert!(listing.images.is_empty());
        assert!(listing.tags.is_empty());
    }

    #[test]
    fn legacy_unavailable_maps_to_sold() {
        assert_eq!(
            "unavailable".parse::<AvailabilityStatus>(),
            Ok(AvailabilityStatus::Sold)
        );
    }
}
