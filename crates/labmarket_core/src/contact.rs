//! crates/labmarket_core/src/contact.rs
//!
//! "Contact Seller": the seller's email is only looked up for a signed-in
//! user, and only after they confirm.

use tracing::info;
use uuid::Uuid;

use crate::domain::SessionState;
use crate::error::{MarketError, MarketResult};
use crate::navigator::Route;
use crate::ports::{EquipmentStore, ProfileStore};
use crate::validation::FieldError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactStep {
    /// Anonymous: prompt to sign in. Nothing was fetched.
    SignInRequired,
    /// Show the confirmation dialog for this listing.
    AwaitingConfirmation { listing_id: Uuid },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SellerContact {
    pub listing_id: Uuid,
    pub seller_name: Option<String>,
    pub company: Option<String>,
    pub verified: bool,
    /// `None` renders as "not available".
    pub email: Option<String>,
}

#[derive(Debug, Default)]
pub struct ContactFlow {
    awaiting: Option<Uuid>,
}

impl ContactFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn awaiting(&self) -> Option<Uuid> {
        self.awaiting
    }

    /// Starts the flow. Never touches the network.
    pub fn request(&mut self, session: &SessionState, listing_id: Uuid) -> ContactStep {
        if session.session().is_none() {
            self.awaiting = None;
            return ContactStep::SignInRequired;
        }
        self.awaiting = Some(listing_id);
        ContactStep::AwaitingConfirmation { listing_id }
    }

    pub fn cancel(&mut self) {
        self.awaiting = None;
    }

    /// Reveals the seller's contact details for the listing awaiting confirmation.
    pub async fn confirm(
        &mut self,
        session: &SessionState,
        equipment: &dyn EquipmentStore,
        profiles: &dyn ProfileStore,
    ) -> MarketResult<SellerContact> {
        let caller = session
            .user_id()
            .ok_or(MarketError::AuthenticationRequired)?;
        let listing_id = self
            .awaiting
            .take()
            .ok_or_else(|| FieldError::new("listing", "Contact was not requested"))?;

        let listing = equipment.get(Some(caller), listing_id).await?;
        let profile = profiles.get(listing.owner_id).await?;
        info!("Seller contact for listing {} revealed to {}", listing_id, caller);

        Ok(match profile {
            Some(p) => SellerContact {
                listing_id,
                seller_name: p.full_name,
                company: p.company,
                verified: p.verified,
                email: p.email,
            },
            None => SellerContact {
                listing_id,
                seller_name: None,
                company: None,
                verified: false,
                email: None,
            },
        })
    }
}

/// One-shot form of the flow for request/response callers: without
/// `confirmed` the caller gets the confirmation step back and nothing is fetched.
pub async fn contact_seller(
    session: &SessionState,
    listing_id: Uuid,
    confirmed: bool,
    equipment: &dyn EquipmentStore,
    profiles: &dyn ProfileStore,
) -> MarketResult<Result<SellerContact, ContactStep>> {
    let mut flow = ContactFlow::new();
    match flow.request(session, listing_id) {
        ContactStep::SignInRequired => Err(MarketError::AuthenticationRequired),
        step if !confirmed => Ok(Err(step)),
        _ => flow
            .confirm(session, equipment, profiles)
            .await
            .map(Ok)
            .map_err(|e| e.with_fallback(Route::Browse)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, ListingFields, NewListing, Profile, Session, User};
    use crate::memory::{InMemoryEquipmentStore, InMemoryProfileStore};
    use chrono::Utc;

    fn setup() -> (InMemoryEquipmentStore, InMemoryProfileStore, Uuid) {
        let equipment = InMemoryEquipmentStore::new();
        let profiles = InMemoryProfileStore::new();
        let seller = Uuid::new_v4();
        let listing = equipment.seed(
            NewListing::for_owner(
                ListingFields {
                    name: "Olympus BX51".into(),
                    brand: "Olympus".into(),
                    model: None,
                    description: None,
                    price: 2000.0,
                    condition: Condition::Excellent,
                    category: "Microscopes".into(),
                    location: None,
                },
                seller,
            ),
            Utc::now(),
        );
        profiles.seed(Profile {
            user_id: seller,
            full_name: Some("Rosalind Franklin".into()),
            company: None,
            verified: true,
            email: Some("seller@lab.test".into()),
            updated_at: Utc::now(),
        });
        (equipment, profiles, listing.id)
    }

    fn buyer() -> SessionState {
        SessionState::Authenticated(Session {
            user: User {
                user_id: Uuid::new_v4(),
                email: None,
            },
            expires_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn anonymous_request_makes_no_calls() {
        let (equipment, profiles, id) = setup();
        let mut flow = ContactFlow::new();
        assert_eq!(
            flow.request(&SessionState::Anonymous, id),
            ContactStep::SignInRequired
        );
        assert!(flow
            .confirm(&SessionState::Anonymous, &equipment, &profiles)
            .await
            .is_err());
        assert_eq!(equipment.calls() + profiles.calls(), 0);
    }

    #[tokio::test]
    async fn email_revealed_only_after_confirmation() {
        let (equipment, profiles, id) = setup();
        let session = buyer();
        let mut flow = ContactFlow::new();
        assert_eq!(
            flow.request(&session, id),
            ContactStep::AwaitingConfirmation { listing_id: id }
        );
        assert_eq!(profiles.calls(), 0);

        let contact = flow.confirm(&session, &equipment, &profiles).await.unwrap();
        assert_eq!(contact.email.as_deref(), Some("seller@lab.test"));
        assert!(contact.verified);
        assert_eq!(flow.awaiting(), None);
    }

    #[tokio::test]
    async fn unconfirmed_one_shot_returns_the_dialog_step() {
        let (equipment, profiles, id) = setup();
        let step = contact_seller(&buyer(), id, false, &equipment, &profiles)
            .await
            .unwrap();
        assert_eq!(step, Err(ContactStep::AwaitingConfirmation { listing_id: id }));
        assert_eq!(equipment.calls() + profiles.calls(), 0);
    }
}
