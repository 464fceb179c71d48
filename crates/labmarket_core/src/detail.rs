//! crates/labmarket_core/src/detail.rs
//!
//! Single-listing view with the public part of the seller's profile.

use uuid::Uuid;

use crate::domain::{Listing, SessionState};
use crate::error::{MarketError, MarketResult};
use crate::guard::{self, Capabilities};
use crate::navigator::Route;
use crate::ports::{EquipmentStore, ProfileStore};

/// Seller details shown to everyone. The email is deliberately absent; see
/// `contact::ContactFlow`.
#[derive(Debug, Clone, PartialEq)]
pub struct SellerSummary {
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingDetail {
    pub listing: Listing,
    pub seller: Option<SellerSummary>,
    pub capabilities: Capabilities,
}

pub async fn load_detail(
    equipment: &dyn EquipmentStore,
    profiles: &dyn ProfileStore,
    session: &SessionState,
    listing_id: Uuid,
) -> MarketResult<ListingDetail> {
    let listing = equipment
        .get(session.user_id(), listing_id)
        .await
        .map_err(|e| MarketError::from(e).with_fallback(Route::Browse))?;
    let seller = profiles.get(listing.owner_id).await?.map(|p| SellerSummary {
        full_name: p.full_name,
        company: p.company,
        verified: p.verified,
    });
    let capabilities = guard::capabilities(session, &listing);
    Ok(ListingDetail {
        listing,
        seller,
        capabilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, ListingFields, NewListing};
    use crate::memory::{InMemoryEquipmentStore, InMemoryProfileStore};
    use chrono::Utc;

    #[tokio::test]
    async fn missing_listing_redirects_to_browse() {
        let err = load_detail(
            &InMemoryEquipmentStore::new(),
            &InMemoryProfileStore::new(),
            &SessionState::Anonymous,
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { .. }));
        assert_eq!(err.redirect(), Some(Route::Browse));
    }

    #[tokio::test]
    async fn listing_without_profile_has_no_seller_block() {
        let equipment = InMemoryEquipmentStore::new();
        let listing = equipment.seed(
            NewListing::for_owner(
                ListingFields {
                    name: "Fume hood".into(),
                    brand: "Labconco".into(),
                    model: None,
                    description: None,
                    price: 3000.0,
                    condition: Condition::Good,
                    category: "Safety".into(),
                    location: Some("Austin, TX".into()),
                },
                Uuid::new_v4(),
            ),
            Utc::now(),
        );
        let detail = load_detail(
            &equipment,
            &InMemoryProfileStore::new(),
            &SessionState::Anonymous,
            listing.id,
        )
        .await
        .unwrap();
        assert_eq!(detail.seller, None);
        assert!(detail.capabilities.view && !detail.capabilities.edit);
    }
}
