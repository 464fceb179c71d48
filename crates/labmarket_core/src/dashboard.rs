//! crates/labmarket_core/src/dashboard.rs
//!
//! The owner dashboard: every listing the signed-in user created, newest
//! first, with a two-step (request, confirm) delete.

use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collection::{Applied, CollectionView, FetchRequest, FetchTicket};
use crate::domain::{Listing, SessionState};
use crate::error::{MarketError, MarketResult};
use crate::guard;
use crate::navigator::{Navigator, Route};
use crate::ports::{EquipmentStore, ListingQuery, PortResult};
use crate::validation::FieldError;

pub const EMPTY_DASHBOARD_MESSAGE: &str = "You have not listed any equipment yet.";

pub struct Dashboard {
    store: Arc<dyn EquipmentStore>,
    view: CollectionView,
    pending_delete: Option<Uuid>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn EquipmentStore>) -> Self {
        Self {
            store,
            view: CollectionView::new(ListingQuery::default()),
            pending_delete: None,
        }
    }

    pub fn listings(&self) -> &[Listing] {
        self.view.all()
    }

    pub fn view(&self) -> &CollectionView {
        &self.view
    }

    pub fn pending_delete(&self) -> Option<Uuid> {
        self.pending_delete
    }

    /// Starts an owner-scoped fetch.
    ///
    /// Refused unless the navigator has an authenticated session, so no owner
    /// data is requested while the identity is unknown or anonymous.
    pub fn begin_load(
        &mut self,
        navigator: &Navigator,
        session: &SessionState,
    ) -> MarketResult<FetchRequest> {
        let owner = match session.user_id() {
            Some(owner) if navigator.can_fetch_owner_data() => owner,
            _ => return Err(MarketError::AuthenticationRequired),
        };
        if !self.view.is_mounted() {
            self.view.mount();
        }
        self.view.set_query(ListingQuery::owned_by(owner));
        Ok(self.view.request(Some(owner)))
    }

    pub fn apply(&mut self, ticket: FetchTicket, result: PortResult<Vec<Listing>>) -> Applied {
        self.view.apply_fetch(ticket, result)
    }

    /// Fetches and applies the owner's listings.
    pub async fn load(&mut self, navigator: &Navigator, session: &SessionState) -> MarketResult<()> {
        let request = self.begin_load(navigator, session)?;
        let result = request.run(self.store.as_ref()).await;
        let failed = result.is_err();
        if self.apply(request.ticket, result) == Applied::Applied && failed {
            return Err(MarketError::Store(
                "Failed to load your equipment.".to_string(),
            ));
        }
        Ok(())
    }

    /// Drops all owner data, e.g. after sign-out. Pending fetches become stale.
    pub fn invalidate(&mut self) {
        self.view.unmount();
        self.view.clear();
        self.pending_delete = None;
    }

    pub fn empty_message(&self) -> Option<&'static str> {
        self.view.all().is_empty().then_some(EMPTY_DASHBOARD_MESSAGE)
    }

    /// First step of a delete: remembers the target and asks for confirmation.
    ///
    /// A listing outside the loaded set is looked up in the store, so a
    /// foreign listing is refused as `Unauthorized` rather than `NotFound`.
    pub async fn request_delete(
        &mut self,
        session: &SessionState,
        listing_id: Uuid,
    ) -> MarketResult<()> {
        let caller = session
            .user_id()
            .ok_or(MarketError::AuthenticationRequired)?;
        let loaded = self.view.all().iter().find(|l| l.id == listing_id).cloned();
        let listing = match loaded {
            Some(listing) => listing,
            None => self
                .store
                .get(Some(caller), listing_id)
                .await
                .map_err(|e| MarketError::from(e).with_fallback(Route::Dashboard))?,
        };
        if !guard::capabilities(session, &listing).delete {
            warn!("Delete of listing {} refused for non-owner {}", listing_id, caller);
            return Err(MarketError::Unauthorized);
        }
        self.pending_delete = Some(listing_id);
        Ok(())
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Second step: deletes the pending listing, then reloads the dashboard.
    ///
    /// The pending target is cleared whatever the outcome. If the delete fails
    /// the listed records are left untouched. Once the delete succeeded the
    /// result is `Ok` even if the reload fails; that failure shows up as
    /// `LoadState::Failed` on the view, which no longer lists the deleted row.
    pub async fn confirm_delete(
        &mut self,
        navigator: &Navigator,
        session: &SessionState,
    ) -> MarketResult<Uuid> {
        let listing_id = self.pending_delete.take().ok_or_else(|| {
            MarketError::from(FieldError::new("listing", "No deletion is pending"))
        })?;
        let caller = session
            .user_id()
            .ok_or(MarketError::AuthenticationRequired)?;

        self.store.delete(Some(caller), listing_id).await.map_err(|e| {
            error!("Failed to delete listing {}: {:?}", listing_id, e);
            MarketError::from(e).with_fallback(Route::Dashboard)
        })?;
        info!("Listing {} deleted by {}", listing_id, caller);
        self.view.forget(listing_id);

        if let Err(e) = self.load(navigator, session).await {
            warn!("Dashboard reload after deleting {} failed: {}", listing_id, e);
        }
        Ok(listing_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, ListingFields, NewListing, Session, User};
    use crate::collection::LoadState;
    use crate::memory::InMemoryEquipmentStore;
    use chrono::Utc;

    fn session_for(user_id: Uuid) -> SessionState {
        SessionState::Authenticated(Session {
            user: User {
                user_id,
                email: None,
            },
            expires_at: Utc::now(),
        })
    }

    fn seed(store: &InMemoryEquipmentStore, owner: Uuid, name: &str) -> Listing {
        store.seed(
            NewListing::for_owner(
                ListingFields {
                    name: name.into(),
                    brand: "Thermo".into(),
                    model: None,
                    description: None,
                    price: 50.0,
                    condition: Condition::Fair,
                    category: "Spectroscopy".into(),
                    location: None,
                },
                owner,
            ),
            Utc::now(),
        )
    }

    fn authenticated_nav(session: &SessionState) -> Navigator {
        let mut nav = Navigator::new(Route::Dashboard);
        nav.on_session_change(session);
        nav
    }

    #[tokio::test]
    async fn no_fetch_while_unknown_or_anonymous() {
        let store = Arc::new(InMemoryEquipmentStore::new());
        let mut dashboard = Dashboard::new(store.clone());
        let nav = Navigator::new(Route::Dashboard);
        assert_eq!(
            dashboard.load(&nav, &SessionState::Unknown).await,
            Err(MarketError::AuthenticationRequired)
        );
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn shows_only_the_owners_listings() {
        let store = Arc::new(InMemoryEquipmentStore::new());
        let owner = Uuid::new_v4();
        seed(&store, owner, "Mine");
        seed(&store, Uuid::new_v4(), "Theirs");
        let session = session_for(owner);

        let mut dashboard = Dashboard::new(store);
        dashboard.load(&authenticated_nav(&session), &session).await.unwrap();
        let names: Vec<_> = dashboard.listings().iter().map(|l| l.fields.name.as_str()).collect();
        assert_eq!(names, ["Mine"]);
        assert_eq!(dashboard.empty_message(), None);
    }

    #[tokio::test]
    async fn delete_needs_confirmation_then_refreshes() {
        let store = Arc::new(InMemoryEquipmentStore::new());
        let owner = Uuid::new_v4();
        let listing = seed(&store, owner, "Spectrometer");
        let session = session_for(owner);
        let nav = authenticated_nav(&session);

        let mut dashboard = Dashboard::new(store.clone());
        dashboard.load(&nav, &session).await.unwrap();
        dashboard.request_delete(&session, listing.id).await.unwrap();
        assert_eq!(dashboard.pending_delete(), Some(listing.id));

        dashboard.cancel_delete();
        assert!(dashboard.confirm_delete(&nav, &session).await.is_err());
        assert_eq!(dashboard.listings().len(), 1);

        dashboard.request_delete(&session, listing.id).await.unwrap();
        assert_eq!(dashboard.confirm_delete(&nav, &session).await, Ok(listing.id));
        assert_eq!(dashboard.empty_message(), Some(EMPTY_DASHBOARD_MESSAGE));
    }

    #[tokio::test]
    async fn failed_delete_leaves_listings_in_place() {
        let store = Arc::new(InMemoryEquipmentStore::new());
        let owner = Uuid::new_v4();
        let listing = seed(&store, owner, "Balance");
        let session = session_for(owner);
        let nav = authenticated_nav(&session);

        let mut dashboard = Dashboard::new(store.clone());
        dashboard.load(&nav, &session).await.unwrap();
        dashboard.request_delete(&session, listing.id).await.unwrap();
        store.fail_next("row locked");
        assert_eq!(
            dashboard.confirm_delete(&nav, &session).await,
            Err(MarketError::Store("row locked".into()))
        );
        assert_eq!(dashboard.listings().len(), 1);
        assert_eq!(dashboard.pending_delete(), None);
    }

    #[tokio::test]
    async fn deleting_a_foreign_listing_is_unauthorized() {
        let store = Arc::new(InMemoryEquipmentStore::new());
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let listing = seed(&store, owner, "Fume Hood");
        let session = session_for(intruder);
        let nav = authenticated_nav(&session);

        let mut dashboard = Dashboard::new(store.clone());
        dashboard.load(&nav, &session).await.unwrap();
        assert_eq!(
            dashboard.request_delete(&session, listing.id).await,
            Err(MarketError::Unauthorized)
        );
        assert_eq!(dashboard.pending_delete(), None);

        let missing = dashboard.request_delete(&session, Uuid::new_v4()).await;
        assert!(matches!(
            missing,
            Err(MarketError::NotFound { fallback: Route::Dashboard, .. })
        ));
        assert!(store.get(Some(owner), listing.id).await.is_ok());
    }

    #[tokio::test]
    async fn failed_reload_does_not_undo_a_completed_delete() {
        let store = Arc::new(InMemoryEquipmentStore::new());
        let owner = Uuid::new_v4();
        let doomed = seed(&store, owner, "Autoclave");
        seed(&store, owner, "Vortex Mixer");
        let session = session_for(owner);
        let nav = authenticated_nav(&session);

        let mut dashboard = Dashboard::new(store.clone());
        dashboard.load(&nav, &session).await.unwrap();
        dashboard.request_delete(&session, doomed.id).await.unwrap();
        // The delete is the first store call, the reload the second.
        store.fail_nth(2, "replica lag");

        assert_eq!(dashboard.confirm_delete(&nav, &session).await, Ok(doomed.id));
        assert!(matches!(dashboard.view().load_state(), LoadState::Failed(_)));
        let names: Vec<_> = dashboard.listings().iter().map(|l| l.fields.name.as_str()).collect();
        assert_eq!(names, ["Vortex Mixer"]);
        assert!(store.get(Some(owner), doomed.id).await.is_err());
    }

    #[tokio::test]
    async fn invalidate_discards_in_flight_results() {
        let store = Arc::new(InMemoryEquipmentStore::new());
        let owner = Uuid::new_v4();
        seed(&store, owner, "Incubator");
        let session = session_for(owner);
        let nav = authenticated_nav(&session);

        let mut dashboard = Dashboard::new(store.clone());
        let request = dashboard.begin_load(&nav, &session).unwrap();
        let result = request.run(&*store).await;
        dashboard.invalidate();
        assert_eq!(dashboard.apply(request.ticket, result), Applied::Stale);
        assert!(dashboard.listings().is_empty());
    }
}
