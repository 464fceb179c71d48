//! crates/labmarket_core/src/collection.rs
//!
//! The browse view's local model: the last fetched set of available
//! listings, the three filter predicates, and the derived category facet.
//!
//! Fetching and filtering are separate. Filters re-evaluate synchronously over
//! the loaded set and never touch the store. Fetches are issued with a
//! `FetchTicket`; a result is applied only if its ticket is still the newest
//! one and the view is still mounted.

use tracing::{debug, error};
use uuid::Uuid;

use crate::domain::{Condition, Listing};
use crate::error::{MarketError, MarketResult};
use crate::ports::{EquipmentStore, ListingQuery, PortResult, SortOrder};

pub const NO_RESULTS_MESSAGE: &str = "No equipment found";

//=========================================================================================
// Filter Predicates
//=========================================================================================

/// Exact-match selector with an "all" wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection<T> {
    #[default]
    All,
    Only(T),
}

impl<T: PartialEq> Selection<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(wanted) => wanted == value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListingFilter {
    pub search: String,
    pub category: Selection<String>,
    pub condition: Selection<Condition>,
}

impl ListingFilter {
    /// Case-insensitive substring match on name, brand or category.
    pub fn matches_text(&self, listing: &Listing) -> bool {
        let term = self.search.to_lowercase();
        if term.is_empty() {
            return true;
        }
        let f = &listing.fields;
        [&f.name, &f.brand, &f.category]
            .into_iter()
            .any(|field| field.to_lowercase().contains(&term))
    }

    pub fn matches_category(&self, listing: &Listing) -> bool {
        self.category.matches(&listing.fields.category)
    }

    pub fn matches_condition(&self, listing: &Listing) -> bool {
        self.condition.matches(&listing.fields.condition)
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        self.matches_text(listing) && self.matches_category(listing) && self.matches_condition(listing)
    }

    pub fn is_default(&self) -> bool {
        *self == ListingFilter::default()
    }
}

/// Distinct categories in first-seen order.
pub fn distinct_categories(listings: &[Listing]) -> Vec<String> {
    let mut categories: Vec<String> = Vec::new();
    for listing in listings {
        if !categories.contains(&listing.fields.category) {
            categories.push(listing.fields.category.clone());
        }
    }
    categories
}

//=========================================================================================
// Collection View
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Loading,
    Ready,
    /// The last fetch failed; the previously loaded set is still shown.
    Failed(String),
}

/// Proof that a fetch was started at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// Everything a detached task needs to run one fetch for a view.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    pub caller: Option<Uuid>,
    pub query: ListingQuery,
}

impl FetchRequest {
    pub async fn run(&self, store: &dyn EquipmentStore) -> PortResult<Vec<Listing>> {
        store.list(self.caller, &self.query, SortOrder::NEWEST_FIRST).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// The ticket was superseded or the view unmounted; nothing changed.
    Stale,
}

#[derive(Debug)]
pub struct CollectionView {
    query: ListingQuery,
    listings: Vec<Listing>,
    categories: Vec<String>,
    filter: ListingFilter,
    load: LoadState,
    generation: u64,
    mounted: bool,
}

impl Default for CollectionView {
    fn default() -> Self {
        Self::new(ListingQuery::available())
    }
}

impl CollectionView {
    pub fn new(query: ListingQuery) -> Self {
        Self {
            query,
            listings: Vec::new(),
            categories: Vec::new(),
            filter: ListingFilter::default(),
            load: LoadState::Loading,
            generation: 0,
            mounted: true,
        }
    }

    pub fn query(&self) -> &ListingQuery {
        &self.query
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load
    }

    pub fn filter(&self) -> &ListingFilter {
        &self.filter
    }

    pub fn all(&self) -> &[Listing] {
        &self.listings
    }

    /// Categories of the loaded (unfiltered) set. Only changes on a new fetch.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Changes the store query used by later fetches.
    pub fn set_query(&mut self, query: ListingQuery) {
        self.query = query;
    }

    //-- Fetch lifecycle --------------------------------------------------------------

    /// Starts a fetch, superseding any fetch already in flight.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        self.load = LoadState::Loading;
        FetchTicket(self.generation)
    }

    /// Starts a fetch to be run elsewhere (e.g. a spawned task).
    pub fn request(&mut self, caller: Option<Uuid>) -> FetchRequest {
        FetchRequest {
            ticket: self.begin_fetch(),
            caller,
            query: self.query.clone(),
        }
    }

    /// Applies a fetch result if `ticket` is still current and the view is mounted.
    pub fn apply_fetch(&mut self, ticket: FetchTicket, result: PortResult<Vec<Listing>>) -> Applied {
        if !self.mounted || ticket.0 != self.generation {
            debug!(
                ticket = ticket.0,
                current = self.generation,
                mounted = self.mounted,
                "Discarding stale listing fetch"
            );
            return Applied::Stale;
        }
        match result {
            Ok(listings) => {
                self.categories = distinct_categories(&listings);
                self.listings = listings;
                self.load = LoadState::Ready;
            }
            Err(e) => {
                error!("Error fetching equipment: {:?}", e);
                self.load = LoadState::Failed(MarketError::from(e).to_string());
            }
        }
        Applied::Applied
    }

    /// Marks the view unmounted. Every outstanding ticket becomes stale.
    pub fn unmount(&mut self) {
        self.mounted = false;
        self.generation += 1;
    }

    /// Mounts the view again. Tickets issued before this stay stale.
    pub fn mount(&mut self) {
        self.mounted = true;
        self.generation += 1;
        self.load = LoadState::Loading;
    }

    /// Removes one listing from the loaded set, e.g. once the store deleted it.
    pub fn forget(&mut self, id: Uuid) {
        self.listings.retain(|l| l.id != id);
        self.categories = distinct_categories(&self.listings);
    }

    /// Drops the loaded listings and their facet.
    pub fn clear(&mut self) {
        self.listings.clear();
        self.categories.clear();
        self.load = LoadState::Loading;
    }

    /// Fetches and applies in one step, for callers without concurrent fetches.
    pub async fn refresh(
        &mut self,
        store: &dyn EquipmentStore,
        caller: Option<Uuid>,
    ) -> MarketResult<Applied> {
        let request = self.request(caller);
        let result = request.run(store).await;
        let applied = self.apply_fetch(request.ticket, result);
        match &self.load {
            LoadState::Failed(message) if applied == Applied::Applied => {
                Err(MarketError::Store(message.clone()))
            }
            _ => Ok(applied),
        }
    }

    //-- Filters (synchronous, never fetch) -------------------------------------------

    pub fn set_search(&mut self, term: impl Into<String>) {
        self.filter.search = term.into();
    }

    pub fn set_category(&mut self, category: Selection<String>) {
        self.filter.category = category;
    }

    pub fn set_condition(&mut self, condition: Selection<Condition>) {
        self.filter.condition = condition;
    }

    pub fn set_filter(&mut self, filter: ListingFilter) {
        self.filter = filter;
    }

    /// Resets all three predicates to their defaults.
    pub fn clear_filters(&mut self) {
        self.filter = ListingFilter::default();
    }

    /// The loaded listings that pass every predicate, in store order.
    pub fn visible(&self) -> Vec<&Listing> {
        self.listings.iter().filter(|l| self.filter.matches(l)).collect()
    }

    pub fn visible_count(&self) -> usize {
        self.listings.iter().filter(|l| self.filter.matches(l)).count()
    }

    /// An empty filtered result after a successful load.
    pub fn is_empty_result(&self) -> bool {
        self.load == LoadState::Ready && self.visible_count() == 0
    }

    /// Heading text for the result count.
    pub fn summary(&self) -> String {
        match self.visible_count() {
            0 => NO_RESULTS_MESSAGE.to_string(),
            n => format!("{} items available", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AvailabilityStatus, CertificationStatus, ListingFields};
    use crate::ports::PortError;
    use chrono::Utc;

    fn listing(name: &str, brand: &str, category: &str, condition: Condition) -> Listing {
        Listing {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            fields: ListingFields {
                name: name.into(),
                brand: brand.into(),
                model: None,
                description: Some("olympus mentioned only here".into()),
                price: 100.0,
                condition,
                category: category.into(),
                location: None,
            },
            certification_status: CertificationStatus::Uncertified,
            availability_status: AvailabilityStatus::Available,
            images: vec![],
            tags: vec![],
            created_at: Utc::now(),
        }
    }

    fn loaded(listings: Vec<Listing>) -> CollectionView {
        let mut view = CollectionView::default();
        let ticket = view.begin_fetch();
        assert_eq!(view.apply_fetch(ticket, Ok(listings)), Applied::Applied);
        view
    }

    fn names(view: &CollectionView) -> Vec<&str> {
        view.visible().iter().map(|l| l.fields.name.as_str()).collect()
    }

    #[test]
    fn text_matches_name_brand_category_but_not_description() {
        let view = loaded(vec![
            listing("Scope", "Nikon", "Microscopes", Condition::Good),
            listing("Pipette", "Gilson", "Liquid Handling", Condition::Good),
        ]);
        let mut v = view;
        v.set_search("NIK");
        assert_eq!(names(&v), ["Scope"]);
        v.set_search("liquid");
        assert_eq!(names(&v), ["Pipette"]);
        v.set_search("olympus");
        assert!(v.visible().is_empty());
    }

    #[test]
    fn categories_are_distinct_and_ignore_filters() {
        let mut view = loaded(vec![
            listing("A1", "x1", "Optics", Condition::New),
            listing("B1", "x2", "Balances", Condition::New),
            listing("A2", "x3", "Optics", Condition::New),
        ]);
        view.set_search("B1");
        assert_eq!(view.categories(), ["Optics", "Balances"]);
    }

    #[test]
    fn clear_filters_restores_defaults() {
        let mut view = loaded(vec![listing("Scope", "Nikon", "Optics", Condition::Good)]);
        view.set_search("zzz");
        view.set_condition(Selection::Only(Condition::Poor));
        assert!(view.is_empty_result());
        assert_eq!(view.summary(), NO_RESULTS_MESSAGE);
        view.clear_filters();
        assert!(view.filter().is_default());
        assert_eq!(view.visible_count(), 1);
        assert_eq!(view.summary(), "1 items available");
    }

    #[test]
    fn older_fetch_resolving_last_is_discarded() {
        let mut view = CollectionView::default();
        let first = view.begin_fetch();
        let second = view.begin_fetch();
        let fresh = vec![listing("Fresh", "b1", "c1", Condition::Good)];
        let stale = vec![listing("Stale", "b2", "c2", Condition::Good)];

        assert_eq!(view.apply_fetch(second, Ok(fresh)), Applied::Applied);
        assert_eq!(view.apply_fetch(first, Ok(stale)), Applied::Stale);
        assert_eq!(names(&view), ["Fresh"]);
    }

    #[test]
    fn results_after_unmount_are_ignored() {
        let mut view = CollectionView::default();
        let ticket = view.begin_fetch();
        view.unmount();
        let result = vec![listing("Late", "b", "cat", Condition::Good)];
        assert_eq!(view.apply_fetch(ticket, Ok(result)), Applied::Stale);
        assert!(view.all().is_empty());
    }

    #[test]
    fn remount_does_not_revive_old_tickets() {
        let mut view = CollectionView::default();
        let before = view.begin_fetch();
        view.unmount();
        view.mount();
        let current = view.begin_fetch();
        assert_eq!(view.apply_fetch(before, Ok(vec![])), Applied::Stale);
        assert_eq!(view.apply_fetch(current, Ok(vec![])), Applied::Applied);
    }

    #[test]
    fn failed_fetch_keeps_previous_listings() {
        let mut view = loaded(vec![listing("Kept", "b", "cat", Condition::Good)]);
        let ticket = view.begin_fetch();
        view.apply_fetch(ticket, Err(PortError::Unexpected("timeout".into())));
        assert_eq!(view.load_state(), &LoadState::Failed("timeout".into()));
        assert_eq!(names(&view), ["Kept"]);
        assert!(!view.is_empty_result());
    }
}
