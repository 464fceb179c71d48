//! crates/labmarket_core/src/memory.rs
//!
//! In-memory implementations of every port.
//!
//! They enforce the same row-level rules as the hosted store (only the owner
//! writes, sold rows are visible to their owner only) so ownership logic can
//! be tested without a database. Each store counts the calls it receives and
//! can be told to fail one upcoming call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::domain::{
    AvailabilityStatus, CertificationStatus, Listing, ListingFields, NewListing, Profile,
    ProfileFields, Session, User, UserCredentials,
};
use crate::ports::{
    AccountService, EquipmentStore, ListingQuery, PortError, PortResult, ProfileStore,
    SortDirection, SortOrder,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared call counter and one-shot failure switch.
#[derive(Default)]
struct Faults {
    calls: AtomicUsize,
    /// Calls left until the failing one (1 = the next call), and its message.
    fail_at: Mutex<Option<(usize, String)>>,
}

impl Faults {
    fn enter(&self) -> PortResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut fail_at = lock(&self.fail_at);
        match fail_at.take() {
            Some((1, message)) => Err(PortError::Unexpected(message)),
            Some((n, message)) => {
                *fail_at = Some((n - 1, message));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn arm(&self, nth: usize, message: String) {
        *lock(&self.fail_at) = Some((nth.max(1), message));
    }
}

//=========================================================================================
// Equipment
//=========================================================================================

struct StoredListing {
    seq: u64,
    listing: Listing,
}

#[derive(Default)]
pub struct InMemoryEquipmentStore {
    rows: Mutex<Vec<StoredListing>>,
    next_seq: AtomicU64,
    faults: Faults,
}

impl InMemoryEquipmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of port calls received so far.
    pub fn calls(&self) -> usize {
        self.faults.calls.load(Ordering::SeqCst)
    }

    /// Makes the next port call fail with `PortError::Unexpected(message)`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.faults.arm(1, message.into());
    }

    /// Lets `nth - 1` calls through, then fails the `nth` one.
    pub fn fail_nth(&self, nth: usize, message: impl Into<String>) {
        self.faults.arm(nth, message.into());
    }

    /// Inserts a row directly, bypassing authorization and call counting.
    pub fn seed(&self, listing: NewListing, created_at: DateTime<Utc>) -> Listing {
        self.store(listing, created_at)
    }

    /// Back-office status change that sellers cannot make through the form.
    pub fn set_status(
        &self,
        id: Uuid,
        availability_status: AvailabilityStatus,
        certification_status: CertificationStatus,
    ) {
        if let Some(row) = lock(&self.rows).iter_mut().find(|r| r.listing.id == id) {
            row.listing.availability_status = availability_status;
            row.listing.certification_status = certification_status;
        }
    }

    fn store(&self, new: NewListing, created_at: DateTime<Utc>) -> Listing {
        let listing = Listing {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            fields: new.fields,
            certification_status: CertificationStatus::Uncertified,
            availability_status: new.availability_status,
            images: new.images,
            tags: new.tags,
            created_at,
        };
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        lock(&self.rows).push(StoredListing {
            seq,
            listing: listing.clone(),
        });
        listing
    }

    fn visible_to(listing: &Listing, caller: Option<Uuid>) -> bool {
        listing.is_available() || caller == Some(listing.owner_id)
    }
}

#[async_trait]
impl EquipmentStore for InMemoryEquipmentStore {
    async fn list(
        &self,
        caller: Option<Uuid>,
        query: &ListingQuery,
        order: SortOrder,
    ) -> PortResult<Vec<Listing>> {
        self.faults.enter()?;
        let rows = lock(&self.rows);
        let mut matching: Vec<&StoredListing> = rows
            .iter()
            .filter(|r| Self::visible_to(&r.listing, caller))
            .filter(|r| {
                query
                    .availability_status
                    .map_or(true, |s| r.listing.availability_status == s)
            })
            .filter(|r| query.owner_id.map_or(true, |o| r.listing.owner_id == o))
            .collect();
        // Ties on created_at keep insertion order.
        matching.sort_by(|a, b| {
            let by_time = match order.direction {
                SortDirection::Ascending => a.listing.created_at.cmp(&b.listing.created_at),
                SortDirection::Descending => b.listing.created_at.cmp(&a.listing.created_at),
            };
            by_time.then(a.seq.cmp(&b.seq))
        });
        Ok(matching.into_iter().map(|r| r.listing.clone()).collect())
    }

    async fn get(&self, caller: Option<Uuid>, id: Uuid) -> PortResult<Listing> {
        self.faults.enter()?;
        lock(&self.rows)
            .iter()
            .find(|r| r.listing.id == id && Self::visible_to(&r.listing, caller))
            .map(|r| r.listing.clone())
            .ok_or_else(|| PortError::NotFound(format!("Equipment {} not found", id)))
    }

    async fn insert(&self, caller: Option<Uuid>, listing: NewListing) -> PortResult<Listing> {
        self.faults.enter()?;
        if caller != Some(listing.owner_id) {
            return Err(PortError::Unauthorized);
        }
        Ok(self.store(listing, Utc::now()))
    }

    async fn update(
        &self,
        caller: Option<Uuid>,
        id: Uuid,
        fields: ListingFields,
    ) -> PortResult<Listing> {
        self.faults.enter()?;
        let mut rows = lock(&self.rows);
        let row = rows
            .iter_mut()
            .find(|r| r.listing.id == id)
            .ok_or_else(|| PortError::NotFound(format!("Equipment {} not found", id)))?;
        if caller != Some(row.listing.owner_id) {
            return Err(PortError::Unauthorized);
        }
        row.listing.fields = fields;
        Ok(row.listing.clone())
    }

    async fn delete(&self, caller: Option<Uuid>, id: Uuid) -> PortResult<()> {
        self.faults.enter()?;
        let mut rows = lock(&self.rows);
        let index = rows
            .iter()
            .position(|r| r.listing.id == id)
            .ok_or_else(|| PortError::NotFound(format!("Equipment {} not found", id)))?;
        if caller != Some(rows[index].listing.owner_id) {
            return Err(PortError::Unauthorized);
        }
        rows.remove(index);
        Ok(())
    }
}

//=========================================================================================
// Profiles
//=========================================================================================

#[derive(Default)]
pub struct InMemoryProfileStore {
    rows: Mutex<HashMap<Uuid, Profile>>,
    faults: Faults,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.faults.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, message: impl Into<String>) {
        self.faults.arm(1, message.into());
    }

    pub fn seed(&self, profile: Profile) {
        lock(&self.rows).insert(profile.user_id, profile);
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, user_id: Uuid) -> PortResult<Option<Profile>> {
        self.faults.enter()?;
        Ok(lock(&self.rows).get(&user_id).cloned())
    }

    async fn update(
        &self,
        user_id: Uuid,
        fields: ProfileFields,
        updated_at: DateTime<Utc>,
    ) -> PortResult<Profile> {
        self.faults.enter()?;
        let mut rows = lock(&self.rows);
        let profile = rows.entry(user_id).or_insert_with(|| Profile {
            user_id,
            full_name: None,
            company: None,
            verified: false,
            email: None,
            updated_at,
        });
        profile.full_name = Some(fields.full_name);
        profile.company = fields.company;
        profile.updated_at = updated_at;
        Ok(profile.clone())
    }
}

//=========================================================================================
// Accounts
//=========================================================================================

#[derive(Default)]
pub struct InMemoryAccounts {
    users: Mutex<Vec<UserCredentials>>,
    sessions: Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }
}

#[async_trait]
impl AccountService for InMemoryAccounts {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let mut users = lock(&self.users);
        if users.iter().any(|u| u.email == email) {
            return Err(PortError::Unexpected(format!(
                "User with email {} already exists",
                email
            )));
        }
        let creds = UserCredentials {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
        };
        let user = User {
            user_id: creds.user_id,
            email: Some(creds.email.clone()),
        };
        users.push(creds);
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        lock(&self.users)
            .iter()
            .find(|u| u.user_id == user_id)
            .map(|u| User {
                user_id: u.user_id,
                email: Some(u.email.clone()),
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        lock(&self.users)
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        lock(&self.sessions).insert(token.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, token: &str) -> PortResult<Session> {
        let (user_id, expires_at) = lock(&self.sessions)
            .get(token)
            .copied()
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .ok_or_else(|| PortError::NotFound("Auth session not found".to_string()))?;
        let user = self.get_user(user_id).await?;
        Ok(Session { user, expires_at })
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        lock(&self.sessions).remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Condition;
    use chrono::Duration;

    fn new_listing(owner: Uuid, name: &str) -> NewListing {
        NewListing::for_owner(
            ListingFields {
                name: name.into(),
                brand: "Zeiss".into(),
                model: None,
                description: None,
                price: 10.0,
                condition: Condition::Fair,
                category: "Optics".into(),
                location: None,
            },
            owner,
        )
    }

    #[tokio::test]
    async fn store_rejects_writes_by_non_owners() {
        let store = InMemoryEquipmentStore::new();
        let owner = Uuid::new_v4();
        let stranger = Some(Uuid::new_v4());

        assert!(matches!(
            store.insert(stranger, new_listing(owner, "Lens")).await,
            Err(PortError::Unauthorized)
        ));
        let listing = store.insert(Some(owner), new_listing(owner, "Lens")).await.unwrap();
        assert!(matches!(
            store.update(stranger, listing.id, listing.fields.clone()).await,
            Err(PortError::Unauthorized)
        ));
        assert!(matches!(
            store.delete(None, listing.id).await,
            Err(PortError::Unauthorized)
        ));
        store.delete(Some(owner), listing.id).await.unwrap();
        assert!(matches!(
            store.get(Some(owner), listing.id).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn newest_first_with_insertion_order_on_ties() {
        let store = InMemoryEquipmentStore::new();
        let owner = Uuid::new_v4();
        let t = Utc::now();
        store.seed(new_listing(owner, "old"), t - Duration::hours(1));
        store.seed(new_listing(owner, "tie-a"), t);
        store.seed(new_listing(owner, "tie-b"), t);

        let names: Vec<String> = store
            .list(None, &ListingQuery::available(), SortOrder::NEWEST_FIRST)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.fields.name)
            .collect();
        assert_eq!(names, ["tie-a", "tie-b", "old"]);
    }

    #[tokio::test]
    async fn sold_rows_are_only_visible_to_their_owner() {
        let store = InMemoryEquipmentStore::new();
        let owner = Uuid::new_v4();
        let listing = store.seed(new_listing(owner, "Sold lens"), Utc::now());
        store.set_status(
            listing.id,
            AvailabilityStatus::Sold,
            CertificationStatus::Uncertified,
        );

        assert!(store.get(None, listing.id).await.is_err());
        let mine = store
            .list(Some(owner), &ListingQuery::owned_by(owner), SortOrder::NEWEST_FIRST)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[tokio::test]
    async fn fail_next_fails_exactly_one_call() {
        let store = InMemoryProfileStore::new();
        store.fail_next("offline");
        assert!(store.get(Uuid::new_v4()).await.is_err());
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn fail_nth_lets_earlier_calls_through() {
        let store = InMemoryEquipmentStore::new();
        store.fail_nth(2, "reload failed");
        let first = store.get(None, Uuid::new_v4()).await;
        assert!(matches!(first, Err(PortError::NotFound(_))));
        let second = store.get(None, Uuid::new_v4()).await;
        assert!(matches!(second, Err(PortError::Unexpected(m)) if m == "reload failed"));
        let third = store.get(None, Uuid::new_v4()).await;
        assert!(matches!(third, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn expired_auth_sessions_do_not_validate() {
        let accounts = InMemoryAccounts::new();
        let user = accounts.create_user_with_email("a@lab.test", "hash").await.unwrap();
        accounts
            .create_auth_session("old", user.user_id, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        assert!(accounts.validate_auth_session("old").await.is_err());
    }
}
