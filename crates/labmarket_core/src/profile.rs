//! crates/labmarket_core/src/profile.rs
//!
//! The seller's own profile page.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::domain::{Profile, SessionState};
use crate::error::{MarketError, MarketResult};
use crate::ports::ProfileStore;
use crate::validation::{validate_profile, ProfileDraft};

/// What the profile page renders.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilePage {
    pub draft: ProfileDraft,
    /// Read-only, taken from the session rather than the profile row.
    pub email: Option<String>,
    pub verified: bool,
    /// False when the user has no profile row yet.
    pub exists: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

pub async fn load_profile(store: &dyn ProfileStore, session: &SessionState) -> MarketResult<ProfilePage> {
    let session = session.session().ok_or(MarketError::AuthenticationRequired)?;
    let profile = store.get(session.user_id()).await.map_err(|e| {
        error!("Could not load profile: {:?}", e);
        MarketError::Store("Could not load profile.".to_string())
    })?;

    let email = session.user.email.clone();
    Ok(match profile {
        Some(profile) => ProfilePage {
            draft: ProfileDraft {
                full_name: profile.full_name.unwrap_or_default(),
                company: profile.company,
            },
            email,
            verified: profile.verified,
            exists: true,
            updated_at: Some(profile.updated_at),
        },
        None => ProfilePage {
            draft: ProfileDraft::default(),
            email,
            verified: false,
            exists: false,
            updated_at: None,
        },
    })
}

/// Validates and stores the owner-editable fields, stamping `now` as `updated_at`.
pub async fn save_profile(
    store: &dyn ProfileStore,
    session: &SessionState,
    draft: &ProfileDraft,
    now: DateTime<Utc>,
) -> MarketResult<Profile> {
    let user_id = session
        .user_id()
        .ok_or(MarketError::AuthenticationRequired)?;
    let fields = validate_profile(draft)?;
    let profile = store.update(user_id, fields, now).await?;
    info!("Profile of {} updated", user_id);
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Session, User};
    use crate::memory::InMemoryProfileStore;
    use uuid::Uuid;

    fn session_for(user_id: Uuid) -> SessionState {
        SessionState::Authenticated(Session {
            user: User {
                user_id,
                email: Some("chem@lab.test".into()),
            },
            expires_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn absent_profile_is_an_empty_page_not_an_error() {
        let store = InMemoryProfileStore::new();
        let page = load_profile(&store, &session_for(Uuid::new_v4())).await.unwrap();
        assert!(!page.exists);
        assert_eq!(page.draft, ProfileDraft::default());
        assert_eq!(page.email.as_deref(), Some("chem@lab.test"));
    }

    #[tokio::test]
    async fn fetch_failure_is_a_store_error() {
        let store = InMemoryProfileStore::new();
        store.fail_next("network down");
        let err = load_profile(&store, &session_for(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, MarketError::Store(_)));
    }

    #[tokio::test]
    async fn save_validates_before_writing() {
        let store = InMemoryProfileStore::new();
        let session = session_for(Uuid::new_v4());
        let bad = ProfileDraft {
            full_name: "X".into(),
            company: None,
        };
        assert!(matches!(
            save_profile(&store, &session, &bad, Utc::now()).await,
            Err(MarketError::Validation(_))
        ));
        assert_eq!(store.calls(), 0);

        let good = ProfileDraft {
            full_name: "Marie Curie".into(),
            company: Some("Radium Institute".into()),
        };
        let saved = save_profile(&store, &session, &good, Utc::now()).await.unwrap();
        assert_eq!(saved.full_name.as_deref(), Some("Marie Curie"));

        let page = load_profile(&store, &session).await.unwrap();
        assert!(page.exists);
        assert_eq!(page.draft, good);
    }

    #[tokio::test]
    async fn verified_flag_survives_owner_edits() {
        let store = InMemoryProfileStore::new();
        let user_id = Uuid::new_v4();
        store.seed(Profile {
            user_id,
            full_name: Some("Old Name".into()),
            company: None,
            verified: true,
            email: None,
            updated_at: Utc::now(),
        });
        let draft = ProfileDraft {
            full_name: "New Name".into(),
            company: None,
        };
        let saved = save_profile(&store, &session_for(user_id), &draft, Utc::now())
            .await
            .unwrap();
        assert!(saved.verified);
    }
}
