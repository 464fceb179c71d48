//! crates/labmarket_core/src/guard.rs
//!
//! Advisory ownership checks. These only decide which affordances to show;
//! the equipment store re-checks every write on its own.

use uuid::Uuid;

use crate::domain::{Listing, SessionState};

/// What the current client may do with one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub view: bool,
    pub edit: bool,
    pub delete: bool,
}

/// True iff a session is present and its user owns the record.
pub fn is_owner(session: &SessionState, owner_id: Uuid) -> bool {
    session.user_id() == Some(owner_id)
}

pub fn capabilities(session: &SessionState, listing: &Listing) -> Capabilities {
    let owner = is_owner(session, listing.owner_id);
    Capabilities {
        // Sold listings stay visible to their owner only.
        view: listing.is_available() || owner,
        edit: owner,
        delete: owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AvailabilityStatus, CertificationStatus, Condition, ListingFields, Session, User,
    };
    use chrono::Utc;

    fn listing(owner_id: Uuid, availability_status: AvailabilityStatus) -> Listing {
        Listing {
            id: Uuid::new_v4(),
            owner_id,
            fields: ListingFields {
                name: "Centrifuge X".into(),
                brand: "Eppendorf".into(),
                model: None,
                description: None,
                price: 900.0,
                condition: Condition::Good,
                category: "Lab Electronics".into(),
                location: None,
            },
            certification_status: CertificationStatus::Uncertified,
            availability_status,
            images: vec![],
            tags: vec![],
            created_at: Utc::now(),
        }
    }

    fn session_for(user_id: Uuid) -> SessionState {
        SessionState::Authenticated(Session {
            user: User {
                user_id,
                email: None,
            },
            expires_at: Utc::now(),
        })
    }

    #[test]
    fn owner_may_edit_and_delete() {
        let owner = Uuid::new_v4();
        let caps = capabilities(&session_for(owner), &listing(owner, AvailabilityStatus::Available));
        assert_eq!(
            caps,
            Capabilities {
                view: true,
                edit: true,
                delete: true
            }
        );
    }

    #[test]
    fn others_and_unresolved_sessions_may_only_view() {
        let item = listing(Uuid::new_v4(), AvailabilityStatus::Available);
        for session in [
            SessionState::Unknown,
            SessionState::Anonymous,
            session_for(Uuid::new_v4()),
        ] {
            let caps = capabilities(&session, &item);
            assert!(caps.view);
            assert!(!caps.edit && !caps.delete, "{session:?} got write access");
        }
    }

    #[test]
    fn sold_listing_is_hidden_from_non_owners() {
        let owner = Uuid::new_v4();
        let item = listing(owner, AvailabilityStatus::Sold);
        assert!(!capabilities(&SessionState::Anonymous, &item).view);
        assert!(capabilities(&session_for(owner), &item).view);
    }
}
