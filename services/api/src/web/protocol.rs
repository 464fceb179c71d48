//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the
//! API server for the live browse and dashboard views.

use labmarket_core::{navigator::AuthPhase, Route};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::web::rest::{BrowseResponse, DashboardResponse, SellerContactDto};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// A view the client can mount.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum View {
    Home,
    Browse,
    Detail { id: Uuid },
    Dashboard,
    ListingForm { edit: Option<Uuid> },
    Profile,
    SignIn,
}

impl From<View> for Route {
    fn from(view: View) -> Self {
        match view {
            View::Home => Route::Home,
            View::Browse => Route::Browse,
            View::Detail { id } => Route::Detail(id),
            View::Dashboard => Route::Dashboard,
            View::ListingForm { edit } => Route::ListingForm { edit },
            View::Profile => Route::Profile,
            View::SignIn => Route::SignIn,
        }
    }
}

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Mounts a view. Browse and dashboard start a fresh fetch.
    Navigate { view: View },

    /// Re-fetches the mounted browse or dashboard view.
    Refresh,

    /// Replaces the browse filters. Applied locally, never re-fetches.
    SetFilter {
        #[serde(default)]
        search: String,
        category: Option<String>,
        condition: Option<String>,
    },

    ClearFilters,

    /// First step of a dashboard delete.
    RequestDelete { listing_id: Uuid },

    ConfirmDelete,

    CancelDelete,

    /// Starts "Contact Seller"; anonymous clients are asked to sign in.
    RequestContact { listing_id: Uuid },

    ConfirmContact,

    CancelContact,

    SignOut,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Published on every session transition.
    Session {
        phase: Phase,
        user_id: Option<Uuid>,
    },

    /// The mounted view waits for the session to resolve.
    Loading,

    /// The client must navigate to `path`.
    Redirect { path: String },

    Browse(BrowseResponse),

    Dashboard(DashboardResponse),

    /// Ask the user to confirm deleting this listing.
    DeletePending { listing_id: Uuid },

    Deleted { listing_id: Uuid },

    /// The action needs a signed-in user. Nothing was fetched.
    SignInRequired,

    /// Ask the buyer to confirm before the seller's email is looked up.
    ContactPending { listing_id: Uuid },

    SellerContact(SellerContactDto),

    /// Reports an error to the client, which should display it.
    Error {
        message: String,
        redirect: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Unknown,
    Anonymous,
    Authenticated,
}

impl From<AuthPhase> for Phase {
    fn from(phase: AuthPhase) -> Self {
        match phase {
            AuthPhase::Unknown => Phase::Unknown,
            AuthPhase::Anonymous => Phase::Anonymous,
            AuthPhase::Authenticated => Phase::Authenticated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_message_carries_the_view() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"type":"navigate","view":{{"name":"detail","id":"{}"}}}}"#, id);
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(msg, ClientMessage::Navigate { view: View::Detail { id: got } } if got == id));
        assert_eq!(Route::from(View::Detail { id }), Route::Detail(id));
    }

    #[test]
    fn filter_message_fields_are_optional() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"set_filter"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::SetFilter { search, category: None, condition: None } if search.is_empty()
        ));
    }

    #[test]
    fn redirect_serializes_with_its_path() {
        let json = serde_json::to_value(ServerMessage::Redirect {
            path: "/auth".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "redirect");
        assert_eq!(json["path"], "/auth");
    }
}
