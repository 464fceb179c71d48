//! services/api/src/web/state.rs
//!
//! Defines the application's shared and connection-specific states.

use crate::config::Config;
use labmarket_core::contact::ContactFlow;
use labmarket_core::dashboard::Dashboard;
use labmarket_core::ports::{AccountService, EquipmentStore, ProfileStore};
use labmarket_core::{CollectionView, Navigator, Route, SessionHub, SessionState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub equipment: Arc<dyn EquipmentStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub accounts: Arc<dyn AccountService>,
    pub config: Arc<Config>,
}

impl AppState {
    /// A fresh, unresolved session provider for one client.
    pub fn session_hub(&self) -> SessionHub {
        SessionHub::new(self.accounts.clone())
    }
}

//=========================================================================================
// RequestSession (Resolved Once Per HTTP Request)
//=========================================================================================

/// The identity behind one request, inserted by `middleware::resolve_session`.
#[derive(Debug, Clone, Default)]
pub struct RequestSession {
    pub state: SessionState,
    /// The cookie token, kept only when it resolved to a live session.
    pub token: Option<String>,
}

//=========================================================================================
// ClientState (Specific to One WebSocket Connection)
//=========================================================================================

/// Everything one live browser tab holds: its own session provider and views.
pub struct ClientState {
    pub hub: SessionHub,
    pub navigator: Navigator,
    pub browse: CollectionView,
    pub dashboard: Dashboard,
    pub contact: ContactFlow,
    /// Cancelled when the connection closes; in-flight fetches then drop their results.
    pub cancellation_token: CancellationToken,
}

impl ClientState {
    pub fn new(app_state: &AppState, initial: Route) -> Self {
        Self {
            hub: app_state.session_hub(),
            navigator: Navigator::new(initial),
            browse: CollectionView::default(),
            dashboard: Dashboard::new(app_state.equipment.clone()),
            contact: ContactFlow::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> SessionState {
        self.hub.state()
    }
}
