//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a live browse
//! connection. One connection is one client: it owns its session provider,
//! navigator and views, and runs store fetches on background tasks.

use crate::web::{
    fetch_task::{spawn_fetch, FetchOutcome, FetchTarget},
    protocol::{ClientMessage, Phase, ServerMessage},
    rest::{BrowseQuery, BrowseResponse, DashboardResponse},
    state::{AppState, ClientState, RequestSession},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use labmarket_core::collection::{Applied, LoadState};
use labmarket_core::contact::ContactStep;
use labmarket_core::{Gate, MarketError, Route, SessionProvider, SessionState};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(request_session): Extension<RequestSession>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, request_session.token))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, token: Option<String>) {
    info!("New live browse connection established.");

    let (sender, mut receiver) = socket.split();
    let ws_sender = Arc::new(Mutex::new(sender));
    let (session_tx, mut session_rx) = mpsc::unbounded_channel::<SessionState>();
    let (fetch_tx, mut fetch_rx) = mpsc::unbounded_channel::<FetchOutcome>();

    let mut conn = Connection {
        client: ClientState::new(&app_state, Route::Browse),
        app_state,
        ws_sender,
        fetch_tx,
        seen_user: None,
    };

    // Every transition, the initial resolution included, reaches the loop below.
    let _subscription = conn.client.hub.on_change(Box::new(move |state: &SessionState| {
        let _ = session_tx.send(state.clone());
    }));

    // --- 1. Resolve the identity ---
    conn.send(&ServerMessage::Loading).await;
    if let Err(e) = conn.client.hub.resolve(token).await {
        error!("Failed to resolve session: {:?}", e);
        conn.send_error(&MarketError::from(e)).await;
    }

    // --- 2. Main Message Loop ---
    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => conn.handle_text_message(text.as_str()).await,
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive failed: {}", e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            },
            Some(state) = session_rx.recv() => conn.on_session_change(state).await,
            Some(outcome) = fetch_rx.recv() => conn.on_fetch(outcome).await,
        }
    }

    // --- 3. Cleanup ---
    conn.client.browse.unmount();
    conn.client.dashboard.invalidate();
    conn.client.cancellation_token.cancel();
    info!("Live browse connection closed.");
}

struct Connection {
    app_state: Arc<AppState>,
    client: ClientState,
    ws_sender: WsSender,
    fetch_tx: mpsc::UnboundedSender<FetchOutcome>,
    /// User of the last published session, to detect identity changes.
    seen_user: Option<Uuid>,
}

impl Connection {
    async fn send(&self, msg: &ServerMessage) {
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize server message: {:?}", e);
                return;
            }
        };
        if self.ws_sender.lock().await.send(Message::Text(json.into())).await.is_err() {
            debug!("Failed to send message; the client is gone.");
        }
    }

    async fn send_error(&self, err: &MarketError) {
        let message = match err {
            MarketError::Store(_) => "The marketplace service is unavailable. Please try again.".to_string(),
            other => other.to_string(),
        };
        self.send(&ServerMessage::Error {
            message,
            redirect: err.redirect().map(|r| r.path()),
        })
        .await;
    }

    //-- Views ------------------------------------------------------------------------

    async fn mount(&mut self, route: Route) {
        if route != Route::Browse {
            self.client.browse.unmount();
        } else if !self.client.browse.is_mounted() {
            self.client.browse.mount();
        }
        if route != Route::Dashboard {
            self.client.dashboard.invalidate();
        }
        self.client.contact.cancel();
        let gate = self.client.navigator.navigate(route);
        self.render(gate).await;
    }

    /// Acts on a gate, following redirects until a view can render or must wait.
    async fn render(&mut self, mut gate: Gate) {
        loop {
            match gate {
                Gate::Loading => {
                    self.send(&ServerMessage::Loading).await;
                    return;
                }
                Gate::Redirect(target) => {
                    self.send(&ServerMessage::Redirect {
                        path: target.path(),
                    })
                    .await;
                    gate = self.client.navigator.navigate(target);
                }
                Gate::Render => {
                    match self.client.navigator.current() {
                        Route::Browse => self.start_fetch(FetchTarget::Browse),
                        Route::Dashboard => self.start_fetch(FetchTarget::Dashboard),
                        _ => {}
                    }
                    return;
                }
            }
        }
    }

    fn start_fetch(&mut self, target: FetchTarget) {
        let session = self.client.session();
        let request = match target {
            FetchTarget::Browse => self.client.browse.request(session.user_id()),
            FetchTarget::Dashboard => {
                match self.client.dashboard.begin_load(&self.client.navigator, &session) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("Dashboard fetch refused: {}", e);
                        return;
                    }
                }
            }
        };
        spawn_fetch(
            self.app_state.equipment.clone(),
            target,
            request,
            self.fetch_tx.clone(),
            self.client.cancellation_token.clone(),
        );
    }

    async fn on_fetch(&mut self, outcome: FetchOutcome) {
        let ticket = outcome.request.ticket;
        let applied = match outcome.target {
            FetchTarget::Browse => self.client.browse.apply_fetch(ticket, outcome.result),
            FetchTarget::Dashboard => self.client.dashboard.apply(ticket, outcome.result),
        };
        if applied == Applied::Stale {
            debug!("Discarded stale {:?} response", outcome.target);
            return;
        }
        self.send_view(outcome.target).await;
    }

    async fn send_view(&self, target: FetchTarget) {
        let view = match target {
            FetchTarget::Browse => &self.client.browse,
            FetchTarget::Dashboard => self.client.dashboard.view(),
        };
        match view.load_state() {
            LoadState::Loading => {}
            LoadState::Failed(message) => {
                self.send_error(&MarketError::Store(message.clone())).await;
            }
            LoadState::Ready => {
                let msg = match target {
                    FetchTarget::Browse => ServerMessage::Browse(BrowseResponse::from_view(view)),
                    FetchTarget::Dashboard => ServerMessage::Dashboard(
                        DashboardResponse::from_dashboard(&self.client.dashboard),
                    ),
                };
                self.send(&msg).await;
            }
        }
    }

    //-- Session ----------------------------------------------------------------------

    async fn on_session_change(&mut self, state: SessionState) {
        let user_id = state.user_id();
        if user_id != self.seen_user {
            // Owner data of the previous identity must not survive the switch.
            self.client.dashboard.invalidate();
            self.client.contact.cancel();
            self.seen_user = user_id;
        }
        self.send(&ServerMessage::Session {
            phase: Phase::from(labmarket_core::navigator::AuthPhase::from(&state)),
            user_id,
        })
        .await;
        let gate = self.client.navigator.on_session_change(&state);
        self.render(gate).await;
    }

    //-- Client messages --------------------------------------------------------------

    async fn handle_text_message(&mut self, text: &str) {
        let msg = match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to deserialize client message: {}", e);
                return;
            }
        };
        let session = self.client.session();

        match msg {
            ClientMessage::Navigate { view } => self.mount(view.into()).await,
            ClientMessage::Refresh => {
                let gate = self.client.navigator.navigate(self.client.navigator.current());
                self.render(gate).await;
            }
            ClientMessage::SetFilter {
                search,
                category,
                condition,
            } => {
                let query = BrowseQuery {
                    search: Some(search),
                    category,
                    condition,
                };
                match query.to_filter() {
                    Ok(filter) => {
                        self.client.browse.set_filter(filter);
                        self.send_view(FetchTarget::Browse).await;
                    }
                    Err(e) => self.send_error(&e.into()).await,
                }
            }
            ClientMessage::ClearFilters => {
                self.client.browse.clear_filters();
                self.send_view(FetchTarget::Browse).await;
            }
            ClientMessage::RequestDelete { listing_id } => {
                match self.client.dashboard.request_delete(&session, listing_id).await {
                    Ok(()) => self.send(&ServerMessage::DeletePending { listing_id }).await,
                    Err(e) => self.send_error(&e).await,
                }
            }
            ClientMessage::ConfirmDelete => {
                let result = self
                    .client
                    .dashboard
                    .confirm_delete(&self.client.navigator, &session)
                    .await;
                match result {
                    Ok(listing_id) => {
                        self.send(&ServerMessage::Deleted { listing_id }).await;
                        self.send_view(FetchTarget::Dashboard).await;
                    }
                    Err(e) => self.send_error(&e).await,
                }
            }
            ClientMessage::CancelDelete => self.client.dashboard.cancel_delete(),
            ClientMessage::RequestContact { listing_id } => {
                match self.client.contact.request(&session, listing_id) {
                    ContactStep::SignInRequired => self.send(&ServerMessage::SignInRequired).await,
                    ContactStep::AwaitingConfirmation { listing_id } => {
                        self.send(&ServerMessage::ContactPending { listing_id }).await
                    }
                }
            }
            ClientMessage::ConfirmContact => {
                let result = self
                    .client
                    .contact
                    .confirm(
                        &session,
                        self.app_state.equipment.as_ref(),
                        self.app_state.profiles.as_ref(),
                    )
                    .await;
                match result {
                    Ok(contact) => self.send(&ServerMessage::SellerContact(contact.into())).await,
                    Err(e) => self.send_error(&e).await,
                }
            }
            ClientMessage::CancelContact => self.client.contact.cancel(),
            ClientMessage::SignOut => {
                // The Anonymous state comes back through the subscription.
                if let Err(e) = self.client.hub.sign_out().await {
                    error!("Sign-out failed: {:?}", e);
                    self.send_error(&e.into()).await;
                }
            }
        }
    }
}
