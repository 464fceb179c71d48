//! crates/labmarket_core/src/session.rs
//!
//! `SessionHub` is the single owner of a client's session. It resolves the
//! login token through the `AccountService`, publishes every transition to
//! its subscribers, and is the only place sign-in and sign-out change state.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{info, warn};

use crate::domain::{Session, SessionState};
use crate::ports::{
    AccountService, PortError, PortResult, SessionCallback, SessionProvider, Subscription,
};

type SharedCallback = Arc<dyn Fn(&SessionState) + Send + Sync>;

#[derive(Default)]
struct HubInner {
    state: SessionState,
    token: Option<String>,
    next_id: u64,
    subscribers: Vec<(u64, SharedCallback)>,
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SessionHub {
    accounts: Arc<dyn AccountService>,
    inner: Arc<Mutex<HubInner>>,
    /// Held from the state write through the last callback of one publish.
    notify: Mutex<()>,
}

impl SessionHub {
    /// Creates a hub in the `Unknown` state.
    pub fn new(accounts: Arc<dyn AccountService>) -> Self {
        Self {
            accounts,
            inner: Arc::new(Mutex::new(HubInner::default())),
            notify: Mutex::new(()),
        }
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> SessionState {
        lock(&self.inner).state.clone()
    }

    /// Resolves a login token (or its absence) and publishes the result.
    ///
    /// An unknown or expired token resolves to `Anonymous`; only a backend
    /// failure is returned as an error, leaving the hub `Unknown`.
    pub async fn resolve(&self, token: Option<String>) -> PortResult<SessionState> {
        let session = match token.as_deref() {
            None => None,
            Some(token) => match self.accounts.validate_auth_session(token).await {
                Ok(session) => Some(session),
                Err(PortError::NotFound(_)) => None,
                Err(e) => {
                    warn!("Failed to resolve session: {:?}", e);
                    return Err(e);
                }
            },
        };
        let token = session.as_ref().and(token);
        Ok(self.publish(SessionState::from_session(session), token))
    }

    /// Records a fresh sign-in for an already issued token.
    pub fn sign_in(&self, token: String, session: Session) -> SessionState {
        info!("User {} signed in", session.user_id());
        self.publish(SessionState::Authenticated(session), Some(token))
    }

    /// Callbacks may read the hub but must not publish from inside a callback.
    fn publish(&self, state: SessionState, token: Option<String>) -> SessionState {
        // Subscribers see transitions in the order the state was written.
        let _turn = self.notify.lock().unwrap_or_else(PoisonError::into_inner);
        let subscribers: Vec<SharedCallback> = {
            let mut inner = lock(&self.inner);
            inner.state = state.clone();
            inner.token = token;
            inner.subscribers.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in subscribers {
            callback(&state);
        }
        state
    }
}

#[async_trait]
impl SessionProvider for SessionHub {
    async fn get_session(&self) -> PortResult<Option<Session>> {
        Ok(lock(&self.inner).state.session().cloned())
    }

    fn on_change(&self, callback: SessionCallback) -> Subscription {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Arc::from(callback)));
            id
        };
        let weak: Weak<Mutex<HubInner>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).subscribers.retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }

    async fn sign_out(&self) -> PortResult<()> {
        let token = lock(&self.inner).token.clone();
        if let Some(token) = token {
            self.accounts.delete_auth_session(&token).await?;
        }
        info!("Signed out");
        self.publish(SessionState::Anonymous, None);
        Ok(())
    }
}
