//! crates/labmarket_core/src/navigator.rs
//!
//! The session-gated navigator: tracks whether the identity is still being
//! resolved, anonymous or authenticated, and decides whether the mounted view
//! may render, must show a loading state, or must redirect.

use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::SessionState;

/// Navigation targets known to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Browse,
    Detail(Uuid),
    Dashboard,
    ListingForm { edit: Option<Uuid> },
    Profile,
    SignIn,
}

impl Route {
    /// Views that show or mutate data belonging to the signed-in user.
    pub fn is_owner_only(&self) -> bool {
        matches!(
            self,
            Route::Dashboard | Route::ListingForm { .. } | Route::Profile
        )
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Browse => "/equipment".to_string(),
            Route::Detail(id) => format!("/equipment/{}", id),
            Route::Dashboard => "/dashboard".to_string(),
            Route::ListingForm { edit: None } => "/list-equipment".to_string(),
            Route::ListingForm { edit: Some(id) } => format!("/list-equipment?edit={}", id),
            Route::Profile => "/profile".to_string(),
            Route::SignIn => "/auth".to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Coarse authentication phase, without the session payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unknown,
    Anonymous,
    Authenticated,
}

impl From<&SessionState> for AuthPhase {
    fn from(state: &SessionState) -> Self {
        match state {
            SessionState::Unknown => AuthPhase::Unknown,
            SessionState::Anonymous => AuthPhase::Anonymous,
            SessionState::Authenticated(_) => AuthPhase::Authenticated,
        }
    }
}

/// What the currently mounted view should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Identity still resolving: show a neutral loading affordance.
    Loading,
    Render,
    Redirect(Route),
}

#[derive(Debug)]
pub struct Navigator {
    phase: AuthPhase,
    user_id: Option<Uuid>,
    current: Route,
}

impl Navigator {
    pub fn new(initial: Route) -> Self {
        Self {
            phase: AuthPhase::Unknown,
            user_id: None,
            current: initial,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn current(&self) -> Route {
        self.current
    }

    /// Whether an owner-only fetch may start right now.
    pub fn can_fetch_owner_data(&self) -> bool {
        self.phase == AuthPhase::Authenticated
    }

    /// Mounts `route` and returns what it should render.
    pub fn navigate(&mut self, route: Route) -> Gate {
        self.current = route;
        let gate = self.gate();
        if let Gate::Redirect(target) = gate {
            self.current = target;
        }
        gate
    }

    /// Applies a session transition and re-evaluates the mounted view.
    ///
    /// A change of identity (sign-out, or a different user signing in) while an
    /// owner-only view is mounted invalidates that view, so the returned gate
    /// is never `Render` for stale owner data.
    pub fn on_session_change(&mut self, state: &SessionState) -> Gate {
        let previous = (self.phase, self.user_id);
        self.phase = AuthPhase::from(state);
        self.user_id = state.user_id();
        debug!(from = ?previous.0, to = ?self.phase, "Session phase changed");

        let identity_changed = previous.0 == AuthPhase::Authenticated && previous.1 != self.user_id;
        if identity_changed && self.current.is_owner_only() && self.phase == AuthPhase::Authenticated {
            info!("Signed-in user changed while on {}. Returning to dashboard.", self.current);
            self.current = Route::Dashboard;
            return Gate::Redirect(Route::Dashboard);
        }
        let gate = self.gate();
        if let Gate::Redirect(target) = gate {
            info!("Redirecting from {} to {}", self.current, target);
            self.current = target;
        }
        gate
    }

    fn gate(&self) -> Gate {
        if !self.current.is_owner_only() {
            return Gate::Render;
        }
        match self.phase {
            AuthPhase::Unknown => Gate::Loading,
            AuthPhase::Anonymous => Gate::Redirect(Route::SignIn),
            AuthPhase::Authenticated => Gate::Render,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Session, User};
    use chrono::Utc;

    fn signed_in(user_id: Uuid) -> SessionState {
        SessionState::Authenticated(Session {
            user: User {
                user_id,
                email: None,
            },
            expires_at: Utc::now(),
        })
    }

    #[test]
    fn owner_only_view_waits_while_unknown() {
        let mut nav = Navigator::new(Route::Dashboard);
        assert_eq!(nav.navigate(Route::Dashboard), Gate::Loading);
        assert!(!nav.can_fetch_owner_data());
    }

    #[test]
    fn public_view_renders_in_every_phase() {
        let mut nav = Navigator::new(Route::Browse);
        assert_eq!(nav.navigate(Route::Browse), Gate::Render);
        assert_eq!(nav.on_session_change(&SessionState::Anonymous), Gate::Render);
    }

    #[test]
    fn anonymous_resolution_redirects_owner_only_view_to_sign_in() {
        let mut nav = Navigator::new(Route::Profile);
        assert_eq!(
            nav.on_session_change(&SessionState::Anonymous),
            Gate::Redirect(Route::SignIn)
        );
        assert_eq!(nav.current(), Route::SignIn);
        assert!(!nav.can_fetch_owner_data());
    }

    #[test]
    fn sign_out_invalidates_mounted_dashboard() {
        let mut nav = Navigator::new(Route::Dashboard);
        assert_eq!(nav.on_session_change(&signed_in(Uuid::new_v4())), Gate::Render);
        assert!(nav.can_fetch_owner_data());
        assert_eq!(
            nav.on_session_change(&SessionState::Anonymous),
            Gate::Redirect(Route::SignIn)
        );
    }

    #[test]
    fn switching_users_leaves_another_owners_form() {
        let listing = Uuid::new_v4();
        let mut nav = Navigator::new(Route::ListingForm {
            edit: Some(listing),
        });
        nav.on_session_change(&signed_in(Uuid::new_v4()));
        assert_eq!(
            nav.on_session_change(&signed_in(Uuid::new_v4())),
            Gate::Redirect(Route::Dashboard)
        );
    }

    #[test]
    fn edit_route_carries_query() {
        let id = Uuid::nil();
        assert_eq!(
            Route::ListingForm { edit: Some(id) }.path(),
            format!("/list-equipment?edit={}", id)
        );
    }
}
