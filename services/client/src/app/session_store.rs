//! services/client/src/app/session_store.rs
//!
//! The single owner of "who is signed in". The auth bridge is the only
//! writer; everything else reads snapshots or watches for changes.

use daily_gk_core::domain::{ReadinessState, Session, SessionEvent, SignUpProfile, UserRef};
use daily_gk_core::ports::{AuthProvider, PortResult};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::account_probe::probe_account;

/// The full store record. Replaced wholesale on every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    pub readiness: ReadinessState,
}

impl SessionSnapshot {
    pub fn unknown() -> Self {
        Self {
            session: None,
            readiness: ReadinessState::Unknown,
        }
    }

    pub fn user(&self) -> Option<&UserRef> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(Session::user_id)
    }
}

fn resolved(session: Option<Session>) -> SessionSnapshot {
    let readiness = if session.is_some() {
        ReadinessState::Authenticated
    } else {
        ReadinessState::Anonymous
    };
    SessionSnapshot { session, readiness }
}

/// Computes the record that follows `current` after `event`.
///
/// `Initial` only resolves a store that is still `Unknown`: a probe answer
/// arriving after a live event must not roll that event back.
pub fn transition(current: &SessionSnapshot, event: SessionEvent) -> SessionSnapshot {
    match event {
        SessionEvent::Initial(_) if current.readiness != ReadinessState::Unknown => current.clone(),
        SessionEvent::Initial(session) => resolved(session),
        SessionEvent::SignedIn(session)
        | SessionEvent::TokenRefreshed(session)
        | SessionEvent::PasswordRecovery(session) => resolved(Some(session)),
        SessionEvent::SignedOut => resolved(None),
    }
}

//=========================================================================================
// The Store
//=========================================================================================

pub struct SessionStore {
    auth: Arc<dyn AuthProvider>,
    state: watch::Sender<SessionSnapshot>,
    sign_up_redirect: String,
    password_reset_redirect: String,
}

impl SessionStore {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        sign_up_redirect: impl Into<String>,
        password_reset_redirect: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::unknown());
        Self {
            auth,
            state,
            sign_up_redirect: sign_up_redirect.into(),
            password_reset_redirect: password_reset_redirect.into(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn readiness(&self) -> ReadinessState {
        self.state.borrow().readiness
    }

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Waits until the store has left `Unknown` and returns that snapshot.
    pub async fn wait_until_resolved(&self) -> SessionSnapshot {
        let mut receiver = self.state.subscribe();
        let resolved = match receiver
            .wait_for(|s| s.readiness != ReadinessState::Unknown)
            .await
        {
            Ok(snapshot) => snapshot.clone(),
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.snapshot(),
        };
        resolved
    }

    /// Applies one normalized event. Only the auth bridge calls this.
    pub(crate) fn apply(&self, event: SessionEvent) {
        self.state.send_if_modified(|current| {
            let next = transition(current, event);
            if next == *current {
                return false;
            }
            info!(
                readiness = ?next.readiness,
                user_id = next.user_id().unwrap_or("-"),
                "Session changed"
            );
            *current = next;
            true
        });
    }

    //=====================================================================================
    // Operations
    //=====================================================================================
    //
    // These delegate to the provider and never touch the record: the resulting
    // state change arrives as an event through the bridge.

    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> PortResult<()> {
        let profile = SignUpProfile {
            display_name: display_name.map(str::to_string),
            email_redirect_to: Some(self.sign_up_redirect.clone()),
        };
        self.auth
            .sign_up(email, password, &profile)
            .await
            .inspect_err(|e| warn!(error = %e, "Sign-up failed"))
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> PortResult<()> {
        self.auth
            .sign_in(email, password)
            .await
            .inspect_err(|e| warn!(error = %e, "Sign-in failed"))
    }

    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> PortResult<()> {
        self.auth
            .sign_out()
            .await
            .inspect_err(|e| warn!(error = %e, "Sign-out failed"))
    }

    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> PortResult<()> {
        self.auth
            .reset_password_for_email(email, &self.password_reset_redirect)
            .await
            .inspect_err(|e| warn!(error = %e, "Password reset request failed"))
    }

    #[instrument(skip(self, new_password))]
    pub async fn update_password(&self, new_password: &str) -> PortResult<()> {
        self.auth
            .update_password(new_password)
            .await
            .inspect_err(|e| warn!(error = %e, "Password update failed"))
    }

    /// Best-effort check whether `email` already has an account.
    #[instrument(skip(self))]
    pub async fn check_account_exists(&self, email: &str) -> bool {
        let exists = probe_account(self.auth.as_ref(), email).await.exists();
        debug!(exists, "Account existence checked");
        exists
    }
}
