//! services/client/src/app/auth_bridge.rs
//!
//! Connects the auth provider to the session store. The bridge owns the one
//! subscription to the provider's change stream, runs the initial-session
//! probe, and feeds every event to the store through `deliver`, in the order
//! the provider emitted them.

use daily_gk_core::domain::{ProviderEvent, SessionEvent};
use daily_gk_core::ports::{AuthProvider, Navigator, PortResult, RESET_PASSWORD_ROUTE};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::session_store::SessionStore;

/// Maps a raw provider event onto the closed event set, or `None` when the
/// store has nothing to do with it.
pub fn normalize(event: ProviderEvent) -> Option<SessionEvent> {
    let ProviderEvent { tag, session } = event;
    match (tag.as_str(), session) {
        ("INITIAL_SESSION", session) => Some(SessionEvent::Initial(session)),
        ("SIGNED_OUT", _) => Some(SessionEvent::SignedOut),
        ("SIGNED_IN", Some(session)) => Some(SessionEvent::SignedIn(session)),
        ("TOKEN_REFRESHED", Some(session)) => Some(SessionEvent::TokenRefreshed(session)),
        ("PASSWORD_RECOVERY", Some(session)) => Some(SessionEvent::PasswordRecovery(session)),
        ("SIGNED_IN" | "TOKEN_REFRESHED" | "PASSWORD_RECOVERY", None) => {
            warn!(tag = %tag, "Auth event without a session, ignoring");
            None
        }
        (other, _) => {
            debug!(tag = other, "Ignoring auth event");
            None
        }
    }
}

/// The single path from an event to the store. Recovery navigation happens
/// only after the store holds the recovery session.
fn deliver(store: &SessionStore, navigator: &dyn Navigator, event: SessionEvent) {
    let recovering = matches!(event, SessionEvent::PasswordRecovery(_));
    store.apply(event);
    if recovering {
        info!(route = RESET_PASSWORD_ROUTE, "Password recovery session, redirecting");
        navigator.replace(RESET_PASSWORD_ROUTE);
    }
}

async fn probe_initial(auth: &dyn AuthProvider, store: &SessionStore, navigator: &dyn Navigator) -> PortResult<()> {
    match auth.get_session().await {
        Ok(session) => {
            debug!(signed_in = session.is_some(), "Initial session probed");
            deliver(store, navigator, SessionEvent::Initial(session));
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Initial session probe failed, readiness stays unknown");
            Err(e)
        }
    }
}

//=========================================================================================
// The Bridge
//=========================================================================================

pub struct AuthBridge {
    auth: Arc<dyn AuthProvider>,
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    cancel: CancellationToken,
    listener: JoinHandle<()>,
}

impl AuthBridge {
    /// Subscribes to the provider and starts the listener task. The
    /// subscription is taken before the probe so no event can fall between
    /// the two.
    pub fn start(
        auth: Arc<dyn AuthProvider>,
        store: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let mut events = auth.on_auth_state_change();
        let cancel = CancellationToken::new();

        let listener = {
            let auth = auth.clone();
            let store = store.clone();
            let navigator = navigator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _ = probe_initial(auth.as_ref(), &store, navigator.as_ref()).await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!("Auth bridge cancelled");
                            break;
                        }
                        next = events.next() => match next {
                            Some(event) => {
                                if let Some(event) = normalize(event) {
                                    deliver(&store, navigator.as_ref(), event);
                                }
                            }
                            None => {
                                warn!("Auth event stream ended");
                                break;
                            }
                        },
                    }
                }
                // `events` is dropped here, which unsubscribes from the provider.
            })
        };

        info!("Auth bridge started");
        Self {
            auth,
            store,
            navigator,
            cancel,
            listener,
        }
    }

    /// Runs the initial-session probe again, e.g. after a failed start.
    pub async fn retry_initial(&self) -> PortResult<()> {
        probe_initial(self.auth.as_ref(), &self.store, self.navigator.as_ref()).await
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Stops listening and waits for the listener task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.listener.await {
            error!(error = %e, "Auth bridge task ended abnormally");
        }
        info!("Auth bridge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daily_gk_core::domain::{Session, UserRef};

    fn session() -> Session {
        Session {
            user: UserRef {
                id: "u1".into(),
                email: None,
                created_at: None,
                email_verified: false,
                display_name: None,
            },
            access_token: "t".into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    #[test]
    fn tags_map_onto_the_closed_set() {
        assert_eq!(
            normalize(ProviderEvent::new("SIGNED_IN", Some(session()))),
            Some(SessionEvent::SignedIn(session()))
        );
        assert_eq!(
            normalize(ProviderEvent::new("SIGNED_OUT", Some(session()))),
            Some(SessionEvent::SignedOut)
        );
        assert_eq!(
            normalize(ProviderEvent::new("INITIAL_SESSION", None)),
            Some(SessionEvent::Initial(None))
        );
        assert_eq!(
            normalize(ProviderEvent::new("PASSWORD_RECOVERY", Some(session()))),
            Some(SessionEvent::PasswordRecovery(session()))
        );
    }

    #[test]
    fn unknown_tags_and_missing_sessions_are_dropped() {
        assert_eq!(normalize(ProviderEvent::new("USER_UPDATED", Some(session()))), None);
        assert_eq!(normalize(ProviderEvent::new("SIGNED_IN", None)), None);
        assert_eq!(normalize(ProviderEvent::new("TOKEN_REFRESHED", None)), None);
    }
}
