//! services/client/src/adapters/supabase_auth.rs
//!
//! This module contains the adapter for Supabase Auth (GoTrue).
//! It implements the `AuthProvider` port from the `core` crate, keeps the
//! provider-side copy of the session, and broadcasts the same event tags the
//! Supabase JS client emits (`SIGNED_IN`, `SIGNED_OUT`, `TOKEN_REFRESHED`,
//! `PASSWORD_RECOVERY`, `USER_UPDATED`).

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use daily_gk_core::domain::{ProviderEvent, Session, SignUpProfile, UserRef};
use daily_gk_core::ports::{AuthEventStream, AuthProvider, PortError, PortResult};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::supabase_http::SupabaseHttp;

/// How often the auto-refresh task checks the session expiry.
const AUTO_REFRESH_TICK: Duration = Duration::from_secs(30);
/// Refresh once the session is this close to expiring.
const AUTO_REFRESH_MARGIN: ChronoDuration = ChronoDuration::seconds(90);
const EVENT_BUFFER: usize = 64;

//=========================================================================================
// Wire Records
//=========================================================================================

#[derive(Deserialize)]
struct UserRecord {
    id: String,
    email: Option<String>,
    created_at: Option<DateTime<Utc>>,
    email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

impl UserRecord {
    fn to_domain(self) -> UserRef {
        let display_name = self
            .user_metadata
            .get("full_name")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        UserRef {
            id: self.id,
            email: self.email,
            created_at: self.created_at,
            email_verified: self.email_confirmed_at.is_some(),
            display_name,
        }
    }
}

#[derive(Deserialize)]
struct SessionRecord {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: UserRecord,
}

impl SessionRecord {
    fn to_domain(self) -> Session {
        let expires_at = expiry_from(self.expires_at, self.expires_in);
        Session {
            user: self.user.to_domain(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

fn expiry_from(expires_at: Option<i64>, expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_at
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| expires_in.map(|secs| Utc::now() + ChronoDuration::seconds(secs)))
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `AuthProvider` port against GoTrue's REST API.
pub struct SupabaseAuthAdapter {
    http: SupabaseHttp,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl SupabaseAuthAdapter {
    /// Creates a new `SupabaseAuthAdapter` with no session.
    pub fn new(http: SupabaseHttp) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            http,
            session: Mutex::new(None),
            events,
        }
    }

    /// The bearer token of the current session, if signed in.
    pub fn access_token(&self) -> Option<String> {
        self.current().map(|s| s.access_token)
    }

    fn current(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_and_emit(&self, tag: &str, session: Option<Session>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session.clone();
        self.emit(tag, session);
    }

    fn emit(&self, tag: &str, session: Option<Session>) {
        debug!(tag, "Emitting auth event");
        // No receivers is fine: nobody has subscribed yet.
        let _ = self.events.send(ProviderEvent::new(tag, session));
    }

    async fn fetch_user(&self, access_token: &str) -> PortResult<UserRef> {
        let request = self
            .http
            .request(Method::GET, self.http.url("/auth/v1/user"), Some(access_token));
        let response = self.http.send(request, "get user").await?;
        let user: UserRecord = response
            .json()
            .await
            .map_err(|e| PortError::Unknown(e.to_string()))?;
        Ok(user.to_domain())
    }

    /// Exchanges the refresh token for a new session.
    ///
    /// A rejected refresh token ends the session (`SIGNED_OUT`); a network
    /// failure keeps it so a later attempt can still succeed.
    pub async fn refresh_session(&self) -> PortResult<()> {
        let refresh_token = self
            .current()
            .and_then(|s| s.refresh_token)
            .ok_or_else(|| PortError::ValidationFailed("No session to refresh".to_string()))?;

        let request = self
            .http
            .request(
                Method::POST,
                self.http.url("/auth/v1/token?grant_type=refresh_token"),
                None,
            )
            .json(&json!({ "refresh_token": refresh_token }));

        match self.http.send(request, "refresh session").await {
            Ok(response) => {
                let record: SessionRecord = response
                    .json()
                    .await
                    .map_err(|e| PortError::Unknown(e.to_string()))?;
                self.store_and_emit("TOKEN_REFRESHED", Some(record.to_domain()));
                Ok(())
            }
            Err(e @ PortError::NetworkOrServiceUnavailable(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "Refresh token rejected, ending session");
                self.store_and_emit("SIGNED_OUT", None);
                Err(e)
            }
        }
    }

    /// Consumes a password-recovery redirect URL.
    ///
    /// GoTrue appends the recovery session to the redirect as a fragment:
    /// `#access_token=…&refresh_token=…&expires_in=…&type=recovery`.
    pub async fn handle_recovery_redirect(&self, redirect: &str) -> PortResult<()> {
        let url = url::Url::parse(redirect)
            .map_err(|e| PortError::ValidationFailed(format!("Invalid reset link: {}", e)))?;
        let fragment = url.fragment().unwrap_or_default();
        let params: std::collections::HashMap<String, String> =
            url::form_urlencoded::parse(fragment.as_bytes())
                .into_owned()
                .collect();

        if let Some(description) = params.get("error_description").or(params.get("error")) {
            return Err(PortError::InvalidCredentials(description.clone()));
        }
        if params.get("type").map(String::as_str) != Some("recovery") {
            return Err(PortError::ValidationFailed(
                "Invalid or expired reset link".to_string(),
            ));
        }
        let access_token = params
            .get("access_token")
            .cloned()
            .ok_or_else(|| PortError::ValidationFailed("Invalid or expired reset link".to_string()))?;

        let user = self.fetch_user(&access_token).await?;
        let expires_at = expiry_from(
            params.get("expires_at").and_then(|v| v.parse().ok()),
            params.get("expires_in").and_then(|v| v.parse().ok()),
        );
        let session = Session {
            user,
            access_token,
            refresh_token: params.get("refresh_token").cloned(),
            expires_at,
        };

        info!(user_id = %session.user.id, "Recovery session established");
        self.store_and_emit("PASSWORD_RECOVERY", Some(session));
        Ok(())
    }

    /// Spawns a task that refreshes the session shortly before it expires.
    pub fn spawn_auto_refresh(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(AUTO_REFRESH_TICK);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Auto-refresh stopped.");
                        return;
                    }
                    _ = tick.tick() => {}
                }

                let due = self.current().is_some_and(|s| {
                    s.refresh_token.is_some()
                        && s.expires_at
                            .is_some_and(|at| at - AUTO_REFRESH_MARGIN <= Utc::now())
                });
                if due {
                    if let Err(e) = self.refresh_session().await {
                        warn!(error = %e, "Automatic session refresh failed");
                    }
                }
            }
        })
    }

    /// Cancels the auto-refresh task and waits for it. Returns `false` if the
    /// task panicked or was aborted.
    pub async fn stop_auto_refresh(cancel: &CancellationToken, task: JoinHandle<()>) -> bool {
        cancel.cancel();
        match task.await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Auto-refresh task ended abnormally");
                false
            }
        }
    }
}

//=========================================================================================
// `AuthProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthProvider for SupabaseAuthAdapter {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> PortResult<()> {
        let mut url = url::Url::parse(&self.http.url("/auth/v1/signup"))
            .map_err(|e| PortError::Unknown(e.to_string()))?;
        if let Some(redirect) = &profile.email_redirect_to {
            url.query_pairs_mut().append_pair("redirect_to", redirect);
        }
        let request = self
            .http
            .request(Method::POST, url, None)
            .json(&json!({ "email": email, "password": password, "data": profile }));
        let response = self.http.send(request, "sign up").await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PortError::Unknown(e.to_string()))?;

        // With email confirmation enabled only the user comes back, no session.
        if body.get("access_token").is_some() {
            let record: SessionRecord =
                serde_json::from_value(body).map_err(|e| PortError::Unknown(e.to_string()))?;
            self.store_and_emit("SIGNED_IN", Some(record.to_domain()));
        } else {
            info!("Sign-up accepted, awaiting email confirmation");
        }
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<()> {
        let request = self
            .http
            .request(
                Method::POST,
                self.http.url("/auth/v1/token?grant_type=password"),
                None,
            )
            .json(&json!({ "email": email, "password": password }));
        let response = self.http.send(request, "sign in").await?;
        let record: SessionRecord = response
            .json()
            .await
            .map_err(|e| PortError::Unknown(e.to_string()))?;
        self.store_and_emit("SIGNED_IN", Some(record.to_domain()));
        Ok(())
    }

    async fn sign_out(&self) -> PortResult<()> {
        let result = match self.access_token() {
            Some(token) => {
                let request =
                    self.http
                        .request(Method::POST, self.http.url("/auth/v1/logout"), Some(&token));
                self.http.send(request, "sign out").await.map(|_| ())
            }
            None => Ok(()),
        };
        // The local session ends even when the server call fails.
        self.store_and_emit("SIGNED_OUT", None);
        result
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> PortResult<()> {
        let mut url = url::Url::parse(&self.http.url("/auth/v1/recover"))
            .map_err(|e| PortError::Unknown(e.to_string()))?;
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        let request = self
            .http
            .request(Method::POST, url, None)
            .json(&json!({ "email": email }));
        self.http.send(request, "reset password").await?;
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> PortResult<()> {
        let session = self
            .current()
            .ok_or_else(|| PortError::InvalidCredentials("Auth session missing".to_string()))?;
        let request = self
            .http
            .request(
                Method::PUT,
                self.http.url("/auth/v1/user"),
                Some(&session.access_token),
            )
            .json(&json!({ "password": new_password }));
        let response = self.http.send(request, "update password").await?;
        let user: UserRecord = response
            .json()
            .await
            .map_err(|e| PortError::Unknown(e.to_string()))?;

        let updated = Session {
            user: user.to_domain(),
            ..session
        };
        self.store_and_emit("USER_UPDATED", Some(updated));
        Ok(())
    }

    async fn get_session(&self) -> PortResult<Option<Session>> {
        let expired = self.current().is_some_and(|s| s.is_expired(Utc::now()));
        if expired {
            self.refresh_session().await?;
        }
        Ok(self.current())
    }

    fn on_auth_state_change(&self) -> AuthEventStream {
        let mut rx = self.events.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
