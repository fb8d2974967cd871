//! services/client/src/app/account_probe.rs
//!
//! Account-existence check built on a sign-in attempt.
//!
//! The auth provider has no existence endpoint. Signing in with a password
//! nobody uses gets "invalid login credentials" back for a registered email,
//! and some other outcome for an unknown one. That inference is coupled to
//! the provider's error classification and lives here, on its own, so it can
//! be tested and replaced in one place once a real endpoint exists.

use daily_gk_core::ports::{AuthProvider, PortError, PortResult};
use tracing::{debug, warn};

/// Password used for the probe sign-in. Never a real credential.
pub const PROBE_PASSWORD: &str = "___dummy___password___";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// The provider rejected the password, so it knows the email.
    Registered,
    /// Not registered, or the outcome says nothing either way.
    NotRegisteredOrUnknown,
}

impl ProbeVerdict {
    pub fn exists(self) -> bool {
        matches!(self, ProbeVerdict::Registered)
    }
}

/// Reads the outcome of a probe sign-in.
pub fn classify_probe(outcome: &PortResult<()>) -> ProbeVerdict {
    match outcome {
        Err(PortError::InvalidCredentials(_)) => ProbeVerdict::Registered,
        Ok(()) => {
            warn!("Existence probe unexpectedly signed in");
            ProbeVerdict::NotRegisteredOrUnknown
        }
        Err(_) => ProbeVerdict::NotRegisteredOrUnknown,
    }
}

/// Runs the probe against `auth` for `email`.
pub async fn probe_account(auth: &dyn AuthProvider, email: &str) -> ProbeVerdict {
    let outcome = auth.sign_in(email, PROBE_PASSWORD).await;
    let verdict = classify_probe(&outcome);
    debug!(?verdict, "Account existence probe finished");
    verdict
}
