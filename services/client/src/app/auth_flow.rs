//! services/client/src/app/auth_flow.rs
//!
//! The action-triggered logic of the auth screens: input checks, the
//! existence probe before sign-up, and the notice each outcome produces.
//! Screens call these and render whatever `Notice` comes back.

use daily_gk_core::ports::{PortError, PortResult};
use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

use super::notice::{notice_for_error, Notice};
use super::session_store::SessionStore;

pub const MIN_PASSWORD_LEN: usize = 6;

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

pub fn validate_email(email: &str) -> PortResult<()> {
    if email_pattern().is_match(email.trim()) {
        Ok(())
    } else {
        Err(PortError::ValidationFailed(
            "Please enter a valid email address".to_string(),
        ))
    }
}

/// Checks a new password and its confirmation before anything is sent.
pub fn validate_new_password(password: &str, confirm: &str) -> PortResult<()> {
    if password != confirm {
        return Err(PortError::ValidationFailed("Passwords do not match".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PortError::ValidationFailed(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Signs in. A successful sign-in has no notice; the session change is the
/// feedback.
pub async fn submit_sign_in(store: &SessionStore, email: &str, password: &str) -> Option<Notice> {
    match store.sign_in(email.trim(), password).await {
        Ok(()) => None,
        Err(e) => Some(notice_for_error(&e)),
    }
}

/// Creates an account unless the email already has one.
pub async fn submit_sign_up(
    store: &SessionStore,
    email: &str,
    password: &str,
    display_name: Option<&str>,
) -> Notice {
    let email = email.trim();
    if store.check_account_exists(email).await {
        info!("Sign-up refused, account already exists");
        return Notice::error(
            "Account already exists",
            "Please sign in instead of signing up with that e-mail.",
        );
    }

    let display_name = display_name.map(str::trim).filter(|n| !n.is_empty());
    match store.sign_up(email, password, display_name).await {
        Ok(()) => Notice::success("Success", "Account created successfully! Enjoy Daily GK!"),
        Err(e) => notice_for_error(&e),
    }
}

pub async fn submit_password_reset_request(store: &SessionStore, email: &str) -> Notice {
    let email = email.trim();
    if let Err(e) = validate_email(email) {
        return notice_for_error(&e);
    }
    match store.request_password_reset(email).await {
        Ok(()) => Notice::success(
            "Password reset email sent",
            "Please check your email for a password reset link",
        ),
        Err(e) => notice_for_error(&e),
    }
}

/// Sets the new password of a recovering (or signed-in) user.
pub async fn submit_new_password(store: &SessionStore, password: &str, confirm: &str) -> Notice {
    if let Err(e) = validate_new_password(password, confirm) {
        return notice_for_error(&e);
    }
    match store.update_password(password).await {
        Ok(()) => Notice::success("Success", "Your password has been updated successfully"),
        Err(e) => notice_for_error(&e),
    }
}
