//! services/client/src/adapters/supabase_http.rs
//!
//! Shared HTTP plumbing for the Supabase adapters: the base client, header
//! conventions, and the conversion of transport failures and error responses
//! into classified `PortError`s.

use daily_gk_core::ports::{PortError, PortResult};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// Base client shared by the auth and data adapters.
#[derive(Clone)]
pub struct SupabaseHttp {
    client: reqwest::Client,
    api_url: String,
    anon_key: String,
}

impl SupabaseHttp {
    /// Creates a client for the project at `api_url` (e.g. `https://xyz.supabase.co`).
    pub fn new(
        api_url: impl Into<String>,
        anon_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Starts a request carrying the project key and a bearer token. Without
    /// a user token the anon key doubles as the bearer, as Supabase expects.
    pub fn request(
        &self,
        method: reqwest::Method,
        url: impl reqwest::IntoUrl,
        access_token: Option<&str>,
    ) -> RequestBuilder {
        let bearer = access_token.unwrap_or(&self.anon_key);
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    /// Sends the request and turns any non-success status into a classified error.
    pub async fn send(&self, request: RequestBuilder, context: &str) -> PortResult<Response> {
        let response = request.send().await.map_err(classify_transport)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = classify_response(status, &body);
        tracing::warn!(status = %status, context, error = %error, "Supabase request failed");
        Err(error)
    }
}

/// Maps a `reqwest` failure that happened before a status was received.
pub fn classify_transport(e: reqwest::Error) -> PortError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        PortError::NetworkOrServiceUnavailable(e.to_string())
    } else {
        PortError::Unknown(e.to_string())
    }
}

/// Maps an error response from GoTrue, PostgREST or Storage.
///
/// The provider signals a wrong password only through its message text
/// ("Invalid login credentials"), so the body is inspected before the status.
/// A bare 401/403 (bad project key, expired JWT) says nothing about the
/// password and falls through to `Unknown`.
pub fn classify_response(status: StatusCode, body: &str) -> PortError {
    let message = error_message(body).unwrap_or_else(|| format!("HTTP {}", status));
    let haystack = body.to_lowercase();

    if haystack.contains("invalid login credentials") || haystack.contains("invalid_credentials")
    {
        return PortError::InvalidCredentials(message);
    }
    if haystack.contains("already registered")
        || haystack.contains("already exists")
        || haystack.contains("user_already_exists")
        || status == StatusCode::CONFLICT
    {
        return PortError::AlreadyExists(message);
    }

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PortError::ValidationFailed(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            PortError::NetworkOrServiceUnavailable(message)
        }
        s if s.is_server_error() => PortError::NetworkOrServiceUnavailable(message),
        _ => PortError::Unknown(message),
    }
}

/// Pulls the human-readable message out of the various Supabase error shapes.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|field| value.get(*field).and_then(|v| v.as_str()))
        .map(str::to_string)
}
