//! In-memory fakes of the ports, shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use daily_gk_core::domain::{ProviderEvent, Session, SignUpProfile, UserRef};
use daily_gk_core::ports::{
    AuthEventStream, AuthProvider, BlobListOptions, BlobObject, DataService, Navigator, PortError,
    PortResult, RowQuery,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};

pub fn user(id: &str) -> UserRef {
    UserRef {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        created_at: None,
        email_verified: true,
        display_name: None,
    }
}

pub fn session(user_id: &str) -> Session {
    Session {
        user: user(user_id),
        access_token: format!("token-{}", user_id),
        refresh_token: Some(format!("refresh-{}", user_id)),
        expires_at: None,
    }
}

/// Polls `check` until it holds, failing the test after a second.
pub async fn eventually<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

//=========================================================================================
// Auth
//=========================================================================================

/// Accounts live in a map. An unknown email fails sign-in with `Unknown`, so
/// the existence probe can tell the two cases apart.
pub struct FakeAuthProvider {
    events: broadcast::Sender<ProviderEvent>,
    accounts: Mutex<HashMap<String, String>>,
    initial: Mutex<PortResult<Option<Session>>>,
    probe_gate: Option<Semaphore>,
    pub sign_in_calls: AtomicUsize,
    pub sign_up_calls: AtomicUsize,
    pub get_session_calls: AtomicUsize,
    pub update_password_calls: AtomicUsize,
    pub last_password_tried: Mutex<Option<String>>,
    pub last_sign_up_profile: Mutex<Option<SignUpProfile>>,
    pub reset_requests: Mutex<Vec<(String, String)>>,
}

impl FakeAuthProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            events,
            accounts: Mutex::new(HashMap::new()),
            initial: Mutex::new(Ok(None)),
            probe_gate: None,
            sign_in_calls: AtomicUsize::new(0),
            sign_up_calls: AtomicUsize::new(0),
            get_session_calls: AtomicUsize::new(0),
            update_password_calls: AtomicUsize::new(0),
            last_password_tried: Mutex::new(None),
            last_sign_up_profile: Mutex::new(None),
            reset_requests: Mutex::new(Vec::new()),
        }
    }

    /// The initial-session probe blocks until `release_probe` is called.
    pub fn with_gated_probe() -> Self {
        Self {
            probe_gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn release_probe(&self) {
        if let Some(gate) = &self.probe_gate {
            gate.add_permits(1);
        }
    }

    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), password.to_string());
        self
    }

    pub fn set_initial(&self, result: PortResult<Option<Session>>) {
        *self.initial.lock().unwrap() = result;
    }

    pub fn emit(&self, tag: &str, session: Option<Session>) {
        let _ = self.events.send(ProviderEvent::new(tag, session));
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait]
impl AuthProvider for FakeAuthProvider {
    async fn sign_up(&self, email: &str, password: &str, profile: &SignUpProfile) -> PortResult<()> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_sign_up_profile.lock().unwrap() = Some(profile.clone());
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(PortError::AlreadyExists("User already registered".into()));
        }
        accounts.insert(email.to_string(), password.to_string());
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<()> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_password_tried.lock().unwrap() = Some(password.to_string());
        let known = self.accounts.lock().unwrap().get(email).cloned();
        match known {
            Some(stored) if stored == password => {
                let id = email.split('@').next().unwrap_or(email);
                self.emit("SIGNED_IN", Some(session(id)));
                Ok(())
            }
            Some(_) => Err(PortError::InvalidCredentials("Invalid login credentials".into())),
            None => Err(PortError::Unknown("User not found".into())),
        }
    }

    async fn sign_out(&self) -> PortResult<()> {
        self.emit("SIGNED_OUT", None);
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> PortResult<()> {
        self.reset_requests
            .lock()
            .unwrap()
            .push((email.to_string(), redirect_to.to_string()));
        Ok(())
    }

    async fn update_password(&self, _new_password: &str) -> PortResult<()> {
        self.update_password_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_session(&self) -> PortResult<Option<Session>> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.probe_gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| PortError::Unknown(e.to_string()))?;
            permit.forget();
        }
        self.initial.lock().unwrap().clone()
    }

    fn on_auth_state_change(&self) -> AuthEventStream {
        let mut rx = self.events.subscribe();
        Box::pin(async_stream::stream! {
            while let Ok(event) = rx.recv().await {
                yield event;
            }
        })
    }
}

//=========================================================================================
// Data
//=========================================================================================

/// Tables are vectors of JSON rows. Selecting `bookmarks` with an embedded
/// `summaries(...)` projection joins on `summary_id`.
pub struct FakeDataService {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    blobs: Mutex<Vec<BlobObject>>,
    files: Mutex<HashMap<String, Bytes>>,
    fail_next_write: Mutex<Option<PortError>>,
    fail_next_select: Mutex<Option<PortError>>,
    pub selects: Mutex<Vec<String>>,
    pub inserts: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl FakeDataService {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            blobs: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            fail_next_write: Mutex::new(None),
            fail_next_select: Mutex::new(None),
            selects: Mutex::new(Vec::new()),
            inserts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn with_summary(self, id: &str, date: &str, title: &str) -> Self {
        self.push_row(
            "summaries",
            json!({
                "id": id,
                "title": title,
                "body": format!("{} body.", title),
                "date": date,
                "tags": ["polity"],
            }),
        );
        self
    }

    pub fn with_blob(self, name: &str, content: &'static [u8]) -> Self {
        self.blobs.lock().unwrap().push(BlobObject {
            name: name.to_string(),
            created_at: None,
            updated_at: None,
        });
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), Bytes::from_static(content));
        self
    }

    pub fn push_row(&self, table: &str, row: Value) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn select_count(&self, table: &str) -> usize {
        self.selects
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == table)
            .count()
    }

    pub fn fail_next_write(&self, error: PortError) {
        *self.fail_next_write.lock().unwrap() = Some(error);
    }

    pub fn fail_next_select(&self, error: PortError) {
        *self.fail_next_select.lock().unwrap() = Some(error);
    }

    fn matches(row: &Value, filters: &[(String, String)]) -> bool {
        filters
            .iter()
            .all(|(column, value)| row.get(column).and_then(Value::as_str) == Some(value.as_str()))
    }
}

#[async_trait]
impl DataService for FakeDataService {
    async fn select(&self, query: &RowQuery) -> PortResult<Vec<Value>> {
        self.selects.lock().unwrap().push(query.table.clone());
        if let Some(error) = self.fail_next_select.lock().unwrap().take() {
            return Err(error);
        }
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Value> = tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| Self::matches(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if query.table == "bookmarks" && query.columns.contains("summaries(") {
            let summaries = tables.get("summaries").cloned().unwrap_or_default();
            rows = rows
                .into_iter()
                .map(|bookmark| {
                    let summary = summaries
                        .iter()
                        .find(|s| s.get("id") == bookmark.get("summary_id"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    json!({ "id": bookmark["id"], "summaries": summary })
                })
                .collect();
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> PortResult<()> {
        if let Some(error) = self.fail_next_write.lock().unwrap().take() {
            return Err(error);
        }
        if table == "bookmarks" {
            let key = [
                ("user_id".to_string(), row["user_id"].as_str().unwrap_or_default().to_string()),
                ("summary_id".to_string(), row["summary_id"].as_str().unwrap_or_default().to_string()),
            ];
            if self.rows(table).iter().any(|r| Self::matches(r, &key)) {
                return Err(PortError::AlreadyExists("duplicate key value".into()));
            }
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.push_row(table, row);
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[(String, String)]) -> PortResult<()> {
        if let Some(error) = self.fail_next_write.lock().unwrap().take() {
            return Err(error);
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.retain(|row| !Self::matches(row, filters));
        }
        Ok(())
    }

    async fn list_blobs(
        &self,
        _bucket: &str,
        _prefix: &str,
        options: &BlobListOptions,
    ) -> PortResult<Vec<BlobObject>> {
        let mut blobs = self.blobs.lock().unwrap().clone();
        blobs.truncate(options.limit);
        Ok(blobs)
    }

    async fn download_blob(&self, _bucket: &str, name: &str) -> PortResult<Bytes> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| PortError::Unknown("Object not found".into()))
    }
}

//=========================================================================================
// Navigation
//=========================================================================================

#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}
