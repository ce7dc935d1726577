use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::{header, HeaderMap, Request};
use axum::response::Response;
use chrono::Utc;
use serde_json::{json, Value};

use crate::auth::AuthGate;
use crate::config::AuthConfig;
use crate::ingest::{PdfTextExtractor, ReportImporter};
use crate::ports::alerts::{AlertMailer, MailError, PollutionAlert};
use crate::ports::domain::{Port, PortId, Report, ReportId, Role, SubscriberSet, User, UserId};
use crate::ports::query::{self, PortColumn, SortOrder};
use crate::ports::repository::{Datastore, NewPort, NewReport, NewUser, RepositoryError};
use crate::ports::router::ApiContext;
use crate::ports::service::{PortService, ReportService};

pub(super) const ADMIN_USERNAME: &str = "admin";
pub(super) const ADMIN_PASSWORD: &str = "adminpass";
pub(super) const MEMBER_USERNAME: &str = "watcher";
pub(super) const MEMBER_PASSWORD: &str = "watcherpass";

pub(super) fn auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "routing-test-secret".to_string(),
        token_ttl_secs: 3600,
    }
}

/// Builds a fully wired handler context backed by in-memory state, seeded
/// with one admin and one regular account.
pub(super) fn build_context() -> (
    ApiContext<MemoryStore, RecordingMailer>,
    Arc<MemoryStore>,
    Arc<RecordingMailer>,
) {
    let store = Arc::new(MemoryStore::default());
    seed_user(&store, ADMIN_USERNAME, ADMIN_PASSWORD, Role::Admin);
    seed_user(&store, MEMBER_USERNAME, MEMBER_PASSWORD, Role::User);
    let mailer = Arc::new(RecordingMailer::default());
    let importer = ReportImporter::new(Box::new(PdfTextExtractor::new()));
    let context = ApiContext {
        ports: Arc::new(PortService::new(store.clone(), mailer.clone(), importer)),
        reports: Arc::new(ReportService::new(store.clone())),
        auth: Arc::new(AuthGate::new(store.clone(), &auth_config())),
    };
    (context, store, mailer)
}

pub(super) fn seed_user(store: &MemoryStore, username: &str, password: &str, role: Role) {
    // Cost 4 is the lowest bcrypt accepts; it keeps the fixtures fast while
    // production hashing uses the default.
    let password_hash = bcrypt::hash(password, 4).expect("hash password");
    store
        .insert_user(NewUser {
            username: username.to_string(),
            password_hash,
            role,
        })
        .expect("seed user");
}

pub(super) fn seed_port(
    store: &MemoryStore,
    name: &str,
    air_quality: f64,
    water_quality: f64,
    co2_emissions: f64,
    incidents: u32,
) -> Port {
    store
        .insert_port(NewPort {
            name: name.to_string(),
            lat: 41.0,
            lng: 50.5,
            air_quality,
            water_quality,
            co2_emissions,
            incidents,
            subscribers: SubscriberSet::new(),
        })
        .expect("seed port")
}

pub(super) fn admin_token(context: &ApiContext<MemoryStore, RecordingMailer>) -> String {
    context
        .auth
        .login(ADMIN_USERNAME, ADMIN_PASSWORD)
        .expect("admin login")
        .access_token
}

pub(super) fn member_token(context: &ApiContext<MemoryStore, RecordingMailer>) -> String {
    context
        .auth
        .login(MEMBER_USERNAME, MEMBER_PASSWORD)
        .expect("member login")
        .access_token
}

pub(super) fn bearer_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().expect("header value"),
    );
    headers
}

pub(super) fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    payload: &Value,
) -> Request<axum::body::Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(axum::body::Body::from(
            serde_json::to_vec(payload).expect("serialize payload"),
        ))
        .expect("request")
}

/// Variant of `json_request` for bodies that are deliberately not valid
/// JSON, so they must arrive verbatim.
pub(super) fn raw_json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: &str,
) -> Request<axum::body::Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(axum::body::Body::from(body.to_string()))
        .expect("request")
}

/// A payload in the form handlers receive it once the framework has drained
/// the request stream.
pub(super) fn body_bytes(payload: &Value) -> axum::body::Bytes {
    axum::body::Bytes::from(serde_json::to_vec(payload).expect("serialize payload"))
}

pub(super) fn get_request(uri: &str, token: Option<&str>) -> Request<axum::body::Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(axum::body::Body::empty())
        .expect("request")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn baku_draft() -> Value {
    json!({
        "name": "Port of Baku",
        "lat": 40.37,
        "lng": 49.89,
        "air_quality": 45.0,
        "water_quality": 25.0,
        "co2_emissions": 800.0,
        "incidents": 3
    })
}

/// Minimal single-page document with one text-showing operator, enough for
/// the bundled extractor to find `text`.
pub(super) fn pdf_document(text: &str) -> Vec<u8> {
    let mut bytes = b"%PDF-1.4\n1 0 obj\n<< /Length 0 >>\nstream\nBT ".to_vec();
    bytes.extend_from_slice(format!("({text}) Tj").as_bytes());
    bytes.extend_from_slice(b" ET\nendstream\nendobj\n%%EOF\n");
    bytes
}

pub(super) const UPLOAD_BOUNDARY: &str = "ecoports-test-boundary";

pub(super) fn multipart_body(field_name: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{UPLOAD_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{UPLOAD_BOUNDARY}--\r\n").as_bytes());
    body
}

pub(super) fn upload_request(
    uri: &str,
    token: &str,
    field_name: &str,
    filename: &str,
    bytes: &[u8],
) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={UPLOAD_BOUNDARY}"),
        )
        .body(axum::body::Body::from(multipart_body(
            field_name, filename, bytes,
        )))
        .expect("request")
}

/// Gives spawned alert tasks a chance to run on the test runtime.
pub(super) async fn drain_spawned_tasks() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
pub(super) struct MemoryStore {
    ports: Mutex<BTreeMap<u64, Port>>,
    reports: Mutex<BTreeMap<u64, Report>>,
    users: Mutex<BTreeMap<u64, User>>,
    port_seq: AtomicU64,
    report_seq: AtomicU64,
    user_seq: AtomicU64,
}

impl MemoryStore {
    pub(super) fn port(&self, id: u64) -> Option<Port> {
        self.ports
            .lock()
            .expect("ports mutex poisoned")
            .get(&id)
            .cloned()
    }
}

impl Datastore for MemoryStore {
    fn insert_port(&self, port: NewPort) -> Result<Port, RepositoryError> {
        let id = self.port_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let port = Port {
            id: PortId(id),
            name: port.name,
            lat: port.lat,
            lng: port.lng,
            air_quality: port.air_quality,
            water_quality: port.water_quality,
            co2_emissions: port.co2_emissions,
            incidents: port.incidents,
            subscribers: port.subscribers,
        };
        self.ports
            .lock()
            .expect("ports mutex poisoned")
            .insert(id, port.clone());
        Ok(port)
    }

    fn update_port(&self, port: Port) -> Result<(), RepositoryError> {
        let mut ports = self.ports.lock().expect("ports mutex poisoned");
        if !ports.contains_key(&port.id.0) {
            return Err(RepositoryError::NotFound);
        }
        ports.insert(port.id.0, port);
        Ok(())
    }

    fn delete_port(&self, id: PortId) -> Result<(), RepositoryError> {
        self.ports
            .lock()
            .expect("ports mutex poisoned")
            .remove(&id.0)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn fetch_port(&self, id: PortId) -> Result<Option<Port>, RepositoryError> {
        Ok(self
            .ports
            .lock()
            .expect("ports mutex poisoned")
            .get(&id.0)
            .cloned())
    }

    fn list_ports(&self) -> Result<Vec<Port>, RepositoryError> {
        Ok(self
            .ports
            .lock()
            .expect("ports mutex poisoned")
            .values()
            .cloned()
            .collect())
    }

    fn list_ports_sorted(
        &self,
        column: PortColumn,
        order: SortOrder,
    ) -> Result<Vec<Port>, RepositoryError> {
        let mut ports = self.list_ports()?;
        query::sort_by_column(&mut ports, column, order);
        Ok(ports)
    }

    fn insert_report(&self, report: NewReport) -> Result<Report, RepositoryError> {
        let id = self.report_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let report = Report {
            id: ReportId(id),
            port_id: report.port_id,
            user_email: report.user_email,
            description: report.description,
            timestamp: Utc::now(),
        };
        self.reports
            .lock()
            .expect("reports mutex poisoned")
            .insert(id, report.clone());
        Ok(report)
    }

    fn list_reports(&self) -> Result<Vec<Report>, RepositoryError> {
        Ok(self
            .reports
            .lock()
            .expect("reports mutex poisoned")
            .values()
            .cloned()
            .collect())
    }

    fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut users = self.users.lock().expect("users mutex poisoned");
        if users.values().any(|known| known.username == user.username) {
            return Err(RepositoryError::Conflict);
        }
        let id = self.user_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let user = User {
            id: UserId(id),
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
        };
        users.insert(id, user.clone());
        Ok(user)
    }

    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .lock()
            .expect("users mutex poisoned")
            .get(&id.0)
            .cloned())
    }

    fn fetch_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .lock()
            .expect("users mutex poisoned")
            .values()
            .find(|user| user.username == username)
            .cloned())
    }
}

#[derive(Default)]
pub(super) struct RecordingMailer {
    sent: Mutex<Vec<PollutionAlert>>,
}

impl RecordingMailer {
    pub(super) fn sent(&self) -> Vec<PollutionAlert> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

impl AlertMailer for RecordingMailer {
    fn send(&self, alert: PollutionAlert) -> Result<(), MailError> {
        self.sent.lock().expect("mailer mutex poisoned").push(alert);
        Ok(())
    }
}

/// Store whose port and report tables are down while accounts still resolve,
/// for exercising the persistence failure responses behind the auth gate.
pub(super) struct BrokenPortsStore {
    accounts: MemoryStore,
}

impl BrokenPortsStore {
    pub(super) fn with_accounts() -> Arc<Self> {
        let accounts = MemoryStore::default();
        seed_user(&accounts, ADMIN_USERNAME, ADMIN_PASSWORD, Role::Admin);
        Arc::new(Self { accounts })
    }
}

impl Datastore for BrokenPortsStore {
    fn insert_port(&self, _port: NewPort) -> Result<Port, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_port(&self, _port: Port) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete_port(&self, _id: PortId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_port(&self, _id: PortId) -> Result<Option<Port>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_ports(&self) -> Result<Vec<Port>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_ports_sorted(
        &self,
        _column: PortColumn,
        _order: SortOrder,
    ) -> Result<Vec<Port>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_report(&self, _report: NewReport) -> Result<Report, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_reports(&self) -> Result<Vec<Report>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        self.accounts.insert_user(user)
    }

    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.accounts.fetch_user(id)
    }

    fn fetch_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        self.accounts.fetch_user_by_username(username)
    }
}
