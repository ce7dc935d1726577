use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::{header, Request};
use axum::response::Response;
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

use ecoports::auth::AuthGate;
use ecoports::config::AuthConfig;
use ecoports::ingest::{PdfTextExtractor, ReportImporter};
use ecoports::ports::query::{self, PortColumn};
use ecoports::ports::{
    api_router, AlertMailer, ApiContext, Datastore, MailError, NewPort, NewReport, NewUser,
    PollutionAlert, Port, PortId, PortService, Report, ReportId, ReportService, RepositoryError,
    Role, SortOrder, User, UserId,
};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "adminpass";
pub const MEMBER_USERNAME: &str = "watcher";
pub const MEMBER_PASSWORD: &str = "watcherpass";

/// Builds the full HTTP surface on in-memory state with one admin and one
/// regular account already present.
pub fn seeded_app() -> (axum::Router, Arc<MemoryStore>, Arc<RecordingMailer>) {
    let store = Arc::new(MemoryStore::default());
    for (username, password, role) in [
        (ADMIN_USERNAME, ADMIN_PASSWORD, Role::Admin),
        (MEMBER_USERNAME, MEMBER_PASSWORD, Role::User),
    ] {
        // Cost 4 is the lowest bcrypt accepts; real hashing uses the default.
        let password_hash = bcrypt::hash(password, 4).expect("hash password");
        store
            .insert_user(NewUser {
                username: username.to_string(),
                password_hash,
                role,
            })
            .expect("seed user");
    }

    let mailer = Arc::new(RecordingMailer::default());
    let importer = ReportImporter::new(Box::new(PdfTextExtractor::new()));
    let context = ApiContext {
        ports: Arc::new(PortService::new(store.clone(), mailer.clone(), importer)),
        reports: Arc::new(ReportService::new(store.clone())),
        auth: Arc::new(AuthGate::new(
            store.clone(),
            &AuthConfig {
                jwt_secret: "integration-secret".to_string(),
                token_ttl_secs: 3600,
            },
        )),
    };
    (api_router(context), store, mailer)
}

/// Logs in through the API and returns the bearer token.
pub async fn login(router: &axum::Router, username: &str, password: &str) -> String {
    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            &serde_json::json!({ "username": username, "password": password }),
        ))
        .await
        .expect("login route executes");
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let body = read_json_body(response).await;
    body.get("access_token")
        .and_then(Value::as_str)
        .expect("token issued")
        .to_string()
}

pub fn json_request(
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

pub fn get_request(uri: &str, token: Option<&str>) -> Request<axum::body::Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(axum::body::Body::empty())
        .expect("request")
}

pub async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Lets detached alert tasks run to completion on the test runtime.
pub async fn drain_spawned_tasks() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
pub struct MemoryStore {
    ports: Mutex<BTreeMap<u64, Port>>,
    reports: Mutex<BTreeMap<u64, Report>>,
    users: Mutex<BTreeMap<u64, User>>,
    port_seq: AtomicU64,
    report_seq: AtomicU64,
    user_seq: AtomicU64,
}

impl MemoryStore {
    pub fn port(&self, id: u64) -> Option<Port> {
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
pub struct RecordingMailer {
    sent: Mutex<Vec<PollutionAlert>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<PollutionAlert> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

impl AlertMailer for RecordingMailer {
    fn send(&self, alert: PollutionAlert) -> Result<(), MailError> {
        self.sent.lock().expect("mailer mutex poisoned").push(alert);
        Ok(())
    }
}
