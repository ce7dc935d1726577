use chrono::Utc;
use ecoports::auth::hash_password;
use ecoports::config::MailConfig;
use ecoports::error::AppError;
use ecoports::ports::query::{self, PortColumn, SortOrder};
use ecoports::ports::{
    AlertMailer, Datastore, MailError, NewPort, NewReport, NewUser, PollutionAlert, Port, PortId,
    Report, ReportId, RepositoryError, Role, SubscriberSet, User, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local storage backing the service. Ids are dense and start at 1.
#[derive(Default)]
pub(crate) struct InMemoryDatastore {
    ports: Mutex<BTreeMap<u64, Port>>,
    reports: Mutex<BTreeMap<u64, Report>>,
    users: Mutex<BTreeMap<u64, User>>,
    port_seq: AtomicU64,
    report_seq: AtomicU64,
    user_seq: AtomicU64,
}

impl Datastore for InMemoryDatastore {
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
        let mut guard = self.ports.lock().expect("ports mutex poisoned");
        if !guard.contains_key(&port.id.0) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(port.id.0, port);
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
        let guard = self.ports.lock().expect("ports mutex poisoned");
        Ok(guard.get(&id.0).cloned())
    }

    fn list_ports(&self) -> Result<Vec<Port>, RepositoryError> {
        let guard = self.ports.lock().expect("ports mutex poisoned");
        Ok(guard.values().cloned().collect())
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
        let guard = self.reports.lock().expect("reports mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut guard = self.users.lock().expect("users mutex poisoned");
        if guard.values().any(|known| known.username == user.username) {
            return Err(RepositoryError::Conflict);
        }
        let id = self.user_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let user = User {
            id: UserId(id),
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
        };
        guard.insert(id, user.clone());
        Ok(user)
    }

    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let guard = self.users.lock().expect("users mutex poisoned");
        Ok(guard.get(&id.0).cloned())
    }

    fn fetch_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let guard = self.users.lock().expect("users mutex poisoned");
        Ok(guard
            .values()
            .find(|user| user.username == username)
            .cloned())
    }
}

/// Mailer for deployments without an SMTP relay: every alert lands in the
/// service log instead of a mailbox.
pub(crate) struct LoggingMailer {
    sender: String,
}

impl LoggingMailer {
    pub(crate) fn new(config: &MailConfig) -> Self {
        Self {
            sender: config.sender.clone(),
        }
    }
}

impl AlertMailer for LoggingMailer {
    fn send(&self, alert: PollutionAlert) -> Result<(), MailError> {
        for recipient in &alert.recipients {
            info!(
                from = %self.sender,
                to = %recipient,
                subject = %alert.subject,
                "{}", alert.body
            );
        }
        Ok(())
    }
}

/// Mailer that keeps deliveries in memory so the demo can show them.
#[derive(Default)]
pub(crate) struct RecordingMailer {
    deliveries: Mutex<Vec<PollutionAlert>>,
}

impl RecordingMailer {
    pub(crate) fn deliveries(&self) -> Vec<PollutionAlert> {
        self.deliveries
            .lock()
            .expect("mailer mutex poisoned")
            .clone()
    }
}

impl AlertMailer for RecordingMailer {
    fn send(&self, alert: PollutionAlert) -> Result<(), MailError> {
        self.deliveries
            .lock()
            .expect("mailer mutex poisoned")
            .push(alert);
        Ok(())
    }
}

pub(crate) const ADMIN_USERNAME: &str = "admin";
pub(crate) const ADMIN_PASSWORD: &str = "adminpass";
pub(crate) const MEMBER_USERNAME: &str = "user";
pub(crate) const MEMBER_PASSWORD: &str = "userpass";

/// Seeds the two bootstrap accounts. Without them no one can log in, so the
/// server runs this unconditionally.
pub(crate) fn seed_accounts(store: &InMemoryDatastore) -> Result<(), AppError> {
    for (username, password, role) in [
        (ADMIN_USERNAME, ADMIN_PASSWORD, Role::Admin),
        (MEMBER_USERNAME, MEMBER_PASSWORD, Role::User),
    ] {
        store.insert_user(NewUser {
            username: username.to_string(),
            password_hash: hash_password(password)?,
            role,
        })?;
    }
    Ok(())
}

/// Seeds a small Caspian fleet plus two citizen reports for demos.
pub(crate) fn seed_caspian_fleet(store: &InMemoryDatastore) -> Result<(), AppError> {
    let fleet = [
        ("Port of Baku", 40.37, 49.89, 45.0, 25.0, 800.0, 3),
        ("Port of Aktau", 43.65, 51.16, 50.0, 30.0, 600.0, 2),
        ("Port of Astrakhan", 46.35, 48.04, 40.0, 20.0, 500.0, 1),
        ("Port of Turkmenbashi", 40.02, 52.97, 55.0, 35.0, 700.0, 4),
        ("Port of Makhachkala", 42.97, 47.50, 42.0, 22.0, 550.0, 2),
    ];
    for (name, lat, lng, air_quality, water_quality, co2_emissions, incidents) in fleet {
        store.insert_port(NewPort {
            name: name.to_string(),
            lat,
            lng,
            air_quality,
            water_quality,
            co2_emissions,
            incidents,
            subscribers: SubscriberSet::new(),
        })?;
    }

    store.insert_report(NewReport {
        port_id: PortId(1),
        user_email: "resident@baku.example".to_string(),
        description: "Oil slick spreading near the cargo terminal".to_string(),
    })?;
    store.insert_report(NewReport {
        port_id: PortId(4),
        user_email: "ferry.crew@example.com".to_string(),
        description: "Heavy smoke plume over the eastern quay".to_string(),
    })?;

    Ok(())
}
