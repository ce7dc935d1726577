use super::domain::{Port, PortDraft, PortId, Report, Role, SubscriberSet, User, UserId};
use super::query::{PortColumn, SortOrder};

/// Storage abstraction so the service modules can be exercised in isolation.
///
/// Ports come back in stored (id) order unless a sorted listing is requested.
/// Sorting by a raw column lives here because a backing engine can satisfy it
/// from an index; the derived green score cannot, so callers needing score
/// order fetch the plain listing and sort in process.
pub trait Datastore: Send + Sync {
    fn insert_port(&self, port: NewPort) -> Result<Port, RepositoryError>;
    fn update_port(&self, port: Port) -> Result<(), RepositoryError>;
    fn delete_port(&self, id: PortId) -> Result<(), RepositoryError>;
    fn fetch_port(&self, id: PortId) -> Result<Option<Port>, RepositoryError>;
    fn list_ports(&self) -> Result<Vec<Port>, RepositoryError>;
    fn list_ports_sorted(
        &self,
        column: PortColumn,
        order: SortOrder,
    ) -> Result<Vec<Port>, RepositoryError>;

    fn insert_report(&self, report: NewReport) -> Result<Report, RepositoryError>;
    fn list_reports(&self) -> Result<Vec<Report>, RepositoryError>;

    fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError>;
    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    fn fetch_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;
}

/// Port fields awaiting an id from storage. New ports start with no
/// subscribers; subscriptions only arrive through the subscribe flow.
#[derive(Debug, Clone)]
pub struct NewPort {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub air_quality: f64,
    pub water_quality: f64,
    pub co2_emissions: f64,
    pub incidents: u32,
    pub subscribers: SubscriberSet,
}

impl From<PortDraft> for NewPort {
    fn from(draft: PortDraft) -> Self {
        Self {
            name: draft.name,
            lat: draft.lat,
            lng: draft.lng,
            air_quality: draft.air_quality,
            water_quality: draft.water_quality,
            co2_emissions: draft.co2_emissions,
            incidents: draft.incidents,
            subscribers: SubscriberSet::new(),
        }
    }
}

/// Report fields awaiting an id and timestamp from storage.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub port_id: PortId,
    pub user_email: String,
    pub description: String,
}

/// Account record awaiting an id from storage.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}
