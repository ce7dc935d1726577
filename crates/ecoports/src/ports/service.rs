use std::sync::Arc;

use tokio::task::JoinHandle;

use super::alerts::{self, AlertMailer};
use super::domain::{
    PortDraft, PortId, PortPatch, PortView, Report, ReportDraft, ValidationError,
};
use super::query::{self, PortPage, PortStats, SortField, SortOrder};
use super::repository::{Datastore, NewPort, NewReport, RepositoryError};
use crate::ingest::{ReportImportError, ReportImporter};

/// Service composing the datastore, mail hook, and report importer behind
/// the port endpoints.
pub struct PortService<D, M> {
    store: Arc<D>,
    mailer: Arc<M>,
    importer: ReportImporter,
}

impl<D, M> PortService<D, M>
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    pub fn new(store: Arc<D>, mailer: Arc<M>, importer: ReportImporter) -> Self {
        Self {
            store,
            mailer,
            importer,
        }
    }

    pub fn create(&self, draft: PortDraft) -> Result<PortView, ServiceError> {
        draft.validate()?;
        let port = self
            .store
            .insert_port(NewPort::from(draft))
            .map_err(|source| ServiceError::Persistence {
                action: "create port",
                source,
            })?;
        Ok(PortView::from(&port))
    }

    /// Applies a partial update. When the stored metrics end up above an
    /// alert threshold, subscriber notification is spawned off the request
    /// path; the returned handle exists so callers that care (tests, mostly)
    /// can await delivery.
    pub fn update(&self, id: PortId, patch: PortPatch) -> Result<PortUpdate, ServiceError> {
        // Existence first: a bad patch against an unknown port is a 404
        // concern before it is a validation concern.
        let mut port = self
            .store
            .fetch_port(id)
            .map_err(port_scoped("update port"))?
            .ok_or(ServiceError::PortNotFound)?;

        patch.validate()?;
        patch.apply_to(&mut port);
        self.store
            .update_port(port.clone())
            .map_err(port_scoped("update port"))?;

        let alert = if alerts::breaches_threshold(&port) {
            alerts::dispatch_alert(Arc::clone(&self.mailer), &port)
        } else {
            None
        };

        Ok(PortUpdate {
            view: PortView::from(&port),
            alert,
        })
    }

    pub fn delete(&self, id: PortId) -> Result<(), ServiceError> {
        self.store
            .delete_port(id)
            .map_err(port_scoped("delete port"))
    }

    pub fn fetch(&self, id: PortId) -> Result<PortView, ServiceError> {
        let port = self
            .store
            .fetch_port(id)
            .map_err(port_scoped("fetch port"))?
            .ok_or(ServiceError::PortNotFound)?;
        Ok(PortView::from(&port))
    }

    /// Sorted, filtered, paginated listing. Column-backed sort fields are
    /// ordered by the datastore; the derived green score materializes the
    /// whole collection and sorts here.
    pub fn list(
        &self,
        sort: SortField,
        order: SortOrder,
        min_score: Option<f64>,
        page: usize,
        per_page: usize,
    ) -> Result<PortPage, ServiceError> {
        let ports = match sort.column() {
            Some(column) => self
                .store
                .list_ports_sorted(column, order)
                .map_err(port_scoped("list ports"))?,
            None => {
                let mut ports = self.store.list_ports().map_err(port_scoped("list ports"))?;
                query::sort_by_green_score(&mut ports, order);
                ports
            }
        };

        Ok(query::paginate(ports, min_score, page, per_page))
    }

    pub fn stats(&self) -> Result<PortStats, ServiceError> {
        let ports = self
            .store
            .list_ports()
            .map_err(port_scoped("load port stats"))?;
        Ok(query::compute_stats(&ports))
    }

    /// Adds a subscriber email to a port. The email's shape is the caller's
    /// concern; this only guards against duplicates.
    pub fn subscribe(&self, id: PortId, email: &str) -> Result<SubscribeOutcome, ServiceError> {
        let mut port = self
            .store
            .fetch_port(id)
            .map_err(port_scoped("subscribe"))?
            .ok_or(ServiceError::PortNotFound)?;

        if !port.subscribers.insert(email) {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        self.store
            .update_port(port)
            .map_err(port_scoped("subscribe"))?;
        Ok(SubscribeOutcome::Subscribed)
    }

    /// Extracts metric readings from an uploaded report and writes them onto
    /// the port. Returns the names of the fields that changed.
    pub fn import_report(
        &self,
        id: PortId,
        bytes: &[u8],
    ) -> Result<Vec<&'static str>, ServiceError> {
        let mut port = self
            .store
            .fetch_port(id)
            .map_err(port_scoped("update port"))?
            .ok_or(ServiceError::PortNotFound)?;

        let update = self.importer.import(bytes)?;
        let fields = update.updated_fields();
        update.apply_to(&mut port);

        self.store
            .update_port(port)
            .map_err(port_scoped("update port"))?;
        Ok(fields)
    }
}

/// Outcome of a metric update. Dropping the handle detaches the delivery
/// task; it keeps running on the runtime.
#[derive(Debug)]
pub struct PortUpdate {
    pub view: PortView,
    pub alert: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
}

/// Citizen report intake and the admin-facing report listing.
pub struct ReportService<D> {
    store: Arc<D>,
}

impl<D: Datastore + 'static> ReportService<D> {
    pub fn new(store: Arc<D>) -> Self {
        Self { store }
    }

    pub fn create(&self, draft: ReportDraft) -> Result<Report, ServiceError> {
        draft.validate()?;

        if self
            .store
            .fetch_port(draft.port_id)
            .map_err(port_scoped("create report"))?
            .is_none()
        {
            return Err(ServiceError::PortNotFound);
        }

        let report = self
            .store
            .insert_report(NewReport {
                port_id: draft.port_id,
                user_email: draft.user_email,
                description: draft.description,
            })
            .map_err(|source| ServiceError::Persistence {
                action: "create report",
                source,
            })?;
        Ok(report)
    }

    pub fn list(&self) -> Result<Vec<Report>, ServiceError> {
        self.store
            .list_reports()
            .map_err(port_scoped("list reports"))
    }
}

/// Error raised by the port and report services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("port not found")]
    PortNotFound,
    #[error(transparent)]
    Import(#[from] ReportImportError),
    #[error("failed to {action}: {source}")]
    Persistence {
        action: &'static str,
        source: RepositoryError,
    },
}

/// Maps storage errors for operations addressed to a single port: a missing
/// record is the client's 404, everything else is a persistence failure.
fn port_scoped(action: &'static str) -> impl FnOnce(RepositoryError) -> ServiceError {
    move |source| match source {
        RepositoryError::NotFound => ServiceError::PortNotFound,
        other => ServiceError::Persistence {
            action,
            source: other,
        },
    }
}
