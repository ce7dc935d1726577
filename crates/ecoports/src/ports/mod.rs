//! Port directory: environmental scoring, querying, subscriptions, and the
//! JSON API that fronts them.

pub mod alerts;
pub mod domain;
pub mod query;
pub mod repository;
pub mod router;
pub mod score;
pub mod service;

#[cfg(test)]
mod tests;

pub use alerts::{AlertMailer, MailError, PollutionAlert};
pub use domain::{
    Port, PortDraft, PortId, PortPatch, PortView, Report, ReportDraft, ReportId, Role,
    SubscriberSet, User, UserId, ValidationError,
};
pub use query::{PortPage, PortStats, SortField, SortOrder};
pub use repository::{Datastore, NewPort, NewReport, NewUser, RepositoryError};
pub use router::{api_router, ApiContext};
pub use service::{PortService, ReportService, ServiceError, SubscribeOutcome};
