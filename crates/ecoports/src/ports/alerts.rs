//! Pollution alert dispatch.
//!
//! Alerts are fire-and-forget: the request that triggered one never waits on
//! the mail transport, and a transport failure is logged rather than surfaced
//! to the client.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::ports::domain::Port;

/// Air quality reading above which subscribers are alerted.
pub const AIR_QUALITY_ALERT_THRESHOLD: f64 = 50.0;
/// Water pollution reading above which subscribers are alerted.
pub const WATER_QUALITY_ALERT_THRESHOLD: f64 = 30.0;

pub const ALERT_SUBJECT: &str = "EcoPorts Alert";

/// Outgoing alert handed to the mail transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollutionAlert {
    pub subject: String,
    pub recipients: Vec<String>,
    pub body: String,
}

impl PollutionAlert {
    pub fn for_port(port: &Port) -> Self {
        Self {
            subject: ALERT_SUBJECT.to_string(),
            recipients: port.subscribers.snapshot(),
            body: format!("Alert: High pollution in {}", port.name),
        }
    }
}

/// Trait describing the outbound mail hook.
pub trait AlertMailer: Send + Sync {
    fn send(&self, alert: PollutionAlert) -> Result<(), MailError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
}

/// True when a reading sits strictly above a threshold. A reading exactly at
/// the threshold does not alert.
pub fn breaches_threshold(port: &Port) -> bool {
    port.air_quality > AIR_QUALITY_ALERT_THRESHOLD
        || port.water_quality > WATER_QUALITY_ALERT_THRESHOLD
}

/// Spawns the alert delivery off the request path. Returns the task handle
/// so tests can await completion; a port with no subscribers dispatches
/// nothing at all.
pub fn dispatch_alert<M>(mailer: Arc<M>, port: &Port) -> Option<JoinHandle<()>>
where
    M: AlertMailer + 'static,
{
    if port.subscribers.is_empty() {
        return None;
    }

    let alert = PollutionAlert::for_port(port);
    let port_name = port.name.clone();
    Some(tokio::spawn(async move {
        if let Err(err) = mailer.send(alert) {
            warn!(port = %port_name, error = %err, "pollution alert delivery failed");
        }
    }))
}
