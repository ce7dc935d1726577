use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ports::score;

/// Identifier wrapper for monitored ports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PortId(pub u64);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier wrapper for citizen incident reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReportId(pub u64);

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier wrapper for user accounts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access tier attached to every account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// A monitored harbor with its latest environmental readings.
///
/// The green score is always derived from the stored metrics on demand; it is
/// never persisted, so a metric write can never leave a stale score behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub air_quality: f64,
    pub water_quality: f64,
    pub co2_emissions: f64,
    pub incidents: u32,
    pub subscribers: SubscriberSet,
}

impl Port {
    pub fn green_score(&self) -> f64 {
        score::green_score(
            self.air_quality,
            self.water_quality,
            self.co2_emissions,
            self.incidents,
        )
    }
}

/// Subscriber emails kept in a single comma separated column.
///
/// Insertion order is preserved so alert recipients line up with the order
/// people subscribed in. Duplicate inserts are rejected rather than stacked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberSet(String);

impl SubscriberSet {
    pub fn new() -> Self {
        Self(String::new())
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn contains(&self, email: &str) -> bool {
        self.iter().any(|existing| existing == email)
    }

    /// Adds an email, reporting whether it was newly inserted.
    pub fn insert(&mut self, email: &str) -> bool {
        if self.contains(email) {
            return false;
        }
        if !self.0.is_empty() {
            self.0.push(',');
        }
        self.0.push_str(email);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.split(',').filter(|part| !part.is_empty())
    }

    /// Materializes the recipient list for an alert dispatch.
    pub fn snapshot(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }

    pub fn as_raw(&self) -> &str {
        &self.0
    }
}

/// Citizen-submitted incident report tied to a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub port_id: PortId,
    pub user_email: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Stored account record. The hash is a bcrypt digest, never the raw password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Client-facing projection of a port, with the score computed at dump time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortView {
    pub id: PortId,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub air_quality: f64,
    pub water_quality: f64,
    pub co2_emissions: f64,
    pub incidents: u32,
    pub green_score: f64,
}

impl From<&Port> for PortView {
    fn from(port: &Port) -> Self {
        Self {
            id: port.id,
            name: port.name.clone(),
            lat: port.lat,
            lng: port.lng,
            air_quality: port.air_quality,
            water_quality: port.water_quality,
            co2_emissions: port.co2_emissions,
            incidents: port.incidents,
            green_score: port.green_score(),
        }
    }
}

/// Payload for creating a port. Unknown fields are rejected so clients can
/// never smuggle values into columns outside this allow-list.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortDraft {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub air_quality: f64,
    pub water_quality: f64,
    pub co2_emissions: f64,
    pub incidents: u32,
}

impl PortDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = ValidationError::default();
        check_name(&self.name, &mut issues);
        check_coordinates(self.lat, self.lng, &mut issues);
        check_metric("air_quality", self.air_quality, &mut issues);
        check_metric("water_quality", self.water_quality, &mut issues);
        check_metric("co2_emissions", self.co2_emissions, &mut issues);
        issues.into_result()
    }
}

/// Partial update payload. Absent fields keep their stored value; unknown
/// fields are rejected rather than silently dropped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortPatch {
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub air_quality: Option<f64>,
    pub water_quality: Option<f64>,
    pub co2_emissions: Option<f64>,
    pub incidents: Option<u32>,
}

impl PortPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = ValidationError::default();
        if let Some(name) = &self.name {
            check_name(name, &mut issues);
        }
        if let (Some(lat), Some(lng)) = (self.lat, self.lng) {
            check_coordinates(lat, lng, &mut issues);
        } else {
            if let Some(lat) = self.lat {
                check_latitude(lat, &mut issues);
            }
            if let Some(lng) = self.lng {
                check_longitude(lng, &mut issues);
            }
        }
        if let Some(value) = self.air_quality {
            check_metric("air_quality", value, &mut issues);
        }
        if let Some(value) = self.water_quality {
            check_metric("water_quality", value, &mut issues);
        }
        if let Some(value) = self.co2_emissions {
            check_metric("co2_emissions", value, &mut issues);
        }
        issues.into_result()
    }

    /// Copies every present field onto the stored record.
    pub fn apply_to(&self, port: &mut Port) {
        if let Some(name) = &self.name {
            port.name = name.clone();
        }
        if let Some(lat) = self.lat {
            port.lat = lat;
        }
        if let Some(lng) = self.lng {
            port.lng = lng;
        }
        if let Some(value) = self.air_quality {
            port.air_quality = value;
        }
        if let Some(value) = self.water_quality {
            port.water_quality = value;
        }
        if let Some(value) = self.co2_emissions {
            port.co2_emissions = value;
        }
        if let Some(value) = self.incidents {
            port.incidents = value;
        }
    }
}

/// Payload for a citizen incident report.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportDraft {
    pub port_id: PortId,
    pub user_email: String,
    pub description: String,
}

impl ReportDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = ValidationError::default();
        if !is_plausible_email(&self.user_email) {
            issues.push("user_email", "must be a valid email address");
        }
        if self.description.is_empty() {
            issues.push("description", "must not be empty");
        }
        issues.into_result()
    }
}

/// Login payload; both fields must be present and non-empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = ValidationError::default();
        if self.username.is_empty() {
            issues.push("username", "must not be empty");
        }
        if self.password.is_empty() {
            issues.push("password", "must not be empty");
        }
        issues.into_result()
    }
}

/// Lightweight shape check for subscriber and reporter emails.
pub fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn check_name(name: &str, issues: &mut ValidationError) {
    if name.is_empty() {
        issues.push("name", "must not be empty");
    } else if name.chars().count() > 100 {
        issues.push("name", "must be at most 100 characters");
    }
}

fn check_coordinates(lat: f64, lng: f64, issues: &mut ValidationError) {
    check_latitude(lat, issues);
    check_longitude(lng, issues);
}

fn check_latitude(lat: f64, issues: &mut ValidationError) {
    if !(-90.0..=90.0).contains(&lat) {
        issues.push("lat", "must be between -90 and 90");
    }
}

fn check_longitude(lng: f64, issues: &mut ValidationError) {
    if !(-180.0..=180.0).contains(&lng) {
        issues.push("lng", "must be between -180 and 180");
    }
}

fn check_metric(field: &'static str, value: f64, issues: &mut ValidationError) {
    if !value.is_finite() || value < 0.0 {
        issues.push(field, "must be a non-negative number");
    }
}

/// A single rejected field with its reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: &'static str,
    pub message: String,
}

/// Field-level validation failures, reported to clients as
/// `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.issues.push(FieldIssue {
            field,
            message: message.into(),
        });
    }

    pub fn issues(&self) -> &[FieldIssue] {
        &self.issues
    }

    /// Wire representation grouping messages by field.
    pub fn messages(&self) -> Value {
        let mut grouped = serde_json::Map::new();
        for issue in &self.issues {
            let entry = grouped
                .entry(issue.field.to_string())
                .or_insert_with(|| json!([]));
            if let Some(messages) = entry.as_array_mut() {
                messages.push(json!(issue.message));
            }
        }
        Value::Object(grouped)
    }

    fn into_result(self) -> Result<(), ValidationError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed:")?;
        for issue in &self.issues {
            write!(f, " {}: {};", issue.field, issue.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}
