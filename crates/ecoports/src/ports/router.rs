//! HTTP surface for the port directory.
//!
//! Handlers stay thin: parse, gate, delegate, translate errors. Auth is
//! checked before payloads are even deserialized so credential failures
//! never leak validation details.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::alerts::AlertMailer;
use super::domain::{
    is_plausible_email, LoginRequest, PortDraft, PortId, PortPatch, ReportDraft, ValidationError,
};
use super::query::{SortField, SortOrder};
use super::repository::Datastore;
use super::service::{PortService, ReportService, ServiceError, SubscribeOutcome};
use crate::auth::{AuthError, AuthGate};
use crate::ingest::ReportImportError;

const DEFAULT_PAGE: usize = 1;
const DEFAULT_PER_PAGE: usize = 10;

/// Shared state behind every API handler.
pub struct ApiContext<D, M> {
    pub ports: Arc<PortService<D, M>>,
    pub reports: Arc<ReportService<D>>,
    pub auth: Arc<AuthGate<D>>,
}

impl<D, M> Clone for ApiContext<D, M> {
    fn clone(&self) -> Self {
        Self {
            ports: Arc::clone(&self.ports),
            reports: Arc::clone(&self.reports),
            auth: Arc::clone(&self.auth),
        }
    }
}

/// Router builder exposing the JSON API.
pub fn api_router<D, M>(context: ApiContext<D, M>) -> Router
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    Router::new()
        .route("/api/login", post(login_handler::<D, M>))
        .route(
            "/api/ports",
            get(list_ports_handler::<D, M>).post(create_port_handler::<D, M>),
        )
        .route("/api/ports/stats", get(port_stats_handler::<D, M>))
        .route(
            "/api/ports/:port_id",
            get(get_port_handler::<D, M>)
                .put(update_port_handler::<D, M>)
                .delete(delete_port_handler::<D, M>),
        )
        .route(
            "/api/ports/:port_id/upload_report",
            post(upload_report_handler::<D, M>),
        )
        .route(
            "/api/ports/:port_id/subscribe",
            post(subscribe_handler::<D, M>),
        )
        .route(
            "/api/reports",
            get(list_reports_handler::<D, M>).post(create_report_handler::<D, M>),
        )
        .with_state(context)
}

/// Wire error carrying a status and a JSON body. Validation failures keep
/// the raw field-message map; everything else uses the `error` envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }

    fn with_details(status: StatusCode, message: &str, details: String) -> Self {
        Self {
            status,
            body: json!({ "error": message, "details": details }),
        }
    }

    fn validation(error: &ValidationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: error.messages(),
        }
    }

    fn invalid_payload(error: serde_json::Error) -> Self {
        Self::with_details(
            StatusCode::BAD_REQUEST,
            "Invalid request payload",
            error.to_string(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn service_error(error: ServiceError) -> ApiError {
    match error {
        ServiceError::Validation(validation) => ApiError::validation(&validation),
        ServiceError::PortNotFound => ApiError::new(StatusCode::NOT_FOUND, "Port not found"),
        ServiceError::Import(ReportImportError::NoMatchingData(_)) => {
            ApiError::new(StatusCode::BAD_REQUEST, "No matching data found in PDF")
        }
        ServiceError::Import(ReportImportError::Extraction(extraction)) => ApiError::with_details(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to parse PDF",
            extraction.to_string(),
        ),
        ServiceError::Persistence { action, source } => ApiError::with_details(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Failed to {action}"),
            source.to_string(),
        ),
    }
}

fn auth_error(error: AuthError) -> ApiError {
    match error {
        AuthError::InvalidCredentials => {
            ApiError::new(StatusCode::UNAUTHORIZED, "Invalid credentials")
        }
        AuthError::InvalidToken => {
            ApiError::new(StatusCode::UNAUTHORIZED, "Missing or invalid token")
        }
        AuthError::Forbidden => ApiError::new(StatusCode::FORBIDDEN, "Access denied"),
        AuthError::Hash(_) | AuthError::Token(_) | AuthError::Repository(_) => {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Path ids that do not parse behave like ids that do not exist.
fn parse_port_id(raw: &str) -> Result<PortId, ApiError> {
    raw.parse::<u64>()
        .map(PortId)
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, "Port not found"))
}

/// Bodies are read raw and parsed by hand. The framework's own JSON
/// rejection replies in plain text, while every answer this API gives is a
/// JSON object; hand parsing also lets auth run before the body is touched.
fn parse_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(ApiError::invalid_payload)
}

pub(crate) async fn login_handler<D, M>(
    State(context): State<ApiContext<D, M>>,
    body: Bytes,
) -> Response
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    let request: LoginRequest = match parse_payload(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    if let Err(validation) = request.validate() {
        return ApiError::validation(&validation).into_response();
    }

    match context.auth.login(&request.username, &request.password) {
        Ok(grant) => (StatusCode::OK, Json(grant)).into_response(),
        Err(error) => auth_error(error).into_response(),
    }
}

/// Listing parameters arrive as raw strings; anything unparseable falls
/// back to its default instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListPortsParams {
    sort: Option<String>,
    order: Option<String>,
    min_score: Option<String>,
    page: Option<String>,
    per_page: Option<String>,
}

fn parse_or(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|value| value.parse().ok()).unwrap_or(default)
}

pub(crate) async fn list_ports_handler<D, M>(
    State(context): State<ApiContext<D, M>>,
    Query(params): Query<ListPortsParams>,
) -> Response
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    let sort = SortField::parse(params.sort.as_deref().unwrap_or("name"));
    let order = SortOrder::parse(params.order.as_deref().unwrap_or("asc"));
    let min_score = params.min_score.as_deref().and_then(|raw| raw.parse().ok());
    let page = parse_or(params.page.as_deref(), DEFAULT_PAGE);
    let per_page = parse_or(params.per_page.as_deref(), DEFAULT_PER_PAGE);

    match context.ports.list(sort, order, min_score, page, per_page) {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(error) => service_error(error).into_response(),
    }
}

pub(crate) async fn get_port_handler<D, M>(
    State(context): State<ApiContext<D, M>>,
    Path(port_id): Path<String>,
) -> Response
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    let id = match parse_port_id(&port_id) {
        Ok(id) => id,
        Err(error) => return error.into_response(),
    };

    match context.ports.fetch(id) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => service_error(error).into_response(),
    }
}

pub(crate) async fn port_stats_handler<D, M>(
    State(context): State<ApiContext<D, M>>,
) -> Response
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    match context.ports.stats() {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(error) => service_error(error).into_response(),
    }
}

pub(crate) async fn create_port_handler<D, M>(
    State(context): State<ApiContext<D, M>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    if let Err(error) = context.auth.require_admin(&headers) {
        return auth_error(error).into_response();
    }

    let draft: PortDraft = match parse_payload(&body) {
        Ok(draft) => draft,
        Err(error) => return error.into_response(),
    };

    match context.ports.create(draft) {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(error) => service_error(error).into_response(),
    }
}

pub(crate) async fn update_port_handler<D, M>(
    State(context): State<ApiContext<D, M>>,
    headers: HeaderMap,
    Path(port_id): Path<String>,
    body: Bytes,
) -> Response
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    if let Err(error) = context.auth.require_admin(&headers) {
        return auth_error(error).into_response();
    }

    let id = match parse_port_id(&port_id) {
        Ok(id) => id,
        Err(error) => return error.into_response(),
    };
    let patch: PortPatch = match parse_payload(&body) {
        Ok(patch) => patch,
        Err(error) => return error.into_response(),
    };

    match context.ports.update(id, patch) {
        // Dropping the handle detaches alert delivery from the response.
        Ok(outcome) => (StatusCode::OK, Json(outcome.view)).into_response(),
        Err(error) => service_error(error).into_response(),
    }
}

pub(crate) async fn delete_port_handler<D, M>(
    State(context): State<ApiContext<D, M>>,
    headers: HeaderMap,
    Path(port_id): Path<String>,
) -> Response
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    if let Err(error) = context.auth.require_admin(&headers) {
        return auth_error(error).into_response();
    }

    let id = match parse_port_id(&port_id) {
        Ok(id) => id,
        Err(error) => return error.into_response(),
    };

    match context.ports.delete(id) {
        Ok(()) => (StatusCode::OK, Json(json!({ "message": "Port deleted" }))).into_response(),
        Err(error) => service_error(error).into_response(),
    }
}

pub(crate) async fn upload_report_handler<D, M>(
    State(context): State<ApiContext<D, M>>,
    headers: HeaderMap,
    Path(port_id): Path<String>,
    mut multipart: Multipart,
) -> Response
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    if let Err(error) = context.auth.require_admin(&headers) {
        return auth_error(error).into_response();
    }

    let mut document: Option<(String, Vec<u8>)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    match field.bytes().await {
                        Ok(bytes) => document = Some((filename, bytes.to_vec())),
                        Err(_) => {
                            return ApiError::new(StatusCode::BAD_REQUEST, "Invalid file")
                                .into_response()
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(_) => {
                return ApiError::new(StatusCode::BAD_REQUEST, "Invalid file").into_response()
            }
        }
    }

    let Some((filename, bytes)) = document else {
        return ApiError::new(StatusCode::BAD_REQUEST, "Invalid file").into_response();
    };
    if filename.is_empty() || !filename.ends_with(".pdf") {
        return ApiError::new(StatusCode::BAD_REQUEST, "Invalid file").into_response();
    }

    let id = match parse_port_id(&port_id) {
        Ok(id) => id,
        Err(error) => return error.into_response(),
    };

    match context.ports.import_report(id, &bytes) {
        Ok(fields) => {
            let message = format!("Report parsed and updated fields: {}", fields.join(", "));
            (
                StatusCode::OK,
                Json(json!({ "message": message, "updated_fields": fields })),
            )
                .into_response()
        }
        Err(error) => service_error(error).into_response(),
    }
}

pub(crate) async fn subscribe_handler<D, M>(
    State(context): State<ApiContext<D, M>>,
    Path(port_id): Path<String>,
    body: Bytes,
) -> Response
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    let payload: Value = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(error) => return error.into_response(),
    };
    let email = payload
        .get("email")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !is_plausible_email(email) {
        return ApiError::new(StatusCode::BAD_REQUEST, "Invalid email").into_response();
    }

    let id = match parse_port_id(&port_id) {
        Ok(id) => id,
        Err(error) => return error.into_response(),
    };

    match context.ports.subscribe(id, email) {
        Ok(SubscribeOutcome::Subscribed) => {
            (StatusCode::OK, Json(json!({ "message": "Subscribed" }))).into_response()
        }
        Ok(SubscribeOutcome::AlreadySubscribed) => (
            StatusCode::OK,
            Json(json!({ "message": "Already subscribed" })),
        )
            .into_response(),
        Err(error) => service_error(error).into_response(),
    }
}

pub(crate) async fn create_report_handler<D, M>(
    State(context): State<ApiContext<D, M>>,
    body: Bytes,
) -> Response
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    let draft: ReportDraft = match parse_payload(&body) {
        Ok(draft) => draft,
        Err(error) => return error.into_response(),
    };

    match context.reports.create(draft) {
        Ok(report) => (StatusCode::CREATED, Json(report)).into_response(),
        Err(error) => service_error(error).into_response(),
    }
}

pub(crate) async fn list_reports_handler<D, M>(
    State(context): State<ApiContext<D, M>>,
    headers: HeaderMap,
) -> Response
where
    D: Datastore + 'static,
    M: AlertMailer + 'static,
{
    if let Err(error) = context.auth.require_admin(&headers) {
        return auth_error(error).into_response();
    }

    match context.reports.list() {
        Ok(reports) => (StatusCode::OK, Json(reports)).into_response(),
        Err(error) => service_error(error).into_response(),
    }
}
