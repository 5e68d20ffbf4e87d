//! JSON over HTTP.
//!
//! Handlers validate and convert request bodies, then call straight into the
//! [`Engine`]. Every failure leaves as `{code, message}` with a status the
//! client can act on; contention errors also carry `retryable: true`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        MatchedPath, Path, Query, Request, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::directory::InMemoryDirectory;
use crate::engine::{BookingError, Engine};
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::pricing::PolicyViolation;

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct CreateBooking {
    pub listing_id: String,
    #[serde(default)]
    pub requester_id: String,
    pub check_in: String,
    pub check_out: String,
    pub guests: u32,
    #[serde(default)]
    pub special_requests: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub check_in: String,
    pub check_out: String,
    #[serde(default = "one_guest")]
    pub guests: u32,
}

fn one_guest() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    Guest,
    Host,
}

#[derive(Debug, Deserialize)]
pub struct CancelBooking {
    pub actor: CancelledBy,
    #[serde(default)]
    pub requester_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentResult {
    pub success: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub requester_id: Option<String>,
    /// Comma-separated statuses.
    pub status: Option<String>,
}

/// Listing policy as sent by the host; the id comes from the path.
#[derive(Debug, Deserialize)]
pub struct PolicyBody {
    pub nightly_rate: Decimal,
    pub minimum_stay: u32,
    #[serde(default)]
    pub maximum_stay: Option<u32>,
    pub max_guests: u32,
    pub service_fee_rate: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub approved: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct BookingDetail {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub history: Vec<StatusChange>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<PolicyViolation>,
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub directory: Arc<InMemoryDirectory>,
}

// === Error Handling ===

#[derive(Debug)]
pub enum ApiError {
    Booking(BookingError),
    Validation(String),
    NotFound(String),
    Forbidden(String),
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Booking(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

fn booking_status(err: &BookingError) -> (StatusCode, &'static str) {
    match err {
        BookingError::ListingNotFound(_) => (StatusCode::NOT_FOUND, "LISTING_NOT_FOUND"),
        BookingError::ListingInactive(_) => (StatusCode::CONFLICT, "LISTING_INACTIVE"),
        BookingError::PolicyViolation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "POLICY_VIOLATION"),
        BookingError::DateConflict { .. } => (StatusCode::CONFLICT, "DATE_CONFLICT"),
        BookingError::AdmissionTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "ADMISSION_TIMEOUT"),
        BookingError::ReservationNotFound(_) => (StatusCode::NOT_FOUND, "RESERVATION_NOT_FOUND"),
        BookingError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
        BookingError::StaleState(_) => (StatusCode::CONFLICT, "STALE_STATE"),
        BookingError::AlreadyExists(_) => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
        BookingError::LimitExceeded(_) => (StatusCode::BAD_REQUEST, "LIMIT_EXCEEDED"),
        BookingError::WalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Booking(err) => {
                let (status, code) = booking_status(&err);
                if status.is_server_error() && status != StatusCode::GATEWAY_TIMEOUT {
                    tracing::error!("request failed: {err}");
                }
                let violation = match &err {
                    BookingError::PolicyViolation(v) => Some(v.clone()),
                    _ => None,
                };
                (
                    status,
                    ErrorResponse {
                        code,
                        message: err.to_string(),
                        retryable: err.is_retryable(),
                        violation,
                    },
                )
            }
            ApiError::Validation(message) => (StatusCode::BAD_REQUEST, plain("VALIDATION_ERROR", message)),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, plain("NOT_FOUND", message)),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, plain("FORBIDDEN", message)),
        };
        (status, Json(body)).into_response()
    }
}

fn plain(code: &'static str, message: String) -> ErrorResponse {
    ErrorResponse {
        code,
        message,
        retryable: false,
        violation: None,
    }
}

// === Validation ===

fn parse_id(raw: &str, what: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(raw).map_err(|_| ApiError::Validation(format!("invalid {what}: {raw}")))
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::Validation(format!("{field} must be a YYYY-MM-DD date")))
}

fn parse_stay(check_in: &str, check_out: &str) -> Result<Stay, ApiError> {
    let stay = Stay::new(parse_date(check_in, "check_in")?, parse_date(check_out, "check_out")?);
    if stay.check_out <= stay.check_in {
        return Err(ApiError::Validation("check_out must be after check_in".into()));
    }
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(ApiError::Validation(format!(
            "stays are limited to {MAX_STAY_NIGHTS} nights"
        )));
    }
    Ok(stay)
}

fn parse_statuses(raw: Option<&str>) -> Result<Vec<ReservationStatus>, ApiError> {
    let Some(raw) = raw else { return Ok(Vec::new()) };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(ApiError::Validation))
        .collect()
}

fn validate_requester(requester_id: &str) -> Result<(), ApiError> {
    if requester_id.trim().is_empty() {
        return Err(ApiError::Validation("requester_id is required".into()));
    }
    if requester_id.len() > MAX_REQUESTER_ID_LEN {
        return Err(ApiError::Validation(format!(
            "requester_id must be at most {MAX_REQUESTER_ID_LEN} bytes"
        )));
    }
    Ok(())
}

impl CreateBooking {
    /// Checks that do not depend on the listing. `today` is the earliest
    /// acceptable check-in.
    fn into_request(self, today: NaiveDate) -> Result<BookingRequest, ApiError> {
        let listing_id = parse_id(&self.listing_id, "listing_id")?;
        validate_requester(&self.requester_id)?;
        let stay = parse_stay(&self.check_in, &self.check_out)?;
        if stay.check_in < today {
            return Err(ApiError::Validation("check_in cannot be in the past".into()));
        }
        if self.guests < 1 {
            return Err(ApiError::Validation("guests must be at least 1".into()));
        }
        if self.guests > MAX_GUESTS {
            return Err(ApiError::Validation(format!("guests must be at most {MAX_GUESTS}")));
        }
        let special_requests = self.special_requests.filter(|s| !s.trim().is_empty());
        if let Some(ref notes) = special_requests
            && notes.len() > MAX_SPECIAL_REQUESTS_LEN {
                return Err(ApiError::Validation(format!(
                    "special_requests must be at most {MAX_SPECIAL_REQUESTS_LEN} bytes"
                )));
            }
        Ok(BookingRequest {
            listing_id,
            requester_id: self.requester_id,
            stay,
            guests: self.guests,
            special_requests,
        })
    }
}

// === Handlers ===

/// POST /bookings
async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<CreateBooking>, JsonRejection>,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    let Json(body) = payload?;
    let request = body.into_request(Utc::now().date_naive())?;
    let reservation = state.engine.submit(request).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// GET /bookings?requester_id=&status=
async fn list_bookings(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    let Query(query) = query?;
    let requester_id = query
        .requester_id
        .ok_or_else(|| ApiError::Validation("requester_id is required".into()))?;
    validate_requester(&requester_id)?;
    let statuses = parse_statuses(query.status.as_deref())?;
    Ok(Json(state.engine.list_for_requester(&requester_id, &statuses)))
}

/// GET /bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<BookingDetail>, ApiError> {
    let Path(id) = path?;
    let id = parse_id(&id, "reservation id")?;
    let reservation = state
        .engine
        .get(&id)
        .ok_or(BookingError::ReservationNotFound(id))?;
    Ok(Json(BookingDetail {
        reservation,
        history: state.engine.history(&id),
    }))
}

/// POST /bookings/{id}/confirm
async fn confirm_booking(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Reservation>, ApiError> {
    let Path(id) = path?;
    let id = parse_id(&id, "reservation id")?;
    Ok(Json(state.engine.confirm(id, Actor::Host).await?))
}

/// POST /bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<CancelBooking>, JsonRejection>,
) -> Result<Json<Reservation>, ApiError> {
    let Path(id) = path?;
    let id = parse_id(&id, "reservation id")?;
    let Json(body) = payload?;
    let actor = match body.actor {
        CancelledBy::Host => Actor::Host,
        CancelledBy::Guest => {
            let requester_id = body
                .requester_id
                .ok_or_else(|| ApiError::Validation("requester_id is required for guest cancellation".into()))?;
            let reservation = state
                .engine
                .get(&id)
                .ok_or(BookingError::ReservationNotFound(id))?;
            if reservation.requester_id != requester_id {
                return Err(ApiError::Forbidden("only the requester may cancel as guest".into()));
            }
            Actor::Guest(requester_id)
        }
    };
    Ok(Json(state.engine.cancel(id, actor).await?))
}

/// POST /bookings/{id}/payment
async fn payment_result(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<PaymentResult>, JsonRejection>,
) -> Result<Json<Reservation>, ApiError> {
    let Path(id) = path?;
    let id = parse_id(&id, "reservation id")?;
    let Json(body) = payload?;
    let outcome = if body.success {
        PaymentOutcome::Succeeded
    } else {
        PaymentOutcome::Failed
    };
    Ok(Json(state.engine.on_payment_result(id, outcome).await?))
}

/// GET /listings/{id}/availability?check_in=&check_out=&guests=
async fn availability(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Result<Json<Availability>, ApiError> {
    let Path(id) = path?;
    let Query(query) = query?;
    let listing_id = parse_id(&id, "listing id")?;
    let stay = parse_stay(&query.check_in, &query.check_out)?;
    Ok(Json(state.engine.availability(listing_id, stay, query.guests).await?))
}

/// GET /listings/{id}/bookings?status=
async fn listing_bookings(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    let Path(id) = path?;
    let Query(query) = query?;
    let listing_id = parse_id(&id, "listing id")?;
    let statuses = parse_statuses(query.status.as_deref())?;
    Ok(Json(state.engine.list_for_listing(&listing_id, &statuses)))
}

/// PUT /listings/{id}
async fn put_listing(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<PolicyBody>, JsonRejection>,
) -> Result<Json<ListingPolicy>, ApiError> {
    let Path(id) = path?;
    let id = parse_id(&id, "listing id")?;
    let Json(body) = payload?;
    let policy = ListingPolicy {
        id,
        nightly_rate: body.nightly_rate,
        minimum_stay: body.minimum_stay,
        maximum_stay: body.maximum_stay,
        max_guests: body.max_guests,
        service_fee_rate: body.service_fee_rate,
        currency: body.currency.unwrap_or_else(|| "USD".into()),
        active: body.active.unwrap_or(true),
        approved: body.approved.unwrap_or(true),
    };
    state
        .directory
        .upsert(policy.clone())
        .map_err(ApiError::Validation)?;
    Ok(Json(policy))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "reservations": state.engine.store().len(),
        "listings": state.directory.len(),
    }))
}

async fn fallback() -> ApiError {
    ApiError::NotFound("no such route".into())
}

async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".into());
    let response = next.run(request).await;
    metrics::counter!(
        observability::HTTP_REQUESTS_TOTAL,
        "route" => route,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}

// === Router ===

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/confirm", post(confirm_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
        .route("/bookings/{id}/payment", post(payment_result))
        .route("/listings/{id}", put(put_listing))
        .route("/listings/{id}/availability", get(availability))
        .route("/listings/{id}/bookings", get(listing_bookings))
        .route("/health", get(health))
        .route_layer(middleware::from_fn(track_requests))
        .fallback(fallback)
        .with_state(state)
}
