// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP surface over the [`Engine`].
//!
//! ## Endpoints
//!
//! - `POST /bookings` - Create a booking
//! - `GET  /bookings/{id}` - Get a booking (owner or staff)
//! - `POST /bookings/{id}/confirm` - Confirm manually (staff)
//! - `POST /bookings/{id}/cancel` - Cancel a booking
//! - `POST /bookings/{id}/payments` - Start a payment attempt
//! - `POST /payments/{id}/verify` - Poll the provider for a payment
//! - `POST /webhooks/{provider}` - Provider webhook (unauthenticated, signed)
//! - `GET  /tours/{id}` - Get a tour
//! - `GET  /tours/{id}/availabilities` - List a tour's offerings
//! - `GET  /availabilities/{id}` - Get an offering with its remaining slots
//! - `POST /tours/{id}/reviews` - Review a tour
//! - `PUT  /admin/bookings/{id}/status` - Override a booking's status (admin)
//! - `POST /admin/reviews/{id}/approve` - Approve a review (admin)
//! - `POST /admin/reminders` - Send due tour reminders (admin)
//!
//! Callers identify themselves with the `x-user-id` and `x-user-role`
//! headers set by the identity layer in front of this service.
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:8080/bookings \
//!   -H "Content-Type: application/json" \
//!   -H "x-user-id: cu0000000000000000000001a" -H "x-user-role: CUSTOMER" \
//!   -d '{"tour_id": "...", "availability_id": "...", "travelers_count": 2}'
//! ```

use crate::base::{AvailabilityId, BookingId, PaymentId, ReviewId, TourId, UserId};
use crate::engine::{BookingRequest, Engine, PaymentRequest, ReviewRequest};
use crate::error::{BookingError, ErrorKind};
use crate::lifecycle::Cancellation;
use crate::model::{
    Booking, BookingStatus, Payment, Principal, Review, Tour, TourAvailability,
};
use crate::validation::validate_admin_access;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

// === Request/Response DTOs ===

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SlotsRequest {
    pub available_slots: u32,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusRequest {
    pub status: BookingStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    /// Payment the event was applied to; absent for ignored events.
    pub payment_id: Option<PaymentId>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RemindersSent {
    pub sent: usize,
}

/// Response body for errors.
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting [`BookingError`] into HTTP responses.
pub struct AppError(BookingError);

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError(err)
    }
}

impl From<crate::error::BusinessRuleError> for AppError {
    fn from(err: crate::error::BusinessRuleError) -> Self {
        AppError(err.into())
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::CapacityExhausted | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidPayment => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotAuthorized => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::ProviderUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: self.0.code().to_string(),
            }),
        )
            .into_response()
    }
}

// === Identity ===

/// The principal named by the identity headers.
pub struct Caller(pub Principal);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };
        let id = header(USER_ID_HEADER).ok_or_else(|| {
            BookingError::Permission(format!("missing {USER_ID_HEADER} header"))
        })?;
        let role = header(USER_ROLE_HEADER).unwrap_or("CUSTOMER").parse()?;
        Ok(Caller(Principal::new(UserId::from(id), role)))
    }
}

// === Handlers ===

/// POST /bookings
async fn create_booking(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.engine.create_booking(&principal, &request)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<BookingId>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.engine.booking(&principal, &id)?))
}

/// POST /bookings/{id}/confirm
async fn confirm_booking(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<BookingId>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.engine.confirm_booking(&principal, &id).await?))
}

/// POST /bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<BookingId>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Cancellation>, AppError> {
    let cancellation = state
        .engine
        .cancel_booking(&principal, &id, request.reason)
        .await?;
    Ok(Json(cancellation))
}

/// POST /bookings/{id}/payments
async fn initialize_payment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<BookingId>,
    Json(request): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = state
        .engine
        .initialize_payment(&principal, &id, &request)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// POST /payments/{id}/verify
async fn verify_payment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<PaymentId>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(state.engine.verify_payment(&principal, &id).await?))
}

/// POST /webhooks/{provider}
async fn webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let gateway = state.engine.gateways().resolve(&provider)?;
    let signature = headers
        .get(gateway.signature_header())
        .and_then(|value| value.to_str().ok());
    let payment = state
        .engine
        .handle_webhook(&provider, signature, &body)
        .await?;
    Ok(Json(WebhookAck {
        received: true,
        payment_id: payment.map(|payment| payment.id),
    }))
}

/// GET /tours/{id}
async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<TourId>,
) -> Result<Json<Tour>, AppError> {
    Ok(Json(state.engine.tour(&id)?))
}

/// GET /tours/{id}/availabilities
async fn list_availabilities(
    State(state): State<AppState>,
    Path(id): Path<TourId>,
) -> Result<Json<Vec<TourAvailability>>, AppError> {
    state.engine.tour(&id)?;
    let mut availabilities = state.engine.availabilities_for_tour(&id);
    availabilities.sort_by_key(|availability| availability.start_date);
    Ok(Json(availabilities))
}

/// GET /availabilities/{id}
async fn get_availability(
    State(state): State<AppState>,
    Path(id): Path<AvailabilityId>,
) -> Result<Json<TourAvailability>, AppError> {
    Ok(Json(state.engine.availability(&id)?))
}

/// POST /tours/{id}/reviews
async fn create_review(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<TourId>,
    Json(request): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    let review = state.engine.create_review(&principal, &id, &request)?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// PUT /admin/bookings/{id}/status
async fn set_booking_status(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<BookingId>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .engine
        .admin_set_booking_status(&principal, &id, request.status, request.reason)
        .await?;
    Ok(Json(booking))
}

/// PUT /admin/availabilities/{id}/slots
async fn set_available_slots(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<AvailabilityId>,
    Json(request): Json<SlotsRequest>,
) -> Result<Json<TourAvailability>, AppError> {
    Ok(Json(state.engine.admin_set_available_slots(
        &principal,
        &id,
        request.available_slots,
    )?))
}

/// POST /admin/reviews/{id}/approve
async fn approve_review(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<ReviewId>,
) -> Result<Json<Review>, AppError> {
    Ok(Json(state.engine.approve_review(&principal, &id)?))
}

/// POST /admin/reminders
async fn send_reminders(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> Result<Json<RemindersSent>, AppError> {
    validate_admin_access(&principal)?;
    let sent = state.engine.send_reminders(Utc::now()).await;
    Ok(Json(RemindersSent { sent }))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

// === Router ===

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/bookings", post(create_booking))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/confirm", post(confirm_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
        .route("/bookings/{id}/payments", post(initialize_payment))
        .route("/payments/{id}/verify", post(verify_payment))
        .route("/webhooks/{provider}", post(webhook))
        .route("/tours/{id}", get(get_tour))
        .route("/tours/{id}/availabilities", get(list_availabilities))
        .route("/tours/{id}/reviews", post(create_review))
        .route("/availabilities/{id}", get(get_availability))
        .route("/admin/bookings/{id}/status", put(set_booking_status))
        .route("/admin/availabilities/{id}/slots", put(set_available_slots))
        .route("/admin/reviews/{id}/approve", post(approve_review))
        .route("/admin/reminders", post(send_reminders))
        .with_state(AppState { engine })
}

/// Serves the API on `listener` until the process is stopped.
pub async fn serve(listener: TcpListener, engine: Arc<Engine>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "tour booking API listening");
    }
    axum::serve(listener, router(engine)).await
}
