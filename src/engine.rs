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

//! Booking engine.
//!
//! The [`Engine`] is the entry point callers go through. It checks who is
//! asking, drives the store's lifecycle operations, and flushes staged
//! notifications once a change has committed.
//!
//! # Operations
//!
//! - **Bookings**: create, confirm (staff), cancel (owner while pending,
//!   staff at any time), admin status override.
//! - **Payments**: initialize with a provider, reconcile webhooks and
//!   verification results (see [`crate::reconciliation`]).
//! - **Reviews**: create after a confirmed booking, approve (admin).
//! - **Reminders**: [`Engine::send_reminders`], called by an external scheduler.
//!
//! # Thread Safety
//!
//! All state lives in the [`Store`]'s row-locked tables, so one engine is
//! shared across requests behind an [`Arc`].

use crate::base::{AvailabilityId, BookingId, ReviewId, Role, TourId};
use crate::config::{Config, ReminderConfig};
use crate::error::BookingError;
use crate::gateway::GatewayRegistry;
use crate::lifecycle::Cancellation;
use crate::model::{Booking, BookingStatus, Principal, Review, Tour, TourAvailability};
use crate::notification::{LogTransport, Notification, Notifier, Outbox};
use crate::store::Store;
use crate::validation::{
    validate_admin_access, validate_rating, validate_referential_integrity, validate_user_role,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Request body for creating a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub tour_id: TourId,
    pub availability_id: AvailabilityId,
    pub travelers_count: u32,
}

/// Request body for a payment attempt. Fields are raw strings so unsupported
/// values are reported by the payment rules rather than by deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub currency: String,
    pub method: String,
    pub provider: String,
    /// Overrides the account email sent to the provider.
    #[serde(default)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

pub struct Engine {
    store: Arc<Store>,
    pub(crate) gateways: GatewayRegistry,
    notifier: Notifier,
    /// Notifications raised by committed changes, waiting for delivery.
    pub(crate) outbox: Outbox,
    reminders: ReminderConfig,
}

impl Engine {
    pub fn new(
        store: Arc<Store>,
        gateways: GatewayRegistry,
        notifier: Notifier,
        reminders: ReminderConfig,
    ) -> Self {
        Engine {
            store,
            gateways,
            notifier,
            outbox: Outbox::new(),
            reminders,
        }
    }

    /// Wires an engine from configuration, logging emails instead of sending them.
    pub fn from_config(config: &Config, store: Arc<Store>) -> Self {
        let notifier = Notifier::new(
            Arc::clone(&store),
            Arc::new(LogTransport),
            config.notifications.clone(),
        );
        Self::new(
            store,
            GatewayRegistry::from_config(&config.payments),
            notifier,
            config.reminders.clone(),
        )
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    // === Catalog reads ===

    pub fn tour(&self, id: &TourId) -> Result<Tour, BookingError> {
        self.store
            .tour(id)
            .ok_or_else(|| BookingError::not_found("Tour", id))
    }

    pub fn availability(&self, id: &AvailabilityId) -> Result<TourAvailability, BookingError> {
        self.store
            .availability(id)
            .ok_or_else(|| BookingError::not_found("TourAvailability", id))
    }

    pub fn availabilities_for_tour(&self, id: &TourId) -> Vec<TourAvailability> {
        self.store.ledger().for_tour(id)
    }

    /// Admin edit of an offering's remaining slots.
    pub fn admin_set_available_slots(
        &self,
        principal: &Principal,
        id: &AvailabilityId,
        slots: u32,
    ) -> Result<TourAvailability, BookingError> {
        validate_admin_access(principal)?;
        let previous = self.store.ledger().set_available_slots(id, slots)?;
        info!(availability = %id, previous, slots, admin = %principal.id, "available slots edited");
        self.availability(id)
    }

    // === Bookings ===

    /// Returns a booking visible to `principal`: their own, or any for staff.
    pub fn booking(
        &self,
        principal: &Principal,
        id: &BookingId,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .store
            .booking(id)
            .ok_or_else(|| BookingError::not_found("Booking", id))?;
        ensure_owner_or_staff(principal, &booking)?;
        Ok(booking)
    }

    /// Books `travelers_count` places for `principal`. The booking starts
    /// pending; slots are only taken once a payment confirms it.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Rule`] - malformed tour or availability id.
    /// - [`BookingError::NotFound`] - tour or availability missing.
    /// - [`BookingError::InsufficientCapacity`] - not enough slots left.
    /// - [`BookingError::Validation`] - see [`Store::create_booking`].
    #[instrument(skip(self, principal), fields(user = %principal.id))]
    pub fn create_booking(
        &self,
        principal: &Principal,
        request: &BookingRequest,
    ) -> Result<Booking, BookingError> {
        validate_user_role(principal, Role::Customer)?;
        validate_referential_integrity(
            "Tour",
            request.tour_id.as_str(),
            "TourAvailability",
            request.availability_id.as_str(),
        )?;
        self.store.create_booking(
            &principal.id,
            &request.tour_id,
            &request.availability_id,
            request.travelers_count,
        )
    }

    /// Manual confirmation by staff, e.g. for an offline payment.
    pub async fn confirm_booking(
        &self,
        principal: &Principal,
        id: &BookingId,
    ) -> Result<Booking, BookingError> {
        validate_user_role(principal, Role::Staff)?;
        let booking = self.store.confirm_booking(id)?;
        self.outbox.push(Notification::BookingConfirmed {
            booking_id: booking.id.clone(),
        });
        self.flush().await;
        Ok(booking)
    }

    /// Cancels a booking.
    ///
    /// Customers may cancel their own bookings while pending; staff may
    /// cancel any booking, in which case the customer is notified.
    pub async fn cancel_booking(
        &self,
        principal: &Principal,
        id: &BookingId,
        reason: Option<String>,
    ) -> Result<Cancellation, BookingError> {
        let booking = self
            .store
            .booking(id)
            .ok_or_else(|| BookingError::not_found("Booking", id))?;
        ensure_owner_or_staff(principal, &booking)?;
        if !principal.is_staff() && booking.status == BookingStatus::Confirmed {
            return Err(BookingError::Permission(
                "confirmed bookings can only be cancelled by staff".to_string(),
            ));
        }

        let cancellation = self.store.cancel_booking(id, reason.clone())?;
        if principal.is_staff() && !cancellation.already_cancelled {
            self.outbox.push(Notification::BookingCancelled {
                booking_id: id.clone(),
                reason,
            });
            self.flush().await;
        }
        Ok(cancellation)
    }

    /// Admin override of a booking's status, routed through the lifecycle so
    /// capacity stays consistent. Reopening a booking is not possible.
    pub async fn admin_set_booking_status(
        &self,
        principal: &Principal,
        id: &BookingId,
        status: BookingStatus,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        validate_admin_access(principal)?;
        match status {
            BookingStatus::Confirmed => self.confirm_booking(principal, id).await,
            BookingStatus::Cancelled => Ok(self.cancel_booking(principal, id, reason).await?.booking),
            BookingStatus::Pending => {
                let booking = self
                    .store
                    .booking(id)
                    .ok_or_else(|| BookingError::not_found("Booking", id))?;
                if booking.status == BookingStatus::Pending {
                    Ok(booking)
                } else {
                    Err(BookingError::InvalidTransition {
                        from: booking.status,
                        action: "reopen",
                    })
                }
            }
        }
    }

    // === Reviews ===

    /// Records a review. The author needs a confirmed booking for the tour
    /// and may review each tour once. Reviews start unapproved.
    pub fn create_review(
        &self,
        principal: &Principal,
        tour_id: &TourId,
        request: &ReviewRequest,
    ) -> Result<Review, BookingError> {
        validate_rating(request.rating)?;
        self.tour(tour_id)?;
        let has_confirmed_booking = self
            .store
            .bookings_for_user(&principal.id)
            .iter()
            .any(|booking| {
                &booking.tour_id == tour_id && booking.status == BookingStatus::Confirmed
            });
        if !has_confirmed_booking {
            return Err(BookingError::Permission(
                "only travelers with a confirmed booking can review this tour".to_string(),
            ));
        }

        let review = self.store.insert_review(Review {
            id: ReviewId::generate(),
            user_id: principal.id.clone(),
            tour_id: tour_id.clone(),
            rating: request.rating,
            comment: request.comment.trim().to_string(),
            approved: false,
            created_at: Utc::now(),
        })?;
        info!(review = %review.id, tour = %tour_id, rating = review.rating, "review created");
        Ok(review)
    }

    pub fn approve_review(
        &self,
        principal: &Principal,
        id: &ReviewId,
    ) -> Result<Review, BookingError> {
        validate_admin_access(principal)?;
        self.store.approve_review(id)
    }

    // === Reminders ===

    /// Stages a reminder for every confirmed booking whose tour starts in
    /// `(now, now + lead]` and that was not reminded yet. Returns how many
    /// reminders went out.
    pub async fn send_reminders(&self, now: DateTime<Utc>) -> usize {
        let Some(horizon) = Duration::try_hours(self.reminders.lead_hours)
            .and_then(|lead| now.checked_add_signed(lead))
        else {
            warn!(lead_hours = self.reminders.lead_hours, "reminder lead out of range");
            return 0;
        };
        let due = self.store.bookings_matching(|booking| {
            booking.status == BookingStatus::Confirmed && booking.reminder_sent_at.is_none()
        });

        let mut sent = 0;
        for booking in due {
            let Some(availability) = self.store.availability(&booking.availability_id) else {
                continue;
            };
            let starts_at = availability.start_date.and_time(chrono::NaiveTime::MIN).and_utc();
            if starts_at <= now || starts_at > horizon {
                continue;
            }
            if self.store.mark_reminder_sent(&booking.id, now) {
                self.outbox.push(Notification::TourReminder {
                    booking_id: booking.id,
                });
                sent += 1;
            }
        }
        if sent > 0 {
            info!(sent, "tour reminders staged");
        }
        self.flush().await;
        sent
    }

    /// Delivers everything staged in the outbox.
    pub(crate) async fn flush(&self) {
        let pending = self.outbox.drain();
        self.notifier.dispatch(pending).await;
    }
}

pub(crate) fn ensure_owner_or_staff(
    principal: &Principal,
    booking: &Booking,
) -> Result<(), BookingError> {
    if booking.user_id == principal.id || principal.is_staff() {
        Ok(())
    } else {
        Err(BookingError::Permission(format!(
            "booking {} belongs to another user",
            booking.id
        )))
    }
}
