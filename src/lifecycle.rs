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

//! Booking lifecycle.
//!
//! ```text
//!  Pending ──confirm (commit slots)──► Confirmed
//!     │                                   │
//!     └──cancel──► Cancelled ◄──cancel (release slots)
//! ```
//!
//! Confirm and cancel run while holding the booking row, and the capacity
//! change is applied before the status is written. If the ledger refuses the
//! change the booking keeps its old status, so the status flip and the slot
//! change land together or not at all.

use crate::base::{AvailabilityId, BookingId, TourId, UserId};
use crate::error::BookingError;
use crate::model::{Booking, BookingStatus, TourStatus};
use crate::store::Store;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outcome of a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub booking: Booking,
    /// Slots handed back to the ledger (zero unless the booking was confirmed).
    pub released_slots: u32,
    /// The booking was cancelled before this call; nothing changed.
    pub already_cancelled: bool,
}

impl Store {
    /// Creates a pending booking after a tentative capacity check.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] - zero travelers, inactive tour, group
    ///   larger than the tour allows, or availability of another tour.
    /// - [`BookingError::NotFound`] - tour or availability missing.
    /// - [`BookingError::InsufficientCapacity`] - not enough slots right now.
    pub fn create_booking(
        &self,
        user_id: &UserId,
        tour_id: &TourId,
        availability_id: &AvailabilityId,
        travelers_count: u32,
    ) -> Result<Booking, BookingError> {
        if travelers_count == 0 {
            return Err(BookingError::Validation {
                field: "travelers_count",
                reason: "must be at least 1".to_string(),
            });
        }
        let tour = self
            .tour(tour_id)
            .ok_or_else(|| BookingError::not_found("Tour", tour_id))?;
        if tour.status != TourStatus::Active {
            return Err(BookingError::Validation {
                field: "tour_id",
                reason: "tour is not accepting bookings".to_string(),
            });
        }
        let availability = self
            .availability(availability_id)
            .ok_or_else(|| BookingError::not_found("TourAvailability", availability_id))?;
        if &availability.tour_id != tour_id {
            return Err(BookingError::Validation {
                field: "availability_id",
                reason: format!("availability does not belong to tour {tour_id}"),
            });
        }
        if travelers_count > tour.max_group_size {
            return Err(BookingError::Validation {
                field: "travelers_count",
                reason: format!("tour allows at most {} travelers", tour.max_group_size),
            });
        }
        self.ledger.reserve_tentative(availability_id, travelers_count)?;

        let now = Utc::now();
        let booking = Booking {
            id: BookingId::generate(),
            user_id: user_id.clone(),
            tour_id: tour_id.clone(),
            availability_id: availability_id.clone(),
            travelers_count,
            total_price: tour.price_per_person * Decimal::from(travelers_count),
            status: BookingStatus::Pending,
            cancellation_reason: None,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        self.bookings.insert(booking.id.clone(), booking.clone());
        info!(
            booking = %booking.id,
            availability = %availability_id,
            travelers = travelers_count,
            total = %booking.total_price,
            "booking created"
        );
        Ok(booking)
    }

    /// Confirms a pending booking and commits its slots.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] - booking missing.
    /// - [`BookingError::InvalidTransition`] - booking is not pending.
    /// - [`BookingError::IntegrityViolation`] - the offering ran out of slots;
    ///   the booking stays pending.
    pub fn confirm_booking(&self, id: &BookingId) -> Result<Booking, BookingError> {
        let mut booking = self
            .bookings
            .get_mut(id)
            .ok_or_else(|| BookingError::not_found("Booking", id))?;
        if booking.status != BookingStatus::Pending {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                action: "confirm",
            });
        }
        self.apply_confirmation(&mut booking)?;
        Ok(booking.clone())
    }

    /// Compare-and-swap confirmation: confirms only if the booking is still
    /// pending. Returns `None` when another caller got there first or the
    /// booking left the pending state.
    pub fn confirm_if_pending(&self, id: &BookingId) -> Result<Option<Booking>, BookingError> {
        let mut booking = self
            .bookings
            .get_mut(id)
            .ok_or_else(|| BookingError::not_found("Booking", id))?;
        if booking.status != BookingStatus::Pending {
            debug!(booking = %id, status = %booking.status, "confirmation skipped");
            return Ok(None);
        }
        self.apply_confirmation(&mut booking)?;
        Ok(Some(booking.clone()))
    }

    /// Cancels a booking, releasing its slots if they were committed.
    ///
    /// Cancelling a cancelled booking changes nothing and reports
    /// `already_cancelled`.
    pub fn cancel_booking(
        &self,
        id: &BookingId,
        reason: Option<String>,
    ) -> Result<Cancellation, BookingError> {
        let mut booking = self
            .bookings
            .get_mut(id)
            .ok_or_else(|| BookingError::not_found("Booking", id))?;

        let released_slots = match booking.status {
            BookingStatus::Cancelled => {
                return Ok(Cancellation {
                    booking: booking.clone(),
                    released_slots: 0,
                    already_cancelled: true,
                });
            }
            BookingStatus::Confirmed => {
                self.ledger
                    .release(&booking.availability_id, booking.travelers_count)?;
                booking.travelers_count
            }
            BookingStatus::Pending => 0,
        };

        booking.status = BookingStatus::Cancelled;
        booking.cancellation_reason = reason;
        booking.updated_at = Utc::now();
        info!(booking = %id, released_slots, "booking cancelled");

        Ok(Cancellation {
            booking: booking.clone(),
            released_slots,
            already_cancelled: false,
        })
    }

    /// Records that a reminder went out. Returns `false` if one already had.
    pub(crate) fn mark_reminder_sent(&self, id: &BookingId, at: DateTime<Utc>) -> bool {
        let Some(mut booking) = self.bookings.get_mut(id) else {
            return false;
        };
        if booking.reminder_sent_at.is_some() || booking.status != BookingStatus::Confirmed {
            return false;
        }
        booking.reminder_sent_at = Some(at);
        true
    }

    fn apply_confirmation(&self, booking: &mut Booking) -> Result<(), BookingError> {
        let remaining = self
            .ledger
            .commit(&booking.availability_id, booking.travelers_count)?;
        booking.status = BookingStatus::Confirmed;
        booking.updated_at = Utc::now();
        info!(
            booking = %booking.id,
            availability = %booking.availability_id,
            remaining,
            "booking confirmed"
        );
        Ok(())
    }
}
