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

//! Capacity ledger.
//!
//! Tracks remaining slots per tour availability. Capacity is only checked when
//! a booking is created ([`CapacityLedger::reserve_tentative`]) and taken when
//! the booking is confirmed ([`CapacityLedger::commit`]). Two pending bookings
//! may therefore pass the tentative check against the same slots; the commit
//! refuses to underflow, so the second confirmation fails instead of
//! overbooking.

use crate::base::{AvailabilityId, TourId};
use crate::error::BookingError;
use crate::model::TourAvailability;
use crate::offering::Offering;
use dashmap::DashMap;
use tracing::{debug, error};

#[derive(Debug, Default)]
pub struct CapacityLedger {
    offerings: DashMap<AvailabilityId, Offering>,
}

impl CapacityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, availability: TourAvailability) {
        self.offerings
            .insert(availability.id.clone(), Offering::new(availability));
    }

    pub fn snapshot(&self, id: &AvailabilityId) -> Option<TourAvailability> {
        self.offerings.get(id).map(|offering| offering.snapshot())
    }

    pub fn available_slots(&self, id: &AvailabilityId) -> Result<u32, BookingError> {
        Ok(self.offering(id)?.available_slots())
    }

    /// Availabilities belonging to `tour_id`.
    pub fn for_tour(&self, tour_id: &TourId) -> Vec<TourAvailability> {
        self.offerings
            .iter()
            .map(|entry| entry.value().snapshot())
            .filter(|availability| &availability.tour_id == tour_id)
            .collect()
    }

    /// Read-then-check against current slots; nothing is held.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] - unknown availability.
    /// - [`BookingError::InsufficientCapacity`] - `count` exceeds remaining slots.
    pub fn reserve_tentative(&self, id: &AvailabilityId, count: u32) -> Result<(), BookingError> {
        self.offering(id)?.check(count)
    }

    /// Takes `count` slots.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] - unknown availability.
    /// - [`BookingError::IntegrityViolation`] - the offering has fewer than
    ///   `count` slots left. Nothing is changed.
    pub fn commit(&self, id: &AvailabilityId, count: u32) -> Result<u32, BookingError> {
        let remaining = self.offering(id)?.commit(count).inspect_err(|e| {
            error!(availability = %id, count, error = %e, "capacity commit refused");
        })?;
        debug!(availability = %id, count, remaining, "capacity committed");
        Ok(remaining)
    }

    /// Gives `count` slots back.
    pub fn release(&self, id: &AvailabilityId, count: u32) -> Result<u32, BookingError> {
        let remaining = self.offering(id)?.release(count)?;
        debug!(availability = %id, count, remaining, "capacity released");
        Ok(remaining)
    }

    /// Overwrites the remaining slot count, returning the previous value.
    pub fn set_available_slots(&self, id: &AvailabilityId, slots: u32) -> Result<u32, BookingError> {
        let previous = self.offering(id)?.set_available_slots(slots);
        debug!(availability = %id, previous, slots, "available slots overwritten");
        Ok(previous)
    }

    /// Drops every availability of `tour_id`, returning how many were removed.
    pub fn remove_for_tour(&self, tour_id: &TourId) -> usize {
        let before = self.offerings.len();
        self.offerings
            .retain(|_, offering| &offering.snapshot().tour_id != tour_id);
        before - self.offerings.len()
    }

    fn offering(
        &self,
        id: &AvailabilityId,
    ) -> Result<dashmap::mapref::one::Ref<'_, AvailabilityId, Offering>, BookingError> {
        self.offerings
            .get(id)
            .ok_or_else(|| BookingError::not_found("TourAvailability", id))
    }
}
