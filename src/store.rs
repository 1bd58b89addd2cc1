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

//! In-memory relational store.
//!
//! Every table is a [`DashMap`]; a `get_mut` on a row holds that row's lock,
//! which is the row-level atomicity the lifecycle relies on. Booking rows are
//! always locked before offering rows.
//!
//! Deleting a destination cascades to its tours, and deleting a tour cascades
//! to its availabilities, bookings, payments and reviews.

use crate::base::{BookingId, DestinationId, PaymentId, ReviewId, TourId, UserId};
use crate::error::BookingError;
use crate::ledger::CapacityLedger;
use crate::model::{Booking, Destination, Payment, Review, Tour, TourAvailability, User};
use crate::validation::validate_pricing;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

#[derive(Debug, Default)]
pub struct Store {
    users: DashMap<UserId, User>,
    destinations: DashMap<DestinationId, Destination>,
    tours: DashMap<TourId, Tour>,
    pub(crate) ledger: CapacityLedger,
    pub(crate) bookings: DashMap<BookingId, Booking>,
    payments: DashMap<PaymentId, Payment>,
    /// One review per (user, tour).
    reviews: DashMap<(UserId, TourId), Review>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    // === Users ===

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn user(&self, id: &UserId) -> Option<User> {
        self.users.get(id).map(|user| user.clone())
    }

    /// Users holding `role` or higher.
    pub fn users_with_role(&self, role: crate::base::Role) -> Vec<User> {
        self.users
            .iter()
            .filter(|user| user.role.rank() >= role.rank())
            .map(|user| user.clone())
            .collect()
    }

    // === Catalog ===

    pub fn insert_destination(&self, destination: Destination) {
        self.destinations
            .insert(destination.id.clone(), destination);
    }

    pub fn destination(&self, id: &DestinationId) -> Option<Destination> {
        self.destinations.get(id).map(|d| d.clone())
    }

    /// Adds a tour after checking its destination and pricing.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] - destination missing.
    /// - [`BookingError::Rule`] - pricing out of bounds.
    pub fn insert_tour(&self, tour: Tour) -> Result<(), BookingError> {
        if !self.destinations.contains_key(&tour.destination_id) {
            return Err(BookingError::not_found("Destination", &tour.destination_id));
        }
        validate_pricing(tour.price_per_person, tour.max_group_size)?;
        self.tours.insert(tour.id.clone(), tour);
        Ok(())
    }

    /// Admin edit of an existing tour. Pricing is revalidated.
    pub fn update_tour(&self, tour: Tour) -> Result<(), BookingError> {
        validate_pricing(tour.price_per_person, tour.max_group_size)?;
        let mut row = self
            .tours
            .get_mut(&tour.id)
            .ok_or_else(|| BookingError::not_found("Tour", &tour.id))?;
        *row = tour;
        Ok(())
    }

    pub fn tour(&self, id: &TourId) -> Option<Tour> {
        self.tours.get(id).map(|tour| tour.clone())
    }

    pub fn insert_availability(&self, availability: TourAvailability) -> Result<(), BookingError> {
        if !self.tours.contains_key(&availability.tour_id) {
            return Err(BookingError::not_found("Tour", &availability.tour_id));
        }
        if availability.end_date < availability.start_date {
            return Err(BookingError::Validation {
                field: "end_date",
                reason: "must not precede start_date".to_string(),
            });
        }
        self.ledger.insert(availability);
        Ok(())
    }

    pub fn availability(&self, id: &crate::base::AvailabilityId) -> Option<TourAvailability> {
        self.ledger.snapshot(id)
    }

    /// Removes a tour and everything hanging off it.
    pub fn delete_tour(&self, id: &TourId) -> Result<Tour, BookingError> {
        let (_, tour) = self
            .tours
            .remove(id)
            .ok_or_else(|| BookingError::not_found("Tour", id))?;

        let availabilities = self.ledger.remove_for_tour(id);
        let booking_ids: Vec<BookingId> = self
            .bookings
            .iter()
            .filter(|booking| &booking.tour_id == id)
            .map(|booking| booking.id.clone())
            .collect();
        for booking_id in &booking_ids {
            self.bookings.remove(booking_id);
        }
        self.payments
            .retain(|_, payment| !booking_ids.contains(&payment.booking_id));
        self.reviews.retain(|(_, tour_id), _| tour_id != id);

        info!(
            tour = %id,
            availabilities,
            bookings = booking_ids.len(),
            "tour deleted"
        );
        Ok(tour)
    }

    pub fn delete_destination(&self, id: &DestinationId) -> Result<Destination, BookingError> {
        let (_, destination) = self
            .destinations
            .remove(id)
            .ok_or_else(|| BookingError::not_found("Destination", id))?;
        let tour_ids: Vec<TourId> = self
            .tours
            .iter()
            .filter(|tour| &tour.destination_id == id)
            .map(|tour| tour.id.clone())
            .collect();
        for tour_id in &tour_ids {
            self.delete_tour(tour_id)?;
        }
        Ok(destination)
    }

    // === Bookings ===

    pub fn booking(&self, id: &BookingId) -> Option<Booking> {
        self.bookings.get(id).map(|booking| booking.clone())
    }

    pub fn bookings_for_user(&self, user_id: &UserId) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|booking| &booking.user_id == user_id)
            .map(|booking| booking.clone())
            .collect()
    }

    pub(crate) fn bookings_matching(&self, predicate: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|booking| predicate(booking))
            .map(|booking| booking.clone())
            .collect()
    }

    // === Payments ===

    pub fn insert_payment(&self, payment: Payment) {
        self.payments.insert(payment.id.clone(), payment);
    }

    pub fn payment(&self, id: &PaymentId) -> Option<Payment> {
        self.payments.get(id).map(|payment| payment.clone())
    }

    pub fn payments_for_booking(&self, booking_id: &BookingId) -> Vec<Payment> {
        self.payments
            .iter()
            .filter(|payment| &payment.booking_id == booking_id)
            .map(|payment| payment.clone())
            .collect()
    }

    /// Applies `change` under the payment row lock and returns the new record.
    pub(crate) fn update_payment(
        &self,
        id: &PaymentId,
        change: impl FnOnce(&mut Payment),
    ) -> Result<Payment, BookingError> {
        let mut payment = self
            .payments
            .get_mut(id)
            .ok_or_else(|| BookingError::not_found("Payment", id))?;
        change(&mut payment);
        Ok(payment.clone())
    }

    // === Reviews ===

    /// Inserts a review unless the user already reviewed the tour.
    pub(crate) fn insert_review(&self, review: Review) -> Result<Review, BookingError> {
        // Entry API keeps the uniqueness check and the insert atomic.
        match self
            .reviews
            .entry((review.user_id.clone(), review.tour_id.clone()))
        {
            Entry::Occupied(_) => Err(BookingError::DuplicateReview),
            Entry::Vacant(entry) => {
                entry.insert(review.clone());
                Ok(review)
            }
        }
    }

    pub fn review(&self, user_id: &UserId, tour_id: &TourId) -> Option<Review> {
        self.reviews
            .get(&(user_id.clone(), tour_id.clone()))
            .map(|review| review.clone())
    }

    pub(crate) fn approve_review(&self, id: &ReviewId) -> Result<Review, BookingError> {
        let mut review = self
            .reviews
            .iter_mut()
            .find(|review| &review.id == id)
            .ok_or_else(|| BookingError::not_found("Review", id))?;
        review.approved = true;
        Ok(review.clone())
    }
}
