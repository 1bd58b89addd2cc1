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

//! Capacity of a single tour availability.
//!
//! An [`Offering`] is the row behind the capacity ledger: it owns the
//! remaining slot count of one dated offering and applies every change under
//! its own lock, so a commit either subtracts the full count or nothing.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use tour_booking_rs::{AvailabilityId, Offering, TourAvailability, TourId};
//!
//! let offering = Offering::new(TourAvailability {
//!     id: AvailabilityId::generate(),
//!     tour_id: TourId::generate(),
//!     start_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
//!     end_date: NaiveDate::from_ymd_opt(2026, 6, 5).unwrap(),
//!     available_slots: 3,
//! });
//! offering.commit(2).unwrap();
//! assert_eq!(offering.available_slots(), 1);
//! assert!(offering.commit(2).is_err());
//! ```

use crate::error::BookingError;
use crate::model::TourAvailability;
use parking_lot::Mutex;
use serde::ser::{Serialize, SerializeStruct, Serializer};

//  check(count)   read-only, fails when count > slots
//  commit(count)  slots -= count, refuses to underflow
//  release(count) slots += count
impl TourAvailability {
    fn check(&self, count: u32) -> Result<(), BookingError> {
        if count > self.available_slots {
            return Err(BookingError::InsufficientCapacity {
                requested: count,
                available: self.available_slots,
            });
        }
        Ok(())
    }

    fn commit(&mut self, count: u32) -> Result<(), BookingError> {
        self.available_slots = self.available_slots.checked_sub(count).ok_or_else(|| {
            BookingError::IntegrityViolation(format!(
                "committing {count} slots on availability {} would leave {} - {count} < 0",
                self.id, self.available_slots
            ))
        })?;
        Ok(())
    }

    fn release(&mut self, count: u32) -> Result<(), BookingError> {
        self.available_slots = self.available_slots.checked_add(count).ok_or_else(|| {
            BookingError::IntegrityViolation(format!(
                "releasing {count} slots on availability {} overflows",
                self.id
            ))
        })?;
        Ok(())
    }
}

/// Lock-guarded capacity row.
#[derive(Debug)]
pub struct Offering {
    inner: Mutex<TourAvailability>,
}

impl Offering {
    pub fn new(availability: TourAvailability) -> Self {
        Self {
            inner: Mutex::new(availability),
        }
    }

    pub fn available_slots(&self) -> u32 {
        self.inner.lock().available_slots
    }

    pub fn snapshot(&self) -> TourAvailability {
        self.inner.lock().clone()
    }

    /// Provisional check used at booking creation. Does not hold anything.
    pub fn check(&self, count: u32) -> Result<(), BookingError> {
        self.inner.lock().check(count)
    }

    /// Atomically takes `count` slots.
    ///
    /// # Errors
    ///
    /// [`BookingError::IntegrityViolation`] when fewer than `count` slots
    /// remain; the slot count is left untouched.
    pub fn commit(&self, count: u32) -> Result<u32, BookingError> {
        let mut data = self.inner.lock();
        data.commit(count)?;
        Ok(data.available_slots)
    }

    /// Atomically gives `count` slots back.
    pub fn release(&self, count: u32) -> Result<u32, BookingError> {
        let mut data = self.inner.lock();
        data.release(count)?;
        Ok(data.available_slots)
    }

    /// Admin override of the remaining slot count. Returns the old count.
    pub fn set_available_slots(&self, slots: u32) -> u32 {
        std::mem::replace(&mut self.inner.lock().available_slots, slots)
    }
}

impl Serialize for Offering {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Offering", 5)?;
        state.serialize_field("id", &data.id)?;
        state.serialize_field("tour_id", &data.tour_id)?;
        state.serialize_field("start_date", &data.start_date)?;
        state.serialize_field("end_date", &data.end_date)?;
        state.serialize_field("available_slots", &data.available_slots)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{AvailabilityId, TourId};
    use chrono::NaiveDate;

    fn availability(slots: u32) -> TourAvailability {
        TourAvailability {
            id: AvailabilityId::generate(),
            tour_id: TourId::generate(),
            start_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 7, 8).unwrap(),
            available_slots: slots,
        }
    }

    #[test]
    fn check_does_not_consume() {
        let offering = Offering::new(availability(3));
        offering.check(2).unwrap();
        offering.check(2).unwrap();
        assert_eq!(offering.available_slots(), 3);
    }

    #[test]
    fn check_rejects_oversubscription() {
        let offering = Offering::new(availability(3));
        assert_eq!(
            offering.check(4),
            Err(BookingError::InsufficientCapacity {
                requested: 4,
                available: 3
            })
        );
    }

    #[test]
    fn commit_underflow_is_integrity_violation() {
        let offering = Offering::new(availability(3));
        assert_eq!(offering.commit(2), Ok(1));
        let result = offering.commit(2);
        assert!(matches!(result, Err(BookingError::IntegrityViolation(_))));
        assert_eq!(offering.available_slots(), 1);
    }

    #[test]
    fn commit_to_zero_is_allowed() {
        let offering = Offering::new(availability(2));
        assert_eq!(offering.commit(2), Ok(0));
    }

    #[test]
    fn release_restores_slots() {
        let offering = Offering::new(availability(5));
        offering.commit(4).unwrap();
        assert_eq!(offering.release(4), Ok(5));
    }

    #[test]
    fn release_overflow_is_integrity_violation() {
        let offering = Offering::new(availability(u32::MAX));
        assert!(matches!(
            offering.release(1),
            Err(BookingError::IntegrityViolation(_))
        ));
        assert_eq!(offering.available_slots(), u32::MAX);
    }

    #[test]
    fn serializes_current_slots() {
        let offering = Offering::new(availability(4));
        offering.commit(1).unwrap();
        let json = serde_json::to_value(&offering).unwrap();
        assert_eq!(json["available_slots"], 3);
        assert_eq!(json["start_date"], "2026-07-01");
    }
}
