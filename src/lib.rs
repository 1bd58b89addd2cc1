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

//! # Tour Booking
//!
//! Booking, payment and capacity core of a tour booking service. Customers
//! book dated tour offerings with finite capacity, pay through an external
//! provider (Stripe, Paystack or Flutterwave), and once paid the booking is
//! confirmed and its slots are taken, exactly once.
//!
//! ## Core Components
//!
//! - [`Engine`]: Entry point; permission checks, lifecycle, payments, reviews
//! - [`CapacityLedger`]: Remaining slots per offering, never negative
//! - [`PaymentGateway`]: Provider adapter contract, looked up via [`GatewayRegistry`]
//! - [`Notifier`]: Best-effort emails sent after a change committed
//! - [`validation`]: Stateless business rules
//! - [`BookingError`]: Error taxonomy with [`ErrorKind`] classification
//!
//! ## Example
//!
//! ```
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//! use tour_booking_rs::{
//!     AvailabilityId, BookingRequest, BookingStatus, Config, Destination, DestinationId,
//!     Engine, Principal, Role, Store, Tour, TourAvailability, TourId, TourStatus, UserId,
//! };
//!
//! let store = Arc::new(Store::new());
//! let destination = DestinationId::generate();
//! store.insert_destination(Destination {
//!     id: destination.clone(),
//!     name: "Lake Malawi".into(),
//!     country: "MW".into(),
//! });
//! let tour = TourId::generate();
//! store
//!     .insert_tour(Tour {
//!         id: tour.clone(),
//!         destination_id: destination,
//!         title: "Kayak the Lake".into(),
//!         price_per_person: dec!(500),
//!         max_group_size: 20,
//!         status: TourStatus::Active,
//!     })
//!     .unwrap();
//! let availability = AvailabilityId::generate();
//! store
//!     .insert_availability(TourAvailability {
//!         id: availability.clone(),
//!         tour_id: tour.clone(),
//!         start_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
//!         end_date: NaiveDate::from_ymd_opt(2026, 9, 4).unwrap(),
//!         available_slots: 12,
//!     })
//!     .unwrap();
//!
//! let engine = Engine::from_config(&Config::default(), store);
//! let customer = Principal::new(UserId::generate(), Role::Customer);
//! let booking = engine
//!     .create_booking(
//!         &customer,
//!         &BookingRequest {
//!             tour_id: tour,
//!             availability_id: availability.clone(),
//!             travelers_count: 3,
//!         },
//!     )
//!     .unwrap();
//!
//! assert_eq!(booking.status, BookingStatus::Pending);
//! assert_eq!(booking.total_price, dec!(1500));
//! // Slots are only taken on confirmation.
//! assert_eq!(engine.availability(&availability).unwrap().available_slots, 12);
//! ```
//!
//! ## Thread Safety
//!
//! The store keeps every table in a [`dashmap::DashMap`] and every offering
//! behind its own mutex. Booking rows are always locked before offering rows,
//! and a payment row is never held while a booking is locked.

mod base;
pub mod config;
mod engine;
pub mod error;
pub mod gateway;
mod ledger;
mod lifecycle;
mod model;
pub mod notification;
mod offering;
pub mod reconciliation;
pub mod server;
mod store;
pub mod validation;

pub use base::{
    AvailabilityId, BookingId, ContentType, Currency, DestinationId, ID_LENGTH, PaymentId,
    PaymentMethod, Provider, ReviewId, Role, TourId, UserId,
};
pub use config::Config;
pub use engine::{BookingRequest, Engine, PaymentRequest, ReviewRequest};
pub use error::{BookingError, BusinessRuleError, ErrorKind, Rule};
pub use gateway::{GatewayRegistry, PaymentGateway, WebhookEvent};
pub use ledger::CapacityLedger;
pub use lifecycle::Cancellation;
pub use model::{
    Booking, BookingStatus, Destination, Payment, PaymentStatus, Principal, Review, Tour,
    TourAvailability, TourStatus, User,
};
pub use notification::{EmailMessage, EmailTransport, LogTransport, Notification, Notifier};
pub use offering::Offering;
pub use store::Store;
