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

//! Property-based tests for the business rules and the capacity ledger.
//!
//! These tests verify invariants that should hold for any sequence of
//! lifecycle operations and any rule input.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tour_booking_rs::validation::{
    validate_payment, validate_pricing, validate_rating, validate_referential_integrity,
};
use tour_booking_rs::{
    AvailabilityId, BookingId, BookingStatus, Destination, DestinationId, Offering, Store, Tour,
    TourAvailability, TourId, TourStatus, UserId,
};

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Price from 0.00 to 150000.00, two decimal places.
fn arb_price() -> impl Strategy<Value = Decimal> {
    (0i64..=15_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_provider() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("STRIPE"), Just("paystack"), Just("Flutterwave"), Just("PAYPAL")]
}

fn arb_method() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("CARD"), Just("mobile_money"), Just("BANK"), Just("CRYPTO")]
}

fn arb_currency() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("USD"), Just("ngn"), Just("KES"), Just("XYZ")]
}

#[derive(Debug, Clone)]
enum Op {
    Confirm(usize),
    Cancel(usize),
}

fn arb_ops(bookings: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            (0..bookings).prop_map(Op::Confirm),
            (0..bookings).prop_map(Op::Cancel),
        ],
        0..40,
    )
}

fn offering_store(slots: u32) -> (Store, TourId, AvailabilityId) {
    let store = Store::new();
    let destination = DestinationId::generate();
    store.insert_destination(Destination {
        id: destination.clone(),
        name: "Zanzibar".into(),
        country: "TZ".into(),
    });
    let tour = TourId::generate();
    store
        .insert_tour(Tour {
            id: tour.clone(),
            destination_id: destination,
            title: "Spice Farm Walk".into(),
            price_per_person: Decimal::new(4500, 2),
            max_group_size: 100,
            status: TourStatus::Active,
        })
        .unwrap();
    let availability = AvailabilityId::generate();
    store
        .insert_availability(TourAvailability {
            id: availability.clone(),
            tour_id: tour.clone(),
            start_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            available_slots: slots,
        })
        .unwrap();
    (store, tour, availability)
}

// =============================================================================
// Business Rule Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Pricing passes exactly when every bound holds.
    #[test]
    fn pricing_accepts_iff_within_bounds(
        price in arb_price(),
        group in 0u32..=120,
    ) {
        let expected = price >= Decimal::ONE
            && price <= Decimal::from(100_000)
            && (1..=100).contains(&group)
            && price * Decimal::from(group) <= Decimal::from(1_000_000);
        prop_assert_eq!(validate_pricing(price, group).is_ok(), expected);
    }

    /// Payment passes exactly when amount, currency and provider/method all fit.
    #[test]
    fn payment_accepts_iff_supported(
        amount in (-1_000i64..=120_000_000i64).prop_map(|cents| Decimal::new(cents, 2)),
        currency in arb_currency(),
        method in arb_method(),
        provider in arb_provider(),
    ) {
        let amount_ok = amount > Decimal::ZERO && amount <= Decimal::from(1_000_000);
        let currency_ok = currency != "XYZ";
        let pair_ok = matches!(
            (provider.to_ascii_uppercase().as_str(), method.to_ascii_uppercase().as_str()),
            ("STRIPE", "CARD")
                | ("PAYSTACK" | "FLUTTERWAVE", "CARD" | "MOBILE_MONEY" | "BANK")
        );
        prop_assert_eq!(
            validate_payment(amount, currency, method, provider).is_ok(),
            amount_ok && currency_ok && pair_ok
        );
    }

    #[test]
    fn rating_accepts_one_through_five(rating in any::<u8>()) {
        prop_assert_eq!(validate_rating(rating).is_ok(), (1..=5).contains(&rating));
    }

    /// Generated ids always have the accepted shape; other strings rarely do.
    #[test]
    fn generated_ids_are_well_formed(raw in "[A-Za-z0-9_-]{0,30}") {
        let tour = TourId::generate();
        let availability = AvailabilityId::generate();
        prop_assert!(validate_referential_integrity(
            "Tour", tour.as_str(), "TourAvailability", availability.as_str()
        ).is_ok());

        let shaped = raw.len() == 25
            && raw.starts_with('c')
            && raw[1..].bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
        prop_assert_eq!(
            validate_referential_integrity("Tour", &raw, "TourAvailability", availability.as_str()).is_ok(),
            shaped
        );
    }
}

// =============================================================================
// Capacity Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Remaining slots always equal the initial slots minus the travelers of
    /// every confirmed booking, whatever order confirms and cancels arrive in.
    #[test]
    fn slots_track_confirmed_travelers(
        initial in 0u32..=30,
        travelers in prop::collection::vec(1u32..=8, 1..6),
        ops in arb_ops(6),
    ) {
        let (store, tour, availability) = offering_store(initial);
        let user = UserId::generate();
        let mut bookings: Vec<(BookingId, u32)> = Vec::new();
        for count in &travelers {
            // Creation only checks capacity; it may refuse oversize groups.
            if let Ok(booking) = store.create_booking(&user, &tour, &availability, *count) {
                bookings.push((booking.id, *count));
            }
        }

        for op in ops {
            match op {
                Op::Confirm(i) => {
                    if let Some((id, _)) = bookings.get(i) {
                        let _ = store.confirm_booking(id);
                    }
                }
                Op::Cancel(i) => {
                    if let Some((id, _)) = bookings.get(i) {
                        let _ = store.cancel_booking(id, None);
                    }
                }
            }

            let committed: u32 = bookings
                .iter()
                .filter(|(id, _)| store.booking(id).unwrap().status == BookingStatus::Confirmed)
                .map(|(_, count)| count)
                .sum();
            let remaining = store.ledger().available_slots(&availability).unwrap();
            prop_assert_eq!(remaining + committed, initial);
        }
    }

    /// Confirm followed by cancel hands back exactly what was taken.
    #[test]
    fn cancel_undoes_confirm(
        (initial, count) in (1u32..=100).prop_flat_map(|count| (count..=100, Just(count))),
    ) {
        let (store, tour, availability) = offering_store(initial);
        let booking = store
            .create_booking(&UserId::generate(), &tour, &availability, count)
            .unwrap();

        store.confirm_booking(&booking.id).unwrap();
        prop_assert_eq!(store.ledger().available_slots(&availability).unwrap(), initial - count);

        let cancellation = store.cancel_booking(&booking.id, None).unwrap();
        prop_assert_eq!(cancellation.released_slots, count);
        prop_assert_eq!(store.ledger().available_slots(&availability).unwrap(), initial);
    }

    /// An offering never goes below zero or reports a commit it refused.
    #[test]
    fn offering_never_underflows(
        initial in 0u32..=20,
        requests in prop::collection::vec(1u32..=6, 0..20),
    ) {
        let offering = Offering::new(TourAvailability {
            id: AvailabilityId::generate(),
            tour_id: TourId::generate(),
            start_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 7, 2).unwrap(),
            available_slots: initial,
        });
        let mut taken = 0u32;
        for count in requests {
            let before = offering.available_slots();
            match offering.commit(count) {
                Ok(remaining) => {
                    prop_assert_eq!(remaining, before - count);
                    taken += count;
                }
                Err(_) => prop_assert_eq!(offering.available_slots(), before),
            }
        }
        prop_assert_eq!(offering.available_slots() + taken, initial);
    }

    /// Booking totals are price times travelers, exactly.
    #[test]
    fn total_price_is_exact(count in 1u32..=100) {
        let (store, tour, availability) = offering_store(100);
        let booking = store
            .create_booking(&UserId::generate(), &tour, &availability, count)
            .unwrap();
        prop_assert_eq!(booking.total_price, Decimal::new(4500, 2) * Decimal::from(count));
    }
}

// =============================================================================
// Status Bookkeeping
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Cancelled bookings stay cancelled; later confirms are refused.
    #[test]
    fn cancelled_is_terminal(ops in arb_ops(1)) {
        let (store, tour, availability) = offering_store(10);
        let booking = store
            .create_booking(&UserId::generate(), &tour, &availability, 2)
            .unwrap();

        for op in ops {
            let was_cancelled = store.booking(&booking.id).unwrap().status == BookingStatus::Cancelled;
            match op {
                Op::Confirm(_) => {
                    let result = store.confirm_booking(&booking.id);
                    if was_cancelled {
                        prop_assert!(result.is_err());
                    }
                }
                Op::Cancel(_) => {
                    let cancellation = store.cancel_booking(&booking.id, None).unwrap();
                    prop_assert_eq!(cancellation.already_cancelled, was_cancelled);
                }
            }
            if was_cancelled {
                prop_assert_eq!(
                    store.booking(&booking.id).unwrap().status,
                    BookingStatus::Cancelled
                );
            }
        }
        prop_assert!(store.ledger().available_slots(&availability).unwrap() <= 10);
    }
}
