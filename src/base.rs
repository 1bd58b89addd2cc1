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

//! Core identifier and enumeration types shared by every module.
//!
//! Identifiers are opaque 25-character strings: a leading `c` followed by 24
//! lowercase alphanumerics. Freshly generated identifiers always have that
//! shape, so they pass [`validate_referential_integrity`].
//!
//! [`validate_referential_integrity`]: crate::validation::validate_referential_integrity

use crate::error::BookingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of an entity identifier.
pub const ID_LENGTH: usize = 25;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generates a fresh identifier.
            pub fn generate() -> Self {
                Self(generate_id())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

entity_id!(
    /// Identifier of a user account.
    UserId
);
entity_id!(
    /// Identifier of a destination grouping tours.
    DestinationId
);
entity_id!(
    /// Identifier of a tour.
    TourId
);
entity_id!(
    /// Identifier of a tour availability (a dated offering with finite slots).
    AvailabilityId
);
entity_id!(
    /// Identifier of a booking.
    BookingId
);
entity_id!(
    /// Identifier of a payment attempt.
    PaymentId
);
entity_id!(
    /// Identifier of a review.
    ReviewId
);

fn generate_id() -> String {
    let entropy = Uuid::new_v4().simple().to_string();
    format!("c{}", &entropy[..ID_LENGTH - 1])
}

/// User role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Staff,
    Admin,
}

impl Role {
    /// Privilege rank: `CUSTOMER(0) < STAFF(1) < ADMIN(2)`.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Customer => 0,
            Self::Staff => 1,
            Self::Admin => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "CUSTOMER",
            Self::Staff => "STAFF",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUSTOMER" => Ok(Self::Customer),
            "STAFF" => Ok(Self::Staff),
            "ADMIN" => Ok(Self::Admin),
            other => Err(BookingError::Validation {
                field: "role",
                reason: format!("unknown role '{other}'"),
            }),
        }
    }
}

/// External payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    Stripe,
    Paystack,
    Flutterwave,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Self::Stripe, Self::Paystack, Self::Flutterwave];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stripe => "STRIPE",
            Self::Paystack => "PAYSTACK",
            Self::Flutterwave => "FLUTTERWAVE",
        }
    }

    /// Payment methods this provider accepts.
    pub const fn methods(self) -> &'static [PaymentMethod] {
        match self {
            Self::Stripe => &[PaymentMethod::Card],
            Self::Paystack | Self::Flutterwave => &[
                PaymentMethod::Card,
                PaymentMethod::MobileMoney,
                PaymentMethod::Bank,
            ],
        }
    }

    pub fn supports(self, method: PaymentMethod) -> bool {
        self.methods().contains(&method)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRIPE" => Ok(Self::Stripe),
            "PAYSTACK" => Ok(Self::Paystack),
            "FLUTTERWAVE" => Ok(Self::Flutterwave),
            _ => Err(BookingError::UnsupportedProvider(s.trim().to_string())),
        }
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    MobileMoney,
    Bank,
}

impl PaymentMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "CARD",
            Self::MobileMoney => "MOBILE_MONEY",
            Self::Bank => "BANK",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CARD" => Ok(Self::Card),
            "MOBILE_MONEY" => Ok(Self::MobileMoney),
            "BANK" => Ok(Self::Bank),
            other => Err(BookingError::Validation {
                field: "method",
                reason: format!("unknown payment method '{other}'"),
            }),
        }
    }
}

/// Settlement currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Ngn,
    Ghs,
    Kes,
}

impl Currency {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Ngn => "NGN",
            Self::Ghs => "GHS",
            Self::Kes => "KES",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "NGN" => Ok(Self::Ngn),
            "GHS" => Ok(Self::Ghs),
            "KES" => Ok(Self::Kes),
            other => Err(BookingError::Validation {
                field: "currency",
                reason: format!("unsupported currency '{other}'"),
            }),
        }
    }
}

/// Editorial content kinds staff may manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    Blog,
    Faq,
    Page,
}

impl FromStr for ContentType {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BLOG" => Ok(Self::Blog),
            "FAQ" => Ok(Self::Faq),
            "PAGE" => Ok(Self::Page),
            other => Err(BookingError::Validation {
                field: "content_type",
                reason: format!("unknown content type '{other}'"),
            }),
        }
    }
}
