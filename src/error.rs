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

//! Error types for booking, capacity and payment processing.

use crate::base::Provider;
use crate::model::BookingStatus;
use serde::Serialize;
use thiserror::Error;

/// Category of a business rule that rejected its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    Permission,
    Pricing,
    Payment,
    Content,
    Reference,
    Review,
}

/// Violation reported by the business rule validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct BusinessRuleError {
    pub rule: Rule,
    pub field: &'static str,
    pub reason: String,
}

impl BusinessRuleError {
    pub fn new(rule: Rule, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            rule,
            field,
            reason: reason.into(),
        }
    }
}

/// Booking and payment processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// A business rule rejected the request
    #[error(transparent)]
    Rule(#[from] BusinessRuleError),

    /// Malformed or out-of-range input
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Booking would exceed the remaining slots of the offering
    #[error("insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: u32, available: u32 },

    /// No gateway exists for the named provider
    #[error("unsupported payment provider: {0}")]
    UnsupportedProvider(String),

    /// Webhook came from a different provider than the stored payment
    #[error("provider mismatch: payment belongs to {expected}, event from {actual}")]
    ProviderMismatch { expected: Provider, actual: Provider },

    /// Role or ownership check failed
    #[error("not authorized: {0}")]
    Permission(String),

    /// A storage invariant would break (capacity underflow and the like)
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// Lifecycle transition not allowed from the current state
    #[error("cannot {action} a {from} booking")]
    InvalidTransition {
        from: BookingStatus,
        action: &'static str,
    },

    /// User already reviewed this tour
    #[error("review already exists for this tour")]
    DuplicateReview,

    /// Provider call failed or returned an unusable response
    #[error("payment provider error: {0}")]
    Provider(String),

    /// Webhook payload could not be mapped to a payment event
    #[error("malformed webhook: {0}")]
    MalformedWebhook(String),

    /// Webhook signature missing or wrong
    #[error("invalid webhook signature")]
    InvalidSignature,
}

/// User-visible failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    CapacityExhausted,
    InvalidPayment,
    NotAuthorized,
    NotFound,
    InvalidInput,
    Conflict,
    ProviderUnavailable,
    Internal,
}

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classifies the error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rule(rule) => match rule.rule {
                Rule::Permission => ErrorKind::NotAuthorized,
                Rule::Payment => ErrorKind::InvalidPayment,
                _ => ErrorKind::InvalidInput,
            },
            Self::Permission(_) | Self::InvalidSignature => ErrorKind::NotAuthorized,
            Self::InsufficientCapacity { .. } => ErrorKind::CapacityExhausted,
            Self::UnsupportedProvider(_) | Self::ProviderMismatch { .. } => {
                ErrorKind::InvalidPayment
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } | Self::MalformedWebhook(_) => ErrorKind::InvalidInput,
            Self::InvalidTransition { .. } | Self::DuplicateReview => ErrorKind::Conflict,
            Self::Provider(_) => ErrorKind::ProviderUnavailable,
            Self::IntegrityViolation(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rule(rule) => match rule.rule {
                Rule::Permission => "NOT_AUTHORIZED",
                Rule::Payment => "INVALID_PAYMENT",
                Rule::Pricing => "INVALID_PRICING",
                Rule::Content => "INVALID_CONTENT",
                Rule::Reference => "INVALID_REFERENCE",
                Rule::Review => "INVALID_REVIEW",
            },
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InsufficientCapacity { .. } => "CAPACITY_EXHAUSTED",
            Self::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            Self::ProviderMismatch { .. } => "PROVIDER_MISMATCH",
            Self::Permission(_) => "NOT_AUTHORIZED",
            Self::IntegrityViolation(_) => "INTEGRITY_VIOLATION",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::DuplicateReview => "DUPLICATE_REVIEW",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::MalformedWebhook(_) => "MALFORMED_WEBHOOK",
            Self::InvalidSignature => "INVALID_SIGNATURE",
        }
    }
}
