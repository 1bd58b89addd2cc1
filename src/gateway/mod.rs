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

//! Payment gateway adapters.
//!
//! Every provider implements [`PaymentGateway`]: start a payment, ask the
//! provider where a payment stands, and turn a provider webhook into the
//! canonical [`WebhookEvent`]. The [`GatewayRegistry`] maps a [`Provider`] to
//! its implementation so callers never branch on provider names.

pub mod flutterwave;
pub mod paystack;
pub mod stripe;

use crate::base::{BookingId, PaymentId, Provider};
use crate::config::PaymentsConfig;
use crate::error::BookingError;
use crate::model::{Payment, PaymentStatus};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub use flutterwave::FlutterwaveGateway;
pub use paystack::PaystackGateway;
pub use stripe::StripeGateway;

/// Customer-facing details a provider needs to start a charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeRequest {
    pub booking_id: BookingId,
    pub customer_email: String,
    pub description: String,
}

/// What the provider handed back when the charge was started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeResponse {
    /// Hosted page the customer is sent to.
    pub payment_url: Option<String>,
    pub provider_transaction_id: Option<String>,
}

/// Provider-neutral payment outcome decoded from a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub provider_transaction_id: Option<String>,
    pub provider: Provider,
    /// What the provider says was paid, for providers that report it.
    #[serde(default)]
    pub settlement: Option<Settlement>,
}

/// Amount and currency a provider reports as collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
}

impl Settlement {
    /// True when the full amount was collected in the payment's currency.
    pub fn covers(&self, payment: &Payment) -> bool {
        let amount_matches = self.amount.is_some_and(|amount| amount >= payment.amount);
        let currency_matches = self
            .currency
            .as_deref()
            .is_some_and(|currency| currency.eq_ignore_ascii_case(payment.currency.as_str()));
        amount_matches && currency_matches
    }

    /// Downgrades a reported success to failed when the money does not match.
    pub fn reconcile(&self, payment: &Payment, status: PaymentStatus) -> PaymentStatus {
        if status != PaymentStatus::Success || self.covers(payment) {
            return status;
        }
        warn!(
            payment = %payment.id,
            provider = %payment.provider,
            expected = %payment.amount,
            paid = ?self.amount,
            currency = ?self.currency,
            "settlement does not match payment"
        );
        PaymentStatus::Failed
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> Provider;

    /// HTTP header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Starts a charge for `payment`.
    async fn initialize(
        &self,
        payment: &Payment,
        request: &InitializeRequest,
    ) -> Result<InitializeResponse, BookingError>;

    /// Asks the provider for the current status of `payment`.
    async fn verify(&self, payment: &Payment) -> Result<PaymentStatus, BookingError>;

    /// Authenticates and decodes a webhook body.
    ///
    /// Returns `Ok(None)` for events that carry no payment outcome.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidSignature`] - signature missing or wrong.
    /// - [`BookingError::MalformedWebhook`] - unparseable body, or a payment
    ///   event without the correlating payment id.
    fn decode_webhook(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<Option<WebhookEvent>, BookingError>;
}

/// Provider → gateway lookup.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<Provider, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds gateways for every provider that has credentials configured.
    pub fn from_config(config: &PaymentsConfig) -> Self {
        let mut registry = Self::new();
        if let Some(stripe) = &config.stripe {
            registry.register(Arc::new(StripeGateway::new(stripe.clone())));
        }
        if let Some(paystack) = &config.paystack {
            registry.register(Arc::new(PaystackGateway::new(paystack.clone())));
        }
        if let Some(flutterwave) = &config.flutterwave {
            registry.register(Arc::new(FlutterwaveGateway::new(flutterwave.clone())));
        }
        registry
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.provider(), gateway);
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.register(gateway);
        self
    }

    /// # Errors
    ///
    /// [`BookingError::UnsupportedProvider`] when nothing is registered for
    /// `provider`.
    pub fn get(&self, provider: Provider) -> Result<Arc<dyn PaymentGateway>, BookingError> {
        self.gateways
            .get(&provider)
            .cloned()
            .ok_or_else(|| BookingError::UnsupportedProvider(provider.to_string()))
    }

    /// Looks a gateway up by provider name, e.g. from a webhook URL.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PaymentGateway>, BookingError> {
        self.get(name.parse()?)
    }

    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.gateways.keys().copied().collect();
        providers.sort_by_key(|provider| provider.as_str());
        providers
    }
}

impl fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

/// Converts a major-unit amount into integer minor units (cents, kobo, ...).
pub(crate) fn to_minor_units(amount: Decimal) -> Result<i64, BookingError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| BookingError::Provider(format!("amount {amount} out of range")))
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Reads a JSON body, turning non-2xx responses into provider errors.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: Provider,
    response: reqwest::Response,
) -> Result<T, BookingError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BookingError::Provider(format!(
            "{provider} returned {status}: {body}"
        )));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| BookingError::Provider(format!("{provider} response unreadable: {e}")))
}

pub(crate) fn request_failed(provider: Provider, error: reqwest::Error) -> BookingError {
    BookingError::Provider(format!("{provider} request failed: {error}"))
}

pub(crate) fn parse_body(body: &[u8]) -> Result<serde_json::Value, BookingError> {
    serde_json::from_slice(body).map_err(|e| BookingError::MalformedWebhook(e.to_string()))
}

/// Decimal at `pointer`, given either as a JSON number or a string.
pub(crate) fn decimal_at(value: &serde_json::Value, pointer: &str) -> Option<Decimal> {
    match value.pointer(pointer)? {
        serde_json::Value::Number(number) => number.to_string().parse().ok(),
        serde_json::Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

pub(crate) fn str_at<'a>(value: &'a serde_json::Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
}
