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

//! Stripe Checkout adapter.
//!
//! Payments are started as Checkout Sessions; the session id is the provider
//! transaction id. Webhooks are signed with the endpoint secret
//! (`Stripe-Signature: t=<unix>,v1=<hex hmac-sha256 of "t.body">`).

use super::{
    InitializeRequest, InitializeResponse, PaymentGateway, WebhookEvent, hex_encode, parse_body,
    read_json, request_failed, str_at, to_minor_units,
};
use crate::base::{PaymentId, Provider};
use crate::config::StripeConfig;
use crate::error::BookingError;
use crate::model::{Payment, PaymentStatus};
use async_trait::async_trait;
use chrono::Utc;
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct StripeGateway {
    http: Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn verify_signature(&self, header: Option<&str>, body: &[u8]) -> Result<(), BookingError> {
        let Some(secret) = &self.config.webhook_secret else {
            return Ok(());
        };
        let header = header.ok_or(BookingError::InvalidSignature)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(BookingError::InvalidSignature)?;
        let age = Utc::now().timestamp().abs_diff(timestamp);
        if age > self.config.webhook_tolerance_secs.unsigned_abs() {
            debug!(timestamp, "stripe webhook outside tolerance");
            return Err(BookingError::InvalidSignature);
        }

        let expected = sign(secret, timestamp, body)?;
        if signatures
            .iter()
            .any(|candidate| constant_time_eq(candidate.as_bytes(), expected.as_bytes()))
        {
            Ok(())
        } else {
            Err(BookingError::InvalidSignature)
        }
    }
}

/// Hex HMAC-SHA256 over `"{timestamp}.{body}"`.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, BookingError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BookingError::InvalidSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex_encode(&mac.finalize().into_bytes()))
}

fn status_of(session: &CheckoutSession) -> PaymentStatus {
    match (session.payment_status.as_deref(), session.status.as_deref()) {
        (Some("paid"), _) => PaymentStatus::Success,
        (_, Some("expired")) => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> Provider {
        Provider::Stripe
    }

    fn signature_header(&self) -> &'static str {
        "stripe-signature"
    }

    async fn initialize(
        &self,
        payment: &Payment,
        request: &InitializeRequest,
    ) -> Result<InitializeResponse, BookingError> {
        let unit_amount = to_minor_units(payment.amount)?;
        let params = vec![
            ("mode", "payment".to_string()),
            ("success_url", self.config.success_url.clone()),
            ("cancel_url", self.config.cancel_url.clone()),
            ("client_reference_id", payment.id.to_string()),
            ("customer_email", request.customer_email.clone()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                payment.currency.as_str().to_ascii_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.description.clone(),
            ),
            ("metadata[payment_id]", payment.id.to_string()),
            ("metadata[booking_id]", request.booking_id.to_string()),
            (
                "payment_intent_data[metadata][payment_id]",
                payment.id.to_string(),
            ),
        ];

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.config.base_url))
            .bearer_auth(&self.config.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| request_failed(Provider::Stripe, e))?;
        let session: CheckoutSession = read_json(Provider::Stripe, response).await?;

        Ok(InitializeResponse {
            payment_url: session.url,
            provider_transaction_id: Some(session.id),
        })
    }

    async fn verify(&self, payment: &Payment) -> Result<PaymentStatus, BookingError> {
        let session_id = payment.provider_transaction_id.as_deref().ok_or_else(|| {
            BookingError::Provider(format!("payment {} has no checkout session", payment.id))
        })?;
        let response = self
            .http
            .get(format!(
                "{}/v1/checkout/sessions/{session_id}",
                self.config.base_url
            ))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| request_failed(Provider::Stripe, e))?;
        let session: CheckoutSession = read_json(Provider::Stripe, response).await?;
        Ok(status_of(&session))
    }

    fn decode_webhook(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<Option<WebhookEvent>, BookingError> {
        self.verify_signature(signature, body)?;
        let event = parse_body(body)?;
        let event_type = str_at(&event, "/type")
            .ok_or_else(|| BookingError::MalformedWebhook("missing event type".into()))?;

        let (status, from_session) = match event_type {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                let paid = str_at(&event, "/data/object/payment_status") == Some("paid");
                let status = if paid {
                    PaymentStatus::Success
                } else {
                    PaymentStatus::Pending
                };
                (status, true)
            }
            "checkout.session.async_payment_failed" | "checkout.session.expired" => {
                (PaymentStatus::Failed, true)
            }
            "payment_intent.payment_failed" => (PaymentStatus::Failed, false),
            other => {
                debug!(event_type = other, "ignoring stripe event");
                return Ok(None);
            }
        };

        let payment_id = str_at(&event, "/data/object/client_reference_id")
            .or_else(|| str_at(&event, "/data/object/metadata/payment_id"))
            .ok_or_else(|| {
                BookingError::MalformedWebhook(format!("{event_type} carries no payment id"))
            })?;
        let provider_transaction_id = if from_session {
            str_at(&event, "/data/object/id").map(str::to_string)
        } else {
            None
        };

        Ok(Some(WebhookEvent {
            payment_id: PaymentId::from(payment_id),
            status,
            provider_transaction_id,
            provider: Provider::Stripe,
            settlement: None,
        }))
    }
}
