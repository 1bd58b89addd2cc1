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

//! Paystack adapter.
//!
//! The payment id doubles as the Paystack transaction reference, so a
//! webhook can always be correlated even before the initialize call returned.

use super::{
    InitializeRequest, InitializeResponse, PaymentGateway, WebhookEvent, hex_encode, parse_body,
    read_json, request_failed, str_at, to_minor_units,
};
use crate::base::{PaymentId, PaymentMethod, Provider};
use crate::config::PaystackConfig;
use crate::error::BookingError;
use crate::model::{Payment, PaymentStatus};
use async_trait::async_trait;
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha512;
use tracing::debug;

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Clone)]
pub struct PaystackGateway {
    http: Client,
    config: PaystackConfig,
}

/// Paystack wraps every response in `{status, message, data}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Authorization {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    status: String,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, BookingError> {
        match (self.status, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(BookingError::Provider(format!(
                "PAYSTACK rejected request: {}",
                self.message
            ))),
        }
    }
}

impl PaystackGateway {
    pub fn new(config: PaystackConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

/// Hex HMAC-SHA512 of the raw body, keyed with the secret key.
pub fn sign(secret_key: &str, body: &[u8]) -> Result<String, BookingError> {
    let mut mac = HmacSha512::new_from_slice(secret_key.as_bytes())
        .map_err(|_| BookingError::InvalidSignature)?;
    mac.update(body);
    Ok(hex_encode(&mac.finalize().into_bytes()))
}

fn channel(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Card => "card",
        PaymentMethod::MobileMoney => "mobile_money",
        PaymentMethod::Bank => "bank",
    }
}

fn status_of(status: &str) -> PaymentStatus {
    match status {
        "success" => PaymentStatus::Success,
        "failed" | "abandoned" | "reversed" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn provider(&self) -> Provider {
        Provider::Paystack
    }

    fn signature_header(&self) -> &'static str {
        "x-paystack-signature"
    }

    async fn initialize(
        &self,
        payment: &Payment,
        request: &InitializeRequest,
    ) -> Result<InitializeResponse, BookingError> {
        let mut body = json!({
            "email": request.customer_email,
            "amount": to_minor_units(payment.amount)?,
            "currency": payment.currency.as_str(),
            "reference": payment.id,
            "channels": [channel(payment.method)],
            "metadata": {
                "payment_id": payment.id,
                "booking_id": request.booking_id,
                "description": request.description,
            },
        });
        if let Some(callback_url) = &self.config.callback_url {
            body["callback_url"] = json!(callback_url);
        }

        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.config.base_url))
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed(Provider::Paystack, e))?;
        let authorization = read_json::<Envelope<Authorization>>(Provider::Paystack, response)
            .await?
            .into_data()?;

        Ok(InitializeResponse {
            payment_url: Some(authorization.authorization_url),
            provider_transaction_id: Some(authorization.reference),
        })
    }

    async fn verify(&self, payment: &Payment) -> Result<PaymentStatus, BookingError> {
        let reference = payment
            .provider_transaction_id
            .as_deref()
            .unwrap_or(payment.id.as_str());
        let response = self
            .http
            .get(format!(
                "{}/transaction/verify/{reference}",
                self.config.base_url
            ))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| request_failed(Provider::Paystack, e))?;
        let transaction = read_json::<Envelope<Transaction>>(Provider::Paystack, response)
            .await?
            .into_data()?;
        Ok(status_of(&transaction.status))
    }

    fn decode_webhook(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<Option<WebhookEvent>, BookingError> {
        let signature = signature.ok_or(BookingError::InvalidSignature)?;
        let expected = sign(&self.config.secret_key, body)?;
        if !constant_time_eq(signature.trim().as_bytes(), expected.as_bytes()) {
            return Err(BookingError::InvalidSignature);
        }

        let event = parse_body(body)?;
        let status = match str_at(&event, "/event") {
            Some("charge.success") => PaymentStatus::Success,
            Some("charge.failed") => PaymentStatus::Failed,
            other => {
                debug!(event_type = ?other, "ignoring paystack event");
                return Ok(None);
            }
        };
        let payment_id = str_at(&event, "/data/metadata/payment_id")
            .or_else(|| str_at(&event, "/data/reference"))
            .ok_or_else(|| BookingError::MalformedWebhook("charge event without reference".into()))?;

        Ok(Some(WebhookEvent {
            payment_id: PaymentId::from(payment_id),
            status,
            provider_transaction_id: str_at(&event, "/data/reference").map(str::to_string),
            provider: Provider::Paystack,
            settlement: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> PaystackGateway {
        PaystackGateway::new(PaystackConfig::new("sk_test_paystack"))
    }

    fn decode(body: &serde_json::Value) -> Result<Option<WebhookEvent>, BookingError> {
        let body = body.to_string();
        let signature = sign("sk_test_paystack", body.as_bytes()).unwrap();
        gateway().decode_webhook(Some(&signature), body.as_bytes())
    }

    #[test]
    fn charge_success_maps_to_success() {
        let event = decode(&json!({
            "event": "charge.success",
            "data": {"reference": "cpay000000000000000000001", "status": "success"}
        }))
        .unwrap()
        .unwrap();
        assert_eq!(event.status, PaymentStatus::Success);
        assert_eq!(event.payment_id.as_str(), "cpay000000000000000000001");
        assert_eq!(
            event.provider_transaction_id.as_deref(),
            Some("cpay000000000000000000001")
        );
    }

    #[test]
    fn metadata_payment_id_wins_over_reference() {
        let event = decode(&json!({
            "event": "charge.failed",
            "data": {"reference": "ref_1", "metadata": {"payment_id": "cpay1"}}
        }))
        .unwrap()
        .unwrap();
        assert_eq!(event.status, PaymentStatus::Failed);
        assert_eq!(event.payment_id.as_str(), "cpay1");
        assert_eq!(event.provider_transaction_id.as_deref(), Some("ref_1"));
    }

    #[test]
    fn charge_without_reference_is_malformed() {
        assert!(matches!(
            decode(&json!({"event": "charge.success", "data": {}})),
            Err(BookingError::MalformedWebhook(_))
        ));
    }

    #[test]
    fn transfer_events_are_ignored() {
        assert_eq!(
            decode(&json!({"event": "transfer.success", "data": {"reference": "t1"}})),
            Ok(None)
        );
    }

    #[test]
    fn bad_or_missing_signature_is_rejected() {
        let body = br#"{"event":"charge.success","data":{"reference":"r"}}"#;
        assert_eq!(
            gateway().decode_webhook(None, body),
            Err(BookingError::InvalidSignature)
        );
        let wrong = sign("sk_other", body).unwrap();
        assert_eq!(
            gateway().decode_webhook(Some(&wrong), body),
            Err(BookingError::InvalidSignature)
        );
    }

    #[test]
    fn verify_status_mapping() {
        assert_eq!(status_of("success"), PaymentStatus::Success);
        assert_eq!(status_of("abandoned"), PaymentStatus::Failed);
        assert_eq!(status_of("ongoing"), PaymentStatus::Pending);
    }

    #[test]
    fn rejected_envelope_is_a_provider_error() {
        let envelope: Envelope<Transaction> =
            serde_json::from_value(json!({"status": false, "message": "Invalid key"})).unwrap();
        assert_eq!(
            envelope.into_data().err(),
            Some(BookingError::Provider(
                "PAYSTACK rejected request: Invalid key".into()
            ))
        );
    }
}
