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

//! Flutterwave Standard adapter.
//!
//! Charges are created with `tx_ref` set to the payment id, which is also
//! the provider transaction id. Unlike the other providers, Flutterwave takes
//! amounts in major units.

use super::{
    InitializeRequest, InitializeResponse, PaymentGateway, Settlement, WebhookEvent, decimal_at,
    parse_body, read_json, request_failed, str_at,
};
use crate::base::{PaymentId, PaymentMethod, Provider};
use crate::config::FlutterwaveConfig;
use crate::error::BookingError;
use crate::model::{Payment, PaymentStatus};
use async_trait::async_trait;
use constant_time_eq::constant_time_eq;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FlutterwaveGateway {
    http: Client,
    config: FlutterwaveConfig,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, BookingError> {
        match (self.status.as_str(), self.data) {
            ("success", Some(data)) => Ok(data),
            _ => Err(BookingError::Provider(format!(
                "FLUTTERWAVE rejected request: {}",
                self.message
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Link {
    link: String,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    status: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    amount: Option<Decimal>,
    currency: Option<String>,
}

impl FlutterwaveGateway {
    pub fn new(config: FlutterwaveConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

fn payment_option(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Card => "card",
        PaymentMethod::MobileMoney => "mobilemoney",
        PaymentMethod::Bank => "banktransfer",
    }
}

fn status_of(status: &str) -> PaymentStatus {
    match status {
        "successful" => PaymentStatus::Success,
        "failed" | "cancelled" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

impl Transaction {
    fn settlement(&self) -> Settlement {
        Settlement {
            amount: self.amount,
            currency: self.currency.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for FlutterwaveGateway {
    fn provider(&self) -> Provider {
        Provider::Flutterwave
    }

    fn signature_header(&self) -> &'static str {
        "verif-hash"
    }

    async fn initialize(
        &self,
        payment: &Payment,
        request: &InitializeRequest,
    ) -> Result<InitializeResponse, BookingError> {
        let mut body = json!({
            "tx_ref": payment.id,
            "amount": payment.amount.to_string(),
            "currency": payment.currency.as_str(),
            "payment_options": payment_option(payment.method),
            "customer": {"email": request.customer_email},
            "meta": {"payment_id": payment.id, "booking_id": request.booking_id},
            "customizations": {"title": request.description},
        });
        if let Some(redirect_url) = &self.config.redirect_url {
            body["redirect_url"] = json!(redirect_url);
        }

        let response = self
            .http
            .post(format!("{}/v3/payments", self.config.base_url))
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed(Provider::Flutterwave, e))?;
        let link = read_json::<Envelope<Link>>(Provider::Flutterwave, response)
            .await?
            .into_data()?;

        Ok(InitializeResponse {
            payment_url: Some(link.link),
            provider_transaction_id: Some(payment.id.to_string()),
        })
    }

    async fn verify(&self, payment: &Payment) -> Result<PaymentStatus, BookingError> {
        let tx_ref = payment
            .provider_transaction_id
            .as_deref()
            .unwrap_or(payment.id.as_str());
        let response = self
            .http
            .get(format!(
                "{}/v3/transactions/verify_by_reference",
                self.config.base_url
            ))
            .query(&[("tx_ref", tx_ref)])
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| request_failed(Provider::Flutterwave, e))?;
        let transaction = read_json::<Envelope<Transaction>>(Provider::Flutterwave, response)
            .await?
            .into_data()?;
        Ok(transaction
            .settlement()
            .reconcile(payment, status_of(&transaction.status)))
    }

    fn decode_webhook(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<Option<WebhookEvent>, BookingError> {
        if let Some(hash) = &self.config.webhook_hash {
            let signature = signature.ok_or(BookingError::InvalidSignature)?;
            if !constant_time_eq(signature.as_bytes(), hash.as_bytes()) {
                return Err(BookingError::InvalidSignature);
            }
        }

        let event = parse_body(body)?;
        if str_at(&event, "/event") != Some("charge.completed") {
            debug!(event_type = ?str_at(&event, "/event"), "ignoring flutterwave event");
            return Ok(None);
        }
        let status = status_of(str_at(&event, "/data/status").unwrap_or_default());
        let payment_id = str_at(&event, "/data/tx_ref")
            .ok_or_else(|| BookingError::MalformedWebhook("charge.completed without tx_ref".into()))?;

        Ok(Some(WebhookEvent {
            payment_id: PaymentId::from(payment_id),
            status,
            provider_transaction_id: Some(payment_id.to_string()),
            provider: Provider::Flutterwave,
            settlement: Some(Settlement {
                amount: decimal_at(&event, "/data/amount"),
                currency: str_at(&event, "/data/currency").map(str::to_string),
            }),
        }))
    }
}
