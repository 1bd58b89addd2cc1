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

//! Payment reconciliation.
//!
//! Payment outcomes arrive either pushed by the provider (webhooks) or pulled
//! on demand ([`Engine::verify_payment`]). Both paths end in
//! [`Engine::update_payment_status`], which persists the payment and, on
//! success, confirms the owning booking through
//! [`Store::confirm_if_pending`](crate::store::Store::confirm_if_pending).
//! Because confirmation is a compare-and-swap on the booking row, replaying a
//! success (duplicate webhook, webhook racing a verify call) confirms the
//! booking and commits its slots at most once.
//!
//! A payment that reached `SUCCESS` keeps it; later failure or pending
//! reports for it are logged and ignored.

use crate::base::{BookingId, Currency, PaymentId, PaymentMethod, Provider};
use crate::engine::{Engine, PaymentRequest, ensure_owner_or_staff};
use crate::error::BookingError;
use crate::gateway::{InitializeRequest, WebhookEvent};
use crate::model::{BookingStatus, Payment, PaymentStatus, Principal};
use crate::notification::Notification;
use crate::validation::validate_payment;
use chrono::Utc;
use tracing::{debug, error, info, warn};

impl Engine {
    /// Starts a payment attempt for a pending booking.
    ///
    /// The amount is always the booking total. The attempt is stored before
    /// the provider is called; if the provider call fails the attempt is
    /// marked `FAILED` and the provider error is returned.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] - booking missing.
    /// - [`BookingError::Permission`] - booking belongs to someone else.
    /// - [`BookingError::InvalidTransition`] - booking is not pending.
    /// - [`BookingError::Rule`] - amount, currency, method or provider rejected.
    /// - [`BookingError::UnsupportedProvider`] - provider not configured.
    /// - [`BookingError::Provider`] - provider call failed.
    pub async fn initialize_payment(
        &self,
        principal: &Principal,
        booking_id: &BookingId,
        request: &PaymentRequest,
    ) -> Result<Payment, BookingError> {
        let booking = self
            .store()
            .booking(booking_id)
            .ok_or_else(|| BookingError::not_found("Booking", booking_id))?;
        ensure_owner_or_staff(principal, &booking)?;
        if booking.status != BookingStatus::Pending {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                action: "pay for",
            });
        }

        validate_payment(
            booking.total_price,
            &request.currency,
            &request.method,
            &request.provider,
        )?;
        let provider: Provider = request.provider.parse()?;
        let currency: Currency = request.currency.parse()?;
        let method: PaymentMethod = request.method.parse()?;
        let gateway = self.gateways.get(provider)?;

        let customer_email = request
            .customer_email
            .clone()
            .or_else(|| self.store().user(&booking.user_id).map(|user| user.email))
            .ok_or_else(|| BookingError::Validation {
                field: "customer_email",
                reason: "no email on file for the booking owner".to_string(),
            })?;
        let tour_title = self
            .store()
            .tour(&booking.tour_id)
            .map(|tour| tour.title)
            .unwrap_or_else(|| "Tour booking".to_string());

        let now = Utc::now();
        let payment = Payment {
            id: PaymentId::generate(),
            booking_id: booking.id.clone(),
            amount: booking.total_price,
            currency,
            method,
            provider,
            status: PaymentStatus::Pending,
            provider_transaction_id: None,
            payment_url: None,
            created_at: now,
            updated_at: now,
        };
        self.store().insert_payment(payment.clone());

        let initialize = InitializeRequest {
            booking_id: booking.id.clone(),
            customer_email,
            description: format!("{tour_title} ({} travelers)", booking.travelers_count),
        };
        match gateway.initialize(&payment, &initialize).await {
            Ok(response) => {
                let payment = self.store().update_payment(&payment.id, |payment| {
                    payment.provider_transaction_id = response.provider_transaction_id;
                    payment.payment_url = response.payment_url;
                    payment.updated_at = Utc::now();
                })?;
                info!(
                    payment = %payment.id,
                    booking = %booking.id,
                    provider = %provider,
                    amount = %payment.amount,
                    "payment initialized"
                );
                Ok(payment)
            }
            Err(e) => {
                warn!(payment = %payment.id, provider = %provider, error = %e, "payment initialization failed");
                self.update_payment_status(&payment.id, PaymentStatus::Failed, None)
                    .await?;
                Err(e)
            }
        }
    }

    /// Authenticates, decodes and applies a provider webhook.
    ///
    /// Returns `None` for events that carry no payment outcome.
    pub async fn handle_webhook(
        &self,
        provider: &str,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<Option<Payment>, BookingError> {
        let gateway = self.gateways.resolve(provider)?;
        let Some(event) = gateway.decode_webhook(signature, body).inspect_err(|e| {
            warn!(provider, error = %e, "webhook rejected");
        })?
        else {
            return Ok(None);
        };
        self.process_webhook(event).await.map(Some)
    }

    /// Applies a decoded webhook event to its payment.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] - no payment with the event's id.
    /// - [`BookingError::ProviderMismatch`] - the payment was made with a
    ///   different provider. The payment is left unchanged.
    ///
    /// A success whose reported settlement falls short of the payment, or is
    /// in another currency, is applied as a failure.
    pub async fn process_webhook(&self, event: WebhookEvent) -> Result<Payment, BookingError> {
        let payment = self
            .store()
            .payment(&event.payment_id)
            .ok_or_else(|| BookingError::not_found("Payment", &event.payment_id))?;
        if payment.provider != event.provider {
            warn!(
                payment = %payment.id,
                expected = %payment.provider,
                actual = %event.provider,
                "webhook provider mismatch"
            );
            return Err(BookingError::ProviderMismatch {
                expected: payment.provider,
                actual: event.provider,
            });
        }
        let status = match &event.settlement {
            Some(settlement) => settlement.reconcile(&payment, event.status),
            None => event.status,
        };
        debug!(payment = %payment.id, %status, "webhook accepted");
        self.update_payment_status(&payment.id, status, event.provider_transaction_id)
            .await
    }

    /// Asks the provider where a payment stands and applies any change.
    ///
    /// Only pending payments with a provider transaction id are queried;
    /// anything else is returned as stored. Provider errors propagate and
    /// leave the payment untouched.
    pub async fn verify_payment(
        &self,
        principal: &Principal,
        id: &PaymentId,
    ) -> Result<Payment, BookingError> {
        let payment = self
            .store()
            .payment(id)
            .ok_or_else(|| BookingError::not_found("Payment", id))?;
        let booking = self
            .store()
            .booking(&payment.booking_id)
            .ok_or_else(|| BookingError::not_found("Booking", &payment.booking_id))?;
        ensure_owner_or_staff(principal, &booking)?;

        if payment.status != PaymentStatus::Pending || payment.provider_transaction_id.is_none() {
            return Ok(payment);
        }
        let gateway = self.gateways.get(payment.provider)?;
        let status = gateway.verify(&payment).await?;
        if status == payment.status {
            return Ok(payment);
        }
        self.update_payment_status(id, status, None).await
    }

    /// Records a payment outcome and confirms the booking on success.
    ///
    /// Safe to call repeatedly and concurrently with the same outcome: the
    /// booking is confirmed at most once, and notifications are only raised
    /// when the payment status actually changed.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] - payment missing.
    /// - [`BookingError::IntegrityViolation`] - the payment succeeded but the
    ///   offering no longer has room; the payment keeps `SUCCESS` and the
    ///   booking stays pending for staff to resolve.
    pub async fn update_payment_status(
        &self,
        id: &PaymentId,
        status: PaymentStatus,
        provider_transaction_id: Option<String>,
    ) -> Result<Payment, BookingError> {
        let mut previous = status;
        // The payment row lock is released before the booking row is taken.
        let payment = self.store().update_payment(id, |payment| {
            previous = payment.status;
            if previous == PaymentStatus::Success && status != PaymentStatus::Success {
                return;
            }
            payment.status = status;
            if provider_transaction_id.is_some() {
                payment.provider_transaction_id = provider_transaction_id;
            }
            payment.updated_at = Utc::now();
        })?;
        if payment.status != status {
            warn!(payment = %id, reported = %status, "ignoring status report for a settled payment");
            return Ok(payment);
        }

        let changed = previous != status;
        if changed {
            info!(payment = %id, from = %previous, to = %status, "payment status updated");
            self.outbox.push(Notification::PaymentStatusChanged {
                payment_id: id.clone(),
                status,
            });
            if status == PaymentStatus::Failed {
                self.outbox.push(Notification::PaymentFailed {
                    payment_id: id.clone(),
                });
            }
        }

        let confirmation = if status == PaymentStatus::Success {
            self.store().confirm_if_pending(&payment.booking_id)
        } else {
            Ok(None)
        };
        let result = match confirmation {
            Ok(Some(booking)) => {
                self.outbox.push(Notification::BookingConfirmed {
                    booking_id: booking.id,
                });
                Ok(payment)
            }
            Ok(None) => {
                if status == PaymentStatus::Success && changed {
                    warn!(
                        payment = %id,
                        booking = %payment.booking_id,
                        "payment succeeded for a booking that is no longer pending"
                    );
                }
                Ok(payment)
            }
            Err(e) => {
                error!(
                    payment = %id,
                    booking = %payment.booking_id,
                    error = %e,
                    "payment succeeded but booking could not be confirmed"
                );
                Err(e)
            }
        };

        self.flush().await;
        result
    }
}
