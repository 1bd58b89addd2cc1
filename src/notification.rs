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

//! Best-effort email notifications.
//!
//! State changes stage a [`Notification`] in the [`Outbox`]; once the change
//! has committed the engine drains the outbox into [`Notifier::dispatch`].
//! Composition and delivery failures are logged and dropped. They never reach
//! the caller and never undo the state change that raised them.

use crate::base::{BookingId, PaymentId, Role};
use crate::config::NotificationConfig;
use crate::model::{Booking, PaymentStatus};
use crate::store::Store;
use async_trait::async_trait;
use crossbeam::queue::SegQueue;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Something a user or admin should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    BookingConfirmed {
        booking_id: BookingId,
    },
    PaymentStatusChanged {
        payment_id: PaymentId,
        status: PaymentStatus,
    },
    /// Cancellation performed by staff on the customer's behalf.
    BookingCancelled {
        booking_id: BookingId,
        reason: Option<String>,
    },
    /// Admin alert.
    PaymentFailed {
        payment_id: PaymentId,
    },
    TourReminder {
        booking_id: BookingId,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BookingConfirmed { .. } => "booking_confirmed",
            Self::PaymentStatusChanged { .. } => "payment_status_changed",
            Self::BookingCancelled { .. } => "booking_cancelled",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::TourReminder { .. } => "tour_reminder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("{entity} {id} no longer exists")]
    Missing { entity: &'static str, id: String },

    #[error("no recipient for {0}")]
    NoRecipient(&'static str),

    #[error("transport failed: {0}")]
    Transport(String),
}

impl NotificationError {
    fn missing(entity: &'static str, id: impl ToString) -> Self {
        Self::Missing {
            entity,
            id: id.to_string(),
        }
    }
}

/// Outbound mail transport.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError>;
}

/// Transport that writes messages to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            "email (log transport)\n{}",
            message.text
        );
        Ok(())
    }
}

/// Lock-free staging area for notifications raised during a state change.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: SegQueue<Notification>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, notification: Notification) {
        self.queue.push(notification);
    }

    /// Takes everything staged so far, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        std::iter::from_fn(|| self.queue.pop()).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Renders notifications and hands them to the transport.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<Store>,
    transport: Arc<dyn EmailTransport>,
    config: NotificationConfig,
}

impl Notifier {
    pub fn new(
        store: Arc<Store>,
        transport: Arc<dyn EmailTransport>,
        config: NotificationConfig,
    ) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// Delivers `notifications`, on a spawned task when configured for
    /// background delivery. Must be called from within a tokio runtime.
    pub async fn dispatch(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        if self.config.background {
            let notifier = self.clone();
            tokio::spawn(async move {
                for notification in notifications {
                    notifier.deliver(&notification).await;
                }
            });
        } else {
            for notification in notifications {
                self.deliver(&notification).await;
            }
        }
    }

    /// Composes and sends one notification. Errors are logged, not returned.
    pub async fn deliver(&self, notification: &Notification) {
        let messages = match self.compose(notification) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(kind = notification.kind(), error = %e, "notification dropped");
                return;
            }
        };
        for message in &messages {
            match self.transport.send(message).await {
                Ok(()) => debug!(kind = notification.kind(), to = %message.to, "notification sent"),
                Err(e) => warn!(
                    kind = notification.kind(),
                    to = %message.to,
                    error = %e,
                    "notification delivery failed"
                ),
            }
        }
    }

    /// Renders the messages for `notification` from current store state.
    pub fn compose(
        &self,
        notification: &Notification,
    ) -> Result<Vec<EmailMessage>, NotificationError> {
        match notification {
            Notification::BookingConfirmed { booking_id } => {
                let context = self.booking_context(booking_id)?;
                let body = format!(
                    "Your booking for {} on {} is confirmed for {} traveler(s). Total paid: {}.",
                    context.tour_title,
                    context.start_date,
                    context.booking.travelers_count,
                    context.booking.total_price
                );
                Ok(vec![self.message(
                    context.email,
                    format!("Booking confirmed: {}", context.tour_title),
                    &body,
                )])
            }
            Notification::PaymentStatusChanged { payment_id, status } => {
                let payment = self
                    .store
                    .payment(payment_id)
                    .ok_or_else(|| NotificationError::missing("Payment", payment_id))?;
                let context = self.booking_context(&payment.booking_id)?;
                let body = format!(
                    "Your payment of {} {} for {} is now {}.",
                    payment.amount, payment.currency, context.tour_title, status
                );
                Ok(vec![self.message(
                    context.email,
                    format!("Payment {}", status.to_string().to_lowercase()),
                    &body,
                )])
            }
            Notification::BookingCancelled { booking_id, reason } => {
                let context = self.booking_context(booking_id)?;
                let mut body = format!(
                    "Your booking for {} on {} has been cancelled.",
                    context.tour_title, context.start_date
                );
                if let Some(reason) = reason {
                    body.push_str(&format!(" Reason: {reason}"));
                }
                Ok(vec![self.message(
                    context.email,
                    format!("Booking cancelled: {}", context.tour_title),
                    &body,
                )])
            }
            Notification::PaymentFailed { payment_id } => {
                let payment = self
                    .store
                    .payment(payment_id)
                    .ok_or_else(|| NotificationError::missing("Payment", payment_id))?;
                let body = format!(
                    "Payment {} of {} {} via {} for booking {} failed.",
                    payment.id, payment.amount, payment.currency, payment.provider, payment.booking_id
                );
                let subject = format!("Payment failed: {}", payment.id);
                let recipients = self.admin_recipients();
                if recipients.is_empty() {
                    return Err(NotificationError::NoRecipient("payment failure alert"));
                }
                Ok(recipients
                    .into_iter()
                    .map(|to| self.message(to, subject.clone(), &body))
                    .collect())
            }
            Notification::TourReminder { booking_id } => {
                let context = self.booking_context(booking_id)?;
                let body = format!(
                    "Reminder: {} starts on {}. We look forward to seeing your group of {}.",
                    context.tour_title, context.start_date, context.booking.travelers_count
                );
                Ok(vec![self.message(
                    context.email,
                    format!("Upcoming tour: {}", context.tour_title),
                    &body,
                )])
            }
        }
    }

    fn admin_recipients(&self) -> Vec<String> {
        match &self.config.admin_email {
            Some(email) => vec![email.clone()],
            None => self
                .store
                .users_with_role(Role::Admin)
                .into_iter()
                .map(|user| user.email)
                .collect(),
        }
    }

    fn booking_context(&self, booking_id: &BookingId) -> Result<BookingContext, NotificationError> {
        let booking = self
            .store
            .booking(booking_id)
            .ok_or_else(|| NotificationError::missing("Booking", booking_id))?;
        let user = self
            .store
            .user(&booking.user_id)
            .ok_or_else(|| NotificationError::missing("User", &booking.user_id))?;
        let tour = self
            .store
            .tour(&booking.tour_id)
            .ok_or_else(|| NotificationError::missing("Tour", &booking.tour_id))?;
        let start_date = self
            .store
            .availability(&booking.availability_id)
            .map(|availability| availability.start_date.to_string())
            .unwrap_or_else(|| "the scheduled date".to_string());
        Ok(BookingContext {
            email: user.email,
            tour_title: tour.title,
            start_date,
            booking,
        })
    }

    fn message(&self, to: String, subject: String, body: &str) -> EmailMessage {
        EmailMessage {
            from: self.config.from_address.clone(),
            to,
            html: format!("<p>{}</p>", escape_html(body)),
            text: body.to_string(),
            subject,
        }
    }
}

struct BookingContext {
    email: String,
    tour_title: String,
    start_date: String,
    booking: Booking,
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{
        AvailabilityId, Currency, DestinationId, PaymentMethod, Provider, TourId, UserId,
    };
    use crate::model::{Destination, Payment, Tour, TourAvailability, TourStatus, User};
    use chrono::{NaiveDate, Utc};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailTransport for Recorder {
        async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    struct Refusing;

    #[async_trait]
    impl EmailTransport for Refusing {
        async fn send(&self, _: &EmailMessage) -> Result<(), NotificationError> {
            Err(NotificationError::Transport("smtp down".into()))
        }
    }

    fn inline() -> NotificationConfig {
        NotificationConfig {
            background: false,
            ..NotificationConfig::default()
        }
    }

    fn booked_store() -> (Arc<Store>, BookingId) {
        let store = Arc::new(Store::new());
        let user = UserId::generate();
        store.insert_user(User {
            id: user.clone(),
            email: "amina@example.com".into(),
            name: "Amina".into(),
            role: Role::Customer,
        });
        let destination = DestinationId::generate();
        store.insert_destination(Destination {
            id: destination.clone(),
            name: "Serengeti".into(),
            country: "TZ".into(),
        });
        let tour = TourId::generate();
        store
            .insert_tour(Tour {
                id: tour.clone(),
                destination_id: destination,
                title: "Migration <Safari>".into(),
                price_per_person: dec!(800),
                max_group_size: 8,
                status: TourStatus::Active,
            })
            .unwrap();
        let availability = AvailabilityId::generate();
        store
            .insert_availability(TourAvailability {
                id: availability.clone(),
                tour_id: tour.clone(),
                start_date: NaiveDate::from_ymd_opt(2026, 7, 14).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 7, 20).unwrap(),
                available_slots: 8,
            })
            .unwrap();
        let booking = store
            .create_booking(&user, &tour, &availability, 2)
            .unwrap();
        (store, booking.id)
    }

    #[test]
    fn outbox_drains_in_order() {
        let outbox = Outbox::new();
        let first = BookingId::generate();
        let second = BookingId::generate();
        outbox.push(Notification::BookingConfirmed {
            booking_id: first.clone(),
        });
        outbox.push(Notification::TourReminder {
            booking_id: second.clone(),
        });
        assert_eq!(outbox.len(), 2);

        let drained = outbox.drain();
        assert_eq!(
            drained,
            vec![
                Notification::BookingConfirmed { booking_id: first },
                Notification::TourReminder { booking_id: second },
            ]
        );
        assert!(outbox.is_empty());
    }

    #[test]
    fn confirmation_goes_to_booking_owner_and_escapes_html() {
        let (store, booking_id) = booked_store();
        let notifier = Notifier::new(store, Arc::new(LogTransport), inline());
        let messages = notifier
            .compose(&Notification::BookingConfirmed { booking_id })
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to, "amina@example.com");
        assert_eq!(messages[0].subject, "Booking confirmed: Migration <Safari>");
        assert!(messages[0].html.contains("Migration &lt;Safari&gt;"));
        assert!(messages[0].text.contains("2026-07-14"));
    }

    #[test]
    fn payment_failure_alerts_every_admin_without_configured_address() {
        let (store, booking_id) = booked_store();
        for email in ["ops@example.com", "finance@example.com"] {
            store.insert_user(User {
                id: UserId::generate(),
                email: email.into(),
                name: "Admin".into(),
                role: Role::Admin,
            });
        }
        let payment_id = PaymentId::generate();
        let now = Utc::now();
        store.insert_payment(Payment {
            id: payment_id.clone(),
            booking_id,
            amount: dec!(1600),
            currency: Currency::Usd,
            method: PaymentMethod::Card,
            provider: Provider::Stripe,
            status: PaymentStatus::Failed,
            provider_transaction_id: None,
            payment_url: None,
            created_at: now,
            updated_at: now,
        });
        let notifier = Notifier::new(store, Arc::new(LogTransport), inline());

        let mut recipients: Vec<String> = notifier
            .compose(&Notification::PaymentFailed { payment_id })
            .unwrap()
            .into_iter()
            .map(|message| message.to)
            .collect();
        recipients.sort();
        assert_eq!(recipients, vec!["finance@example.com", "ops@example.com"]);
    }

    #[test]
    fn missing_booking_is_a_compose_error() {
        let notifier = Notifier::new(Arc::new(Store::new()), Arc::new(LogTransport), inline());
        assert!(matches!(
            notifier.compose(&Notification::TourReminder {
                booking_id: BookingId::generate()
            }),
            Err(NotificationError::Missing {
                entity: "Booking",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn inline_dispatch_delivers_before_returning() {
        let (store, booking_id) = booked_store();
        let recorder = Arc::new(Recorder::default());
        let notifier = Notifier::new(store, recorder.clone(), inline());

        notifier
            .dispatch(vec![
                Notification::BookingCancelled {
                    booking_id: booking_id.clone(),
                    reason: Some("weather".into()),
                },
                // Dropped: unknown booking. Must not stop the rest.
                Notification::TourReminder {
                    booking_id: BookingId::generate(),
                },
                Notification::TourReminder { booking_id },
            ])
            .await;

        let sent = recorder.sent.lock();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].text.ends_with("Reason: weather"));
        assert!(sent[1].subject.starts_with("Upcoming tour"));
    }

    #[tokio::test]
    async fn transport_failure_is_swallowed() {
        let (store, booking_id) = booked_store();
        let notifier = Notifier::new(store, Arc::new(Refusing), inline());
        notifier
            .dispatch(vec![Notification::BookingConfirmed { booking_id }])
            .await;
    }
}
