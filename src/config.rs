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

//! Configuration management.
//!
//! Loads configuration from environment variables with sensible defaults. A
//! payment provider is configured only when its secret key is present.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub payments: PaymentsConfig,
    pub notifications: NotificationConfig,
    pub reminders: ReminderConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log filter (trace, debug, info, warn, error or a full `EnvFilter` directive)
    pub log_level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentsConfig {
    pub stripe: Option<StripeConfig>,
    pub paystack: Option<PaystackConfig>,
    pub flutterwave: Option<FlutterwaveConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    /// Signing secret of the webhook endpoint (`whsec_...`)
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Maximum age of a signed webhook, in seconds
    pub webhook_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: None,
            base_url: "https://api.stripe.com".to_string(),
            success_url: "http://localhost:8080/payments/success".to_string(),
            cancel_url: "http://localhost:8080/payments/cancel".to_string(),
            webhook_tolerance_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackConfig {
    /// Secret key; also signs webhooks
    pub secret_key: String,
    pub base_url: String,
    pub callback_url: Option<String>,
}

impl PaystackConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            base_url: "https://api.paystack.co".to_string(),
            callback_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlutterwaveConfig {
    pub secret_key: String,
    /// Value Flutterwave echoes in the `verif-hash` header
    pub webhook_hash: Option<String>,
    pub base_url: String,
    pub redirect_url: Option<String>,
}

impl FlutterwaveConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_hash: None,
            base_url: "https://api.flutterwave.com".to_string(),
            redirect_url: None,
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Recipient of payment failure alerts; falls back to every admin user
    pub admin_email: Option<String>,
    /// Sender address stamped on outgoing mail
    pub from_address: String,
    /// Deliver on a spawned task instead of awaiting delivery inline
    pub background: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            admin_email: None,
            from_address: "bookings@localhost".to_string(),
            background: true,
        }
    }
}

/// Upper bound for `REMINDER_LEAD_HOURS`.
pub const MAX_REMINDER_LEAD_HOURS: i64 = 24 * 366;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// How far ahead of the tour start reminders go out, in hours
    pub lead_hours: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self { lead_hours: 48 }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let stripe = lookup("STRIPE_SECRET_KEY").map(|secret_key| {
            let defaults = StripeConfig::new(secret_key);
            StripeConfig {
                webhook_secret: lookup("STRIPE_WEBHOOK_SECRET"),
                base_url: lookup("STRIPE_BASE_URL").unwrap_or(defaults.base_url.clone()),
                success_url: lookup("STRIPE_SUCCESS_URL")
                    .unwrap_or(defaults.success_url.clone()),
                cancel_url: lookup("STRIPE_CANCEL_URL").unwrap_or(defaults.cancel_url.clone()),
                webhook_tolerance_secs: parse_var(&lookup, "STRIPE_WEBHOOK_TOLERANCE_SECS")
                    .unwrap_or(defaults.webhook_tolerance_secs),
                ..defaults
            }
        });
        let paystack = lookup("PAYSTACK_SECRET_KEY").map(|secret_key| {
            let defaults = PaystackConfig::new(secret_key);
            PaystackConfig {
                base_url: lookup("PAYSTACK_BASE_URL").unwrap_or(defaults.base_url.clone()),
                callback_url: lookup("PAYSTACK_CALLBACK_URL"),
                ..defaults
            }
        });
        let flutterwave = lookup("FLUTTERWAVE_SECRET_KEY").map(|secret_key| {
            let defaults = FlutterwaveConfig::new(secret_key);
            FlutterwaveConfig {
                webhook_hash: lookup("FLUTTERWAVE_WEBHOOK_HASH"),
                base_url: lookup("FLUTTERWAVE_BASE_URL").unwrap_or(defaults.base_url.clone()),
                redirect_url: lookup("FLUTTERWAVE_REDIRECT_URL"),
                ..defaults
            }
        });

        let notification_defaults = NotificationConfig::default();
        Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_var(&lookup, "PORT").unwrap_or(8080),
                log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            },
            payments: PaymentsConfig {
                stripe,
                paystack,
                flutterwave,
            },
            notifications: NotificationConfig {
                admin_email: lookup("ADMIN_EMAIL"),
                from_address: lookup("MAIL_FROM").unwrap_or(notification_defaults.from_address),
                background: parse_var(&lookup, "NOTIFY_IN_BACKGROUND")
                    .unwrap_or(notification_defaults.background),
            },
            reminders: ReminderConfig {
                lead_hours: parse_var(&lookup, "REMINDER_LEAD_HOURS")
                    .filter(|hours| (1..=MAX_REMINDER_LEAD_HOURS).contains(hours))
                    .unwrap_or(ReminderConfig::default().lead_hours),
            },
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
