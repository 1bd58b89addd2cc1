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

//! Provider adapter tests against mocked provider APIs.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tour_booking_rs::config::{FlutterwaveConfig, PaystackConfig, StripeConfig};
use tour_booking_rs::gateway::{
    FlutterwaveGateway, InitializeRequest, PaystackGateway, StripeGateway,
};
use tour_booking_rs::{
    BookingError, BookingId, Currency, Payment, PaymentGateway, PaymentId, PaymentMethod,
    PaymentStatus, Provider,
};
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn payment(provider: Provider, method: PaymentMethod, amount: Decimal, currency: Currency) -> Payment {
    let now = Utc::now();
    Payment {
        id: PaymentId::generate(),
        booking_id: BookingId::generate(),
        amount,
        currency,
        method,
        provider,
        status: PaymentStatus::Pending,
        provider_transaction_id: None,
        payment_url: None,
        created_at: now,
        updated_at: now,
    }
}

fn init_request(payment: &Payment) -> InitializeRequest {
    InitializeRequest {
        booking_id: payment.booking_id.clone(),
        customer_email: "wanjiru@example.com".into(),
        description: "Mount Kenya Day Hike (3 travelers)".into(),
    }
}

// === Paystack ===

#[tokio::test]
async fn paystack_initialize_sends_minor_units() {
    let mock = MockServer::start().await;
    let payment = payment(Provider::Paystack, PaymentMethod::MobileMoney, dec!(1500.50), Currency::Kes);

    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .and(header("authorization", "Bearer sk_test_ps"))
        .and(body_partial_json(json!({
            "email": "wanjiru@example.com",
            "amount": 150050,
            "currency": "KES",
            "reference": payment.id,
            "channels": ["mobile_money"],
            "metadata": {"payment_id": payment.id}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/7xq2",
                "access_code": "7xq2",
                "reference": payment.id
            }
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let gateway = PaystackGateway::new(PaystackConfig {
        base_url: mock.uri(),
        ..PaystackConfig::new("sk_test_ps")
    });
    let response = gateway
        .initialize(&payment, &init_request(&payment))
        .await
        .unwrap();

    assert_eq!(
        response.payment_url.as_deref(),
        Some("https://checkout.paystack.com/7xq2")
    );
    assert_eq!(
        response.provider_transaction_id.as_deref(),
        Some(payment.id.as_str())
    );
}

#[tokio::test]
async fn paystack_verify_maps_transaction_status() {
    let mock = MockServer::start().await;
    let mut payment = payment(Provider::Paystack, PaymentMethod::Card, dec!(20), Currency::Ngn);
    payment.provider_transaction_id = Some("ref_abandoned".into());

    Mock::given(method("GET"))
        .and(path("/transaction/verify/ref_abandoned"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {"status": "abandoned", "reference": "ref_abandoned"}
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/ref_paid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {"status": "success", "reference": "ref_paid"}
        })))
        .mount(&mock)
        .await;

    let gateway = PaystackGateway::new(PaystackConfig {
        base_url: mock.uri(),
        ..PaystackConfig::new("sk_test_ps")
    });
    assert_eq!(gateway.verify(&payment).await, Ok(PaymentStatus::Failed));

    payment.provider_transaction_id = Some("ref_paid".into());
    assert_eq!(gateway.verify(&payment).await, Ok(PaymentStatus::Success));
}

#[tokio::test]
async fn paystack_rejection_is_a_provider_error() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": false,
            "message": "Invalid key"
        })))
        .mount(&mock)
        .await;

    let gateway = PaystackGateway::new(PaystackConfig {
        base_url: mock.uri(),
        ..PaystackConfig::new("sk_wrong")
    });
    let payment = payment(Provider::Paystack, PaymentMethod::Card, dec!(20), Currency::Ngn);
    match gateway.initialize(&payment, &init_request(&payment)).await {
        Err(BookingError::Provider(message)) => assert!(message.contains("Invalid key")),
        other => panic!("expected provider error, got {other:?}"),
    }
}

// === Stripe ===

#[tokio::test]
async fn stripe_initialize_creates_checkout_session() {
    let mock = MockServer::start().await;
    let payment = payment(Provider::Stripe, PaymentMethod::Card, dec!(1500), Currency::Usd);

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(header("authorization", "Bearer sk_test_stripe"))
        .and(body_string_contains("mode=payment"))
        .and(body_string_contains(format!(
            "client_reference_id={}",
            payment.id
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_a1b2",
            "object": "checkout.session",
            "url": "https://checkout.stripe.com/c/pay/cs_test_a1b2",
            "status": "open",
            "payment_status": "unpaid"
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let gateway = StripeGateway::new(StripeConfig {
        base_url: mock.uri(),
        ..StripeConfig::new("sk_test_stripe")
    });
    let response = gateway
        .initialize(&payment, &init_request(&payment))
        .await
        .unwrap();

    assert_eq!(response.provider_transaction_id.as_deref(), Some("cs_test_a1b2"));
    assert_eq!(
        response.payment_url.as_deref(),
        Some("https://checkout.stripe.com/c/pay/cs_test_a1b2")
    );
}

#[tokio::test]
async fn stripe_verify_reads_session_state() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_paid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_paid", "url": null, "status": "complete", "payment_status": "paid"
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_expired"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_expired", "url": null, "status": "expired", "payment_status": "unpaid"
        })))
        .mount(&mock)
        .await;

    let gateway = StripeGateway::new(StripeConfig {
        base_url: mock.uri(),
        ..StripeConfig::new("sk_test_stripe")
    });
    let mut payment = payment(Provider::Stripe, PaymentMethod::Card, dec!(80), Currency::Eur);

    payment.provider_transaction_id = Some("cs_paid".into());
    assert_eq!(gateway.verify(&payment).await, Ok(PaymentStatus::Success));

    payment.provider_transaction_id = Some("cs_expired".into());
    assert_eq!(gateway.verify(&payment).await, Ok(PaymentStatus::Failed));
}

#[tokio::test]
async fn stripe_server_error_is_a_provider_error() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_any"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&mock)
        .await;

    let gateway = StripeGateway::new(StripeConfig {
        base_url: mock.uri(),
        ..StripeConfig::new("sk_test_stripe")
    });
    let mut payment = payment(Provider::Stripe, PaymentMethod::Card, dec!(80), Currency::Eur);
    payment.provider_transaction_id = Some("cs_any".into());

    match gateway.verify(&payment).await {
        Err(BookingError::Provider(message)) => {
            assert!(message.contains("503"));
            assert!(message.contains("upstream unavailable"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

// === Flutterwave ===

#[tokio::test]
async fn flutterwave_initialize_uses_payment_id_as_reference() {
    let mock = MockServer::start().await;
    let payment = payment(Provider::Flutterwave, PaymentMethod::Bank, dec!(250.75), Currency::Ghs);

    Mock::given(method("POST"))
        .and(path("/v3/payments"))
        .and(header("authorization", "Bearer FLWSECK_TEST"))
        .and(body_partial_json(json!({
            "tx_ref": payment.id,
            "amount": "250.75",
            "currency": "GHS",
            "payment_options": "banktransfer"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Hosted Link",
            "data": {"link": "https://checkout.flutterwave.com/v3/hosted/pay/f1e2"}
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let gateway = FlutterwaveGateway::new(FlutterwaveConfig {
        base_url: mock.uri(),
        ..FlutterwaveConfig::new("FLWSECK_TEST")
    });
    let response = gateway
        .initialize(&payment, &init_request(&payment))
        .await
        .unwrap();

    assert_eq!(
        response.payment_url.as_deref(),
        Some("https://checkout.flutterwave.com/v3/hosted/pay/f1e2")
    );
    assert_eq!(
        response.provider_transaction_id.as_deref(),
        Some(payment.id.as_str())
    );
}

#[tokio::test]
async fn flutterwave_verify_checks_settled_amount() {
    let mock = MockServer::start().await;
    let mut full = payment(Provider::Flutterwave, PaymentMethod::Card, dec!(1500), Currency::Ngn);
    full.provider_transaction_id = Some("ref_full".into());
    let mut short = payment(Provider::Flutterwave, PaymentMethod::Card, dec!(1500), Currency::Ngn);
    short.provider_transaction_id = Some("ref_short".into());

    Mock::given(method("GET"))
        .and(path("/v3/transactions/verify_by_reference"))
        .and(query_param("tx_ref", "ref_full"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Transaction fetched successfully",
            "data": {"status": "successful", "amount": 1500, "currency": "NGN"}
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/transactions/verify_by_reference"))
        .and(query_param("tx_ref", "ref_short"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Transaction fetched successfully",
            "data": {"status": "successful", "amount": 1000, "currency": "NGN"}
        })))
        .mount(&mock)
        .await;

    let gateway = FlutterwaveGateway::new(FlutterwaveConfig {
        base_url: mock.uri(),
        ..FlutterwaveConfig::new("FLWSECK_TEST")
    });
    assert_eq!(gateway.verify(&full).await, Ok(PaymentStatus::Success));
    assert_eq!(gateway.verify(&short).await, Ok(PaymentStatus::Failed));
}
