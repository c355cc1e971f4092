//! End-to-end scenario tests driving the public [`BillingService`] facade
//! the way an embedding application would, rather than individual engine
//! functions.

use std::collections::HashMap;

use rust_decimal_macros::dec;
use time::macros::datetime;

use usage_billing::config::EngineConfig;
use usage_billing::engine::events::NewUsageEvent;
use usage_billing::engine::plans::NewPriceComponent;
use usage_billing::model::{CreditType, InvoiceStatus, PricingDetails, Tier, ThresholdFee, VolumeTier};
use usage_billing::BillingService;

fn service() -> BillingService {
    BillingService::new(EngineConfig::default())
}

#[tokio::test]
async fn volume_pricing_bills_entire_quantity_at_the_matched_tier() {
    let service = service();
    let now = datetime!(2024-01-15 00:00:00 UTC);

    let customer = service
        .create_customer("a@example.com".into(), "A".into(), now)
        .await
        .unwrap();
    let plan = service
        .create_plan(
            "Plan".into(),
            "".into(),
            "monthly",
            vec![NewPriceComponent {
                metric_name: "gb_transferred".into(),
                metric_id: None,
                display_name: "Data Transfer".into(),
                pricing_details: PricingDetails::Volume {
                    tiers: vec![
                        VolumeTier {
                            start: dec!(0),
                            price: dec!(0.10),
                        },
                        VolumeTier {
                            start: dec!(100),
                            price: dec!(0.08),
                        },
                    ],
                },
            }],
        )
        .await
        .unwrap();
    let subscription = service
        .create_subscription(now, customer.id, plan.id, Some(datetime!(2024-01-01 00:00:00 UTC)), None)
        .await
        .unwrap();

    service
        .track_usage(
            NewUsageEvent {
                customer_id: customer.id,
                metric_name: "gb_transferred".into(),
                metric_id: None,
                quantity: dec!(150),
                event_time: Some(now),
                properties: HashMap::new(),
            },
            now,
        )
        .await
        .unwrap();

    let invoice = service
        .generate_invoice(
            now,
            customer.id,
            datetime!(2024-01-01 00:00:00 UTC),
            datetime!(2024-02-01 00:00:00 UTC),
            Some(subscription.id),
        )
        .await
        .unwrap();

    let item = invoice
        .items
        .iter()
        .find(|i| i.metric_name.as_deref() == Some("gb_transferred"))
        .unwrap();
    assert_eq!(item.amount, dec!(12.00));
    assert_eq!(item.unit_price, dec!(0.08));
}

#[tokio::test]
async fn package_pricing_rounds_up_to_the_next_package() {
    let service = service();
    let now = datetime!(2024-01-15 00:00:00 UTC);
    let customer = service
        .create_customer("a@example.com".into(), "A".into(), now)
        .await
        .unwrap();
    let plan = service
        .create_plan(
            "Plan".into(),
            "".into(),
            "monthly",
            vec![NewPriceComponent {
                metric_name: "seats".into(),
                metric_id: None,
                display_name: "Seats".into(),
                pricing_details: PricingDetails::Package {
                    package_size: dec!(5),
                    package_price: dec!(10),
                },
            }],
        )
        .await
        .unwrap();
    let subscription = service
        .create_subscription(now, customer.id, plan.id, Some(datetime!(2024-01-01 00:00:00 UTC)), None)
        .await
        .unwrap();

    service
        .track_usage(
            NewUsageEvent {
                customer_id: customer.id,
                metric_name: "seats".into(),
                metric_id: None,
                quantity: dec!(6),
                event_time: Some(now),
                properties: HashMap::new(),
            },
            now,
        )
        .await
        .unwrap();

    let invoice = service
        .generate_invoice(
            now,
            customer.id,
            datetime!(2024-01-01 00:00:00 UTC),
            datetime!(2024-02-01 00:00:00 UTC),
            Some(subscription.id),
        )
        .await
        .unwrap();

    let item = invoice
        .items
        .iter()
        .find(|i| i.metric_name.as_deref() == Some("seats"))
        .unwrap();
    assert_eq!(item.amount, dec!(20));
}

#[tokio::test]
async fn threshold_pricing_sums_every_crossed_threshold() {
    let service = service();
    let now = datetime!(2024-01-15 00:00:00 UTC);
    let customer = service
        .create_customer("a@example.com".into(), "A".into(), now)
        .await
        .unwrap();
    let plan = service
        .create_plan(
            "Plan".into(),
            "".into(),
            "monthly",
            vec![NewPriceComponent {
                metric_name: "storage_gb".into(),
                metric_id: None,
                display_name: "Storage".into(),
                pricing_details: PricingDetails::Threshold {
                    thresholds: vec![
                        ThresholdFee {
                            threshold: dec!(100),
                            price: dec!(10),
                        },
                        ThresholdFee {
                            threshold: dec!(500),
                            price: dec!(10),
                        },
                    ],
                },
            }],
        )
        .await
        .unwrap();
    let subscription = service
        .create_subscription(now, customer.id, plan.id, Some(datetime!(2024-01-01 00:00:00 UTC)), None)
        .await
        .unwrap();

    service
        .track_usage(
            NewUsageEvent {
                customer_id: customer.id,
                metric_name: "storage_gb".into(),
                metric_id: None,
                quantity: dec!(600),
                event_time: Some(now),
                properties: HashMap::new(),
            },
            now,
        )
        .await
        .unwrap();

    let invoice = service
        .generate_invoice(
            now,
            customer.id,
            datetime!(2024-01-01 00:00:00 UTC),
            datetime!(2024-02-01 00:00:00 UTC),
            Some(subscription.id),
        )
        .await
        .unwrap();

    let item = invoice
        .items
        .iter()
        .find(|i| i.metric_name.as_deref() == Some("storage_gb"))
        .unwrap();
    assert_eq!(item.amount, dec!(20));
}

#[tokio::test]
async fn credits_apply_in_expiration_order_before_nulls() {
    let service = service();
    let now = datetime!(2024-01-01 00:00:00 UTC);
    let customer = service
        .create_customer("a@example.com".into(), "A".into(), now)
        .await
        .unwrap();
    let plan = service
        .create_plan(
            "Plan".into(),
            "".into(),
            "monthly",
            vec![NewPriceComponent {
                metric_name: "api_calls".into(),
                metric_id: None,
                display_name: "API Calls".into(),
                pricing_details: PricingDetails::Flat { amount: dec!(60) },
            }],
        )
        .await
        .unwrap();
    let subscription = service
        .create_subscription(now, customer.id, plan.id, Some(now), None)
        .await
        .unwrap();

    service
        .add_credits(
            customer.id,
            dec!(50),
            CreditType::Prepaid,
            "no expiry".into(),
            None,
            None,
            None,
            now,
        )
        .await
        .unwrap();
    service
        .add_credits(
            customer.id,
            dec!(30),
            CreditType::Prepaid,
            "expires soon".into(),
            Some(datetime!(2024-02-01 00:00:00 UTC)),
            None,
            None,
            now,
        )
        .await
        .unwrap();

    let invoice = service
        .generate_invoice(now, customer.id, now, datetime!(2024-02-01 00:00:00 UTC), Some(subscription.id))
        .await
        .unwrap();

    assert_eq!(invoice.amount, dec!(0));
    let balances = service.list_credit_balances_for_customer(customer.id).await.unwrap();
    let with_expiry = balances.iter().find(|b| b.description == "expires soon").unwrap();
    let no_expiry = balances.iter().find(|b| b.description == "no expiry").unwrap();
    assert_eq!(with_expiry.remaining_amount, dec!(0));
    assert_eq!(no_expiry.remaining_amount, dec!(20));
}

#[tokio::test]
async fn range_generation_without_a_subscription_never_bills_fixed_fees() {
    let service = service();
    let now = datetime!(2024-01-15 00:00:00 UTC);
    let customer = service
        .create_customer("a@example.com".into(), "A".into(), now)
        .await
        .unwrap();
    let plan = service
        .create_plan(
            "Plan".into(),
            "".into(),
            "monthly",
            vec![
                NewPriceComponent {
                    metric_name: "seats".into(),
                    metric_id: None,
                    display_name: "Seats".into(),
                    pricing_details: PricingDetails::Flat { amount: dec!(99) },
                },
                NewPriceComponent {
                    metric_name: "api_calls".into(),
                    metric_id: None,
                    display_name: "API Calls".into(),
                    pricing_details: PricingDetails::Tiered {
                        tiers: vec![Tier {
                            start: dec!(0),
                            end: None,
                            price: dec!(0.01),
                        }],
                    },
                },
            ],
        )
        .await
        .unwrap();
    service
        .create_subscription(now, customer.id, plan.id, Some(datetime!(2024-01-01 00:00:00 UTC)), None)
        .await
        .unwrap();

    service
        .track_usage(
            NewUsageEvent {
                customer_id: customer.id,
                metric_name: "api_calls".into(),
                metric_id: None,
                quantity: dec!(100),
                event_time: Some(now),
                properties: HashMap::new(),
            },
            now,
        )
        .await
        .unwrap();

    let invoice = service
        .generate_invoice(
            now,
            customer.id,
            datetime!(2024-01-01 00:00:00 UTC),
            datetime!(2024-02-01 00:00:00 UTC),
            None,
        )
        .await
        .unwrap();

    assert!(invoice.items.iter().all(|i| i.metric_name.as_deref() != Some("seats")));
    assert_eq!(invoice.amount, dec!(1.00));
}

#[tokio::test]
async fn finalized_invoice_rejects_further_item_mutation() {
    let service = service();
    let now = datetime!(2024-01-15 00:00:00 UTC);
    let customer = service
        .create_customer("a@example.com".into(), "A".into(), now)
        .await
        .unwrap();
    let plan = service
        .create_plan(
            "Plan".into(),
            "".into(),
            "monthly",
            vec![NewPriceComponent {
                metric_name: "seats".into(),
                metric_id: None,
                display_name: "Seats".into(),
                pricing_details: PricingDetails::Flat { amount: dec!(10) },
            }],
        )
        .await
        .unwrap();
    let subscription = service
        .create_subscription(now, customer.id, plan.id, Some(datetime!(2024-01-01 00:00:00 UTC)), None)
        .await
        .unwrap();

    let invoice = service
        .generate_invoice(
            now,
            customer.id,
            datetime!(2024-01-01 00:00:00 UTC),
            datetime!(2024-02-01 00:00:00 UTC),
            Some(subscription.id),
        )
        .await
        .unwrap();

    let invoice = service.finalize_invoice(invoice.id).await.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Pending);

    let err = service
        .add_invoice_item(
            invoice.id,
            usage_billing::model::InvoiceItem {
                id: usage_billing::ids::InvoiceItemId(0),
                invoice_id: invoice.id,
                description: "late fee".into(),
                metric_name: None,
                quantity: None,
                unit_price: dec!(5),
                amount: dec!(5),
                subscription_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, usage_billing::BillingError::StateViolation { .. }));
}

#[tokio::test]
async fn batch_usage_tracking_reports_per_event_failures() {
    let service = service();
    let now = datetime!(2024-01-15 00:00:00 UTC);
    let customer = service
        .create_customer("a@example.com".into(), "A".into(), now)
        .await
        .unwrap();

    let results = service
        .batch_track_usage(
            vec![
                NewUsageEvent {
                    customer_id: customer.id,
                    metric_name: "api_calls".into(),
                    metric_id: None,
                    quantity: dec!(10),
                    event_time: Some(now),
                    properties: HashMap::new(),
                },
                NewUsageEvent {
                    customer_id: usage_billing::ids::CustomerId(9999),
                    metric_name: "api_calls".into(),
                    metric_id: None,
                    quantity: dec!(10),
                    event_time: Some(now),
                    properties: HashMap::new(),
                },
                NewUsageEvent {
                    customer_id: customer.id,
                    metric_name: "api_calls".into(),
                    metric_id: None,
                    quantity: dec!(-1),
                    event_time: Some(now),
                    properties: HashMap::new(),
                },
            ],
            now,
        )
        .await;

    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_err());
}
