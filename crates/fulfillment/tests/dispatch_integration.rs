//! Dispatcher behaviour against the in-memory store and carrier.
//!
//! Covers idempotent reruns, partial failure, operator resets, bounded
//! concurrency and tracking updates.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{Money, OrderId, Pincode, UserId, VendorId};
use domain::{
    DispatchState, NewOrder, Order, OrderItem, OrderStatus, Owner, PaymentMethod, Shipment,
    ShippingAddress, VendorProfile, group_by_vendor,
};
use fulfillment::{
    CarrierError, DispatchConfig, Dispatcher, FulfillmentError, InMemoryCarrier, RetryPolicy,
    ShiprocketClient,
};
use store::{InMemoryStore, OrderStore, ShipmentStore, VendorStore};

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    }
}

fn config(max_concurrency: usize) -> DispatchConfig {
    DispatchConfig {
        max_concurrency,
        call_timeout: Duration::from_secs(5),
        retry: fast_retry(2),
    }
}

struct Harness {
    store: InMemoryStore,
    carrier: InMemoryCarrier,
    dispatcher: Dispatcher<InMemoryStore>,
}

impl Harness {
    fn new(config: DispatchConfig) -> Self {
        let store = InMemoryStore::new();
        let carrier = InMemoryCarrier::new();
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(carrier.clone()), config);
        Self {
            store,
            carrier,
            dispatcher,
        }
    }

    async fn vendor(&self, name: &str) -> VendorProfile {
        let mut vendor = VendorProfile::new(name, format!("{name}@vendors.in"), Utc::now());
        vendor.phone = Some("9000012345".to_string());
        vendor.address = Some("Plot 9, MIDC".to_string());
        vendor.city = Some("Nashik".to_string());
        vendor.state = Some("Maharashtra".to_string());
        vendor.pincode = Some(Pincode::parse("422007").unwrap());
        self.store.save_vendor(&vendor).await.unwrap();
        vendor
    }

    async fn order(&self, lines: &[(&VendorProfile, i64)]) -> Order {
        let items = lines
            .iter()
            .enumerate()
            .map(|(n, (vendor, rupees))| {
                OrderItem::new(format!("P{n}"), format!("Product {n}"), vendor.id, 1, Money::from_rupees(*rupees))
            })
            .collect();
        let order = Order::place(
            NewOrder {
                owner: Owner::User(UserId::new()),
                contact_email: "shopper@example.com".to_string(),
                items,
                shipping_address: ShippingAddress {
                    name: "Neha Joshi".to_string(),
                    phone: "9870012345".to_string(),
                    address_line1: "3 FC Road".to_string(),
                    address_line2: None,
                    city: "Pune".to_string(),
                    state: "Maharashtra".to_string(),
                    pincode: Pincode::parse("411004").unwrap(),
                    country: "India".to_string(),
                },
                payment_method: PaymentMethod::Prepaid,
            },
            Utc::now(),
        )
        .unwrap();
        self.store.insert_order(&order).await.unwrap();
        order
    }

    async fn state_of(&self, order_id: OrderId, vendor_id: VendorId) -> DispatchState {
        self.store
            .get_shipment(order_id, vendor_id)
            .await
            .unwrap()
            .unwrap()
            .state
    }

    async fn status_of(&self, order_id: OrderId) -> OrderStatus {
        self.store.get_order(order_id).await.unwrap().unwrap().status()
    }
}

#[tokio::test]
async fn two_vendor_order_makes_two_calls_with_their_subtotals() {
    let h = Harness::new(config(4));
    let v1 = h.vendor("vendor1").await;
    let v2 = h.vendor("vendor2").await;
    let order = h.order(&[(&v1, 400), (&v2, 600)]).await;

    let report = h.dispatcher.dispatch_order(order.id()).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.dispatched.len(), 2);
    assert_eq!(report.order_status, OrderStatus::Processing);

    let mut sub_totals: Vec<f64> = h
        .carrier
        .calls()
        .await
        .iter()
        .map(|request| ShiprocketClient::payload(request).sub_total)
        .collect();
    sub_totals.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(sub_totals, vec![400.0, 600.0]);

    for call in h.carrier.calls().await {
        assert!(call.group.items.iter().all(|i| i.vendor_id == call.vendor_id()));
    }
    assert_eq!(h.state_of(order.id(), v1.id).await, DispatchState::Sent);
    assert_eq!(h.state_of(order.id(), v2.id).await, DispatchState::Sent);
    assert_eq!(h.status_of(order.id()).await, OrderStatus::Processing);
}

#[tokio::test]
async fn rerun_does_not_resend_successful_groups() {
    let h = Harness::new(config(4));
    let v1 = h.vendor("ok").await;
    let v2 = h.vendor("flaky").await;
    let order = h.order(&[(&v1, 400), (&v2, 600)]).await;
    h.carrier
        .fail_always(v2.id, CarrierError::Unavailable { status: 503, body: "down".into() })
        .await;

    let first = h.dispatcher.dispatch_order(order.id()).await.unwrap();

    assert_eq!(first.dispatched.len(), 1);
    assert_eq!(first.failed.len(), 1);
    assert!(first.failed[0].retryable);
    assert_eq!(first.failed[0].state, DispatchState::Failed);
    // Two attempts for the flaky vendor, one for the healthy one.
    assert_eq!(h.carrier.calls_for(v1.id).await, 1);
    assert_eq!(h.carrier.calls_for(v2.id).await, 2);
    assert_eq!(first.order_status, OrderStatus::Pending);

    h.carrier.clear_failures().await;
    let second = h.dispatcher.dispatch_order(order.id()).await.unwrap();

    assert_eq!(second.already_dispatched, vec![v1.id]);
    assert_eq!(second.dispatched.len(), 1);
    assert_eq!(second.dispatched[0].vendor_id, v2.id);
    assert_eq!(h.carrier.calls_for(v1.id).await, 1);
    assert_eq!(second.order_status, OrderStatus::Processing);

    // A third run is a no-op.
    let third = h.dispatcher.dispatch_order(order.id()).await.unwrap();
    assert!(third.dispatched.is_empty());
    assert_eq!(third.already_dispatched.len(), 2);
    assert_eq!(h.carrier.call_count().await, 4);
}

#[tokio::test]
async fn rejected_group_waits_for_reset() {
    let h = Harness::new(config(4));
    let v1 = h.vendor("good").await;
    let v2 = h.vendor("rejected").await;
    let order = h.order(&[(&v1, 400), (&v2, 600)]).await;
    h.carrier
        .fail_next(
            v2.id,
            CarrierError::Rejected {
                status: 422,
                message: "Delivery postcode not serviceable".into(),
            },
        )
        .await;

    let report = h.dispatcher.dispatch_order(order.id()).await.unwrap();

    assert_eq!(report.needs_attention().count(), 1);
    assert!(report.has_new_attention());
    assert_eq!(h.state_of(order.id(), v2.id).await, DispatchState::Rejected);
    assert_eq!(report.order_status, OrderStatus::OnHold);
    assert_eq!(h.carrier.calls_for(v2.id).await, 1);

    // Rejected groups are not retried automatically.
    let rerun = h.dispatcher.dispatch_order(order.id()).await.unwrap();
    assert_eq!(rerun.failed[0].state, DispatchState::Rejected);
    assert!(!rerun.has_new_attention());
    assert_eq!(h.carrier.calls_for(v2.id).await, 1);

    let reset = h.dispatcher.reset_shipment(order.id(), v2.id).await.unwrap();
    assert_eq!(reset.state, DispatchState::Pending);

    let after_reset = h.dispatcher.dispatch_order(order.id()).await.unwrap();
    assert_eq!(after_reset.dispatched.len(), 1);
    assert_eq!(after_reset.order_status, OrderStatus::Processing);
}

#[tokio::test]
async fn reset_refuses_sent_groups() {
    let h = Harness::new(config(4));
    let v1 = h.vendor("solo").await;
    let order = h.order(&[(&v1, 100)]).await;
    h.dispatcher.dispatch_order(order.id()).await.unwrap();

    let result = h.dispatcher.reset_shipment(order.id(), v1.id).await;
    assert!(matches!(
        result,
        Err(FulfillmentError::ResetNotAllowed { state: DispatchState::Sent, .. })
    ));

    let missing = h.dispatcher.reset_shipment(order.id(), VendorId::new()).await;
    assert!(matches!(missing, Err(FulfillmentError::ShipmentNotFound { .. })));
}

#[tokio::test]
async fn misconfigured_vendor_is_skipped_then_retried_once_fixed() {
    let h = Harness::new(config(4));
    let good = h.vendor("good").await;
    let mut bad = h.vendor("no-phone").await;
    bad.phone = None;
    h.store.save_vendor(&bad).await.unwrap();
    let order = h.order(&[(&good, 250), (&bad, 750)]).await;

    let report = h.dispatcher.dispatch_order(order.id()).await.unwrap();

    assert_eq!(report.dispatched.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].state, DispatchState::Skipped);
    assert!(report.failed[0].reason.contains("phone"));
    assert_eq!(h.carrier.calls_for(bad.id).await, 0);
    assert_eq!(report.order_status, OrderStatus::OnHold);

    bad.phone = Some("9000099999".to_string());
    h.store.save_vendor(&bad).await.unwrap();

    let rerun = h.dispatcher.dispatch_order(order.id()).await.unwrap();
    assert_eq!(rerun.dispatched.len(), 1);
    assert_eq!(rerun.dispatched[0].vendor_id, bad.id);
    assert_eq!(h.carrier.calls_for(good.id).await, 1);
    assert_eq!(rerun.order_status, OrderStatus::Processing);
}

#[tokio::test]
async fn unwritable_records_are_reported_without_stranding_other_groups() {
    let h = Harness::new(config(4));
    let reachable = h.vendor("reachable").await;
    let unwritable = h.vendor("unwritable").await;
    let mut no_phone = h.vendor("no-phone").await;
    no_phone.phone = None;
    h.store.save_vendor(&no_phone).await.unwrap();
    let order = h
        .order(&[(&reachable, 400), (&unwritable, 600), (&no_phone, 200)])
        .await;
    h.store.fail_shipment_writes(unwritable.id).await;
    h.store.fail_shipment_writes(no_phone.id).await;

    let report = h.dispatcher.dispatch_order(order.id()).await.unwrap();

    assert_eq!(report.dispatched.len(), 1);
    assert_eq!(report.dispatched[0].vendor_id, reachable.id);
    assert_eq!(report.failed.len(), 2);
    for failed in &report.failed {
        assert!(failed.retryable);
        assert!(!failed.changed);
        assert_eq!(failed.state, DispatchState::Pending);
    }
    assert!(!report.has_new_attention());
    assert_eq!(h.carrier.calls_for(unwritable.id).await, 0);
    assert!(
        h.store
            .shipments_in_states(&[DispatchState::Dispatching], None)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(h.state_of(order.id(), reachable.id).await, DispatchState::Sent);
    assert_eq!(report.order_status, OrderStatus::Pending);

    h.store.clear_failures().await;
    let rerun = h.dispatcher.dispatch_order(order.id()).await.unwrap();
    assert_eq!(rerun.already_dispatched, vec![reachable.id]);
    assert_eq!(rerun.dispatched.len(), 1);
    assert_eq!(rerun.dispatched[0].vendor_id, unwritable.id);
    assert_eq!(h.state_of(order.id(), no_phone.id).await, DispatchState::Skipped);
    assert!(rerun.has_new_attention());
}

#[tokio::test]
async fn group_claimed_elsewhere_is_left_alone() {
    let h = Harness::new(config(4));
    let v1 = h.vendor("v1").await;
    let order = h.order(&[(&v1, 300)]).await;

    let group = &group_by_vendor(order.items())[0];
    let mut claimed = Shipment::for_group(order.id(), group, Utc::now());
    claimed.begin_dispatch(Utc::now());
    h.store.save_shipment(&claimed).await.unwrap();

    let report = h.dispatcher.dispatch_order(order.id()).await.unwrap();

    assert_eq!(report.in_flight, vec![v1.id]);
    assert_eq!(h.carrier.call_count().await, 0);
    assert_eq!(report.order_status, OrderStatus::Pending);
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let h = Harness::new(config(2));
    h.carrier.set_delay(Duration::from_millis(20)).await;
    let mut vendors = Vec::new();
    for n in 0..6 {
        vendors.push(h.vendor(&format!("v{n}")).await);
    }
    let lines: Vec<(&VendorProfile, i64)> = vendors.iter().map(|v| (v, 100)).collect();
    let order = h.order(&lines).await;

    let report = h.dispatcher.dispatch_order(order.id()).await.unwrap();

    assert_eq!(report.dispatched.len(), 6);
    assert!(h.carrier.peak_concurrency() <= 2);
    assert!(h.carrier.peak_concurrency() >= 1);
}

#[tokio::test]
async fn sequential_mode_sends_one_at_a_time() {
    let h = Harness::new(config(1));
    h.carrier.set_delay(Duration::from_millis(5)).await;
    let a = h.vendor("a").await;
    let b = h.vendor("b").await;
    let c = h.vendor("c").await;
    let order = h.order(&[(&a, 1), (&b, 2), (&c, 3)]).await;

    let report = h.dispatcher.dispatch_order(order.id()).await.unwrap();

    assert_eq!(report.dispatched.len(), 3);
    assert_eq!(h.carrier.peak_concurrency(), 1);
}

#[tokio::test]
async fn slow_carrier_times_out_as_retryable_failure() {
    let h = Harness::new(DispatchConfig {
        max_concurrency: 4,
        call_timeout: Duration::from_millis(20),
        retry: RetryPolicy::no_retry(),
    });
    h.carrier.set_delay(Duration::from_millis(300)).await;
    let v1 = h.vendor("slow").await;
    let order = h.order(&[(&v1, 100)]).await;

    let report = h.dispatcher.dispatch_order(order.id()).await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].retryable);
    assert!(report.failed[0].reason.contains("timed out"));
    assert_eq!(h.state_of(order.id(), v1.id).await, DispatchState::Failed);
}

#[tokio::test]
async fn cancelled_order_is_not_dispatched() {
    let h = Harness::new(config(4));
    let v1 = h.vendor("v1").await;
    let mut order = h.order(&[(&v1, 100)]).await;
    order.transition_to(OrderStatus::Cancelled, Utc::now()).unwrap();
    h.store.update_order(&order).await.unwrap();

    let result = h.dispatcher.dispatch_order(order.id()).await;

    assert!(matches!(
        result,
        Err(FulfillmentError::NotDispatchable { status: OrderStatus::Cancelled, .. })
    ));
    assert_eq!(h.carrier.call_count().await, 0);

    let missing = h.dispatcher.dispatch_order(OrderId::new()).await;
    assert!(matches!(missing, Err(FulfillmentError::OrderNotFound(_))));
}

#[tokio::test]
async fn tracking_moves_order_to_shipped_then_delivered() {
    let h = Harness::new(config(1));
    let v1 = h.vendor("v1").await;
    let v2 = h.vendor("v2").await;
    let order = h.order(&[(&v1, 400), (&v2, 600)]).await;
    h.dispatcher.dispatch_order(order.id()).await.unwrap();

    let shipments = h.store.get_shipments(order.id()).await.unwrap();
    let awbs: Vec<String> = shipments
        .iter()
        .map(|s| s.awb_code().unwrap().to_string())
        .collect();

    let update = h.dispatcher.record_tracking(&awbs[0], "In Transit").await.unwrap();
    assert_eq!(update.order.unwrap().status(), OrderStatus::Shipped);

    let update = h.dispatcher.record_tracking(&awbs[0], "DELIVERED").await.unwrap();
    assert!(update.shipment.is_delivered());
    assert!(update.order.is_none());

    let update = h.dispatcher.record_tracking(&awbs[1], "delivered").await.unwrap();
    let delivered = update.order.unwrap();
    assert_eq!(delivered.status(), OrderStatus::Delivered);
    assert!(delivered.delivered_at().is_some());
    assert_eq!(h.status_of(order.id()).await, OrderStatus::Delivered);

    let unknown = h.dispatcher.record_tracking("NOPE", "DELIVERED").await;
    assert!(matches!(unknown, Err(FulfillmentError::UnknownAwb(_))));
}

#[tokio::test]
async fn partially_dispatched_order_follows_its_first_parcel() {
    let h = Harness::new(config(4));
    let ready = h.vendor("ready").await;
    let flaky = h.vendor("flaky").await;
    let order = h.order(&[(&ready, 400), (&flaky, 600)]).await;
    h.carrier
        .fail_always(flaky.id, CarrierError::Unavailable { status: 503, body: "down".into() })
        .await;

    let report = h.dispatcher.dispatch_order(order.id()).await.unwrap();
    assert_eq!(report.order_status, OrderStatus::Pending);

    let first_awb = h
        .store
        .get_shipment(order.id(), ready.id)
        .await
        .unwrap()
        .unwrap()
        .awb_code()
        .unwrap()
        .to_string();
    let update = h.dispatcher.record_tracking(&first_awb, "PICKED UP").await.unwrap();
    assert_eq!(update.order.unwrap().status(), OrderStatus::Shipped);

    // The remaining group can still be sent once the carrier recovers.
    h.carrier.clear_failures().await;
    let rerun = h.dispatcher.dispatch_order(order.id()).await.unwrap();
    assert_eq!(rerun.dispatched.len(), 1);
    assert_eq!(rerun.dispatched[0].vendor_id, flaky.id);
    assert_eq!(rerun.order_status, OrderStatus::Shipped);

    let second_awb = rerun.dispatched[0].carrier.awb_code.clone().unwrap();
    let update = h.dispatcher.record_tracking(&first_awb, "DELIVERED").await.unwrap();
    assert!(update.order.is_none());
    let update = h.dispatcher.record_tracking(&second_awb, "DELIVERED").await.unwrap();
    assert_eq!(update.order.unwrap().status(), OrderStatus::Delivered);
    assert_eq!(h.status_of(order.id()).await, OrderStatus::Delivered);
}
