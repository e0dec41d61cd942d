//! Batch jobs against the in-memory store, carrier and mailer.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use common::{Money, Pincode, UserId, VendorId};
use domain::{
    Cart, CartItem, DispatchState, NewOrder, Order, OrderItem, OrderStatus, Owner, PaymentMethod,
    ShippingAddress, VendorProfile,
};
use fulfillment::{CarrierError, DispatchConfig, Dispatcher, InMemoryCarrier, RetryPolicy};
use notifications::{
    InMemoryMailer, InvoiceMonth, Job, JobConfig, JobRunner, Notifier,
};
use store::{CartStore, InMemoryStore, OrderStore, ShipmentStore, VendorStore};

struct Harness {
    store: InMemoryStore,
    mailer: InMemoryMailer,
    carrier: InMemoryCarrier,
    runner: JobRunner<InMemoryStore>,
}

fn harness(ops_email: Option<&str>) -> Harness {
    let store = InMemoryStore::new();
    let mailer = InMemoryMailer::new();
    let carrier = InMemoryCarrier::new();
    let notifier = Notifier::new(Arc::new(mailer.clone()), ops_email.map(str::to_string));
    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(carrier.clone()),
        DispatchConfig {
            retry: RetryPolicy::no_retry(),
            ..DispatchConfig::default()
        },
    );
    let runner = JobRunner::new(store.clone(), notifier, dispatcher, JobConfig::default());
    Harness {
        store,
        mailer,
        carrier,
        runner,
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        name: "Farah Khan".to_string(),
        phone: "9811100000".to_string(),
        address_line1: "Hazratganj".to_string(),
        address_line2: None,
        city: "Lucknow".to_string(),
        state: "Uttar Pradesh".to_string(),
        pincode: Pincode::parse("226001").unwrap(),
        country: "India".to_string(),
    }
}

fn place(email: &str, items: Vec<OrderItem>, at: DateTime<Utc>) -> Order {
    Order::place(
        NewOrder {
            owner: Owner::User(UserId::new()),
            contact_email: email.to_string(),
            items,
            shipping_address: address(),
            payment_method: PaymentMethod::Prepaid,
        },
        at,
    )
    .unwrap()
}

fn deliver(order: &mut Order, at: DateTime<Utc>) {
    for next in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
        order.transition_to(next, at).unwrap();
    }
}

async fn vendor(store: &InMemoryStore, name: &str) -> VendorProfile {
    let mut vendor = VendorProfile::new(name, format!("{name}@vendors.in"), Utc::now());
    vendor.phone = Some("9000012345".to_string());
    vendor.address = Some("Chowk".to_string());
    vendor.city = Some("Lucknow".to_string());
    vendor.state = Some("Uttar Pradesh".to_string());
    vendor.pincode = Some(Pincode::parse("226003").unwrap());
    store.save_vendor(&vendor).await.unwrap();
    vendor
}

#[tokio::test]
async fn abandoned_cart_reminder_goes_out_once() {
    let h = harness(None);
    let now = Utc::now();
    let old = now - TimeDelta::hours(2);

    let owner = Owner::Session("guest-1".to_string());
    let mut idle = Cart::new(owner.clone(), old);
    idle.add_item(
        CartItem::new("CHIKAN", "Chikankari Kurta", VendorId::new(), Money::from_rupees(1800), 1),
        old,
    )
    .unwrap();
    idle.set_contact_email("guest@example.com", old);
    h.store.save_cart(&idle).await.unwrap();

    let mut fresh = Cart::new(Owner::Session("guest-2".to_string()), now);
    fresh
        .add_item(CartItem::new("ATTAR", "Attar", VendorId::new(), Money::from_rupees(300), 1), now)
        .unwrap();
    fresh.set_contact_email("fresh@example.com", now);
    h.store.save_cart(&fresh).await.unwrap();

    let summary = h.runner.run(Job::AbandonedCarts, now, None).await.unwrap();

    assert_eq!((summary.examined, summary.sent, summary.failed), (1, 1, 0));
    let sent = h.mailer.sent_to("guest@example.com").await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].html.contains("Chikankari Kurta"));
    assert!(h.store.get_cart(&owner).await.unwrap().unwrap().abandoned_notified_at().is_some());

    let again = h.runner.run(Job::AbandonedCarts, now, None).await.unwrap();
    assert_eq!(again.examined, 0);
    assert_eq!(h.mailer.sent_count().await, 1);
}

#[tokio::test]
async fn failed_reminder_is_retried_next_run() {
    let h = harness(None);
    let now = Utc::now();
    let old = now - TimeDelta::hours(5);

    let owner = Owner::User(UserId::new());
    let mut cart = Cart::new(owner.clone(), old);
    cart.add_item(CartItem::new("P", "Pickle", VendorId::new(), Money::from_rupees(120), 2), old)
        .unwrap();
    cart.set_contact_email("flaky@example.com", old);
    h.store.save_cart(&cart).await.unwrap();
    h.mailer.fail_for("flaky@example.com").await;

    let summary = h.runner.abandoned_carts(now, None).await.unwrap();

    assert_eq!((summary.examined, summary.sent, summary.failed), (1, 0, 1));
    assert!(h.store.get_cart(&owner).await.unwrap().unwrap().abandoned_notified_at().is_none());
}

#[tokio::test]
async fn review_requests_respect_delay_and_marker() {
    let h = harness(None);
    let now = Utc::now();
    let vendor_id = VendorId::new();

    let mut due = place(
        "due@example.com",
        vec![OrderItem::new("RUG", "Bhadohi Rug", vendor_id, 1, Money::from_rupees(5000))],
        now - TimeDelta::days(12),
    );
    deliver(&mut due, now - TimeDelta::days(8));
    h.store.insert_order(&due).await.unwrap();

    let mut recent = place(
        "recent@example.com",
        vec![OrderItem::new("RUG", "Bhadohi Rug", vendor_id, 1, Money::from_rupees(5000))],
        now - TimeDelta::days(4),
    );
    deliver(&mut recent, now - TimeDelta::days(2));
    h.store.insert_order(&recent).await.unwrap();

    let summary = h.runner.run(Job::ReviewRequests, now, Some(10)).await.unwrap();

    assert_eq!((summary.examined, summary.sent), (1, 1));
    assert_eq!(h.mailer.sent_to("due@example.com").await.len(), 1);
    assert!(h.mailer.sent_to("recent@example.com").await.is_empty());
    let stored = h.store.get_order(due.id()).await.unwrap().unwrap();
    assert!(stored.review_requested_at().is_some());

    let again = h.runner.run(Job::ReviewRequests, now, None).await.unwrap();
    assert_eq!(again.examined, 0);
}

#[tokio::test]
async fn sla_breaches_alert_ops_once() {
    let h = harness(Some("ops@marketplace.in"));
    let now = Utc::now();

    let stale = place(
        "late@example.com",
        vec![OrderItem::new("LAMP", "Brass Lamp", VendorId::new(), 1, Money::from_rupees(900))],
        now - TimeDelta::hours(50),
    );
    h.store.insert_order(&stale).await.unwrap();
    let fresh = place(
        "ontime@example.com",
        vec![OrderItem::new("LAMP", "Brass Lamp", VendorId::new(), 1, Money::from_rupees(900))],
        now - TimeDelta::hours(3),
    );
    h.store.insert_order(&fresh).await.unwrap();

    let summary = h.runner.run(Job::SlaBreaches, now, None).await.unwrap();

    assert_eq!((summary.examined, summary.sent), (1, 1));
    let alerts = h.mailer.sent_to("ops@marketplace.in").await;
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].subject.contains("50h"));
    assert!(h.store.get_order(stale.id()).await.unwrap().unwrap().sla_alerted_at().is_some());

    let again = h.runner.run(Job::SlaBreaches, now, None).await.unwrap();
    assert_eq!(again.examined, 0);
}

#[tokio::test]
async fn sla_breaches_without_ops_address_are_only_logged() {
    let h = harness(None);
    let now = Utc::now();
    let stale = place(
        "late@example.com",
        vec![OrderItem::new("LAMP", "Brass Lamp", VendorId::new(), 1, Money::from_rupees(900))],
        now - TimeDelta::hours(72),
    );
    h.store.insert_order(&stale).await.unwrap();

    let summary = h.runner.sla_breaches(now, None).await.unwrap();

    assert_eq!((summary.examined, summary.sent, summary.skipped), (1, 0, 1));
    assert_eq!(h.mailer.sent_count().await, 0);
    assert!(h.store.get_order(stale.id()).await.unwrap().unwrap().sla_alerted_at().is_none());
}

#[tokio::test]
async fn vendor_invoices_cover_the_month() {
    let h = harness(None);
    let month = InvoiceMonth::new(2026, 9).unwrap();
    let in_month = Utc.with_ymd_and_hms(2026, 9, 14, 12, 0, 0).unwrap();
    let next_month = Utc.with_ymd_and_hms(2026, 10, 2, 12, 0, 0).unwrap();

    let weaver = vendor(&h.store, "weaver").await;
    let unknown = VendorId::new();

    let mut september = place(
        "a@example.com",
        vec![
            OrderItem::new("SHAWL", "Pashmina", weaver.id, 2, Money::from_rupees(2500)),
            OrderItem::new("CAP", "Cap", unknown, 1, Money::from_rupees(200)),
        ],
        in_month - TimeDelta::days(3),
    );
    deliver(&mut september, in_month);
    h.store.insert_order(&september).await.unwrap();

    let mut october = place(
        "b@example.com",
        vec![OrderItem::new("SHAWL", "Pashmina", weaver.id, 1, Money::from_rupees(2500))],
        in_month,
    );
    deliver(&mut october, next_month);
    h.store.insert_order(&october).await.unwrap();

    let summary = h
        .runner
        .run(Job::VendorInvoices(Some(month)), Utc::now(), None)
        .await
        .unwrap();

    assert_eq!((summary.examined, summary.sent, summary.skipped), (2, 1, 1));
    let statements = h.mailer.sent_to("weaver@vendors.in").await;
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].subject, "Statement for 2026-09");
    // ₹5000 gross, ₹500 commission, ₹4500 payout.
    assert!(statements[0].html.contains("₹5000.00"));
    assert!(statements[0].html.contains("₹500.00"));
    assert!(statements[0].html.contains("₹4500.00"));
}

#[tokio::test]
async fn retry_dispatch_picks_up_failed_groups() {
    let h = harness(None);
    let seller = vendor(&h.store, "seller").await;
    let order = place(
        "buyer@example.com",
        vec![OrderItem::new("BOX", "Sandalwood Box", seller.id, 1, Money::from_rupees(700))],
        Utc::now(),
    );
    h.store.insert_order(&order).await.unwrap();

    let mut cancelled = place(
        "gone@example.com",
        vec![OrderItem::new("BOX", "Sandalwood Box", seller.id, 1, Money::from_rupees(700))],
        Utc::now(),
    );
    h.store.insert_order(&cancelled).await.unwrap();

    h.carrier
        .fail_always(seller.id, CarrierError::Transport("connection reset".to_string()))
        .await;
    let dispatcher = Dispatcher::new(
        h.store.clone(),
        Arc::new(h.carrier.clone()),
        DispatchConfig {
            retry: RetryPolicy::no_retry(),
            ..DispatchConfig::default()
        },
    );
    dispatcher.dispatch_order(order.id()).await.unwrap();
    dispatcher.dispatch_order(cancelled.id()).await.unwrap();
    assert_eq!(
        h.store.shipments_in_states(&[DispatchState::Failed], None).await.unwrap().len(),
        2
    );

    cancelled.transition_to(OrderStatus::Cancelled, Utc::now()).unwrap();
    h.store.update_order(&cancelled).await.unwrap();
    h.carrier.clear_failures().await;

    let summary = h.runner.run(Job::RetryDispatch, Utc::now(), None).await.unwrap();

    // The cancelled order is no longer in the backlog.
    assert_eq!((summary.examined, summary.sent, summary.skipped, summary.failed), (1, 1, 0, 0));
    let shipment = h.store.get_shipment(order.id(), seller.id).await.unwrap().unwrap();
    assert_eq!(shipment.state, DispatchState::Sent);
    assert_eq!(
        h.store.get_order(order.id()).await.unwrap().unwrap().status(),
        OrderStatus::Processing
    );

    let again = h.runner.run(Job::RetryDispatch, Utc::now(), None).await.unwrap();
    assert_eq!((again.examined, again.sent), (0, 0));
    assert_eq!(h.carrier.calls_for(seller.id).await, 3);
}

#[tokio::test]
async fn retry_dispatch_alerts_ops_once_per_problem() {
    let h = harness(Some("ops@marketplace.in"));
    let seller = vendor(&h.store, "seller").await;
    let mut unfinished = VendorProfile::new("unfinished", "unfinished@vendors.in", Utc::now());
    unfinished.phone = Some("9000054321".to_string());
    h.store.save_vendor(&unfinished).await.unwrap();

    let order = place(
        "buyer@example.com",
        vec![
            OrderItem::new("BOX", "Sandalwood Box", seller.id, 1, Money::from_rupees(700)),
            OrderItem::new("RUG", "Dhurrie", unfinished.id, 1, Money::from_rupees(2200)),
        ],
        Utc::now(),
    );
    h.store.insert_order(&order).await.unwrap();

    h.carrier
        .fail_always(seller.id, CarrierError::Transport("connection reset".to_string()))
        .await;
    let dispatcher = Dispatcher::new(
        h.store.clone(),
        Arc::new(h.carrier.clone()),
        DispatchConfig {
            retry: RetryPolicy::no_retry(),
            ..DispatchConfig::default()
        },
    );
    dispatcher.dispatch_order(order.id()).await.unwrap();
    h.carrier.clear_failures().await;
    h.carrier
        .fail_always(
            seller.id,
            CarrierError::Rejected {
                status: 422,
                message: "pickup location not found".to_string(),
            },
        )
        .await;

    // The carrier rejection is new in the first run; the missing pickup
    // address was already on record before it.
    let first = h.runner.run(Job::RetryDispatch, Utc::now(), None).await.unwrap();
    assert_eq!((first.examined, first.sent, first.failed), (1, 0, 1));
    let alerts = h.mailer.sent_to("ops@marketplace.in").await;
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].html.contains("pickup location not found"));

    for _ in 0..2 {
        let rerun = h.runner.run(Job::RetryDispatch, Utc::now(), None).await.unwrap();
        assert_eq!((rerun.examined, rerun.failed), (1, 1));
    }
    assert_eq!(h.mailer.sent_to("ops@marketplace.in").await.len(), 1);
    assert_eq!(h.carrier.calls_for(seller.id).await, 2);
    assert_eq!(
        h.store.get_order(order.id()).await.unwrap().unwrap().status(),
        OrderStatus::OnHold
    );
}

#[tokio::test]
async fn retry_dispatch_respects_limit() {
    let h = harness(None);
    let seller = vendor(&h.store, "seller").await;
    h.carrier
        .fail_always(seller.id, CarrierError::Transport("connection reset".to_string()))
        .await;
    let dispatcher = Dispatcher::new(
        h.store.clone(),
        Arc::new(h.carrier.clone()),
        DispatchConfig {
            retry: RetryPolicy::no_retry(),
            ..DispatchConfig::default()
        },
    );
    for n in 0..3 {
        let order = place(
            &format!("buyer{n}@example.com"),
            vec![OrderItem::new("BOX", "Sandalwood Box", seller.id, 1, Money::from_rupees(700))],
            Utc::now(),
        );
        h.store.insert_order(&order).await.unwrap();
        dispatcher.dispatch_order(order.id()).await.unwrap();
    }

    let summary = h.runner.run(Job::RetryDispatch, Utc::now(), Some(2)).await.unwrap();
    assert_eq!((summary.examined, summary.failed), (2, 2));
}
