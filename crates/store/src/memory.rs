use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Pincode, VendorId};
use domain::{Cart, DispatchState, Order, Owner, PlatformPincode, Shipment, VendorPincode, VendorProfile};
use tokio::sync::RwLock;

use crate::{
    OrderQuery, Result, StoreError,
    store::{CartStore, OrderStore, PincodeStore, ShipmentStore, VendorStore},
};

/// In-memory store for tests and local runs.
///
/// Cloning shares the underlying maps, and the semantics match
/// [`PostgresStore`](crate::PostgresStore), optimistic versions included.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    carts: Arc<RwLock<HashMap<Owner, Cart>>>,
    vendors: Arc<RwLock<HashMap<VendorId, VendorProfile>>>,
    platform_pincodes: Arc<RwLock<Vec<PlatformPincode>>>,
    vendor_pincodes: Arc<RwLock<Vec<VendorPincode>>>,
    shipments: Arc<RwLock<Vec<Shipment>>>,
    faults: Arc<RwLock<Faults>>,
}

/// Scripted write failures.
#[derive(Debug, Default)]
struct Faults {
    cart_writes: bool,
    shipment_writes: HashSet<VendorId>,
}

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn shipment_count(&self) -> usize {
        self.shipments.read().await.len()
    }

    /// Fails every cart write, checkout included, until cleared.
    pub async fn fail_cart_writes(&self) {
        self.faults.write().await.cart_writes = true;
    }

    /// Fails every write of the vendor's shipment records until cleared.
    pub async fn fail_shipment_writes(&self, vendor_id: VendorId) {
        self.faults.write().await.shipment_writes.insert(vendor_id);
    }

    pub async fn clear_failures(&self) {
        let mut faults = self.faults.write().await;
        faults.cart_writes = false;
        faults.shipment_writes.clear();
    }

    /// Clears every table.
    pub async fn clear(&self) {
        self.orders.write().await.clear();
        self.carts.write().await.clear();
        self.vendors.write().await.clear();
        self.platform_pincodes.write().await.clear();
        self.vendor_pincodes.write().await.clear();
        self.shipments.write().await.clear();
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id()) {
            return Err(StoreError::DuplicateOrder(order.id()));
        }
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn place_order(&self, order: &Order, cart: &Cart) -> Result<()> {
        let mut orders = self.orders.write().await;
        let mut carts = self.carts.write().await;
        if orders.contains_key(&order.id()) {
            return Err(StoreError::DuplicateOrder(order.id()));
        }
        if self.faults.read().await.cart_writes {
            return Err(unavailable());
        }
        orders.insert(order.id(), order.clone());
        carts.insert(cart.owner().clone(), cart.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        let Some(stored) = orders.get_mut(&order.id()) else {
            return Err(StoreError::OrderNotFound(order.id()));
        };

        // Only the mutable fields are taken over.
        let mut parts = stored.clone().into_parts();
        let update = order.clone().into_parts();
        parts.status = update.status;
        parts.updated_at = update.updated_at;
        parts.delivered_at = update.delivered_at;
        parts.review_requested_at = update.review_requested_at;
        parts.sla_alerted_at = update.sla_alerted_at;
        *stored = Order::from_parts(parts);
        Ok(())
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> = orders.values().filter(|o| query.matches(o)).cloned().collect();
        matching.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then(a.id().cmp(&b.id())));

        if let Some(limit) = query.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_cart(&self, owner: &Owner) -> Result<Option<Cart>> {
        Ok(self.carts.read().await.get(owner).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        if self.faults.read().await.cart_writes {
            return Err(unavailable());
        }
        self.carts
            .write()
            .await
            .insert(cart.owner().clone(), cart.clone());
        Ok(())
    }

    async fn idle_carts(&self, idle_since: DateTime<Utc>, limit: Option<usize>) -> Result<Vec<Cart>> {
        let carts = self.carts.read().await;
        let mut idle: Vec<Cart> = carts
            .values()
            .filter(|c| {
                !c.is_empty()
                    && c.contact_email().is_some()
                    && c.abandoned_notified_at().is_none()
                    && c.updated_at() <= idle_since
            })
            .cloned()
            .collect();
        idle.sort_by_key(|c| c.updated_at());

        if let Some(limit) = limit {
            idle.truncate(limit);
        }
        Ok(idle)
    }
}

#[async_trait]
impl VendorStore for InMemoryStore {
    async fn save_vendor(&self, vendor: &VendorProfile) -> Result<()> {
        self.vendors.write().await.insert(vendor.id, vendor.clone());
        Ok(())
    }

    async fn get_vendor(&self, id: VendorId) -> Result<Option<VendorProfile>> {
        Ok(self.vendors.read().await.get(&id).cloned())
    }

    async fn get_vendors(&self, ids: &[VendorId]) -> Result<HashMap<VendorId, VendorProfile>> {
        let vendors = self.vendors.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| vendors.get(id).map(|v| (*id, v.clone())))
            .collect())
    }
}

#[async_trait]
impl PincodeStore for InMemoryStore {
    async fn upsert_platform_pincodes(&self, records: &[PlatformPincode]) -> Result<usize> {
        let mut stored = self.platform_pincodes.write().await;
        for record in records {
            match stored
                .iter_mut()
                .find(|p| p.pincode == record.pincode && p.area == record.area)
            {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(records.len())
    }

    async fn upsert_vendor_pincodes(&self, records: &[VendorPincode]) -> Result<usize> {
        let mut stored = self.vendor_pincodes.write().await;
        for record in records {
            match stored.iter_mut().find(|p| {
                p.vendor_id == record.vendor_id && p.pincode == record.pincode && p.area == record.area
            }) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(records.len())
    }

    async fn platform_pincodes(&self, pincode: &Pincode) -> Result<Vec<PlatformPincode>> {
        let stored = self.platform_pincodes.read().await;
        let mut records: Vec<_> = stored.iter().filter(|p| &p.pincode == pincode).cloned().collect();
        records.sort_by(|a, b| a.area.cmp(&b.area));
        Ok(records)
    }

    async fn vendor_pincodes(&self, vendor_id: VendorId, pincode: &Pincode) -> Result<Vec<VendorPincode>> {
        let stored = self.vendor_pincodes.read().await;
        let mut records: Vec<_> = stored
            .iter()
            .filter(|p| p.vendor_id == vendor_id && &p.pincode == pincode)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.area.cmp(&b.area));
        Ok(records)
    }
}

#[async_trait]
impl ShipmentStore for InMemoryStore {
    async fn get_shipments(&self, order_id: OrderId) -> Result<Vec<Shipment>> {
        let stored = self.shipments.read().await;
        Ok(stored.iter().filter(|s| s.order_id == order_id).cloned().collect())
    }

    async fn get_shipment(&self, order_id: OrderId, vendor_id: VendorId) -> Result<Option<Shipment>> {
        let stored = self.shipments.read().await;
        Ok(stored
            .iter()
            .find(|s| s.order_id == order_id && s.vendor_id == vendor_id)
            .cloned())
    }

    async fn save_shipment(&self, shipment: &Shipment) -> Result<i64> {
        if self.faults.read().await.shipment_writes.contains(&shipment.vendor_id) {
            return Err(unavailable());
        }
        let mut stored = self.shipments.write().await;
        let existing = stored
            .iter_mut()
            .find(|s| s.order_id == shipment.order_id && s.vendor_id == shipment.vendor_id);

        let actual = existing.as_ref().map(|s| s.version).unwrap_or(0);
        if actual != shipment.version {
            return Err(StoreError::ConcurrencyConflict {
                order_id: shipment.order_id,
                vendor_id: shipment.vendor_id,
                expected: shipment.version,
                actual,
            });
        }

        let mut next = shipment.clone();
        next.version = actual + 1;
        match existing {
            Some(slot) => *slot = next,
            None => stored.push(next),
        }
        Ok(actual + 1)
    }

    async fn find_shipment_by_awb(&self, awb_code: &str) -> Result<Option<Shipment>> {
        let stored = self.shipments.read().await;
        Ok(stored.iter().find(|s| s.awb_code() == Some(awb_code)).cloned())
    }

    async fn shipments_in_states(
        &self,
        states: &[DispatchState],
        limit: Option<usize>,
    ) -> Result<Vec<Shipment>> {
        let stored = self.shipments.read().await;
        let mut matching: Vec<_> = stored
            .iter()
            .filter(|s| states.contains(&s.state))
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.updated_at);

        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn dispatch_backlog(&self, states: &[DispatchState], limit: Option<usize>) -> Result<Vec<OrderId>> {
        let orders = self.orders.read().await;
        let stored = self.shipments.read().await;

        let mut oldest: HashMap<OrderId, DateTime<Utc>> = HashMap::new();
        for shipment in stored.iter().filter(|s| states.contains(&s.state)) {
            let dispatchable = orders
                .get(&shipment.order_id)
                .is_some_and(|o| o.status().can_dispatch());
            if !dispatchable {
                continue;
            }
            oldest
                .entry(shipment.order_id)
                .and_modify(|at| *at = (*at).min(shipment.updated_at))
                .or_insert(shipment.updated_at);
        }

        let mut backlog: Vec<(DateTime<Utc>, OrderId)> =
            oldest.into_iter().map(|(order_id, at)| (at, order_id)).collect();
        backlog.sort();
        Ok(backlog
            .into_iter()
            .map(|(_, order_id)| order_id)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{Money, UserId};
    use domain::{CartItem, NewOrder, OrderItem, OrderStatus, PaymentMethod, ShippingAddress, group_by_vendor};

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Anil Kumar".to_string(),
            phone: "9812345678".to_string(),
            address_line1: "4 MG Road".to_string(),
            address_line2: None,
            city: "Bengaluru".to_string(),
            state: "Karnataka".to_string(),
            pincode: Pincode::parse("560001").unwrap(),
            country: "India".to_string(),
        }
    }

    fn order_at(at: DateTime<Utc>) -> Order {
        Order::place(
            NewOrder {
                owner: Owner::User(UserId::new()),
                contact_email: "anil@example.com".to_string(),
                items: vec![OrderItem::new("P1", "Kettle", VendorId::new(), 1, Money::from_rupees(900))],
                shipping_address: address(),
                payment_method: PaymentMethod::Prepaid,
            },
            at,
        )
        .unwrap()
    }

    fn shipment_for(order: &Order) -> Shipment {
        let group = &group_by_vendor(order.items())[0];
        Shipment::for_group(order.id(), group, Utc::now())
    }

    #[tokio::test]
    async fn insert_and_get_order() {
        let store = InMemoryStore::new();
        let order = order_at(Utc::now());

        store.insert_order(&order).await.unwrap();

        assert_eq!(store.get_order(order.id()).await.unwrap(), Some(order.clone()));
        assert!(matches!(
            store.insert_order(&order).await,
            Err(StoreError::DuplicateOrder(_))
        ));
    }

    #[tokio::test]
    async fn place_order_writes_order_and_cart_together() {
        let store = InMemoryStore::new();
        let owner = Owner::Session("s-9".to_string());
        let mut cart = Cart::new(owner.clone(), Utc::now());
        cart.add_item(
            CartItem::new("P1", "Kettle", VendorId::new(), Money::from_rupees(900), 1),
            Utc::now(),
        )
        .unwrap();
        store.save_cart(&cart).await.unwrap();

        let order = order_at(Utc::now());
        let mut emptied = cart.clone();
        emptied.clear(Utc::now());

        store.fail_cart_writes().await;
        assert!(matches!(
            store.place_order(&order, &emptied).await,
            Err(StoreError::Database(_))
        ));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.get_cart(&owner).await.unwrap().unwrap().items().len(), 1);

        store.clear_failures().await;
        store.place_order(&order, &emptied).await.unwrap();
        assert_eq!(store.order_count().await, 1);
        assert!(store.get_cart(&owner).await.unwrap().unwrap().is_empty());

        // A repeated placement leaves the stored cart alone.
        assert!(matches!(
            store.place_order(&order, &cart).await,
            Err(StoreError::DuplicateOrder(_))
        ));
        assert!(store.get_cart(&owner).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_order_only_touches_mutable_fields() {
        let store = InMemoryStore::new();
        let order = order_at(Utc::now());
        store.insert_order(&order).await.unwrap();

        let mut parts = order.clone().into_parts();
        parts.status = OrderStatus::Processing;
        parts.contact_email = "someone-else@example.com".to_string();
        parts.total_amount = Money::from_rupees(1);
        store.update_order(&Order::from_parts(parts)).await.unwrap();

        let stored = store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Processing);
        assert_eq!(stored.contact_email(), "anil@example.com");
        assert_eq!(stored.total_amount(), order.total_amount());
    }

    #[tokio::test]
    async fn update_unknown_order_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.update_order(&order_at(Utc::now())).await;
        assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn query_orders_sorted_and_limited() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        for hours in [10, 30, 20] {
            store.insert_order(&order_at(now - Duration::hours(hours))).await.unwrap();
        }

        let orders = store.query_orders(OrderQuery::new().limit(2)).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders[0].created_at() < orders[1].created_at());
        assert_eq!(orders[0].created_at(), now - Duration::hours(30));
    }

    #[tokio::test]
    async fn idle_carts_filter() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let old = now - Duration::hours(3);

        let mut idle = Cart::new(Owner::Session("s-1".into()), old);
        idle.add_item(CartItem::new("P", "Pen", VendorId::new(), Money::from_rupees(50), 1), old)
            .unwrap();
        idle.set_contact_email("guest@example.com", old);
        store.save_cart(&idle).await.unwrap();

        let mut no_email = Cart::new(Owner::Session("s-2".into()), old);
        no_email
            .add_item(CartItem::new("P", "Pen", VendorId::new(), Money::from_rupees(50), 1), old)
            .unwrap();
        store.save_cart(&no_email).await.unwrap();

        let empty = Cart::new(Owner::Session("s-3".into()), old);
        store.save_cart(&empty).await.unwrap();

        let carts = store.idle_carts(now - Duration::hours(1), None).await.unwrap();
        assert_eq!(carts.len(), 1);
        assert_eq!(carts[0].owner(), &Owner::Session("s-1".into()));

        let mut notified = carts[0].clone();
        notified.mark_abandoned_notified(now);
        store.save_cart(&notified).await.unwrap();
        assert!(store.idle_carts(now - Duration::hours(1), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_vendors_skips_unknown_ids() {
        let store = InMemoryStore::new();
        let vendor = VendorProfile::new("Kala Crafts", "kala@vendors.in", Utc::now());
        store.save_vendor(&vendor).await.unwrap();

        let map = store.get_vendors(&[vendor.id, VendorId::new()]).await.unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&vendor.id));
    }

    #[tokio::test]
    async fn pincode_upsert_replaces_same_area() {
        let store = InMemoryStore::new();
        let pin = Pincode::parse("560001").unwrap();
        let record = |area: &str, cod| PlatformPincode {
            pincode: pin.clone(),
            area: area.to_string(),
            district: None,
            state: None,
            courier: None,
            cod_available: cod,
            zone: None,
        };

        store
            .upsert_platform_pincodes(&[record("MG Road", false), record("Shivajinagar", true)])
            .await
            .unwrap();
        store.upsert_platform_pincodes(&[record("MG Road", true)]).await.unwrap();

        let records = store.platform_pincodes(&pin).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.cod_available));
        assert_eq!(records[0].area, "MG Road");
    }

    #[tokio::test]
    async fn shipment_versions_detect_conflicts() {
        let store = InMemoryStore::new();
        let order = order_at(Utc::now());
        let mut shipment = shipment_for(&order);

        let v1 = store.save_shipment(&shipment).await.unwrap();
        assert_eq!(v1, 1);

        // A second writer that also believes the record is new loses.
        let result = store.save_shipment(&shipment).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { expected: 0, actual: 1, .. })
        ));

        shipment.version = v1;
        shipment.begin_dispatch(Utc::now());
        assert_eq!(store.save_shipment(&shipment).await.unwrap(), 2);

        let stored = store.get_shipment(order.id(), shipment.vendor_id).await.unwrap().unwrap();
        assert_eq!(stored.state, DispatchState::Dispatching);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn shipments_by_state_and_awb() {
        let store = InMemoryStore::new();
        let order = order_at(Utc::now());
        let mut shipment = shipment_for(&order);
        shipment.mark_sent(
            domain::CarrierRef {
                carrier_order_id: "SR-1".into(),
                shipment_id: "SH-1".into(),
                awb_code: Some("AWB123".into()),
                courier_name: None,
            },
            Some("NEW".into()),
            Utc::now(),
        );
        store.save_shipment(&shipment).await.unwrap();

        let found = store.find_shipment_by_awb("AWB123").await.unwrap().unwrap();
        assert_eq!(found.order_id, order.id());
        assert!(store.find_shipment_by_awb("nope").await.unwrap().is_none());

        let failed = store
            .shipments_in_states(&[DispatchState::Failed, DispatchState::Pending], None)
            .await
            .unwrap();
        assert!(failed.is_empty());
        let sent = store.shipments_in_states(&[DispatchState::Sent], Some(5)).await.unwrap();
        assert_eq!(sent.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_backlog_skips_closed_orders() {
        let store = InMemoryStore::new();
        let start = Utc::now() - Duration::hours(3);

        let mut ids = Vec::new();
        for n in 0..3 {
            let order = order_at(start);
            store.insert_order(&order).await.unwrap();
            let mut shipment = shipment_for(&order);
            shipment.mark_failed("timeout".to_string(), true, start + Duration::minutes(n));
            store.save_shipment(&shipment).await.unwrap();
            ids.push(order.id());
        }

        let mut cancelled = store.get_order(ids[1]).await.unwrap().unwrap();
        cancelled.transition_to(OrderStatus::Cancelled, Utc::now()).unwrap();
        store.update_order(&cancelled).await.unwrap();

        let backlog = store
            .dispatch_backlog(&[DispatchState::Failed, DispatchState::Pending], None)
            .await
            .unwrap();
        assert_eq!(backlog, vec![ids[0], ids[2]]);

        let limited = store.dispatch_backlog(&[DispatchState::Failed], Some(1)).await.unwrap();
        assert_eq!(limited, vec![ids[0]]);
        assert!(store.dispatch_backlog(&[DispatchState::Skipped], None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scripted_shipment_write_failures() {
        let store = InMemoryStore::new();
        let order = order_at(Utc::now());
        let shipment = shipment_for(&order);

        store.fail_shipment_writes(shipment.vendor_id).await;
        assert!(matches!(
            store.save_shipment(&shipment).await,
            Err(StoreError::Database(_))
        ));
        assert_eq!(store.shipment_count().await, 0);

        store.clear_failures().await;
        assert_eq!(store.save_shipment(&shipment).await.unwrap(), 1);
    }
}
