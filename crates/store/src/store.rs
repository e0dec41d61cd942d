use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Pincode, VendorId};
use domain::{Cart, DispatchState, Order, Owner, PlatformPincode, Shipment, VendorPincode, VendorProfile};

use crate::{OrderQuery, Result};

/// Persistence of placed orders.
///
/// The item set, the address snapshot and the total are written once by
/// [`OrderStore::insert_order`]. [`OrderStore::update_order`] only writes the
/// status and the timestamps that may change afterwards.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a newly placed order with all of its items.
    ///
    /// Returns `DuplicateOrder` if the id is already taken.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Inserts an order placed from `cart` and saves the emptied cart in one
    /// atomic write. On error neither is stored.
    async fn place_order(&self, order: &Order, cart: &Cart) -> Result<()>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Persists the mutable fields of an existing order.
    ///
    /// Returns `OrderNotFound` if the order was never inserted.
    async fn update_order(&self, order: &Order) -> Result<()>;

    /// Returns orders matching the query, oldest first.
    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;
}

/// Persistence of carts, one per owner.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get_cart(&self, owner: &Owner) -> Result<Option<Cart>>;

    /// Inserts or replaces the owner's cart.
    async fn save_cart(&self, cart: &Cart) -> Result<()>;

    /// Non-empty carts with a contact email, untouched since `idle_since` and
    /// not yet reminded, least recently updated first.
    async fn idle_carts(&self, idle_since: DateTime<Utc>, limit: Option<usize>) -> Result<Vec<Cart>>;
}

#[async_trait]
pub trait VendorStore: Send + Sync {
    /// Inserts or replaces a vendor profile.
    async fn save_vendor(&self, vendor: &VendorProfile) -> Result<()>;

    async fn get_vendor(&self, id: VendorId) -> Result<Option<VendorProfile>>;

    /// Loads the profiles that exist among `ids`; unknown ids are absent from the map.
    async fn get_vendors(&self, ids: &[VendorId]) -> Result<HashMap<VendorId, VendorProfile>>;
}

/// The global platform pincode list and the per-vendor lists.
#[async_trait]
pub trait PincodeStore: Send + Sync {
    /// Upserts on `(pincode, area)`. Returns the number of records written.
    async fn upsert_platform_pincodes(&self, records: &[PlatformPincode]) -> Result<usize>;

    /// Upserts on `(vendor_id, pincode, area)`. Returns the number of records written.
    async fn upsert_vendor_pincodes(&self, records: &[VendorPincode]) -> Result<usize>;

    /// All platform records for a pincode, ordered by area.
    async fn platform_pincodes(&self, pincode: &Pincode) -> Result<Vec<PlatformPincode>>;

    /// The vendor's records for a pincode, ordered by area.
    async fn vendor_pincodes(&self, vendor_id: VendorId, pincode: &Pincode) -> Result<Vec<VendorPincode>>;
}

/// Per-vendor-group dispatch records.
///
/// Writes use optimistic concurrency on [`Shipment::version`]: a record read
/// at version `n` can only be written back while the stored version is still
/// `n`. Version 0 means the record does not exist yet.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// All records of an order, in creation order.
    async fn get_shipments(&self, order_id: OrderId) -> Result<Vec<Shipment>>;

    async fn get_shipment(&self, order_id: OrderId, vendor_id: VendorId) -> Result<Option<Shipment>>;

    /// Writes the record if the stored version still equals `shipment.version`.
    ///
    /// Returns the new version, or `ConcurrencyConflict` if another writer
    /// got there first.
    async fn save_shipment(&self, shipment: &Shipment) -> Result<i64>;

    async fn find_shipment_by_awb(&self, awb_code: &str) -> Result<Option<Shipment>>;

    /// Records currently in any of `states`, least recently updated first.
    async fn shipments_in_states(
        &self,
        states: &[DispatchState],
        limit: Option<usize>,
    ) -> Result<Vec<Shipment>>;

    /// Orders that still allow dispatch and have a record in any of `states`.
    ///
    /// Each order appears once, ordered by its least recently updated
    /// matching record.
    async fn dispatch_backlog(&self, states: &[DispatchState], limit: Option<usize>) -> Result<Vec<OrderId>>;
}

/// Everything the services need from storage.
pub trait Store: OrderStore + CartStore + VendorStore + PincodeStore + ShipmentStore {}

impl<T> Store for T where T: OrderStore + CartStore + VendorStore + PincodeStore + ShipmentStore {}
