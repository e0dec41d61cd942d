//! Vendor order splitting.
//!
//! A marketplace order is shipped as one carrier shipment per vendor: each
//! vendor picks up from its own warehouse. The splitter partitions the order
//! lines by vendor and builds the carrier-facing request for every group.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, VendorId};
use serde::{Deserialize, Serialize};

use crate::order::{Order, OrderItem, PaymentMethod, ShippingAddress};
use crate::vendor::{PickupAddress, VendorError, VendorProfile};

/// The lines of an order that belong to one vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorGroup {
    pub vendor_id: VendorId,
    pub items: Vec<OrderItem>,
    pub sub_total: Money,
}

impl VendorGroup {
    pub fn item_ids(&self) -> Vec<OrderItemId> {
        self.items.iter().map(|item| item.id).collect()
    }

    pub fn total_weight_grams(&self) -> u32 {
        self.items
            .iter()
            .map(|item| item.weight_grams.saturating_mul(item.quantity))
            .sum()
    }
}

/// Carrier-facing request for one vendor group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    /// Unique per vendor group; the carrier sees this as its order id.
    pub channel_order_id: String,
    pub order_id: OrderId,
    pub order_date: DateTime<Utc>,
    pub group: VendorGroup,
    pub pickup: PickupAddress,
    pub delivery: ShippingAddress,
    pub contact_email: String,
    pub payment_method: PaymentMethod,
}

impl ShipmentRequest {
    pub fn vendor_id(&self) -> VendorId {
        self.group.vendor_id
    }

    pub fn sub_total(&self) -> Money {
        self.group.sub_total
    }
}

/// A vendor group that cannot be shipped because of vendor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedVendor {
    pub group: VendorGroup,
    pub error: VendorError,
}

/// Output of [`split_by_vendor`].
#[derive(Debug, Clone, Default)]
pub struct SplitOutcome {
    pub requests: Vec<ShipmentRequest>,
    pub skipped: Vec<SkippedVendor>,
}

impl SplitOutcome {
    /// Number of vendor groups, shippable or not.
    pub fn group_count(&self) -> usize {
        self.requests.len() + self.skipped.len()
    }

    /// Sum of all group subtotals, including skipped groups.
    pub fn total(&self) -> Money {
        self.requests
            .iter()
            .map(|request| request.group.sub_total)
            .chain(self.skipped.iter().map(|skipped| skipped.group.sub_total))
            .sum()
    }
}

/// Groups items by vendor, keeping vendors in first-seen order and items in
/// their original order within a group.
pub fn group_by_vendor(items: &[OrderItem]) -> Vec<VendorGroup> {
    let mut groups: Vec<VendorGroup> = Vec::new();
    let mut index: HashMap<VendorId, usize> = HashMap::new();

    for item in items {
        let slot = *index.entry(item.vendor_id).or_insert_with(|| {
            groups.push(VendorGroup {
                vendor_id: item.vendor_id,
                items: Vec::new(),
                sub_total: Money::zero(),
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        group.sub_total += item.total_price();
        group.items.push(item.clone());
    }

    groups
}

/// Builds one shipment request per vendor group of `order`.
///
/// Vendors without a profile or with an incomplete pickup address are
/// reported in [`SplitOutcome::skipped`]; the remaining groups are unaffected.
pub fn split_by_vendor(order: &Order, vendors: &HashMap<VendorId, VendorProfile>) -> SplitOutcome {
    let mut outcome = SplitOutcome::default();

    for group in group_by_vendor(order.items()) {
        let pickup = vendors
            .get(&group.vendor_id)
            .ok_or(VendorError::NotFound(group.vendor_id))
            .and_then(VendorProfile::pickup_address);

        match pickup {
            Ok(pickup) => outcome.requests.push(ShipmentRequest {
                channel_order_id: channel_order_id(order.id(), group.vendor_id),
                order_id: order.id(),
                order_date: order.created_at(),
                group,
                pickup,
                delivery: order.shipping_address().clone(),
                contact_email: order.contact_email().to_string(),
                payment_method: order.payment_method(),
            }),
            Err(error) => {
                tracing::warn!(
                    order_id = %order.id(),
                    vendor_id = %group.vendor_id,
                    %error,
                    "vendor configuration error, skipping shipment"
                );
                outcome.skipped.push(SkippedVendor { group, error });
            }
        }
    }

    outcome
}

/// Carrier order id for a vendor group: `<order id>-<vendor prefix>`.
pub fn channel_order_id(order_id: OrderId, vendor_id: VendorId) -> String {
    format!("{}-{}", order_id, vendor_id.short())
}
