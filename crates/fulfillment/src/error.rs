//! Fulfillment error types.

use common::{OrderId, Pincode, VendorId};
use domain::{CartError, DispatchState, OrderError, OrderStatus, ServiceabilityIssue};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// A vendor in the cart that cannot deliver to the checkout pincode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnserviceableVendor {
    pub vendor_id: VendorId,
    pub pincode: Pincode,
    pub issue: ServiceabilityIssue,
}

impl std::fmt::Display for UnserviceableVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vendor {}: {}", self.vendor_id, self.issue.describe())
    }
}

/// Errors that can occur during fulfillment operations.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order's status does not allow carrier dispatch.
    #[error("Order {order_id} cannot be dispatched in status {status}")]
    NotDispatchable { order_id: OrderId, status: OrderStatus },

    #[error("No shipment record for order {order_id} and vendor {vendor_id}")]
    ShipmentNotFound { order_id: OrderId, vendor_id: VendorId },

    /// Only rejected, failed or stuck records can be reset.
    #[error("Shipment {order_id}/{vendor_id} cannot be reset from {state}")]
    ResetNotAllowed {
        order_id: OrderId,
        vendor_id: VendorId,
        state: DispatchState,
    },

    #[error("No shipment with AWB {0}")]
    UnknownAwb(String),

    #[error("Nothing to check out: the cart is empty")]
    EmptyCart,

    /// At least one vendor in the cart cannot deliver to the pincode.
    #[error("Cannot deliver to {pincode}: {}", format_vendors(.vendors))]
    Unserviceable {
        pincode: Pincode,
        vendors: Vec<UnserviceableVendor>,
    },

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

fn format_vendors(vendors: &[UnserviceableVendor]) -> String {
    vendors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
