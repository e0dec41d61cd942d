//! Domain layer for the marketplace backend.
//!
//! This crate holds the pure model, with no I/O:
//! - Order aggregate with its status state machine
//! - Cart aggregate and checkout into an order
//! - Vendor profiles and carrier pickup addresses
//! - Pincode serviceability rules
//! - Vendor order splitting and the per-group shipment dispatch record

pub mod cart;
pub mod order;
pub mod serviceability;
pub mod shipment;
pub mod splitter;
pub mod vendor;

pub use cart::{Cart, CartError, CartItem};
pub use order::{
    MAX_LINE_QUANTITY, MAX_UNIT_PRICE, NewOrder, Order, OrderError, OrderItem, OrderParts, OrderStatus, Owner, PaymentMethod,
    ProductId, ShippingAddress,
};
pub use serviceability::{
    PlatformPincode, ServiceabilityIssue, ServiceabilityQuery, ServiceabilityVerdict,
    VendorPincode, check_serviceability,
};
pub use shipment::{CarrierRef, DispatchState, Shipment};
pub use splitter::{
    ShipmentRequest, SkippedVendor, SplitOutcome, VendorGroup, group_by_vendor, split_by_vendor,
};
pub use vendor::{PickupAddress, VendorError, VendorProfile};
