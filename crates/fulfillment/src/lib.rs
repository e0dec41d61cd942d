//! Fulfillment services for multi-vendor orders.
//!
//! - [`CheckoutService`] turns a cart into an order after checking that every
//!   vendor in it can deliver to the shipping pincode.
//! - [`ServiceabilityService`] answers pincode lookups from the stored lists.
//! - [`Dispatcher`] splits an order by vendor and creates one carrier shipment
//!   per vendor group. Each group has a persisted [`domain::Shipment`] record,
//!   so a rerun never re-sends a group the carrier already accepted.

pub mod carrier;
pub mod checkout;
pub mod dispatcher;
pub mod error;
pub mod retry;
pub mod serviceability;

pub use carrier::{CarrierClient, CarrierError, CarrierOrder, InMemoryCarrier, ShiprocketClient};
pub use checkout::{CheckoutRequest, CheckoutService};
pub use dispatcher::{
    DispatchConfig, DispatchReport, DispatchedGroup, Dispatcher, FailedGroup, TrackingUpdate,
};
pub use error::{FulfillmentError, Result, UnserviceableVendor};
pub use retry::{RetryPolicy, RetryResult, Transient, retry_on_transient};
pub use serviceability::ServiceabilityService;
