//! Shared identifiers and value types used across the marketplace crates.

mod ids;
mod money;
mod pincode;

pub use ids::{OrderId, OrderItemId, UserId, VendorId};
pub use money::Money;
pub use pincode::{InvalidPincode, Pincode};
