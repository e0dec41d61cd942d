//! Order aggregate and related types.

mod aggregate;
mod status;
mod value_objects;

pub use aggregate::{NewOrder, Order, OrderParts};
pub use status::OrderStatus;
pub use value_objects::{
    DEFAULT_ITEM_WEIGHT_GRAMS, MAX_LINE_QUANTITY, MAX_UNIT_PRICE, OrderItem, Owner, PaymentMethod, ProductId, ShippingAddress,
};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order is not in a status that allows the transition.
    #[error("Invalid state transition: cannot move order from {from} to {to}")]
    InvalidStateTransition { from: OrderStatus, to: OrderStatus },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: must be greater than 0")]
    InvalidQuantity { product_id: String },

    #[error("Quantity {quantity} for {product_id} exceeds the per-line limit")]
    QuantityTooLarge { product_id: String, quantity: u32 },

    /// Invalid price.
    #[error("Invalid price for {product_id}: {price} paise (must be greater than 0)")]
    InvalidPrice { product_id: String, price: i64 },

    #[error("Price for {product_id} is above the accepted maximum: {price} paise")]
    PriceTooLarge { product_id: String, price: i64 },

    /// Line totals do not fit in the money range.
    #[error("Order total overflows")]
    TotalOverflow,

    /// A mandatory shipping address field is blank.
    #[error("Shipping address is missing {field}")]
    InvalidAddress { field: &'static str },

    /// Contact email is not usable.
    #[error("Invalid contact email '{0}'")]
    InvalidEmail(String),
}
