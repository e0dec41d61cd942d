//! Value objects for the order domain.

use common::{Money, OrderItemId, Pincode, UserId, VendorId};
use serde::{Deserialize, Serialize};

use super::OrderError;

/// Product identifier (SKU-like catalog key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Who an order or cart belongs to: a registered user, or a guest session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    User(UserId),
    Session(String),
}

impl Owner {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Owner::User(id) => Some(*id),
            Owner::Session(_) => None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Owner::User(_) => None,
            Owner::Session(id) => Some(id),
        }
    }

    /// Builds an owner from the optional identifiers carried by a request.
    ///
    /// A user id wins over a session id when both are present.
    pub fn from_parts(user_id: Option<UserId>, session_id: Option<String>) -> Option<Owner> {
        match (user_id, session_id) {
            (Some(user), _) => Some(Owner::User(user)),
            (None, Some(session)) if !session.trim().is_empty() => Some(Owner::Session(session)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::User(id) => write!(f, "user:{id}"),
            Owner::Session(id) => write!(f, "session:{id}"),
        }
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentMethod {
    #[default]
    Prepaid,
    Cod,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Prepaid => "Prepaid",
            PaymentMethod::Cod => "COD",
        }
    }

    pub fn is_cod(&self) -> bool {
        matches!(self, PaymentMethod::Cod)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prepaid" => Ok(PaymentMethod::Prepaid),
            "cod" => Ok(PaymentMethod::Cod),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// Delivery address captured at checkout. Never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: Pincode,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "India".to_string()
}

impl ShippingAddress {
    /// Checks that every mandatory field carries a value.
    pub fn validate(&self) -> Result<(), OrderError> {
        let fields = [
            ("name", &self.name),
            ("phone", &self.phone),
            ("address_line1", &self.address_line1),
            ("city", &self.city),
            ("state", &self.state),
        ];
        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(OrderError::InvalidAddress { field: *field }),
            None => Ok(()),
        }
    }

    /// Single-line street address as carriers expect it.
    pub fn street(&self) -> String {
        match self.address_line2.as_deref().map(str::trim) {
            Some(line2) if !line2.is_empty() => format!("{}, {}", self.address_line1, line2),
            _ => self.address_line1.clone(),
        }
    }
}

/// Default parcel weight for items whose catalog entry has none.
pub const DEFAULT_ITEM_WEIGHT_GRAMS: u32 = 500;

/// Largest quantity a single line may carry.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

/// Largest unit price accepted for a line (₹1 crore).
pub const MAX_UNIT_PRICE: Money = Money::from_paise(1_000_000_000);

/// A line of a placed order.
///
/// The vendor is copied from the product when the order is created, so vendor
/// grouping survives later catalog changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub vendor_id: VendorId,
    pub quantity: u32,
    /// Price per unit captured at purchase time.
    pub unit_price: Money,
    pub weight_grams: u32,
}

impl OrderItem {
    /// Creates a new order item; the SKU defaults to the product id.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        vendor_id: VendorId,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        let product_id = product_id.into();
        Self {
            id: OrderItemId::new(),
            sku: product_id.to_string(),
            product_id,
            product_name: product_name.into(),
            vendor_id,
            quantity,
            unit_price,
            weight_grams: DEFAULT_ITEM_WEIGHT_GRAMS,
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = sku.into();
        self
    }

    pub fn with_weight_grams(mut self, weight_grams: u32) -> Self {
        self.weight_grams = weight_grams;
        self
    }

    /// Returns the line total (quantity × unit price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    pub(crate) fn validate(&self) -> Result<(), OrderError> {
        if self.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: self.product_id.to_string(),
            });
        }
        if self.quantity > MAX_LINE_QUANTITY {
            return Err(OrderError::QuantityTooLarge {
                product_id: self.product_id.to_string(),
                quantity: self.quantity,
            });
        }
        if !self.unit_price.is_positive() {
            return Err(OrderError::InvalidPrice {
                product_id: self.product_id.to_string(),
                price: self.unit_price.paise(),
            });
        }
        if self.unit_price > MAX_UNIT_PRICE {
            return Err(OrderError::PriceTooLarge {
                product_id: self.product_id.to_string(),
                price: self.unit_price.paise(),
            });
        }
        Ok(())
    }
}
