//! Shopping cart: the mutable aggregate that becomes an order at checkout.

use chrono::{DateTime, Utc};
use common::{Money, VendorId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{
    DEFAULT_ITEM_WEIGHT_GRAMS, MAX_LINE_QUANTITY, MAX_UNIT_PRICE, NewOrder, Order, OrderError, OrderItem, Owner, PaymentMethod,
    ProductId, ShippingAddress,
};

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("Cart is empty")]
    Empty,

    #[error("Item not found in cart: {0}")]
    ItemNotFound(ProductId),

    #[error("Invalid quantity: {0} (must be greater than 0)")]
    InvalidQuantity(u32),

    #[error("Quantity for {product_id} cannot exceed {max}")]
    QuantityTooLarge { product_id: ProductId, max: u32 },

    #[error("Invalid price for {product_id}: must be greater than 0")]
    InvalidPrice { product_id: ProductId },

    #[error("Price for {product_id} cannot exceed {max}")]
    PriceTooLarge { product_id: ProductId, max: Money },

    #[error("A contact email is required to check out")]
    MissingContactEmail,

    #[error(transparent)]
    Order(#[from] OrderError),
}

/// A product snapshot sitting in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub product_name: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub vendor_id: VendorId,
    pub unit_price: Money,
    pub quantity: u32,
    #[serde(default)]
    pub weight_grams: Option<u32>,
}

impl CartItem {
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        vendor_id: VendorId,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            sku: None,
            vendor_id,
            unit_price,
            quantity,
            weight_grams: None,
        }
    }

    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    fn to_order_item(&self) -> OrderItem {
        let item = OrderItem::new(
            self.product_id.clone(),
            self.product_name.clone(),
            self.vendor_id,
            self.quantity,
            self.unit_price,
        )
        .with_weight_grams(self.weight_grams.unwrap_or(DEFAULT_ITEM_WEIGHT_GRAMS));
        match &self.sku {
            Some(sku) => item.with_sku(sku.clone()),
            None => item,
        }
    }
}

/// One cart per user or guest session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    owner: Owner,
    items: Vec<CartItem>,
    contact_email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    abandoned_notified_at: Option<DateTime<Utc>>,
}

impl Cart {
    pub fn new(owner: Owner, now: DateTime<Utc>) -> Self {
        Self {
            owner,
            items: Vec::new(),
            contact_email: None,
            created_at: now,
            updated_at: now,
            abandoned_notified_at: None,
        }
    }

    /// Rebuilds a cart from persisted fields.
    pub fn restore(
        owner: Owner,
        items: Vec<CartItem>,
        contact_email: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        abandoned_notified_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            owner,
            items,
            contact_email,
            created_at,
            updated_at,
            abandoned_notified_at,
        }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.contact_email.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn abandoned_notified_at(&self) -> Option<DateTime<Utc>> {
        self.abandoned_notified_at
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::total_price).sum()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Distinct vendors in first-seen order.
    pub fn vendor_ids(&self) -> Vec<VendorId> {
        let mut vendors = Vec::new();
        for item in &self.items {
            if !vendors.contains(&item.vendor_id) {
                vendors.push(item.vendor_id);
            }
        }
        vendors
    }

    /// Adds an item; an existing line for the same product has its quantity
    /// increased and its snapshot refreshed.
    pub fn add_item(&mut self, item: CartItem, now: DateTime<Utc>) -> Result<(), CartError> {
        if item.quantity == 0 {
            return Err(CartError::InvalidQuantity(0));
        }
        if !item.unit_price.is_positive() {
            return Err(CartError::InvalidPrice {
                product_id: item.product_id,
            });
        }
        if item.unit_price > MAX_UNIT_PRICE {
            return Err(CartError::PriceTooLarge {
                product_id: item.product_id,
                max: MAX_UNIT_PRICE,
            });
        }

        match self
            .items
            .iter_mut()
            .find(|existing| existing.product_id == item.product_id)
        {
            Some(existing) => {
                let quantity =
                    checked_line_quantity(&item.product_id, existing.quantity, item.quantity)?;
                *existing = CartItem { quantity, ..item };
            }
            None if item.quantity > MAX_LINE_QUANTITY => {
                return Err(CartError::QuantityTooLarge {
                    product_id: item.product_id,
                    max: MAX_LINE_QUANTITY,
                });
            }
            None => self.items.push(item),
        }
        self.touch(now);
        Ok(())
    }

    /// Sets the quantity of a line; zero removes it.
    pub fn set_quantity(
        &mut self,
        product_id: &ProductId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove_item(product_id, now);
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityTooLarge {
                product_id: product_id.clone(),
                max: MAX_LINE_QUANTITY,
            });
        }
        let item = self
            .items
            .iter_mut()
            .find(|item| &item.product_id == product_id)
            .ok_or_else(|| CartError::ItemNotFound(product_id.clone()))?;
        item.quantity = quantity;
        self.touch(now);
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &ProductId, now: DateTime<Utc>) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|item| &item.product_id != product_id);
        if self.items.len() == before {
            return Err(CartError::ItemNotFound(product_id.clone()));
        }
        self.touch(now);
        Ok(())
    }

    pub fn set_contact_email(&mut self, email: impl Into<String>, now: DateTime<Utc>) {
        self.contact_email = Some(email.into());
        self.touch(now);
    }

    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.touch(now);
    }

    /// Records that the abandoned-cart reminder went out.
    pub fn mark_abandoned_notified(&mut self, now: DateTime<Utc>) {
        self.abandoned_notified_at = Some(now);
    }

    /// Turns the cart into a placed order and empties the cart.
    ///
    /// `contact_email` overrides the email stored on the cart.
    pub fn checkout(
        &mut self,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
        contact_email: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, CartError> {
        if self.items.is_empty() {
            return Err(CartError::Empty);
        }
        let contact_email = contact_email
            .or_else(|| self.contact_email.clone())
            .ok_or(CartError::MissingContactEmail)?;

        let order = Order::place(
            NewOrder {
                owner: self.owner.clone(),
                contact_email,
                items: self.items.iter().map(CartItem::to_order_item).collect(),
                shipping_address,
                payment_method,
            },
            now,
        )?;

        self.clear(now);
        Ok(order)
    }

    // Any change makes the cart eligible for a fresh abandonment reminder.
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.abandoned_notified_at = None;
    }
}

fn checked_line_quantity(product_id: &ProductId, current: u32, added: u32) -> Result<u32, CartError> {
    current
        .checked_add(added)
        .filter(|quantity| *quantity <= MAX_LINE_QUANTITY)
        .ok_or_else(|| CartError::QuantityTooLarge {
            product_id: product_id.clone(),
            max: MAX_LINE_QUANTITY,
        })
}
