//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, VendorId};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderItem, OrderStatus, Owner, PaymentMethod, ShippingAddress};

/// Everything needed to place an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub owner: Owner,
    pub contact_email: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

/// Order aggregate root.
///
/// The item set, the address snapshot and the total are fixed at placement.
/// Only the status and the notification markers change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    owner: Owner,
    contact_email: String,
    status: OrderStatus,
    items: Vec<OrderItem>,
    shipping_address: ShippingAddress,
    payment_method: PaymentMethod,
    total_amount: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    review_requested_at: Option<DateTime<Utc>>,
    sla_alerted_at: Option<DateTime<Utc>>,
}

/// Flat view of an order, used by storage backends to persist and restore it.
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub owner: Owner,
    pub contact_email: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub review_requested_at: Option<DateTime<Utc>>,
    pub sla_alerted_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Places a new order in `Pending` status.
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if !new.contact_email.contains('@') {
            return Err(OrderError::InvalidEmail(new.contact_email));
        }
        new.shipping_address.validate()?;
        for item in &new.items {
            item.validate()?;
        }

        let total_amount = new
            .items
            .iter()
            .try_fold(Money::zero(), |total, item| {
                item.unit_price
                    .checked_multiply(item.quantity)
                    .and_then(|line| total.checked_add(line))
            })
            .ok_or(OrderError::TotalOverflow)?;

        Ok(Self {
            id: OrderId::new(),
            owner: new.owner,
            contact_email: new.contact_email,
            status: OrderStatus::Pending,
            items: new.items,
            shipping_address: new.shipping_address,
            payment_method: new.payment_method,
            total_amount,
            created_at: now,
            updated_at: now,
            delivered_at: None,
            review_requested_at: None,
            sla_alerted_at: None,
        })
    }

    /// Rebuilds an order from persisted parts.
    pub fn from_parts(parts: OrderParts) -> Self {
        Self {
            id: parts.id,
            owner: parts.owner,
            contact_email: parts.contact_email,
            status: parts.status,
            items: parts.items,
            shipping_address: parts.shipping_address,
            payment_method: parts.payment_method,
            total_amount: parts.total_amount,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            delivered_at: parts.delivered_at,
            review_requested_at: parts.review_requested_at,
            sla_alerted_at: parts.sla_alerted_at,
        }
    }

    pub fn into_parts(self) -> OrderParts {
        OrderParts {
            id: self.id,
            owner: self.owner,
            contact_email: self.contact_email,
            status: self.status,
            items: self.items,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            total_amount: self.total_amount,
            created_at: self.created_at,
            updated_at: self.updated_at,
            delivered_at: self.delivered_at,
            review_requested_at: self.review_requested_at,
            sla_alerted_at: self.sla_alerted_at,
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn contact_email(&self) -> &str {
        &self.contact_email
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Sum of line totals, recomputed from the items.
    pub fn item_subtotal(&self) -> Money {
        self.items.iter().map(OrderItem::total_price).sum()
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

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn review_requested_at(&self) -> Option<DateTime<Utc>> {
        self.review_requested_at
    }

    pub fn sla_alerted_at(&self) -> Option<DateTime<Utc>> {
        self.sla_alerted_at
    }
}

// Command methods
impl Order {
    /// Moves the order to `next`, enforcing the status state machine.
    pub fn transition_to(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        if next == OrderStatus::Delivered {
            self.delivered_at = Some(now);
        }
        Ok(())
    }

    /// Records that the review request email went out.
    pub fn mark_review_requested(&mut self, now: DateTime<Utc>) {
        self.review_requested_at = Some(now);
        self.updated_at = now;
    }

    /// Records that operations staff were alerted about the SLA breach.
    pub fn mark_sla_alerted(&mut self, now: DateTime<Utc>) {
        self.sla_alerted_at = Some(now);
        self.updated_at = now;
    }
}
