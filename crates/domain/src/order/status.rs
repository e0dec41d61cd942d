//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending    ──► Processing | OnHold | Cancelled | Failed
/// Processing ──► Shipped | OnHold | Cancelled
/// OnHold     ──► Pending | Processing | Cancelled
/// Shipped    ──► Delivered | Returned
/// Delivered  ──► Returned | Refunded
/// Cancelled | Failed | Returned ──► Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Placed, awaiting carrier dispatch.
    #[default]
    Pending,

    /// Every vendor group has a carrier shipment.
    Processing,

    /// At least one shipment is moving.
    Shipped,

    /// Every shipment was delivered.
    Delivered,

    /// Cancelled before shipping.
    Cancelled,

    /// Needs operator attention (rejected dispatch, vendor misconfiguration).
    OnHold,

    /// Could not be fulfilled.
    Failed,

    /// Money returned to the customer (terminal state).
    Refunded,

    /// Goods came back after delivery or in transit.
    Returned,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::OnHold,
        OrderStatus::Failed,
        OrderStatus::Refunded,
        OrderStatus::Returned,
    ];

    /// Returns true if the order may move from this status to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing | OnHold | Cancelled | Failed)
                | (Processing, Shipped | OnHold | Cancelled)
                | (OnHold, Pending | Processing | Cancelled)
                | (Shipped, Delivered | Returned)
                | (Delivered, Returned | Refunded)
                | (Cancelled | Failed | Returned, Refunded)
        )
    }

    /// Returns true if vendor groups of an order in this status may be sent to the carrier.
    ///
    /// `Shipped` is included because the first parcel of a partially
    /// dispatched order can move before the remaining groups are sent.
    pub fn can_dispatch(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::OnHold | OrderStatus::Shipped
        )
    }

    /// Returns true while the order is waiting on the marketplace to get it moving.
    pub fn is_awaiting_fulfillment(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::OnHold
        )
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Refunded)
    }

    /// Returns the status name as stored and shown to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::OnHold => "ON_HOLD",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Refunded => "REFUNDED",
            OrderStatus::Returned => "RETURNED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown order status '{s}'"))
    }
}
