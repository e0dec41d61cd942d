//! Per-vendor-group dispatch record.
//!
//! Every vendor group of an order has exactly one shipment record keyed by
//! `(order_id, vendor_id)`. The record's [`DispatchState`] is what makes
//! carrier dispatch retry-safe: a group is only sent when its record says it
//! has not been sent yet.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, VendorId};
use serde::{Deserialize, Serialize};

use crate::splitter::VendorGroup;

/// Dispatch lifecycle of one vendor group.
///
/// State transitions:
/// ```text
/// Pending | Failed | Skipped ──► Dispatching ──┬──► Sent
///                                              ├──► Failed    (retryable)
///                                              └──► Rejected  (needs an operator)
/// Rejected | Failed | Dispatching ──(operator reset)──► Pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchState {
    /// Not yet sent to the carrier.
    #[default]
    Pending,
    /// Claimed by a dispatcher; the carrier call is in flight.
    Dispatching,
    /// The carrier accepted the shipment.
    Sent,
    /// The last attempt failed with a transient error.
    Failed,
    /// The carrier refused the shipment; retrying will not help.
    Rejected,
    /// The vendor is misconfigured, nothing was sent.
    Skipped,
}

impl DispatchState {
    pub const ALL: [DispatchState; 6] = [
        DispatchState::Pending,
        DispatchState::Dispatching,
        DispatchState::Sent,
        DispatchState::Failed,
        DispatchState::Rejected,
        DispatchState::Skipped,
    ];

    /// Returns true if a dispatcher may claim the group and call the carrier.
    pub fn is_dispatchable(&self) -> bool {
        matches!(
            self,
            DispatchState::Pending | DispatchState::Failed | DispatchState::Skipped
        )
    }

    /// Returns true if an operator may put the group back to `Pending`.
    pub fn can_reset(&self) -> bool {
        matches!(
            self,
            DispatchState::Rejected | DispatchState::Failed | DispatchState::Dispatching
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchState::Pending => "PENDING",
            DispatchState::Dispatching => "DISPATCHING",
            DispatchState::Sent => "SENT",
            DispatchState::Failed => "FAILED",
            DispatchState::Rejected => "REJECTED",
            DispatchState::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DispatchState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DispatchState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown dispatch state '{s}'"))
    }
}

/// Identifiers the carrier returned for a created shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierRef {
    pub carrier_order_id: String,
    pub shipment_id: String,
    #[serde(default)]
    pub awb_code: Option<String>,
    #[serde(default)]
    pub courier_name: Option<String>,
}

/// Dispatch record of one vendor group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub order_id: OrderId,
    pub vendor_id: VendorId,
    pub state: DispatchState,
    pub item_ids: Vec<OrderItemId>,
    pub sub_total: Money,
    pub carrier: Option<CarrierRef>,
    /// Latest status string reported by the carrier.
    pub carrier_status: Option<String>,
    pub last_error: Option<String>,
    pub attempts: u32,
    /// Optimistic concurrency version; 0 means never persisted.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Shipment {
    /// A fresh, unsent record for a vendor group.
    pub fn for_group(order_id: OrderId, group: &VendorGroup, now: DateTime<Utc>) -> Self {
        Self {
            order_id,
            vendor_id: group.vendor_id,
            state: DispatchState::Pending,
            item_ids: group.item_ids(),
            sub_total: group.sub_total,
            carrier: None,
            carrier_status: None,
            last_error: None,
            attempts: 0,
            version: 0,
            created_at: now,
            updated_at: now,
            dispatched_at: None,
            delivered_at: None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }

    pub fn awb_code(&self) -> Option<&str> {
        self.carrier.as_ref().and_then(|c| c.awb_code.as_deref())
    }

    /// Claims the group for a carrier call.
    pub fn begin_dispatch(&mut self, now: DateTime<Utc>) {
        self.state = DispatchState::Dispatching;
        self.attempts += 1;
        self.updated_at = now;
    }

    pub fn mark_sent(&mut self, carrier: CarrierRef, status: Option<String>, now: DateTime<Utc>) {
        self.state = DispatchState::Sent;
        self.carrier = Some(carrier);
        self.carrier_status = status;
        self.last_error = None;
        self.dispatched_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, retryable: bool, now: DateTime<Utc>) {
        self.state = if retryable {
            DispatchState::Failed
        } else {
            DispatchState::Rejected
        };
        self.last_error = Some(error.into());
        self.updated_at = now;
    }

    pub fn mark_skipped(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.state = DispatchState::Skipped;
        self.last_error = Some(reason.into());
        self.updated_at = now;
    }

    /// Operator reset back to `Pending`.
    pub fn reset(&mut self, now: DateTime<Utc>) -> bool {
        if !self.state.can_reset() {
            return false;
        }
        self.state = DispatchState::Pending;
        self.updated_at = now;
        true
    }

    /// Records a carrier tracking update.
    pub fn record_tracking(&mut self, status: impl Into<String>, delivered: bool, now: DateTime<Utc>) {
        self.carrier_status = Some(status.into());
        if delivered && self.delivered_at.is_none() {
            self.delivered_at = Some(now);
        }
        self.updated_at = now;
    }
}
