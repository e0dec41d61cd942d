use chrono::{DateTime, Utc};
use domain::{Order, OrderStatus};

/// Builder for the time-windowed order queries the batch jobs run.
///
/// Every filter is optional; an empty query matches all orders. Results are
/// ordered by creation time, oldest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by status (any of these).
    pub statuses: Option<Vec<OrderStatus>>,

    /// Orders created strictly before this instant.
    pub created_before: Option<DateTime<Utc>>,

    /// Orders delivered at or after this instant.
    pub delivered_from: Option<DateTime<Utc>>,

    /// Orders delivered strictly before this instant.
    pub delivered_before: Option<DateTime<Utc>>,

    /// Only orders that have not been sent a review request.
    pub without_review_request: bool,

    /// Only orders that have not raised an SLA alert.
    pub without_sla_alert: bool,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by a single status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.statuses = Some(vec![status]);
        self
    }

    /// Filters by several statuses (any of these).
    pub fn statuses(mut self, statuses: impl Into<Vec<OrderStatus>>) -> Self {
        self.statuses = Some(statuses.into());
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    /// Filters to orders delivered inside `[from, before)`.
    pub fn delivered_between(mut self, from: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        self.delivered_from = Some(from);
        self.delivered_before = Some(before);
        self
    }

    pub fn delivered_before(mut self, at: DateTime<Utc>) -> Self {
        self.delivered_before = Some(at);
        self
    }

    pub fn without_review_request(mut self) -> Self {
        self.without_review_request = true;
        self
    }

    pub fn without_sla_alert(mut self) -> Self {
        self.without_sla_alert = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Applies an optional limit, as passed on the command line.
    pub fn limit_opt(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Returns true if the order passes every filter except the limit.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(ref statuses) = self.statuses
            && !statuses.contains(&order.status())
        {
            return false;
        }
        if let Some(before) = self.created_before
            && order.created_at() >= before
        {
            return false;
        }
        if self.delivered_from.is_some() || self.delivered_before.is_some() {
            let Some(delivered_at) = order.delivered_at() else {
                return false;
            };
            if let Some(from) = self.delivered_from
                && delivered_at < from
            {
                return false;
            }
            if let Some(before) = self.delivered_before
                && delivered_at >= before
            {
                return false;
            }
        }
        if self.without_review_request && order.review_requested_at().is_some() {
            return false;
        }
        if self.without_sla_alert && order.sla_alerted_at().is_some() {
            return false;
        }
        true
    }
}
