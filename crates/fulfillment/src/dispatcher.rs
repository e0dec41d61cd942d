//! Per-vendor carrier dispatch.
//!
//! An order is split into vendor groups and each group becomes one carrier
//! order. Every group has a persisted [`Shipment`] record; the record is
//! claimed (moved to `Dispatching` under an optimistic version check) before
//! the carrier is called, so two dispatch runs never both send the same
//! group, and a group the carrier accepted is never sent again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{Money, OrderId, VendorId};
use domain::{
    CarrierRef, DispatchState, Order, OrderStatus, Shipment, ShipmentRequest, split_by_vendor,
};
use futures_util::{StreamExt, stream};
use serde::Serialize;
use store::{Store, StoreError};

use crate::carrier::{CarrierClient, CarrierError, CarrierOrder};
use crate::error::{FulfillmentError, Result};
use crate::retry::{RetryPolicy, RetryResult, retry_on_transient};

/// Carrier statuses that mean the parcel has left the vendor.
const IN_TRANSIT_STATUSES: &[&str] = &[
    "PICKED UP",
    "SHIPPED",
    "IN TRANSIT",
    "OUT FOR DELIVERY",
    "REACHED AT DESTINATION HUB",
];

const DELIVERED_STATUS: &str = "DELIVERED";

/// Dispatch tuning.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Vendor groups sent at the same time; 1 sends them one by one.
    pub max_concurrency: usize,
    /// Upper bound for a single carrier call.
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            call_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// A group the carrier accepted during this run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchedGroup {
    pub vendor_id: VendorId,
    pub sub_total: Money,
    pub carrier: CarrierRef,
}

/// A group that is not with the carrier after this run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedGroup {
    pub vendor_id: VendorId,
    pub state: DispatchState,
    pub reason: String,
    /// True when a later run may succeed without anyone changing anything.
    pub retryable: bool,
    /// True when this run moved the group into `state` or changed its reason.
    pub changed: bool,
}

/// Outcome of one [`Dispatcher::dispatch_order`] run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub order_id: OrderId,
    pub order_status: OrderStatus,
    pub dispatched: Vec<DispatchedGroup>,
    /// Groups the carrier had already accepted in an earlier run.
    pub already_dispatched: Vec<VendorId>,
    /// Groups claimed by another run that has not finished.
    pub in_flight: Vec<VendorId>,
    pub failed: Vec<FailedGroup>,
}

impl DispatchReport {
    fn new(order_id: OrderId, order_status: OrderStatus) -> Self {
        Self {
            order_id,
            order_status,
            dispatched: Vec::new(),
            already_dispatched: Vec::new(),
            in_flight: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// True when every group is with the carrier.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.in_flight.is_empty()
    }

    /// Groups that need an operator: carrier rejections and vendor
    /// configuration errors.
    pub fn needs_attention(&self) -> impl Iterator<Item = &FailedGroup> {
        self.failed.iter().filter(|f| !f.retryable)
    }

    /// True when this run produced a rejection or configuration error that
    /// was not already on record. Ops alerts key off this so a rerun does
    /// not repeat them.
    pub fn has_new_attention(&self) -> bool {
        self.needs_attention().any(|f| f.changed)
    }
}

/// Result of a carrier tracking update.
#[derive(Debug, Clone)]
pub struct TrackingUpdate {
    pub shipment: Shipment,
    /// The order, when the update changed its status.
    pub order: Option<Order>,
}

enum GroupOutcome {
    Dispatched(DispatchedGroup),
    Failed(FailedGroup),
    /// The carrier answered but the record could not be written; it stays
    /// `Dispatching` until an operator resets it.
    Unrecorded(VendorId),
}

/// Sends orders to the carrier, one shipment per vendor group.
pub struct Dispatcher<S> {
    store: S,
    carrier: Arc<dyn CarrierClient>,
    config: DispatchConfig,
}

impl<S: Clone> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            carrier: Arc::clone(&self.carrier),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> Dispatcher<S> {
    pub fn new(store: S, carrier: Arc<dyn CarrierClient>, config: DispatchConfig) -> Self {
        Self {
            store,
            carrier,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Creates carrier orders for every vendor group of the order that is not
    /// yet with the carrier. A `Shipped` order may still have groups left to
    /// send after a partial dispatch.
    ///
    /// Safe to run again: groups already sent or in flight are left alone,
    /// failed and skipped groups are tried again, rejected groups wait for
    /// [`Dispatcher::reset_shipment`].
    #[tracing::instrument(skip(self), fields(carrier = self.carrier.name()))]
    pub async fn dispatch_order(&self, order_id: OrderId) -> Result<DispatchReport> {
        let mut order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;

        if !order.status().can_dispatch() {
            return Err(FulfillmentError::NotDispatchable {
                order_id,
                status: order.status(),
            });
        }

        let vendors = self.store.get_vendors(&order.vendor_ids()).await?;
        let split = split_by_vendor(&order, &vendors);
        let mut records: HashMap<VendorId, Shipment> = self
            .store
            .get_shipments(order_id)
            .await?
            .into_iter()
            .map(|s| (s.vendor_id, s))
            .collect();

        let mut report = DispatchReport::new(order_id, order.status());
        let mut final_states: Vec<DispatchState> = Vec::with_capacity(split.group_count());
        let now = Utc::now();

        // Vendor configuration errors are recorded without a carrier call.
        for skipped in split.skipped {
            let mut record = records
                .remove(&skipped.group.vendor_id)
                .unwrap_or_else(|| Shipment::for_group(order_id, &skipped.group, now));

            if !record.state.is_dispatchable() {
                final_states.push(record.state);
                Self::report_existing(&mut report, &record);
                continue;
            }

            let previous = record.state;
            let reason = skipped.error.to_string();
            let changed = previous != DispatchState::Skipped
                || record.last_error.as_deref() != Some(reason.as_str());
            record.mark_skipped(reason.clone(), now);
            match self.store.save_shipment(&record).await {
                Ok(_) => {
                    final_states.push(DispatchState::Skipped);
                    report.failed.push(FailedGroup {
                        vendor_id: record.vendor_id,
                        state: DispatchState::Skipped,
                        reason,
                        retryable: false,
                        changed,
                    });
                }
                Err(StoreError::ConcurrencyConflict { .. }) => {
                    final_states.push(DispatchState::Dispatching);
                    report.in_flight.push(record.vendor_id);
                }
                Err(e) => {
                    final_states.push(previous);
                    report.failed.push(Self::unsaved(record.vendor_id, previous, &e));
                }
            }
        }

        // Claim every dispatchable group before any carrier call.
        let mut claimed: Vec<(ShipmentRequest, Shipment, DispatchState)> = Vec::new();
        for request in split.requests {
            let mut record = records
                .remove(&request.vendor_id())
                .unwrap_or_else(|| Shipment::for_group(order_id, &request.group, now));

            if !record.state.is_dispatchable() {
                final_states.push(record.state);
                Self::report_existing(&mut report, &record);
                continue;
            }

            let previous = record.state;
            record.begin_dispatch(now);
            match self.store.save_shipment(&record).await {
                Ok(version) => {
                    record.version = version;
                    claimed.push((request, record, previous));
                }
                Err(StoreError::ConcurrencyConflict { .. }) => {
                    tracing::info!(vendor_id = %record.vendor_id, "group claimed by another run");
                    final_states.push(DispatchState::Dispatching);
                    report.in_flight.push(record.vendor_id);
                }
                // Nothing was claimed, so the stored record keeps its state.
                Err(e) => {
                    final_states.push(previous);
                    report.failed.push(Self::unsaved(record.vendor_id, previous, &e));
                }
            }
        }

        let outcomes: Vec<GroupOutcome> = stream::iter(claimed)
            .map(|(request, record, previous)| self.dispatch_group(request, record, previous))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                GroupOutcome::Dispatched(group) => {
                    final_states.push(DispatchState::Sent);
                    report.dispatched.push(group);
                }
                GroupOutcome::Failed(group) => {
                    final_states.push(group.state);
                    report.failed.push(group);
                }
                GroupOutcome::Unrecorded(vendor_id) => {
                    final_states.push(DispatchState::Dispatching);
                    report.in_flight.push(vendor_id);
                }
            }
        }

        if let Some(next) = next_order_status(order.status(), &final_states) {
            order.transition_to(next, Utc::now())?;
            self.store.update_order(&order).await?;
            tracing::info!(status = %next, "order status updated after dispatch");
        }
        report.order_status = order.status();

        tracing::info!(
            dispatched = report.dispatched.len(),
            already_dispatched = report.already_dispatched.len(),
            in_flight = report.in_flight.len(),
            failed = report.failed.len(),
            "dispatch run finished"
        );
        Ok(report)
    }

    /// Reports a group whose record this run must not touch.
    fn report_existing(report: &mut DispatchReport, record: &Shipment) {
        match record.state {
            DispatchState::Sent => report.already_dispatched.push(record.vendor_id),
            DispatchState::Dispatching => report.in_flight.push(record.vendor_id),
            state => report.failed.push(FailedGroup {
                vendor_id: record.vendor_id,
                state,
                reason: record
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "rejected by carrier".to_string()),
                retryable: false,
                changed: false,
            }),
        }
    }

    /// A group whose record could not be written; the next run tries again.
    fn unsaved(vendor_id: VendorId, state: DispatchState, error: &StoreError) -> FailedGroup {
        tracing::error!(%vendor_id, %error, "could not write shipment record");
        FailedGroup {
            vendor_id,
            state,
            reason: error.to_string(),
            retryable: true,
            changed: false,
        }
    }

    /// Calls the carrier for one claimed group and records the outcome.
    ///
    /// `previous` is the state the record had before it was claimed.
    #[tracing::instrument(
        skip(self, request, record),
        fields(order_id = %request.order_id, vendor_id = %request.vendor_id())
    )]
    async fn dispatch_group(
        &self,
        request: ShipmentRequest,
        mut record: Shipment,
        previous: DispatchState,
    ) -> GroupOutcome {
        let started = Instant::now();
        let result = retry_on_transient(&self.config.retry, |attempt| {
            let request = &request;
            async move {
                metrics::counter!("dispatch_calls_total").increment(1);
                tracing::debug!(attempt, "calling carrier");
                self.call_carrier(request).await
            }
        })
        .await;
        metrics::histogram!("dispatch_duration_seconds").record(started.elapsed().as_secs_f64());

        let now = Utc::now();
        let failure = match result {
            RetryResult::Success(created) => {
                record.mark_sent(created.carrier_ref(), Some(created.status.clone()), now);
                None
            }
            RetryResult::Exhausted(error) => Some((error, true)),
            RetryResult::PermanentFailure(error) => Some((error, false)),
        };

        if let Some((error, retryable)) = &failure {
            metrics::counter!("dispatch_failures_total", "retryable" => retryable.to_string())
                .increment(1);
            tracing::warn!(%error, retryable, "carrier dispatch failed");
            record.mark_failed(error.to_string(), *retryable, now);
        }

        if let Err(e) = self.store.save_shipment(&record).await {
            tracing::error!(error = %e, state = %record.state, "could not record dispatch outcome");
            return GroupOutcome::Unrecorded(record.vendor_id);
        }

        match (failure, record.carrier) {
            (None, Some(carrier)) => {
                tracing::info!(carrier_order_id = %carrier.carrier_order_id, "group dispatched");
                GroupOutcome::Dispatched(DispatchedGroup {
                    vendor_id: record.vendor_id,
                    sub_total: record.sub_total,
                    carrier,
                })
            }
            (failure, _) => GroupOutcome::Failed(FailedGroup {
                vendor_id: record.vendor_id,
                state: record.state,
                reason: record.last_error.unwrap_or_default(),
                retryable: failure.is_some_and(|(_, retryable)| retryable),
                changed: record.state != previous,
            }),
        }
    }

    async fn call_carrier(&self, request: &ShipmentRequest) -> std::result::Result<CarrierOrder, CarrierError> {
        match tokio::time::timeout(self.config.call_timeout, self.carrier.create_order(request)).await {
            Ok(result) => result,
            Err(_) => Err(CarrierError::Timeout(self.config.call_timeout)),
        }
    }

    /// Operator action: puts a rejected, failed or stuck group back to `Pending`.
    #[tracing::instrument(skip(self))]
    pub async fn reset_shipment(&self, order_id: OrderId, vendor_id: VendorId) -> Result<Shipment> {
        let mut record = self
            .store
            .get_shipment(order_id, vendor_id)
            .await?
            .ok_or(FulfillmentError::ShipmentNotFound { order_id, vendor_id })?;

        let from = record.state;
        if !record.reset(Utc::now()) {
            return Err(FulfillmentError::ResetNotAllowed {
                order_id,
                vendor_id,
                state: from,
            });
        }

        record.version = self.store.save_shipment(&record).await?;
        tracing::info!(%from, "shipment reset to pending");
        Ok(record)
    }

    /// Applies a carrier tracking update to the shipment with this AWB.
    ///
    /// The first in-transit update moves the order to `Shipped`, even when
    /// other groups are still waiting for dispatch; once every shipment of the
    /// order is delivered the order is `Delivered`.
    #[tracing::instrument(skip(self))]
    pub async fn record_tracking(&self, awb_code: &str, status: &str) -> Result<TrackingUpdate> {
        let mut record = self
            .store
            .find_shipment_by_awb(awb_code)
            .await?
            .ok_or_else(|| FulfillmentError::UnknownAwb(awb_code.to_string()))?;

        let normalized = status.trim().replace('_', " ").to_ascii_uppercase();
        let delivered = normalized == DELIVERED_STATUS;
        let in_transit = delivered || IN_TRANSIT_STATUSES.contains(&normalized.as_str());

        let now = Utc::now();
        record.record_tracking(normalized.clone(), delivered, now);
        record.version = self.store.save_shipment(&record).await?;

        let mut order = self
            .store
            .get_order(record.order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(record.order_id))?;
        let before = order.status();

        // A partially dispatched order is still Pending or OnHold when its
        // first parcel moves.
        if in_transit && matches!(order.status(), OrderStatus::Pending | OrderStatus::OnHold) {
            order.transition_to(OrderStatus::Processing, now)?;
        }
        if in_transit && order.status() == OrderStatus::Processing {
            order.transition_to(OrderStatus::Shipped, now)?;
        }
        if delivered && order.status() == OrderStatus::Shipped {
            let shipments = self.store.get_shipments(record.order_id).await?;
            if shipments.iter().all(Shipment::is_delivered) {
                order.transition_to(OrderStatus::Delivered, now)?;
            }
        }

        let order = if order.status() != before {
            self.store.update_order(&order).await?;
            tracing::info!(order_id = %order.id(), from = %before, to = %order.status(), "order status updated from tracking");
            Some(order)
        } else {
            None
        };

        Ok(TrackingUpdate {
            shipment: record,
            order,
        })
    }
}

/// Order status after a dispatch run, given the state of every group.
fn next_order_status(current: OrderStatus, states: &[DispatchState]) -> Option<OrderStatus> {
    let all_sent = !states.is_empty() && states.iter().all(|s| *s == DispatchState::Sent);
    let needs_attention = states
        .iter()
        .any(|s| matches!(s, DispatchState::Rejected | DispatchState::Skipped));

    let next = if all_sent && matches!(current, OrderStatus::Pending | OrderStatus::OnHold) {
        OrderStatus::Processing
    } else if needs_attention && current != OrderStatus::OnHold {
        OrderStatus::OnHold
    } else {
        return None;
    };

    current.can_transition_to(next).then_some(next)
}
