//! Scheduled batch jobs.
//!
//! Every job is a single pass: one time-windowed query, one action per
//! record, a [`JobSummary`] at the end. Nothing is kept between runs beyond
//! the markers written on the records themselves, so a job can be run from
//! cron as often as needed.

mod invoice;

use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use domain::{DispatchState, OrderStatus};
use fulfillment::{Dispatcher, FulfillmentError};
use serde::Serialize;
use store::{OrderQuery, Store};

use crate::error::{JobError, Result};
use crate::notifier::Notifier;
use crate::templates::Notification;

pub use invoice::{InvoiceMonth, VendorInvoice, compute_invoices};

/// Counts reported by every job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job: &'static str,
    pub examined: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl JobSummary {
    fn new(job: &'static str) -> Self {
        Self {
            job,
            ..Self::default()
        }
    }
}

impl std::fmt::Display for JobSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: examined {}, sent {}, skipped {}, failed {}",
            self.job, self.examined, self.sent, self.skipped, self.failed
        )
    }
}

/// The jobs the `jobs` binary can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    AbandonedCarts,
    ReviewRequests,
    SlaBreaches,
    /// Defaults to the previous month.
    VendorInvoices(Option<InvoiceMonth>),
    RetryDispatch,
}

impl Job {
    pub const NAMES: [&'static str; 5] = [
        "abandoned-carts",
        "review-requests",
        "sla-breaches",
        "vendor-invoices",
        "retry-dispatch",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Job::AbandonedCarts => Self::NAMES[0],
            Job::ReviewRequests => Self::NAMES[1],
            Job::SlaBreaches => Self::NAMES[2],
            Job::VendorInvoices(_) => Self::NAMES[3],
            Job::RetryDispatch => Self::NAMES[4],
        }
    }
}

impl FromStr for Job {
    type Err = JobError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "abandoned-carts" => Ok(Job::AbandonedCarts),
            "review-requests" => Ok(Job::ReviewRequests),
            "sla-breaches" => Ok(Job::SlaBreaches),
            "vendor-invoices" => Ok(Job::VendorInvoices(None)),
            "retry-dispatch" => Ok(Job::RetryDispatch),
            other => Err(JobError::InvalidArgument(format!(
                "unknown job {other:?}, expected one of: {}",
                Self::NAMES.join(", ")
            ))),
        }
    }
}

/// Thresholds for the time-windowed jobs.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub abandoned_cart_after: TimeDelta,
    pub review_request_after: TimeDelta,
    pub sla: TimeDelta,
    pub commission_percent: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            abandoned_cart_after: TimeDelta::minutes(60),
            review_request_after: TimeDelta::days(7),
            sla: TimeDelta::hours(48),
            commission_percent: 10,
        }
    }
}

/// Runs jobs against a store.
pub struct JobRunner<S> {
    store: S,
    notifier: Notifier,
    dispatcher: Dispatcher<S>,
    config: JobConfig,
}

impl<S: Store + Clone> JobRunner<S> {
    pub fn new(store: S, notifier: Notifier, dispatcher: Dispatcher<S>, config: JobConfig) -> Self {
        Self {
            store,
            notifier,
            dispatcher,
            config,
        }
    }

    pub async fn run(&self, job: Job, now: DateTime<Utc>, limit: Option<usize>) -> Result<JobSummary> {
        match job {
            Job::AbandonedCarts => self.abandoned_carts(now, limit).await,
            Job::ReviewRequests => self.review_requests(now, limit).await,
            Job::SlaBreaches => self.sla_breaches(now, limit).await,
            Job::VendorInvoices(month) => {
                let month = month.unwrap_or_else(|| InvoiceMonth::previous(now));
                self.vendor_invoices(month, limit).await
            }
            Job::RetryDispatch => self.retry_dispatch(limit).await,
        }
    }

    /// Reminds owners of carts idle longer than the threshold, once per cart.
    #[tracing::instrument(skip(self))]
    pub async fn abandoned_carts(&self, now: DateTime<Utc>, limit: Option<usize>) -> Result<JobSummary> {
        let mut summary = JobSummary::new(Job::AbandonedCarts.name());
        let carts = self
            .store
            .idle_carts(now - self.config.abandoned_cart_after, limit)
            .await?;

        for mut cart in carts {
            summary.examined += 1;
            let Some(email) = cart.contact_email().map(str::to_string) else {
                summary.skipped += 1;
                continue;
            };

            let delivered = self
                .notifier
                .notify(Notification::AbandonedCart {
                    cart: cart.clone(),
                    email,
                })
                .await;
            if !delivered {
                summary.failed += 1;
                continue;
            }

            cart.mark_abandoned_notified(now);
            self.store.save_cart(&cart).await?;
            summary.sent += 1;
        }

        tracing::info!(%summary, "job finished");
        Ok(summary)
    }

    /// Asks for a review on orders delivered more than the configured time ago.
    #[tracing::instrument(skip(self))]
    pub async fn review_requests(&self, now: DateTime<Utc>, limit: Option<usize>) -> Result<JobSummary> {
        let mut summary = JobSummary::new(Job::ReviewRequests.name());
        let orders = self
            .store
            .query_orders(
                OrderQuery::new()
                    .status(OrderStatus::Delivered)
                    .delivered_before(now - self.config.review_request_after)
                    .without_review_request()
                    .limit_opt(limit),
            )
            .await?;

        for mut order in orders {
            summary.examined += 1;
            if !self.notifier.notify(Notification::ReviewRequest(order.clone())).await {
                summary.failed += 1;
                continue;
            }
            order.mark_review_requested(now);
            self.store.update_order(&order).await?;
            summary.sent += 1;
        }

        tracing::info!(%summary, "job finished");
        Ok(summary)
    }

    /// Alerts ops about orders stuck before shipping for longer than the SLA.
    ///
    /// Without an ops address the alerts are logged and the orders are left
    /// unmarked, so they are reported again on the next run.
    #[tracing::instrument(skip(self))]
    pub async fn sla_breaches(&self, now: DateTime<Utc>, limit: Option<usize>) -> Result<JobSummary> {
        let mut summary = JobSummary::new(Job::SlaBreaches.name());
        let orders = self
            .store
            .query_orders(
                OrderQuery::new()
                    .statuses([OrderStatus::Pending, OrderStatus::Processing, OrderStatus::OnHold])
                    .created_before(now - self.config.sla)
                    .without_sla_alert()
                    .limit_opt(limit),
            )
            .await?;

        for mut order in orders {
            summary.examined += 1;
            let age_hours = (now - order.created_at()).num_hours();
            let delivered = self
                .notifier
                .notify(Notification::SlaBreach {
                    order: order.clone(),
                    age_hours,
                })
                .await;

            if !self.notifier.has_ops_address() {
                summary.skipped += 1;
                continue;
            }
            if !delivered {
                summary.failed += 1;
                continue;
            }
            order.mark_sla_alerted(now);
            self.store.update_order(&order).await?;
            summary.sent += 1;
        }

        tracing::info!(%summary, "job finished");
        Ok(summary)
    }

    /// Emails every vendor with delivered sales in the month its statement.
    #[tracing::instrument(skip(self, month), fields(month = %month))]
    pub async fn vendor_invoices(&self, month: InvoiceMonth, limit: Option<usize>) -> Result<JobSummary> {
        let mut summary = JobSummary::new(Job::VendorInvoices(None).name());
        let orders = self
            .store
            .query_orders(
                OrderQuery::new()
                    .status(OrderStatus::Delivered)
                    .delivered_between(month.start(), month.end()),
            )
            .await?;

        let mut invoices = compute_invoices(&orders, month, self.config.commission_percent);
        if let Some(limit) = limit {
            invoices.truncate(limit);
        }
        let vendor_ids: Vec<_> = invoices.iter().map(|i| i.vendor_id).collect();
        let mut vendors = self.store.get_vendors(&vendor_ids).await?;

        for invoice in invoices {
            summary.examined += 1;
            let Some(vendor) = vendors.remove(&invoice.vendor_id) else {
                tracing::warn!(vendor_id = %invoice.vendor_id, "no vendor profile, statement not sent");
                summary.skipped += 1;
                continue;
            };

            if self
                .notifier
                .notify(Notification::VendorInvoice { vendor, invoice })
                .await
            {
                summary.sent += 1;
            } else {
                summary.failed += 1;
            }
        }

        tracing::info!(%summary, "job finished");
        Ok(summary)
    }

    /// Runs the dispatcher again for dispatchable orders with unsent vendor
    /// groups.
    ///
    /// `sent` counts orders that are now fully with the carrier, `skipped`
    /// orders whose status changed before the retry reached them. Ops are
    /// alerted only for rejections and configuration errors first seen in
    /// this run.
    #[tracing::instrument(skip(self))]
    pub async fn retry_dispatch(&self, limit: Option<usize>) -> Result<JobSummary> {
        let mut summary = JobSummary::new(Job::RetryDispatch.name());
        let order_ids = self
            .store
            .dispatch_backlog(
                &[DispatchState::Failed, DispatchState::Pending, DispatchState::Skipped],
                limit,
            )
            .await?;

        for order_id in order_ids {
            summary.examined += 1;
            match self.dispatcher.dispatch_order(order_id).await {
                Ok(report) => {
                    if report.has_new_attention() {
                        self.notifier
                            .notify(Notification::DispatchRejected(report.clone()))
                            .await;
                    }
                    if report.is_complete() {
                        summary.sent += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                Err(FulfillmentError::NotDispatchable { status, .. }) => {
                    tracing::info!(%order_id, %status, "order no longer dispatchable");
                    summary.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(%order_id, error = %e, "dispatch retry failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(%summary, "job finished");
        Ok(summary)
    }
}
