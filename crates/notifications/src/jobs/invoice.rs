use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use common::{Money, OrderId, VendorId};
use domain::Order;
use serde::Serialize;

use crate::error::JobError;

/// A calendar month in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct InvoiceMonth {
    year: i32,
    month: u32,
}

impl InvoiceMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    /// The month before the one containing `now`.
    pub fn previous(now: DateTime<Utc>) -> Self {
        let current = Self {
            year: now.year(),
            month: now.month(),
        };
        current.prev()
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    fn prev(self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// First instant of the month.
    pub fn start(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// First instant of the following month.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }
}

impl std::fmt::Display for InvoiceMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for InvoiceMonth {
    type Err = JobError;

    /// Parses `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || JobError::InvalidArgument(format!("expected a month as YYYY-MM, got {s:?}"));

        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

/// One vendor's statement for a month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorInvoice {
    pub vendor_id: VendorId,
    pub month: InvoiceMonth,
    pub gross: Money,
    pub commission_percent: u32,
    pub commission: Money,
    pub payout: Money,
    pub order_count: usize,
    pub units: u32,
}

impl VendorInvoice {
    pub fn new(
        vendor_id: VendorId,
        month: InvoiceMonth,
        gross: Money,
        commission_percent: u32,
        order_count: usize,
        units: u32,
    ) -> Self {
        let commission = gross.percent(commission_percent);
        Self {
            vendor_id,
            month,
            gross,
            commission_percent,
            commission,
            payout: gross - commission,
            order_count,
            units,
        }
    }
}

#[derive(Default)]
struct Tally {
    gross: Money,
    orders: HashSet<OrderId>,
    units: u32,
}

/// Builds per-vendor statements from the month's delivered orders, ordered by vendor id.
pub fn compute_invoices(orders: &[Order], month: InvoiceMonth, commission_percent: u32) -> Vec<VendorInvoice> {
    let mut tallies: BTreeMap<VendorId, Tally> = BTreeMap::new();

    for order in orders {
        for item in order.items() {
            let tally = tallies.entry(item.vendor_id).or_default();
            tally.gross += item.total_price();
            tally.units = tally.units.saturating_add(item.quantity);
            tally.orders.insert(order.id());
        }
    }

    tallies
        .into_iter()
        .map(|(vendor_id, tally)| {
            VendorInvoice::new(
                vendor_id,
                month,
                tally.gross,
                commission_percent,
                tally.orders.len(),
                tally.units,
            )
        })
        .collect()
}
