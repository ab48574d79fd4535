//! Population selection: the "valid delivery" rule and the user's filters.
//!
//! Filters only select; they hand back clones of the rows they keep and never
//! touch the source table.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::types::{
    DeliveryRecord, OUTCOME_SUCCESS, OUTCOME_UNDEFINED, STATUS_CANCELLED, STATUS_DONE,
};

/// Completed and successful, or outcome unknown but not cancelled.
pub fn is_valid_delivery(r: &DeliveryRecord) -> bool {
    let status = r.status.as_deref();
    let outcome = r.outcome_status.as_deref();
    (status == Some(STATUS_DONE) && outcome == Some(OUTCOME_SUCCESS))
        || (outcome == Some(OUTCOME_UNDEFINED) && status != Some(STATUS_CANCELLED))
}

pub fn business_filter(data: &[DeliveryRecord]) -> Vec<DeliveryRecord> {
    data.iter().filter(|r| is_valid_delivery(r)).cloned().collect()
}

/// Date range plus categorical selections. An empty set places no
/// constraint on its dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSpec {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub zones: BTreeSet<String>,
    pub riders: BTreeSet<String>,
    pub clients: BTreeSet<String>,
    pub sellers: BTreeSet<String>,
}

impl FilterSpec {
    pub fn new(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            date_from,
            date_to,
            zones: BTreeSet::new(),
            riders: BTreeSet::new(),
            clients: BTreeSet::new(),
            sellers: BTreeSet::new(),
        }
    }

    /// First of `today`'s month through `today`.
    pub fn current_month(today: NaiveDate) -> Self {
        let first = today.with_day(1).unwrap_or(today);
        Self::new(first, today)
    }

    pub fn matches(&self, r: &DeliveryRecord) -> bool {
        let in_range = r
            .date
            .is_some_and(|d| d >= self.date_from && d <= self.date_to);
        in_range
            && selected(&self.zones, r.zone.as_deref())
            && selected(&self.riders, r.rider.as_deref())
            && selected(&self.clients, r.client.as_deref())
            && selected(&self.sellers, r.seller.as_deref())
    }
}

fn selected(set: &BTreeSet<String>, value: Option<&str>) -> bool {
    set.is_empty() || value.is_some_and(|v| set.contains(v))
}

pub fn apply_filters(data: &[DeliveryRecord], spec: &FilterSpec) -> Vec<DeliveryRecord> {
    data.iter().filter(|r| spec.matches(r)).cloned().collect()
}

/// Choices offered for each categorical filter: sorted, distinct, non-null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub zones: Vec<String>,
    pub riders: Vec<String>,
    pub clients: Vec<String>,
    pub sellers: Vec<String>,
}

impl FilterOptions {
    pub fn from_records(data: &[DeliveryRecord]) -> Self {
        fn distinct<'a>(values: impl Iterator<Item = Option<&'a String>>) -> Vec<String> {
            values
                .flatten()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        }
        Self {
            zones: distinct(data.iter().map(|r| r.zone.as_ref())),
            riders: distinct(data.iter().map(|r| r.rider.as_ref())),
            clients: distinct(data.iter().map(|r| r.client.as_ref())),
            sellers: distinct(data.iter().map(|r| r.seller.as_ref())),
        }
    }
}
