//! Indicator engine.
//!
//! Takes the already filtered population and turns it into the fixed set of
//! delivery KPIs. An empty population is [`EngineError::NoData`]; inside a
//! non-empty one, every ratio with a zero denominator is reported as 0.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::EngineError;
use crate::regions::RegionTable;
use crate::types::{CostRecord, DeliveryRecord};
use crate::util::{competence_of, format_hms, mean_duration, nan_sum, pct, round_to};

/// Text used for a mean duration with nothing to average.
pub const UNDEFINED: &str = "undefined";

/// Routes with more deliveries than this count towards `trips_over_3`.
const BUSY_ROUTE_MIN_EXCLUSIVE: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indicators {
    pub deliveries: usize,
    pub trips: usize,
    pub trips_over_3: usize,
    pub free_freight_count: usize,
    pub free_freight_pct: f64,
    pub returns_count: usize,
    pub returns_pct: f64,
    pub invoice_total: f64,
    pub freight_total: f64,
    pub overdue_count: usize,
    pub overdue_pct: f64,
    pub cycle_over_ideal_count: usize,
    pub cycle_over_ideal_pct: f64,
    pub avg_ticket: f64,
    pub avg_revenue_per_trip: f64,
    pub deliveries_per_trip: f64,
    pub rider_count: usize,
    pub deliveries_per_rider: f64,
    pub total_cost: f64,
    pub cost_per_delivery: f64,
    pub projected_result: f64,
    pub result_pct: f64,
    pub avg_cycle_time: String,
    pub avg_route_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IndicatorValue {
    Count(usize),
    Number(f64),
    Text(String),
}

impl Indicators {
    /// Name → value view, in display order.
    pub fn entries(&self) -> Vec<(&'static str, IndicatorValue)> {
        use IndicatorValue::{Count, Number, Text};
        vec![
            ("deliveries", Count(self.deliveries)),
            ("trips", Count(self.trips)),
            ("tripsOver3", Count(self.trips_over_3)),
            ("freeFreightCount", Count(self.free_freight_count)),
            ("freeFreightPct", Number(self.free_freight_pct)),
            ("returnsCount", Count(self.returns_count)),
            ("returnsPct", Number(self.returns_pct)),
            ("invoiceTotal", Number(self.invoice_total)),
            ("freightTotal", Number(self.freight_total)),
            ("overdueCount", Count(self.overdue_count)),
            ("overduePct", Number(self.overdue_pct)),
            ("cycleOverIdealCount", Count(self.cycle_over_ideal_count)),
            ("cycleOverIdealPct", Number(self.cycle_over_ideal_pct)),
            ("avgTicket", Number(self.avg_ticket)),
            ("avgRevenuePerTrip", Number(self.avg_revenue_per_trip)),
            ("deliveriesPerTrip", Number(self.deliveries_per_trip)),
            ("riderCount", Count(self.rider_count)),
            ("deliveriesPerRider", Number(self.deliveries_per_rider)),
            ("totalCost", Number(self.total_cost)),
            ("costPerDelivery", Number(self.cost_per_delivery)),
            ("projectedResult", Number(self.projected_result)),
            ("resultPct", Number(self.result_pct)),
            ("avgCycleTime", Text(self.avg_cycle_time.clone())),
            ("avgRouteTime", Text(self.avg_route_time.clone())),
        ]
    }

    pub fn to_map(&self) -> HashMap<&'static str, IndicatorValue> {
        self.entries().into_iter().collect()
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn format_mean(values: &[Duration]) -> String {
    mean_duration(values)
        .map(format_hms)
        .unwrap_or_else(|| UNDEFINED.to_string())
}

/// Sum of ledger costs booked for the period containing `period_end`.
pub fn total_cost_for(costs: &[CostRecord], period_end: NaiveDate) -> f64 {
    let competence = competence_of(period_end);
    nan_sum(
        costs
            .iter()
            .filter(|c| c.competence.as_deref() == Some(competence.as_str()))
            .map(|c| c.total_cost),
    )
}

/// Computes every indicator for the population `data`.
///
/// `period_end` picks the cost period; `regions` supplies per-zone cycle
/// ceilings.
pub fn compute_indicators(
    data: &[DeliveryRecord],
    costs: &[CostRecord],
    period_end: NaiveDate,
    regions: &RegionTable,
) -> Result<Indicators, EngineError> {
    let n = data.len();
    if n == 0 {
        return Err(EngineError::NoData);
    }
    let nf = n as f64;

    let mut route_counts: HashMap<&str, usize> = HashMap::new();
    for r in data {
        if let Some(route) = r.route_name.as_deref() {
            *route_counts.entry(route).or_default() += 1;
        }
    }
    let trips = route_counts.len();
    let trips_over_3 = route_counts
        .values()
        .filter(|c| **c > BUSY_ROUTE_MIN_EXCLUSIVE)
        .count();

    let free_freight_count = data.iter().filter(|r| r.freight_value == 0.0).count();
    let returns_count = data.iter().filter(|r| r.is_returned()).count();
    let invoice_total = nan_sum(data.iter().map(|r| r.invoice_value));
    let freight_total = nan_sum(data.iter().map(|r| r.freight_value));

    let overdue_count = data
        .iter()
        .filter(|r| matches!((r.completed_date(), r.date), (Some(c), Some(d)) if c > d))
        .count();

    let same_day: Vec<&DeliveryRecord> = data
        .iter()
        .filter(|r| matches!((r.completed_date(), r.date), (Some(c), Some(d)) if c == d))
        .collect();
    let cycle_over_ideal_count = same_day
        .iter()
        .filter(|r| {
            r.cycle_time().is_some_and(|ct| {
                ct > Duration::seconds(regions.max_cycle_seconds_for(r.zone.as_deref()))
            })
        })
        .count();

    let rider_count = data
        .iter()
        .filter_map(|r| r.rider.as_deref())
        .collect::<HashSet<_>>()
        .len();

    let total_cost = total_cost_for(costs, period_end);
    let result_pct = if total_cost > 0.0 {
        freight_total / total_cost * 100.0
    } else {
        0.0
    };

    let cycle_times: Vec<Duration> = data.iter().filter_map(|r| r.cycle_time()).collect();
    let route_times: Vec<Duration> = data.iter().filter_map(|r| r.route_time()).collect();

    debug!(
        deliveries = n,
        trips,
        same_day = same_day.len(),
        cycle_samples = cycle_times.len(),
        route_samples = route_times.len(),
        "Indicators computed"
    );

    Ok(Indicators {
        deliveries: n,
        trips,
        trips_over_3,
        free_freight_count,
        free_freight_pct: pct(free_freight_count, n),
        returns_count,
        returns_pct: pct(returns_count, n),
        invoice_total,
        freight_total,
        overdue_count,
        overdue_pct: pct(overdue_count, n),
        cycle_over_ideal_count,
        cycle_over_ideal_pct: pct(cycle_over_ideal_count, same_day.len()),
        avg_ticket: invoice_total / nf,
        avg_revenue_per_trip: ratio(invoice_total, trips as f64),
        deliveries_per_trip: ratio(nf, trips as f64),
        rider_count,
        deliveries_per_rider: ratio(nf, rider_count as f64),
        total_cost,
        cost_per_delivery: round_to(total_cost / nf, 1),
        projected_result: freight_total - total_cost,
        result_pct,
        avg_cycle_time: format_mean(&cycle_times),
        avg_route_time: format_mean(&route_times),
    })
}
