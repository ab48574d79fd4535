//! Dashboard session: the tables one computation pass works on.
//!
//! A `Session` is a snapshot. Refreshing the cache does not change a session
//! already opened; open a new one to see the new data.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{read_cache, write_cache};
use crate::config::Config;
use crate::error::{ConfigError, EngineError};
use crate::filters::{apply_filters, business_filter, FilterOptions, FilterSpec};
use crate::indicators::{compute_indicators, Indicators};
use crate::loader::{load_and_clean, load_costs};
use crate::regions::{RegionPanel, RegionTable};
use crate::types::{CostRecord, DeliveryRecord};

pub const NO_RECORD: &str = "Sem registro";

/// Latest invoice timestamp as `DD/MM/YYYY HH:MM:SS`.
pub fn last_update_label(data: &[DeliveryRecord]) -> String {
    data.iter()
        .filter_map(|r| r.invoice_timestamp)
        .max()
        .map(|ts: NaiveDateTime| ts.format("%d/%m/%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| NO_RECORD.to_string())
}

/// Everything the presentation layer needs for one filter selection.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub last_update: String,
    pub filters: FilterSpec,
    pub indicators: Result<Indicators, EngineError>,
    pub region_panel: RegionPanel,
}

#[derive(Debug, Clone)]
pub struct Session {
    deliveries: Arc<Vec<DeliveryRecord>>,
    population: Arc<Vec<DeliveryRecord>>,
    costs: Arc<Vec<CostRecord>>,
    regions: RegionTable,
    last_update: String,
}

impl Session {
    pub fn new(deliveries: Vec<DeliveryRecord>, costs: Vec<CostRecord>, regions: RegionTable) -> Self {
        let population = business_filter(&deliveries);
        let last_update = last_update_label(&deliveries);
        Self {
            deliveries: Arc::new(deliveries),
            population: Arc::new(population),
            costs: Arc::new(costs),
            regions,
            last_update,
        }
    }

    /// Reads the cache, rebuilding it from the source when it is missing or
    /// unreadable. A missing source yields an empty session, not an error.
    pub fn open(config: &Config) -> Result<Self, ConfigError> {
        let regions = match &config.regions_path {
            Some(path) => RegionTable::load(path)?,
            None => RegionTable::builtin(),
        };
        let deliveries = load_deliveries(config);
        let costs = load_costs(&config.costs_path);
        let session = Self::new(deliveries, costs, regions);
        info!(
            deliveries = session.deliveries.len(),
            valid = session.population.len(),
            costs = session.costs.len(),
            last_update = %session.last_update,
            "Session opened"
        );
        Ok(session)
    }

    pub fn deliveries(&self) -> &[DeliveryRecord] {
        &self.deliveries
    }

    /// Rows passing the valid-delivery rule.
    pub fn population(&self) -> &[DeliveryRecord] {
        &self.population
    }

    pub fn costs(&self) -> &[CostRecord] {
        &self.costs
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    pub fn last_update(&self) -> &str {
        &self.last_update
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn options(&self) -> FilterOptions {
        FilterOptions::from_records(&self.deliveries)
    }

    pub fn filtered(&self, spec: &FilterSpec) -> Vec<DeliveryRecord> {
        apply_filters(&self.population, spec)
    }

    pub fn view(&self, spec: &FilterSpec) -> DashboardView {
        let filtered = self.filtered(spec);
        let indicators = compute_indicators(&filtered, &self.costs, spec.date_to, &self.regions);
        if let Err(e) = &indicators {
            info!(error = %e, "No indicators for selection");
        }
        DashboardView {
            last_update: self.last_update.clone(),
            filters: spec.clone(),
            indicators,
            region_panel: RegionPanel::for_selection(&self.regions, &spec.zones),
        }
    }
}

fn load_deliveries(config: &Config) -> Vec<DeliveryRecord> {
    match read_cache(&config.cache_path) {
        Ok(rows) => return rows,
        Err(e) => warn!(error = %e, "Cache unusable, rebuilding from source"),
    }
    match load_and_clean(&config.deliveries_path) {
        Ok((rows, _)) if rows.is_empty() => rows,
        Ok((rows, _)) => {
            if let Err(e) = write_cache(&config.cache_path, &rows) {
                warn!(error = %e, "Could not write cache");
            }
            rows
        }
        Err(e) => {
            warn!(error = %e, "No delivery data available");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(day: u32, hour: u32, status: &str, outcome: &str) -> DeliveryRecord {
        let ts = NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 5, 9)
            .unwrap();
        DeliveryRecord {
            order_timestamp: None,
            invoice_timestamp: Some(ts),
            route_assigned_timestamp: None,
            arrived_timestamp: None,
            completed_timestamp: None,
            invoice_value: 10.0,
            freight_value: 1.0,
            zone: Some("IGARASSU".to_string()),
            rider: None,
            client: None,
            seller: None,
            route_name: None,
            service_title: None,
            returned: None,
            status: Some(status.to_string()),
            outcome_status: Some(outcome.to_string()),
            date: Some(ts.date()),
            competence: Some("2024-03".to_string()),
        }
    }

    #[test]
    fn test_last_update_label() {
        let data = vec![row(3, 10, "Realizada", "Sucesso"), row(7, 8, "Realizada", "Sucesso")];
        assert_eq!(last_update_label(&data), "07/03/2024 08:05:09");
        assert_eq!(last_update_label(&[]), NO_RECORD);
    }

    #[test]
    fn test_business_filter_applied_once_at_construction() {
        let session = Session::new(
            vec![row(3, 10, "Realizada", "Sucesso"), row(3, 11, "Cancelada", "Falha")],
            vec![],
            RegionTable::builtin(),
        );
        assert_eq!(session.deliveries().len(), 2);
        assert_eq!(session.population().len(), 1);
    }

    #[test]
    fn test_view_with_and_without_data() {
        let session = Session::new(
            vec![row(3, 10, "Realizada", "Sucesso")],
            vec![],
            RegionTable::builtin(),
        );
        let mut spec = FilterSpec::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        );
        spec.zones.insert("IGARASSU".to_string());

        let view = session.view(&spec);
        assert_eq!(view.indicators.as_ref().unwrap().deliveries, 1);
        assert_eq!(view.region_panel.cutoff_time.as_deref(), Some("15:00:00"));

        spec.date_from = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        spec.date_to = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap();
        assert_eq!(session.view(&spec).indicators, Err(EngineError::NoData));
    }

    #[test]
    fn test_open_without_any_source_is_empty() {
        let config = Config {
            deliveries_path: "/nonexistent/dados.csv".to_string(),
            costs_path: "/nonexistent/custos.csv".to_string(),
            cache_path: std::env::temp_dir().join("delivery_kpis_absent/dados.bin"),
            regions_path: None,
        };
        let session = Session::open(&config).unwrap();
        assert!(session.is_empty());
        assert_eq!(session.last_update(), NO_RECORD);
        assert!(!config.cache_path.exists());
    }
}
