//! Per-zone operating parameters.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigError;

/// Cycle-time ceiling used for zones that have no entry.
pub const DEFAULT_MAX_CYCLE_SECONDS: i64 = 7200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionParameters {
    pub max_cycle_seconds: i64,
    /// Order cutoff, `HH:MM:SS`.
    pub cutoff_time: String,
    /// Target cycle duration, `HH:MM:SS`.
    pub ideal_duration: String,
}

impl RegionParameters {
    fn new(max_cycle_seconds: i64, cutoff_time: &str, ideal_duration: &str) -> Self {
        Self {
            max_cycle_seconds,
            cutoff_time: cutoff_time.to_string(),
            ideal_duration: ideal_duration.to_string(),
        }
    }
}

static BUILTIN: Lazy<HashMap<String, RegionParameters>> = Lazy::new(|| {
    [
        ("PAULISTA - ABREU E LIMA", RegionParameters::new(5400, "16:00:00", "01:30:00")),
        ("IGARASSU", RegionParameters::new(10800, "15:00:00", "03:00:00")),
        ("RECIFE - OLINDA", RegionParameters::new(3600, "16:00:00", "01:00:00")),
        ("PRAIA SUL", RegionParameters::new(7200, "16:00:00", "02:00:00")),
        ("JABOATÃO", RegionParameters::new(10800, "15:00:00", "03:00:00")),
        ("CAMARAGIBE - SÃO LOURENÇO", RegionParameters::new(10800, "15:00:00", "03:00:00")),
    ]
    .into_iter()
    .map(|(zone, params)| (zone.to_string(), params))
    .collect()
});

/// Zone name → parameters. Lookups are by exact name.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionTable {
    entries: HashMap<String, RegionParameters>,
}

impl Default for RegionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RegionTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN.clone(),
        }
    }

    pub fn new(entries: HashMap<String, RegionParameters>) -> Self {
        Self { entries }
    }

    /// Loads a replacement table from a JSON object keyed by zone name:
    /// ```json
    /// { "IGARASSU": { "max_cycle_seconds": 10800, "cutoff_time": "15:00:00", "ideal_duration": "03:00:00" } }
    /// ```
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let entries: HashMap<String, RegionParameters> =
            serde_json::from_str(&content).map_err(|source| ConfigError::Regions {
                path: path.to_string(),
                source,
            })?;
        Ok(Self { entries })
    }

    pub fn get(&self, zone: &str) -> Option<&RegionParameters> {
        self.entries.get(zone)
    }

    pub fn max_cycle_seconds_for(&self, zone: Option<&str>) -> i64 {
        zone.and_then(|z| self.get(z))
            .map(|p| p.max_cycle_seconds)
            .unwrap_or(DEFAULT_MAX_CYCLE_SECONDS)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Values shown on the "Parâmetros por Região" panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionPanel {
    pub ideal_duration: Option<String>,
    pub cutoff_time: Option<String>,
}

impl RegionPanel {
    /// Only a single mapped zone selection has meaningful parameters.
    pub fn for_selection<'a, I>(table: &RegionTable, selected: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut iter = selected.into_iter();
        let params = match (iter.next(), iter.next()) {
            (Some(zone), None) => table.get(zone),
            _ => None,
        };
        Self {
            ideal_duration: params.map(|p| p.ideal_duration.clone()),
            cutoff_time: params.map(|p| p.cutoff_time.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_builtin_lookup_is_exact() {
        let table = RegionTable::builtin();
        assert_eq!(table.len(), 6);
        assert_eq!(table.max_cycle_seconds_for(Some("RECIFE - OLINDA")), 3600);
        assert_eq!(table.max_cycle_seconds_for(Some("recife - olinda")), 7200);
    }

    #[test]
    fn test_unmapped_zone_uses_default() {
        let table = RegionTable::builtin();
        assert_eq!(table.max_cycle_seconds_for(Some("CARUARU")), DEFAULT_MAX_CYCLE_SECONDS);
        assert_eq!(table.max_cycle_seconds_for(None), DEFAULT_MAX_CYCLE_SECONDS);
    }

    #[test]
    fn test_load_from_json() {
        let path = format!("{}/delivery_kpis_regions_test.json", std::env::temp_dir().display());
        std::fs::write(
            &path,
            r#"{"CARUARU": {"max_cycle_seconds": 900, "cutoff_time": "12:00:00", "ideal_duration": "00:15:00"}}"#,
        )
        .unwrap();

        let table = RegionTable::load(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.max_cycle_seconds_for(Some("CARUARU")), 900);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(RegionTable::load("/nonexistent/regions.json").is_err());
    }

    #[test]
    fn test_panel_needs_exactly_one_mapped_zone() {
        let table = RegionTable::builtin();

        let one: BTreeSet<String> = ["IGARASSU".to_string()].into();
        let panel = RegionPanel::for_selection(&table, &one);
        assert_eq!(panel.ideal_duration.as_deref(), Some("03:00:00"));
        assert_eq!(panel.cutoff_time.as_deref(), Some("15:00:00"));

        let two: BTreeSet<String> = ["IGARASSU".to_string(), "PRAIA SUL".to_string()].into();
        assert_eq!(RegionPanel::for_selection(&table, &two).ideal_duration, None);

        let unmapped: BTreeSet<String> = ["CARUARU".to_string()].into();
        assert_eq!(RegionPanel::for_selection(&table, &unmapped).cutoff_time, None);

        let none: BTreeSet<String> = BTreeSet::new();
        assert_eq!(RegionPanel::for_selection(&table, &none).cutoff_time, None);
    }
}
