//! Paths the dashboard reads and writes.
//!
//! Resolution order: explicit override (CLI flag), then environment variable
//! (a `.env` file is honoured by the binary), then the default.

use std::path::PathBuf;

pub const DEFAULT_DELIVERIES_PATH: &str = "dados.csv";
pub const DEFAULT_COSTS_PATH: &str = "custos.csv";
pub const DEFAULT_CACHE_PATH: &str = "data/dados.bin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub deliveries_path: String,
    pub costs_path: String,
    pub cache_path: PathBuf,
    /// JSON replacement for the built-in region table.
    pub regions_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deliveries_path: DEFAULT_DELIVERIES_PATH.to_string(),
            costs_path: DEFAULT_COSTS_PATH.to_string(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            regions_path: None,
        }
    }
}

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub deliveries_path: Option<String>,
    pub costs_path: Option<String>,
    pub cache_path: Option<PathBuf>,
    pub regions_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            deliveries_path: get("DELIVERIES_PATH").unwrap_or(defaults.deliveries_path),
            costs_path: get("COSTS_PATH").unwrap_or(defaults.costs_path),
            cache_path: get("CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            regions_path: get("REGIONS_PATH"),
        }
    }

    pub fn with_overrides(mut self, o: Overrides) -> Self {
        if let Some(p) = o.deliveries_path {
            self.deliveries_path = p;
        }
        if let Some(p) = o.costs_path {
            self.costs_path = p;
        }
        if let Some(p) = o.cache_path {
            self.cache_path = p;
        }
        if o.regions_path.is_some() {
            self.regions_path = o.regions_path;
        }
        self
    }
}
