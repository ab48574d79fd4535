//! Rebuilding the cache from the delivery source.
//!
//! The old cache stays in place until a complete new table has been written
//! over it. Failures are returned to the caller and never retried here.

use chrono::{Local, NaiveDateTime};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cache::write_cache;
use crate::config::Config;
use crate::error::RefreshError;
use crate::loader::load_and_clean;
use crate::session::last_update_label;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub rows: usize,
    pub parse_errors: usize,
    pub last_update: String,
    pub finished_at: NaiveDateTime,
}

/// Synchronous refresh: read, normalize, swap the cache file.
pub fn refresh_blocking(config: &Config) -> Result<RefreshReport, RefreshError> {
    let (rows, report) = load_and_clean(&config.deliveries_path)?;
    if rows.is_empty() {
        return Err(RefreshError::EmptySource(config.deliveries_path.clone()));
    }
    write_cache(&config.cache_path, &rows)?;
    Ok(RefreshReport {
        rows: rows.len(),
        parse_errors: report.parse_errors,
        last_update: last_update_label(&rows),
        finished_at: Local::now().naive_local(),
    })
}

/// Runs a refresh on the blocking pool and waits for it.
#[tracing::instrument(skip(config), fields(source = %config.deliveries_path))]
pub async fn run_refresh(config: Config) -> Result<RefreshReport, RefreshError> {
    let outcome = tokio::task::spawn_blocking(move || refresh_blocking(&config))
        .await
        .map_err(|e| RefreshError::Aborted(e.to_string()))?;
    match &outcome {
        Ok(report) => info!(rows = report.rows, last_update = %report.last_update, "Refresh complete"),
        Err(e) => error!(error = %e, "Refresh failed; previous cache kept"),
    }
    outcome
}

/// Starts a refresh in the background. Await the handle for the outcome.
pub fn spawn_refresh(config: Config) -> JoinHandle<Result<RefreshReport, RefreshError>> {
    tokio::spawn(run_refresh(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::read_cache;
    use std::env;
    use std::fs;

    fn temp_config(name: &str, source: &str) -> Config {
        let dir = env::temp_dir().join(format!("delivery_kpis_refresh_{}", name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        Config {
            deliveries_path: dir.join(source).display().to_string(),
            costs_path: dir.join("custos.csv").display().to_string(),
            cache_path: dir.join("data/dados.bin"),
            regions_path: None,
        }
    }

    const SOURCE: &str = "\
data_hora_pedido,data_hora_nf,valor_nf,valor_frete,rota_nome
2024-03-05 08:00:00,2024-03-05 09:00:00,50,0,R1
2024-03-06 08:00:00,2024-03-06 11:30:00,50,10,R1
";

    #[tokio::test]
    async fn test_refresh_writes_cache() {
        let config = temp_config("ok", "dados.csv");
        fs::write(&config.deliveries_path, SOURCE).unwrap();

        let report = spawn_refresh(config.clone()).await.unwrap().unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.last_update, "06/03/2024 11:30:00");
        assert_eq!(read_cache(&config.cache_path).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_cache() {
        let config = temp_config("keep", "dados.csv");
        fs::write(&config.deliveries_path, SOURCE).unwrap();
        run_refresh(config.clone()).await.unwrap();

        fs::remove_file(&config.deliveries_path).unwrap();
        let err = run_refresh(config.clone()).await.unwrap_err();
        assert!(matches!(err, RefreshError::SourceUnavailable(_)));
        assert_eq!(read_cache(&config.cache_path).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_source_is_rejected() {
        let config = temp_config("empty", "dados.csv");
        fs::write(&config.deliveries_path, "data_hora_nf,valor_nf\n").unwrap();
        let err = refresh_blocking(&config).unwrap_err();
        assert!(matches!(err, RefreshError::EmptySource(_)));
        assert!(!config.cache_path.exists());
    }
}
