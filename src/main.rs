//! CLI entry point for the delivery dashboard.
//!
//! `indicators` prints the KPI cards for a date range and filter selection,
//! `refresh` rebuilds the cache from the source export, `options` lists the
//! filter choices, and `watch` keeps a daily refresh running.

use anyhow::Result;
use chrono::{Local, NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use delivery_kpis::config::{Config, Overrides};
use delivery_kpis::filters::FilterSpec;
use delivery_kpis::output::{render_dashboard, table_string, write_csv, write_json};
use delivery_kpis::refresh::spawn_refresh;
use delivery_kpis::schedule::{default_run_time, RefreshEvent, RefreshScheduler};
use delivery_kpis::session::Session;
use delivery_kpis::types::CardRow;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

#[derive(Parser)]
#[command(name = "delivery_kpis")]
#[command(about = "Delivery KPI dashboard", long_about = None)]
struct Cli {
    /// Delivery export (CSV)
    #[arg(long, global = true)]
    source: Option<String>,

    /// Rider cost ledger (CSV)
    #[arg(long, global = true)]
    costs: Option<String>,

    /// Cache file for the normalized table
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// JSON file replacing the built-in region parameters
    #[arg(long, global = true)]
    regions: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct Selection {
    /// First day of the range (YYYY-MM-DD); defaults to the first of this month
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day of the range (YYYY-MM-DD); defaults to today
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Zone to include (repeatable)
    #[arg(long = "zone")]
    zones: Vec<String>,

    /// Rider to include (repeatable)
    #[arg(long = "rider")]
    riders: Vec<String>,

    /// Client to include (repeatable)
    #[arg(long = "client")]
    clients: Vec<String>,

    /// Seller to include (repeatable)
    #[arg(long = "seller")]
    sellers: Vec<String>,
}

impl Selection {
    fn to_spec(&self, today: NaiveDate) -> FilterSpec {
        let mut spec = FilterSpec::current_month(today);
        if let Some(from) = self.from {
            spec.date_from = from;
        }
        if let Some(to) = self.to {
            spec.date_to = to;
        }
        spec.zones.extend(self.zones.iter().cloned());
        spec.riders.extend(self.riders.iter().cloned());
        spec.clients.extend(self.clients.iter().cloned());
        spec.sellers.extend(self.sellers.iter().cloned());
        spec
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and print the indicator cards
    Indicators {
        #[command(flatten)]
        selection: Selection,

        /// Write the dashboard view as JSON to this file
        #[arg(long)]
        json: Option<String>,

        /// Write the filtered delivery rows as CSV to this file
        #[arg(long)]
        export_rows: Option<String>,
    },
    /// Rebuild the cache from the delivery export
    Refresh,
    /// List the values available for each filter
    Options,
    /// Refresh daily and reprint the dashboard after each refresh
    Watch {
        #[command(flatten)]
        selection: Selection,

        /// Time of day to refresh (HH:MM)
        #[arg(long, value_parser = parse_time)]
        at: Option<NaiveTime>,
    },
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| format!("invalid time '{}': {}", s, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/delivery_kpis.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("delivery_kpis.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(
            EnvFilter::try_from_env("RUST_LOG_JSON").unwrap_or_else(|_| EnvFilter::new("debug")),
        );

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().with_overrides(Overrides {
        deliveries_path: cli.source,
        costs_path: cli.costs,
        cache_path: cli.cache,
        regions_path: cli.regions,
    });
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Indicators {
            selection,
            json,
            export_rows,
        } => {
            let session = open_session(config).await?;
            let spec = selection.to_spec(today);
            let view = session.view(&spec);
            println!("{}", render_dashboard(&view));

            if let Some(path) = json {
                if let Err(e) = write_json(&path, &view) {
                    error!(path = %path, error = %e, "JSON export failed");
                }
            }
            if let Some(path) = export_rows {
                if let Err(e) = write_csv(&path, &session.filtered(&spec)) {
                    error!(path = %path, error = %e, "Row export failed");
                }
            }
        }
        Commands::Refresh => {
            info!(source = %config.deliveries_path, "Refreshing cache");
            let report = spawn_refresh(config).await??;
            println!(
                "Atualização concluída: {} entregas. Última atualização: {}",
                report.rows, report.last_update
            );
        }
        Commands::Options => {
            let session = open_session(config).await?;
            let options = session.options();
            let rows: Vec<CardRow> = [
                ("Zona", &options.zones),
                ("Motoqueiro", &options.riders),
                ("Cliente", &options.clients),
                ("Vendedor", &options.sellers),
            ]
            .into_iter()
            .map(|(title, values)| CardRow {
                title: title.to_string(),
                value: values.join(", "),
            })
            .collect();
            println!("{}", table_string(&rows));
        }
        Commands::Watch { selection, at } => {
            watch(config, selection, at.unwrap_or_else(default_run_time), today).await?;
        }
    }

    Ok(())
}

/// Opens the session off the async runtime; loading reads and parses files.
async fn open_session(config: Config) -> Result<Session> {
    Ok(tokio::task::spawn_blocking(move || Session::open(&config)).await??)
}

/// Prints the dashboard, then reprints it after every scheduled refresh.
async fn watch(config: Config, selection: Selection, at: NaiveTime, today: NaiveDate) -> Result<()> {
    let mut session = open_session(config.clone()).await?;
    println!("{}", render_dashboard(&session.view(&selection.to_spec(today))));

    let (tx, mut rx) = mpsc::channel(4);
    let scheduler = RefreshScheduler::new(config.clone(), at);
    info!(next_run = %scheduler.next_run(), "Watching for scheduled refreshes");
    let handle = scheduler.spawn(tx);

    while let Some(event) = rx.recv().await {
        match event {
            RefreshEvent::Completed { report, next_run } => {
                info!(rows = report.rows, next_run = %next_run, "Reloading after refresh");
                match open_session(config.clone()).await {
                    Ok(fresh) => session = fresh,
                    Err(e) => warn!(error = %e, "Reload failed; keeping previous session"),
                }
                let spec = selection.to_spec(Local::now().date_naive());
                println!("{}", render_dashboard(&session.view(&spec)));
            }
            RefreshEvent::Failed { error, next_run } => {
                warn!(error = %error, next_run = %next_run, "Refresh failed; dashboard unchanged");
            }
        }
    }

    handle.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_config(cache_name: &str) -> Config {
        let fixtures = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");
        let cache_path = std::env::temp_dir()
            .join("delivery_kpis_main_test")
            .join(cache_name);
        let _ = std::fs::remove_file(&cache_path);
        Config {
            deliveries_path: format!("{}/dados.csv", fixtures),
            costs_path: format!("{}/custos.csv", fixtures),
            cache_path,
            regions_path: None,
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_open_session_off_runtime_thread() {
        let session = open_session(fixture_config("open.bin")).await.unwrap();
        assert_eq!(session.deliveries().len(), 7);
    }

    #[test]
    fn test_selection_defaults_to_current_month() {
        let selection = Selection {
            from: None,
            to: None,
            zones: vec!["IGARASSU".to_string()],
            riders: vec![],
            clients: vec![],
            sellers: vec![],
        };
        let today = NaiveDate::from_ymd_opt(2024, 3, 17).unwrap();
        let spec = selection.to_spec(today);
        assert_eq!(spec.date_from, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(spec.date_to, today);
        assert!(spec.zones.contains("IGARASSU"));
    }
}
