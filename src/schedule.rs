//! Daily background refresh.
//!
//! The scheduler owns the timing; subscribers receive a [`RefreshEvent`] on a
//! channel after each attempt instead of polling shared state.

use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::refresh::{run_refresh, RefreshReport};

/// Default time of day for the refresh (08:30 local).
pub fn default_run_time() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 30, 0).unwrap_or_default()
}

#[derive(Debug, Clone)]
pub enum RefreshEvent {
    Completed {
        report: RefreshReport,
        next_run: NaiveDateTime,
    },
    Failed {
        error: String,
        next_run: NaiveDateTime,
    },
}

impl RefreshEvent {
    pub fn next_run(&self) -> NaiveDateTime {
        match self {
            RefreshEvent::Completed { next_run, .. } | RefreshEvent::Failed { next_run, .. } => {
                *next_run
            }
        }
    }
}

/// Today at `at` if that has not passed yet, otherwise tomorrow at `at`.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today < now {
        today + Duration::days(1)
    } else {
        today
    }
}

pub struct RefreshScheduler {
    config: Config,
    at: NaiveTime,
}

impl RefreshScheduler {
    pub fn new(config: Config, at: NaiveTime) -> Self {
        Self { config, at }
    }

    pub fn next_run(&self) -> NaiveDateTime {
        next_run_after(Local::now().naive_local(), self.at)
    }

    /// One refresh attempt, reported as an event.
    pub async fn run_once(&self) -> RefreshEvent {
        let outcome = run_refresh(self.config.clone()).await;
        // Strictly after now, so a run finishing inside its own minute
        // does not schedule itself again.
        let next_run = next_run_after(Local::now().naive_local() + Duration::seconds(1), self.at);
        match outcome {
            Ok(report) => RefreshEvent::Completed { report, next_run },
            Err(e) => RefreshEvent::Failed {
                error: e.to_string(),
                next_run,
            },
        }
    }

    /// Loops forever, refreshing once a day. Stops when the receiver is gone.
    pub fn spawn(self, tx: mpsc::Sender<RefreshEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let now = Local::now().naive_local();
                let next = next_run_after(now, self.at);
                info!(next_run = %next.format("%d/%m/%Y %H:%M"), "Next refresh scheduled");
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                let event = self.run_once().await;
                if let RefreshEvent::Failed { error, .. } = &event {
                    warn!(error = %error, "Scheduled refresh failed");
                }
                if tx.send(event).await.is_err() {
                    info!("No refresh subscribers left; scheduler stopping");
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_next_run_same_day_before_time() {
        assert_eq!(next_run_after(at(5, 7, 0), default_run_time()), at(5, 8, 30));
        assert_eq!(next_run_after(at(5, 8, 30), default_run_time()), at(5, 8, 30));
    }

    #[test]
    fn test_next_run_rolls_to_tomorrow() {
        assert_eq!(next_run_after(at(5, 9, 0), default_run_time()), at(6, 8, 30));
        assert_eq!(next_run_after(at(31, 23, 59), default_run_time()).date(), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    }

    #[tokio::test]
    async fn test_run_once_reports_failure() {
        let config = Config {
            deliveries_path: "/nonexistent/dados.csv".to_string(),
            ..Config::default()
        };
        let scheduler = RefreshScheduler::new(config, default_run_time());
        let event = scheduler.run_once().await;
        assert!(matches!(event, RefreshEvent::Failed { .. }));
        assert!(event.next_run() > Local::now().naive_local());
    }
}
