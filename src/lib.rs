//! Last-mile delivery KPIs.
//!
//! Pipeline: source export → [`loader`] (normalize) → [`filters`] (valid
//! deliveries, then user selection) → [`indicators`]. [`session`] holds one
//! snapshot of the tables; [`refresh`] and [`schedule`] rebuild the cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod filters;
pub mod indicators;
pub mod loader;
pub mod output;
pub mod refresh;
pub mod regions;
pub mod schedule;
pub mod session;
pub mod types;
pub mod util;
