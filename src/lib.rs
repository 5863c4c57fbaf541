//! Degradation Proxy Library
//!
//! Fault-injection proxy that sits in front of a real operation and injects
//! latency and failures shaped like a degrading dependency.
//!
//! # Features
//!
//! - **Utilization-shaped degradation**: delays and failures follow an
//!   exponential curve over worker-pool utilization
//! - **Bounded dispatch**: fixed-capacity named worker pool with optional
//!   await timeouts
//! - **Failure modes**: raised errors or canned values, before or after the
//!   simulated delay, for all or selected operations
//! - **Behavior schedules**: ramp, step, exponential and oscillating changes
//!   to demand time, timeout and pass rate over a test window

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod behavior;
pub mod cli;
pub mod config;
pub mod error;
pub mod handler;
pub mod naming;
pub mod simulate;
pub mod stats;
pub mod strategy;

pub use error::{Error, InjectedError, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}
