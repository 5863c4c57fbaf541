//! Scenario drivers
//!
//! Run synthetic load through a handler, or sample a strategy's plans, to
//! see what a degradation configuration does before pointing real callers
//! at it.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::config::Config;
use crate::handler::{DegradationHandler, TargetCallback, from_fn};
use crate::naming::GroupSequence;
use crate::stats::StatsSnapshot;
use crate::strategy::{DefaultStrategy, DegradationStrategy, ScheduledStrategy};
use crate::Result;

/// Build the strategy described by `config`
///
/// A [`ScheduledStrategy`] when any schedule is configured, otherwise a
/// [`DefaultStrategy`].
#[must_use]
pub fn strategy_from_config(config: &Config) -> Arc<dyn DegradationStrategy> {
    if config.schedules.iter().any(|s| !s.intervals.is_empty()) {
        Arc::new(ScheduledStrategy::from_config(config))
    } else {
        Arc::new(DefaultStrategy::from_config(&config.strategy))
    }
}

/// Build a handler for `config`
///
/// # Errors
///
/// Returns an error if the worker pool cannot start.
pub fn handler_from_config(config: &Config, sequence: &GroupSequence) -> Result<DegradationHandler> {
    DegradationHandler::from_config(strategy_from_config(config), &config.handler, sequence)
}

/// Synthetic target that answers immediately with the operation name
#[must_use]
pub fn echo_target(operation: &str) -> Arc<dyn TargetCallback> {
    let operation = operation.to_string();
    from_fn(move || {
        let operation = operation.clone();
        async move { Ok(json!({ "operation": operation, "ok": true })) }
    })
}

/// Dispatch `calls` echo calls with at most `concurrency` in flight
pub async fn run_load(
    handler: &DegradationHandler,
    operation: &str,
    calls: usize,
    concurrency: usize,
) -> StatsSnapshot {
    info!(operation, calls, concurrency, "Starting simulated load");

    stream::iter(0..calls)
        .map(|_| handler.dispatch(operation, Some(echo_target(operation))))
        .buffer_unordered(concurrency.max(1))
        .for_each(|_| async {})
        .await;

    let snapshot = handler.stats().snapshot();
    info!(
        total = snapshot.total,
        pass_ratio = snapshot.pass_ratio,
        "Simulated load finished"
    );
    snapshot
}

/// Distribution of plans sampled at one utilization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Utilization the plans were generated for
    pub utilization: f64,
    /// Plans sampled
    pub samples: usize,
    /// Plans that fail
    pub failures: usize,
    /// `failures / samples`
    pub failure_ratio: f64,
    /// Plans that fail before the delay
    pub fast_failures: usize,
    /// Smallest delay (milliseconds)
    pub delay_min_ms: f64,
    /// Mean delay (milliseconds)
    pub delay_mean_ms: f64,
    /// Largest delay (milliseconds)
    pub delay_max_ms: f64,
}

/// Sample `samples` plans from `strategy` at `utilization`
#[must_use]
pub fn sample_plans(
    strategy: &dyn DegradationStrategy,
    utilization: f64,
    samples: usize,
) -> PlanSummary {
    let mut failures = 0;
    let mut fast_failures = 0;
    let mut min = f64::INFINITY;
    let mut max: f64 = 0.0;
    let mut sum = 0.0;

    for _ in 0..samples {
        let plan = strategy.generate_plan(utilization);
        let ms = millis(plan.adjusted_delay());
        min = min.min(ms);
        max = max.max(ms);
        sum += ms;
        if plan.should_fail() {
            failures += 1;
        }
        if plan.fails_fast() {
            fast_failures += 1;
        }
    }

    let (failure_ratio, delay_mean_ms) = if samples == 0 {
        min = 0.0;
        (0.0, 0.0)
    } else {
        (failures as f64 / samples as f64, sum / samples as f64)
    };

    PlanSummary {
        utilization,
        samples,
        failures,
        failure_ratio,
        fast_failures,
        delay_min_ms: min,
        delay_mean_ms,
        delay_max_ms: max,
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IntervalConfig, ScheduleConfig, StrategyParameter};
    use crate::behavior::{BehaviorKind, ParamBounds};
    use std::collections::HashMap;

    #[test]
    fn test_strategy_selection() {
        let mut config = Config::default();
        config.strategy.timeout = Duration::from_millis(100);
        let plain = strategy_from_config(&config);
        assert_eq!(plain.service_timeout(), Duration::from_millis(100));

        config.schedules.push(ScheduleConfig {
            parameter: StrategyParameter::Timeout,
            intervals: vec![IntervalConfig {
                start: Duration::ZERO,
                duration: Duration::from_secs(3600),
                function: BehaviorKind::Linear,
                params: HashMap::from([("value".to_string(), json!(250))]),
                bounds: ParamBounds::default(),
            }],
        });
        let scheduled = strategy_from_config(&config);
        assert_eq!(scheduled.service_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_sample_plans_empty() {
        let strategy = DefaultStrategy::from_config(&Config::default().strategy);
        let summary = sample_plans(&strategy, 0.5, 0);
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.delay_min_ms, 0.0);
        assert_eq!(summary.failure_ratio, 0.0);
    }

    #[test]
    fn test_sample_plans_counts_failures() {
        let mut config = Config::default();
        config.strategy.demand_time = Duration::from_millis(10);
        config.strategy.timeout = Duration::from_millis(100);
        config.strategy.pass_rate = 0.0;
        let strategy = DefaultStrategy::from_config(&config.strategy);

        let summary = sample_plans(&strategy, 1.0, 1000);
        assert_eq!(summary.failures, 1000);
        assert_eq!(summary.fast_failures, 0);
        assert!(summary.delay_min_ms >= 7.5);
        assert!(summary.delay_max_ms <= 125.0);
    }
}
