//! Strategy whose parameters follow behavior schedules

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::trace;

use super::{
    DefaultStrategy, DegradationPlan, DegradationStrategy, ErrorRegistry, MethodFilter, PassRate,
    ServiceProfile,
};
use crate::behavior::{BehaviorInterval, BehaviorSchedule};
use crate::config::{Config, StrategyConfig, StrategyParameter};

/// Re-evaluates demand time, timeout and pass rate on every decision
///
/// Each parameter without a schedule, or whose schedule has no active
/// interval, keeps its base configuration value. Effective values pass
/// through the same clamping as a statically configured strategy.
#[derive(Debug, Clone)]
pub struct ScheduledStrategy {
    base: StrategyConfig,
    registry: Arc<ErrorRegistry>,
    schedules: HashMap<StrategyParameter, BehaviorSchedule>,
    methods: MethodFilter,
    origin: Instant,
}

impl ScheduledStrategy {
    /// Create with no schedules; the scenario starts now
    #[must_use]
    pub fn new(base: StrategyConfig) -> Self {
        Self {
            methods: MethodFilter::new(base.methods.iter().cloned()),
            base,
            registry: Arc::new(ErrorRegistry::builtin()),
            schedules: HashMap::new(),
            origin: Instant::now(),
        }
    }

    /// Build the strategy and its schedules from configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut strategy = Self::new(config.strategy.clone());
        for schedule in &config.schedules {
            let entry = strategy.schedules.entry(schedule.parameter).or_default();
            for interval in &schedule.intervals {
                entry.push(BehaviorInterval::from_config(interval));
            }
        }
        strategy
    }

    /// Drive `parameter` with `schedule`
    #[must_use]
    pub fn with_schedule(mut self, parameter: StrategyParameter, schedule: BehaviorSchedule) -> Self {
        self.schedules.insert(parameter, schedule);
        self
    }

    /// Use a custom error registry
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ErrorRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Move the scenario start
    #[must_use]
    pub fn with_origin(mut self, origin: Instant) -> Self {
        self.origin = origin;
        self
    }

    /// Whether any parameter is scheduled
    #[must_use]
    pub fn has_schedules(&self) -> bool {
        self.schedules.values().any(|s| !s.is_empty())
    }

    /// Time since the scenario started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// The static strategy in effect at offset `at`
    #[must_use]
    pub fn strategy_at(&self, at: Duration) -> DefaultStrategy {
        let demand = self.value_at(
            StrategyParameter::DemandTime,
            at,
            self.base.demand_time.as_secs_f64() * 1000.0,
        );
        let timeout = self.value_at(
            StrategyParameter::Timeout,
            at,
            self.base.timeout.as_secs_f64() * 1000.0,
        );
        let pass_rate = self.value_at(StrategyParameter::PassRate, at, self.base.pass_rate);

        trace!(
            at_ms = at.as_millis(),
            demand_ms = demand,
            timeout_ms = timeout,
            pass_rate,
            "Effective strategy parameters"
        );

        DefaultStrategy::from_config_with_registry(&self.base, Arc::clone(&self.registry))
            .with_profile(ServiceProfile::from_millis(
                demand.round() as i64,
                timeout.round() as i64,
            ))
            .with_pass_rate(PassRate::new(pass_rate))
    }

    /// The static strategy in effect now
    #[must_use]
    pub fn current(&self) -> DefaultStrategy {
        self.strategy_at(self.elapsed())
    }

    fn value_at(&self, parameter: StrategyParameter, at: Duration, base: f64) -> f64 {
        self.schedules
            .get(&parameter)
            .map_or(base, |schedule| schedule.value_at_or(at, base))
    }
}

#[async_trait]
impl DegradationStrategy for ScheduledStrategy {
    fn generate_plan(&self, utilization: f64) -> DegradationPlan {
        self.current().generate_plan(utilization)
    }

    fn should_skip_degradation(&self) -> bool {
        self.current().should_skip_degradation()
    }

    fn is_method_excluded(&self, operation: &str) -> bool {
        self.methods.is_excluded(operation)
    }

    fn timeout_queues(&self) -> bool {
        self.base.timeout_queues
    }

    fn service_timeout(&self) -> Duration {
        self.current().profile().timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{BehaviorKind, ParamBounds, Params, Ramp, Step};
    use crate::config::{IntervalConfig, ScheduleConfig};
    use serde_json::json;

    fn params(from: f64, to: f64) -> Params {
        [("from".to_string(), json!(from)), ("to".to_string(), json!(to))]
            .into_iter()
            .collect()
    }

    fn base() -> StrategyConfig {
        StrategyConfig {
            demand_time: Duration::from_millis(100),
            timeout: Duration::from_millis(1000),
            pass_rate: 1.0,
            ..StrategyConfig::default()
        }
    }

    #[test]
    fn test_unscheduled_matches_base() {
        let strategy = ScheduledStrategy::new(base());
        let effective = strategy.strategy_at(Duration::from_secs(5));
        assert_eq!(effective.profile(), ServiceProfile::from_millis(100, 1000));
        assert!(effective.pass_rate().is_total());
        assert!(!strategy.has_schedules());
    }

    #[test]
    fn test_pass_rate_ramp() {
        let schedule = BehaviorSchedule::new(vec![
            BehaviorInterval::new(Duration::ZERO, Duration::from_secs(10), Arc::new(Ramp))
                .with_params(params(1.0, 0.5)),
        ]);
        let strategy = ScheduledStrategy::new(base()).with_schedule(StrategyParameter::PassRate, schedule);

        assert_eq!(strategy.strategy_at(Duration::ZERO).pass_rate().value(), 1.0);
        assert_eq!(
            strategy.strategy_at(Duration::from_secs(5)).pass_rate().value(),
            0.75
        );
        // after the interval the base value applies again
        assert_eq!(
            strategy.strategy_at(Duration::from_secs(11)).pass_rate().value(),
            1.0
        );
    }

    #[test]
    fn test_demand_step_keeps_timeout_clamp() {
        let schedule = BehaviorSchedule::new(vec![
            BehaviorInterval::new(Duration::ZERO, Duration::from_secs(10), Arc::new(Step))
                .with_params(params(100.0, 5000.0)),
        ]);
        let strategy =
            ScheduledStrategy::new(base()).with_schedule(StrategyParameter::DemandTime, schedule);

        let early = strategy.strategy_at(Duration::from_secs(1)).profile();
        assert_eq!(early.demand_time(), Duration::from_millis(100));

        let late = strategy.strategy_at(Duration::from_secs(9)).profile();
        assert_eq!(late.demand_time(), Duration::from_millis(5000));
        assert_eq!(late.timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_negative_scheduled_demand_clamps() {
        let schedule = BehaviorSchedule::new(vec![
            BehaviorInterval::new(Duration::ZERO, Duration::from_secs(10), Arc::new(Ramp))
                .with_params(params(-50.0, -50.0)),
        ]);
        let strategy =
            ScheduledStrategy::new(base()).with_schedule(StrategyParameter::DemandTime, schedule);
        assert_eq!(
            strategy.strategy_at(Duration::from_secs(1)).profile().demand_time(),
            Duration::ZERO
        );
    }

    #[test]
    fn test_from_config_builds_schedules() {
        let config = Config {
            strategy: base(),
            schedules: vec![ScheduleConfig {
                parameter: StrategyParameter::Timeout,
                intervals: vec![IntervalConfig {
                    start: Duration::from_secs(2),
                    duration: Duration::from_secs(2),
                    function: BehaviorKind::Ramp,
                    params: params(1000.0, 3000.0),
                    bounds: ParamBounds::new(0.0, 2000.0),
                }],
            }],
            ..Config::default()
        };
        let strategy = ScheduledStrategy::from_config(&config);
        assert!(strategy.has_schedules());
        assert_eq!(
            strategy.strategy_at(Duration::from_secs(3)).profile().timeout(),
            Duration::from_millis(2000)
        );
        assert_eq!(
            strategy.strategy_at(Duration::from_secs(1)).profile().timeout(),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_plan_timeout_matches_effective_profile() {
        let schedule = BehaviorSchedule::new(vec![
            BehaviorInterval::new(Duration::ZERO, Duration::from_secs(10), Arc::new(Step))
                .with_params(params(1000.0, 4000.0)),
        ]);
        let strategy =
            ScheduledStrategy::new(base()).with_schedule(StrategyParameter::Timeout, schedule);

        let early = strategy.strategy_at(Duration::from_secs(1)).generate_plan(0.5);
        assert_eq!(early.timeout(), Some(Duration::from_millis(1000)));
        let late = strategy.strategy_at(Duration::from_secs(9)).generate_plan(0.5);
        assert_eq!(late.timeout(), Some(Duration::from_millis(4000)));
    }

    #[test]
    fn test_method_filter_from_base() {
        let mut config = base();
        config.methods = vec!["foo".to_string()];
        let strategy = ScheduledStrategy::new(config);
        assert!(!strategy.is_method_excluded("foo"));
        assert!(strategy.is_method_excluded("bar"));
    }

    #[test]
    fn test_skip_follows_effective_values() {
        let config = StrategyConfig::default();
        let strategy = ScheduledStrategy::new(config.clone());
        assert!(strategy.should_skip_degradation());

        let schedule = BehaviorSchedule::new(vec![
            BehaviorInterval::new(Duration::ZERO, Duration::from_secs(3600), Arc::new(Ramp))
                .with_params(params(200.0, 200.0)),
        ]);
        let strategy =
            ScheduledStrategy::new(config).with_schedule(StrategyParameter::DemandTime, schedule);
        assert!(!strategy.should_skip_degradation());
    }
}
