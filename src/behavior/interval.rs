//! Behavior intervals and schedules

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use super::{ARG_ELAPSED, ARG_VALUE, BehaviorFunction, Params, to_value};
use crate::config::IntervalConfig;

/// Optional clamp applied to numeric function output
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds {
    /// Lower bound
    #[serde(default)]
    pub min: Option<f64>,
    /// Upper bound
    #[serde(default)]
    pub max: Option<f64>,
}

impl ParamBounds {
    /// Bounds with both ends set
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Clamp `x` into the configured range
    #[must_use]
    pub fn clamp(&self, x: f64) -> f64 {
        let x = self.min.map_or(x, |min| x.max(min));
        self.max.map_or(x, |max| x.min(max))
    }
}

/// A behavior function active over `[start, start + duration)`
///
/// Stateless: every query recomputes the elapsed fraction from the supplied
/// offset.
#[derive(Clone)]
pub struct BehaviorInterval {
    start: Duration,
    duration: Duration,
    function: Arc<dyn BehaviorFunction>,
    params: Params,
    bounds: ParamBounds,
}

impl fmt::Debug for BehaviorInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorInterval")
            .field("start", &self.start)
            .field("duration", &self.duration)
            .field("function", &self.function.name())
            .field("params", &self.params)
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl BehaviorInterval {
    /// Create an interval evaluating `function`
    pub fn new(start: Duration, duration: Duration, function: Arc<dyn BehaviorFunction>) -> Self {
        Self {
            start,
            duration,
            function,
            params: Params::new(),
            bounds: ParamBounds::default(),
        }
    }

    /// Fixed parameters merged under the caller's parameters
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Clamp numeric output
    #[must_use]
    pub fn with_bounds(mut self, bounds: ParamBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Build from configuration using a built-in function
    #[must_use]
    pub fn from_config(config: &IntervalConfig) -> Self {
        Self {
            start: config.start,
            duration: config.duration,
            function: Arc::new(FunctionRef(config.function.function())),
            params: config.params.clone(),
            bounds: config.bounds,
        }
    }

    /// Offset at which the interval begins
    #[must_use]
    pub fn start(&self) -> Duration {
        self.start
    }

    /// Length of the interval
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether `at` falls inside the interval
    #[must_use]
    pub fn is_active(&self, at: Duration) -> bool {
        self.elapsed_fraction(at).is_some()
    }

    /// Position of `at` within the interval as a fraction in `[0, 1)`
    #[must_use]
    pub fn elapsed_fraction(&self, at: Duration) -> Option<f64> {
        if self.duration.is_zero() {
            return None;
        }
        let into = at.checked_sub(self.start)?;
        if into >= self.duration {
            return None;
        }
        Some(into.as_secs_f64() / self.duration.as_secs_f64())
    }

    /// Evaluate the function at offset `at`
    ///
    /// Interval parameters are overridden by `caller` parameters, and the
    /// elapsed fraction is always injected. Returns `None` when the interval
    /// is inactive or the function cannot produce a value.
    #[must_use]
    pub fn evaluate(&self, at: Duration, caller: &Params) -> Option<Value> {
        let fraction = self.elapsed_fraction(at)?;

        let mut params = self.params.clone();
        params.extend(caller.iter().map(|(k, v)| (k.clone(), v.clone())));
        params.insert(ARG_ELAPSED.to_string(), to_value(fraction)?);

        let value = self.function.evaluate(&params)?;
        trace!(
            function = self.function.name(),
            elapsed = fraction,
            value = %value,
            "Evaluated behavior interval"
        );

        match value.as_f64() {
            Some(x) if self.bounds != ParamBounds::default() => to_value(self.bounds.clamp(x)),
            _ => Some(value),
        }
    }

    /// Evaluate and read the result as a number
    #[must_use]
    pub fn evaluate_f64(&self, at: Duration, caller: &Params) -> Option<f64> {
        self.evaluate(at, caller).and_then(|v| v.as_f64())
    }
}

/// Adapter so static built-ins can sit behind an `Arc`
struct FunctionRef(&'static dyn BehaviorFunction);

impl BehaviorFunction for FunctionRef {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn evaluate(&self, params: &Params) -> Option<Value> {
        self.0.evaluate(params)
    }
}

/// Ordered intervals for one parameter; the first active interval wins
#[derive(Debug, Clone, Default)]
pub struct BehaviorSchedule {
    intervals: Vec<BehaviorInterval>,
}

impl BehaviorSchedule {
    /// Create a schedule
    #[must_use]
    pub fn new(intervals: Vec<BehaviorInterval>) -> Self {
        Self { intervals }
    }

    /// Append an interval
    pub fn push(&mut self, interval: BehaviorInterval) {
        self.intervals.push(interval);
    }

    /// Number of intervals
    #[must_use]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Whether the schedule has no intervals
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Value of the first active interval at `at`
    #[must_use]
    pub fn value_at(&self, at: Duration, caller: &Params) -> Option<Value> {
        self.intervals
            .iter()
            .find(|interval| interval.is_active(at))
            .and_then(|interval| interval.evaluate(at, caller))
    }

    /// Numeric value at `at`, falling back to `base`
    ///
    /// `base` is passed as the `value` parameter unless the interval sets
    /// its own, so a linear interval without one reproduces the base setting.
    #[must_use]
    pub fn value_at_or(&self, at: Duration, base: f64) -> f64 {
        let Some(interval) = self.intervals.iter().find(|i| i.is_active(at)) else {
            return base;
        };

        let mut caller = Params::new();
        if !interval.params.contains_key(ARG_VALUE)
            && let Some(v) = to_value(base)
        {
            caller.insert(ARG_VALUE.to_string(), v);
        }
        interval
            .evaluate_f64(at, &caller)
            .unwrap_or(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{BehaviorKind, Linear, Ramp};
    use serde_json::json;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ramp(start: u64, len: u64, from: f64, to: f64) -> BehaviorInterval {
        let params: Params = [
            ("from".to_string(), json!(from)),
            ("to".to_string(), json!(to)),
        ]
        .into_iter()
        .collect();
        BehaviorInterval::new(secs(start), secs(len), Arc::new(Ramp)).with_params(params)
    }

    #[test]
    fn test_elapsed_fraction_bounds() {
        let interval = ramp(10, 20, 0.0, 1.0);
        assert_eq!(interval.elapsed_fraction(secs(9)), None);
        assert_eq!(interval.elapsed_fraction(secs(10)), Some(0.0));
        assert_eq!(interval.elapsed_fraction(secs(20)), Some(0.5));
        assert_eq!(interval.elapsed_fraction(secs(30)), None);
    }

    #[test]
    fn test_zero_duration_never_active() {
        let interval = BehaviorInterval::new(secs(0), Duration::ZERO, Arc::new(Linear));
        assert!(!interval.is_active(secs(0)));
    }

    #[test]
    fn test_evaluate_injects_elapsed() {
        let interval = ramp(0, 10, 100.0, 200.0);
        assert_eq!(interval.evaluate_f64(secs(5), &Params::new()), Some(150.0));
    }

    #[test]
    fn test_caller_params_override_interval_params() {
        let interval = ramp(0, 10, 100.0, 200.0);
        let caller: Params = [("to".to_string(), json!(100.0))].into_iter().collect();
        assert_eq!(interval.evaluate_f64(secs(5), &caller), Some(100.0));
    }

    #[test]
    fn test_bounds_clamp_output() {
        let interval = ramp(0, 10, 0.0, 2.0).with_bounds(ParamBounds::new(0.0, 1.0));
        assert_eq!(interval.evaluate_f64(secs(9), &Params::new()), Some(1.0));
    }

    #[test]
    fn test_bounds_leave_non_numeric_alone() {
        let params: Params = [("value".to_string(), json!("x"))].into_iter().collect();
        let interval = BehaviorInterval::new(secs(0), secs(1), Arc::new(Linear))
            .with_params(params)
            .with_bounds(ParamBounds::new(0.0, 1.0));
        assert_eq!(interval.evaluate(Duration::ZERO, &Params::new()), Some(json!("x")));
    }

    #[test]
    fn test_schedule_first_active_wins_and_falls_back() {
        let schedule = BehaviorSchedule::new(vec![ramp(0, 10, 1.0, 0.5), ramp(5, 10, 0.0, 0.0)]);
        assert_eq!(schedule.value_at_or(secs(6), 0.9), 1.0 - 0.5 * 0.6);
        assert_eq!(schedule.value_at_or(secs(12), 0.9), 0.0);
        assert_eq!(schedule.value_at_or(secs(30), 0.9), 0.9);
    }

    #[test]
    fn test_linear_interval_reproduces_base() {
        let schedule = BehaviorSchedule::new(vec![BehaviorInterval::new(
            secs(0),
            secs(60),
            Arc::new(Linear),
        )]);
        assert_eq!(schedule.value_at_or(secs(1), 250.0), 250.0);
    }

    #[test]
    fn test_interval_value_beats_base() {
        let params: Params = [("value".to_string(), json!(40.0))].into_iter().collect();
        let schedule = BehaviorSchedule::new(vec![
            BehaviorInterval::new(secs(0), secs(60), Arc::new(Linear)).with_params(params),
        ]);
        assert_eq!(schedule.value_at_or(secs(1), 250.0), 40.0);
    }

    #[test]
    fn test_from_config() {
        let config: IntervalConfig = serde_json::from_value(json!({
            "start": 1000,
            "duration": "2s",
            "function": "step",
            "params": { "from": 50, "to": 400 },
        }))
        .unwrap();
        let interval = BehaviorInterval::from_config(&config);
        assert_eq!(interval.start(), secs(1));
        assert_eq!(interval.duration(), secs(2));
        assert_eq!(interval.evaluate_f64(Duration::from_millis(1500), &Params::new()), Some(50.0));
        assert_eq!(interval.evaluate_f64(Duration::from_millis(2500), &Params::new()), Some(400.0));
        assert_eq!(config.function, BehaviorKind::Step);
    }
}
