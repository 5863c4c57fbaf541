//! Configuration management

use std::{collections::HashMap, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::behavior::{BehaviorKind, ParamBounds};
use crate::strategy::ErrorRegistry;
use crate::{Error, Result};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "DEGRADATION_PROXY_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Degradation strategy parameters
    pub strategy: StrategyConfig,
    /// Worker pool configuration
    pub handler: HandlerConfig,
    /// Time-varying overrides for strategy parameters
    pub schedules: Vec<ScheduleConfig>,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // DEGRADATION_PROXY_STRATEGY__PASS_RATE=0.9 etc.
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.strategy.pass_rate) {
            return Err(Error::Config(format!(
                "strategy.pass_rate must be within [0, 1], got {}",
                self.strategy.pass_rate
            )));
        }
        if self.handler.pool_capacity == 0 {
            return Err(Error::Config(
                "handler.pool_capacity must be at least 1".to_string(),
            ));
        }

        let registry = ErrorRegistry::builtin();
        if let Some(unknown) = self
            .strategy
            .error_kinds
            .iter()
            .find(|kind| !registry.contains(kind))
        {
            return Err(Error::Config(format!("Unknown error kind: {unknown}")));
        }

        for schedule in &self.schedules {
            for interval in &schedule.intervals {
                if interval.duration.is_zero() {
                    return Err(Error::Config(format!(
                        "Interval for {:?} starting at {}ms has zero duration",
                        schedule.parameter,
                        interval.start.as_millis()
                    )));
                }
                if let (Some(min), Some(max)) = (interval.bounds.min, interval.bounds.max)
                    && min > max
                {
                    return Err(Error::Config(format!(
                        "Interval bounds for {:?} have min {min} above max {max}",
                        schedule.parameter
                    )));
                }
            }
        }

        Ok(())
    }
}

/// How an injected failure is surfaced to the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePriority {
    /// Return an error
    #[default]
    Raise,
    /// Return the configured canned error value as a successful result
    ReturnValue,
}

/// Whether an injected failure happens before or after the simulated delay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FastFail {
    /// Fail immediately, skipping the delay
    Before,
    /// Delay first, then fail
    After,
    /// Never fast-fail; failures always follow the full delay
    #[default]
    Disabled,
}

/// Degradation strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Baseline healthy latency
    #[serde(with = "millis_serde")]
    pub demand_time: Duration,
    /// Latency beyond which a call counts as failed
    #[serde(with = "millis_serde")]
    pub timeout: Duration,
    /// Fraction of calls that must succeed, 1.0 disables failures
    pub pass_rate: f64,
    /// Error kinds (registry tags) to pick from when failing
    pub error_kinds: Vec<String>,
    /// Canned value returned on failure with `return_value` priority
    pub error_value: Option<Value>,
    /// Raise an error or return the canned value
    pub failure_priority: FailurePriority,
    /// Fail before or after the delay
    pub fast_fail: FastFail,
    /// Bound the handler's await by `timeout`
    pub timeout_queues: bool,
    /// Operation names to degrade (empty = all)
    pub methods: Vec<String>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            demand_time: Duration::ZERO,
            timeout: Duration::ZERO,
            pass_rate: 1.0,
            error_kinds: Vec::new(),
            error_value: None,
            failure_priority: FailurePriority::Raise,
            fast_fail: FastFail::Disabled,
            timeout_queues: false,
            methods: Vec::new(),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Number of calls that may execute concurrently
    pub pool_capacity: usize,
    /// Logical name used for worker thread names
    pub worker_name: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 10,
            worker_name: "degradation".to_string(),
        }
    }
}

/// Strategy parameters that a schedule can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyParameter {
    /// Baseline latency in milliseconds
    DemandTime,
    /// Timeout in milliseconds
    Timeout,
    /// Pass rate in [0, 1]
    PassRate,
}

/// Intervals driving one strategy parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Which parameter the intervals produce
    pub parameter: StrategyParameter,
    /// Intervals, first active one wins
    #[serde(default)]
    pub intervals: Vec<IntervalConfig>,
}

/// One behavior interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalConfig {
    /// Offset from scenario start
    #[serde(with = "millis_serde", default)]
    pub start: Duration,
    /// Length of the interval
    #[serde(with = "millis_serde")]
    pub duration: Duration,
    /// Function evaluated while the interval is active
    #[serde(default)]
    pub function: BehaviorKind,
    /// Function parameters (`value`, `from`, `to`, ...)
    #[serde(default)]
    pub params: HashMap<String, Value>,
    /// Output clamp
    #[serde(default)]
    pub bounds: ParamBounds,
}

/// Millisecond duration codec
///
/// Accepts integers (milliseconds, negatives clamp to zero) or strings such
/// as `"250ms"`, `"2s"` and `"1m"`. Serializes as integer milliseconds.
pub mod millis_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    /// Serialize Duration as integer milliseconds
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize a millisecond count or suffixed duration string
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Int(ms) => Ok(Duration::from_millis(u64::try_from(ms).unwrap_or(0))),
            Raw::Float(ms) => Ok(Duration::from_millis(ms.max(0.0).round() as u64)),
            Raw::Text(s) => parse(s.trim()).map_err(serde::de::Error::custom),
        }
    }

    /// Parse `"250ms"`, `"2s"`, `"1m"` or a bare millisecond count
    ///
    /// A leading `-` on any well-formed value clamps to zero.
    pub(crate) fn parse(s: &str) -> Result<Duration, String> {
        if let Some(magnitude) = s.strip_prefix('-') {
            return parse(magnitude.trim()).map(|_| Duration::ZERO);
        }

        let parse_u64 = |v: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid duration '{s}': {e}"))
        };

        if let Some(ms) = s.strip_suffix("ms") {
            parse_u64(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            parse_u64(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            let mins = parse_u64(mins)?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration '{s}' is out of range"))
        } else {
            parse_u64(s).map(Duration::from_millis)
        }
    }
}
