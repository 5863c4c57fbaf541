//! Degradation strategies
//!
//! A strategy turns a pool utilization reading into a [`DegradationPlan`]:
//! how long the call is delayed and whether it fails.
//!
//! The default strategy places calls on the normalized `e^x` curve over
//! `[0, 1]`. The pass rate is converted into the utilization at which the
//! area under that curve reaches the pass rate, so failures stay rare at low
//! utilization and grow sharply as the pool saturates.

mod errors;
mod plan;
mod scheduled;

pub use errors::{DefaultConstructor, ErrorRegistry, MessageConstructor};
pub use plan::DegradationPlan;
pub use scheduled::ScheduledStrategy;

use std::collections::HashSet;
use std::f64::consts::E;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

pub use crate::config::{FailurePriority, FastFail};
use crate::config::StrategyConfig;
use crate::error::InjectedError;
use crate::handler::TargetCallback;
use crate::{Error, Result};

/// Message given to injected errors built with a message constructor
pub const GENERATED_ERROR_MESSAGE: &str = "Generated by degradation proxy.";

/// Relative jitter applied around the demand time (±25%)
const JITTER: f64 = 0.25;

/// Policy deciding how each call is degraded
///
/// Implementations are shared read-only across concurrent calls.
#[async_trait]
pub trait DegradationStrategy: Send + Sync {
    /// Produce the plan for one call at the given pool utilization
    fn generate_plan(&self, utilization: f64) -> DegradationPlan;

    /// Whether calls should bypass the pool and run on the caller
    fn should_skip_degradation(&self) -> bool;

    /// Whether `operation` is exempt from degradation
    fn is_method_excluded(&self, operation: &str) -> bool;

    /// Whether the handler bounds its await by [`service_timeout`](Self::service_timeout)
    fn timeout_queues(&self) -> bool;

    /// The timeout used for bounded awaits
    fn service_timeout(&self) -> Duration;

    /// Invoke the target once the plan allows it to run
    ///
    /// The default passes straight through. An absent target is rejected.
    async fn override_result(&self, target: Option<&dyn TargetCallback>) -> Result<Value> {
        let Some(target) = target else {
            return Err(Error::InvalidArgument(
                "Target callback cannot be null".to_string(),
            ));
        };
        target.execute().await
    }
}

/// Healthy latency and the point at which a call counts as failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceProfile {
    demand_time: Duration,
    timeout: Duration,
}

impl ServiceProfile {
    /// Create a profile; the timeout is raised to at least the demand time
    #[must_use]
    pub fn new(demand_time: Duration, timeout: Duration) -> Self {
        Self {
            demand_time,
            timeout: timeout.max(demand_time),
        }
    }

    /// Create from signed milliseconds, clamping negatives to zero
    #[must_use]
    pub fn from_millis(demand_time: i64, timeout: i64) -> Self {
        let demand = demand_time.max(0);
        let timeout = timeout.max(demand);
        Self::new(
            Duration::from_millis(demand.unsigned_abs()),
            Duration::from_millis(timeout.unsigned_abs()),
        )
    }

    /// Baseline healthy latency
    #[must_use]
    pub fn demand_time(&self) -> Duration {
        self.demand_time
    }

    /// Failure point
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn timeout_millis(&self) -> f64 {
        self.timeout.as_secs_f64() * 1000.0
    }
}

/// Fraction of calls that must succeed, within `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct PassRate(f64);

impl PassRate {
    /// Every call passes
    pub const ALL: Self = Self(1.0);

    /// Create a pass rate, clamped into `[0, 1]`; NaN disables failures
    #[must_use]
    pub fn new(rate: f64) -> Self {
        if rate.is_nan() {
            Self::ALL
        } else {
            Self(rate.clamp(0.0, 1.0))
        }
    }

    /// Raw value
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether failure injection is disabled
    #[must_use]
    pub fn is_total(self) -> bool {
        self.0 >= 1.0
    }

    /// Utilization at which the normalized `e^x` CDF reaches this pass rate
    ///
    /// `F(x) = (e^x - 1) / (e - 1)`, so `x = ln(rate * (e - 1) + 1)`.
    #[must_use]
    pub fn utilization_threshold(self) -> f64 {
        if self.is_total() {
            1.0
        } else {
            (self.0 * (E - 1.0) + 1.0).ln()
        }
    }
}

impl Default for PassRate {
    fn default() -> Self {
        Self::ALL
    }
}

/// Operation names to degrade; empty degrades everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodFilter(HashSet<String>);

impl MethodFilter {
    /// Create a filter from operation names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Whether calls to `operation` skip degradation
    #[must_use]
    pub fn is_excluded(&self, operation: &str) -> bool {
        !self.0.is_empty() && !self.0.contains(operation)
    }

    /// Whether the filter is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What an injected failure looks like
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Candidate error kinds
    pub error_kinds: Vec<String>,
    /// Constructors for the error kinds
    pub registry: Arc<ErrorRegistry>,
    /// Canned value for [`FailurePriority::ReturnValue`]
    pub error_value: Option<Value>,
    /// Raise or return the canned value
    pub priority: FailurePriority,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            error_kinds: Vec::new(),
            registry: Arc::new(ErrorRegistry::builtin()),
            error_value: None,
            priority: FailurePriority::Raise,
        }
    }
}

/// Utilization-driven latency and failure injection
#[derive(Debug, Clone)]
pub struct DefaultStrategy {
    profile: ServiceProfile,
    pass_rate: PassRate,
    failure: FailureConfig,
    fast_fail: FastFail,
    timeout_queues: bool,
    methods: MethodFilter,
}

impl DefaultStrategy {
    /// Create a strategy that raises generic failures after the delay
    #[must_use]
    pub fn new(profile: ServiceProfile, pass_rate: PassRate) -> Self {
        Self {
            profile,
            pass_rate,
            failure: FailureConfig::default(),
            fast_fail: FastFail::Disabled,
            timeout_queues: false,
            methods: MethodFilter::default(),
        }
    }

    /// Build from configuration with the built-in error kinds
    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::from_config_with_registry(config, Arc::new(ErrorRegistry::builtin()))
    }

    /// Build from configuration with a custom error registry
    #[must_use]
    pub fn from_config_with_registry(config: &StrategyConfig, registry: Arc<ErrorRegistry>) -> Self {
        Self::new(
            ServiceProfile::new(config.demand_time, config.timeout),
            PassRate::new(config.pass_rate),
        )
        .with_failure(FailureConfig {
            error_kinds: config.error_kinds.clone(),
            registry,
            error_value: config.error_value.clone(),
            priority: config.failure_priority,
        })
        .with_fast_fail(config.fast_fail)
        .with_timeout_queues(config.timeout_queues)
        .with_methods(MethodFilter::new(config.methods.iter().cloned()))
    }

    /// Replace the service profile
    #[must_use]
    pub fn with_profile(mut self, profile: ServiceProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Replace the pass rate
    #[must_use]
    pub fn with_pass_rate(mut self, pass_rate: PassRate) -> Self {
        self.pass_rate = pass_rate;
        self
    }

    /// Set failure configuration
    #[must_use]
    pub fn with_failure(mut self, failure: FailureConfig) -> Self {
        self.failure = failure;
        self
    }

    /// Set the fast-fail mode
    #[must_use]
    pub fn with_fast_fail(mut self, fast_fail: FastFail) -> Self {
        self.fast_fail = fast_fail;
        self
    }

    /// Bound handler awaits by the timeout
    #[must_use]
    pub fn with_timeout_queues(mut self, enabled: bool) -> Self {
        self.timeout_queues = enabled;
        self
    }

    /// Degrade only the named operations
    #[must_use]
    pub fn with_methods(mut self, methods: MethodFilter) -> Self {
        self.methods = methods;
        self
    }

    /// Service profile
    #[must_use]
    pub fn profile(&self) -> ServiceProfile {
        self.profile
    }

    /// Pass rate
    #[must_use]
    pub fn pass_rate(&self) -> PassRate {
        self.pass_rate
    }

    /// Demand time with uniform ±25% jitter
    #[must_use]
    pub fn randomized_demand_time(&self) -> Duration {
        let jitter = rand::random_range(-JITTER..=JITTER);
        self.profile.demand_time.mul_f64(1.0 + jitter)
    }

    /// See [`PassRate::utilization_threshold`]
    #[must_use]
    pub fn utilization_threshold_for_pass_rate(&self) -> f64 {
        self.pass_rate.utilization_threshold()
    }

    /// Delay for a call at `utilization`
    ///
    /// Follows `u * e^u / e` of the timeout (with fresh jitter), never
    /// dropping below the jittered demand time. A zero demand time has no
    /// curve and yields no delay.
    #[must_use]
    pub fn adjusted_response_time(&self, utilization: f64) -> Duration {
        if self.profile.demand_time.is_zero() {
            return Duration::ZERO;
        }
        let u = if utilization.is_nan() {
            0.0
        } else {
            utilization.clamp(0.0, 1.0)
        };
        let jitter = rand::random_range(-JITTER..=JITTER);
        // demand time cancels out of (1+j) * demand * e^u * u * timeout / (demand * e)
        let curve_ms = ((1.0 + jitter) * u.exp() * u * self.profile.timeout_millis() / E).round();
        let curve = Duration::from_millis(curve_ms as u64);
        self.randomized_demand_time().max(curve)
    }

    /// Whether a call delayed by `adjusted_response_time` fails
    #[must_use]
    pub fn should_fail(&self, adjusted_response_time: Duration) -> bool {
        if self.pass_rate.is_total() {
            return false;
        }
        adjusted_response_time.as_secs_f64() * 1000.0
            > self.profile.timeout_millis() * self.utilization_threshold_for_pass_rate()
    }

    /// Pick one of the configured error kinds at random and build it
    #[must_use]
    pub fn choose_error(&self) -> Option<InjectedError> {
        let kinds = &self.failure.error_kinds;
        if kinds.is_empty() {
            return None;
        }
        let kind = &kinds[rand::random_range(0..kinds.len())];
        self.failure
            .registry
            .construct(kind, GENERATED_ERROR_MESSAGE)
    }
}

#[async_trait]
impl DegradationStrategy for DefaultStrategy {
    fn generate_plan(&self, utilization: f64) -> DegradationPlan {
        let adjusted = self.adjusted_response_time(utilization);
        let should_fail = self.should_fail(adjusted);

        DegradationPlan::new(
            adjusted,
            self.choose_error(),
            self.failure.error_value.clone(),
            should_fail,
            self.fast_fail,
            self.failure.priority,
        )
        .with_timeout(self.profile.timeout)
    }

    fn should_skip_degradation(&self) -> bool {
        self.pass_rate.value() == 1.0
            && self.profile.demand_time.is_zero()
            && self.profile.timeout.is_zero()
    }

    fn is_method_excluded(&self, operation: &str) -> bool {
        self.methods.is_excluded(operation)
    }

    fn timeout_queues(&self) -> bool {
        self.timeout_queues
    }

    fn service_timeout(&self) -> Duration {
        self.profile.timeout
    }
}
