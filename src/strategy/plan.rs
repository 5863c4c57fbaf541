//! Per-call degradation decision

use std::time::Duration;

use serde_json::Value;

use crate::config::{FailurePriority, FastFail};
use crate::error::InjectedError;
use crate::{Error, Result};

/// Decision record for a single call
///
/// Produced fresh by a strategy, consumed once by a
/// [`DegradationCallable`](crate::handler::DegradationCallable).
#[derive(Debug, Clone, PartialEq)]
pub struct DegradationPlan {
    adjusted_delay: Duration,
    chosen_error: Option<InjectedError>,
    error_value: Option<Value>,
    should_fail: bool,
    fast_fail: FastFail,
    failure_priority: FailurePriority,
    timeout: Option<Duration>,
}

impl DegradationPlan {
    /// Create a plan
    #[must_use]
    pub fn new(
        adjusted_delay: Duration,
        chosen_error: Option<InjectedError>,
        error_value: Option<Value>,
        should_fail: bool,
        fast_fail: FastFail,
        failure_priority: FailurePriority,
    ) -> Self {
        Self {
            adjusted_delay,
            chosen_error,
            error_value,
            should_fail,
            fast_fail,
            failure_priority,
            timeout: None,
        }
    }

    /// Record the service timeout the plan was generated under
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Service timeout in effect when the plan was generated
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Simulated latency
    #[must_use]
    pub fn adjusted_delay(&self) -> Duration {
        self.adjusted_delay
    }

    /// Error picked for this call, if any
    #[must_use]
    pub fn chosen_error(&self) -> Option<&InjectedError> {
        self.chosen_error.as_ref()
    }

    /// Canned value returned under [`FailurePriority::ReturnValue`]
    #[must_use]
    pub fn error_value(&self) -> Option<&Value> {
        self.error_value.as_ref()
    }

    /// Whether the call fails
    #[must_use]
    pub fn should_fail(&self) -> bool {
        self.should_fail
    }

    /// Fast-fail mode
    #[must_use]
    pub fn fast_fail(&self) -> FastFail {
        self.fast_fail
    }

    /// How the failure surfaces
    #[must_use]
    pub fn failure_priority(&self) -> FailurePriority {
        self.failure_priority
    }

    /// Whether the call fails without waiting for the delay
    #[must_use]
    pub fn fails_fast(&self) -> bool {
        self.should_fail && self.fast_fail == FastFail::Before
    }

    /// The outcome of a failing call
    ///
    /// Raises the chosen error (or a generic injected failure when none was
    /// produced), or returns the canned value (`null` when none is set).
    pub fn into_failure(self) -> Result<Value> {
        match self.failure_priority {
            FailurePriority::Raise => Err(Error::Injected(
                self.chosen_error.unwrap_or_else(InjectedError::fallback),
            )),
            FailurePriority::ReturnValue => Ok(self.error_value.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failing(priority: FailurePriority, error: Option<InjectedError>) -> DegradationPlan {
        DegradationPlan::new(
            Duration::from_millis(10),
            error,
            Some(json!({"error": true})),
            true,
            FastFail::After,
            priority,
        )
    }

    #[test]
    fn test_raise_uses_chosen_error() {
        let plan = failing(FailurePriority::Raise, Some(InjectedError::new("io", "x")));
        match plan.into_failure() {
            Err(Error::Injected(e)) => assert_eq!(e.kind, "io"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_raise_without_error_uses_fallback() {
        let plan = failing(FailurePriority::Raise, None);
        match plan.into_failure() {
            Err(Error::Injected(e)) => assert_eq!(e, InjectedError::fallback()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_return_value_yields_canned_value() {
        let plan = failing(FailurePriority::ReturnValue, None);
        assert_eq!(plan.into_failure().unwrap(), json!({"error": true}));
    }

    #[test]
    fn test_fails_fast_only_before() {
        let mut plan = failing(FailurePriority::Raise, None);
        assert!(!plan.fails_fast());
        plan.fast_fail = FastFail::Before;
        assert!(plan.fails_fast());
        plan.should_fail = false;
        assert!(!plan.fails_fast());
    }

    #[test]
    fn test_timeout_recorded_only_when_set() {
        let plan = failing(FailurePriority::Raise, None);
        assert_eq!(plan.timeout(), None);
        let plan = plan.with_timeout(Duration::from_millis(250));
        assert_eq!(plan.timeout(), Some(Duration::from_millis(250)));
    }
}
