//! Execution of a single degradation plan

use std::sync::Arc;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::TargetCallback;
use crate::strategy::{DegradationPlan, DegradationStrategy};
use crate::{Error, Result};

/// Applies a plan to one call: wait, then fail or run the target
pub struct DegradationCallable {
    plan: DegradationPlan,
    target: Arc<dyn TargetCallback>,
    strategy: Arc<dyn DegradationStrategy>,
}

impl DegradationCallable {
    /// Create a callable; an absent target is rejected before anything runs
    pub fn new(
        plan: DegradationPlan,
        target: Option<Arc<dyn TargetCallback>>,
        strategy: Arc<dyn DegradationStrategy>,
    ) -> Result<Self> {
        let target = target.ok_or_else(|| {
            Error::InvalidArgument("Target callback cannot be null".to_string())
        })?;
        Ok(Self {
            plan,
            target,
            strategy,
        })
    }

    /// The plan this callable executes
    #[must_use]
    pub fn plan(&self) -> &DegradationPlan {
        &self.plan
    }

    /// Run the plan
    pub async fn call(self) -> Result<Value> {
        if self.plan.fails_fast() {
            warn!("Injecting failure before delay");
            return self.plan.into_failure();
        }

        let delay = self.plan.adjusted_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis(), "Delaying call");
            sleep(delay).await;
        }

        if self.plan.should_fail() {
            warn!(delay_ms = delay.as_millis(), "Injecting failure after delay");
            return self.plan.into_failure();
        }

        self.strategy
            .override_result(Some(self.target.as_ref()))
            .await
    }
}
