//! Built-in behavior functions

use std::f64::consts::{E, TAU};

use serde_json::Value;
use tracing::debug;

use super::{
    ARG_AMPLITUDE, ARG_AT, ARG_CYCLES, ARG_FROM, ARG_TO, ARG_VALUE, BehaviorFunction, Params,
    elapsed, number, to_value,
};

/// Default step position (middle of the interval)
const DEFAULT_STEP_AT: f64 = 0.5;

/// Identity function: returns the `value` parameter unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl BehaviorFunction for Linear {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn evaluate(&self, params: &Params) -> Option<Value> {
        let value = params.get(ARG_VALUE).cloned();
        debug!(value = ?value, "apply function value");
        value
    }
}

/// Jumps from `from` to `to` once `elapsed` reaches `at`
#[derive(Debug, Clone, Copy, Default)]
pub struct Step;

impl BehaviorFunction for Step {
    fn name(&self) -> &'static str {
        "step"
    }

    fn evaluate(&self, params: &Params) -> Option<Value> {
        let from = number(params, ARG_FROM)?;
        let to = number(params, ARG_TO)?;
        let at = number(params, ARG_AT).unwrap_or(DEFAULT_STEP_AT);
        to_value(if elapsed(params) < at { from } else { to })
    }
}

/// Linear interpolation from `from` to `to` across the interval
#[derive(Debug, Clone, Copy, Default)]
pub struct Ramp;

impl BehaviorFunction for Ramp {
    fn name(&self) -> &'static str {
        "ramp"
    }

    fn evaluate(&self, params: &Params) -> Option<Value> {
        let from = number(params, ARG_FROM)?;
        let to = number(params, ARG_TO)?;
        to_value(from + (to - from) * elapsed(params))
    }
}

/// Follows the normalized `e^x` curve from `from` to `to`
///
/// Slow at the start of the interval and steep at the end, the same shape
/// the default strategy uses for failure probability.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exponential;

impl BehaviorFunction for Exponential {
    fn name(&self) -> &'static str {
        "exponential"
    }

    fn evaluate(&self, params: &Params) -> Option<Value> {
        let from = number(params, ARG_FROM)?;
        let to = number(params, ARG_TO)?;
        let x = elapsed(params);
        to_value(from + (to - from) * (x.exp() - 1.0) / (E - 1.0))
    }
}

/// Sine wave of `amplitude` around `value`, `cycles` periods per interval
#[derive(Debug, Clone, Copy, Default)]
pub struct Oscillating;

impl BehaviorFunction for Oscillating {
    fn name(&self) -> &'static str {
        "oscillating"
    }

    fn evaluate(&self, params: &Params) -> Option<Value> {
        let center = number(params, ARG_VALUE)?;
        let amplitude = number(params, ARG_AMPLITUDE).unwrap_or(0.0);
        let cycles = number(params, ARG_CYCLES).unwrap_or(1.0);
        to_value(center + amplitude * (TAU * cycles * elapsed(params)).sin())
    }
}
