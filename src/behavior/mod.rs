//! Time-varying behavior functions
//!
//! A behavior function maps named parameters to an output value. Interval
//! aware functions additionally read the `elapsed` parameter, the caller's
//! position within a [`BehaviorInterval`] as a fraction in `[0, 1)`. This
//! lets strategy parameters such as demand time or pass rate ramp, step or
//! oscillate over a test window instead of staying fixed.

mod functions;
mod interval;

pub use functions::{Exponential, Linear, Oscillating, Ramp, Step};
pub use interval::{BehaviorInterval, BehaviorSchedule, ParamBounds};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named function parameters
pub type Params = HashMap<String, Value>;

/// Pass-through input value
pub const ARG_VALUE: &str = "value";
/// Elapsed fraction of the active interval, injected by [`BehaviorInterval`]
pub const ARG_ELAPSED: &str = "elapsed";
/// Start value for interpolating functions
pub const ARG_FROM: &str = "from";
/// End value for interpolating functions
pub const ARG_TO: &str = "to";
/// Step position as a fraction of the interval
pub const ARG_AT: &str = "at";
/// Oscillation amplitude
pub const ARG_AMPLITUDE: &str = "amplitude";
/// Number of full oscillations per interval
pub const ARG_CYCLES: &str = "cycles";

/// A function computing a parameter value from named inputs
pub trait BehaviorFunction: Send + Sync {
    /// Short name used in logs and configuration
    fn name(&self) -> &'static str;

    /// Evaluate the function, `None` when required inputs are missing
    fn evaluate(&self, params: &Params) -> Option<Value>;
}

/// Built-in behavior functions selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    /// Identity on `value`
    #[default]
    Linear,
    /// `from` before `at`, `to` after
    Step,
    /// Straight line from `from` to `to`
    Ramp,
    /// Exponential curve from `from` to `to`
    Exponential,
    /// Sine wave around `value`
    Oscillating,
}

impl BehaviorKind {
    /// The function implementing this kind
    #[must_use]
    pub fn function(self) -> &'static dyn BehaviorFunction {
        match self {
            Self::Linear => &Linear,
            Self::Step => &Step,
            Self::Ramp => &Ramp,
            Self::Exponential => &Exponential,
            Self::Oscillating => &Oscillating,
        }
    }
}

/// Read a numeric parameter
pub(crate) fn number(params: &Params, key: &str) -> Option<f64> {
    params.get(key).and_then(Value::as_f64)
}

/// Read the elapsed fraction, defaulting to the interval start
pub(crate) fn elapsed(params: &Params) -> f64 {
    number(params, ARG_ELAPSED).map_or(0.0, |x| x.clamp(0.0, 1.0))
}

/// Wrap a float as a JSON number, `None` for NaN or infinity
pub(crate) fn to_value(x: f64) -> Option<Value> {
    serde_json::Number::from_f64(x).map(Value::Number)
}
