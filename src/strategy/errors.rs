//! Registry of injectable error kinds

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::InjectedError;

/// Constructor taking a descriptive message
pub type MessageConstructor =
    Arc<dyn Fn(&str) -> std::result::Result<InjectedError, String> + Send + Sync>;

/// Constructor taking no arguments
pub type DefaultConstructor =
    Arc<dyn Fn() -> std::result::Result<InjectedError, String> + Send + Sync>;

#[derive(Clone, Default)]
struct Constructors {
    with_message: Option<MessageConstructor>,
    parameterless: Option<DefaultConstructor>,
}

/// Maps error-kind tags to constructors
///
/// Construction prefers the message constructor and falls back to the
/// parameterless one. A constructor returning `Err` is logged and treated as
/// "no error produced".
#[derive(Clone, Default)]
pub struct ErrorRegistry {
    kinds: HashMap<String, Constructors>,
}

impl fmt::Debug for ErrorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.kinds.keys().collect();
        kinds.sort();
        f.debug_struct("ErrorRegistry").field("kinds", &kinds).finish()
    }
}

impl ErrorRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in kinds: `io`, `timeout`, `unavailable`, `internal`
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for kind in ["io", "timeout", "unavailable", "internal"] {
            registry.register_with_message(kind, move |msg| Ok(InjectedError::new(kind, msg)));
        }
        registry
    }

    /// Register a kind built from a message
    pub fn register_with_message<F>(&mut self, kind: &str, constructor: F) -> &mut Self
    where
        F: Fn(&str) -> std::result::Result<InjectedError, String> + Send + Sync + 'static,
    {
        self.kinds.entry(kind.to_string()).or_default().with_message = Some(Arc::new(constructor));
        self
    }

    /// Register a kind built without arguments
    pub fn register_parameterless<F>(&mut self, kind: &str, constructor: F) -> &mut Self
    where
        F: Fn() -> std::result::Result<InjectedError, String> + Send + Sync + 'static,
    {
        self.kinds.entry(kind.to_string()).or_default().parameterless = Some(Arc::new(constructor));
        self
    }

    /// Whether `kind` is registered
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Build an error of `kind`, `None` if the kind is unknown or construction fails
    #[must_use]
    pub fn construct(&self, kind: &str, message: &str) -> Option<InjectedError> {
        let Some(constructors) = self.kinds.get(kind) else {
            warn!(kind, "Unknown error kind, no error produced");
            return None;
        };

        let built = match (&constructors.with_message, &constructors.parameterless) {
            (Some(with_message), _) => with_message(message),
            (None, Some(parameterless)) => parameterless(),
            (None, None) => Err("no constructor registered".to_string()),
        };

        match built {
            Ok(error) => Some(error),
            Err(reason) => {
                warn!(kind, reason = %reason, "Failed to construct error, no error produced");
                None
            }
        }
    }
}
