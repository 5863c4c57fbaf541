//! Worker thread naming
//!
//! Names follow `threadfactory-<name>-groupnumber-<n>-thread-<m>`. Group
//! numbers come from a [`GroupSequence`] shared by every factory it is
//! handed to; thread numbers are per factory. Both start at 1.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default logical name for factories created without one
pub const UNNAMED: &str = "not named";

/// Monotonic group number generator
#[derive(Debug, Clone, Default)]
pub struct GroupSequence(Arc<AtomicUsize>);

impl GroupSequence {
    /// Create a sequence starting at 1
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next group number
    pub fn next_group(&self) -> usize {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Produces unique names for the worker threads of one pool
#[derive(Debug)]
pub struct WorkerNameFactory {
    name: String,
    group: usize,
    threads: AtomicUsize,
}

impl WorkerNameFactory {
    /// Create a factory, taking a group number from `sequence`
    #[must_use]
    pub fn new(name: &str, sequence: &GroupSequence) -> Self {
        let name = if name.is_empty() { UNNAMED } else { name };
        Self {
            name: name.to_string(),
            group: sequence.next_group(),
            threads: AtomicUsize::new(0),
        }
    }

    /// Logical factory name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group number assigned at construction
    #[must_use]
    pub fn group_number(&self) -> usize {
        self.group
    }

    /// Name for the next worker
    pub fn next_name(&self) -> String {
        let thread = self.threads.fetch_add(1, Ordering::Relaxed) + 1;
        format!(
            "threadfactory-{}-groupnumber-{}-thread-{}",
            self.name, self.group, thread
        )
    }
}
