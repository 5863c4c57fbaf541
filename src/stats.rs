//! Dispatch statistics
//!
//! Tracks how calls through a handler ended and how long they took, so a
//! degradation scenario can be checked against its configured pass rate and
//! latency curve.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Default capacity for the latency histogram
const DEFAULT_HISTOGRAM_CAPACITY: usize = 10_000;

/// How a dispatched call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Target ran and returned a value
    Passed,
    /// Plan raised an injected error
    Injected,
    /// Plan returned the canned error value
    Canned,
    /// Handler gave up waiting
    TimedOut,
    /// Target ran and failed on its own, or the worker was lost
    TargetFailed,
    /// Degradation skipped, target ran on the caller
    Bypassed,
}

/// Outcome counters and latency samples for one handler
pub struct DispatchStats {
    passed: AtomicU64,
    injected: AtomicU64,
    canned: AtomicU64,
    timed_out: AtomicU64,
    target_failed: AtomicU64,
    bypassed: AtomicU64,
    /// Per-operation call counts
    operations: DashMap<String, AtomicU64>,
    latencies: RwLock<LatencyHistogram>,
}

impl DispatchStats {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTOGRAM_CAPACITY)
    }

    /// Create a tracker keeping at most `capacity` latency samples
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            passed: AtomicU64::new(0),
            injected: AtomicU64::new(0),
            canned: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            target_failed: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
            operations: DashMap::new(),
            latencies: RwLock::new(LatencyHistogram::new(capacity)),
        }
    }

    /// Record one finished call
    pub fn record(&self, operation: &str, outcome: Outcome, latency: Duration) {
        self.counter(outcome).fetch_add(1, Ordering::Relaxed);
        self.operations
            .entry(operation.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
        self.latencies.write().record(latency);
    }

    /// Number of calls that ended with `outcome`
    pub fn count(&self, outcome: Outcome) -> u64 {
        self.counter(outcome).load(Ordering::Relaxed)
    }

    /// Calls recorded for `operation`
    pub fn operation_count(&self, operation: &str) -> u64 {
        self.operations
            .get(operation)
            .map_or(0, |entry| entry.load(Ordering::Relaxed))
    }

    /// Snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        let passed = self.count(Outcome::Passed);
        let injected = self.count(Outcome::Injected);
        let canned = self.count(Outcome::Canned);
        let timed_out = self.count(Outcome::TimedOut);
        let target_failed = self.count(Outcome::TargetFailed);
        let bypassed = self.count(Outcome::Bypassed);
        let total = passed + injected + canned + timed_out + target_failed + bypassed;

        // bypassed calls were never degraded, so they count as passes
        let pass_ratio = if total == 0 {
            1.0
        } else {
            (passed + bypassed) as f64 / total as f64
        };

        let mut operations: Vec<(String, u64)> = self
            .operations
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        operations.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let latencies = self.latencies.read();

        StatsSnapshot {
            total,
            passed,
            injected,
            canned,
            timed_out,
            target_failed,
            bypassed,
            pass_ratio,
            latency_p50_ms: latencies.percentile(0.50).map(as_millis),
            latency_p95_ms: latencies.percentile(0.95).map(as_millis),
            latency_p99_ms: latencies.percentile(0.99).map(as_millis),
            operations: operations
                .into_iter()
                .map(|(operation, calls)| OperationCount { operation, calls })
                .collect(),
        }
    }

    fn counter(&self, outcome: Outcome) -> &AtomicU64 {
        match outcome {
            Outcome::Passed => &self.passed,
            Outcome::Injected => &self.injected,
            Outcome::Canned => &self.canned,
            Outcome::TimedOut => &self.timed_out,
            Outcome::TargetFailed => &self.target_failed,
            Outcome::Bypassed => &self.bypassed,
        }
    }
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Calls recorded
    pub total: u64,
    /// Calls whose target returned a value
    pub passed: u64,
    /// Calls failed with an injected error
    pub injected: u64,
    /// Calls answered with the canned error value
    pub canned: u64,
    /// Calls abandoned after the await timeout
    pub timed_out: u64,
    /// Calls whose target failed on its own
    pub target_failed: u64,
    /// Calls that skipped degradation
    pub bypassed: u64,
    /// Fraction of calls that passed (including bypassed)
    pub pass_ratio: f64,
    /// 50th percentile latency (milliseconds)
    pub latency_p50_ms: Option<u64>,
    /// 95th percentile latency (milliseconds)
    pub latency_p95_ms: Option<u64>,
    /// 99th percentile latency (milliseconds)
    pub latency_p99_ms: Option<u64>,
    /// Per-operation counts, busiest first
    pub operations: Vec<OperationCount>,
}

/// Calls recorded for one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCount {
    /// Operation name
    pub operation: String,
    /// Number of calls
    pub calls: u64,
}

/// Bounded latency samples for percentile calculation
struct LatencyHistogram {
    /// Recent samples in microseconds, oldest first
    samples: VecDeque<u64>,
    capacity: usize,
}

impl LatencyHistogram {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(DEFAULT_HISTOGRAM_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    fn record(&mut self, latency: Duration) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples
            .push_back(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
    }

    /// Percentile in `[0, 1]`
    fn percentile(&self, p: f64) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let index = ((sorted.len() as f64) * p).floor() as usize;
        let index = index.min(sorted.len() - 1);
        Some(Duration::from_micros(sorted[index]))
    }
}
