//! Degradation handler and worker pool
//!
//! The handler gates every call through a [`DegradationStrategy`]. Degraded
//! calls run on a dedicated, fixed-size worker runtime whose threads are
//! named by a [`WorkerNameFactory`]; the caller awaits the result, bounded by
//! the timeout the plan was generated under when queue timeouts are enabled.
//!
//! A timed-out call is detached: the worker finishes in the background and
//! its result is dropped. The active count is released by a guard owned by
//! the worker task, so it is decremented exactly once however the call ends.

mod callable;

pub use callable::DegradationCallable;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::{FailurePriority, HandlerConfig};
use crate::naming::{GroupSequence, WorkerNameFactory};
use crate::stats::{DispatchStats, Outcome};
use crate::strategy::DegradationStrategy;
use crate::{Error, Result};

/// The real operation fronted by the proxy
#[async_trait]
pub trait TargetCallback: Send + Sync {
    /// Run the operation
    async fn execute(&self) -> Result<Value>;
}

/// Target backed by an async closure
pub struct FnTarget<F>(F);

#[async_trait]
impl<F, Fut> TargetCallback for FnTarget<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn execute(&self) -> Result<Value> {
        (self.0)().await
    }
}

/// Wrap an async closure as a target callback
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn TargetCallback>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnTarget(f))
}

/// Decrements the active count when dropped
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn acquire(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(active))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed-capacity pool of named workers
pub struct WorkerPool {
    runtime: Option<Runtime>,
    handle: Handle,
    permits: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    capacity: usize,
    name: String,
}

impl WorkerPool {
    /// Start `capacity` worker threads named by `names`
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero or the runtime cannot start.
    pub fn new(capacity: usize, names: WorkerNameFactory) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument(
                "Pool capacity must be at least 1".to_string(),
            ));
        }

        let name = names.name().to_string();
        let names = Arc::new(names);
        let runtime = Builder::new_multi_thread()
            .worker_threads(capacity)
            .thread_name_fn(move || names.next_name())
            .enable_time()
            .build()?;

        info!(pool = %name, capacity, "Worker pool started");

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(capacity)),
            active: Arc::new(AtomicUsize::new(0)),
            capacity,
            name,
        })
    }

    /// Maximum concurrently executing calls
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Calls dispatched and not yet finished
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// `active / capacity`, capped at 1
    ///
    /// A racy snapshot; it only biases the strategy's probability curve.
    #[must_use]
    pub fn percent_utilized(&self) -> f64 {
        (self.active_count() as f64 / self.capacity as f64).min(1.0)
    }

    /// Run `callable` on a worker
    pub fn submit(&self, callable: DegradationCallable) -> JoinHandle<Result<Value>> {
        let guard = ActiveGuard::acquire(&self.active);
        let permits = Arc::clone(&self.permits);

        self.handle.spawn(async move {
            let _guard = guard;
            let _permit = permits.acquire_owned().await.map_err(|_| Error::Shutdown)?;
            callable.call().await
        })
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            debug!(pool = %self.name, "Shutting down worker pool");
            self.permits.close();
            runtime.shutdown_background();
        }
    }
}

/// Routes calls through the degradation pipeline
pub struct DegradationHandler {
    strategy: Arc<dyn DegradationStrategy>,
    pool: WorkerPool,
    stats: Arc<DispatchStats>,
}

impl DegradationHandler {
    /// Create a handler with a pool of `pool_capacity` workers
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot start.
    pub fn new(
        strategy: Arc<dyn DegradationStrategy>,
        pool_capacity: usize,
        names: WorkerNameFactory,
    ) -> Result<Self> {
        Ok(Self {
            strategy,
            pool: WorkerPool::new(pool_capacity, names)?,
            stats: Arc::new(DispatchStats::new()),
        })
    }

    /// Create a handler from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot start.
    pub fn from_config(
        strategy: Arc<dyn DegradationStrategy>,
        config: &HandlerConfig,
        sequence: &GroupSequence,
    ) -> Result<Self> {
        Self::new(
            strategy,
            config.pool_capacity,
            WorkerNameFactory::new(&config.worker_name, sequence),
        )
    }

    /// The strategy deciding each call
    #[must_use]
    pub fn strategy(&self) -> &Arc<dyn DegradationStrategy> {
        &self.strategy
    }

    /// Outcome statistics
    #[must_use]
    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Pool capacity
    #[must_use]
    pub fn pool_capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Calls currently dispatched to the pool
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    /// Current pool utilization in `[0, 1]`
    #[must_use]
    pub fn percent_utilized(&self) -> f64 {
        self.pool.percent_utilized()
    }

    /// Run `target` for `operation`, degraded according to the strategy
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an absent target,
    /// [`Error::Timeout`] when a bounded await expires, injected failures as
    /// planned, and the target's own errors unchanged.
    #[tracing::instrument(skip_all, fields(operation = %operation))]
    pub async fn dispatch(
        &self,
        operation: &str,
        target: Option<Arc<dyn TargetCallback>>,
    ) -> Result<Value> {
        let Some(target) = target else {
            return Err(Error::InvalidArgument(
                "Target callback cannot be null".to_string(),
            ));
        };
        let started = Instant::now();

        if self.strategy.should_skip_degradation() || self.strategy.is_method_excluded(operation) {
            debug!("Degradation skipped, invoking target directly");
            let result = self.strategy.override_result(Some(target.as_ref())).await;
            let outcome = if result.is_ok() {
                Outcome::Bypassed
            } else {
                Outcome::TargetFailed
            };
            self.stats.record(operation, outcome, started.elapsed());
            return result;
        }

        let utilization = self.pool.percent_utilized();
        let plan = self.strategy.generate_plan(utilization);
        debug!(
            utilization,
            delay_ms = plan.adjusted_delay().as_millis(),
            should_fail = plan.should_fail(),
            "Generated degradation plan"
        );
        let canned = plan.should_fail() && plan.failure_priority() == FailurePriority::ReturnValue;
        // bound the await by the profile the plan came from
        let timeout = plan
            .timeout()
            .unwrap_or_else(|| self.strategy.service_timeout());

        let callable = DegradationCallable::new(plan, Some(target), Arc::clone(&self.strategy))?;
        let handle = self.pool.submit(callable);

        let result = if self.strategy.timeout_queues() {
            match tokio::time::timeout(timeout, handle).await {
                Ok(joined) => flatten(joined),
                Err(_elapsed) => {
                    warn!(timeout_ms = timeout.as_millis(), "Call timed out, detaching worker");
                    Err(Error::Timeout(timeout))
                }
            }
        } else {
            flatten(handle.await)
        };

        let outcome = match &result {
            Ok(_) if canned => Outcome::Canned,
            Ok(_) => Outcome::Passed,
            Err(Error::Injected(_)) => Outcome::Injected,
            Err(Error::Timeout(_)) => Outcome::TimedOut,
            Err(_) => Outcome::TargetFailed,
        };
        self.stats.record(operation, outcome, started.elapsed());

        result
    }
}

fn flatten(joined: std::result::Result<Result<Value>, JoinError>) -> Result<Value> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(Error::Shutdown),
        Err(e) => Err(Error::Worker(e.to_string())),
    }
}
