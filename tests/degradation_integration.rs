//! End-to-end tests: configuration through handler dispatch

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use degradation_proxy::config::Config;
use degradation_proxy::handler::{DegradationHandler, TargetCallback, from_fn};
use degradation_proxy::naming::{GroupSequence, WorkerNameFactory};
use degradation_proxy::simulate::{echo_target, handler_from_config, run_load, sample_plans};
use degradation_proxy::stats::Outcome;
use degradation_proxy::strategy::{
    DefaultStrategy, DegradationStrategy, ErrorRegistry, FailureConfig, FailurePriority,
    PassRate, ServiceProfile,
};
use degradation_proxy::Error;
use serde_json::json;

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

fn counting_target(calls: &Arc<AtomicUsize>) -> Arc<dyn TargetCallback> {
    let calls = Arc::clone(calls);
    from_fn(move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!("real"))
        }
    })
}

#[tokio::test]
async fn test_default_config_bypasses_everything() {
    let config = Config::default();
    let handler = handler_from_config(&config, &GroupSequence::new()).unwrap();

    let snapshot = run_load(&handler, "get", 20, 5).await;
    assert_eq!(snapshot.total, 20);
    assert_eq!(snapshot.bypassed, 20);
    assert_eq!(snapshot.pass_ratio, 1.0);
    assert_eq!(handler.active_count(), 0);
}

#[tokio::test]
async fn test_zero_pass_rate_config_injects_configured_errors() {
    let file = write_config(
        r"
strategy:
  demand_time: 2
  timeout: 10ms
  pass_rate: 0.0
  error_kinds: [unavailable]
handler:
  pool_capacity: 4
  worker_name: flaky
",
    );
    let config = Config::load(Some(file.path())).unwrap();
    let handler = handler_from_config(&config, &GroupSequence::new()).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let err = handler
            .dispatch("get", Some(counting_target(&calls)))
            .await
            .unwrap_err();
        match err {
            Error::Injected(injected) => {
                assert_eq!(injected.kind, "unavailable");
                assert_eq!(injected.message, "Generated by degradation proxy.");
            }
            other => panic!("expected injected error, got {other:?}"),
        }
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(handler.stats().count(Outcome::Injected), 10);
}

#[tokio::test]
async fn test_canned_value_replaces_failure() {
    let file = write_config(
        r#"
strategy:
  demand_time: 1
  timeout: 5
  pass_rate: 0.0
  failure_priority: return_value
  error_value: { "status": "degraded" }
"#,
    );
    let config = Config::load(Some(file.path())).unwrap();
    let handler = handler_from_config(&config, &GroupSequence::new()).unwrap();

    let value = handler.dispatch("get", Some(echo_target("get"))).await.unwrap();
    assert_eq!(value, json!({ "status": "degraded" }));
    assert_eq!(handler.stats().count(Outcome::Canned), 1);
}

#[tokio::test]
async fn test_method_allowlist_bypasses_other_operations() {
    let mut config = Config::default();
    config.strategy.demand_time = Duration::from_millis(1);
    config.strategy.timeout = Duration::from_millis(5);
    config.strategy.pass_rate = 0.0;
    config.strategy.methods = vec!["write".to_string()];
    let handler = handler_from_config(&config, &GroupSequence::new()).unwrap();

    assert_eq!(
        handler.dispatch("read", Some(echo_target("read"))).await.unwrap(),
        json!({ "operation": "read", "ok": true })
    );
    assert!(handler
        .dispatch("write", Some(echo_target("write")))
        .await
        .unwrap_err()
        .is_injected());
    assert_eq!(handler.stats().count(Outcome::Bypassed), 1);
    assert_eq!(handler.stats().count(Outcome::Injected), 1);
}

#[tokio::test]
async fn test_bounded_await_only_passes_or_times_out() {
    let mut config = Config::default();
    config.strategy.demand_time = Duration::from_millis(40);
    config.strategy.timeout = Duration::from_millis(40);
    config.strategy.timeout_queues = true;
    config.handler.pool_capacity = 8;
    let handler = handler_from_config(&config, &GroupSequence::new()).unwrap();

    let snapshot = run_load(&handler, "slow", 16, 8).await;
    assert_eq!(snapshot.total, 16);
    assert_eq!(snapshot.target_failed, 0);
    assert_eq!(snapshot.canned, 0);
    assert_eq!(snapshot.passed + snapshot.timed_out + snapshot.injected, 16);
    assert!(snapshot.timed_out > 0);

    // detached workers finish within the maximum delay
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handler.active_count(), 0);
}

#[tokio::test]
async fn test_handlers_get_distinct_worker_groups() {
    let strategy: Arc<dyn DegradationStrategy> = Arc::new(DefaultStrategy::new(
        ServiceProfile::from_millis(1, 5),
        PassRate::ALL,
    ));
    let sequence = GroupSequence::new();
    let first = DegradationHandler::new(
        Arc::clone(&strategy),
        1,
        WorkerNameFactory::new("svc", &sequence),
    )
    .unwrap();
    let second =
        DegradationHandler::new(strategy, 1, WorkerNameFactory::new("svc", &sequence)).unwrap();

    let thread_name = || {
        from_fn(|| async {
            Ok(json!(std::thread::current().name().unwrap_or_default().to_string()))
        })
    };

    let a = first.dispatch("op", Some(thread_name())).await.unwrap();
    let b = second.dispatch("op", Some(thread_name())).await.unwrap();
    assert!(a.as_str().unwrap().starts_with("threadfactory-svc-groupnumber-1-thread-"));
    assert!(b.as_str().unwrap().starts_with("threadfactory-svc-groupnumber-2-thread-"));
}

#[tokio::test]
async fn test_custom_error_registry() {
    let mut registry = ErrorRegistry::new();
    registry.register_parameterless("quota", || {
        Ok(degradation_proxy::InjectedError::new("quota", "limit reached"))
    });

    let strategy = DefaultStrategy::new(ServiceProfile::from_millis(1, 5), PassRate::new(0.0))
        .with_failure(FailureConfig {
            error_kinds: vec!["quota".to_string()],
            registry: Arc::new(registry),
            error_value: None,
            priority: FailurePriority::Raise,
        });
    let handler = DegradationHandler::new(
        Arc::new(strategy),
        2,
        WorkerNameFactory::new("quota", &GroupSequence::new()),
    )
    .unwrap();

    let err = handler.dispatch("op", Some(echo_target("op"))).await.unwrap_err();
    assert_eq!(err.to_string(), "Injected failure: quota: limit reached");
}

#[test]
fn test_plan_sampling_from_yaml() {
    let file = write_config(
        r"
strategy:
  demand_time: 10
  timeout: 100
  pass_rate: 0.9
",
    );
    let config = Config::load(Some(file.path())).unwrap();
    let strategy = DefaultStrategy::from_config(&config.strategy);

    let idle = sample_plans(&strategy, 0.0, 2000);
    assert_eq!(idle.failures, 0);

    // fails when (1 + jitter) * timeout exceeds timeout * ln(0.9(e - 1) + 1)
    let saturated = sample_plans(&strategy, 1.0, 2000);
    assert!((0.55..0.71).contains(&saturated.failure_ratio));
    assert!(saturated.delay_mean_ms > idle.delay_mean_ms);
}
