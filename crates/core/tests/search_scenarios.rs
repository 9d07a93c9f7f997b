// End-to-end search scenarios against the simulated service
//
// Every test builds a real worker pool and controller; only the remote API is
// simulated.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::json;

use ngsiem_core::executor::WorkerPoolStatus;
use ngsiem_core::{
    discover_fields, JobStatus, PollSchedule, SearchController, SearchError, SearchRequest,
    SimulatedClientFactory, SimulatedSearchService, StopOutcome, ToolDispatcher, WorkerPool,
    WorkerPoolConfig,
};

fn setup(
    service: SimulatedSearchService,
    workers: usize,
) -> (SearchController<SimulatedClientFactory>, Arc<SimulatedSearchService>) {
    let service = Arc::new(service);
    let pool = WorkerPool::new(
        SimulatedClientFactory::new(Arc::clone(&service)),
        WorkerPoolConfig::new().with_size(workers),
    )
    .expect("pool should start");
    (SearchController::new(Arc::new(pool)), service)
}

fn millis(max_wait: u64, poll_interval: u64) -> PollSchedule {
    PollSchedule::from_durations(
        Duration::from_millis(max_wait),
        Duration::from_millis(poll_interval),
    )
    .unwrap()
}

fn request() -> SearchRequest {
    SearchRequest::new("search-all", "#event_simpleName=ProcessRollup2 | count()")
}

#[test_log::test(tokio::test)]
async fn test_done_on_first_poll_returns_events() {
    let events = vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})];
    let (controller, service) = setup(SimulatedSearchService::new().with_events(events), 2);

    let started = Instant::now();
    let completed = controller
        .search_and_wait(request(), PollSchedule::from_secs(10, 5).unwrap())
        .await
        .unwrap();

    assert_eq!(completed.status, JobStatus::Done);
    assert_eq!(completed.event_count, 3);
    assert_eq!(completed.events.len(), 3);
    assert_eq!(completed.poll_count, 1);
    // Done on the first check means no sleep at all
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(service.stats().starts, 1);
}

#[test_log::test(tokio::test)]
async fn test_done_after_two_running_polls() {
    let (controller, service) = setup(SimulatedSearchService::new().completing_after(2), 2);
    let schedule = millis(5_000, 50);

    let completed = controller.search_and_wait(request(), schedule).await.unwrap();

    assert_eq!(completed.event_count, 0);
    assert_eq!(completed.poll_count, 3);
    assert!(completed.elapsed >= schedule.poll_interval() * 2);
    assert_eq!(service.stats().polls, 3);
}

#[test_log::test(tokio::test)]
async fn test_never_done_times_out_with_job_id() {
    let (controller, service) = setup(SimulatedSearchService::new().never_completing(), 2);

    let started = Instant::now();
    let err = controller
        .search_and_wait(request(), PollSchedule::from_secs(5, 2).unwrap())
        .await
        .unwrap_err();
    let waited = started.elapsed();

    assert!(waited >= Duration::from_secs(5), "returned early: {:?}", waited);
    assert!(waited < Duration::from_secs(8), "returned late: {:?}", waited);

    let SearchError::Timeout {
        job_id, poll_count, ..
    } = &err
    else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(*poll_count, 3);
    assert!(err.is_retryable());

    // The remote job was left running: it can still be polled, then stopped
    let status = controller.poll_search("search-all", job_id).await.unwrap();
    assert!(!status.done);
    assert_eq!(service.stats().stops, 0);

    let stopped = controller.stop_search("search-all", job_id).await.unwrap();
    assert_eq!(stopped.status, JobStatus::Cancelled);
    assert_eq!(service.stats().stops, 1);
}

#[test_log::test(tokio::test)]
async fn test_deadline_tolerance_for_millisecond_schedules() {
    let (controller, _service) = setup(SimulatedSearchService::new().never_completing(), 1);

    for (max_wait, interval) in [(100, 30), (120, 120), (60, 10)] {
        let schedule = millis(max_wait, interval);
        let started = Instant::now();
        let err = controller.search_and_wait(request(), schedule).await.unwrap_err();
        let waited = started.elapsed();

        assert!(matches!(err, SearchError::Timeout { .. }));
        assert!(waited >= schedule.max_wait());
        assert!(
            waited < schedule.max_wait() + schedule.poll_interval() + Duration::from_millis(500),
            "{max_wait}/{interval}: waited {waited:?}"
        );
    }
}

#[test_log::test(tokio::test)]
async fn test_discover_fields_unions_record_keys() {
    let (controller, service) = setup(
        SimulatedSearchService::new()
            .with_events(vec![json!({"a": 1, "b": 2}), json!({"a": 1, "c": 3})]),
        2,
    );

    let schema = discover_fields(&controller, "search-all", 10).await.unwrap();

    assert_eq!(schema.fields, vec!["a", "b", "c"]);
    assert_eq!(schema.field_count, 3);
    assert_eq!(schema.repository, "search-all");
    assert!(schema.warning.is_none());
    assert_eq!(service.stats().starts, 1);
}

#[test_log::test(tokio::test)]
async fn test_discover_fields_empty_result_warns() {
    let (controller, _service) = setup(SimulatedSearchService::new(), 1);

    let schema = discover_fields(&controller, "empty_repo", 10).await.unwrap();

    assert_eq!(schema.field_count, 0);
    assert!(schema.fields.is_empty());
    assert!(schema.warning.is_some());
}

#[test_log::test(tokio::test)]
async fn test_invalid_repository_makes_no_remote_calls() {
    let (controller, service) = setup(SimulatedSearchService::new(), 2);

    let err = discover_fields(&controller, "bad repo!", 10).await.unwrap_err();
    assert!(matches!(err, SearchError::Validation(_)));

    let err = discover_fields(&controller, "search-all", 121).await.unwrap_err();
    assert!(matches!(err, SearchError::Validation(_)));

    assert_eq!(service.stats().calls, 0);
    assert_eq!(service.stats().clients_created, 0);
}

#[test_log::test(tokio::test)]
async fn test_schedule_boundaries_rejected_before_any_call() {
    let (controller, service) = setup(SimulatedSearchService::new(), 1);
    let dispatcher =
        ToolDispatcher::new(controller).with_default_repository(Some("search-all".into()));

    for (max_wait, interval) in [(0, 2), (300, 0), (3601, 2), (300, 61)] {
        let err = dispatcher
            .call(
                "search_and_wait",
                json!({
                    "query_string": "*",
                    "max_wait_seconds": max_wait,
                    "poll_interval": interval,
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error", "{max_wait}/{interval}");
    }
    assert_eq!(service.stats().calls, 0);
    assert_eq!(service.stats().clients_created, 0);

    // The edges of the accepted ranges reach the remote service
    dispatcher
        .call(
            "search_and_wait",
            json!({"query_string": "*", "max_wait_seconds": 3600, "poll_interval": 60}),
        )
        .await
        .unwrap();
    assert_eq!(service.stats().starts, 1);
}

#[test_log::test(tokio::test)]
async fn test_empty_query_rejected_before_any_call() {
    let (controller, service) = setup(SimulatedSearchService::new(), 1);

    let err = controller
        .search_and_wait(SearchRequest::new("search-all", " "), millis(100, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Validation(_)));

    let err = controller
        .start_search(SearchRequest::new("", "*"))
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Validation(_)));

    assert_eq!(service.stats().calls, 0);
}

#[test_log::test(tokio::test)]
async fn test_polling_a_done_job_is_idempotent() {
    let (controller, _service) = setup(
        SimulatedSearchService::new().with_events(vec![json!({"x": 1}), json!({"x": 2})]),
        3,
    );

    let started = controller.start_search(request()).await.unwrap();
    let first = controller
        .poll_search("search-all", &started.job_id)
        .await
        .unwrap();
    assert!(first.done);

    for _ in 0..5 {
        let again = controller
            .poll_search("search-all", &started.job_id)
            .await
            .unwrap();
        assert_eq!(again.status, first.status);
        assert_eq!(again.event_count, first.event_count);
    }
}

#[test_log::test(tokio::test)]
async fn test_stopping_tracked_jobs() {
    let (controller, service) = setup(SimulatedSearchService::new(), 1);

    // A finished job is left alone
    let mut job = controller.start_job(request()).await.unwrap();
    controller.poll_job(&mut job).await.unwrap();
    assert_eq!(job.status(), JobStatus::Done);

    let outcome = controller.stop_job(&mut job).await.unwrap();
    assert!(matches!(
        outcome,
        StopOutcome::AlreadyTerminal {
            status: JobStatus::Done,
            ..
        }
    ));
    assert_eq!(job.status(), JobStatus::Done);
    assert_eq!(service.stats().stops, 0);
}

#[test_log::test(tokio::test)]
async fn test_start_failure_leaves_job_in_error() {
    let (controller, service) = setup(SimulatedSearchService::new().with_start_status(401), 1);

    let err = controller
        .search_and_wait(request(), millis(1_000, 10))
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::Remote { status: 401, .. }));
    assert!(!err.is_retryable());
    assert_eq!(service.stats().polls, 0);
}

#[test_log::test(tokio::test)]
async fn test_missing_job_id_is_unexpected() {
    let (controller, _service) = setup(SimulatedSearchService::new().without_job_id(), 1);

    let err = controller.start_search(request()).await.unwrap_err();
    match err {
        SearchError::Unexpected { context, .. } => {
            assert!(context.contains("search-all"));
            assert!(context.contains("ProcessRollup2"));
        }
        other => panic!("expected unexpected error, got {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn test_poll_failure_carries_job_context() {
    let (controller, _service) = setup(SimulatedSearchService::new().with_poll_status(503), 1);

    let err = controller
        .search_and_wait(request(), millis(1_000, 10))
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::Remote { status: 503, .. }));
    assert!(err.job_id().is_some());
    assert!(err.is_retryable());
}

#[test_log::test(tokio::test)]
async fn test_client_construction_failure_is_configuration_error() {
    let service = Arc::new(SimulatedSearchService::new());
    let pool = WorkerPool::new(
        SimulatedClientFactory::failing(Arc::clone(&service)),
        WorkerPoolConfig::new().with_size(1),
    )
    .unwrap();
    let controller = SearchController::new(Arc::new(pool));

    let err = controller.start_search(request()).await.unwrap_err();
    assert!(matches!(err, SearchError::Configuration(_)));
    assert_eq!(service.stats().calls, 0);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_concurrent_searches_never_share_a_client() {
    const WORKERS: usize = 4;
    let (controller, service) = setup(
        SimulatedSearchService::new()
            .completing_after(3)
            .with_call_latency(Duration::from_millis(5)),
        WORKERS,
    );

    let searches = (0..24).map(|i| {
        let controller = controller.clone();
        async move {
            controller
                .search_and_wait(
                    SearchRequest::new("search-all", format!("#id={}", i)),
                    millis(10_000, 5),
                )
                .await
        }
    });
    let results = join_all(searches).await;

    for result in &results {
        let completed = result.as_ref().unwrap();
        assert_eq!(completed.poll_count, 4);
    }

    let stats = service.stats();
    assert_eq!(stats.overlapping_calls, 0);
    assert_eq!(stats.foreign_thread_calls, 0);
    assert!(stats.clients_created <= WORKERS);
    assert!(stats.max_concurrent_calls <= WORKERS);
    assert_eq!(stats.starts, 24);
    assert_eq!(stats.polls, 24 * 4);
}

#[test_log::test(tokio::test(flavor = "current_thread"))]
async fn test_single_threaded_caller_runs_searches_in_parallel() {
    let (controller, _service) = setup(
        SimulatedSearchService::new().with_call_latency(Duration::from_millis(200)),
        4,
    );

    // Four start+poll pairs of 400ms each; serialized they would take 1.6s
    let started = Instant::now();
    let results = join_all((0..4).map(|_| {
        let controller = controller.clone();
        async move { controller.search_and_wait(request(), millis(5_000, 10)).await }
    }))
    .await;

    assert!(results.iter().all(Result::is_ok));
    assert!(
        started.elapsed() < Duration::from_millis(1_200),
        "searches were serialized: {:?}",
        started.elapsed()
    );
}

#[test_log::test(tokio::test)]
async fn test_calls_after_shutdown_fail() {
    let (controller, service) = setup(SimulatedSearchService::new(), 2);

    controller.search_and_wait(request(), millis(1_000, 10)).await.unwrap();
    controller.pool().shutdown().await;
    assert_eq!(controller.pool().status(), WorkerPoolStatus::Stopped);

    let err = controller.start_search(request()).await.unwrap_err();
    assert!(matches!(err, SearchError::Unexpected { .. }));
    assert_eq!(service.stats().starts, 1);
}
