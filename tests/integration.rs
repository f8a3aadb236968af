//! End-to-end tests against a live Redis server. Each test uses its own
//! queue name under a dedicated test prefix so runs don't collide.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use jet_queue::{
    BackoffKind, BackoffOptions, ConnectionOptions, JobOptions, JobStatus, Queue, QueueOptions,
    Worker, WorkerOptions,
};

fn test_connection() -> ConnectionOptions {
    ConnectionOptions {
        host: "localhost".to_string(),
        port: 6379,
        password: None,
    }
}

async fn fresh_queue(name: &str) -> Queue {
    Queue::new(
        name,
        test_connection(),
        QueueOptions {
            prefix: "jet_test".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("redis server not available for testing")
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn enqueue_and_read_back() {
    let queue = fresh_queue("enqueue_and_read_back").await;

    let job = queue
        .add("greet", serde_json::json!({"name": "ada"}), None)
        .await
        .unwrap();

    let fetched = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched.id, job.id);
    assert_eq!(fetched.status, JobStatus::Waiting);
    assert_eq!(fetched.data["name"], "ada");

    queue.remove_job(job.id).await.unwrap();
    assert!(queue.get_job(job.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn delayed_job_is_not_immediately_waiting() {
    let queue = fresh_queue("delayed_job_is_not_immediately_waiting").await;

    let options = JobOptions {
        delay: 5_000,
        ..Default::default()
    };
    let job = queue
        .add("later", serde_json::json!({}), Some(options))
        .await
        .unwrap();

    let fetched = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, JobStatus::Delayed);

    queue.remove_job(job.id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn retry_then_success() {
    let queue = fresh_queue("retry_then_success").await;
    let worker = Worker::new(
        "retry_then_success",
        "jet_test",
        test_connection(),
        WorkerOptions {
            concurrency: 1,
            max_jobs_per_worker: None,
        },
    )
    .await
    .unwrap();

    let attempt = Arc::new(AtomicU32::new(0));
    let attempt_for_handler = attempt.clone();

    worker
        .process(move |_job| {
            let attempt = attempt_for_handler.clone();
            async move {
                if attempt.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("first attempt fails".to_string())
                } else {
                    Ok(serde_json::json!({"ok": true}))
                }
            }
        })
        .await
        .unwrap();

    let options = JobOptions {
        attempts: 2,
        backoff: Some(BackoffOptions {
            kind: BackoffKind::Fixed,
            delay: 50,
        }),
        ..Default::default()
    };
    let job = queue
        .add("flaky", serde_json::json!({}), Some(options))
        .await
        .unwrap();

    tokio::time::sleep(StdDuration::from_millis(2_000)).await;

    let fetched = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, JobStatus::Completed);
    assert_eq!(attempt.load(Ordering::SeqCst), 2);

    worker.close().await;
    queue.remove_job(job.id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn retry_exhaustion_marks_job_failed() {
    let queue = fresh_queue("retry_exhaustion_marks_job_failed").await;
    let worker = Worker::new(
        "retry_exhaustion_marks_job_failed",
        "jet_test",
        test_connection(),
        WorkerOptions::default(),
    )
    .await
    .unwrap();

    worker
        .process(|_job| async move { Err::<serde_json::Value, _>("always fails".to_string()) })
        .await
        .unwrap();

    let options = JobOptions {
        attempts: 2,
        backoff: Some(BackoffOptions {
            kind: BackoffKind::Fixed,
            delay: 20,
        }),
        ..Default::default()
    };
    let job = queue
        .add("doomed", serde_json::json!({}), Some(options))
        .await
        .unwrap();

    tokio::time::sleep(StdDuration::from_millis(1_000)).await;

    let fetched = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, JobStatus::Failed);
    assert_eq!(fetched.attempts_made, 2);
    assert!(fetched.failed_reason.is_some());

    worker.close().await;
    queue.remove_job(job.id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn handler_timeout_counts_as_failure() {
    let queue = fresh_queue("handler_timeout_counts_as_failure").await;
    let worker = Worker::new(
        "handler_timeout_counts_as_failure",
        "jet_test",
        test_connection(),
        WorkerOptions::default(),
    )
    .await
    .unwrap();

    worker
        .process(|_job| async move {
            tokio::time::sleep(StdDuration::from_secs(5)).await;
            Ok(serde_json::json!({}))
        })
        .await
        .unwrap();

    let options = JobOptions {
        attempts: 1,
        timeout: 100,
        ..Default::default()
    };
    let job = queue
        .add("slow", serde_json::json!({}), Some(options))
        .await
        .unwrap();

    tokio::time::sleep(StdDuration::from_millis(800)).await;

    let fetched = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, JobStatus::Failed);
    assert_eq!(fetched.failed_reason.as_deref(), Some("Job timeout"));

    worker.close().await;
    queue.remove_job(job.id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn concurrency_cap_limits_simultaneous_jobs() {
    let queue = fresh_queue("concurrency_cap_limits_simultaneous_jobs").await;
    let worker = Worker::new(
        "concurrency_cap_limits_simultaneous_jobs",
        "jet_test",
        test_connection(),
        WorkerOptions {
            concurrency: 2,
            max_jobs_per_worker: None,
        },
    )
    .await
    .unwrap();

    let in_flight = Arc::new(AtomicU32::new(0));
    let max_observed = Arc::new(AtomicU32::new(0));
    let in_flight_for_handler = in_flight.clone();
    let max_observed_for_handler = max_observed.clone();

    worker
        .process(move |_job| {
            let in_flight = in_flight_for_handler.clone();
            let max_observed = max_observed_for_handler.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(300)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(serde_json::json!({}))
            }
        })
        .await
        .unwrap();

    let mut ids = Vec::new();
    for i in 0..6 {
        let job = queue
            .add("unit", serde_json::json!({"i": i}), None)
            .await
            .unwrap();
        ids.push(job.id);
    }

    tokio::time::sleep(StdDuration::from_millis(2_000)).await;

    assert!(max_observed.load(Ordering::SeqCst) <= 2);

    worker.close().await;
    for id in ids {
        let _ = queue.remove_job(id).await;
    }
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn removing_an_active_job_does_not_error() {
    let queue = fresh_queue("removing_an_active_job_does_not_error").await;
    let worker = Worker::new(
        "removing_an_active_job_does_not_error",
        "jet_test",
        test_connection(),
        WorkerOptions::default(),
    )
    .await
    .unwrap();

    worker
        .process(|_job| async move {
            tokio::time::sleep(StdDuration::from_millis(500)).await;
            Ok(serde_json::json!({}))
        })
        .await
        .unwrap();

    let job = queue
        .add("will_be_removed", serde_json::json!({}), None)
        .await
        .unwrap();

    tokio::time::sleep(StdDuration::from_millis(100)).await;
    queue.remove_job(job.id).await.unwrap();

    tokio::time::sleep(StdDuration::from_millis(700)).await;
    assert!(queue.get_job(job.id).await.unwrap().is_none());

    worker.close().await;
}
