//! Enqueue/dequeue behaviour against a live broker

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::Connection;

use brokerq_core::cancellation_channel;
use brokerq_core::domain::{Dequeued, QueueType};
use brokerq_core::port::QueueProvider;
use brokerq_core::{AppError, CancellationToken};
use brokerq_infra_postgres::PostgresQueueProvider;
use common::{names_for, options, started_provider, test_database_url, unique_host};

const SHORT_WINDOW: Duration = Duration::from_millis(300);

async fn dequeue_now(provider: &impl QueueProvider, queue: QueueType) -> Dequeued {
    provider
        .dequeue(queue, &CancellationToken::never())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_enqueued_id_is_dequeued_once() {
    let Some(url) = test_database_url() else { return };
    let provider = started_provider(&url, "round", SHORT_WINDOW).await;

    provider.enqueue("abc", QueueType::Workflow).await.unwrap();

    match dequeue_now(&provider, QueueType::Workflow).await {
        Dequeued::Received(id) => assert_eq!(id.as_str(), "abc"),
        Dequeued::Empty => panic!("expected the enqueued id"),
    }
    assert_eq!(dequeue_now(&provider, QueueType::Workflow).await, Dequeued::Empty);
}

#[tokio::test]
async fn test_single_consumer_sees_fifo_order() {
    let Some(url) = test_database_url() else { return };
    let provider = started_provider(&url, "fifo", SHORT_WINDOW).await;

    for id in ["first", "second", "third"] {
        provider.enqueue(id, QueueType::Event).await.unwrap();
    }

    let mut seen = Vec::new();
    while let Dequeued::Received(id) = dequeue_now(&provider, QueueType::Event).await {
        seen.push(id.into_inner());
    }
    assert_eq!(seen, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_empty_queue_waits_for_the_window() {
    let Some(url) = test_database_url() else { return };
    let window = Duration::from_millis(500);
    let provider = started_provider(&url, "empty", window).await;

    let started = Instant::now();
    let result = dequeue_now(&provider, QueueType::Workflow).await;
    let elapsed = started.elapsed();

    assert!(result.is_empty());
    assert!(elapsed >= Duration::from_millis(450), "returned after {:?}", elapsed);
    assert!(elapsed < window + Duration::from_secs(3), "returned after {:?}", elapsed);
}

#[tokio::test]
async fn test_waiting_dequeue_wakes_on_enqueue() {
    let Some(url) = test_database_url() else { return };
    let provider = Arc::new(started_provider(&url, "wake", Duration::from_secs(10)).await);

    let waiter = {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move {
            let started = Instant::now();
            let result = provider
                .dequeue(QueueType::Workflow, &CancellationToken::never())
                .await;
            (result, started.elapsed())
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    provider.enqueue("late", QueueType::Workflow).await.unwrap();

    let (result, elapsed) = waiter.await.unwrap();
    match result.unwrap() {
        Dequeued::Received(id) => assert_eq!(id.as_str(), "late"),
        Dequeued::Empty => panic!("expected the late id"),
    }
    assert!(elapsed < Duration::from_secs(5), "woke after {:?}", elapsed);
}

#[tokio::test]
async fn test_concurrent_consumers_receive_each_id_exactly_once() {
    let Some(url) = test_database_url() else { return };
    let provider = Arc::new(started_provider(&url, "conc", SHORT_WINDOW).await);

    let expected: HashSet<String> = (0..20).map(|i| format!("item-{}", i)).collect();
    let sends = expected.iter().map(|id| {
        let provider = Arc::clone(&provider);
        let id = id.clone();
        async move { provider.enqueue(&id, QueueType::Event).await }
    });
    for result in futures::future::join_all(sends).await {
        result.unwrap();
    }

    let consumers = (0..4).map(|_| {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move {
            let mut got = Vec::new();
            while let Dequeued::Received(id) = provider
                .dequeue(QueueType::Event, &CancellationToken::never())
                .await
                .unwrap()
            {
                got.push(id.into_inner());
            }
            got
        })
    });

    let mut received = Vec::new();
    for batch in futures::future::join_all(consumers).await {
        received.extend(batch.unwrap());
    }

    let unique: HashSet<String> = received.iter().cloned().collect();
    assert_eq!(received.len(), unique.len(), "an id was delivered twice");
    assert_eq!(unique, expected);
}

#[tokio::test]
async fn test_queue_types_are_isolated() {
    let Some(url) = test_database_url() else { return };
    let provider = started_provider(&url, "iso", SHORT_WINDOW).await;

    provider.enqueue("wf-only", QueueType::Workflow).await.unwrap();

    assert_eq!(dequeue_now(&provider, QueueType::Event).await, Dequeued::Empty);
    match dequeue_now(&provider, QueueType::Workflow).await {
        Dequeued::Received(id) => assert_eq!(id.as_str(), "wf-only"),
        Dequeued::Empty => panic!("workflow id missing"),
    }
}

#[tokio::test]
async fn test_hosts_sharing_a_database_do_not_share_queues() {
    let Some(url) = test_database_url() else { return };
    let left = started_provider(&url, "left", SHORT_WINDOW).await;
    let right = started_provider(&url, "right", SHORT_WINDOW).await;

    left.enqueue("left-id", QueueType::Workflow).await.unwrap();

    assert_eq!(dequeue_now(&right, QueueType::Workflow).await, Dequeued::Empty);
    assert!(!dequeue_now(&left, QueueType::Workflow).await.is_empty());
}

#[tokio::test]
async fn test_cancel_interrupts_waiting_dequeue() {
    let Some(url) = test_database_url() else { return };
    let provider = Arc::new(started_provider(&url, "cancel", Duration::from_secs(30)).await);
    let (source, token) = cancellation_channel();

    let waiter = {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move { provider.dequeue(QueueType::Workflow, &token).await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    let cancelled_at = Instant::now();
    source.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("dequeue should observe cancellation")
        .unwrap();
    assert!(matches!(result, Err(AppError::Cancelled)), "got {:?}", result);
    assert!(cancelled_at.elapsed() < Duration::from_secs(5));

    // Nothing was consumed by the cancelled call
    provider.enqueue("after-cancel", QueueType::Workflow).await.unwrap();
    assert!(!dequeue_now(provider.as_ref(), QueueType::Workflow).await.is_empty());
}

#[tokio::test]
async fn test_unregistered_queue_is_config_error() {
    let Some(url) = test_database_url() else { return };
    let provider = started_provider(&url, "index", SHORT_WINDOW).await;

    let err = provider.enqueue("abc", QueueType::Index).await.unwrap_err();
    assert!(matches!(err, AppError::Config(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_cancelled_dequeue_releases_its_connection() {
    let Some(url) = test_database_url() else { return };
    let host = unique_host("leak");
    let application_name = format!("bq_{}", host);

    let mut provider_options = options(&url, Duration::from_secs(30));
    provider_options.application_name = application_name.clone();
    let provider = Arc::new(
        PostgresQueueProvider::with_defaults(provider_options, names_for(&host)).unwrap(),
    );
    provider.start().await.unwrap();

    let (source, token) = cancellation_channel();
    let waiter = {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move { provider.dequeue(QueueType::Event, &token).await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    source.cancel();
    assert!(waiter.await.unwrap().unwrap_err().is_cancelled());

    let mut observer = sqlx::PgConnection::connect(&url).await.unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let open: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM pg_stat_activity WHERE application_name = $1",
        )
        .bind(&application_name)
        .fetch_one(&mut observer)
        .await
        .unwrap();
        if open == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "{} connection(s) still open", open);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    observer.close().await.unwrap();
}
