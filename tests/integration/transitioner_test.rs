// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{create_test_queue, job, reload, sequential_job, set_retries, RETRY_CAP};
use queuekeeper::domain::models::queue_item::{
    QueueItemPatch, QueuePriority, QueueStatus, RetryChange,
};
use queuekeeper::domain::repositories::queue_repository::QueueItemFilter;
use queuekeeper::queue::work_queue::{ClaimRequest, QueueError, WorkQueue};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_claim_prefers_immediate_then_oldest() {
    let test = create_test_queue().await;

    let regular = test.queue.enqueue(job("billing")).await.unwrap();
    let urgent = test
        .queue
        .enqueue(job("billing").with_priority(QueuePriority::Immediate))
        .await
        .unwrap();

    let first = test.queue.claim(ClaimRequest::default()).await.unwrap().unwrap();
    assert_eq!(first.id, urgent.id);
    assert_eq!(first.status, QueueStatus::OnFlight);
    assert!(first.flight_at.is_some());
    assert_eq!(first.history.len(), 1);
    assert_eq!(first.history[0].status, QueueStatus::OnFlight);

    let second = test.queue.claim(ClaimRequest::default()).await.unwrap().unwrap();
    assert_eq!(second.id, regular.id);

    assert!(test.queue.claim(ClaimRequest::default()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_filters_by_destination_and_status() {
    let test = create_test_queue().await;

    test.queue.enqueue(job("billing")).await.unwrap();
    let payroll = test.queue.enqueue(job("payroll")).await.unwrap();

    let request = ClaimRequest {
        claim_status: QueueStatus::Processing,
        ..ClaimRequest::for_destination("payroll")
    };
    let claimed = test.queue.claim(request).await.unwrap().unwrap();
    assert_eq!(claimed.id, payroll.id);
    assert_eq!(claimed.status, QueueStatus::Processing);

    let invalid = ClaimRequest {
        claim_status: QueueStatus::Completed,
        ..Default::default()
    };
    assert!(matches!(
        test.queue.claim(invalid).await,
        Err(QueueError::Validation(_))
    ));
}

#[tokio::test]
async fn test_held_items_are_not_claimable() {
    let test = create_test_queue().await;

    let items = test
        .queue
        .enqueue_sequential(vec![sequential_job("lease-1"), sequential_job("lease-1")])
        .await
        .unwrap();

    let claimed = test.queue.claim(ClaimRequest::default()).await.unwrap().unwrap();
    assert_eq!(claimed.id, items[0].id);
    assert!(test.queue.claim(ClaimRequest::default()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_mark_processing_requires_claim() {
    let test = create_test_queue().await;
    let item = test.queue.enqueue(job("billing")).await.unwrap();

    assert!(matches!(
        test.queue.mark_processing(item.id).await,
        Err(QueueError::Validation(_))
    ));
    assert!(matches!(
        test.queue.mark_processing(Uuid::now_v7()).await,
        Err(QueueError::NotFound(_))
    ));

    test.queue.claim(ClaimRequest::default()).await.unwrap();
    let processing = test.queue.mark_processing(item.id).await.unwrap();
    assert_eq!(processing.status, QueueStatus::Processing);
    assert_eq!(processing.history.len(), 2);
    assert_eq!(processing.history[1].status, QueueStatus::Processing);
    assert!(processing.history[1].flight_at.is_some());
}

#[tokio::test]
async fn test_mark_completed_is_idempotent() {
    let test = create_test_queue().await;
    let item = test.queue.enqueue(job("billing")).await.unwrap();
    test.queue.claim(ClaimRequest::default()).await.unwrap();
    test.queue.mark_processing(item.id).await.unwrap();

    assert!(test.queue.mark_completed(item.id).await.unwrap());
    let completed = reload(&test.repository, item.id).await;
    assert_eq!(completed.status, QueueStatus::Completed);
    assert!(completed.completed_at.is_some());
    let trail: Vec<_> = completed.history.iter().map(|entry| entry.status).collect();
    assert_eq!(
        trail,
        vec![
            QueueStatus::OnFlight,
            QueueStatus::Processing,
            QueueStatus::Completed
        ]
    );

    assert!(!test.queue.mark_completed(item.id).await.unwrap());
    let again = reload(&test.repository, item.id).await;
    assert_eq!(again, completed);
}

#[tokio::test]
async fn test_mark_completed_unknown_item() {
    let test = create_test_queue().await;
    assert!(matches!(
        test.queue.mark_completed(Uuid::now_v7()).await,
        Err(QueueError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_mark_failed_records_error_and_is_terminal() {
    let test = create_test_queue().await;
    let item = test.queue.enqueue(job("billing")).await.unwrap();
    test.queue.claim(ClaimRequest::default()).await.unwrap();

    let details = json!({"message": "ledger locked", "code": 423});
    let failed = test.queue.mark_failed(item.id, details.clone()).await.unwrap();
    assert_eq!(failed.status, QueueStatus::Failed);
    assert_eq!(failed.error_details, Some(details.clone()));
    assert_eq!(failed.history.len(), 2);
    assert_eq!(failed.history[0].status, QueueStatus::OnFlight);
    assert_eq!(failed.history[1].error_details, Some(details));

    // A duplicate failure report changes nothing
    let repeated = test
        .queue
        .mark_failed(item.id, json!({"message": "again"}))
        .await
        .unwrap();
    assert_eq!(repeated, failed);

    assert!(matches!(
        test.queue.mark_completed(item.id).await,
        Err(QueueError::AlreadyTerminal(id, QueueStatus::Failed)) if id == item.id
    ));
}

#[tokio::test]
async fn test_transition_one_on_completed_item_returns_it_unchanged() {
    let test = create_test_queue().await;
    let item = test.queue.enqueue(job("billing")).await.unwrap();
    test.queue.mark_completed(item.id).await.unwrap();
    let completed = reload(&test.repository, item.id).await;

    let result = test
        .queue
        .transitioner()
        .transition_one(
            &QueueItemFilter::by_id(item.id),
            &QueueItemPatch::status(QueueStatus::New),
        )
        .await
        .unwrap();
    assert_eq!(result, completed);
}

#[tokio::test]
async fn test_transition_many_requeues_non_sequential_items() {
    let test = create_test_queue().await;

    let plain = test.queue.enqueue(job("billing")).await.unwrap();
    let ordered = test.queue.enqueue(sequential_job("lease-3")).await.unwrap();
    test.queue.claim(ClaimRequest::default()).await.unwrap();
    test.queue.claim(ClaimRequest::default()).await.unwrap();

    let selector = QueueItemFilter {
        statuses: Some(vec![QueueStatus::OnFlight]),
        ..Default::default()
    };
    let patch = QueueItemPatch::status(QueueStatus::New);
    let changed = test
        .queue
        .transitioner()
        .transition_many(&selector, &patch, true)
        .await
        .unwrap();

    assert_eq!(changed, 1);
    assert_eq!(reload(&test.repository, plain.id).await.status, QueueStatus::New);
    assert_eq!(
        reload(&test.repository, ordered.id).await.status,
        QueueStatus::OnFlight
    );

    let result = test
        .queue
        .transitioner()
        .transition_many(&selector, &patch, true)
        .await;
    assert!(matches!(result, Err(QueueError::NoMatch)));

    let changed = test
        .queue
        .transitioner()
        .transition_many(&selector, &patch, false)
        .await
        .unwrap();
    assert_eq!(changed, 0);
}

#[tokio::test]
async fn test_reset_retries_puts_item_back_to_new() {
    let test = create_test_queue().await;
    let item = test.queue.enqueue(job("billing")).await.unwrap();
    test.queue.claim(ClaimRequest::default()).await.unwrap();
    set_retries(&test.db, item.id, RETRY_CAP).await;

    let exhausted = test.queue.list_retry_exhausted(10).await.unwrap();
    assert_eq!(exhausted.len(), 1);
    assert_eq!(exhausted[0].id, item.id);

    let reset = test.queue.reset_retries(item.id).await.unwrap();
    assert_eq!(reset.status, QueueStatus::New);
    assert_eq!(reset.no_of_retry, 0);
    assert_eq!(reset.history.len(), 2);
    assert_eq!(reset.history[1].no_of_retry, RETRY_CAP);
    assert!(test.queue.list_retry_exhausted(10).await.unwrap().is_empty());

    test.queue.mark_completed(item.id).await.unwrap();
    assert!(matches!(
        test.queue.reset_retries(item.id).await,
        Err(QueueError::AlreadyTerminal(..))
    ));
}

#[tokio::test]
async fn test_reset_retries_keeps_category_exclusive() {
    let test = create_test_queue().await;
    let items = test
        .queue
        .enqueue_sequential(vec![sequential_job("lease-5"), sequential_job("lease-5")])
        .await
        .unwrap();

    let reset = test.queue.reset_retries(items[1].id).await.unwrap();
    assert_eq!(reset.status, QueueStatus::Hold);
}

#[tokio::test]
async fn test_status_counts() {
    let test = create_test_queue().await;
    test.queue
        .enqueue_sequential(vec![
            sequential_job("lease-8"),
            sequential_job("lease-8"),
            job("billing"),
        ])
        .await
        .unwrap();
    test.queue.claim(ClaimRequest::for_destination("billing")).await.unwrap();

    let counts = test.queue.status_counts().await.unwrap();
    assert_eq!(counts[&QueueStatus::OnFlight], 1);
    assert_eq!(counts[&QueueStatus::Hold], 1);
    assert_eq!(counts[&QueueStatus::Completed], 0);
    assert_eq!(counts.values().sum::<u64>(), 3);
}

#[tokio::test]
async fn test_bulk_patch_with_retry_reset() {
    let test = create_test_queue().await;
    let item = test.queue.enqueue(job("billing")).await.unwrap();
    set_retries(&test.db, item.id, 3).await;

    let patch = QueueItemPatch {
        retry: RetryChange::Reset,
        ..Default::default()
    };
    test.queue
        .transitioner()
        .transition_many(&QueueItemFilter::by_id(item.id), &patch, true)
        .await
        .unwrap();
    assert_eq!(reload(&test.repository, item.id).await.no_of_retry, 0);
}
