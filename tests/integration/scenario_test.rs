// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    active_count, backdate, create_test_queue, job, reload, sequential_job, set_retries,
    status_of, TestQueue, RETRY_CAP,
};
use queuekeeper::domain::models::queue_item::{QueueItem, QueueStatus};
use queuekeeper::domain::repositories::queue_repository::{
    ItemOrder, QueueItemFilter, QueueRepository,
};
use queuekeeper::queue::work_queue::{ClaimRequest, WorkQueue};
use queuekeeper::workers::sequential_cleaner::{SequentialCleaner, SequentialConfig};
use queuekeeper::workers::staleness_sweeper::{StalenessConfig, StalenessSweeper};
use serde_json::json;
use std::time::Duration;

async fn claim_next(test: &TestQueue) -> Option<QueueItem> {
    test.queue.claim(ClaimRequest::default()).await.unwrap()
}

#[tokio::test]
async fn test_category_releases_items_in_creation_order() {
    let test = create_test_queue().await;
    let items = test
        .queue
        .enqueue_sequential(vec![
            sequential_job("contract-a"),
            sequential_job("contract-a"),
            sequential_job("contract-a"),
        ])
        .await
        .unwrap();
    let (a, b, c) = (items[0].id, items[1].id, items[2].id);

    assert_eq!(items[0].status, QueueStatus::New);
    assert_eq!(items[1].status, QueueStatus::Hold);
    assert_eq!(items[2].status, QueueStatus::Hold);

    let claimed = claim_next(&test).await.unwrap();
    assert_eq!(claimed.id, a);
    assert!(claim_next(&test).await.is_none());

    assert!(test.queue.mark_completed(a).await.unwrap());
    assert_eq!(status_of(&test.repository, b).await, QueueStatus::New);
    assert_eq!(status_of(&test.repository, c).await, QueueStatus::Hold);

    // A late duplicate completion must not release a second item
    assert!(!test.queue.mark_completed(a).await.unwrap());
    assert_eq!(status_of(&test.repository, c).await, QueueStatus::Hold);
    assert_eq!(active_count(&test.repository, "contract-a").await, 1);

    assert_eq!(claim_next(&test).await.unwrap().id, b);
    test.queue.mark_processing(b).await.unwrap();
    assert!(test.queue.mark_completed(b).await.unwrap());
    assert_eq!(status_of(&test.repository, c).await, QueueStatus::New);

    assert_eq!(claim_next(&test).await.unwrap().id, c);
    assert!(test.queue.mark_completed(c).await.unwrap());
    assert!(test
        .repository
        .find_marker("contract-a")
        .await
        .unwrap()
        .is_none());

    // An empty category admits the next item immediately
    let next = test.queue.enqueue(sequential_job("contract-a")).await.unwrap();
    assert_eq!(next.status, QueueStatus::New);
}

#[tokio::test]
async fn test_categories_do_not_block_each_other() {
    let test = create_test_queue().await;
    let items = test
        .queue
        .enqueue_sequential(vec![
            sequential_job("contract-a"),
            sequential_job("contract-b"),
            sequential_job("contract-a"),
        ])
        .await
        .unwrap();

    let first = claim_next(&test).await.unwrap();
    let second = claim_next(&test).await.unwrap();
    assert_eq!(first.id, items[0].id);
    assert_eq!(second.id, items[1].id);
    assert!(claim_next(&test).await.is_none());

    test.queue.mark_completed(items[1].id).await.unwrap();
    assert_eq!(status_of(&test.repository, items[2].id).await, QueueStatus::Hold);
}

#[tokio::test]
async fn test_stale_plain_item_is_recovered_and_reclaimed() {
    let test = create_test_queue().await;
    let sweeper = StalenessSweeper::new(test.repository.clone(), StalenessConfig::default());

    let item = test.queue.enqueue(job("billing")).await.unwrap();
    claim_next(&test).await.unwrap();
    backdate(&test.db, item.id, 30).await;

    assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
    let recovered = reload(&test.repository, item.id).await;
    assert_eq!(recovered.status, QueueStatus::New);
    assert_eq!(recovered.no_of_retry, 1);
    assert_eq!(recovered.history.len(), 2);
    assert_eq!(recovered.history[1].status, QueueStatus::OnFlight);
    assert_eq!(recovered.history[1].no_of_retry, 0);

    let again = claim_next(&test).await.unwrap();
    assert_eq!(again.id, item.id);
    assert!(test.queue.mark_completed(item.id).await.unwrap());
}

#[tokio::test]
async fn test_recovery_stops_at_retry_cap() {
    let test = create_test_queue().await;
    let sweeper = StalenessSweeper::new(test.repository.clone(), StalenessConfig::default());
    let item = test.queue.enqueue(job("billing")).await.unwrap();

    for attempt in 1..=RETRY_CAP {
        claim_next(&test).await.unwrap();
        backdate(&test.db, item.id, 30).await;
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        assert_eq!(reload(&test.repository, item.id).await.no_of_retry, attempt);
    }

    claim_next(&test).await.unwrap();
    backdate(&test.db, item.id, 30).await;
    assert_eq!(sweeper.sweep_once().await.unwrap(), 0);

    let stuck = reload(&test.repository, item.id).await;
    assert_eq!(stuck.status, QueueStatus::OnFlight);
    assert_eq!(stuck.no_of_retry, RETRY_CAP);
    // One entry per claim plus one per recovery
    assert_eq!(stuck.history.len(), (2 * RETRY_CAP + 1) as usize);

    let exhausted = test.queue.list_retry_exhausted(10).await.unwrap();
    assert_eq!(exhausted.len(), 1);

    let reset = test.queue.reset_retries(item.id).await.unwrap();
    assert_eq!(reset.status, QueueStatus::New);
    assert_eq!(reset.no_of_retry, 0);
}

#[tokio::test]
async fn test_stale_sequential_item_recovered_by_cleaner_only() {
    let test = create_test_queue().await;
    let sweeper = StalenessSweeper::new(test.repository.clone(), StalenessConfig::default());
    let cleaner = SequentialCleaner::new(test.repository.clone(), SequentialConfig::default());

    let items = test
        .queue
        .enqueue_sequential(vec![sequential_job("contract-c"), sequential_job("contract-c")])
        .await
        .unwrap();
    claim_next(&test).await.unwrap();
    backdate(&test.db, items[0].id, 40).await;

    assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
    assert_eq!(cleaner.drain(false).await.unwrap(), 1);

    let recovered = reload(&test.repository, items[0].id).await;
    assert_eq!(recovered.status, QueueStatus::New);
    assert_eq!(recovered.no_of_retry, 1);
    assert_eq!(status_of(&test.repository, items[1].id).await, QueueStatus::Hold);
    assert_eq!(active_count(&test.repository, "contract-c").await, 1);
}

#[tokio::test]
async fn test_cleaner_demotes_duplicate_active_items() {
    let test = create_test_queue().await;
    let cleaner = SequentialCleaner::new(test.repository.clone(), SequentialConfig::default());

    // Two active items in one category, as left behind by an older writer
    let older = test
        .repository
        .insert(&QueueItem::from_new(
            sequential_job("contract-d"),
            QueueStatus::Processing,
        ))
        .await
        .unwrap();
    let newer = test
        .repository
        .insert(&QueueItem::from_new(
            sequential_job("contract-d"),
            QueueStatus::Processing,
        ))
        .await
        .unwrap();
    backdate(&test.db, older.id, 40).await;
    assert_eq!(active_count(&test.repository, "contract-d").await, 2);

    assert_eq!(cleaner.drain(false).await.unwrap(), 1);
    assert_eq!(status_of(&test.repository, older.id).await, QueueStatus::Hold);
    assert_eq!(status_of(&test.repository, newer.id).await, QueueStatus::Processing);
    assert_eq!(active_count(&test.repository, "contract-d").await, 1);

    // The demoted item is released once the survivor finishes
    assert!(test.queue.mark_completed(newer.id).await.unwrap());
    assert_eq!(status_of(&test.repository, older.id).await, QueueStatus::New);
}

#[tokio::test]
async fn test_failed_item_unblocks_category_after_cleanup() {
    let test = create_test_queue().await;
    let cleaner = SequentialCleaner::new(test.repository.clone(), SequentialConfig::default());

    let items = test
        .queue
        .enqueue_sequential(vec![sequential_job("contract-e"), sequential_job("contract-e")])
        .await
        .unwrap();
    claim_next(&test).await.unwrap();
    test.queue
        .mark_failed(items[0].id, json!({"message": "rejected"}))
        .await
        .unwrap();

    // Failure alone keeps the category blocked
    assert_eq!(status_of(&test.repository, items[1].id).await, QueueStatus::Hold);
    assert_eq!(cleaner.drain(true).await.unwrap(), 0);

    backdate(&test.db, items[0].id, 10).await;
    backdate(&test.db, items[1].id, 10).await;
    assert!(cleaner.drain(true).await.unwrap() >= 2);

    let promoted = reload(&test.repository, items[1].id).await;
    assert_eq!(promoted.status, QueueStatus::New);
    assert_eq!(
        test.repository
            .find_marker("contract-e")
            .await
            .unwrap()
            .unwrap()
            .item_id,
        promoted.id
    );
}

#[tokio::test]
async fn test_item_stuck_at_retry_cap_stays_stuck() {
    let test = create_test_queue().await;
    let sweeper = StalenessSweeper::new(test.repository.clone(), StalenessConfig::default());
    let cleaner = SequentialCleaner::new(test.repository.clone(), SequentialConfig::default());

    let plain = test.queue.enqueue(job("billing")).await.unwrap();
    let ordered = test.queue.enqueue(sequential_job("contract-f")).await.unwrap();
    claim_next(&test).await.unwrap();
    claim_next(&test).await.unwrap();
    for id in [plain.id, ordered.id] {
        set_retries(&test.db, id, RETRY_CAP).await;
        backdate(&test.db, id, 60).await;
    }

    assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
    assert_eq!(cleaner.drain(false).await.unwrap(), 0);

    for id in [plain.id, ordered.id] {
        let item = reload(&test.repository, id).await;
        assert_eq!(item.status, QueueStatus::OnFlight);
        assert_eq!(item.no_of_retry, RETRY_CAP);
    }
    assert_eq!(test.queue.list_retry_exhausted(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_held_item_at_retry_cap_is_listed_as_exhausted() {
    let test = create_test_queue().await;
    let cleaner = SequentialCleaner::new(test.repository.clone(), SequentialConfig::default());

    let items = test
        .queue
        .enqueue_sequential(vec![sequential_job("contract-h"), sequential_job("contract-h")])
        .await
        .unwrap();
    let held = items[1].id;
    assert_eq!(status_of(&test.repository, held).await, QueueStatus::Hold);

    // Promoted and demoted often enough to use up its retries
    set_retries(&test.db, held, RETRY_CAP).await;
    backdate(&test.db, held, 30).await;

    let outcome = cleaner.sweep(true, 50).await.unwrap();
    assert_eq!(outcome.candidates, 0);
    assert_eq!(status_of(&test.repository, held).await, QueueStatus::Hold);

    let exhausted = test.queue.list_retry_exhausted(50).await.unwrap();
    assert_eq!(exhausted.len(), 1);
    assert_eq!(exhausted[0].id, held);
    assert_eq!(exhausted[0].status, QueueStatus::Hold);
}

#[tokio::test]
async fn test_concurrent_sequential_batches_admit_one_item() {
    let test = create_test_queue().await;

    let (left, right) = tokio::join!(
        test.queue
            .enqueue_sequential(vec![sequential_job("contract-g"), sequential_job("contract-g")]),
        test.queue
            .enqueue_sequential(vec![sequential_job("contract-g"), sequential_job("contract-g")]),
    );
    let admitted: Vec<_> = left
        .unwrap()
        .into_iter()
        .chain(right.unwrap())
        .collect();
    assert_eq!(admitted.len(), 4);
    assert!(active_count(&test.repository, "contract-g").await <= 1);

    for _ in 0..admitted.len() {
        let Some(item) = claim_next(&test).await else {
            break;
        };
        assert!(test.queue.mark_completed(item.id).await.unwrap());
        assert!(active_count(&test.repository, "contract-g").await <= 1);
    }

    for item in &admitted {
        assert_eq!(status_of(&test.repository, item.id).await, QueueStatus::Completed);
    }
}

/// 线性同余随机数，保证时间线可复现
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) % bound as u64) as usize
    }
}

async fn pick_in_flight(test: &TestQueue, rng: &mut Lcg) -> Option<QueueItem> {
    let filter = QueueItemFilter {
        statuses: Some(QueueStatus::IN_FLIGHT.to_vec()),
        ..Default::default()
    };
    let mut items = test
        .repository
        .find_many(&filter, ItemOrder::Creation, None)
        .await
        .unwrap();
    if items.is_empty() {
        return None;
    }
    let index = rng.next(items.len());
    Some(items.swap_remove(index))
}

#[tokio::test]
async fn test_random_timeline_keeps_one_active_item_per_category() {
    let test = create_test_queue().await;
    let cleaner = SequentialCleaner::new(
        test.repository.clone(),
        SequentialConfig {
            interval: Duration::from_secs(60),
            stale_timeout: chrono::Duration::zero(),
            failed_timeout: chrono::Duration::zero(),
            retry_cap: 100,
            batch_limit: 50,
        },
    );
    let categories = ["contract-x", "contract-y", "contract-z"];
    let mut rng = Lcg(0x5eed);

    for _ in 0..150 {
        match rng.next(8) {
            0 | 1 => {
                let category = categories[rng.next(categories.len())];
                test.queue.enqueue(sequential_job(category)).await.unwrap();
            }
            2 => {
                let batch = (0..3)
                    .map(|_| sequential_job(categories[rng.next(categories.len())]))
                    .collect();
                test.queue.enqueue_sequential(batch).await.unwrap();
            }
            3 => {
                claim_next(&test).await;
            }
            4 => {
                if let Some(item) = pick_in_flight(&test, &mut rng).await {
                    test.queue.mark_completed(item.id).await.unwrap();
                }
            }
            5 => {
                if let Some(item) = pick_in_flight(&test, &mut rng).await {
                    test.queue
                        .mark_failed(item.id, json!({"message": "boom"}))
                        .await
                        .unwrap();
                }
            }
            6 => {
                cleaner.drain(true).await.unwrap();
            }
            _ => {
                cleaner.drain(false).await.unwrap();
            }
        }

        for category in categories {
            assert!(
                active_count(&test.repository, category).await <= 1,
                "category {} has more than one active item",
                category
            );
        }
    }
}
