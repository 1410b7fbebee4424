// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum_test::TestServer;
use chrono::{Duration, Utc};
use queuekeeper::config::settings::DatabaseSettings;
use queuekeeper::domain::models::queue_item::{NewQueueItem, QueueItem, QueueStatus};
use queuekeeper::domain::repositories::queue_repository::{
    ItemOrder, QueueItemFilter, QueueRepository,
};
use queuekeeper::infrastructure::database::connection;
use queuekeeper::infrastructure::database::entities::queue_item;
use queuekeeper::infrastructure::repositories::queue_repo_impl::QueueRepositoryImpl;
use queuekeeper::presentation::routes;
use queuekeeper::queue::work_queue::QueueService;
use migration::{Migrator, MigratorTrait};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub const RETRY_CAP: i32 = 4;

#[allow(dead_code)]
pub struct TestQueue {
    pub db: Arc<DatabaseConnection>,
    pub repository: Arc<QueueRepositoryImpl>,
    pub queue: Arc<QueueService<QueueRepositoryImpl>>,
}

pub async fn create_test_queue() -> TestQueue {
    let settings = DatabaseSettings {
        url: "sqlite::memory:".to_string(),
        max_connections: None,
        min_connections: None,
        connect_timeout: Some(5),
        idle_timeout: None,
        sqlx_logging: false,
    };
    let db = Arc::new(connection::create_pool(&settings).await.unwrap());
    Migrator::up(db.as_ref(), None).await.unwrap();

    let repository = Arc::new(QueueRepositoryImpl::new(db.clone()));
    let queue = Arc::new(QueueService::new(repository.clone(), RETRY_CAP));
    TestQueue {
        db,
        repository,
        queue,
    }
}

#[allow(dead_code)]
pub async fn create_test_server() -> (TestServer, TestQueue) {
    let test_queue = create_test_queue().await;
    let app = routes::routes(test_queue.queue.clone());
    let server = TestServer::new(app).unwrap();
    (server, test_queue)
}

pub fn job(destination: &str) -> NewQueueItem {
    NewQueueItem::new(
        "post_ledger_entry",
        "payment.received",
        destination,
        json!({"paymentId": Uuid::now_v7()}),
    )
}

pub fn sequential_job(category: &str) -> NewQueueItem {
    job("accounting").in_category(category)
}

/// 把队列项的时间戳整体前移，模拟时间流逝
#[allow(dead_code)]
pub async fn backdate(db: &DatabaseConnection, id: Uuid, minutes: i64) {
    let at: chrono::DateTime<chrono::FixedOffset> = (Utc::now() - Duration::minutes(minutes)).into();
    queue_item::Entity::update_many()
        .col_expr(queue_item::Column::UpdatedAt, Expr::value(at))
        .col_expr(queue_item::Column::FlightAt, Expr::value(Some(at)))
        .filter(queue_item::Column::Id.eq(id))
        .exec(db)
        .await
        .unwrap();
}

#[allow(dead_code)]
pub async fn set_retries(db: &DatabaseConnection, id: Uuid, no_of_retry: i32) {
    queue_item::Entity::update_many()
        .col_expr(queue_item::Column::NoOfRetry, Expr::value(no_of_retry))
        .filter(queue_item::Column::Id.eq(id))
        .exec(db)
        .await
        .unwrap();
}

pub async fn status_of(repository: &QueueRepositoryImpl, id: Uuid) -> QueueStatus {
    repository.find_by_id(id).await.unwrap().unwrap().status
}

#[allow(dead_code)]
pub async fn reload(repository: &QueueRepositoryImpl, id: Uuid) -> QueueItem {
    repository.find_by_id(id).await.unwrap().unwrap()
}

/// 分类中活跃项（非终态、非 hold）的数量
#[allow(dead_code)]
pub async fn active_count(repository: &QueueRepositoryImpl, category: &str) -> usize {
    repository
        .find_many(
            &QueueItemFilter::active_in_category(category),
            ItemOrder::Creation,
            None,
        )
        .await
        .unwrap()
        .len()
}
