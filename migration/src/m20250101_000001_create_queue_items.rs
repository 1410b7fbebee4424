// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(QueueItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QueueItems::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QueueItems::Action).string().not_null())
                    .col(ColumnDef::new(QueueItems::Event).string().not_null())
                    .col(ColumnDef::new(QueueItems::Destination).string().not_null())
                    .col(ColumnDef::new(QueueItems::Params).json().not_null())
                    .col(
                        ColumnDef::new(QueueItems::Priority)
                            .string_len(16)
                            .not_null()
                            .default("regular"),
                    )
                    .col(
                        ColumnDef::new(QueueItems::Status)
                            .string_len(16)
                            .not_null()
                            .default("new"),
                    )
                    .col(
                        ColumnDef::new(QueueItems::IsSequential)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(QueueItems::SequentialCategory).string().null())
                    .col(
                        ColumnDef::new(QueueItems::NoOfRetry)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(QueueItems::FlightAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(QueueItems::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(QueueItems::ErrorDetails).json().null())
                    .col(ColumnDef::new(QueueItems::History).json().not_null())
                    .col(
                        ColumnDef::new(QueueItems::Revision)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(QueueItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(QueueItems::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Claim order: status, then priority, then age
        manager
            .create_index(
                Index::create()
                    .name("idx_queue_items_claim")
                    .table(QueueItems::Table)
                    .col(QueueItems::Status)
                    .col(QueueItems::Priority)
                    .col(QueueItems::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_queue_items_category_status")
                    .table(QueueItems::Table)
                    .col(QueueItems::SequentialCategory)
                    .col(QueueItems::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_queue_items_flight_at")
                    .table(QueueItems::Table)
                    .col(QueueItems::FlightAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QueueItems::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum QueueItems {
    Table,
    Id,
    Action,
    Event,
    Destination,
    Params,
    Priority,
    Status,
    IsSequential,
    SequentialCategory,
    NoOfRetry,
    FlightAt,
    CompletedAt,
    ErrorDetails,
    History,
    Revision,
    CreatedAt,
    UpdatedAt,
}
