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
        // One row per sequential category; the primary key is what makes
        // taking the marker a compare-and-swap.
        manager
            .create_table(
                Table::create()
                    .table(SequentialCategoryMarkers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SequentialCategoryMarkers::Category)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SequentialCategoryMarkers::ItemId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SequentialCategoryMarkers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sequential_category_markers_item")
                    .table(SequentialCategoryMarkers::Table)
                    .col(SequentialCategoryMarkers::ItemId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(SequentialCategoryMarkers::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum SequentialCategoryMarkers {
    Table,
    Category,
    ItemId,
    UpdatedAt,
}
