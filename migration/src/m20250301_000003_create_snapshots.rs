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
        // Create snapshots table
        manager
            .create_table(
                Table::create()
                    .table(Snapshots::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Snapshots::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Snapshots::SnapshotType).string().not_null())
                    .col(ColumnDef::new(Snapshots::Description).string())
                    .col(ColumnDef::new(Snapshots::BaseSnapshotId).uuid())
                    .col(ColumnDef::new(Snapshots::State).json().not_null())
                    .col(
                        ColumnDef::new(Snapshots::WorkerCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Snapshots::JobCount).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Snapshots::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Create vector_entries table
        manager
            .create_table(
                Table::create()
                    .table(VectorEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VectorEntries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VectorEntries::RefId).uuid().not_null())
                    .col(ColumnDef::new(VectorEntries::Kind).string().not_null())
                    .col(ColumnDef::new(VectorEntries::Content).json().not_null())
                    .col(ColumnDef::new(VectorEntries::Embedding).json().not_null())
                    .col(
                        ColumnDef::new(VectorEntries::CreatedAt)
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
                    .name("idx_vector_entries_kind_ref")
                    .table(VectorEntries::Table)
                    .col(VectorEntries::Kind)
                    .col(VectorEntries::RefId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VectorEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Snapshots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Snapshots {
    Table,
    Id,
    SnapshotType,
    Description,
    BaseSnapshotId,
    State,
    WorkerCount,
    JobCount,
    CreatedAt,
}

#[derive(DeriveIden)]
enum VectorEntries {
    Table,
    Id,
    RefId,
    Kind,
    Content,
    Embedding,
    CreatedAt,
}
