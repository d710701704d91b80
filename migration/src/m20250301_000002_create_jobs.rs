// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

use crate::m20250301_000001_create_workers::Workers;

/// 作业、依赖边、执行记录与死信表迁移
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. jobs (no dependencies)
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Jobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Jobs::JobType).string().not_null())
                    .col(ColumnDef::new(Jobs::Payload).json().not_null())
                    .col(ColumnDef::new(Jobs::Priority).integer().not_null().default(3))
                    .col(ColumnDef::new(Jobs::Status).string().not_null())
                    .col(ColumnDef::new(Jobs::RetryCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Jobs::MaxRetries).integer().not_null().default(3))
                    .col(
                        ColumnDef::new(Jobs::TimeoutMs)
                            .big_integer()
                            .not_null()
                            .default(300_000),
                    )
                    .col(ColumnDef::new(Jobs::WorkerId).uuid())
                    .col(ColumnDef::new(Jobs::Result).json())
                    .col(ColumnDef::new(Jobs::Error).json())
                    .col(ColumnDef::new(Jobs::QueuedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Jobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Jobs::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Jobs::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Jobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 2. job_dependencies (depends on jobs)
        manager
            .create_table(
                Table::create()
                    .table(JobDependencies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(JobDependencies::JobId).uuid().not_null())
                    .col(
                        ColumnDef::new(JobDependencies::DependsOnJobId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JobDependencies::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(JobDependencies::JobId)
                            .col(JobDependencies::DependsOnJobId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_dependencies_job")
                            .from(JobDependencies::Table, JobDependencies::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_dependencies_depends_on")
                            .from(JobDependencies::Table, JobDependencies::DependsOnJobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 3. job_executions (depends on jobs and workers)
        manager
            .create_table(
                Table::create()
                    .table(JobExecutions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobExecutions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobExecutions::JobId).uuid().not_null())
                    .col(ColumnDef::new(JobExecutions::WorkerId).uuid().not_null())
                    .col(ColumnDef::new(JobExecutions::Attempt).integer().not_null())
                    .col(ColumnDef::new(JobExecutions::Status).string().not_null())
                    .col(
                        ColumnDef::new(JobExecutions::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(JobExecutions::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(JobExecutions::DurationMs).big_integer())
                    .col(ColumnDef::new(JobExecutions::Error).json())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_executions_job")
                            .from(JobExecutions::Table, JobExecutions::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_executions_worker")
                            .from(JobExecutions::Table, JobExecutions::WorkerId)
                            .to(Workers::Table, Workers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 4. dead_letter_entries
        manager
            .create_table(
                Table::create()
                    .table(DeadLetterEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeadLetterEntries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeadLetterEntries::JobId).uuid().not_null())
                    .col(ColumnDef::new(DeadLetterEntries::JobType).string().not_null())
                    .col(ColumnDef::new(DeadLetterEntries::Payload).json().not_null())
                    .col(
                        ColumnDef::new(DeadLetterEntries::RetryCount)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeadLetterEntries::Error).json().not_null())
                    .col(
                        ColumnDef::new(DeadLetterEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for jobs: status and worker for evacuation / timeout scans
        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_status_worker")
                    .table(Jobs::Table)
                    .col(Jobs::Status)
                    .col(Jobs::WorkerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_job_dependencies_depends_on")
                    .table(JobDependencies::Table)
                    .col(JobDependencies::DependsOnJobId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_job_executions_job")
                    .table(JobExecutions::Table)
                    .col(JobExecutions::JobId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeadLetterEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JobExecutions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JobDependencies::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    JobType,
    Payload,
    Priority,
    Status,
    RetryCount,
    MaxRetries,
    TimeoutMs,
    WorkerId,
    Result,
    Error,
    QueuedAt,
    CreatedAt,
    StartedAt,
    CompletedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum JobDependencies {
    Table,
    JobId,
    DependsOnJobId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum JobExecutions {
    Table,
    Id,
    JobId,
    WorkerId,
    Attempt,
    Status,
    StartedAt,
    CompletedAt,
    DurationMs,
    Error,
}

#[derive(DeriveIden)]
enum DeadLetterEntries {
    Table,
    Id,
    JobId,
    JobType,
    Payload,
    RetryCount,
    Error,
    CreatedAt,
}
