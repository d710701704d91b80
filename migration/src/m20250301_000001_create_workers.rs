// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 工作节点注册表与健康日志迁移
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    /// 应用数据库迁移
    ///
    /// # 参数
    ///
    /// * `manager` - 数据库模式管理器
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 迁移成功
    /// * `Err(DbErr)` - 迁移失败
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Workers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Workers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Workers::Name).string().not_null())
                    .col(
                        ColumnDef::new(Workers::WorkerType)
                            .string()
                            .not_null()
                            .default("general"),
                    )
                    .col(ColumnDef::new(Workers::Status).string().not_null())
                    .col(ColumnDef::new(Workers::Capacity).integer().not_null().default(5))
                    .col(
                        ColumnDef::new(Workers::CurrentLoad)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Workers::HealthScore)
                            .double()
                            .not_null()
                            .default(1.0),
                    )
                    .col(
                        ColumnDef::new(Workers::LastHeartbeat)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Workers::FailureCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Workers::Capabilities).json().not_null())
                    .col(ColumnDef::new(Workers::Metadata).json().not_null())
                    .col(
                        ColumnDef::new(Workers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Workers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Health logs are append-only; the auto-increment id gives a stable
        // newest-first ordering even when timestamps collide.
        manager
            .create_table(
                Table::create()
                    .table(HealthLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(HealthLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(HealthLogs::WorkerId).uuid().not_null())
                    .col(ColumnDef::new(HealthLogs::MetricType).string().not_null())
                    .col(ColumnDef::new(HealthLogs::Value).double().not_null())
                    .col(ColumnDef::new(HealthLogs::Details).json().not_null())
                    .col(
                        ColumnDef::new(HealthLogs::RecordedAt)
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
                    .name("idx_workers_status_health")
                    .table(Workers::Table)
                    .col(Workers::Status)
                    .col(Workers::HealthScore)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_health_logs_worker_metric")
                    .table(HealthLogs::Table)
                    .col(HealthLogs::WorkerId)
                    .col(HealthLogs::MetricType)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(HealthLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Workers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Workers {
    Table,
    Id,
    Name,
    WorkerType,
    Status,
    Capacity,
    CurrentLoad,
    HealthScore,
    LastHeartbeat,
    FailureCount,
    Capabilities,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum HealthLogs {
    Table,
    Id,
    WorkerId,
    MetricType,
    Value,
    Details,
    RecordedAt,
}
