//! Initial migration to create the tandem database schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_entity_mappings(manager).await?;
        self.create_sync_tasks(manager).await?;
        self.create_sync_results(manager).await?;
        self.create_sync_checkpoints(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncCheckpoints::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SyncResults::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SyncTasks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EntityMappings::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_entity_mappings(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EntityMappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EntityMappings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EntityMappings::EntityType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EntityMappings::SourceId).string().not_null())
                    .col(ColumnDef::new(EntityMappings::TargetId).string().not_null())
                    .col(
                        ColumnDef::new(EntityMappings::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EntityMappings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // A source id maps to at most one target id per entity type
        manager
            .create_index(
                Index::create()
                    .name("idx_entity_mappings_type_source")
                    .table(EntityMappings::Table)
                    .col(EntityMappings::EntityType)
                    .col(EntityMappings::SourceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ...and the reverse
        manager
            .create_index(
                Index::create()
                    .name("idx_entity_mappings_type_target")
                    .table(EntityMappings::Table)
                    .col(EntityMappings::EntityType)
                    .col(EntityMappings::TargetId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_tasks(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncTasks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncTasks::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(SyncTasks::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(SyncTasks::Direction).string().not_null())
                    .col(
                        ColumnDef::new(SyncTasks::ConflictStrategy)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SyncTasks::Options).json().not_null())
                    .col(
                        ColumnDef::new(SyncTasks::Counters)
                            .json()
                            .not_null()
                            .default(Expr::cust("'{}'")),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::Errors)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::Conflicts)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(ColumnDef::new(SyncTasks::RecoveredFrom).uuid().null())
                    .col(
                        ColumnDef::new(SyncTasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_tasks_created")
                    .table(SyncTasks::Table)
                    .col((SyncTasks::CreatedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_results(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncResults::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncResults::TaskId).uuid().not_null())
                    .col(ColumnDef::new(SyncResults::EntityType).string().not_null())
                    .col(ColumnDef::new(SyncResults::EntityId).string().not_null())
                    .col(ColumnDef::new(SyncResults::Action).string().not_null())
                    .col(ColumnDef::new(SyncResults::Success).boolean().not_null())
                    .col(ColumnDef::new(SyncResults::SourceId).string().null())
                    .col(ColumnDef::new(SyncResults::TargetId).string().null())
                    .col(ColumnDef::new(SyncResults::ErrorCode).string().null())
                    .col(
                        ColumnDef::new(SyncResults::CreatedAt)
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
                    .name("idx_sync_results_task")
                    .table(SyncResults::Table)
                    .col(SyncResults::TaskId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_checkpoints(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncCheckpoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncCheckpoints::TaskId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SyncCheckpoints::EntityType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SyncCheckpoints::Origin).string().not_null())
                    .col(
                        ColumnDef::new(SyncCheckpoints::LastProcessedEntityId)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncCheckpoints::Counters)
                            .json()
                            .not_null()
                            .default(Expr::cust("'{}'")),
                    )
                    .col(
                        ColumnDef::new(SyncCheckpoints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "entity_mappings")]
enum EntityMappings {
    Table,
    Id,
    EntityType,
    SourceId,
    TargetId,
    LastSyncedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_tasks")]
enum SyncTasks {
    Table,
    Id,
    Status,
    Direction,
    ConflictStrategy,
    Options,
    Counters,
    Errors,
    Conflicts,
    RecoveredFrom,
    CreatedAt,
    StartedAt,
    UpdatedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_results")]
enum SyncResults {
    Table,
    Id,
    TaskId,
    EntityType,
    EntityId,
    Action,
    Success,
    SourceId,
    TargetId,
    ErrorCode,
    CreatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_checkpoints")]
enum SyncCheckpoints {
    Table,
    TaskId,
    EntityType,
    Origin,
    LastProcessedEntityId,
    Counters,
    UpdatedAt,
}
