//! Bootstrap migration for the metadata system tables
//!
//! Every [`AppContext`](crate::app_manager::AppContext) runs this against
//! its own database on first connect (`CREATE TABLE IF NOT EXISTS`
//! semantics via sea-orm-migration's idempotent `Migrator::up`). The
//! management database additionally gets `_apps`, applied the same way.

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240101_000001_system_tables::Migration)]
    }
}

mod m20240101_000001_system_tables {
    use sea_orm_migration::prelude::*;

    #[derive(DeriveMigrationName)]
    pub struct Migration;

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Entities::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Entities::Name).string().not_null().primary_key())
                        .col(ColumnDef::new(Entities::Definition).text().not_null())
                        .col(ColumnDef::new(Entities::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Entities::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Relations::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Relations::Name).string().not_null().primary_key())
                        .col(ColumnDef::new(Relations::Definition).text().not_null())
                        .col(ColumnDef::new(Relations::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Relations::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Rules::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Rules::Id).string().not_null().primary_key())
                        .col(ColumnDef::new(Rules::Entity).string().not_null())
                        .col(ColumnDef::new(Rules::Hook).string().not_null())
                        .col(ColumnDef::new(Rules::Type).string().not_null())
                        .col(ColumnDef::new(Rules::Definition).text().not_null())
                        .col(ColumnDef::new(Rules::Priority).integer().not_null())
                        .col(ColumnDef::new(Rules::Active).boolean().not_null())
                        .col(ColumnDef::new(Rules::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Rules::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StateMachines::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(StateMachines::Id).string().not_null().primary_key())
                        .col(ColumnDef::new(StateMachines::Entity).string().not_null())
                        .col(ColumnDef::new(StateMachines::Field).string().not_null())
                        .col(ColumnDef::new(StateMachines::Definition).text().not_null())
                        .col(ColumnDef::new(StateMachines::Active).boolean().not_null())
                        .col(ColumnDef::new(StateMachines::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(StateMachines::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Workflows::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Workflows::Id).string().not_null().primary_key())
                        .col(ColumnDef::new(Workflows::Name).string().not_null())
                        .col(ColumnDef::new(Workflows::Trigger).text().not_null())
                        .col(ColumnDef::new(Workflows::Context).text().not_null())
                        .col(ColumnDef::new(Workflows::Steps).text().not_null())
                        .col(ColumnDef::new(Workflows::Active).boolean().not_null())
                        .col(ColumnDef::new(Workflows::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Workflows::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WorkflowInstances::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkflowInstances::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(WorkflowInstances::WorkflowId).string().not_null())
                        .col(ColumnDef::new(WorkflowInstances::WorkflowName).string().not_null())
                        .col(ColumnDef::new(WorkflowInstances::Status).string().not_null())
                        .col(ColumnDef::new(WorkflowInstances::CurrentStep).string().not_null())
                        .col(ColumnDef::new(WorkflowInstances::CurrentStepDeadline).timestamp())
                        .col(ColumnDef::new(WorkflowInstances::Context).text().not_null())
                        .col(ColumnDef::new(WorkflowInstances::History).text().not_null())
                        .col(ColumnDef::new(WorkflowInstances::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(WorkflowInstances::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Permissions::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Permissions::Id).string().not_null().primary_key())
                        .col(ColumnDef::new(Permissions::Entity).string().not_null())
                        .col(ColumnDef::new(Permissions::Action).string().not_null())
                        .col(ColumnDef::new(Permissions::Roles).text().not_null())
                        .col(ColumnDef::new(Permissions::Conditions).text())
                        .col(ColumnDef::new(Permissions::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Permissions::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Webhooks::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Webhooks::Id).string().not_null().primary_key())
                        .col(ColumnDef::new(Webhooks::Entity).string().not_null())
                        .col(ColumnDef::new(Webhooks::Hook).string().not_null())
                        .col(ColumnDef::new(Webhooks::Url).string().not_null())
                        .col(ColumnDef::new(Webhooks::Method).string().not_null())
                        .col(ColumnDef::new(Webhooks::Headers).text().not_null())
                        .col(ColumnDef::new(Webhooks::Condition).text())
                        .col(ColumnDef::new(Webhooks::Async).boolean().not_null())
                        .col(ColumnDef::new(Webhooks::Retry).text().not_null())
                        .col(ColumnDef::new(Webhooks::Active).boolean().not_null())
                        .col(ColumnDef::new(Webhooks::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Webhooks::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WebhookLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WebhookLogs::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(WebhookLogs::WebhookId).string().not_null())
                        .col(ColumnDef::new(WebhookLogs::Entity).string().not_null())
                        .col(ColumnDef::new(WebhookLogs::Hook).string().not_null())
                        .col(ColumnDef::new(WebhookLogs::Action).string().not_null())
                        .col(ColumnDef::new(WebhookLogs::RecordId).string().not_null())
                        .col(ColumnDef::new(WebhookLogs::Payload).text().not_null())
                        .col(ColumnDef::new(WebhookLogs::Attempt).integer().not_null())
                        .col(ColumnDef::new(WebhookLogs::Status).string().not_null())
                        .col(ColumnDef::new(WebhookLogs::HttpStatus).integer())
                        .col(ColumnDef::new(WebhookLogs::Error).text())
                        .col(ColumnDef::new(WebhookLogs::NextRetryAt).timestamp())
                        .col(ColumnDef::new(WebhookLogs::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(WebhookLogs::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Apps::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Apps::Name).string().not_null().primary_key())
                        .col(ColumnDef::new(Apps::DisplayName).string().not_null())
                        .col(ColumnDef::new(Apps::DbName).string().not_null())
                        .col(ColumnDef::new(Apps::DbDriver).string().not_null())
                        .col(ColumnDef::new(Apps::JwtSecret).string().not_null())
                        .col(ColumnDef::new(Apps::Status).string().not_null())
                        .col(ColumnDef::new(Apps::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Apps::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                Apps::Table.into_iden(),
                WebhookLogs::Table.into_iden(),
                Webhooks::Table.into_iden(),
                Permissions::Table.into_iden(),
                WorkflowInstances::Table.into_iden(),
                Workflows::Table.into_iden(),
                StateMachines::Table.into_iden(),
                Rules::Table.into_iden(),
                Relations::Table.into_iden(),
                Entities::Table.into_iden(),
            ] {
                manager.drop_table(Table::drop().table(table).if_exists().to_owned()).await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Entities {
        Table,
        Name,
        Definition,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Relations {
        Table,
        Name,
        Definition,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Rules {
        Table,
        Id,
        Entity,
        Hook,
        Type,
        Definition,
        Priority,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StateMachines {
        Table,
        Id,
        Entity,
        Field,
        Definition,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Workflows {
        Table,
        Id,
        Name,
        Trigger,
        Context,
        Steps,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum WorkflowInstances {
        Table,
        Id,
        WorkflowId,
        WorkflowName,
        Status,
        CurrentStep,
        CurrentStepDeadline,
        Context,
        History,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Permissions {
        Table,
        Id,
        Entity,
        Action,
        Roles,
        Conditions,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Webhooks {
        Table,
        Id,
        Entity,
        Hook,
        Url,
        Method,
        Headers,
        Condition,
        Async,
        Retry,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum WebhookLogs {
        Table,
        Id,
        WebhookId,
        Entity,
        Hook,
        Action,
        RecordId,
        Payload,
        Attempt,
        Status,
        HttpStatus,
        Error,
        NextRetryAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Apps {
        Table,
        Name,
        DisplayName,
        DbName,
        DbDriver,
        JwtSecret,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}
