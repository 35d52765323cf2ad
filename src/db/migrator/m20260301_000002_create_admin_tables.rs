use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_identity_tables::{pk, timestamp};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Menus::Table)
                    .if_not_exists()
                    .col(pk(Menus::Id))
                    .col(ColumnDef::new(Menus::Title).string().not_null())
                    .col(ColumnDef::new(Menus::Path).string().not_null())
                    .col(ColumnDef::new(Menus::Icon).string().null())
                    .col(ColumnDef::new(Menus::ParentId).integer().null())
                    .col(
                        ColumnDef::new(Menus::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Menus::Visible)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(timestamp(Menus::CreatedAt))
                    .col(timestamp(Menus::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_menus_parent_id")
                    .table(Menus::Table)
                    .col(Menus::ParentId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Settings::Table)
                    .if_not_exists()
                    .col(pk(Settings::Id))
                    .col(ColumnDef::new(Settings::Key).string().not_null().unique_key())
                    .col(ColumnDef::new(Settings::Value).text().not_null().default(""))
                    .col(ColumnDef::new(Settings::Category).string().not_null())
                    .col(
                        ColumnDef::new(Settings::ValueType)
                            .string()
                            .not_null()
                            .default("string"),
                    )
                    .col(ColumnDef::new(Settings::Label).string().not_null().default(""))
                    .col(timestamp(Settings::CreatedAt))
                    .col(timestamp(Settings::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_settings_category")
                    .table(Settings::Table)
                    .col(Settings::Category)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Settings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Menus::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Menus {
    Table,
    Id,
    Title,
    Path,
    Icon,
    ParentId,
    SortOrder,
    Visible,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Settings {
    Table,
    Id,
    Key,
    Value,
    Category,
    ValueType,
    Label,
    CreatedAt,
    UpdatedAt,
}
