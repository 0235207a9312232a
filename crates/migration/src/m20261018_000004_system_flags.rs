use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SystemFlags::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SystemFlags::Name)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SystemFlags::Value).string().not_null())
                    .col(ColumnDef::new(SystemFlags::CreatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SystemFlags::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SystemFlags {
    Table,
    Name,
    Value,
    CreatedAt,
}
