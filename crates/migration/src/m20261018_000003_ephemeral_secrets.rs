use sea_orm_migration::prelude::*;

use crate::m20261018_000001_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EphemeralSecrets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EphemeralSecrets::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EphemeralSecrets::UserId).string().not_null())
                    .col(ColumnDef::new(EphemeralSecrets::Purpose).string_len(32).not_null())
                    .col(ColumnDef::new(EphemeralSecrets::SecretDigest).string().not_null())
                    .col(
                        ColumnDef::new(EphemeralSecrets::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EphemeralSecrets::ExpiresAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EphemeralSecrets::Consumed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(EphemeralSecrets::ConsumedAt).big_integer())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ephemeral_secrets_user_id")
                            .from(EphemeralSecrets::Table, EphemeralSecrets::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ephemeral_secrets_user_purpose")
                    .table(EphemeralSecrets::Table)
                    .col(EphemeralSecrets::UserId)
                    .col(EphemeralSecrets::Purpose)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ephemeral_secrets_digest")
                    .table(EphemeralSecrets::Table)
                    .col(EphemeralSecrets::SecretDigest)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let _ = manager
            .drop_index(
                Index::drop()
                    .name("idx_ephemeral_secrets_digest")
                    .to_owned(),
            )
            .await;
        let _ = manager
            .drop_index(
                Index::drop()
                    .name("idx_ephemeral_secrets_user_purpose")
                    .to_owned(),
            )
            .await;

        manager
            .drop_table(Table::drop().table(EphemeralSecrets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EphemeralSecrets {
    Table,
    Id,
    UserId,
    Purpose,
    SecretDigest,
    CreatedAt,
    ExpiresAt,
    Consumed,
    ConsumedAt,
}
