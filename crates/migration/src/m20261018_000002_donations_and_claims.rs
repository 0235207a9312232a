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
                    .table(Donations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Donations::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Donations::DonorId).string().not_null())
                    .col(ColumnDef::new(Donations::Name).string().not_null())
                    .col(ColumnDef::new(Donations::Description).text())
                    .col(ColumnDef::new(Donations::Quantity).string().not_null())
                    .col(ColumnDef::new(Donations::Location).string().not_null())
                    .col(ColumnDef::new(Donations::ImageUrl).string())
                    .col(ColumnDef::new(Donations::PickupTime).big_integer().not_null())
                    .col(
                        ColumnDef::new(Donations::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Donations::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(Donations::UpdatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_donations_donor_id")
                            .from(Donations::Table, Donations::DonorId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_donations_donor_id")
                    .table(Donations::Table)
                    .col(Donations::DonorId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_donations_status_pickup")
                    .table(Donations::Table)
                    .col(Donations::Status)
                    .col(Donations::PickupTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Claims::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Claims::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Claims::DonationId).string().not_null())
                    .col(ColumnDef::new(Claims::NgoId).string().not_null())
                    .col(ColumnDef::new(Claims::Status).string_len(16).not_null())
                    .col(ColumnDef::new(Claims::ClaimedAt).big_integer().not_null())
                    .col(ColumnDef::new(Claims::UpdatedAt).big_integer().not_null())
                    // At most one claim per donation, whatever the isolation level.
                    .index(
                        Index::create()
                            .name("uidx_claims_donation_id")
                            .col(Claims::DonationId)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_claims_donation_id")
                            .from(Claims::Table, Claims::DonationId)
                            .to(Donations::Table, Donations::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_claims_ngo_id")
                            .from(Claims::Table, Claims::NgoId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_claims_ngo_id")
                    .table(Claims::Table)
                    .col(Claims::NgoId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse dependency order.
        manager
            .drop_table(Table::drop().table(Claims::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Donations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Donations {
    Table,
    Id,
    DonorId,
    Name,
    Description,
    Quantity,
    Location,
    ImageUrl,
    PickupTime,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Claims {
    Table,
    Id,
    DonationId,
    NgoId,
    Status,
    ClaimedAt,
    UpdatedAt,
}
