//! `user_credentials`: the password hash for each user, kept apart from the
//! profile row.
//!
//! `ux_user_credentials_user` makes `user_id` unique. Password writes are a
//! single `INSERT .. ON CONFLICT (user_id) DO UPDATE` and depend on it.
//! `password_algorithm` (`bcrypt` | `argon2`) lets login detect hashes that
//! need re-hashing after the configured algorithm or cost changes.
use sea_orm_migration::{prelude::*, schema::*};

const UNIQUE_USER: &str = "ux_user_credentials_user";

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Credentials::Table)
                    .if_not_exists()
                    .col(uuid(Credentials::Id).primary_key())
                    .col(uuid(Credentials::UserId).not_null())
                    .col(string_len(Credentials::PasswordHash, 255).not_null())
                    .col(string_len(Credentials::PasswordAlgorithm, 16).not_null().default("bcrypt"))
                    .col(timestamp_with_time_zone(Credentials::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(Credentials::UpdatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_credentials_user")
                            .from(Credentials::Table, Credentials::UserId)
                            .to(Owner::Table, Owner::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(UNIQUE_USER)
                    .table(Credentials::Table)
                    .col(Credentials::UserId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name(UNIQUE_USER).table(Credentials::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Credentials::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Credentials {
    #[sea_orm(iden = "user_credentials")]
    Table,
    Id,
    UserId,
    PasswordHash,
    PasswordAlgorithm,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Owner {
    #[sea_orm(iden = "user")]
    Table,
    Id,
}
