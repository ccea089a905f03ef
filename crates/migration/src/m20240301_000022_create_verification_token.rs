//! Create `verification_token` table for single-use email verification and password reset tokens.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VerificationToken::Table)
                    .if_not_exists()
                    .col(uuid(VerificationToken::Id).primary_key())
                    .col(uuid(VerificationToken::UserId).not_null())
                    .col(string_len(VerificationToken::TokenHash, 64).unique_key().not_null())
                    .col(string_len(VerificationToken::TokenType, 32).not_null())
                    .col(timestamp_with_time_zone(VerificationToken::ExpiresAt).not_null())
                    .col(boolean(VerificationToken::IsUsed).not_null().default(false))
                    .col(timestamp_with_time_zone(VerificationToken::CreatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_verification_token_user")
                            .from(VerificationToken::Table, VerificationToken::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VerificationToken::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum VerificationToken {
    Table,
    Id,
    UserId,
    TokenHash,
    TokenType,
    ExpiresAt,
    IsUsed,
    CreatedAt,
}

#[derive(DeriveIden)]
enum User { Table, Id }
