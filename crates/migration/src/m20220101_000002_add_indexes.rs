use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Session: list/deactivate by user
        manager
            .create_index(
                Index::create()
                    .name("idx_session_user")
                    .table(Session::Table)
                    .col(Session::UserId)
                    .to_owned(),
            )
            .await?;

        // VerificationToken: index on user_id
        manager
            .create_index(
                Index::create()
                    .name("idx_verification_token_user")
                    .table(VerificationToken::Table)
                    .col(VerificationToken::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_verification_token_user").table(VerificationToken::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_session_user").table(Session::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Session { Table, UserId }

#[derive(DeriveIden)]
enum VerificationToken { Table, UserId }
