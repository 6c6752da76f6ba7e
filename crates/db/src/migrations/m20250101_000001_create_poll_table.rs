//! Create poll and poll_option tables migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Poll::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Poll::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Poll::AuthorId).string_len(128).not_null())
                    .col(ColumnDef::new(Poll::Title).string_len(256).not_null())
                    .col(ColumnDef::new(Poll::Description).text().not_null())
                    .col(ColumnDef::new(Poll::Category).string_len(16).not_null())
                    .col(ColumnDef::new(Poll::Kind).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Poll::IsAnonymous)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Poll::AllowComments)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Poll::Tags)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(ColumnDef::new(Poll::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Poll::TotalVotes)
                            .integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Poll::TotalVotes).gte(0)),
                    )
                    .col(
                        ColumnDef::new(Poll::VotersCount)
                            .integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Poll::VotersCount).gte(0)),
                    )
                    .col(
                        ColumnDef::new(Poll::StartsAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Poll::EndsAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Poll::ClosedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Poll::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Poll::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Index: author_id (for listing a user's polls)
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_author_id")
                    .table(Poll::Table)
                    .col(Poll::AuthorId)
                    .to_owned(),
            )
            .await?;

        // Index: (status, ends_at) (for the expiry sweep)
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_status_ends_at")
                    .table(Poll::Table)
                    .col(Poll::Status)
                    .col(Poll::EndsAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PollOption::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollOption::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PollOption::PollId).string_len(32).not_null())
                    .col(ColumnDef::new(PollOption::Position).integer().not_null())
                    .col(ColumnDef::new(PollOption::Text).string_len(256).not_null())
                    .col(
                        ColumnDef::new(PollOption::Votes)
                            .integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(PollOption::Votes).gte(0)),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_option_poll")
                            .from(PollOption::Table, PollOption::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (poll_id, position) - one option per display slot
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_option_poll_position")
                    .table(PollOption::Table)
                    .col(PollOption::PollId)
                    .col(PollOption::Position)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PollOption::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Poll::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Poll {
    Table,
    Id,
    AuthorId,
    Title,
    Description,
    Category,
    Kind,
    IsAnonymous,
    AllowComments,
    Tags,
    Status,
    TotalVotes,
    VotersCount,
    StartsAt,
    EndsAt,
    ClosedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum PollOption {
    Table,
    Id,
    PollId,
    Position,
    Text,
    Votes,
}
