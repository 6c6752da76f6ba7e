//! Poll vote (ballot) repository.

use std::sync::Arc;

use crate::entities::{
    Poll, PollOption, PollVote,
    poll::{self, PollStatus},
    poll_option, poll_vote,
};
use crate::is_unique_violation;
use chrono::{DateTime, FixedOffset};
use neighborly_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, TransactionTrait, sea_query::Expr,
};

/// Poll vote repository for database operations.
#[derive(Clone)]
pub struct PollVoteRepository {
    db: Arc<DatabaseConnection>,
}

impl PollVoteRepository {
    /// Create a new poll vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the ballot a voter cast on a poll.
    pub async fn find_by_poll_and_voter(
        &self,
        poll_id: &str,
        voter_key: &str,
    ) -> AppResult<Option<poll_vote::Model>> {
        PollVote::find()
            .filter(poll_vote::Column::PollId.eq(poll_id))
            .filter(poll_vote::Column::VoterKey.eq(voter_key))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Check if a voter has a ballot on a poll.
    pub async fn has_voted(&self, poll_id: &str, voter_key: &str) -> AppResult<bool> {
        let count = PollVote::find()
            .filter(poll_vote::Column::PollId.eq(poll_id))
            .filter(poll_vote::Column::VoterKey.eq(voter_key))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Get every ballot on a poll, oldest first.
    pub async fn find_by_poll(&self, poll_id: &str) -> AppResult<Vec<poll_vote::Model>> {
        PollVote::find()
            .filter(poll_vote::Column::PollId.eq(poll_id))
            .order_by_asc(poll_vote::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Record a ballot and apply it to the poll counters.
    ///
    /// Runs in one transaction:
    /// 1. insert the ballot; the `(poll_id, voter_key)` unique key rejects a
    ///    second ballot from the same voter,
    /// 2. bump `voters_count` and `total_votes` only while the poll is active,
    /// 3. increment each selected option with `votes = votes + 1`.
    ///
    /// Nothing is written unless all three steps succeed.
    pub async fn record(
        &self,
        ballot: poll_vote::ActiveModel,
        poll_id: &str,
        option_ids: &[String],
        now: DateTime<FixedOffset>,
    ) -> AppResult<poll_vote::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let ballot = ballot.insert(&txn).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::AlreadyVoted
            } else {
                AppError::Database(e.to_string())
            }
        })?;

        let selected = option_ids.len() as i32;
        let poll_update = Poll::update_many()
            .col_expr(
                poll::Column::VotersCount,
                Expr::col(poll::Column::VotersCount).add(1),
            )
            .col_expr(
                poll::Column::TotalVotes,
                Expr::col(poll::Column::TotalVotes).add(selected),
            )
            .col_expr(poll::Column::UpdatedAt, Expr::value(now))
            .filter(poll::Column::Id.eq(poll_id))
            .filter(poll::Column::Status.eq(PollStatus::Active))
            .filter(
                poll::Column::EndsAt
                    .is_null()
                    .or(poll::Column::EndsAt.gt(now)),
            )
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if poll_update.rows_affected == 0 {
            return Err(AppError::PollClosed(poll_id.to_string()));
        }

        let option_update = PollOption::update_many()
            .col_expr(
                poll_option::Column::Votes,
                Expr::col(poll_option::Column::Votes).add(1),
            )
            .filter(poll_option::Column::PollId.eq(poll_id))
            .filter(poll_option::Column::Id.is_in(option_ids.iter().cloned()))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if option_update.rows_affected != option_ids.len() as u64 {
            return Err(AppError::Validation(format!(
                "Selection does not match the options of poll {poll_id}"
            )));
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(ballot)
    }
}
