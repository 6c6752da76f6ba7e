//! Poll repository.

use std::sync::Arc;

use crate::entities::{
    Poll, PollOption, PollVote,
    poll::{self, PollCategory, PollStatus},
    poll_option, poll_vote,
};
use chrono::{DateTime, FixedOffset};
use neighborly_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait, sea_query::Expr,
};

/// Filter for listing polls.
#[derive(Debug, Clone, Default)]
pub struct PollListFilter {
    /// Only polls with this stored status.
    pub status: Option<PollStatus>,
    /// Only polls in this category.
    pub category: Option<PollCategory>,
    /// Only polls created by this author.
    pub author_id: Option<String>,
}

/// Counters rebuilt from the ballot log of a poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recount {
    /// `(option_id, votes)` for every option of the poll.
    pub option_votes: Vec<(String, i32)>,
    pub total_votes: i32,
    pub voters_count: i32,
}

/// Poll repository for database operations.
#[derive(Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
}

impl PollRepository {
    /// Create a new poll repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a poll by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<poll::Model>> {
        Poll::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a poll by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<poll::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PollNotFound(id.to_string()))
    }

    /// Get the options of a poll in display order.
    pub async fn find_options(&self, poll_id: &str) -> AppResult<Vec<poll_option::Model>> {
        PollOption::find()
            .filter(poll_option::Column::PollId.eq(poll_id))
            .order_by_asc(poll_option::Column::Position)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get the options of several polls in display order.
    pub async fn find_options_for(
        &self,
        poll_ids: &[String],
    ) -> AppResult<Vec<poll_option::Model>> {
        if poll_ids.is_empty() {
            return Ok(vec![]);
        }

        PollOption::find()
            .filter(poll_option::Column::PollId.is_in(poll_ids.iter().cloned()))
            .order_by_asc(poll_option::Column::PollId)
            .order_by_asc(poll_option::Column::Position)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a poll together with its options.
    ///
    /// Options are written in the same transaction as the poll and are never
    /// added or removed afterwards.
    pub async fn create(
        &self,
        model: poll::ActiveModel,
        options: Vec<poll_option::ActiveModel>,
    ) -> AppResult<poll::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let poll = model
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        PollOption::insert_many(options)
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(poll)
    }

    /// List polls, newest first.
    ///
    /// Drafts are only included when `viewer_id` is their author.
    pub async fn list(
        &self,
        filter: &PollListFilter,
        viewer_id: Option<&str>,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<poll::Model>> {
        let mut visible = Condition::any().add(poll::Column::Status.ne(PollStatus::Draft));
        if let Some(viewer_id) = viewer_id {
            visible = visible.add(poll::Column::AuthorId.eq(viewer_id));
        }

        let mut query = Poll::find()
            .filter(visible)
            .order_by_desc(poll::Column::Id);

        if let Some(status) = filter.status {
            query = query.filter(poll::Column::Status.eq(status));
        }
        if let Some(category) = filter.category {
            query = query.filter(poll::Column::Category.eq(category));
        }
        if let Some(ref author_id) = filter.author_id {
            query = query.filter(poll::Column::AuthorId.eq(author_id.as_str()));
        }
        if let Some(id) = until_id {
            query = query.filter(poll::Column::Id.lt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Move a poll from `from` to `to` if it is still in `from`.
    ///
    /// Returns `false` when another writer changed the status first.
    pub async fn transition_status(
        &self,
        id: &str,
        from: PollStatus,
        to: PollStatus,
        now: DateTime<FixedOffset>,
    ) -> AppResult<bool> {
        let mut update = Poll::update_many()
            .col_expr(poll::Column::Status, Expr::value(to.as_str()))
            .col_expr(poll::Column::UpdatedAt, Expr::value(now));

        if to == PollStatus::Closed {
            update = update.col_expr(poll::Column::ClosedAt, Expr::value(now));
        }

        let result = update
            .filter(poll::Column::Id.eq(id))
            .filter(poll::Column::Status.eq(from))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Close every active poll whose deadline is at or before `now`.
    pub async fn close_expired(&self, now: DateTime<FixedOffset>) -> AppResult<u64> {
        let result = Poll::update_many()
            .col_expr(
                poll::Column::Status,
                Expr::value(PollStatus::Closed.as_str()),
            )
            .col_expr(poll::Column::ClosedAt, Expr::value(now))
            .col_expr(poll::Column::UpdatedAt, Expr::value(now))
            .filter(poll::Column::Status.eq(PollStatus::Active))
            .filter(poll::Column::EndsAt.is_not_null())
            .filter(poll::Column::EndsAt.lte(now))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Rebuild the stored counters of a poll from its ballot log.
    ///
    /// The poll row is locked before the ballots are read, so a vote either
    /// lands in the log `replay` sees or is applied on top of the result.
    /// Rows are written poll first, then options, the same order votes use.
    pub async fn recount<F>(
        &self,
        poll_id: &str,
        now: DateTime<FixedOffset>,
        replay: F,
    ) -> AppResult<Recount>
    where
        F: FnOnce(&poll::Model, &[poll_option::Model], &[poll_vote::Model]) -> Recount,
    {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let poll = Poll::find_by_id(poll_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::PollNotFound(poll_id.to_string()))?;

        let options = PollOption::find()
            .filter(poll_option::Column::PollId.eq(poll_id))
            .order_by_asc(poll_option::Column::Position)
            .all(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let ballots = PollVote::find()
            .filter(poll_vote::Column::PollId.eq(poll_id))
            .order_by_asc(poll_vote::Column::Id)
            .all(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let recount = replay(&poll, &options, &ballots);

        Poll::update_many()
            .col_expr(poll::Column::TotalVotes, Expr::value(recount.total_votes))
            .col_expr(poll::Column::VotersCount, Expr::value(recount.voters_count))
            .col_expr(poll::Column::UpdatedAt, Expr::value(now))
            .filter(poll::Column::Id.eq(poll_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        for (option_id, votes) in &recount.option_votes {
            PollOption::update_many()
                .col_expr(poll_option::Column::Votes, Expr::value(*votes))
                .filter(poll_option::Column::PollId.eq(poll_id))
                .filter(poll_option::Column::Id.eq(option_id.as_str()))
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(recount)
    }
}
