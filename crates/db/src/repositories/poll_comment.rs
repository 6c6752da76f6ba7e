//! Poll comment repository.

use std::sync::Arc;

use crate::entities::{PollComment, poll_comment};
use neighborly_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};

/// Poll comment repository for database operations.
#[derive(Clone)]
pub struct PollCommentRepository {
    db: Arc<DatabaseConnection>,
}

impl PollCommentRepository {
    /// Create a new poll comment repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new comment.
    pub async fn create(
        &self,
        model: poll_comment::ActiveModel,
    ) -> AppResult<poll_comment::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get comments on a poll (paginated, oldest first).
    pub async fn find_by_poll(
        &self,
        poll_id: &str,
        limit: u64,
        since_id: Option<&str>,
    ) -> AppResult<Vec<poll_comment::Model>> {
        let mut query = PollComment::find()
            .filter(poll_comment::Column::PollId.eq(poll_id))
            .order_by_asc(poll_comment::Column::Id);

        if let Some(id) = since_id {
            query = query.filter(poll_comment::Column::Id.gt(id));
        }

        query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count comments on a poll.
    pub async fn count_by_poll(&self, poll_id: &str) -> AppResult<u64> {
        PollComment::find()
            .filter(poll_comment::Column::PollId.eq(poll_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_comment(id: &str, poll_id: &str, user_id: &str) -> poll_comment::Model {
        poll_comment::Model {
            id: id.to_string(),
            poll_id: poll_id.to_string(),
            user_id: user_id.to_string(),
            comment: "Speed bumps would help.".to_string(),
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_poll() {
        let c1 = create_test_comment("c1", "p1", "user1");
        let c2 = create_test_comment("c2", "p1", "user2");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[c1, c2]])
                .into_connection(),
        );

        let repo = PollCommentRepository::new(db);
        let result = repo.find_by_poll("p1", 10, None).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "c1");
    }

    #[tokio::test]
    async fn test_find_by_poll_empty() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<poll_comment::Model>::new()])
                .into_connection(),
        );

        let repo = PollCommentRepository::new(db);
        let result = repo.find_by_poll("p1", 10, Some("c9")).await.unwrap();

        assert!(result.is_empty());
    }
}
