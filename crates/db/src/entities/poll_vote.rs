//! Poll vote entity: one ballot per voter per poll.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "poll_vote")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub poll_id: String,

    /// Voter ID, or a digest of it for anonymous polls.
    /// Unique together with `poll_id`.
    pub voter_key: String,

    /// Selected option IDs (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub option_ids: Json,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Selected option IDs, ignoring malformed entries.
    #[must_use]
    pub fn selected_options(&self) -> Vec<String> {
        serde_json::from_value(self.option_ids.clone()).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::poll::Entity",
        from = "Column::PollId",
        to = "super::poll::Column::Id",
        on_delete = "Cascade"
    )]
    Poll,
}

impl Related<super::poll::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Poll.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
