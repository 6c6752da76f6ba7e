//! Poll entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How many options a voter may select.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PollKind {
    /// Exactly one option per ballot.
    #[sea_orm(string_value = "single")]
    Single,
    /// One or more options per ballot.
    #[sea_orm(string_value = "multiple")]
    Multiple,
}

/// Poll lifecycle state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "closed")]
    Closed,
}

impl PollStatus {
    /// Whether `self -> next` is a legal lifecycle step.
    ///
    /// Transitions are monotonic: `draft -> active -> closed`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Active) | (Self::Active, Self::Closed)
        )
    }

    /// Lower-case name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

/// Topic a poll is filed under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PollCategory {
    #[sea_orm(string_value = "community")]
    Community,
    #[sea_orm(string_value = "safety")]
    Safety,
    #[sea_orm(string_value = "development")]
    Development,
    #[sea_orm(string_value = "events")]
    Events,
    #[sea_orm(string_value = "general")]
    General,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "poll")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// User who created the poll
    #[sea_orm(indexed)]
    pub author_id: String,

    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub category: PollCategory,

    pub kind: PollKind,

    /// Voter identities are not retained against options
    pub is_anonymous: bool,

    pub allow_comments: bool,

    /// Tags (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: Json,

    pub status: PollStatus,

    /// Sum of all option vote counts
    pub total_votes: i32,

    /// Number of ballots cast
    pub voters_count: i32,

    pub starts_at: DateTimeWithTimeZone,

    /// Voting deadline (null for no deadline)
    #[sea_orm(nullable)]
    pub ends_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub closed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Whether the poll has passed its deadline at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTimeWithTimeZone) -> bool {
        self.ends_at.as_ref().is_some_and(|end| *end <= now)
    }

    /// Status as observed at `now`.
    ///
    /// An active poll past its deadline reads as closed even before the
    /// expiry sweep has persisted the transition.
    #[must_use]
    pub fn effective_status(&self, now: DateTimeWithTimeZone) -> PollStatus {
        if self.status == PollStatus::Active && self.is_expired_at(now) {
            PollStatus::Closed
        } else {
            self.status
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::poll_option::Entity")]
    PollOption,

    #[sea_orm(has_many = "super::poll_vote::Entity")]
    PollVote,

    #[sea_orm(has_many = "super::poll_comment::Entity")]
    PollComment,
}

impl Related<super::poll_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollOption.def()
    }
}

impl Related<super::poll_vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollVote.def()
    }
}

impl Related<super::poll_comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollComment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
