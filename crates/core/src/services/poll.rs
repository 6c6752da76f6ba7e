//! Poll service.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use neighborly_common::{AppError, AppResult, IdGenerator, config::PollsConfig};
use neighborly_db::{
    entities::{
        poll::{self, PollCategory, PollKind, PollStatus},
        poll_comment, poll_option, poll_vote,
    },
    repositories::{
        PollCommentRepository, PollListFilter, PollRepository, PollVoteRepository, Recount,
    },
};
use sea_orm::Set;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use validator::Validate;

use crate::services::identity::{GUEST_PREFIX, Voter};
use crate::tally::{Tally, normalize_selection};

/// Longest allowed option label.
const MAX_OPTION_LEN: usize = 256;
/// Maximum number of tags per poll.
const MAX_TAGS: usize = 16;
/// Upper bound for list page sizes.
const MAX_LIST_LIMIT: u64 = 100;

/// Limits applied when creating polls.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Voting window used when no end date is given.
    pub default_duration: Duration,
    /// Maximum number of options per poll.
    pub max_options: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&PollsConfig::default())
    }
}

impl PollSettings {
    /// Build settings from the `[polls]` config section.
    #[must_use]
    pub fn from_config(config: &PollsConfig) -> Self {
        Self {
            default_duration: Duration::days(config.default_duration_days),
            max_options: config.max_options,
        }
    }
}

/// Input for creating a poll.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollInput {
    #[validate(length(min = 1, max = 256))]
    pub title: String,
    #[validate(length(min = 1, max = 4096))]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: PollCategory,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: PollKind,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default = "default_true")]
    pub allow_comments: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub options: Vec<String>,
    pub ends_at: Option<DateTime<Utc>>,
    /// Create the poll as a draft instead of opening it immediately.
    #[serde(default)]
    pub draft: bool,
}

impl CreatePollInput {
    /// Trim free text so that whitespace-only values fail validation.
    #[must_use]
    pub fn trimmed(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self
    }
}

const fn default_category() -> PollCategory {
    PollCategory::General
}

const fn default_kind() -> PollKind {
    PollKind::Single
}

const fn default_true() -> bool {
    true
}

/// Input for commenting on a poll.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentInput {
    pub poll_id: String,
    #[validate(length(min = 1, max = 2048))]
    pub comment: String,
}

impl CreateCommentInput {
    /// Trim the comment so that a blank one fails validation.
    #[must_use]
    pub fn trimmed(mut self) -> Self {
        self.comment = self.comment.trim().to_string();
        self
    }
}

/// A poll with its tallies, as seen by one viewer.
#[derive(Debug, Clone)]
pub struct PollView {
    pub poll: poll::Model,
    /// Status at read time; an expired active poll reads as closed.
    pub status: PollStatus,
    pub tally: Tally,
    pub has_voted: bool,
    /// Options the viewer selected, in display order.
    pub viewer_choices: Vec<String>,
}

/// A poll as shown in listings.
#[derive(Debug, Clone)]
pub struct PollSummary {
    pub poll: poll::Model,
    pub status: PollStatus,
    pub tally: Tally,
}

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    poll_repo: PollRepository,
    vote_repo: PollVoteRepository,
    comment_repo: PollCommentRepository,
    id_gen: IdGenerator,
    settings: PollSettings,
}

/// Identity stored on a ballot.
///
/// Anonymous polls store a digest bound to the poll so that the same voter
/// cannot be correlated across polls. Guest keys are always a digest; the
/// device token is never stored.
#[must_use]
pub fn voter_key(poll: &poll::Model, voter: &Voter) -> String {
    match voter {
        _ if poll.is_anonymous => ballot_digest(poll, &voter.id()),
        Voter::Member { id } => id.clone(),
        Voter::Guest { .. } => format!("{GUEST_PREFIX}{}", ballot_digest(poll, &voter.id())),
    }
}

fn ballot_digest(poll: &poll::Model, voter_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(poll.id.as_bytes());
    hasher.update(b":");
    hasher.update(voter_id.as_bytes());
    hex::encode(hasher.finalize())
}

fn now() -> DateTime<FixedOffset> {
    Utc::now().into()
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub const fn new(
        poll_repo: PollRepository,
        vote_repo: PollVoteRepository,
        comment_repo: PollCommentRepository,
        settings: PollSettings,
    ) -> Self {
        Self {
            poll_repo,
            vote_repo,
            comment_repo,
            id_gen: IdGenerator::new(),
            settings,
        }
    }

    /// Create a poll with its options.
    pub async fn create_poll(&self, author_id: &str, input: CreatePollInput) -> AppResult<PollView> {
        let input = input.trimmed();
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let choices: Vec<String> = input
            .options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(ToString::to_string)
            .collect();

        if choices.len() < 2 {
            return Err(AppError::Validation(
                "Poll must have at least 2 options".to_string(),
            ));
        }
        if choices.len() > self.settings.max_options {
            return Err(AppError::Validation(format!(
                "Poll cannot have more than {} options",
                self.settings.max_options
            )));
        }
        if choices.iter().any(|c| c.chars().count() > MAX_OPTION_LEN) {
            return Err(AppError::Validation(format!(
                "Poll option is too long (max {MAX_OPTION_LEN} chars)"
            )));
        }

        let mut tags: Vec<String> = Vec::new();
        for tag in input.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        if tags.len() > MAX_TAGS {
            return Err(AppError::Validation(format!(
                "Poll cannot have more than {MAX_TAGS} tags"
            )));
        }

        let created_at = now();
        let ends_at: DateTime<FixedOffset> = match input.ends_at {
            Some(end) if end <= Utc::now() => {
                return Err(AppError::Validation(
                    "Poll end date must be in the future".to_string(),
                ));
            }
            Some(end) => end.into(),
            None => created_at + self.settings.default_duration,
        };

        let status = if input.draft {
            PollStatus::Draft
        } else {
            PollStatus::Active
        };

        let poll_id = self.id_gen.generate();
        let model = poll::ActiveModel {
            id: Set(poll_id.clone()),
            author_id: Set(author_id.to_string()),
            title: Set(input.title),
            description: Set(input.description),
            category: Set(input.category),
            kind: Set(input.kind),
            is_anonymous: Set(input.is_anonymous),
            allow_comments: Set(input.allow_comments),
            tags: Set(json!(tags)),
            status: Set(status),
            total_votes: Set(0),
            voters_count: Set(0),
            starts_at: Set(created_at),
            ends_at: Set(Some(ends_at)),
            closed_at: Set(None),
            created_at: Set(created_at),
            updated_at: Set(None),
        };

        let options: Vec<poll_option::Model> = self
            .id_gen
            .generate_ordered(choices.len())
            .into_iter()
            .zip(choices)
            .enumerate()
            .map(|(position, (id, text))| poll_option::Model {
                id,
                poll_id: poll_id.clone(),
                position: position as i32,
                text,
                votes: 0,
            })
            .collect();

        let poll = self
            .poll_repo
            .create(model, options.iter().cloned().map(Into::into).collect())
            .await?;

        tracing::info!(
            poll_id = %poll.id,
            author_id = author_id,
            options = options.len(),
            status = poll.status.as_str(),
            "Poll created"
        );

        Ok(PollView {
            status: poll.effective_status(now()),
            tally: Tally::from_counts(&options, 0),
            poll,
            has_voted: false,
            viewer_choices: vec![],
        })
    }

    /// Get a poll with tallies for a viewer.
    ///
    /// Drafts are only visible to their author.
    pub async fn get_poll(&self, poll_id: &str, viewer: Option<&Voter>) -> AppResult<PollView> {
        let poll = self.get_visible(poll_id, viewer).await?;

        let options = self.poll_repo.find_options(poll_id).await?;
        let mut tally = Tally::from_counts(&options, poll.voters_count);
        let viewer_key = viewer.map(|v| voter_key(&poll, v));

        let viewer_ballot = if poll.is_anonymous {
            match viewer_key {
                Some(ref key) => self.vote_repo.find_by_poll_and_voter(poll_id, key).await?,
                None => None,
            }
        } else {
            let ballots = self.vote_repo.find_by_poll(poll_id).await?;
            tally.attach_voters(&ballots);
            viewer_key.and_then(|key| ballots.into_iter().find(|b| b.voter_key == key))
        };

        Ok(PollView {
            status: poll.effective_status(now()),
            has_voted: viewer_ballot.is_some(),
            viewer_choices: viewer_ballot
                .map(|b| b.selected_options())
                .unwrap_or_default(),
            poll,
            tally,
        })
    }

    /// List polls, newest first.
    ///
    /// Drafts are only listed for their author.
    pub async fn list_polls(
        &self,
        viewer_id: Option<&str>,
        filter: &PollListFilter,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<PollSummary>> {
        let polls = self
            .poll_repo
            .list(filter, viewer_id, limit.clamp(1, MAX_LIST_LIMIT), until_id)
            .await?;

        let ids: Vec<String> = polls.iter().map(|p| p.id.clone()).collect();
        let options = self.poll_repo.find_options_for(&ids).await?;

        let at = now();
        Ok(polls
            .into_iter()
            .map(|poll| {
                let own: Vec<poll_option::Model> = options
                    .iter()
                    .filter(|o| o.poll_id == poll.id)
                    .cloned()
                    .collect();
                PollSummary {
                    status: poll.effective_status(at),
                    tally: Tally::from_counts(&own, poll.voters_count),
                    poll,
                }
            })
            .collect())
    }

    /// Check whether a voter has a ballot on a poll.
    ///
    /// A caller without an identity has not voted.
    pub async fn has_voted(&self, poll_id: &str, voter: Option<&Voter>) -> AppResult<bool> {
        let Some(voter) = voter else {
            return Ok(false);
        };

        let poll = self.get_visible(poll_id, Some(voter)).await?;
        self.vote_repo
            .has_voted(poll_id, &voter_key(&poll, voter))
            .await
    }

    /// Cast a vote and return the updated poll.
    ///
    /// The ballot and every counter change are written in one transaction.
    /// The pre-check only short-circuits the common case; the unique key on
    /// `(poll_id, voter_key)` is what rejects a concurrent second ballot.
    pub async fn cast_vote(
        &self,
        poll_id: &str,
        voter: &Voter,
        selected: &[String],
    ) -> AppResult<PollView> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        let at = now();

        if poll.effective_status(at) != PollStatus::Active {
            return Err(AppError::PollClosed(poll_id.to_string()));
        }

        let options = self.poll_repo.find_options(poll_id).await?;
        let selection = normalize_selection(poll.kind, &options, selected)?;

        let key = voter_key(&poll, voter);
        if self.vote_repo.has_voted(poll_id, &key).await? {
            return Err(AppError::AlreadyVoted);
        }

        let ballot = poll_vote::ActiveModel {
            id: Set(self.id_gen.generate()),
            poll_id: Set(poll_id.to_string()),
            voter_key: Set(key),
            option_ids: Set(json!(selection)),
            created_at: Set(at),
        };

        self.vote_repo
            .record(ballot, poll_id, &selection, at)
            .await
            .inspect_err(|e| {
                tracing::debug!(poll_id = poll_id, error = %e, "Vote rejected");
            })?;

        tracing::info!(
            poll_id = poll_id,
            member = voter.is_member(),
            selected = selection.len(),
            "Vote recorded"
        );

        self.get_poll(poll_id, Some(voter)).await
    }

    /// Open a draft poll for voting.
    pub async fn publish_poll(&self, poll_id: &str, author_id: &str) -> AppResult<poll::Model> {
        let poll = self.get_owned(poll_id, author_id).await?;
        let at = now();

        if poll.is_expired_at(at) {
            return Err(AppError::Validation(
                "Poll end date has already passed".to_string(),
            ));
        }

        self.transition(&poll, PollStatus::Active, at).await
    }

    /// Close an active poll.
    pub async fn close_poll(&self, poll_id: &str, author_id: &str) -> AppResult<poll::Model> {
        let poll = self.get_owned(poll_id, author_id).await?;
        self.transition(&poll, PollStatus::Closed, now()).await
    }

    /// Close every active poll past its end date.
    pub async fn close_expired_polls(&self) -> AppResult<u64> {
        let closed = self.poll_repo.close_expired(now()).await?;
        if closed > 0 {
            tracing::info!(count = closed, "Closed expired polls");
        }
        Ok(closed)
    }

    /// Rebuild the stored counters of a poll from its ballots.
    ///
    /// Safe to run while votes are being cast.
    pub async fn recount_poll(&self, poll_id: &str, author_id: &str) -> AppResult<PollView> {
        self.get_owned(poll_id, author_id).await?;

        self.poll_repo
            .recount(poll_id, now(), |stored, options, ballots| {
                let tally = Tally::replay(options, ballots, false);

                if tally.total_votes() != stored.total_votes
                    || tally.voters_count() != stored.voters_count
                {
                    tracing::warn!(
                        poll_id = poll_id,
                        stored_total = stored.total_votes,
                        counted_total = tally.total_votes(),
                        stored_voters = stored.voters_count,
                        counted_voters = tally.voters_count(),
                        "Poll counters drifted from ballot log"
                    );
                }

                Recount {
                    option_votes: tally.counts(),
                    total_votes: tally.total_votes(),
                    voters_count: tally.voters_count(),
                }
            })
            .await?;

        self.get_poll(poll_id, None).await
    }

    /// Add a comment to a poll.
    pub async fn add_comment(
        &self,
        user_id: &str,
        input: CreateCommentInput,
    ) -> AppResult<poll_comment::Model> {
        let input = input.trimmed();
        input
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let poll = self.poll_repo.get_by_id(&input.poll_id).await?;
        if poll.status == PollStatus::Draft && poll.author_id != user_id {
            return Err(AppError::PollNotFound(input.poll_id));
        }
        if !poll.allow_comments {
            return Err(AppError::Forbidden(
                "Comments are disabled for this poll".to_string(),
            ));
        }

        let model = poll_comment::ActiveModel {
            id: Set(self.id_gen.generate()),
            poll_id: Set(poll.id),
            user_id: Set(user_id.to_string()),
            comment: Set(input.comment),
            created_at: Set(now()),
        };

        self.comment_repo.create(model).await
    }

    /// List comments on a poll, oldest first.
    pub async fn list_comments(
        &self,
        poll_id: &str,
        viewer: Option<&Voter>,
        limit: u64,
        since_id: Option<&str>,
    ) -> AppResult<Vec<poll_comment::Model>> {
        self.get_visible(poll_id, viewer).await?;
        self.comment_repo
            .find_by_poll(poll_id, limit.clamp(1, MAX_LIST_LIMIT), since_id)
            .await
    }

    /// Load a poll, hiding drafts from everyone but their author.
    async fn get_visible(&self, poll_id: &str, viewer: Option<&Voter>) -> AppResult<poll::Model> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        let is_author = matches!(viewer, Some(Voter::Member { id }) if *id == poll.author_id);
        if poll.status == PollStatus::Draft && !is_author {
            return Err(AppError::PollNotFound(poll_id.to_string()));
        }
        Ok(poll)
    }

    async fn get_owned(&self, poll_id: &str, author_id: &str) -> AppResult<poll::Model> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        if poll.author_id != author_id {
            return Err(AppError::Forbidden("Not the poll author".to_string()));
        }
        Ok(poll)
    }

    async fn transition(
        &self,
        poll: &poll::Model,
        to: PollStatus,
        at: DateTime<FixedOffset>,
    ) -> AppResult<poll::Model> {
        if !poll.status.can_transition_to(to) {
            return Err(AppError::Conflict(format!(
                "Cannot move poll from {} to {}",
                poll.status.as_str(),
                to.as_str()
            )));
        }

        if !self
            .poll_repo
            .transition_status(&poll.id, poll.status, to, at)
            .await?
        {
            return Err(AppError::Conflict(
                "Poll status changed concurrently".to_string(),
            ));
        }

        tracing::info!(
            poll_id = %poll.id,
            from = poll.status.as_str(),
            to = to.as_str(),
            "Poll status changed"
        );

        self.poll_repo.get_by_id(&poll.id).await
    }
}
