//! Poll tally projection.
//!
//! A [`Tally`] holds per-option vote counts for one poll. Percentages are
//! never stored; they are derived from the counts every time they are read.

use neighborly_common::{AppError, AppResult};
use neighborly_db::entities::{poll::PollKind, poll_option, poll_vote};
use serde::Serialize;

use crate::services::identity::GUEST_PREFIX;

/// Voter id shown on an option, if the ballot may be attributed.
///
/// Guest ballots are keyed by a digest and are never listed.
fn listed_voter(voter_key: &str) -> Option<&str> {
    (!voter_key.starts_with(GUEST_PREFIX)).then_some(voter_key)
}

/// Count for a single option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTally {
    /// Option ID.
    pub id: String,
    /// Display label.
    pub text: String,
    /// Number of ballots that selected this option.
    pub votes: i32,
    /// Voters who selected this option (empty for anonymous polls).
    pub voters: Vec<String>,
}

impl OptionTally {
    /// Share of `total_votes` held by this option, in percent.
    #[must_use]
    pub fn percentage(&self, total_votes: i32) -> f64 {
        if total_votes > 0 {
            f64::from(self.votes) / f64::from(total_votes) * 100.0
        } else {
            0.0
        }
    }
}

/// Vote counts for one poll, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    options: Vec<OptionTally>,
    voters_count: i32,
}

impl Tally {
    /// An empty tally over the given options.
    #[must_use]
    pub fn new(options: &[poll_option::Model]) -> Self {
        Self {
            options: options
                .iter()
                .map(|o| OptionTally {
                    id: o.id.clone(),
                    text: o.text.clone(),
                    votes: 0,
                    voters: vec![],
                })
                .collect(),
            voters_count: 0,
        }
    }

    /// A tally seeded from the stored option counters.
    #[must_use]
    pub fn from_counts(options: &[poll_option::Model], voters_count: i32) -> Self {
        let mut tally = Self::new(options);
        for (slot, option) in tally.options.iter_mut().zip(options) {
            slot.votes = option.votes;
        }
        tally.voters_count = voters_count;
        tally
    }

    /// Rebuild a tally by replaying a ballot log from zero.
    #[must_use]
    pub fn replay(
        options: &[poll_option::Model],
        ballots: &[poll_vote::Model],
        retain_voters: bool,
    ) -> Self {
        let mut tally = Self::new(options);
        for ballot in ballots {
            let voter = if retain_voters {
                listed_voter(&ballot.voter_key)
            } else {
                None
            };
            tally.record(&ballot.selected_options(), voter);
        }
        tally
    }

    /// Apply one ballot.
    ///
    /// Ids that do not belong to this poll are ignored.
    pub fn record(&mut self, option_ids: &[String], voter: Option<&str>) {
        for option in &mut self.options {
            if option_ids.contains(&option.id) {
                option.votes += 1;
                if let Some(voter) = voter {
                    option.voters.push(voter.to_string());
                }
            }
        }
        self.voters_count += 1;
    }

    /// Fill in per-option voter lists from the ballot log, leaving counts
    /// untouched. Guest ballots are counted but not listed.
    pub fn attach_voters(&mut self, ballots: &[poll_vote::Model]) {
        for ballot in ballots {
            let Some(voter) = listed_voter(&ballot.voter_key) else {
                continue;
            };
            let selected = ballot.selected_options();
            for option in &mut self.options {
                if selected.contains(&option.id) {
                    option.voters.push(voter.to_string());
                }
            }
        }
    }

    /// Options in display order.
    #[must_use]
    pub fn options(&self) -> &[OptionTally] {
        &self.options
    }

    /// The first two options, shown as a preview in poll listings.
    #[must_use]
    pub fn preview(&self) -> &[OptionTally] {
        &self.options[..self.options.len().min(2)]
    }

    /// Sum of all option counts.
    #[must_use]
    pub fn total_votes(&self) -> i32 {
        self.options.iter().map(|o| o.votes).sum()
    }

    /// Number of ballots applied.
    #[must_use]
    pub const fn voters_count(&self) -> i32 {
        self.voters_count
    }

    /// Percentage share of every option, in display order.
    #[must_use]
    pub fn shares(&self) -> Vec<f64> {
        let total = self.total_votes();
        self.options.iter().map(|o| o.percentage(total)).collect()
    }

    /// `(option_id, votes)` pairs for persisting a recount.
    #[must_use]
    pub fn counts(&self) -> Vec<(String, i32)> {
        self.options
            .iter()
            .map(|o| (o.id.clone(), o.votes))
            .collect()
    }
}

/// Check a selection against a poll and return it in display order.
///
/// Duplicate ids collapse into one. A single-choice poll accepts exactly one
/// option.
pub fn normalize_selection(
    kind: PollKind,
    options: &[poll_option::Model],
    selected: &[String],
) -> AppResult<Vec<String>> {
    if selected.is_empty() {
        return Err(AppError::Validation("No option selected".to_string()));
    }

    if let Some(unknown) = selected
        .iter()
        .find(|id| !options.iter().any(|o| &o.id == *id))
    {
        return Err(AppError::Validation(format!(
            "Option {unknown} does not belong to this poll"
        )));
    }

    let normalized: Vec<String> = options
        .iter()
        .filter(|o| selected.contains(&o.id))
        .map(|o| o.id.clone())
        .collect();

    if kind == PollKind::Single && normalized.len() > 1 {
        return Err(AppError::Validation(
            "Only one option may be selected on a single-choice poll".to_string(),
        ));
    }

    Ok(normalized)
}
