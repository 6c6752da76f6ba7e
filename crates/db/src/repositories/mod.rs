//! Repositories wrapping database access per aggregate.

mod poll;
mod poll_comment;
mod poll_vote;

pub use poll::{PollListFilter, PollRepository, Recount};
pub use poll_comment::PollCommentRepository;
pub use poll_vote::PollVoteRepository;
