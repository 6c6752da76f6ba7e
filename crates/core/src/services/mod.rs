//! Business logic services.

#![allow(missing_docs)]

pub mod identity;
pub mod poll;

pub use identity::{Claims, IdentityService, Voter};
pub use poll::{
    CreateCommentInput, CreatePollInput, PollService, PollSettings, PollSummary, PollView,
};
