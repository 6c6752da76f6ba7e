//! Core business logic for neighborly polls.

pub mod services;
pub mod tally;

pub use services::*;
pub use tally::{OptionTally, Tally};
