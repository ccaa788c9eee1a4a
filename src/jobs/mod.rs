//! Long-running job tracking
//!
//! A [`PollSession`] follows one remote video job from submission to a
//! terminal state, refreshing its operation handle on a fixed cadence and
//! downloading the finished media.

pub mod session;

pub use session::{JobOutcome, JobState, PollConfig, PollSession};
