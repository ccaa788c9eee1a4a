//! Async generation-job orchestration for a hosted generative media service
//!
//! Wraps image creation, multi-image editing, grounded idea generation,
//! speech synthesis and long-running video generation behind per-tool state,
//! with a poll-based tracker for video jobs.

pub mod ai;
pub mod app;
pub mod codec;
pub mod error;
pub mod jobs;
pub mod models;
pub mod prompts;

pub use error::{Error, ErrorClass, RemoteErrorKind, Result};
