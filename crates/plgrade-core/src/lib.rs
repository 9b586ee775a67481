//! plgrade core library
//!
//! Score aggregation, rubric grading and batch grading progress for
//! assessment instances.

pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod grading;
pub mod jobs;
pub mod logging;
pub mod numeric;
pub mod rubric;
pub mod scoring;
