//! plgrade command implementations

pub mod dispatch;
pub mod finalize;
pub mod format;
pub mod grade;
pub mod init;
pub mod jobs;
pub mod load;
pub mod rubric;
pub mod score;
pub mod show;
pub mod submit;
