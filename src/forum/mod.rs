//! Course forum access.

pub mod parse;
pub mod piazza;

pub use piazza::PiazzaClient;

use crate::error::FeedbackError;
use crate::models::{Course, Post};
use async_trait::async_trait;

/// A source of courses and their posts.
#[async_trait]
pub trait ForumSource: Send + Sync {
    /// Courses visible to the authenticated user.
    async fn list_courses(&self) -> Result<Vec<Course>, FeedbackError>;

    /// Posts of one course in feed order, at most `limit` when given.
    async fn fetch_posts(&self, course_id: &str, limit: Option<usize>) -> Result<Vec<Post>, FeedbackError>;
}
