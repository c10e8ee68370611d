//! The three generation tasks.
//!
//! Each task owns its provider chain and policy (templates, schema, limits)
//! and runs one linear pass: build the request, drive the chain through
//! [`orchestrator::execute`](crate::orchestrator::execute), return the record.
//! Chain exhaustion is surfaced unchanged, tagged with the task name.

pub mod article;
pub mod image;
pub mod image_prompt;

pub use article::ArticleTask;
pub use image::ImageTask;
pub use image_prompt::ImagePromptTask;

use crate::error::{TaskError, TaskName};

/// Trimmed topic, or `EmptyTopic` before any provider is touched.
pub(crate) fn require_topic(topic: &str, task: TaskName) -> Result<&str, TaskError> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(TaskError::EmptyTopic { task });
    }
    Ok(topic)
}
