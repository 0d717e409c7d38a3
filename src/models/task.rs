use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::models::timestamp;

/// Lifecycle state of a crawl task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed and failed tasks never change status again
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only lifecycle.
    ///
    /// Staying in the same state is allowed (a poll that observes no change),
    /// moving between the two terminal states is not.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// A crawl job as reported by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned identifier
    pub id: i64,

    /// URL being crawled
    pub url: String,

    /// Template applied to the crawl, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,

    pub status: TaskStatus,

    /// Configuration the task was submitted with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<CrawlConfig>,

    /// Present only once the task has completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CrawlResult>,

    /// Present only once the task has failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,

    /// Set exactly when the status is terminal
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "timestamp::option::deserialize"
    )]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Check the status-dependent field invariants, returning the first violation
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.status.is_terminal() != self.completed_at.is_some() {
            return Err(format!(
                "task {}: completed_at must be set exactly when the status is terminal (status {})",
                self.id, self.status
            ));
        }
        if self.result.is_some() && self.status != TaskStatus::Completed {
            return Err(format!(
                "task {}: result present while status is {}",
                self.id, self.status
            ));
        }
        if self.error_message.is_some() && self.status != TaskStatus::Failed {
            return Err(format!(
                "task {}: error_message present while status is {}",
                self.id, self.status
            ));
        }
        Ok(())
    }
}

/// Options forwarded verbatim to the crawl service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_config: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawler_config: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced: Option<Value>,

    /// Keys this client does not know about, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Output of a completed crawl
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_markdown: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<ResultLinks>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<ResultMedia>,

    /// Base64 encoded screenshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultLinks {
    #[serde(default)]
    pub internal: Vec<String>,
    #[serde(default)]
    pub external: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMedia {
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub audio: Vec<String>,
}

/// Conjunctive task list filter; absent fields are not sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl TaskFilter {
    /// Overlay every field set in `partial` onto this filter
    pub fn merge(&mut self, partial: TaskFilter) {
        if partial.status.is_some() {
            self.status = partial.status;
        }
        if partial.template_id.is_some() {
            self.template_id = partial.template_id;
        }
        if partial.date_from.is_some() {
            self.date_from = partial.date_from;
        }
        if partial.date_to.is_some() {
            self.date_to = partial.date_to;
        }
        if partial.search.is_some() {
            self.search = partial.search;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskFilter::default()
    }
}

/// Body of `POST /crawl`
#[derive(Debug, Clone, Serialize)]
pub struct CreateCrawlRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<CrawlConfig>,
}

/// Response data of `POST /crawl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedTask {
    pub task_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CrawlResult>,
}

/// Body of `POST /crawl/batch`
#[derive(Debug, Clone, Serialize)]
pub struct BatchCrawlRequest {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<CrawlConfig>,
    /// Advisory hint for the service, the client never fans out itself
    pub max_concurrent: u32,
}

/// Response data of `POST /crawl/batch`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    #[serde(default)]
    pub task_ids: Vec<i64>,
}

/// Task counts derived from a task collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskStats {
    /// Pending tasks only count toward `total`
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        Self {
            total: tasks.len(),
            running: count(TaskStatus::Running),
            completed: count(TaskStatus::Completed),
            failed: count(TaskStatus::Failed),
        }
    }
}
