use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::api::CrawlApi;
use crate::error::{ClientError, Result};
use crate::models::{
    BatchCrawlRequest, BatchSummary, CrawlConfig, CreateCrawlRequest, CreatedTask, Task,
    TaskFilter, TaskStats, TaskStatus,
};
use crate::store::poller::{PollConfig, PollHandle, TaskPoller, TaskSource};

/// Default advisory concurrency sent with batch requests
pub const DEFAULT_MAX_CONCURRENT: u32 = 5;

/// How overlapping `load_tasks` calls are reconciled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshOrdering {
    /// Whichever response resolves last is applied
    #[default]
    LastResolved,

    /// Responses to calls issued before the last applied one are dropped
    LatestIssued,
}

/// Which operations are currently running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskLoading {
    pub tasks: bool,
    pub current: bool,
    pub creating: bool,
}

/// Consistent copy of the whole task store state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSnapshot {
    pub tasks: Vec<Task>,
    pub current: Option<Task>,
    pub filter: TaskFilter,
    pub error: Option<String>,
    pub loading: TaskLoading,
    pub stats: TaskStats,
}

#[derive(Debug, Clone, Copy)]
enum Activity {
    Current,
    Creating,
}

#[derive(Debug, Default)]
struct TaskState {
    tasks: Vec<Task>,
    current: Option<Task>,
    filter: TaskFilter,
    error: Option<String>,

    // Counters so overlapping calls of one kind do not clear each other's flag
    loading_tasks: usize,
    loading_current: usize,
    creating: usize,

    issued_refreshes: u64,
    applied_refresh: u64,
}

impl TaskState {
    fn counter(&mut self, activity: Activity) -> &mut usize {
        match activity {
            Activity::Current => &mut self.loading_current,
            Activity::Creating => &mut self.creating,
        }
    }

    fn loading(&self) -> TaskLoading {
        TaskLoading {
            tasks: self.loading_tasks > 0,
            current: self.loading_current > 0,
            creating: self.creating > 0,
        }
    }

    /// Apply a fetched task to the matching entry, keeping its position.
    ///
    /// Returns the task as the store now holds it.
    fn apply(&mut self, fetched: Task) -> Task {
        let effective = match self.tasks.iter_mut().find(|t| t.id == fetched.id) {
            Some(entry) if entry.status.can_transition_to(fetched.status) => {
                *entry = fetched;
                entry.clone()
            }
            Some(entry) => {
                warn!(
                    "Ignoring status {} for task {}: already {}",
                    fetched.status, entry.id, entry.status
                );
                entry.clone()
            }
            // Not listed (e.g. dropped by a filtered reload); the current task still guards it
            None => match self.current.as_ref() {
                Some(current)
                    if current.id == fetched.id
                        && !current.status.can_transition_to(fetched.status) =>
                {
                    warn!(
                        "Ignoring status {} for task {}: already {}",
                        fetched.status, current.id, current.status
                    );
                    current.clone()
                }
                _ => fetched,
            },
        };

        if let Some(current) = self.current.as_mut() {
            if current.id == effective.id && current.status.can_transition_to(effective.status) {
                *current = effective.clone();
            }
        }

        effective
    }

    fn fail(&mut self, err: &ClientError) {
        self.error = Some(err.to_string());
    }
}

/// Authoritative in-memory collection of crawl tasks.
///
/// Cheap to clone; clones share the same state. All mutation goes through
/// the operations below, and no lock is held across a network call.
#[derive(Clone)]
pub struct TaskStore {
    api: Arc<dyn CrawlApi>,
    state: Arc<RwLock<TaskState>>,
    ordering: RefreshOrdering,
}

impl TaskStore {
    pub fn new(api: Arc<dyn CrawlApi>) -> Self {
        Self {
            api,
            state: Arc::new(RwLock::new(TaskState::default())),
            ordering: RefreshOrdering::default(),
        }
    }

    pub fn with_refresh_ordering(mut self, ordering: RefreshOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    async fn begin(&self, activity: Activity) {
        let mut state = self.state.write().await;
        *state.counter(activity) += 1;
        state.error = None;
    }

    /// Reload the task list with the current filter.
    ///
    /// Replaces the collection on success. Failures only land in the error
    /// slot and leave the previous collection untouched.
    pub async fn load_tasks(&self) {
        let (filter, sequence) = {
            let mut state = self.state.write().await;
            state.loading_tasks += 1;
            state.error = None;
            state.issued_refreshes += 1;
            (state.filter.clone(), state.issued_refreshes)
        };

        let result = self.api.list_tasks(&filter).await;

        let mut state = self.state.write().await;
        state.loading_tasks -= 1;

        match result {
            Ok(page) => {
                if self.ordering == RefreshOrdering::LatestIssued
                    && sequence < state.applied_refresh
                {
                    debug!(
                        "Dropping task list #{} resolved after #{}",
                        sequence, state.applied_refresh
                    );
                    return;
                }
                debug!("Loaded {} tasks", page.items.len());
                state.applied_refresh = state.applied_refresh.max(sequence);
                state.tasks = page.items;
            }
            Err(e) => {
                if self.ordering == RefreshOrdering::LatestIssued
                    && sequence < state.applied_refresh
                {
                    debug!(
                        "Ignoring failure of task list #{} after #{} was applied: {}",
                        sequence, state.applied_refresh, e
                    );
                    return;
                }
                error!("Failed to load task list: {}", e);
                state.fail(&e);
            }
        }
    }

    /// Fetch one task and make it the current task
    pub async fn load_task(&self, task_id: i64) -> Result<Task> {
        self.begin(Activity::Current).await;

        let result = self.api.get_task(task_id).await;

        let mut state = self.state.write().await;
        state.loading_current -= 1;

        match result {
            Ok(task) => {
                let effective = state.apply(task);
                state.current = Some(effective.clone());
                Ok(effective)
            }
            Err(e) => {
                error!("Failed to load task {}: {}", task_id, e);
                state.fail(&e);
                Err(e)
            }
        }
    }

    /// Fetch one task and fold its status into the collection in place.
    ///
    /// Used by the poller; does not touch the current-task selection other
    /// than refreshing it when it points at the same task.
    pub async fn refresh_task(&self, task_id: i64) -> Result<Task> {
        match self.api.get_task(task_id).await {
            Ok(task) => Ok(self.state.write().await.apply(task)),
            Err(e) => {
                self.state.write().await.fail(&e);
                Err(e)
            }
        }
    }

    /// Submit a crawl job, then refresh the task list
    pub async fn create_crawl(
        &self,
        url: &str,
        template_id: Option<i64>,
        config: Option<CrawlConfig>,
    ) -> Result<CreatedTask> {
        self.begin(Activity::Creating).await;

        let result = match check_url(url) {
            Ok(()) => {
                let request = CreateCrawlRequest {
                    url: url.to_string(),
                    template_id,
                    config,
                };
                self.api.create_crawl(&request).await
            }
            Err(e) => Err(e),
        };

        let result = match result {
            Ok(created) => {
                info!("Created crawl task {} for {}", created.task_id, url);
                self.load_tasks().await;
                Ok(created)
            }
            Err(e) => {
                error!("Failed to create crawl task for {}: {}", url, e);
                self.state.write().await.fail(&e);
                Err(e)
            }
        };

        self.state.write().await.creating -= 1;
        result
    }

    /// Submit several URLs in one request, then refresh the task list.
    ///
    /// `max_concurrent` is only forwarded to the service.
    pub async fn batch_crawl(
        &self,
        urls: Vec<String>,
        template_id: Option<i64>,
        config: Option<CrawlConfig>,
        max_concurrent: u32,
    ) -> Result<BatchSummary> {
        self.begin(Activity::Creating).await;

        let result = match check_batch(&urls) {
            Ok(()) => {
                let request = BatchCrawlRequest {
                    urls,
                    template_id,
                    config,
                    max_concurrent,
                };
                self.api.batch_crawl(&request).await
            }
            Err(e) => Err(e),
        };

        let result = match result {
            Ok(summary) => {
                info!(
                    "Batch submitted: {} total, {} completed, {} failed",
                    summary.total, summary.completed, summary.failed
                );
                self.load_tasks().await;
                Ok(summary)
            }
            Err(e) => {
                error!("Batch crawl failed: {}", e);
                self.state.write().await.fail(&e);
                Err(e)
            }
        };

        self.state.write().await.creating -= 1;
        result
    }

    /// Delete a task remotely, then drop it locally if it is still there
    pub async fn delete_task(&self, task_id: i64) -> Result<()> {
        self.state.write().await.error = None;

        if let Err(e) = self.api.delete_task(task_id).await {
            error!("Failed to delete task {}: {}", task_id, e);
            self.state.write().await.fail(&e);
            return Err(e);
        }

        let mut state = self.state.write().await;
        state.tasks.retain(|t| t.id != task_id);
        if state.current.as_ref().map(|t| t.id) == Some(task_id) {
            state.current = None;
        }
        info!("Deleted task {}", task_id);

        Ok(())
    }

    /// Merge `partial` into the filter; the caller decides when to reload
    pub async fn update_filter(&self, partial: TaskFilter) {
        self.state.write().await.filter.merge(partial);
    }

    pub async fn reset_filter(&self) {
        self.state.write().await.filter = TaskFilter::default();
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    /// Poll `task_id` until it settles, folding every update into the store
    pub fn watch_task<F>(&self, task_id: i64, config: PollConfig, on_update: F) -> PollHandle
    where
        F: FnMut(&Task) + Send + 'static,
    {
        TaskPoller::new(Arc::new(self.clone()), config).start(task_id, on_update)
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.state.read().await.tasks.clone()
    }

    pub async fn task(&self, task_id: i64) -> Option<Task> {
        self.state
            .read()
            .await
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
    }

    pub async fn current_task(&self) -> Option<Task> {
        self.state.read().await.current.clone()
    }

    pub async fn filter(&self) -> TaskFilter {
        self.state.read().await.filter.clone()
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn loading(&self) -> TaskLoading {
        self.state.read().await.loading()
    }

    pub async fn stats(&self) -> TaskStats {
        TaskStats::from_tasks(&self.state.read().await.tasks)
    }

    pub async fn total_count(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn running_tasks(&self) -> Vec<Task> {
        self.with_status(TaskStatus::Running).await
    }

    pub async fn completed_tasks(&self) -> Vec<Task> {
        self.with_status(TaskStatus::Completed).await
    }

    pub async fn failed_tasks(&self) -> Vec<Task> {
        self.with_status(TaskStatus::Failed).await
    }

    async fn with_status(&self, status: TaskStatus) -> Vec<Task> {
        self.state
            .read()
            .await
            .tasks
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.read().await;
        TaskSnapshot {
            tasks: state.tasks.clone(),
            current: state.current.clone(),
            filter: state.filter.clone(),
            error: state.error.clone(),
            loading: state.loading(),
            stats: TaskStats::from_tasks(&state.tasks),
        }
    }
}

#[async_trait]
impl TaskSource for TaskStore {
    async fn fetch_task(&self, task_id: i64) -> Result<Task> {
        self.refresh_task(task_id).await
    }
}

fn check_url(url: &str) -> Result<()> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|e| ClientError::InvalidRequest(format!("'{}' is not a valid URL: {}", url, e)))
}

fn check_batch(urls: &[String]) -> Result<()> {
    if urls.is_empty() {
        return Err(ClientError::InvalidRequest(
            "a batch needs at least one URL".to_string(),
        ));
    }
    urls.iter().try_for_each(|url| check_url(url))
}
