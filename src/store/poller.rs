use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::api::CrawlApi;
use crate::error::Result;
use crate::models::{Task, TaskStatus};

/// Default delay between two status fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Something that can fetch the current state of one task
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch_task(&self, task_id: i64) -> Result<Task>;
}

#[async_trait]
impl TaskSource for ApiClient {
    async fn fetch_task(&self, task_id: i64) -> Result<Task> {
        self.get_task(task_id).await
    }
}

/// Decides when a task no longer needs watching
pub type TerminalPredicate = Arc<dyn Fn(&Task) -> bool + Send + Sync>;

/// Polling schedule and stop condition
#[derive(Clone)]
pub struct PollConfig {
    /// Wait before each fetch
    pub interval: Duration,

    /// Polling stops after the first fetch for which this holds
    pub is_terminal: TerminalPredicate,
}

impl PollConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Replace the stop condition
    pub fn until<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Task) -> bool + Send + Sync + 'static,
    {
        self.is_terminal = Arc::new(predicate);
        self
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            is_terminal: Arc::new(|task: &Task| task.status.is_terminal()),
        }
    }
}

impl fmt::Debug for PollConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollConfig")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Why a poller stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The stop condition held for a fetched task
    Terminal(TaskStatus),

    /// A fetch failed; failures are not retried
    Failed(String),

    /// Stopped through [`PollHandle::cancel`]
    Cancelled,
}

/// Cloneable way to stop a poller from anywhere
#[derive(Debug, Clone)]
pub struct PollCanceller(CancellationToken);

impl PollCanceller {
    /// Safe to call any number of times, also after the poller stopped itself
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

/// Handle to a running poller
#[derive(Debug)]
pub struct PollHandle {
    cancel: CancellationToken,
    join: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn canceller(&self) -> PollCanceller {
        PollCanceller(self.cancel.clone())
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the poller to stop
    pub async fn join(self) -> PollOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => PollOutcome::Failed(format!("poller task aborted: {}", e)),
        }
    }
}

/// Turns one-shot status fetches into a repeating observation of a task
pub struct TaskPoller {
    source: Arc<dyn TaskSource>,
    config: PollConfig,
}

impl TaskPoller {
    pub fn new(source: Arc<dyn TaskSource>, config: PollConfig) -> Self {
        Self { source, config }
    }

    /// Start watching `task_id`, calling `on_update` with every fetched task.
    ///
    /// Must be called from within a tokio runtime. Only one fetch is in flight
    /// at a time; the next wait starts after `on_update` returns.
    pub fn start<F>(&self, task_id: i64, on_update: F) -> PollHandle
    where
        F: FnMut(&Task) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(run(
            self.source.clone(),
            self.config.clone(),
            task_id,
            on_update,
            cancel.clone(),
        ));

        debug!("Started polling task {} every {:?}", task_id, self.config.interval);

        PollHandle { cancel, join }
    }
}

async fn run<F>(
    source: Arc<dyn TaskSource>,
    config: PollConfig,
    task_id: i64,
    mut on_update: F,
    cancel: CancellationToken,
) -> PollOutcome
where
    F: FnMut(&Task) + Send + 'static,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Polling of task {} cancelled", task_id);
                return PollOutcome::Cancelled;
            }
            _ = tokio::time::sleep(config.interval) => {}
        }

        let fetched = source.fetch_task(task_id).await;

        // A fetch that resolves after cancellation is stale
        if cancel.is_cancelled() {
            debug!("Discarding status of task {} received after cancellation", task_id);
            return PollOutcome::Cancelled;
        }

        match fetched {
            Ok(task) => {
                on_update(&task);

                if (config.is_terminal)(&task) {
                    info!("Task {} reached {}, polling stopped", task_id, task.status);
                    return PollOutcome::Terminal(task.status);
                }
            }
            Err(e) => {
                warn!("Polling task {} failed, stopping: {}", task_id, e);
                return PollOutcome::Failed(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::test_support::task;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::{mpsc, Notify};

    /// Serves a scripted sequence of fetch results
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Task>>>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Task>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fetches: AtomicUsize::new(0),
            })
        }

        fn statuses(statuses: &[TaskStatus]) -> Arc<Self> {
            Self::new(statuses.iter().map(|s| Ok(task(1, *s))).collect())
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskSource for ScriptedSource {
        async fn fetch_task(&self, task_id: i64) -> Result<Task> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(task(task_id, TaskStatus::Running)))
        }
    }

    /// Blocks every fetch until released
    struct GatedSource {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TaskSource for GatedSource {
        async fn fetch_task(&self, task_id: i64) -> Result<Task> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(task(task_id, TaskStatus::Completed))
        }
    }

    fn collecting() -> (Arc<Mutex<Vec<TaskStatus>>>, impl FnMut(&Task) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |task: &Task| sink.lock().unwrap().push(task.status))
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_terminal_status() {
        use TaskStatus::*;
        let source = ScriptedSource::statuses(&[Pending, Running, Completed, Running]);
        let poller = TaskPoller::new(source.clone(), PollConfig::default());
        let (seen, on_update) = collecting();

        let outcome = poller.start(1, on_update).join().await;

        assert_eq!(outcome, PollOutcome::Terminal(Completed));
        assert_eq!(*seen.lock().unwrap(), vec![Pending, Running, Completed]);

        // Nothing else is fetched once stopped
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.fetches(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_waits_one_interval() {
        let source = ScriptedSource::statuses(&[TaskStatus::Completed]);
        let poller = TaskPoller::new(source.clone(), PollConfig::with_interval(Duration::from_secs(5)));
        let (_seen, on_update) = collecting();

        let handle = poller.start(1, on_update);

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(source.fetches(), 0);

        assert_eq!(handle.join().await, PollOutcome::Terminal(TaskStatus::Completed));
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_first_update_stops_fetching() {
        let source = ScriptedSource::statuses(&[TaskStatus::Pending, TaskStatus::Running]);
        let poller = TaskPoller::new(source.clone(), PollConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = poller.start(1, move |task: &Task| {
            let _ = tx.send(task.status);
        });

        assert_eq!(rx.recv().await, Some(TaskStatus::Pending));
        handle.cancel();

        assert_eq!(handle.join().await, PollOutcome::Cancelled);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.fetches(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_stops_without_retry() {
        let source = ScriptedSource::new(vec![
            Ok(task(1, TaskStatus::Pending)),
            Err(ClientError::Remote {
                status: 404,
                message: "Task not found".to_string(),
            }),
        ]);
        let poller = TaskPoller::new(source.clone(), PollConfig::default());
        let (seen, on_update) = collecting();

        let outcome = poller.start(1, on_update).join().await;

        assert!(matches!(outcome, PollOutcome::Failed(ref m) if m.contains("Task not found")));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_is_discarded_after_cancel() {
        let source = Arc::new(GatedSource {
            started: Notify::new(),
            release: Notify::new(),
        });
        let poller = TaskPoller::new(source.clone(), PollConfig::default());
        let (seen, on_update) = collecting();

        let handle = poller.start(1, on_update);
        source.started.notified().await;

        handle.cancel();
        source.release.notify_one();

        assert_eq!(handle.join().await, PollOutcome::Cancelled);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_self_stop_is_noop() {
        let source = ScriptedSource::statuses(&[TaskStatus::Failed]);
        let poller = TaskPoller::new(source, PollConfig::default());
        let (_seen, on_update) = collecting();

        let handle = poller.start(1, on_update);
        let canceller = handle.canceller();

        assert_eq!(handle.join().await, PollOutcome::Terminal(TaskStatus::Failed));
        canceller.cancel();
        canceller.cancel();
    }

    #[tokio::test]
    async fn test_polls_http_client_until_completed() {
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crawl/tasks/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200, "message": "success",
                "data": {"id": 1, "url": "https://example.com", "status": "pending", "created_at": "2024-05-01T10:00:00Z"}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/crawl/tasks/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200, "message": "success",
                "data": {
                    "id": 1, "url": "https://example.com", "status": "completed",
                    "created_at": "2024-05-01T10:00:00Z", "completed_at": "2024-05-01T10:00:05Z",
                    "result": {"markdown": "# Example"}
                }
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let poller = TaskPoller::new(Arc::new(client), PollConfig::with_interval(Duration::from_millis(10)));
        let (seen, on_update) = collecting();

        let outcome = poller.start(1, on_update).join().await;

        assert_eq!(outcome, PollOutcome::Terminal(TaskStatus::Completed));
        assert_eq!(*seen.lock().unwrap(), vec![TaskStatus::Pending, TaskStatus::Completed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_stop_condition() {
        use TaskStatus::*;
        let source = ScriptedSource::statuses(&[Pending, Running, Completed]);
        let config = PollConfig::default().until(|task| task.status == Running);
        let poller = TaskPoller::new(source.clone(), config);
        let (seen, on_update) = collecting();

        assert_eq!(poller.start(1, on_update).join().await, PollOutcome::Terminal(Running));
        assert_eq!(*seen.lock().unwrap(), vec![Pending, Running]);
    }
}
