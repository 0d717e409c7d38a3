pub mod poller;
pub mod task_store;
pub mod template_store;

// Re-export common types
pub use poller::{
    PollCanceller, PollConfig, PollHandle, PollOutcome, TaskPoller, TaskSource,
    DEFAULT_POLL_INTERVAL,
};
pub use task_store::{
    RefreshOrdering, TaskLoading, TaskSnapshot, TaskStore, DEFAULT_MAX_CONCURRENT,
};
pub use template_store::{TemplateLoading, TemplateStore};
