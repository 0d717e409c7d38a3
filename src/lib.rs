//! Client library for a remote crawl service: typed API adapters, task and
//! template stores, and a status poller.

pub mod api;
pub mod cli;
pub mod error;
pub mod models;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiClient, CrawlApi, TemplateApi};
pub use error::{ClientError, Result};
pub use store::{PollConfig, PollHandle, PollOutcome, TaskPoller, TaskStore, TemplateStore};
