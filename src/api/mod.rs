pub mod client;
pub mod crawl;
pub mod monitor;
pub mod template;

// Re-export common types
pub use client::{ApiClient, ApiSettings, BASE_URL_ENV};
pub use crawl::CrawlApi;
pub use monitor::{HealthStatus, SystemStats};
pub use template::{builtin_templates, custom_templates, TemplateApi};
