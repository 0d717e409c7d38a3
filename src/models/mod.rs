pub mod page;
pub mod task;
pub mod template;
pub mod timestamp;

// Re-export common types
pub use page::Page;
pub use task::{
    BatchCrawlRequest, BatchSummary, CrawlConfig, CrawlResult, CreateCrawlRequest, CreatedTask,
    PageMetadata, ResultLinks, ResultMedia, Task, TaskFilter, TaskStats, TaskStatus,
};
pub use template::{
    AdvancedOptions, CategoryFilter, ExtractField, FieldType, NewTemplate, Template,
    TemplateCategory, TemplateConfigSchema, TemplateQuery, TemplateStats, TemplateUpdate,
    TraversalStrategy, ValidateTemplateRequest, ValidationVerdict,
};
