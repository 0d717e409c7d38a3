//! Builders shared by the unit tests.

use chrono::{TimeZone, Utc};

use crate::models::{
    CrawlResult, Page, Task, TaskStatus, Template, TemplateCategory, TemplateConfigSchema,
};

/// A task in `status` that satisfies the status-dependent invariants
pub fn task(id: i64, status: TaskStatus) -> Task {
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    Task {
        id,
        url: format!("https://example.com/{}", id),
        template_id: None,
        status,
        config: None,
        result: (status == TaskStatus::Completed).then(CrawlResult::default),
        error_message: (status == TaskStatus::Failed).then(|| "crawl failed".to_string()),
        created_at,
        completed_at: status.is_terminal().then_some(created_at),
    }
}

pub fn template(id: i64, category: TemplateCategory, is_builtin: bool) -> Template {
    let stamp = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    Template {
        id,
        name: format!("template_{}", id),
        description: None,
        category,
        config_schema: TemplateConfigSchema::default(),
        is_builtin,
        created_at: stamp,
        updated_at: stamp,
    }
}

pub fn page<T>(items: Vec<T>) -> Page<T> {
    Page {
        total: items.len() as u64,
        items,
    }
}
