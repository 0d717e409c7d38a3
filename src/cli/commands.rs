use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::{self, ApiClient};
use crate::cli::config::ClientConfig;
use crate::models::{
    CategoryFilter, CrawlConfig, NewTemplate, Task, TaskFilter, TaskStatus, Template,
    TemplateConfigSchema, TemplateStats, TemplateUpdate,
};
use crate::store::{PollConfig, PollOutcome, TaskStore, TemplateStore};

/// The stores behind every command, wired to one API client
pub struct Console {
    config: ClientConfig,
    client: ApiClient,
    tasks: TaskStore,
    templates: TemplateStore,
}

impl Console {
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let client = ApiClient::from_settings(&config.api).context("Failed to create API client")?;
        info!("Using crawl service at {}", client.base_url());

        let api = Arc::new(client.clone());
        Ok(Self {
            tasks: TaskStore::new(api.clone()),
            templates: TemplateStore::new(api),
            client,
            config,
        })
    }

    /// Submit a crawl job, optionally following it to the end
    pub async fn crawl(
        &self,
        url: String,
        template_id: Option<i64>,
        config_json: Option<String>,
        watch: bool,
    ) -> Result<()> {
        let config = config_json
            .map(|raw| serde_json::from_str::<CrawlConfig>(&raw))
            .transpose()
            .context("Crawl configuration is not a valid JSON object")?;

        let created = self.tasks.create_crawl(&url, template_id, config).await?;
        println!("Task ID: {}", created.task_id);

        if watch {
            self.watch(created.task_id, None).await
        } else {
            println!("Use `crawl-console watch {}` to follow its progress", created.task_id);
            Ok(())
        }
    }

    pub async fn batch(&self, urls: Vec<String>, template_id: Option<i64>, max_concurrent: Option<u32>) -> Result<()> {
        let max_concurrent = max_concurrent.unwrap_or(self.config.batch.max_concurrent);
        let summary = self
            .tasks
            .batch_crawl(urls, template_id, None, max_concurrent)
            .await?;

        println!("Total: {}", summary.total);
        println!("Completed: {}", summary.completed);
        println!("Failed: {}", summary.failed);
        if !summary.task_ids.is_empty() {
            let ids: Vec<String> = summary.task_ids.iter().map(|id| id.to_string()).collect();
            println!("Task IDs: {}", ids.join(", "));
        }

        Ok(())
    }

    pub async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        template_id: Option<i64>,
        search: Option<String>,
    ) -> Result<()> {
        self.tasks
            .update_filter(TaskFilter {
                status,
                template_id,
                search,
                ..Default::default()
            })
            .await;
        self.tasks.load_tasks().await;

        if let Some(error) = self.tasks.error().await {
            anyhow::bail!("Failed to load tasks: {}", error);
        }

        let tasks = self.tasks.tasks().await;
        if tasks.is_empty() {
            println!("No tasks found");
            return Ok(());
        }

        for task in &tasks {
            println!("{}", task_line(task));
        }

        let stats = self.tasks.stats().await;
        println!(
            "\n{} tasks: {} running, {} completed, {} failed",
            stats.total, stats.running, stats.completed, stats.failed
        );

        Ok(())
    }

    pub async fn show_task(&self, task_id: i64) -> Result<()> {
        let task = self.tasks.load_task(task_id).await.map_err(user_error)?;
        print_task(&task);
        Ok(())
    }

    /// Poll a task until it settles, printing each status change
    pub async fn watch(&self, task_id: i64, interval_ms: Option<u64>) -> Result<()> {
        let interval = interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.polling.interval());

        // Makes the task current so every polled update lands in the store
        let task = self.tasks.load_task(task_id).await.map_err(user_error)?;
        if task.status.is_terminal() {
            print_task(&task);
            return Ok(());
        }
        println!("Task {}: {}", task.id, task.status);

        let mut last_status = Some(task.status);
        let handle = self
            .tasks
            .watch_task(task_id, PollConfig::with_interval(interval), move |task: &Task| {
                if last_status != Some(task.status) {
                    println!("Task {}: {}", task.id, task.status);
                    last_status = Some(task.status);
                }
            });

        match handle.join().await {
            PollOutcome::Terminal(status) => {
                info!("Task {} finished with status {}", task_id, status);
                if let Some(task) = self.tasks.current_task().await {
                    print_task(&task);
                }
                Ok(())
            }
            PollOutcome::Failed(message) => anyhow::bail!("Stopped watching task {}: {}", task_id, message),
            PollOutcome::Cancelled => {
                warn!("Watching task {} was cancelled", task_id);
                Ok(())
            }
        }
    }

    pub async fn delete_task(&self, task_id: i64) -> Result<()> {
        self.tasks.delete_task(task_id).await.map_err(user_error)?;
        println!("Deleted task {}", task_id);
        Ok(())
    }

    /// `origin` narrows the listing to builtin (`Some(true)`) or custom templates
    pub async fn list_templates(&self, category: CategoryFilter, origin: Option<bool>) -> Result<()> {
        let templates = match origin {
            // Builtin and custom listings are narrowed by the service itself
            Some(is_builtin) => {
                let listed = if is_builtin {
                    api::builtin_templates(&self.client).await
                } else {
                    api::custom_templates(&self.client).await
                };
                listed
                    .map_err(user_error)?
                    .into_iter()
                    .filter(|t| category.matches(&t.category))
                    .collect()
            }
            None => {
                self.templates.set_category_filter(category.clone()).await;
                self.templates.load_templates(category.category().cloned()).await;

                if let Some(error) = self.templates.error().await {
                    anyhow::bail!("Failed to load templates: {}", error);
                }
                self.templates.filtered_templates().await
            }
        };

        if templates.is_empty() {
            println!("No templates found");
            return Ok(());
        }

        for template in &templates {
            println!("{}", template_line(template));
        }
        println!("\n{}", stats_line(&templates));

        Ok(())
    }

    pub async fn show_template(&self, template_id: i64) -> Result<()> {
        let template = self
            .templates
            .load_template(template_id)
            .await
            .map_err(user_error)?;

        println!("{}", template_line(&template));
        if let Some(description) = &template.description {
            println!("Description: {}", description);
        }
        println!("Updated: {}", template.updated_at);
        println!("Fields:");
        for field in &template.config_schema.fields {
            println!("  - {} ({:?}) <- {}", field.name, field.field_type, field.selector);
        }

        Ok(())
    }

    pub async fn create_template(&self, file: &Path) -> Result<()> {
        let template: NewTemplate = read_document(file)?;
        let created = self.templates.create_template(template).await?;
        println!("Created template {} ({})", created.id, created.name);
        Ok(())
    }

    pub async fn update_template(&self, template_id: i64, file: &Path) -> Result<()> {
        let update: TemplateUpdate = read_document(file)?;
        let updated = self
            .templates
            .update_template(template_id, update)
            .await
            .map_err(user_error)?;
        println!("Updated template {} ({})", updated.id, updated.name);
        Ok(())
    }

    pub async fn delete_template(&self, template_id: i64) -> Result<()> {
        self.templates
            .delete_template(template_id)
            .await
            .map_err(user_error)?;
        println!("Deleted template {}", template_id);
        Ok(())
    }

    pub async fn validate(&self, file: &Path) -> Result<()> {
        let schema: TemplateConfigSchema = read_document(file)?;
        let verdict = self.templates.validate_template(&schema).await;

        if verdict.valid {
            println!("Valid");
            return Ok(());
        }

        println!("Invalid: {}", verdict.message);
        for error in &verdict.errors {
            println!("  - {}", error);
        }
        anyhow::bail!("Template schema in {} is invalid", file.display())
    }

    pub async fn stats(&self) -> Result<()> {
        let stats = self.client.system_stats().await.map_err(user_error)?;
        println!("Tasks: {}", stats.total_tasks);
        println!("  Running: {}", stats.running_tasks);
        println!("  Completed: {}", stats.completed_tasks);
        println!("  Failed: {}", stats.failed_tasks);
        println!("Templates: {}", stats.total_templates);
        println!("  Custom: {}", stats.custom_templates);
        Ok(())
    }

    pub async fn health(&self) -> Result<()> {
        let health = self.client.health().await?;
        println!("Status: {}", health.status);
        println!("Version: {}", health.version);
        println!("Database Connected: {}", health.database_connected);
        Ok(())
    }
}

fn user_error(err: crate::error::ClientError) -> anyhow::Error {
    anyhow::anyhow!("{} ({})", err.user_message(), err)
}

/// Read a YAML document; JSON files parse as well
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).context(format!("Failed to read file: {}", path.display()))?;
    serde_yaml::from_str(&contents).context(format!("Failed to parse file: {}", path.display()))
}

fn task_line(task: &Task) -> String {
    let template = task
        .template_id
        .map(|id| format!(" [template {}]", id))
        .unwrap_or_default();
    format!(
        "{:>6}  {:<9}  {}  {}{}",
        task.id,
        task.status,
        task.created_at.format("%Y-%m-%d %H:%M"),
        task.url,
        template
    )
}

fn template_line(template: &Template) -> String {
    let origin = if template.is_builtin { "builtin" } else { "custom" };
    format!(
        "{:>6}  {:<9}  {:<7}  {}",
        template.id, template.category, origin, template.name
    )
}

/// Summary of exactly the templates that were listed
fn stats_line(templates: &[Template]) -> String {
    let stats = TemplateStats::from_templates(templates);
    format!("{} templates: {} builtin, {} custom", stats.total, stats.builtin, stats.custom)
}

fn print_task(task: &Task) {
    println!("Task ID: {}", task.id);
    println!("URL: {}", task.url);
    println!("Status: {}", task.status);
    println!("Created: {}", task.created_at);
    if let Some(completed_at) = task.completed_at {
        println!("Completed: {}", completed_at);
    }
    if let Some(error) = &task.error_message {
        println!("Error: {}", error);
    }
    if let Some(result) = &task.result {
        if let Some(title) = result.metadata.as_ref().and_then(|m| m.title.as_ref()) {
            println!("Title: {}", title);
        }
        if let Some(links) = &result.links {
            println!("Links: {} internal, {} external", links.internal.len(), links.external.len());
        }
        if let Some(content) = &result.extracted_content {
            println!("Extracted: {}", content);
        }
    }
}
