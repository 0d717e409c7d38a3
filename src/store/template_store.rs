use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::api::TemplateApi;
use crate::error::{ClientError, Result};
use crate::models::{
    CategoryFilter, NewTemplate, Template, TemplateCategory, TemplateConfigSchema, TemplateQuery,
    TemplateStats, TemplateUpdate, ValidationVerdict,
};

/// Which template operations are currently running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateLoading {
    pub templates: bool,
    pub current: bool,
    pub validating: bool,
    pub saving: bool,
}

#[derive(Debug, Default)]
struct TemplateState {
    templates: Vec<Template>,
    current: Option<Template>,
    category_filter: CategoryFilter,
    error: Option<String>,

    loading_templates: usize,
    loading_current: usize,
    validating: usize,
    saving: usize,
}

impl TemplateState {
    fn loading(&self) -> TemplateLoading {
        TemplateLoading {
            templates: self.loading_templates > 0,
            current: self.loading_current > 0,
            validating: self.validating > 0,
            saving: self.saving > 0,
        }
    }

    /// Replace the entry with the same id, keeping collection order
    fn replace(&mut self, template: &Template) {
        if let Some(entry) = self.templates.iter_mut().find(|t| t.id == template.id) {
            *entry = template.clone();
        }
        if self.current.as_ref().map(|t| t.id) == Some(template.id) {
            self.current = Some(template.clone());
        }
    }

    fn fail(&mut self, err: &ClientError) {
        self.error = Some(err.to_string());
    }
}

/// Authoritative in-memory collection of extraction templates.
///
/// Builtin protection is left entirely to the service: the store forwards
/// every delete and only reflects what the service allowed.
#[derive(Clone)]
pub struct TemplateStore {
    api: Arc<dyn TemplateApi>,
    state: Arc<RwLock<TemplateState>>,
}

impl TemplateStore {
    pub fn new(api: Arc<dyn TemplateApi>) -> Self {
        Self {
            api,
            state: Arc::new(RwLock::new(TemplateState::default())),
        }
    }

    /// Reload all templates, optionally narrowed server-side to one category
    pub async fn load_templates(&self, category: Option<TemplateCategory>) {
        {
            let mut state = self.state.write().await;
            state.loading_templates += 1;
            state.error = None;
        }

        let query = TemplateQuery {
            category,
            is_builtin: None,
        };
        let result = self.api.list_templates(&query).await;

        let mut state = self.state.write().await;
        state.loading_templates -= 1;

        match result {
            Ok(page) => {
                debug!("Loaded {} templates", page.items.len());
                state.templates = page.items;
            }
            Err(e) => {
                error!("Failed to load templates: {}", e);
                state.fail(&e);
            }
        }
    }

    pub async fn load_template(&self, template_id: i64) -> Result<Template> {
        {
            let mut state = self.state.write().await;
            state.loading_current += 1;
            state.error = None;
        }

        let result = self.api.get_template(template_id).await;

        let mut state = self.state.write().await;
        state.loading_current -= 1;

        match result {
            Ok(template) => {
                state.replace(&template);
                state.current = Some(template.clone());
                Ok(template)
            }
            Err(e) => {
                error!("Failed to load template {}: {}", template_id, e);
                state.fail(&e);
                Err(e)
            }
        }
    }

    /// Create a template and append the server's copy to the collection
    pub async fn create_template(&self, template: NewTemplate) -> Result<Template> {
        self.begin_saving().await;

        let result = match check_schema(&template.config_schema) {
            Ok(()) if template.name.trim().is_empty() => Err(ClientError::InvalidRequest(
                "template name must not be empty".to_string(),
            )),
            Ok(()) => self.api.create_template(&template).await,
            Err(e) => Err(e),
        };

        let mut state = self.state.write().await;
        state.saving -= 1;

        match result {
            Ok(created) => {
                info!("Created template {} ({})", created.id, created.name);
                state.templates.push(created.clone());
                Ok(created)
            }
            Err(e) => {
                error!("Failed to create template {}: {}", template.name, e);
                state.fail(&e);
                Err(e)
            }
        }
    }

    /// Update a template; the returned copy replaces the local one in place
    pub async fn update_template(&self, template_id: i64, update: TemplateUpdate) -> Result<Template> {
        self.begin_saving().await;

        let result = match update.config_schema.as_ref().map(check_schema) {
            Some(Err(e)) => Err(e),
            _ => self.api.update_template(template_id, &update).await,
        };

        let mut state = self.state.write().await;
        state.saving -= 1;

        match result {
            Ok(updated) => {
                info!("Updated template {}", updated.id);
                state.replace(&updated);
                Ok(updated)
            }
            Err(e) => {
                error!("Failed to update template {}: {}", template_id, e);
                state.fail(&e);
                Err(e)
            }
        }
    }

    /// Delete a template remotely and drop it locally.
    ///
    /// A builtin template is not checked here; the service's 403 comes back
    /// as the error and the collection stays as it was.
    pub async fn delete_template(&self, template_id: i64) -> Result<()> {
        self.state.write().await.error = None;

        if let Err(e) = self.api.delete_template(template_id).await {
            if e.is_forbidden() {
                warn!("Service refused to delete template {}: {}", template_id, e);
            } else {
                error!("Failed to delete template {}: {}", template_id, e);
            }
            self.state.write().await.fail(&e);
            return Err(e);
        }

        let mut state = self.state.write().await;
        state.templates.retain(|t| t.id != template_id);
        if state.current.as_ref().map(|t| t.id) == Some(template_id) {
            state.current = None;
        }
        info!("Deleted template {}", template_id);

        Ok(())
    }

    /// Ask the service whether `schema` is acceptable. Never fails.
    pub async fn validate_template(&self, schema: &TemplateConfigSchema) -> ValidationVerdict {
        {
            let mut state = self.state.write().await;
            state.validating += 1;
            state.error = None;
        }

        let duplicates = schema.duplicate_field_names();
        let verdict = if !duplicates.is_empty() {
            ValidationVerdict {
                valid: false,
                message: "duplicate field names".to_string(),
                errors: duplicates
                    .iter()
                    .map(|name| format!("field '{}' is defined more than once", name))
                    .collect(),
            }
        } else {
            match self.api.validate_template(schema).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!("Template validation could not be performed: {}", e);
                    let verdict = ValidationVerdict::unreachable(e.to_string());
                    self.state.write().await.error = Some(verdict.message.clone());
                    verdict
                }
            }
        };

        self.state.write().await.validating -= 1;
        verdict
    }

    pub async fn set_category_filter(&self, filter: CategoryFilter) {
        self.state.write().await.category_filter = filter;
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    pub async fn clear_current(&self) {
        self.state.write().await.current = None;
    }

    async fn begin_saving(&self) {
        let mut state = self.state.write().await;
        state.saving += 1;
        state.error = None;
    }

    pub async fn templates(&self) -> Vec<Template> {
        self.state.read().await.templates.clone()
    }

    pub async fn current_template(&self) -> Option<Template> {
        self.state.read().await.current.clone()
    }

    pub async fn category_filter(&self) -> CategoryFilter {
        self.state.read().await.category_filter.clone()
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn loading(&self) -> TemplateLoading {
        self.state.read().await.loading()
    }

    pub async fn builtin_templates(&self) -> Vec<Template> {
        self.partition(true).await
    }

    pub async fn custom_templates(&self) -> Vec<Template> {
        self.partition(false).await
    }

    async fn partition(&self, is_builtin: bool) -> Vec<Template> {
        self.state
            .read()
            .await
            .templates
            .iter()
            .filter(|t| t.is_builtin == is_builtin)
            .cloned()
            .collect()
    }

    /// Templates in the active category, or all of them
    pub async fn filtered_templates(&self) -> Vec<Template> {
        let state = self.state.read().await;
        state
            .templates
            .iter()
            .filter(|t| state.category_filter.matches(&t.category))
            .cloned()
            .collect()
    }

    /// Every template grouped by category, regardless of the active filter
    pub async fn templates_by_category(&self) -> BTreeMap<TemplateCategory, Vec<Template>> {
        let state = self.state.read().await;
        let mut groups: BTreeMap<TemplateCategory, Vec<Template>> = BTreeMap::new();
        for template in &state.templates {
            groups
                .entry(template.category.clone())
                .or_default()
                .push(template.clone());
        }
        groups
    }

    pub async fn stats(&self) -> TemplateStats {
        TemplateStats::from_templates(&self.state.read().await.templates)
    }
}

fn check_schema(schema: &TemplateConfigSchema) -> Result<()> {
    let duplicates = schema.duplicate_field_names();
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(ClientError::InvalidRequest(format!(
            "duplicate field names: {}",
            duplicates.join(", ")
        )))
    }
}
