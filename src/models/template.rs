use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

use crate::models::timestamp;

/// Category a template belongs to.
///
/// The service accepts any category name; names outside the known set are
/// kept verbatim in [`TemplateCategory::Other`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TemplateCategory {
    News,
    Docs,
    Ecommerce,
    Academic,
    Table,
    Custom,
    Other(String),
}

impl TemplateCategory {
    /// The categories the service ships templates for
    pub const KNOWN: [TemplateCategory; 6] = [
        TemplateCategory::News,
        TemplateCategory::Docs,
        TemplateCategory::Ecommerce,
        TemplateCategory::Academic,
        TemplateCategory::Table,
        TemplateCategory::Custom,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            TemplateCategory::News => "news",
            TemplateCategory::Docs => "docs",
            TemplateCategory::Ecommerce => "ecommerce",
            TemplateCategory::Academic => "academic",
            TemplateCategory::Table => "table",
            TemplateCategory::Custom => "custom",
            TemplateCategory::Other(name) => name,
        }
    }
}

impl From<&str> for TemplateCategory {
    fn from(name: &str) -> Self {
        TemplateCategory::KNOWN
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| TemplateCategory::Other(name.to_string()))
    }
}

impl fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for TemplateCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err("template category must not be empty".to_string());
        }
        Ok(TemplateCategory::from(name))
    }
}

impl Serialize for TemplateCategory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TemplateCategory {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(TemplateCategory::from(name.as_str()))
    }
}

/// Scope of the template store's filtered view
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(TemplateCategory),
}

impl CategoryFilter {
    pub fn matches(&self, category: &TemplateCategory) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => wanted == category,
        }
    }

    /// Category to ask the service for, if narrowed
    pub fn category(&self) -> Option<&TemplateCategory> {
        match self {
            CategoryFilter::All => None,
            CategoryFilter::Only(category) => Some(category),
        }
    }
}

impl std::str::FromStr for CategoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(CategoryFilter::All)
        } else {
            s.parse().map(CategoryFilter::Only)
        }
    }
}

/// A reusable extraction template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,

    /// Unique, non-empty name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub category: TemplateCategory,

    pub config_schema: TemplateConfigSchema,

    /// Provisioned and protected by the service; never changes after creation
    #[serde(default)]
    pub is_builtin: bool,

    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,

    #[serde(deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
}

/// Kind of value an extraction field produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Link,
    Image,
    Attribute,
}

/// One named value to extract from a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractField {
    pub name: String,

    /// CSS selector locating the value
    pub selector: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Attribute to read when `field_type` is `attribute`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    #[serde(default)]
    pub required: bool,

    /// Extract every match instead of the first
    #[serde(default)]
    pub multiple: bool,
}

impl ExtractField {
    pub fn new(name: impl Into<String>, selector: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            field_type,
            attribute: None,
            required: false,
            multiple: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalStrategy {
    Bfs,
    Dfs,
}

/// Crawl options stored alongside a template's fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancedOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_crawl: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<TraversalStrategy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Delay between requests, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_to_load: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_scrolls: Option<u32>,
}

/// Extraction fields plus advanced crawl options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfigSchema {
    #[serde(default)]
    pub fields: Vec<ExtractField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced: Option<AdvancedOptions>,

    /// Any other keys (e.g. a draft `name`) are sent back unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TemplateConfigSchema {
    pub fn with_fields(fields: Vec<ExtractField>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    /// Field names that appear more than once, in order of first repetition
    pub fn duplicate_field_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) && !duplicates.contains(&field.name) {
                duplicates.push(field.name.clone());
            }
        }
        duplicates
    }
}

/// Body of `POST /templates`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: TemplateCategory,
    pub config_schema: TemplateConfigSchema,
}

/// Body of `PUT /templates/{id}`; only the fields that are set are sent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<TemplateCategory>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<TemplateConfigSchema>,
}

/// Query of `GET /templates`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<TemplateCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_builtin: Option<bool>,
}

/// Body of `POST /templates/validate`
#[derive(Debug, Clone, Serialize)]
pub struct ValidateTemplateRequest<'a> {
    pub config_schema: &'a TemplateConfigSchema,
}

/// Outcome of a schema validation; "invalid" is a normal answer, not a fault
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<String>,
}

// The service sends `"errors": null` when there is nothing to report
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ValidationVerdict {
    /// Verdict reported when the service could not be asked at all
    pub fn unreachable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            valid: false,
            message: reason.clone(),
            errors: vec![reason],
        }
    }
}

/// Template counts derived from a template collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TemplateStats {
    pub total: usize,
    pub builtin: usize,
    pub custom: usize,
}

impl TemplateStats {
    pub fn from_templates(templates: &[Template]) -> Self {
        let builtin = templates.iter().filter(|t| t.is_builtin).count();
        Self {
            total: templates.len(),
            builtin,
            custom: templates.len() - builtin,
        }
    }
}
