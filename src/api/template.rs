use async_trait::async_trait;
use tracing::debug;

use crate::api::client::ApiClient;
use crate::error::{ClientError, Result};
use crate::models::{
    NewTemplate, Page, Template, TemplateConfigSchema, TemplateQuery, TemplateUpdate,
    ValidateTemplateRequest, ValidationVerdict,
};

/// Template endpoints consumed by the template store
#[async_trait]
pub trait TemplateApi: Send + Sync {
    async fn list_templates(&self, query: &TemplateQuery) -> Result<Page<Template>>;

    async fn get_template(&self, id: i64) -> Result<Template>;

    async fn create_template(&self, template: &NewTemplate) -> Result<Template>;

    async fn update_template(&self, id: i64, update: &TemplateUpdate) -> Result<Template>;

    async fn delete_template(&self, id: i64) -> Result<()>;

    async fn validate_template(&self, schema: &TemplateConfigSchema) -> Result<ValidationVerdict>;
}

#[async_trait]
impl TemplateApi for ApiClient {
    async fn list_templates(&self, query: &TemplateQuery) -> Result<Page<Template>> {
        Ok(self
            .get_with_query("/templates", query)
            .await?
            .unwrap_or_default())
    }

    async fn get_template(&self, id: i64) -> Result<Template> {
        let path = format!("/templates/{}", id);
        self.get(&path).await?.ok_or(ClientError::MissingData(path))
    }

    async fn create_template(&self, template: &NewTemplate) -> Result<Template> {
        self.post("/templates", template)
            .await?
            .ok_or_else(|| ClientError::MissingData("/templates".to_string()))
    }

    async fn update_template(&self, id: i64, update: &TemplateUpdate) -> Result<Template> {
        let path = format!("/templates/{}", id);
        self.put(&path, update)
            .await?
            .ok_or(ClientError::MissingData(path))
    }

    async fn delete_template(&self, id: i64) -> Result<()> {
        self.delete(&format!("/templates/{}", id)).await
    }

    async fn validate_template(&self, schema: &TemplateConfigSchema) -> Result<ValidationVerdict> {
        let request = ValidateTemplateRequest {
            config_schema: schema,
        };
        let verdict: Option<ValidationVerdict> = self.post("/templates/validate", &request).await?;

        debug!("Validation verdict received: {:?}", verdict);

        // An empty answer is treated as a refusal to validate
        Ok(verdict.unwrap_or_else(|| ValidationVerdict {
            valid: false,
            message: "validation failed".to_string(),
            errors: Vec::new(),
        }))
    }
}

/// Templates provisioned by the service
pub async fn builtin_templates(api: &dyn TemplateApi) -> Result<Vec<Template>> {
    let query = TemplateQuery {
        is_builtin: Some(true),
        ..Default::default()
    };
    Ok(api.list_templates(&query).await?.items)
}

/// Templates created by users
pub async fn custom_templates(api: &dyn TemplateApi) -> Result<Vec<Template>> {
    let query = TemplateQuery {
        is_builtin: Some(false),
        ..Default::default()
    };
    Ok(api.list_templates(&query).await?.items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractField, FieldType, TemplateCategory};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn template_json(id: i64, is_builtin: bool) -> serde_json::Value {
        json!({
            "id": id,
            "name": format!("template_{}", id),
            "description": null,
            "category": "news",
            "config_schema": {"fields": []},
            "is_builtin": is_builtin,
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_builtin_templates_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/templates"))
            .and(query_param("is_builtin", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "message": "success",
                "data": {"total": 1, "items": [template_json(1, true)]}
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let templates = builtin_templates(&client).await.unwrap();

        assert_eq!(templates.len(), 1);
        assert!(templates[0].is_builtin);
        assert_eq!(templates[0].category, TemplateCategory::News);
    }

    #[tokio::test]
    async fn test_validate_wraps_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/templates/validate"))
            .and(body_json(json!({
                "config_schema": {
                    "fields": [{
                        "name": "title",
                        "selector": "h1",
                        "type": "text",
                        "required": false,
                        "multiple": false
                    }]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "valid": true, "message": "ok", "errors": null
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let schema =
            TemplateConfigSchema::with_fields(vec![ExtractField::new("title", "h1", FieldType::Text)]);
        let verdict = client.validate_template(&schema).await.unwrap();

        assert!(verdict.valid);
        assert!(verdict.errors.is_empty());
    }

    #[tokio::test]
    async fn test_delete_builtin_is_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/templates/1"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({"detail": "Builtin templates cannot be deleted"})),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.delete_template(1).await.unwrap_err();

        assert!(err.is_forbidden());
    }
}
