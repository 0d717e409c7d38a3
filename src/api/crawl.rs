use async_trait::async_trait;

use crate::api::client::ApiClient;
use crate::error::{ClientError, Result};
use crate::models::{
    BatchCrawlRequest, BatchSummary, CreateCrawlRequest, CreatedTask, Page, Task, TaskFilter,
};

/// Crawl task endpoints consumed by the task store
#[async_trait]
pub trait CrawlApi: Send + Sync {
    /// `POST /crawl`
    async fn create_crawl(&self, request: &CreateCrawlRequest) -> Result<CreatedTask>;

    /// `POST /crawl/batch`
    async fn batch_crawl(&self, request: &BatchCrawlRequest) -> Result<BatchSummary>;

    /// `GET /crawl/tasks`
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Page<Task>>;

    /// `GET /crawl/tasks/{id}`
    async fn get_task(&self, id: i64) -> Result<Task>;

    /// `DELETE /crawl/tasks/{id}`
    async fn delete_task(&self, id: i64) -> Result<()>;
}

#[async_trait]
impl CrawlApi for ApiClient {
    async fn create_crawl(&self, request: &CreateCrawlRequest) -> Result<CreatedTask> {
        self.post("/crawl", request)
            .await?
            .ok_or_else(|| ClientError::MissingData("/crawl".to_string()))
    }

    async fn batch_crawl(&self, request: &BatchCrawlRequest) -> Result<BatchSummary> {
        self.post("/crawl/batch", request)
            .await?
            .ok_or_else(|| ClientError::MissingData("/crawl/batch".to_string()))
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Page<Task>> {
        // A list without data is an empty list
        Ok(self
            .get_with_query("/crawl/tasks", filter)
            .await?
            .unwrap_or_default())
    }

    async fn get_task(&self, id: i64) -> Result<Task> {
        let path = format!("/crawl/tasks/{}", id);
        self.get(&path)
            .await?
            .ok_or(ClientError::MissingData(path))
    }

    async fn delete_task(&self, id: i64) -> Result<()> {
        self.delete(&format!("/crawl/tasks/{}", id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_create_crawl_sends_only_set_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crawl"))
            .and(body_json(json!({"url": "https://example.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200, "message": "success", "data": {"task_id": 42}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client_for(&server)
            .await
            .create_crawl(&CreateCrawlRequest {
                url: "https://example.com".to_string(),
                template_id: None,
                config: None,
            })
            .await
            .unwrap();

        assert_eq!(created.task_id, 42);
        assert!(created.result.is_none());
    }

    #[tokio::test]
    async fn test_list_tasks_passes_filter_as_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crawl/tasks"))
            .and(query_param("status", "running"))
            .and(query_param("search", "news"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "message": "success",
                "data": {
                    "total": 1,
                    "items": [{
                        "id": 5,
                        "url": "https://example.com/news",
                        "status": "running",
                        "created_at": "2024-05-01T10:00:00Z"
                    }]
                }
            })))
            .mount(&server)
            .await;

        let filter = TaskFilter {
            status: Some(TaskStatus::Running),
            search: Some("news".to_string()),
            ..Default::default()
        };
        let page = client_for(&server).await.list_tasks(&filter).await.unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, 5);
    }

    #[tokio::test]
    async fn test_batch_crawl_is_a_single_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crawl/batch"))
            .and(body_json(json!({
                "urls": ["https://a.example", "https://b.example", "https://c.example"],
                "max_concurrent": 2
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "message": "success",
                "data": {"total": 3, "completed": 0, "failed": 0, "task_ids": [1, 2, 3]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summary = client_for(&server)
            .await
            .batch_crawl(&BatchCrawlRequest {
                urls: vec![
                    "https://a.example".to_string(),
                    "https://b.example".to_string(),
                    "https://c.example".to_string(),
                ],
                template_id: None,
                config: None,
                max_concurrent: 2,
            })
            .await
            .unwrap();

        assert_eq!(summary.task_ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_get_task_without_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crawl/tasks/8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200, "message": "success", "data": null
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_task(8).await.unwrap_err();
        assert!(matches!(err, ClientError::MissingData(_)));
    }
}
