use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::backend::{restore_all, Backend, BackendResult};
use crate::error::PersistenceError;
use crate::models::{Category, Priority, Task, TaskRecord};

const RESOURCE: &str = "todos";

/// Request body for create and update calls.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskBody<'a> {
    title: &'a str,
    description: Option<&'a str>,
    priority: Priority,
    category: Category,
    // The resource stores due dates as local date-times; a due date means end of day.
    due_date: Option<String>,
    completed: bool,
}

impl<'a> From<&'a Task> for TaskBody<'a> {
    fn from(task: &'a Task) -> Self {
        Self {
            title: task.title(),
            description: task.description(),
            priority: task.priority(),
            category: task.category(),
            due_date: task
                .due_date()
                .map(|date| format!("{}T23:59:59", date.format("%Y-%m-%d"))),
            completed: task.completed(),
        }
    }
}

/// REST collaborator: `GET/POST {base}/todos`, `PUT/DELETE {base}/todos/{id}`.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                PersistenceError::Transport(format!("failed to build http client: {err}"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/{RESOURCE}", self.base_url)
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/{RESOURCE}/{id}", self.base_url)
    }

    async fn read_ok(resp: reqwest::Response, id: Option<&str>) -> BackendResult<String> {
        let status = resp.status();
        let text = resp.text().await?;
        if status == reqwest::StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(PersistenceError::NotFound(id.to_string()));
            }
        }
        if !status.is_success() {
            log::warn!("todo resource returned http {status}");
            return Err(PersistenceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    fn parse_task(text: &str) -> BackendResult<Task> {
        let record: TaskRecord = serde_json::from_str(text)?;
        let id = record.id.clone();
        Task::restore(record).map_err(|source| PersistenceError::InvalidRecord { id, source })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list(&self) -> BackendResult<Vec<Task>> {
        let resp = self
            .client
            .get(self.collection_url())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let text = Self::read_ok(resp, None).await?;
        let records: Vec<TaskRecord> = serde_json::from_str(&text)?;
        log::debug!("fetched {} tasks", records.len());
        restore_all(records)
    }

    async fn create(&self, task: &Task) -> BackendResult<Task> {
        let resp = self
            .client
            .post(self.collection_url())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&TaskBody::from(task))
            .send()
            .await?;
        let text = Self::read_ok(resp, None).await?;
        Self::parse_task(&text)
    }

    async fn update(&self, task: &Task) -> BackendResult<Task> {
        let resp = self
            .client
            .put(self.item_url(task.id()))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&TaskBody::from(task))
            .send()
            .await?;
        let text = Self::read_ok(resp, Some(task.id())).await?;
        Self::parse_task(&text)
    }

    async fn delete(&self, id: &str) -> BackendResult<()> {
        let resp = self.client.delete(self.item_url(id)).send().await?;
        Self::read_ok(resp, Some(id)).await?;
        Ok(())
    }
}
