//! OpenAI REST implementation of [`Provider`].
//!
//! Every call is a single request with no retry. Non-2xx responses become
//! [`Error::Provider`] carrying the HTTP status and the API's own error
//! message when the body has one. Assistants, threads, messages and runs
//! are sent with the `OpenAI-Beta: assistants=v2` header.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{multipart, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::Provider;
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::models::{
    Assistant, AssistantSpec, FileBatch, FileCounts, RemoteFile, Role, Run, RunStatus, Thread,
    ThreadMessage, VectorStore, VectorStoreFile,
};

const PAGE_LIMIT: usize = 100;

pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAIProvider {
    /// Create a provider from settings, reading `OPENAI_API_KEY`.
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &ProviderConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();

    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| Error::provider(format!("invalid response body: {}", e)));
    }

    let body_text = response.text().await.unwrap_or_default();
    Err(Error::Provider {
        status: Some(status.as_u16()),
        message: api_error_message(&body_text),
    })
}

async fn send_delete(request: RequestBuilder, what: &str) -> Result<()> {
    let deleted: DeletedObject = send(request).await?;
    if deleted.deleted {
        Ok(())
    } else {
        Err(Error::provider(format!("{} was not deleted", what)))
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<RemoteFile> {
        let form = multipart::Form::new().text("purpose", "assistants").part(
            "file",
            multipart::Part::bytes(bytes).file_name(filename.to_string()),
        );
        let file: FileObject = send(self.request(Method::POST, "/files").multipart(form)).await?;
        Ok(file.into())
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<RemoteFile> {
        let file: FileObject =
            send(self.request(Method::GET, &format!("/files/{}", file_id))).await?;
        Ok(file.into())
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        send_delete(
            self.request(Method::DELETE, &format!("/files/{}", file_id)),
            file_id,
        )
        .await
    }

    async fn create_vector_store(&self, name: &str, file_ids: &[String]) -> Result<VectorStore> {
        let body = json!({ "name": name, "file_ids": file_ids });
        let store: VectorStoreObject =
            send(self.request(Method::POST, "/vector_stores").json(&body)).await?;
        Ok(VectorStore {
            id: store.id,
            name: store.name.unwrap_or_else(|| name.to_string()),
        })
    }

    async fn list_vector_store_files(
        &self,
        vector_store_id: &str,
    ) -> Result<Vec<VectorStoreFile>> {
        let path = format!("/vector_stores/{}/files", vector_store_id);
        let mut files = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut query = vec![("limit", PAGE_LIMIT.to_string())];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }
            let page: ListPage<VectorStoreFileObject> =
                send(self.request(Method::GET, &path).query(&query)).await?;

            let last_id = page.last_id.or_else(|| page.data.last().map(|f| f.id.clone()));
            files.extend(page.data.into_iter().map(|f| VectorStoreFile {
                id: f.id,
                status: f.status,
            }));

            match (page.has_more, last_id) {
                (true, Some(cursor)) => after = Some(cursor),
                _ => break,
            }
        }

        Ok(files)
    }

    async fn create_file_batch(
        &self,
        vector_store_id: &str,
        file_ids: &[String],
    ) -> Result<FileBatch> {
        let body = json!({ "file_ids": file_ids });
        let batch: FileBatchObject = send(
            self.request(
                Method::POST,
                &format!("/vector_stores/{}/file_batches", vector_store_id),
            )
            .json(&body),
        )
        .await?;
        Ok(batch.into())
    }

    async fn retrieve_file_batch(
        &self,
        vector_store_id: &str,
        batch_id: &str,
    ) -> Result<FileBatch> {
        let batch: FileBatchObject = send(self.request(
            Method::GET,
            &format!("/vector_stores/{}/file_batches/{}", vector_store_id, batch_id),
        ))
        .await?;
        Ok(batch.into())
    }

    async fn delete_vector_store_file(&self, vector_store_id: &str, file_id: &str) -> Result<()> {
        send_delete(
            self.request(
                Method::DELETE,
                &format!("/vector_stores/{}/files/{}", vector_store_id, file_id),
            ),
            file_id,
        )
        .await
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<Assistant> {
        let body = json!({
            "name": spec.name,
            "instructions": spec.instructions,
            "model": spec.model,
            "tools": [{ "type": "file_search" }],
            "tool_resources": {
                "file_search": { "vector_store_ids": [spec.vector_store_id] }
            },
        });
        let assistant: AssistantObject =
            send(self.request(Method::POST, "/assistants").json(&body)).await?;
        Ok(assistant.into())
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<Assistant> {
        let assistant: AssistantObject =
            send(self.request(Method::GET, &format!("/assistants/{}", assistant_id))).await?;
        Ok(assistant.into())
    }

    async fn create_thread(&self, vector_store_id: &str) -> Result<Thread> {
        let body = json!({
            "tool_resources": {
                "file_search": { "vector_store_ids": [vector_store_id] }
            },
        });
        let thread: ThreadObject =
            send(self.request(Method::POST, "/threads").json(&body)).await?;
        Ok(Thread { id: thread.id })
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage> {
        let body = json!({ "role": "user", "content": content });
        let message: MessageObject = send(
            self.request(Method::POST, &format!("/threads/{}/messages", thread_id))
                .json(&body),
        )
        .await?;
        Ok(message.into())
    }

    async fn list_messages(&self, thread_id: &str, limit: usize) -> Result<Vec<ThreadMessage>> {
        let query = [("limit", limit.to_string()), ("order", "desc".to_string())];
        let page: ListPage<MessageObject> = send(
            self.request(Method::GET, &format!("/threads/{}/messages", thread_id))
                .query(&query),
        )
        .await?;
        Ok(page.data.into_iter().map(ThreadMessage::from).collect())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let body = json!({ "assistant_id": assistant_id });
        let run: RunObject = send(
            self.request(Method::POST, &format!("/threads/{}/runs", thread_id))
                .json(&body),
        )
        .await?;
        Ok(run.into())
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let run: RunObject = send(self.request(
            Method::GET,
            &format!("/threads/{}/runs/{}", thread_id, run_id),
        ))
        .await?;
        Ok(run.into())
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let run: RunObject = send(self.request(
            Method::POST,
            &format!("/threads/{}/runs/{}/cancel", thread_id, run_id),
        ))
        .await?;
        Ok(run.into())
    }
}

// ============ Wire types ============

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Deserialize)]
struct DeletedObject {
    #[serde(default)]
    deleted: bool,
}

#[derive(Deserialize)]
struct ListPage<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    created_at: Option<i64>,
}

impl From<FileObject> for RemoteFile {
    fn from(file: FileObject) -> Self {
        RemoteFile {
            id: file.id,
            filename: file.filename,
            bytes: file.bytes,
            created_at: file.created_at.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        }
    }
}

#[derive(Deserialize)]
struct VectorStoreObject {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct VectorStoreFileObject {
    id: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct FileBatchObject {
    id: String,
    status: String,
    #[serde(default)]
    file_counts: FileCountsObject,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FileCountsObject {
    in_progress: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
    total: u64,
}

impl From<FileBatchObject> for FileBatch {
    fn from(batch: FileBatchObject) -> Self {
        let c = batch.file_counts;
        FileBatch {
            id: batch.id,
            status: batch.status,
            file_counts: FileCounts {
                in_progress: c.in_progress,
                completed: c.completed,
                failed: c.failed,
                cancelled: c.cancelled,
                total: c.total,
            },
        }
    }
}

#[derive(Deserialize)]
struct AssistantObject {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: String,
}

impl From<AssistantObject> for Assistant {
    fn from(a: AssistantObject) -> Self {
        Assistant {
            id: a.id,
            name: a.name,
            model: a.model,
        }
    }
}

#[derive(Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Deserialize)]
struct MessageObject {
    id: String,
    role: Role,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TextContent {
    value: String,
}

impl From<MessageObject> for ThreadMessage {
    fn from(message: MessageObject) -> Self {
        let text = message
            .content
            .into_iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.value),
                ContentPart::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        ThreadMessage {
            id: message.id,
            role: message.role,
            text,
        }
    }
}

#[derive(Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunErrorObject>,
}

#[derive(Deserialize)]
struct RunErrorObject {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

impl From<RunObject> for Run {
    fn from(run: RunObject) -> Self {
        Run {
            id: run.id,
            status: run.status,
            last_error: run.last_error.map(|e| match e.code {
                Some(code) => format!("{}: {}", code, e.message),
                None => e.message,
            }),
        }
    }
}
