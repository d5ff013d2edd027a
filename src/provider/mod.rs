//! Remote provider abstraction.
//!
//! The [`Provider`] trait lists every remote call the assistant makes. All
//! state behind these calls (files, vector stores, assistants, threads,
//! runs) lives with the provider; implementations only translate requests.
//!
//! - **[`OpenAIProvider`]** talks to the OpenAI Files, Vector Stores and
//!   Assistants v2 REST APIs.
//! - **[`MemoryProvider`]** keeps everything in process memory and records
//!   each call. It backs offline trials (`provider.kind = "memory"`) and the
//!   test suite.
//!
//! Use [`create_provider`] to build the one named in the settings.

pub mod memory;
pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::models::{
    Assistant, AssistantSpec, FileBatch, RemoteFile, Run, Thread, ThreadMessage, VectorStore,
    VectorStoreFile,
};

pub use memory::{Call, MemoryProvider};
pub use openai::OpenAIProvider;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Short label used in logs (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Uploads raw bytes to provider file storage for assistant use.
    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<RemoteFile>;

    async fn retrieve_file(&self, file_id: &str) -> Result<RemoteFile>;

    /// Deletes a file from provider storage (and every vector store using it).
    async fn delete_file(&self, file_id: &str) -> Result<()>;

    async fn create_vector_store(&self, name: &str, file_ids: &[String]) -> Result<VectorStore>;

    /// Lists every file attached to the vector store, across all pages.
    async fn list_vector_store_files(&self, vector_store_id: &str)
        -> Result<Vec<VectorStoreFile>>;

    async fn create_file_batch(
        &self,
        vector_store_id: &str,
        file_ids: &[String],
    ) -> Result<FileBatch>;

    async fn retrieve_file_batch(&self, vector_store_id: &str, batch_id: &str)
        -> Result<FileBatch>;

    /// Detaches a file from the vector store. Provider storage keeps the file.
    async fn delete_vector_store_file(&self, vector_store_id: &str, file_id: &str) -> Result<()>;

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<Assistant>;

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<Assistant>;

    /// Creates a thread whose `file_search` tool is bound to the vector store.
    async fn create_thread(&self, vector_store_id: &str) -> Result<Thread>;

    /// Appends a user message to the thread.
    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage>;

    /// Returns up to `limit` messages, newest first.
    async fn list_messages(&self, thread_id: &str, limit: usize) -> Result<Vec<ThreadMessage>>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;
}

/// Build the [`Provider`] named by `config.kind`.
///
/// | Kind | Provider |
/// |------|----------|
/// | `"openai"` | [`OpenAIProvider`] (requires `OPENAI_API_KEY`) |
/// | `"memory"` | [`MemoryProvider`] |
pub fn create_provider(config: &ProviderConfig) -> anyhow::Result<Arc<dyn Provider>> {
    match config.kind.as_str() {
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "memory" => Ok(Arc::new(MemoryProvider::new())),
        other => anyhow::bail!("Unknown provider kind: {}", other),
    }
}
