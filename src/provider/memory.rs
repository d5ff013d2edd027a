//! In-process [`Provider`] for offline trials and tests.
//!
//! Files, vector stores, assistants, threads and runs live in a
//! `HashMap`-backed state behind a `Mutex`. Every trait call is appended to
//! a call log so callers can assert exactly which remote operations were
//! issued. Runs walk through a configurable status script; when a run first
//! reports `completed`, an assistant reply is posted to its thread.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::Provider;
use crate::error::{Error, Result};
use crate::models::{
    Assistant, AssistantSpec, FileBatch, FileCounts, RemoteFile, Role, Run, RunStatus, Thread,
    ThreadMessage, VectorStore, VectorStoreFile,
};

/// One recorded remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    UploadFile(String),
    RetrieveFile(String),
    DeleteFile(String),
    CreateVectorStore { name: String, file_ids: Vec<String> },
    ListVectorStoreFiles(String),
    CreateFileBatch { vector_store_id: String, file_ids: Vec<String> },
    RetrieveFileBatch(String),
    DeleteVectorStoreFile { vector_store_id: String, file_id: String },
    CreateAssistant(String),
    RetrieveAssistant(String),
    CreateThread(String),
    CreateMessage { thread_id: String, content: String },
    ListMessages(String),
    CreateRun { thread_id: String, assistant_id: String },
    RetrieveRun(String),
    CancelRun(String),
}

impl Call {
    /// True for calls that create a remote entity.
    pub fn is_creation(&self) -> bool {
        matches!(
            self,
            Call::UploadFile(_)
                | Call::CreateVectorStore { .. }
                | Call::CreateFileBatch { .. }
                | Call::CreateAssistant(_)
                | Call::CreateThread(_)
                | Call::CreateMessage { .. }
                | Call::CreateRun { .. }
        )
    }
}

struct RunState {
    thread_id: String,
    polls: usize,
    status: RunStatus,
    replied: bool,
}

#[derive(Default)]
struct State {
    next_id: u64,
    files: HashMap<String, RemoteFile>,
    vector_stores: HashMap<String, (String, Vec<String>)>,
    batches: HashMap<String, Vec<String>>,
    assistants: HashMap<String, Assistant>,
    threads: HashMap<String, Vec<ThreadMessage>>,
    runs: HashMap<String, RunState>,
    calls: Vec<Call>,
    /// Completed runs post no assistant message.
    muted: bool,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }
}

pub struct MemoryProvider {
    state: Mutex<State>,
    run_script: Vec<RunStatus>,
    reply: Option<String>,
    failing_uploads: HashSet<String>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            run_script: vec![RunStatus::Completed],
            reply: None,
            failing_uploads: HashSet::new(),
        }
    }

    /// Statuses returned by successive `retrieve_run` calls; the last one repeats.
    pub fn with_run_statuses(mut self, statuses: Vec<RunStatus>) -> Self {
        if !statuses.is_empty() {
            self.run_script = statuses;
        }
        self
    }

    /// Fixed text posted as the assistant reply of every completed run.
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Make uploads of `filename` fail with a provider error.
    pub fn fail_upload_of(mut self, filename: impl Into<String>) -> Self {
        self.failing_uploads.insert(filename.into());
        self
    }

    /// From now on, runs complete without posting a reply.
    pub fn mute_replies(&self) {
        self.state.lock().unwrap().muted = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Number of recorded calls that created a remote entity.
    pub fn creation_count(&self) -> usize {
        self.calls().iter().filter(|c| c.is_creation()).count()
    }

    fn record(&self, call: Call) -> std::sync::MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }

    fn reply_for(&self, state: &State, thread_id: &str) -> String {
        if let Some(reply) = &self.reply {
            return reply.clone();
        }
        let question = state
            .threads
            .get(thread_id)
            .and_then(|msgs| msgs.iter().rev().find(|m| m.role == Role::User))
            .map(|m| m.text.clone())
            .unwrap_or_default();
        format!(
            "Offline provider: {} file(s) stored. You asked: {}",
            state.files.len(),
            question
        )
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(kind: &str, id: &str) -> Error {
    Error::Provider {
        status: Some(404),
        message: format!("No {} found with id '{}'.", kind, id),
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<RemoteFile> {
        let mut state = self.record(Call::UploadFile(filename.to_string()));
        if self.failing_uploads.contains(filename) {
            return Err(Error::Provider {
                status: Some(500),
                message: format!("upload of {} failed", filename),
            });
        }
        let file = RemoteFile {
            id: state.id("file"),
            filename: filename.to_string(),
            bytes: bytes.len() as u64,
            created_at: Some(Utc::now()),
        };
        state.files.insert(file.id.clone(), file.clone());
        Ok(file)
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<RemoteFile> {
        let state = self.record(Call::RetrieveFile(file_id.to_string()));
        state
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| not_found("file", file_id))
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let mut state = self.record(Call::DeleteFile(file_id.to_string()));
        state
            .files
            .remove(file_id)
            .ok_or_else(|| not_found("file", file_id))?;
        for (_, ids) in state.vector_stores.values_mut() {
            ids.retain(|id| id != file_id);
        }
        Ok(())
    }

    async fn create_vector_store(&self, name: &str, file_ids: &[String]) -> Result<VectorStore> {
        let mut state = self.record(Call::CreateVectorStore {
            name: name.to_string(),
            file_ids: file_ids.to_vec(),
        });
        let id = state.id("vs");
        state
            .vector_stores
            .insert(id.clone(), (name.to_string(), file_ids.to_vec()));
        Ok(VectorStore {
            id,
            name: name.to_string(),
        })
    }

    async fn list_vector_store_files(
        &self,
        vector_store_id: &str,
    ) -> Result<Vec<VectorStoreFile>> {
        let state = self.record(Call::ListVectorStoreFiles(vector_store_id.to_string()));
        let (_, ids) = state
            .vector_stores
            .get(vector_store_id)
            .ok_or_else(|| not_found("vector store", vector_store_id))?;
        Ok(ids
            .iter()
            .map(|id| VectorStoreFile {
                id: id.clone(),
                status: "completed".to_string(),
            })
            .collect())
    }

    async fn create_file_batch(
        &self,
        vector_store_id: &str,
        file_ids: &[String],
    ) -> Result<FileBatch> {
        let mut state = self.record(Call::CreateFileBatch {
            vector_store_id: vector_store_id.to_string(),
            file_ids: file_ids.to_vec(),
        });
        let batch_id = state.id("vsfb");
        let (_, ids) = state
            .vector_stores
            .get_mut(vector_store_id)
            .ok_or_else(|| not_found("vector store", vector_store_id))?;
        ids.extend(file_ids.iter().cloned());
        state.batches.insert(batch_id.clone(), file_ids.to_vec());
        Ok(FileBatch {
            id: batch_id,
            status: "in_progress".to_string(),
            file_counts: FileCounts {
                in_progress: file_ids.len() as u64,
                total: file_ids.len() as u64,
                ..FileCounts::default()
            },
        })
    }

    async fn retrieve_file_batch(
        &self,
        _vector_store_id: &str,
        batch_id: &str,
    ) -> Result<FileBatch> {
        let state = self.record(Call::RetrieveFileBatch(batch_id.to_string()));
        let ids = state
            .batches
            .get(batch_id)
            .ok_or_else(|| not_found("file batch", batch_id))?;
        Ok(FileBatch {
            id: batch_id.to_string(),
            status: "completed".to_string(),
            file_counts: FileCounts {
                completed: ids.len() as u64,
                total: ids.len() as u64,
                ..FileCounts::default()
            },
        })
    }

    async fn delete_vector_store_file(&self, vector_store_id: &str, file_id: &str) -> Result<()> {
        let mut state = self.record(Call::DeleteVectorStoreFile {
            vector_store_id: vector_store_id.to_string(),
            file_id: file_id.to_string(),
        });
        let (_, ids) = state
            .vector_stores
            .get_mut(vector_store_id)
            .ok_or_else(|| not_found("vector store", vector_store_id))?;
        let before = ids.len();
        ids.retain(|id| id != file_id);
        if ids.len() == before {
            return Err(not_found("vector store file", file_id));
        }
        Ok(())
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<Assistant> {
        let mut state = self.record(Call::CreateAssistant(spec.vector_store_id.clone()));
        let assistant = Assistant {
            id: state.id("asst"),
            name: Some(spec.name.clone()),
            model: spec.model.clone(),
        };
        state
            .assistants
            .insert(assistant.id.clone(), assistant.clone());
        Ok(assistant)
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<Assistant> {
        let state = self.record(Call::RetrieveAssistant(assistant_id.to_string()));
        state
            .assistants
            .get(assistant_id)
            .cloned()
            .ok_or_else(|| not_found("assistant", assistant_id))
    }

    async fn create_thread(&self, vector_store_id: &str) -> Result<Thread> {
        let mut state = self.record(Call::CreateThread(vector_store_id.to_string()));
        let id = state.id("thread");
        state.threads.insert(id.clone(), Vec::new());
        Ok(Thread { id })
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage> {
        let mut state = self.record(Call::CreateMessage {
            thread_id: thread_id.to_string(),
            content: content.to_string(),
        });
        let id = state.id("msg");
        let message = ThreadMessage {
            id,
            role: Role::User,
            text: content.to_string(),
        };
        state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| not_found("thread", thread_id))?
            .push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, thread_id: &str, limit: usize) -> Result<Vec<ThreadMessage>> {
        let state = self.record(Call::ListMessages(thread_id.to_string()));
        let messages = state
            .threads
            .get(thread_id)
            .ok_or_else(|| not_found("thread", thread_id))?;
        Ok(messages.iter().rev().take(limit).cloned().collect())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let mut state = self.record(Call::CreateRun {
            thread_id: thread_id.to_string(),
            assistant_id: assistant_id.to_string(),
        });
        if !state.threads.contains_key(thread_id) {
            return Err(not_found("thread", thread_id));
        }
        if !state.assistants.contains_key(assistant_id) {
            return Err(not_found("assistant", assistant_id));
        }
        let id = state.id("run");
        state.runs.insert(
            id.clone(),
            RunState {
                thread_id: thread_id.to_string(),
                polls: 0,
                status: RunStatus::Queued,
                replied: false,
            },
        );
        Ok(Run {
            id,
            status: RunStatus::Queued,
            last_error: None,
        })
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let mut state = self.record(Call::RetrieveRun(run_id.to_string()));
        let run = state
            .runs
            .get_mut(run_id)
            .filter(|r| r.thread_id == thread_id)
            .ok_or_else(|| not_found("run", run_id))?;

        if !run.status.is_terminal() {
            let step = run.polls.min(self.run_script.len() - 1);
            run.status = self.run_script[step];
            run.polls += 1;
        }
        let status = run.status;
        let needs_reply = status == RunStatus::Completed && !run.replied;
        run.replied |= needs_reply;

        if needs_reply && !state.muted {
            let text = self.reply_for(&state, thread_id);
            let id = state.id("msg");
            if let Some(messages) = state.threads.get_mut(thread_id) {
                messages.push(ThreadMessage {
                    id,
                    role: Role::Assistant,
                    text,
                });
            }
        }

        let last_error = (status == RunStatus::Failed).then(|| "scripted failure".to_string());
        Ok(Run {
            id: run_id.to_string(),
            status,
            last_error,
        })
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<Run> {
        let mut state = self.record(Call::CancelRun(run_id.to_string()));
        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| not_found("run", run_id))?;
        run.status = RunStatus::Cancelled;
        Ok(Run {
            id: run_id.to_string(),
            status: RunStatus::Cancelled,
            last_error: None,
        })
    }
}
