//! Conversation sessions.
//!
//! A [`Session`] belongs to one browser (or one CLI invocation). It owns a
//! remote thread and the local, append-only chat history shown to the user.
//! Sessions are never persisted.
//!
//! # Turn lifecycle
//!
//! ```text
//! Idle ──submit──▶ AwaitingRun ──completed──▶ Completed
//!  ▲                    │                          │
//!  └── failed / timed out / cancelled / error ─────┘ (next submit)
//! ```
//!
//! While awaiting a run the session polls its status at a fixed interval,
//! bounded by the policy timeout and a cancellation token. Only a
//! `completed` run appends an assistant turn.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ChatTurn, Role, RunStatus};
use crate::poll::{poll_until, PollOutcome, PollPolicy};
use crate::provider::Provider;
use crate::provision::Deployment;

/// How many recent thread messages are searched for the assistant reply.
const REPLY_LOOKBACK: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingRun { run_id: String },
    /// The last turn finished; accepts input like `Idle`.
    Completed { run_id: String },
}

/// Result of one submitted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Answered { text: String },
    RunFailed {
        status: RunStatus,
        message: Option<String>,
    },
    TimedOut,
    Cancelled,
    /// Blank input; nothing was recorded or sent.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// One-shot message shown on the next page render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

#[derive(Debug)]
pub struct Session {
    id: String,
    thread_id: String,
    history: Vec<ChatTurn>,
    state: SessionState,
    notice: Option<Notice>,
}

impl Session {
    /// Creates a remote thread bound to the deployment's vector store.
    pub async fn open(provider: &dyn Provider, deployment: &Deployment) -> Result<Self> {
        let thread = provider.create_thread(&deployment.vector_store_id).await?;
        let id = Uuid::new_v4().to_string();
        log::info!("Session {} opened thread {}", id, thread.id);
        Ok(Self {
            id,
            thread_id: thread.id,
            history: Vec::new(),
            state: SessionState::Idle,
            notice: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn set_notice(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notice = Some(Notice {
            kind,
            text: text.into(),
        });
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Sends `text` to the assistant and waits for its answer.
    ///
    /// The user turn is recorded before any remote call, so it stays in the
    /// history even when the turn fails.
    pub async fn submit(
        &mut self,
        provider: &dyn Provider,
        deployment: &Deployment,
        text: &str,
        policy: PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::Ignored);
        }

        self.history.push(ChatTurn::user(text));
        let result = self
            .run_turn(provider, deployment, text, policy, cancel)
            .await;
        if !matches!(result, Ok(TurnOutcome::Answered { .. })) {
            self.state = SessionState::Idle;
        }
        result
    }

    async fn run_turn(
        &mut self,
        provider: &dyn Provider,
        deployment: &Deployment,
        text: &str,
        policy: PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let thread_id = self.thread_id.clone();
        let question = provider.create_message(&thread_id, text).await?;
        let run = provider
            .create_run(&thread_id, &deployment.assistant_id)
            .await?;
        self.state = SessionState::AwaitingRun {
            run_id: run.id.clone(),
        };
        log::info!("Session {} started run {}", self.id, run.id);

        let outcome = poll_until(
            policy,
            cancel,
            || provider.retrieve_run(&thread_id, &run.id),
            |r| r.status.is_terminal(),
        )
        .await?;

        match outcome {
            PollOutcome::Ready(finished) if finished.status == RunStatus::Completed => {
                let reply = latest_assistant_reply(provider, &thread_id, &question.id).await?;
                self.history.push(ChatTurn::assistant(reply.clone()));
                self.state = SessionState::Completed { run_id: run.id };
                Ok(TurnOutcome::Answered { text: reply })
            }
            PollOutcome::Ready(finished) => {
                log::warn!(
                    "Run {} ended with status {}: {}",
                    finished.id,
                    finished.status,
                    finished.last_error.as_deref().unwrap_or("no details")
                );
                Ok(TurnOutcome::RunFailed {
                    status: finished.status,
                    message: finished.last_error,
                })
            }
            PollOutcome::TimedOut => {
                log::warn!("Run {} timed out after {:?}", run.id, policy.timeout);
                cancel_remote_run(provider, &thread_id, &run.id).await;
                Ok(TurnOutcome::TimedOut)
            }
            PollOutcome::Cancelled => {
                log::info!("Run {} cancelled", run.id);
                cancel_remote_run(provider, &thread_id, &run.id).await;
                Ok(TurnOutcome::Cancelled)
            }
        }
    }
}

/// The newest assistant message posted after `question_id`.
///
/// Messages come back newest first, so the scan stops at the question itself
/// and never picks up an answer to an earlier turn.
async fn latest_assistant_reply(
    provider: &dyn Provider,
    thread_id: &str,
    question_id: &str,
) -> Result<String> {
    provider
        .list_messages(thread_id, REPLY_LOOKBACK)
        .await?
        .into_iter()
        .take_while(|m| m.id != question_id)
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.text)
        .ok_or_else(|| Error::provider("run completed without an assistant message"))
}

async fn cancel_remote_run(provider: &dyn Provider, thread_id: &str, run_id: &str) {
    if let Err(e) = provider.cancel_run(thread_id, run_id).await {
        log::warn!("Could not cancel run {}: {}", run_id, e);
    }
}

struct Entry {
    session: Arc<tokio::sync::Mutex<Session>>,
    last_seen: Instant,
}

/// Live sessions keyed by their id (the browser cookie value).
///
/// With an idle timeout, sessions unused for longer are dropped the next
/// time a session is opened. Their remote threads are left to the provider.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Entry>>,
    idle_timeout: Option<Duration>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    /// Returns a live session and marks it as used.
    pub fn get(&self, id: &str) -> Option<Arc<tokio::sync::Mutex<Session>>> {
        let mut sessions = self.sessions.lock().unwrap();
        if self.is_expired(sessions.get(id)?) {
            sessions.remove(id);
            return None;
        }
        let entry = sessions.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    /// Returns the session for `id`, opening a new one when it is unknown.
    ///
    /// The second value is true when a session was opened.
    pub async fn get_or_open(
        &self,
        id: Option<&str>,
        provider: &dyn Provider,
        deployment: &Deployment,
    ) -> Result<(Arc<tokio::sync::Mutex<Session>>, bool)> {
        if let Some(existing) = id.and_then(|id| self.get(id)) {
            return Ok((existing, false));
        }
        self.sweep();
        let session = Session::open(provider, deployment).await?;
        let session_id = session.id().to_string();
        let handle = Arc::new(tokio::sync::Mutex::new(session));
        self.sessions.lock().unwrap().insert(
            session_id,
            Entry {
                session: handle.clone(),
                last_seen: Instant::now(),
            },
        );
        Ok((handle, true))
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.lock().unwrap().remove(id).is_some()
    }

    /// Drops every session idle for longer than the timeout.
    pub fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, entry| !self.is_expired(entry));
        let dropped = before - sessions.len();
        if dropped > 0 {
            log::info!("Dropped {} idle session(s)", dropped);
        }
        dropped
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        self.idle_timeout
            .is_some_and(|limit| entry.last_seen.elapsed() > limit)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
