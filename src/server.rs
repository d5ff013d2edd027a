//! Chat UI HTTP server.
//!
//! Serves a server-rendered page and handles its forms. Every mutation
//! ends in a `303 See Other` back to `/`, so the next render re-queries the
//! provider for the file list (full refresh).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat history and file sidebar; opens a session on first visit |
//! | `POST` | `/chat` | Submit `message` and wait for the answer |
//! | `POST` | `/files/upload` | Multipart `files` (repeatable) |
//! | `POST` | `/files/delete` | Detach `file_id` from the vector store |
//! | `POST` | `/session/reset` | Forget the session; the next visit starts a new thread |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Sessions
//!
//! The `docchat_session` cookie names an entry in the [`SessionRegistry`].
//! `GET /` and `POST /chat` open a fresh session (and remote thread) for an
//! unknown or missing cookie. File uploads and deletes never open one; their
//! outcome notice is shown only to a caller that already has a session.
//! Sessions idle longer than `server.session_idle_secs` are dropped.
//!
//! # Errors
//!
//! Provider failures render a generic error page with status 502; details
//! go to the log only.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::Config;
use crate::error::Error;
use crate::files::{delete_file, list_files, upload_files, UploadSelection};
use crate::page::{render_error, render_page, PageView};
use crate::provider::Provider;
use crate::provision::Deployment;
use crate::session::{NoticeKind, Session, SessionRegistry, TurnOutcome};

pub const SESSION_COOKIE: &str = "docchat_session";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    provider: Arc<dyn Provider>,
    deployment: Arc<Deployment>,
    sessions: Arc<SessionRegistry>,
    /// Parent of every per-request wait; cancelled on shutdown.
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: &Config,
        provider: Arc<dyn Provider>,
        deployment: Deployment,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config: Arc::new(config.clone()),
            provider,
            deployment: Arc::new(deployment),
            sessions: Arc::new(match config.server.session_idle_timeout() {
                Some(idle) => SessionRegistry::new().with_idle_timeout(idle),
                None => SessionRegistry::new(),
            }),
            shutdown,
        }
    }
}

/// Starts the chat UI and serves until Ctrl-C.
///
/// `deployment` must come from [`init_or_load`](crate::provision::init_or_load).
pub async fn run_server(
    config: &Config,
    provider: Arc<dyn Provider>,
    deployment: Deployment,
) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutdown requested");
            on_signal.cancel();
        }
    });
    serve(config, provider, deployment, shutdown).await
}

/// Like [`run_server`], but stops when `shutdown` is cancelled instead of on Ctrl-C.
pub async fn serve(
    config: &Config,
    provider: Arc<dyn Provider>,
    deployment: Deployment,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config, provider, deployment, shutdown.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("Chat UI listening on http://{}", bind_addr);
    println!("Chat UI listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;
    Router::new()
        .route("/", get(handle_index))
        .route("/chat", post(handle_chat))
        .route("/files/upload", post(handle_upload))
        .route("/files/delete", post(handle_delete))
        .route("/session/reset", post(handle_reset))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

// ============ Error response ============

/// Internal error type that converts into an HTML error page.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let heading = self
            .status
            .canonical_reason()
            .unwrap_or("Something went wrong");
        (self.status, Html(render_error(heading, &self.message))).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::Provider { .. } => {
                log::error!("{}", err);
                AppError {
                    status: StatusCode::BAD_GATEWAY,
                    message: "The assistant could not complete the request. Please try again."
                        .to_string(),
                }
            }
            Error::NotFound(what) => AppError {
                status: StatusCode::NOT_FOUND,
                message: format!("Not found: {}", what),
            },
            Error::UnsupportedFile { .. } => bad_request(err.to_string()),
            Error::ConfigCorrupt { .. } | Error::Io(_) => {
                log::error!("{}", err);
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal error.".to_string(),
                }
            }
        }
    }
}

// ============ Session cookie ============

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
        .next()
}

fn set_cookie(response: &mut Response, value: &str) {
    if let Ok(header_value) = HeaderValue::from_str(value) {
        response
            .headers_mut()
            .append(header::SET_COOKIE, header_value);
    }
}

/// Attaches the session cookie when the session was opened by this request.
fn with_session(mut response: Response, session_id: &str, opened: bool) -> Response {
    if opened {
        set_cookie(
            &mut response,
            &format!(
                "{}={}; Path=/; HttpOnly; SameSite=Lax",
                SESSION_COOKIE, session_id
            ),
        );
    }
    response
}

async fn open_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<tokio::sync::Mutex<Session>>, bool), AppError> {
    let cookie = session_cookie(headers);
    let (session, opened) = state
        .sessions
        .get_or_open(cookie.as_deref(), state.provider.as_ref(), &state.deployment)
        .await?;
    Ok((session, opened))
}

/// The caller's live session, if any. Never opens one.
fn existing_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Option<Arc<tokio::sync::Mutex<Session>>> {
    session_cookie(headers).and_then(|id| state.sessions.get(&id))
}

/// Shows `text` on the caller's next page render, when the caller has a session.
async fn notify(
    session: Option<Arc<tokio::sync::Mutex<Session>>>,
    kind: NoticeKind,
    text: impl Into<String>,
) {
    if let Some(session) = session {
        session.lock().await.set_notice(kind, text);
    }
}

fn back_home(session_id: &str, opened: bool) -> Response {
    with_session(Redirect::to("/").into_response(), session_id, opened)
}

// ============ GET / ============

async fn handle_index(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (handle, opened) = open_session(&state, &headers).await?;
    let files = list_files(state.provider.as_ref(), &state.deployment.vector_store_id).await?;

    let mut session = handle.lock().await;
    let notice = session.take_notice();
    let body = render_page(&PageView {
        history: session.history(),
        files: &files,
        notice: notice.as_ref(),
    });
    Ok(with_session(Html(body).into_response(), session.id(), opened))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatForm {
    message: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Result<Response, AppError> {
    let (handle, opened) = open_session(&state, &headers).await?;
    let mut session = handle.lock().await;
    let cancel = state.shutdown.child_token();

    let outcome = session
        .submit(
            state.provider.as_ref(),
            &state.deployment,
            &form.message,
            state.config.chat.poll_policy(),
            &cancel,
        )
        .await?;

    match outcome {
        TurnOutcome::Answered { .. } | TurnOutcome::Ignored => {}
        TurnOutcome::RunFailed { status, message } => session.set_notice(
            NoticeKind::Error,
            match message {
                Some(reason) => format!("The assistant run ended with status {}: {}", status, reason),
                None => format!("The assistant run ended with status {}", status),
            },
        ),
        TurnOutcome::TimedOut => session.set_notice(
            NoticeKind::Error,
            "The assistant did not answer in time. Please ask again.",
        ),
        TurnOutcome::Cancelled => {
            session.set_notice(NoticeKind::Error, "The request was cancelled.")
        }
    }

    Ok(back_home(session.id(), opened))
}

// ============ POST /files/upload ============

fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut selections = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = match field.file_name() {
            Some(name) if !base_name(name).is_empty() => base_name(name).to_string(),
            _ => continue,
        };
        let bytes = field.bytes().await.map_err(|e| bad_request(e.body_text()))?;
        selections.push(UploadSelection {
            filename,
            bytes: bytes.to_vec(),
        });
    }

    let cancel = state.shutdown.child_token();
    let result = upload_files(
        state.provider.as_ref(),
        &state.deployment.vector_store_id,
        selections,
        state.config.chat.poll_policy(),
        &cancel,
    )
    .await;

    let session = existing_session(&state, &headers);
    match result {
        Ok(report) => {
            let kind = if report.is_success() {
                NoticeKind::Success
            } else {
                NoticeKind::Error
            };
            notify(session, kind, report.summary()).await;
        }
        Err(e) => {
            log::error!("Upload failed: {}", e);
            notify(session, NoticeKind::Error, "Upload failed.").await;
        }
    }
    Ok(Redirect::to("/").into_response())
}

// ============ POST /files/delete ============

#[derive(Deserialize)]
struct DeleteForm {
    file_id: String,
}

async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<DeleteForm>,
) -> Result<Response, AppError> {
    if form.file_id.trim().is_empty() {
        return Err(bad_request("file_id must not be empty"));
    }

    let result = delete_file(
        state.provider.as_ref(),
        &state.deployment.vector_store_id,
        &form.file_id,
        state.config.files.purge_on_delete,
    )
    .await;

    let session = existing_session(&state, &headers);
    match result {
        Ok(()) => {
            notify(session, NoticeKind::Success, "File removed from the index.").await;
        }
        Err(e) => {
            log::error!("Delete of {} failed: {}", form.file_id, e);
            notify(session, NoticeKind::Error, "Delete failed.").await;
        }
    }
    Ok(Redirect::to("/").into_response())
}

// ============ POST /session/reset ============

async fn handle_reset(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_cookie(&headers) {
        state.sessions.remove(&id);
    }
    let mut response = Redirect::to("/").into_response();
    set_cookie(
        &mut response,
        &format!("{}=; Path=/; Max-Age=0", SESSION_COOKIE),
    );
    response
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
