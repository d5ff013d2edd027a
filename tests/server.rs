//! End-to-end tests for the chat UI server.
//!
//! Each test provisions a deployment against the in-memory provider, starts
//! the axum server on a free port, and drives it over HTTP with `reqwest`.

use docs_assistant::config::Config;
use docs_assistant::config_store::ConfigStore;
use docs_assistant::files::{list_files, resolve_file};
use docs_assistant::provider::{Call, MemoryProvider, Provider};
use docs_assistant::provision::{init_or_load, Deployment};
use docs_assistant::server::{serve, SESSION_COOKIE};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

struct TestServer {
    _tmp: TempDir,
    base: String,
    provider: Arc<MemoryProvider>,
    deployment: Deployment,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(provider: MemoryProvider) -> Self {
        Self::start_with(provider, None).await
    }

    /// Provisions against `docs/` (policy.md, handbook.txt) unless a deployment is given.
    async fn start_with(provider: MemoryProvider, deployment: Option<Deployment>) -> Self {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("policy.md"), "Refunds take 14 days.").unwrap();
        std::fs::write(docs.join("handbook.txt"), "Be nice.").unwrap();

        let port = find_free_port();
        let config: Config = toml::from_str(&format!(
            r#"
[documents]
folder = "{}"

[state]
path = "{}"

[provider]
kind = "memory"

[chat]
poll_interval_ms = 5
run_timeout_secs = 5

[server]
bind = "127.0.0.1:{}"
"#,
            docs.display(),
            tmp.path().join("config.json").display(),
            port
        ))
        .unwrap();

        let provider = Arc::new(provider);
        let deployment = match deployment {
            Some(d) => d,
            None => {
                let store = ConfigStore::new(config.state.path.clone());
                init_or_load(provider.as_ref(), &config, &store)
                    .await
                    .unwrap()
            }
        };

        let shutdown = CancellationToken::new();
        let dyn_provider: Arc<dyn Provider> = provider.clone();
        let server_deployment = deployment.clone();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            serve(&config, dyn_provider, server_deployment, server_shutdown)
                .await
                .unwrap();
        });
        wait_for_server(port).await;

        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .unwrap();

        Self {
            _tmp: tmp,
            base: format!("http://127.0.0.1:{}", port),
            provider,
            deployment,
            shutdown,
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Loads `/` and returns the session cookie it set.
    async fn open_session(&self) -> String {
        let resp = self.client.get(self.url("/")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let set_cookie = resp
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .expect("first visit sets a session cookie")
            .to_str()
            .unwrap()
            .to_string();
        let pair = set_cookie.split(';').next().unwrap().to_string();
        assert!(pair.starts_with(&format!("{}=", SESSION_COOKIE)));
        pair
    }

    async fn page(&self, cookie: &str) -> String {
        let resp = self
            .client
            .get(self.url("/"))
            .header(reqwest::header::COOKIE, cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        resp.text().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn assert_redirects_home(resp: &reqwest::Response) {
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        resp.headers().get(reqwest::header::LOCATION).unwrap(),
        "/"
    );
}

#[tokio::test]
async fn health_reports_version() {
    let server = TestServer::start(MemoryProvider::new()).await;

    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn first_visit_opens_one_session_and_lists_files() {
    let server = TestServer::start(MemoryProvider::new()).await;
    let cookie = server.open_session().await;

    let resp = server
        .client
        .get(server.url("/"))
        .header(reqwest::header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert!(resp.headers().get(reqwest::header::SET_COOKIE).is_none());
    let body = resp.text().await.unwrap();
    assert!(body.contains("Company RAG Assistant"));
    assert!(body.contains("policy.md"));
    assert!(body.contains("handbook.txt"));

    let threads = server
        .provider
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::CreateThread(_)))
        .count();
    assert_eq!(threads, 1);
}

#[tokio::test]
async fn chat_round_trip_renders_markdown_answer() {
    let server =
        TestServer::start(MemoryProvider::new().with_reply("Refunds take **14** days.")).await;
    let cookie = server.open_session().await;

    let resp = server
        .client
        .post(server.url("/chat"))
        .header(reqwest::header::COOKIE, &cookie)
        .form(&[("message", "What is the refund policy?")])
        .send()
        .await
        .unwrap();
    assert_redirects_home(&resp);

    let body = server.page(&cookie).await;
    assert!(body.contains("What is the refund policy?"));
    assert!(body.contains("Refunds take <strong>14</strong> days."));
    let question_at = body.find("What is the refund policy?").unwrap();
    let answer_at = body.find("Refunds take").unwrap();
    assert!(question_at < answer_at);
}

#[tokio::test]
async fn failed_run_shows_notice_and_keeps_question() {
    let provider = MemoryProvider::new()
        .with_run_statuses(vec![docs_assistant::models::RunStatus::Failed]);
    let server = TestServer::start(provider).await;
    let cookie = server.open_session().await;

    let resp = server
        .client
        .post(server.url("/chat"))
        .header(reqwest::header::COOKIE, &cookie)
        .form(&[("message", "hello?")])
        .send()
        .await
        .unwrap();
    assert_redirects_home(&resp);

    let body = server.page(&cookie).await;
    assert!(body.contains("hello?"));
    assert!(body.contains("ended with status failed"));
    assert!(!body.contains("turn assistant"));

    // The notice is shown once.
    let again = server.page(&cookie).await;
    assert!(!again.contains("ended with status failed"));
}

#[tokio::test]
async fn upload_adds_new_files_and_reports_skips() {
    let server = TestServer::start(MemoryProvider::new()).await;
    let cookie = server.open_session().await;

    let form = reqwest::multipart::Form::new()
        .part(
            "files",
            reqwest::multipart::Part::bytes(b"# Travel\nBook early.".to_vec())
                .file_name("travel.md"),
        )
        .part(
            "files",
            reqwest::multipart::Part::bytes(b"again".to_vec()).file_name("policy.md"),
        )
        .part(
            "files",
            reqwest::multipart::Part::bytes(vec![0x89, 0x50]).file_name("photo.png"),
        );
    let resp = server
        .client
        .post(server.url("/files/upload"))
        .header(reqwest::header::COOKIE, &cookie)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_redirects_home(&resp);

    let body = server.page(&cookie).await;
    assert!(body.contains("Uploaded travel.md"));
    assert!(body.contains("Already indexed: policy.md"));
    assert!(body.contains("Unsupported: photo.png"));

    let names: Vec<String> = list_files(
        server.provider.as_ref(),
        &server.deployment.vector_store_id,
    )
    .await
    .unwrap()
    .into_iter()
    .map(|f| f.filename)
    .collect();
    assert_eq!(names, vec!["handbook.txt", "policy.md", "travel.md"]);
}

#[tokio::test]
async fn delete_detaches_file_from_sidebar() {
    let server = TestServer::start(MemoryProvider::new()).await;
    let cookie = server.open_session().await;
    let target = resolve_file(
        server.provider.as_ref(),
        &server.deployment.vector_store_id,
        "handbook.txt",
    )
    .await
    .unwrap();

    let resp = server
        .client
        .post(server.url("/files/delete"))
        .header(reqwest::header::COOKIE, &cookie)
        .form(&[("file_id", target.id.as_str())])
        .send()
        .await
        .unwrap();
    assert_redirects_home(&resp);

    let body = server.page(&cookie).await;
    assert!(!body.contains("handbook.txt"));
    assert!(body.contains("policy.md"));
    assert!(!server
        .provider
        .calls()
        .contains(&Call::DeleteFile(target.id.clone())));
}

#[tokio::test]
async fn cookieless_file_changes_open_no_session() {
    let server = TestServer::start(MemoryProvider::new()).await;
    let target = resolve_file(
        server.provider.as_ref(),
        &server.deployment.vector_store_id,
        "policy.md",
    )
    .await
    .unwrap();
    server.provider.clear_calls();

    let resp = server
        .client
        .post(server.url("/files/delete"))
        .form(&[("file_id", target.id.as_str())])
        .send()
        .await
        .unwrap();
    assert_redirects_home(&resp);
    assert!(resp.headers().get(reqwest::header::SET_COOKIE).is_none());

    let form = reqwest::multipart::Form::new().part(
        "files",
        reqwest::multipart::Part::bytes(b"Book early.".to_vec()).file_name("travel.md"),
    );
    let resp = server
        .client
        .post(server.url("/files/upload"))
        .header(reqwest::header::COOKIE, "docchat_session=never-issued")
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_redirects_home(&resp);
    assert!(resp.headers().get(reqwest::header::SET_COOKIE).is_none());

    assert!(!server
        .provider
        .calls()
        .iter()
        .any(|c| matches!(c, Call::CreateThread(_))));
    let names: Vec<String> = list_files(
        server.provider.as_ref(),
        &server.deployment.vector_store_id,
    )
    .await
    .unwrap()
    .into_iter()
    .map(|f| f.filename)
    .collect();
    assert_eq!(names, vec!["handbook.txt", "travel.md"]);
}

#[tokio::test]
async fn blank_file_id_is_bad_request() {
    let server = TestServer::start(MemoryProvider::new()).await;
    let cookie = server.open_session().await;

    let resp = server
        .client
        .post(server.url("/files/delete"))
        .header(reqwest::header::COOKIE, &cookie)
        .form(&[("file_id", "  ")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_starts_a_new_conversation() {
    let server = TestServer::start(MemoryProvider::new()).await;
    let cookie = server.open_session().await;
    server
        .client
        .post(server.url("/chat"))
        .header(reqwest::header::COOKIE, &cookie)
        .form(&[("message", "remember me")])
        .send()
        .await
        .unwrap();

    let resp = server
        .client
        .post(server.url("/session/reset"))
        .header(reqwest::header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_redirects_home(&resp);

    // The old cookie no longer names a session, so a fresh one is opened.
    let resp = server
        .client
        .get(server.url("/"))
        .header(reqwest::header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert!(resp.headers().get(reqwest::header::SET_COOKIE).is_some());
    let body = resp.text().await.unwrap();
    assert!(!body.contains("remember me"));
}

#[tokio::test]
async fn provider_failure_renders_bad_gateway() {
    let deployment = Deployment {
        assistant_id: "asst_1".to_string(),
        vector_store_id: "vs_gone".to_string(),
    };
    let server = TestServer::start_with(MemoryProvider::new(), Some(deployment)).await;

    let resp = server.client.get(server.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Back to chat"));
    assert!(!body.contains("vs_gone"));
}
