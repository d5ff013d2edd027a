//! # Docs Assistant CLI (`docchat`)
//!
//! The `docchat` binary provisions the remote vector store and assistant,
//! starts the chat UI, and offers a few commands for working without a
//! browser.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Index the document folder and create the assistant (once) |
//! | `docchat status` | Show the recorded remote ids and the active settings |
//! | `docchat serve` | Provision if needed, then start the chat UI |
//! | `docchat ask "<question>"` | Ask a single question in a fresh thread |
//! | `docchat files list` | List files attached to the vector store |
//! | `docchat files add <PATH>...` | Upload files not yet in the vector store |
//! | `docchat files remove <FILE>` | Detach a file by id or filename |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use docs_assistant::config::{self, Config};
use docs_assistant::config_store::ConfigStore;
use docs_assistant::files::{self, UploadSelection};
use docs_assistant::provider::{create_provider, Provider};
use docs_assistant::provision::{init_or_load, Deployment};
use docs_assistant::server;
use docs_assistant::session::{Session, TurnOutcome};

/// Docs Assistant CLI: chat with an assistant grounded in your documents.
///
/// All commands accept a `--config` flag pointing to a TOML settings file.
/// See `config/docchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Chat with an assistant grounded in a folder of company documents",
    version
)]
struct Cli {
    /// Path to the settings file (TOML).
    ///
    /// Defaults to `./config/docchat.toml`.
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Index the document folder and create the assistant.
    ///
    /// Runs only the steps whose ids are missing from the state file, so
    /// running it again creates nothing.
    Init,

    /// Show the recorded remote ids and the active settings.
    ///
    /// Reads local files only; no provider calls are made.
    Status,

    /// Provision if needed, then start the chat UI.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,

    /// Ask one question in a fresh thread and print the answer.
    Ask {
        /// The question to ask.
        question: String,
    },

    /// Manage files attached to the vector store.
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },
}

/// File management subcommands.
#[derive(Subcommand)]
enum FilesAction {
    /// List attached files with their sizes.
    List,
    /// Upload files whose names are not attached yet.
    Add {
        /// Local files to upload.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Detach a file from the vector store.
    Remove {
        /// File id (`file-...`) or filename.
        file: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let store = state_store(&cfg);

    match cli.command {
        Commands::Init => {
            let provider = create_provider(&cfg.provider)?;
            let deployment = provision(provider.as_ref(), &cfg, &store).await?;
            println!("Vector store: {}", deployment.vector_store_id);
            println!("Assistant:    {}", deployment.assistant_id);
        }
        Commands::Status => {
            print_status(&cfg, &store)?;
        }
        Commands::Serve => {
            let provider = create_provider(&cfg.provider)?;
            let deployment = provision(provider.as_ref(), &cfg, &store).await?;
            server::run_server(&cfg, provider, deployment).await?;
        }
        Commands::Ask { question } => {
            let provider = create_provider(&cfg.provider)?;
            let deployment = provision(provider.as_ref(), &cfg, &store).await?;
            ask(provider, &deployment, &cfg, &question).await?;
        }
        Commands::Files { action } => {
            let provider = create_provider(&cfg.provider)?;
            let deployment = provision(provider.as_ref(), &cfg, &store).await?;
            run_files(action, provider.as_ref(), &deployment, &cfg).await?;
        }
    }

    Ok(())
}

/// The in-memory provider forgets its ids on exit, so they must not reach disk.
fn state_store(cfg: &Config) -> ConfigStore {
    if cfg.provider.kind == "memory" {
        log::info!("Memory provider: state is kept in memory only");
        ConfigStore::ephemeral()
    } else {
        ConfigStore::new(cfg.state.path.clone())
    }
}

fn describe_store(store: &ConfigStore) -> String {
    match store.path() {
        Some(path) => path.display().to_string(),
        None => "(in memory, not persisted)".to_string(),
    }
}

async fn provision(
    provider: &dyn Provider,
    cfg: &Config,
    store: &ConfigStore,
) -> anyhow::Result<Deployment> {
    init_or_load(provider, cfg, store)
        .await
        .with_context(|| format!("Provisioning failed (state file {})", describe_store(store)))
}

fn print_status(cfg: &Config, store: &ConfigStore) -> anyhow::Result<()> {
    let record = store.load()?;
    println!("State file:    {}", describe_store(store));
    println!(
        "Vector store:  {}",
        record.vector_store_id().unwrap_or("(not created)")
    );
    println!(
        "Assistant:     {}",
        record.assistant_id().unwrap_or("(not created)")
    );
    println!("Documents:     {}", cfg.documents.folder.display());
    println!("Provider:      {} ({})", cfg.provider.kind, cfg.provider.model);
    println!("Bind:          {}", cfg.server.bind);
    Ok(())
}

/// Cancels `token` on Ctrl-C so an in-flight wait stops early.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });
    token
}

async fn ask(
    provider: Arc<dyn Provider>,
    deployment: &Deployment,
    cfg: &Config,
    question: &str,
) -> anyhow::Result<()> {
    let mut session = Session::open(provider.as_ref(), deployment).await?;
    let cancel = cancel_on_ctrl_c();
    let outcome = session
        .submit(
            provider.as_ref(),
            deployment,
            question,
            cfg.chat.poll_policy(),
            &cancel,
        )
        .await?;

    match outcome {
        TurnOutcome::Answered { text } => println!("{}", text),
        TurnOutcome::Ignored => anyhow::bail!("Question must not be empty"),
        TurnOutcome::RunFailed { status, message } => anyhow::bail!(
            "Run ended with status {}: {}",
            status,
            message.unwrap_or_else(|| "no details".to_string())
        ),
        TurnOutcome::TimedOut => anyhow::bail!(
            "No answer within {}s",
            cfg.chat.run_timeout_secs
        ),
        TurnOutcome::Cancelled => anyhow::bail!("Cancelled"),
    }
    Ok(())
}

fn read_selection(path: &Path) -> anyhow::Result<UploadSelection> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(UploadSelection { filename, bytes })
}

async fn run_files(
    action: FilesAction,
    provider: &dyn Provider,
    deployment: &Deployment,
    cfg: &Config,
) -> anyhow::Result<()> {
    let vector_store_id = &deployment.vector_store_id;

    match action {
        FilesAction::List => {
            let listed = files::list_files(provider, vector_store_id).await?;
            if listed.is_empty() {
                println!("No files in the vector store.");
            }
            for file in listed {
                println!("{}  {}  ({} bytes)", file.id, file.filename, file.bytes);
            }
        }
        FilesAction::Add { paths } => {
            let selections = paths
                .iter()
                .map(|p| read_selection(p))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let report = files::upload_files(
                provider,
                vector_store_id,
                selections,
                cfg.chat.poll_policy(),
                &cancel_on_ctrl_c(),
            )
            .await?;
            println!("{}", report.summary());
            if !report.is_success() {
                anyhow::bail!("Upload did not complete");
            }
        }
        FilesAction::Remove { file } => {
            let target = files::resolve_file(provider, vector_store_id, &file).await?;
            files::delete_file(
                provider,
                vector_store_id,
                &target.id,
                cfg.files.purge_on_delete,
            )
            .await?;
            println!("Removed {} ({})", target.filename, target.id);
        }
    }
    Ok(())
}
