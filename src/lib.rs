//! # Docs Assistant
//!
//! A chat assistant grounded in a folder of company documents.
//!
//! On first start the folder is uploaded to a hosted provider's vector
//! store and an assistant with file search over that store is created. The
//! two remote ids are kept in a small JSON file so later starts reuse them.
//! A browser chat UI then answers questions against the indexed documents
//! and lets users list, upload and delete files.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────────────┐
//! │  Folder  │──▶│  Provisioner │──▶│  Provider            │
//! │  (scan)  │   │ config.json  │   │  files, vector store │
//! └──────────┘   └──────┬───────┘   │  assistant, threads  │
//!                       │           └──────────▲───────────┘
//!                       ▼                      │
//!                ┌─────────────┐       ┌───────┴──────┐
//!                │  Web UI     │──────▶│  Sessions    │
//!                │  (axum)     │       │  File manager│
//!                └─────────────┘       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! docchat init                     # index ./docs, create the assistant
//! docchat serve                    # chat UI on http://127.0.0.1:8501
//! docchat ask "What is the refund policy?"
//! docchat files list
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML deployment settings |
//! | [`config_store`] | Persisted remote ids (`config.json`) |
//! | [`error`] | Library error type |
//! | [`extensions`] | Extension allow-lists |
//! | [`models`] | Remote entities and chat turns |
//! | [`provider`] | Remote provider trait, OpenAI and in-memory implementations |
//! | [`poll`] | Fixed-interval polling with timeout and cancellation |
//! | [`indexer`] | Folder scan and initial vector store |
//! | [`provision`] | Init-or-load of the vector store and assistant |
//! | [`session`] | Conversation sessions |
//! | [`files`] | Vector store file management |
//! | [`page`] | Server-rendered HTML |
//! | [`server`] | Chat UI HTTP server |

pub mod config;
pub mod config_store;
pub mod error;
pub mod extensions;
pub mod files;
pub mod indexer;
pub mod models;
pub mod page;
pub mod poll;
pub mod provider;
pub mod provision;
pub mod server;
pub mod session;

pub use error::{Error, Result};
