//! Error taxonomy shared by the library modules.
//!
//! | Variant | Meaning | Handling |
//! |---------|---------|----------|
//! | [`Error::ConfigCorrupt`] | The persisted JSON record cannot be parsed | Fatal |
//! | [`Error::Provider`] | Any failed call to the remote provider | Propagated, never retried |
//! | [`Error::UnsupportedFile`] | Extension outside an allow-list | Logged and skipped by callers |
//! | [`Error::NotFound`] | A named file is not attached to the vector store | Reported to the user |
//! | [`Error::Io`] | Local file system failure | Propagated |
//!
//! Run timeouts and cancellations are not errors; they are reported as
//! [`TurnOutcome`](crate::session::TurnOutcome) variants.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file {} is corrupt: {source}", .path.display())]
    ConfigCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("provider error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Provider {
        status: Option<u16>,
        message: String,
    },

    #[error("unsupported file: {}", .path.display())]
    UnsupportedFile { path: PathBuf },

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a provider error without an HTTP status (transport or decode failures).
    pub fn provider(message: impl Into<String>) -> Self {
        Error::Provider {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Provider {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
