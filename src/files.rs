//! Vector store file management.
//!
//! Backs the sidebar: list attached files by name, upload new ones, detach
//! one. Duplicate detection is by filename only, so a renamed copy of an
//! existing document is uploaded again.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::extensions::is_uploadable;
use crate::models::FileBatch;
use crate::poll::{poll_until, PollOutcome, PollPolicy};
use crate::provider::Provider;

/// An attached file with its display name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    pub id: String,
    pub filename: String,
    pub bytes: u64,
}

/// One file picked in the uploader.
#[derive(Debug, Clone)]
pub struct UploadSelection {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub uploaded: Vec<String>,
    pub duplicates: Vec<String>,
    pub unsupported: Vec<String>,
    /// `None` when nothing was left to upload.
    pub batch: Option<BatchResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchResult {
    Settled(FileBatch),
    TimedOut,
    Cancelled,
}

impl UploadReport {
    /// True when every new file was processed by the vector store.
    pub fn is_success(&self) -> bool {
        match &self.batch {
            Some(BatchResult::Settled(batch)) => {
                batch.status == "completed" && batch.file_counts.failed == 0
            }
            Some(_) => false,
            None => true,
        }
    }

    /// One-line summary for the UI.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.uploaded.is_empty() {
            parts.push(format!("Uploaded {}", self.uploaded.join(", ")));
        }
        if !self.duplicates.is_empty() {
            parts.push(format!("Already indexed: {}", self.duplicates.join(", ")));
        }
        if !self.unsupported.is_empty() {
            parts.push(format!("Unsupported: {}", self.unsupported.join(", ")));
        }
        match &self.batch {
            Some(BatchResult::Settled(batch)) if !self.is_success() => parts.push(format!(
                "Indexing {} ({} failed)",
                batch.status, batch.file_counts.failed
            )),
            Some(BatchResult::TimedOut) => parts.push("Indexing still in progress".to_string()),
            Some(BatchResult::Cancelled) => parts.push("Indexing wait cancelled".to_string()),
            _ => {}
        }
        if parts.is_empty() {
            "No files selected".to_string()
        } else {
            parts.join(". ")
        }
    }
}

/// Lists attached files, resolving each name with one lookup per file.
pub async fn list_files(provider: &dyn Provider, vector_store_id: &str) -> Result<Vec<ListedFile>> {
    let attached = provider.list_vector_store_files(vector_store_id).await?;
    let mut files = Vec::with_capacity(attached.len());
    for entry in attached {
        let file = provider.retrieve_file(&entry.id).await?;
        files.push(ListedFile {
            id: file.id,
            filename: file.filename,
            bytes: file.bytes,
        });
    }
    Ok(files)
}

/// Uploads selections whose names are not yet attached and waits for indexing.
pub async fn upload_files(
    provider: &dyn Provider,
    vector_store_id: &str,
    selections: Vec<UploadSelection>,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<UploadReport> {
    let mut report = UploadReport::default();
    if selections.is_empty() {
        return Ok(report);
    }

    let mut known: HashSet<String> = list_files(provider, vector_store_id)
        .await?
        .into_iter()
        .map(|f| f.filename)
        .collect();

    let mut pending = Vec::new();
    for selection in selections {
        if known.contains(&selection.filename) {
            report.duplicates.push(selection.filename);
        } else if !is_uploadable(&selection.filename) {
            report.unsupported.push(selection.filename);
        } else {
            known.insert(selection.filename.clone());
            pending.push(selection);
        }
    }

    if pending.is_empty() {
        return Ok(report);
    }

    let mut file_ids = Vec::with_capacity(pending.len());
    for selection in pending {
        let file = provider
            .upload_file(&selection.filename, selection.bytes)
            .await?;
        log::info!("Uploaded {} as {}", selection.filename, file.id);
        file_ids.push(file.id);
        report.uploaded.push(selection.filename);
    }

    let batch = provider.create_file_batch(vector_store_id, &file_ids).await?;
    let batch_id = batch.id.clone();
    let outcome = if batch.is_settled() {
        PollOutcome::Ready(batch)
    } else {
        poll_until(
            policy,
            cancel,
            || provider.retrieve_file_batch(vector_store_id, &batch_id),
            |b| b.is_settled(),
        )
        .await?
    };

    report.batch = Some(match outcome {
        PollOutcome::Ready(batch) => BatchResult::Settled(batch),
        PollOutcome::TimedOut => BatchResult::TimedOut,
        PollOutcome::Cancelled => BatchResult::Cancelled,
    });
    Ok(report)
}

/// Detaches `file_id` from the vector store; with `purge` also deletes it from storage.
pub async fn delete_file(
    provider: &dyn Provider,
    vector_store_id: &str,
    file_id: &str,
    purge: bool,
) -> Result<()> {
    provider
        .delete_vector_store_file(vector_store_id, file_id)
        .await?;
    log::info!("Removed {} from vector store {}", file_id, vector_store_id);
    if purge {
        provider.delete_file(file_id).await?;
        log::info!("Deleted {} from file storage", file_id);
    }
    Ok(())
}

/// Finds the attached file id for `id_or_name`, matching ids first, then filenames.
pub async fn resolve_file(
    provider: &dyn Provider,
    vector_store_id: &str,
    id_or_name: &str,
) -> Result<ListedFile> {
    let files = list_files(provider, vector_store_id).await?;
    files
        .iter()
        .find(|f| f.id == id_or_name)
        .or_else(|| files.iter().find(|f| f.filename == id_or_name))
        .cloned()
        .ok_or_else(|| Error::NotFound(id_or_name.to_string()))
}
