//! Document folder indexing.
//!
//! Scans the configured folder (top level only), uploads every file whose
//! extension is in [`INDEX_EXTENSIONS`](crate::extensions::INDEX_EXTENSIONS),
//! and creates one vector store over all uploaded handles.
//!
//! A failed upload aborts the whole pass. Files uploaded earlier in the same
//! pass stay in provider storage and no vector store is created.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::extensions::{is_indexable, lowercase_extension};
use crate::models::{DocumentRef, RemoteFile, VectorStore};
use crate::provider::Provider;

/// Result of one indexing pass.
#[derive(Debug, Clone)]
pub struct IndexReport {
    pub vector_store: VectorStore,
    pub uploaded: Vec<RemoteFile>,
    pub skipped: Vec<PathBuf>,
}

/// Iterates regular files directly under `directory`.
///
/// The iterator is lazy; call again to rescan. Entries are yielded in file
/// name order.
pub fn scan(directory: &Path) -> Result<impl Iterator<Item = Result<PathBuf>>> {
    if !directory.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("document folder does not exist: {}", directory.display()),
        )));
    }

    let walker = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    Ok(walker.into_iter().filter_map(|entry| match entry {
        Ok(entry) if entry.file_type().is_file() => Some(Ok(entry.into_path())),
        Ok(_) => None,
        Err(e) => Some(Err(Error::Io(e.into()))),
    }))
}

/// Accepts `path` for indexing or reports it as unsupported.
pub fn classify(path: &Path) -> Result<DocumentRef> {
    match lowercase_extension(path) {
        Some(extension) if is_indexable(path) => Ok(DocumentRef {
            path: path.to_path_buf(),
            extension,
        }),
        _ => Err(Error::UnsupportedFile {
            path: path.to_path_buf(),
        }),
    }
}

/// Uploads every supported file in `directory` and creates a vector store named `store_name`.
pub async fn index_folder(
    provider: &dyn Provider,
    directory: &Path,
    store_name: &str,
) -> Result<IndexReport> {
    let mut uploaded = Vec::new();
    let mut skipped = Vec::new();

    for path in scan(directory)? {
        let path = path?;
        let doc = match classify(&path) {
            Ok(doc) => doc,
            Err(Error::UnsupportedFile { path }) => {
                log::info!(
                    "Skipped unsupported file: {}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                );
                skipped.push(path);
                continue;
            }
            Err(e) => return Err(e),
        };

        let bytes = tokio::fs::read(&doc.path).await?;
        let file = provider.upload_file(&doc.file_name(), bytes).await?;
        log::info!("Uploaded {} as {}", doc.file_name(), file.id);
        uploaded.push(file);
    }

    let file_ids: Vec<String> = uploaded.iter().map(|f| f.id.clone()).collect();
    let vector_store = provider.create_vector_store(store_name, &file_ids).await?;
    log::info!(
        "Created vector store {} with {} file(s), skipped {}",
        vector_store.id,
        file_ids.len(),
        skipped.len()
    );

    Ok(IndexReport {
        vector_store,
        uploaded,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Call, MemoryProvider};
    use std::fs;
    use tempfile::TempDir;

    fn folder(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for name in files {
            fs::write(tmp.path().join(name), format!("contents of {}", name)).unwrap();
        }
        tmp
    }

    #[test]
    fn scan_is_top_level_only_and_restartable() {
        let tmp = folder(&["b.md", "a.pdf"]);
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("deep.md"), "x").unwrap();

        let names = |dir: &Path| -> Vec<String> {
            scan(dir)
                .unwrap()
                .map(|p| p.unwrap().file_name().unwrap().to_string_lossy().to_string())
                .collect()
        };
        assert_eq!(names(tmp.path()), vec!["a.pdf", "b.md"]);
        assert_eq!(names(tmp.path()), vec!["a.pdf", "b.md"]);
    }

    #[test]
    fn scan_missing_folder_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = scan(&tmp.path().join("nope"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn classify_lowercases_extension() {
        let doc = classify(Path::new("/docs/Policy.PDF")).unwrap();
        assert_eq!(doc.extension, ".pdf");
        assert_eq!(doc.file_name(), "Policy.PDF");
        assert!(matches!(
            classify(Path::new("/docs/b.xyz")),
            Err(Error::UnsupportedFile { .. })
        ));
    }

    #[tokio::test]
    async fn uploads_supported_and_skips_the_rest() {
        let tmp = folder(&["a.pdf", "b.xyz", "c.md"]);
        let provider = MemoryProvider::new();

        let report = index_folder(&provider, tmp.path(), "Docs").await.unwrap();

        let uploaded: Vec<&str> = report.uploaded.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(uploaded, vec!["a.pdf", "c.md"]);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].ends_with("b.xyz"));

        let calls = provider.calls();
        assert!(!calls.contains(&Call::UploadFile("b.xyz".to_string())));
        let stores: Vec<&Call> = calls
            .iter()
            .filter(|c| matches!(c, Call::CreateVectorStore { .. }))
            .collect();
        assert_eq!(stores.len(), 1);
        match stores[0] {
            Call::CreateVectorStore { name, file_ids } => {
                assert_eq!(name, "Docs");
                assert_eq!(file_ids.len(), 2);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn failed_upload_aborts_before_vector_store() {
        let tmp = folder(&["a.pdf", "b.md", "c.txt"]);
        let provider = MemoryProvider::new().fail_upload_of("b.md");

        let err = index_folder(&provider, tmp.path(), "Docs").await.unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));

        let calls = provider.calls();
        assert_eq!(
            calls,
            vec![
                Call::UploadFile("a.pdf".to_string()),
                Call::UploadFile("b.md".to_string()),
            ]
        );
    }
}
