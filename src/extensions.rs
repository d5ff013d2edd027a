//! File extension allow-lists.
//!
//! Folder indexing and interactive uploads use different lists. They are
//! kept separate on purpose: the upload list is not a subset check of the
//! indexing list, it is its own policy.

use std::path::Path;

/// Extensions accepted when indexing the document folder.
pub const INDEX_EXTENSIONS: [&str; 30] = [
    ".c", ".cpp", ".css", ".csv", ".doc", ".docx", ".gif", ".go", ".html", ".java", ".jpeg",
    ".jpg", ".js", ".json", ".md", ".pdf", ".php", ".pkl", ".png", ".pptx", ".py", ".rb", ".tar",
    ".tex", ".ts", ".txt", ".webp", ".xlsx", ".xml", ".zip",
];

/// Extensions accepted from the sidebar uploader.
pub const UPLOAD_EXTENSIONS: [&str; 6] = [".pdf", ".docx", ".txt", ".md", ".csv", ".json"];

/// Lowercased extension of `path` with its leading dot, if it has one.
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

pub fn is_indexable(path: &Path) -> bool {
    matches_list(path, &INDEX_EXTENSIONS)
}

pub fn is_uploadable(name: &str) -> bool {
    matches_list(Path::new(name), &UPLOAD_EXTENSIONS)
}

fn matches_list(path: &Path, list: &[&str]) -> bool {
    lowercase_extension(path)
        .map(|ext| list.contains(&ext.as_str()))
        .unwrap_or(false)
}
