//! File and folder payloads for outbound transfers.
//!
//! A folder send flattens the directory tree into `(relative path, bytes)`
//! entries rooted at the folder's own name, e.g. `photos/2024/a.jpg`.

use crate::error::{ChatError, ChatResult};
use crate::types::FolderFile;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// A file ready to be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePayload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A flattened folder ready to be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderPayload {
    pub name: String,
    pub files: Vec<FolderFile>,
}

impl FolderPayload {
    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.bytes.len()).sum()
    }
}

/// Reads a single file from disk.
pub async fn read_file(path: &Path) -> ChatResult<FilePayload> {
    let filename = file_name(path)?;
    let bytes = tokio::fs::read(path).await?;
    Ok(FilePayload { filename, bytes })
}

/// Walks `root` and collects every regular file under it. An empty folder
/// yields an empty payload; the router rejects it.
pub async fn collect_folder(root: &Path) -> ChatResult<FolderPayload> {
    let name = file_name(root)?;
    let mut files = Vec::new();
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                let relative = relative_path(&name, root, &path)?;
                let bytes = tokio::fs::read(&path).await?;
                files.push(FolderFile {
                    relative_path: relative,
                    bytes,
                });
            }
        }
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    debug!("collected {} files from folder {name}", files.len());
    Ok(FolderPayload { name, files })
}

fn file_name(path: &Path) -> ChatResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ChatError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("path has no file name: {}", path.display()),
        )))
}

/// `root_name/sub/dir/file`, always with `/` separators.
fn relative_path(root_name: &str, root: &Path, path: &Path) -> ChatResult<String> {
    let rel = path.strip_prefix(root).map_err(|e| {
        ChatError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
    })?;
    let mut parts = vec![root_name.to_string()];
    for component in rel.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_string_lossy().into_owned());
        }
    }
    Ok(parts.join("/"))
}
