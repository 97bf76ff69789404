//! Filesystem-backed `RepositoryFiles`.
//!
//! Each repository is a checkout at `{root}/{repository_id}`. Paths handed in
//! by callers are relative to that checkout and may not escape it.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::StoreError;

use super::traits::RepositoryFiles;

/// Directories never searched for Markdown sources.
pub const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".github",
    "dist",
    "build",
    ".next",
    "vendor",
    "__pycache__",
    "translations",
];

/// Local checkouts under one root directory.
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn repo_dir(&self, repository_id: &str) -> Result<PathBuf, StoreError> {
        if repository_id.is_empty()
            || repository_id == "."
            || repository_id == ".."
            || repository_id.contains(['/', '\\'])
        {
            return Err(StoreError::InvalidPath(format!("repository id {repository_id:?}")));
        }
        Ok(self.root.join(repository_id))
    }

    /// Resolve a repository-relative path, rejecting anything that could leave
    /// the checkout.
    fn resolve_path(&self, repository_id: &str, relative: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(relative);
        let safe = !relative.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(StoreError::InvalidPath(relative.to_string()));
        }
        Ok(self.repo_dir(repository_id)?.join(rel))
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
}

/// `/`-joined path of `path` relative to `base`.
fn relative_slash_path(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl RepositoryFiles for LocalWorkspace {
    async fn list_markdown_files(&self, repository_id: &str) -> Result<Vec<String>, StoreError> {
        let base = self.repo_dir(repository_id)?;
        if !fs::try_exists(&base).await? {
            return Err(StoreError::NotFound {
                entity: "repository".to_string(),
                id: repository_id.to_string(),
            });
        }

        let mut files = Vec::new();
        let mut stack = vec![base.clone()];

        while let Some(dir) = stack.pop() {
            let mut read_dir = fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    let name = entry.file_name();
                    if !SKIPPED_DIRS.contains(&name.to_string_lossy().as_ref()) {
                        stack.push(path);
                    }
                } else if file_type.is_file() && is_markdown(&path) {
                    files.push(relative_slash_path(&base, &path));
                }
            }
        }

        files.sort();
        debug!(repository_id, count = files.len(), "Listed markdown files");
        Ok(files)
    }

    async fn read_file(&self, repository_id: &str, path: &str) -> Result<String, StoreError> {
        let full_path = self.resolve_path(repository_id, path)?;
        match fs::read_to_string(&full_path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                entity: "file".to_string(),
                id: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, repository_id: &str, path: &str, content: &str) -> Result<(), StoreError> {
        let full_path = self.resolve_path(repository_id, path)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full_path, content).await?;
        Ok(())
    }
}
