// fetch-core - Media Fetch Core
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Per-invocation working directory
//!
//! The directory is created once per attempt and removed on drop unless
//! [`WorkingDir::keep`] was called. Strategies declare the guard before the
//! destination file so the file handle is always closed first.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct WorkingDir {
    path: PathBuf,
    keep: bool,
}

impl WorkingDir {
    /// Create `<root>/<uuid>`, creating `root` as needed
    pub async fn create(root: &Path) -> Result<Self> {
        let path = root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&path).await?;
        debug!(dir = %path.display(), "created working directory");

        Ok(Self { path, keep: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of an entry inside the directory
    pub fn join<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.path.join(name)
    }

    /// Hand the directory over; it will not be removed
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for WorkingDir {
    fn drop(&mut self) {
        if self.keep {
            return;
        }

        // Cleanup failures are logged only; the caller already has the real error.
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(dir = %self.path.display(), "removed working directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                dir = %self.path.display(),
                error = %e,
                "failed to remove working directory"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let dir = WorkingDir::create(root.path()).await.unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(dir.join("partial.bin"), b"partial").unwrap();
        assert!(path.is_dir());

        drop(dir);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_keep_survives_drop() {
        let root = tempfile::tempdir().unwrap();
        let dir = WorkingDir::create(root.path()).await.unwrap();
        std::fs::write(dir.join("media.mp4"), b"media").unwrap();

        let kept = dir.keep();
        assert!(kept.join("media.mp4").is_file());
        assert!(kept.starts_with(root.path()));
    }

    #[tokio::test]
    async fn test_creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        let dir = WorkingDir::create(&nested).await.unwrap();
        assert!(dir.path().starts_with(&nested));
        assert!(dir.path().is_dir());
    }

    #[tokio::test]
    async fn test_distinct_per_attempt() {
        let root = tempfile::tempdir().unwrap();
        let first = WorkingDir::create(root.path()).await.unwrap();
        let second = WorkingDir::create(root.path()).await.unwrap();
        assert_ne!(first.path(), second.path());
    }
}
