//! Temporary firmware images.

use std::path::{Path, PathBuf};

/// File in a private temporary directory, removed on drop.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    /// Create `name` holding `len` bytes of a repeating `0..251` pattern.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    #[must_use]
    pub fn with_len(name: &str, len: usize) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "osclink-{}",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join(name);
        let contents: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, contents).expect("write temp file");
        Self { path }
    }

    /// Location of the file.
    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    /// Owned copy of the location.
    #[must_use]
    pub fn path_buf(&self) -> PathBuf { self.path.clone() }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(dir) = self.path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
