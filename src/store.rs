use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

/// Base directory for uploaded files: `~/.sentinel-qa/uploads`
pub fn uploads_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sentinel-qa")
        .join("uploads")
}

/// Reduce an uploaded filename to its final path component so it cannot escape the store.
/// Returns `None` for names with nothing usable left (e.g. `..` or an empty string).
pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name).trim();
    if last.is_empty() || last == "." || last == ".." {
        None
    } else {
        Some(last.to_string())
    }
}

// ── ContentStore ────────────────────────────────────────────────────────────

/// Flat file store for uploads, keyed by original filename.
#[derive(Debug, Clone)]
pub struct ContentStore {
    base: PathBuf,
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore {
    pub fn new() -> Self {
        Self {
            base: uploads_dir(),
        }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Write an upload to disk, replacing any earlier file with the same name.
    /// Returns the path written.
    pub fn save(&self, filename: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.path_for(filename)?;
        fs::create_dir_all(&self.base)
            .with_context(|| format!("Failed to create upload dir {}", self.base.display()))?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), bytes = content.len(), "upload saved");
        Ok(path)
    }

    /// Read a previously saved upload as UTF-8 text (invalid sequences are replaced).
    pub fn read(&self, filename: &str) -> anyhow::Result<String> {
        let path = self.path_for(filename)?;
        let bytes = fs::read(&path)
            .map_err(|_| anyhow::anyhow!("Upload '{}' not found", filename))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.path_for(filename)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// List stored filenames, sorted.
    pub fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.base.exists() {
            return Ok(names);
        }

        for entry in fs::read_dir(&self.base)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        names.sort();
        Ok(names)
    }

    fn path_for(&self, filename: &str) -> anyhow::Result<PathBuf> {
        let name = sanitize_filename(filename)
            .with_context(|| format!("Invalid upload filename '{filename}'"))?;
        Ok(self.base.join(name))
    }
}
