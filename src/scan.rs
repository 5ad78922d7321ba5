use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Lists every regular file under a root, unfiltered by name or extension.
#[derive(Debug, Clone)]
pub struct FileEnumerator {
    root: PathBuf,
}

impl FileEnumerator {
    /// Fails when `root` does not exist or is not a directory.
    pub fn new(root: &Path) -> io::Result<Self> {
        let root = root.canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute paths of all files. Unreadable directories are logged and
    /// skipped.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(err) => log::warn!("skipping part of {}: {err}", self.root.display()),
            }
        }
        files
    }
}
