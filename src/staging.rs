//! Scratch staging of series members.
//!
//! Members of one series may live in different directories and share base
//! names, so they are exposed under sequential names inside a private
//! scratch directory. The directory disappears when the [`ScratchStage`] is
//! dropped, on every exit path.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const PROBE_NAME: &str = ".link-probe";

/// How member files are materialized in the scratch directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMethod {
    HardLink,
    Copy,
}

impl StageMethod {
    /// Tries a hard link of `sample` into `scratch`; falls back to copying
    /// when the filesystem or platform refuses.
    pub fn probe(scratch: &Path, sample: &Path) -> StageMethod {
        let probe = scratch.join(PROBE_NAME);
        match fs::hard_link(sample, &probe) {
            Ok(()) => {
                let _ = fs::remove_file(&probe);
                StageMethod::HardLink
            }
            Err(err) => {
                log::debug!(
                    "hard links unavailable in {} ({err}), copying series members",
                    scratch.display()
                );
                StageMethod::Copy
            }
        }
    }

    fn materialize(self, source: &Path, target: &Path) -> io::Result<()> {
        match self {
            StageMethod::HardLink => fs::hard_link(source, target).or_else(|err| {
                log::debug!("hard link of {} failed ({err}), copying", source.display());
                fs::copy(source, target).map(|_| ())
            }),
            StageMethod::Copy => fs::copy(source, target).map(|_| ()),
        }
    }
}

pub struct ScratchStage {
    dir: TempDir,
    method: StageMethod,
    /// Staged path to original path.
    originals: BTreeMap<PathBuf, PathBuf>,
    staged: Vec<PathBuf>,
}

impl ScratchStage {
    pub fn stage(files: &[PathBuf]) -> io::Result<Self> {
        Self::stage_in(files, &std::env::temp_dir())
    }

    /// Stages `files` into a fresh scratch directory under `parent`.
    pub fn stage_in(files: &[PathBuf], parent: &Path) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("imagesurvey-series-")
            .tempdir_in(parent)?;
        let method = match files.first() {
            Some(sample) => StageMethod::probe(dir.path(), sample),
            None => StageMethod::Copy,
        };

        let mut originals = BTreeMap::new();
        let mut staged = Vec::with_capacity(files.len());
        for (index, original) in files.iter().enumerate() {
            let target = dir.path().join(index.to_string());
            method.materialize(original, &target)?;
            originals.insert(target.clone(), original.clone());
            staged.push(target);
        }

        Ok(Self {
            dir,
            method,
            originals,
            staged,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn method(&self) -> StageMethod {
        self.method
    }

    /// Staged files in staging order.
    pub fn staged_files(&self) -> &[PathBuf] {
        &self.staged
    }

    pub fn original_of(&self, staged: &Path) -> Option<&Path> {
        self.originals.get(staged).map(PathBuf::as_path)
    }
}
