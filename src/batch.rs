//! Folder-level processing with per-file failure isolation

use crate::config::StagingConfig;
use crate::error::{Result, StagingError};
use crate::pipeline::{self, NightAnalysis, StagingResult};
use log::{info, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Result of staging one input file
#[derive(Debug)]
pub enum FileOutcome {
    Processed {
        file_name: String,
        path: PathBuf,
        analysis: NightAnalysis,
    },
    Failed {
        file_name: String,
        path: PathBuf,
        error: StagingError,
    },
}

impl FileOutcome {
    pub fn file_name(&self) -> &str {
        match self {
            FileOutcome::Processed { file_name, .. } | FileOutcome::Failed { file_name, .. } => {
                file_name
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Processed { path, .. } | FileOutcome::Failed { path, .. } => path,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Collect the CSV files under `folder` in name order
pub fn find_csv_files(folder: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(folder).max_depth(max_depth).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && is_csv(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

pub struct FolderProcessor {
    folder: PathBuf,
    config: StagingConfig,
    recursive: bool,
    outcomes: Vec<FileOutcome>,
}

impl FolderProcessor {
    pub fn new(folder: impl Into<PathBuf>, config: StagingConfig) -> Self {
        FolderProcessor {
            folder: folder.into(),
            config,
            recursive: false,
            outcomes: Vec::new(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Stage every CSV in the folder; a failing file is recorded and skipped
    pub fn process_all_files(&mut self) -> Result<()> {
        let files = find_csv_files(&self.folder, self.recursive)?;
        info!("Found {} CSV files in {}", files.len(), self.folder.display());

        for path in files {
            self.outcomes.push(process_path(&path, &self.config));
        }
        Ok(())
    }

    pub fn outcomes(&self) -> &[FileOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<FileOutcome> {
        self.outcomes
    }

    /// `(file_name, uncorrected, corrected)` for every file that staged
    pub fn results(&self) -> Vec<(&str, &StagingResult, &StagingResult)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                FileOutcome::Processed {
                    file_name,
                    analysis,
                    ..
                } => Some((
                    file_name.as_str(),
                    &analysis.uncorrected,
                    &analysis.corrected,
                )),
                FileOutcome::Failed { .. } => None,
            })
            .collect()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

/// Stage a single file, capturing any failure in the outcome
pub fn process_path(path: &Path, config: &StagingConfig) -> FileOutcome {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    info!("Processing {}", path.display());
    match pipeline::process_file(path, config) {
        Ok(analysis) => FileOutcome::Processed {
            file_name,
            path: path.to_path_buf(),
            analysis,
        },
        Err(error) => {
            warn!("Skipping {}: {}", file_name, error);
            FileOutcome::Failed {
                file_name,
                path: path.to_path_buf(),
                error,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_folder_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_csv_files(&dir.path().join("absent"), false).unwrap_err();
        match err {
            StagingError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn only_csv_files_are_collected_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.csv", "a.CSV", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let files = find_csv_files(dir.path(), false).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
    }
}
