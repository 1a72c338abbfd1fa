//! Merging emitted batch files into one deduplicated file.
//!
//! Reads every `*.json` batch in a directory in name order, concatenates
//! their records and drops repeated ids with [`merge`]. Manifests and
//! temporary files are ignored. A file that cannot be read or parsed is
//! logged and skipped; the rest are still combined.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::dedupe::merge;
use crate::emit::{MANIFEST_SUFFIX, SinkError, write_atomically};
use crate::model::Record;

/// Errors raised while combining batch files.
#[derive(Debug, Error)]
pub enum CombineError {
    /// A directory or file could not be read.
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A batch file is not a JSON array of records.
    #[error("invalid batch file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The combined output could not be written.
    #[error(transparent)]
    Write(#[from] SinkError),
}

impl CombineError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of a combine pass.
#[derive(Debug, Default)]
pub struct CombineReport {
    /// Batch files successfully read.
    pub files_read: usize,
    /// Files that were skipped, with the reason.
    pub skipped: Vec<CombineError>,
    /// Records read across all files.
    pub records_in: usize,
    /// Records written after deduplication.
    pub records_out: usize,
}

impl CombineReport {
    #[must_use]
    pub fn duplicates_removed(&self) -> usize {
        self.records_in - self.records_out
    }
}

fn is_batch_file(path: &Path, output: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    path.extension().is_some_and(|ext| ext == "json")
        && !name.starts_with('.')
        && !name.ends_with(MANIFEST_SUFFIX)
        && path != output
}

async fn read_batch(path: &Path) -> Result<Vec<Record>, CombineError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CombineError::io(path, e))?;
    serde_json::from_str(&content).map_err(|source| CombineError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Combines all batch files in `input_dir` into `output`.
///
/// # Errors
///
/// Returns [`CombineError::Io`] if `input_dir` cannot be listed and
/// [`CombineError::Write`] if `output` cannot be written. Individual bad
/// batch files are reported in [`CombineReport::skipped`].
#[instrument(skip_all, fields(input = %input_dir.display(), output = %output.display()))]
pub async fn combine(input_dir: &Path, output: &Path) -> Result<CombineReport, CombineError> {
    let mut entries = tokio::fs::read_dir(input_dir)
        .await
        .map_err(|e| CombineError::io(input_dir, e))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CombineError::io(input_dir, e))?
    {
        let path = entry.path();
        if is_batch_file(&path, output) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut report = CombineReport::default();
    let mut seen = HashSet::new();
    let mut combined = Vec::new();
    for path in paths {
        match read_batch(&path).await {
            Ok(records) => {
                report.files_read += 1;
                report.records_in += records.len();
                let (kept, updated) = merge(seen, records);
                seen = updated;
                combined.extend(kept);
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "skipping unreadable batch file");
                report.skipped.push(error);
            }
        }
    }
    report.records_out = combined.len();

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SinkError::io(parent, e))?;
    }
    let bytes = serde_json::to_vec_pretty(&combined).map_err(|e| SinkError::serialize(output, e))?;
    write_atomically(output, &bytes).await?;

    info!(
        files = report.files_read,
        skipped = report.skipped.len(),
        records = report.records_out,
        duplicates = report.duplicates_removed(),
        "combined batch files"
    );
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::tests::post;

    fn write_batch(dir: &Path, name: &str, ids: &[&str]) {
        let records: Vec<Record> = ids.iter().map(|id| Record::from(post(id))).collect();
        std::fs::write(dir.join(name), serde_json::to_vec(&records).unwrap()).unwrap();
    }

    fn output_ids(path: &Path) -> Vec<String> {
        let records: Vec<Record> =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        records.into_iter().map(|r| r.item.id).collect()
    }

    #[tokio::test]
    async fn test_combine_dedupes_in_file_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_batch(dir.path(), "rust_101-103_20240101_000000.json", &["c", "d", "a"]);
        write_batch(dir.path(), "rust_1-100_20240101_000000.json", &["a", "b"]);
        let output = dir.path().join("out/combined.json");

        let report = combine(dir.path(), &output).await.unwrap();

        assert_eq!(output_ids(&output), ["a", "b", "c", "d"]);
        assert_eq!(report.files_read, 2);
        assert_eq!(report.records_in, 5);
        assert_eq!(report.records_out, 4);
        assert_eq!(report.duplicates_removed(), 1);
    }

    #[tokio::test]
    async fn test_combine_skips_manifests_and_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        write_batch(dir.path(), "a_1-1_20240101_000000.json", &["x"]);
        std::fs::write(dir.path().join("a_manifest.json"), br#"{"entity":"a"}"#).unwrap();
        std::fs::write(dir.path().join("broken.json"), b"[{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        let output = dir.path().join("combined.json");

        let report = combine(dir.path(), &output).await.unwrap();

        assert_eq!(output_ids(&output), ["x"]);
        assert_eq!(report.files_read, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0], CombineError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_combine_rerun_ignores_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        write_batch(dir.path(), "a_1-2_20240101_000000.json", &["x", "y"]);
        let output = dir.path().join("combined.json");

        combine(dir.path(), &output).await.unwrap();
        let report = combine(dir.path(), &output).await.unwrap();

        assert_eq!(report.files_read, 1);
        assert_eq!(output_ids(&output), ["x", "y"]);
    }

    #[tokio::test]
    async fn test_combine_missing_input_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = combine(&dir.path().join("missing"), &dir.path().join("out.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, CombineError::Io { .. }));
    }
}
