//! Directory of JSON batch files.
//!
//! Each batch becomes `{entity}_{start}-{end}_{YYYYMMDD_HHMMSS}.json`, a pretty
//! printed array of records. Files are written under a hidden temporary name
//! and renamed into place, so a batch file that exists is always complete.
//! Completed entities get a `{entity}_manifest.json` listing their batches.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info, instrument};

use super::{Batch, BatchSink, EndOfData, SinkError};

/// Suffix of per-entity manifest files.
pub(crate) const MANIFEST_SUFFIX: &str = "_manifest.json";

/// Renders `YYYYMMDD_HHMMSS`.
fn file_stamp(at: OffsetDateTime) -> String {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    at.format(format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[derive(Serialize)]
struct Manifest<'a> {
    #[serde(flatten)]
    end: &'a EndOfData,
    batches: &'a [String],
    finished_at: String,
}

/// Writes batches as JSON files into one directory.
#[derive(Debug)]
pub struct JsonDirSink {
    dir: PathBuf,
    written: HashMap<String, Vec<String>>,
}

impl JsonDirSink {
    /// Creates the sink, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the directory cannot be created.
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SinkError::io(&dir, e))?;
        debug!(dir = %dir.display(), "batch directory ready");
        Ok(Self {
            dir,
            written: HashMap::new(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Batch files written so far for `entity`.
    #[must_use]
    pub fn files_for(&self, entity: &str) -> &[String] {
        self.written.get(entity).map_or(&[], Vec::as_slice)
    }
}

/// File name of a batch.
#[must_use]
pub fn batch_file_name(batch: &Batch) -> String {
    let stamp = file_stamp(batch.timestamp());
    format!("{}_{}_{stamp}.json", batch.entity(), batch.range())
}

/// Writes `bytes` to `path` through a temporary sibling and a rename.
pub(crate) async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    if let Err(e) = tokio::fs::write(&temp, bytes).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(SinkError::io(temp, e));
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(SinkError::io(path, e));
    }
    Ok(())
}

#[async_trait]
impl BatchSink for JsonDirSink {
    #[instrument(skip(self, batch), fields(entity = batch.entity(), range = %batch.range()))]
    async fn emit(&mut self, batch: Batch) -> Result<(), SinkError> {
        let name = batch_file_name(&batch);
        let path = self.dir.join(&name);
        let bytes = serde_json::to_vec_pretty(batch.records())
            .map_err(|e| SinkError::serialize(&path, e))?;
        write_atomically(&path, &bytes).await?;
        info!(path = %path.display(), records = batch.len(), "batch written");
        self.written
            .entry(batch.entity().to_string())
            .or_default()
            .push(name);
        Ok(())
    }

    #[instrument(skip(self, end), fields(entity = %end.entity))]
    async fn finish(&mut self, end: EndOfData) -> Result<(), SinkError> {
        let path = self.dir.join(format!("{}{MANIFEST_SUFFIX}", end.entity));
        let batches = self.written.remove(&end.entity).unwrap_or_default();
        let finished_at = file_stamp(OffsetDateTime::now_utc());
        let manifest = Manifest {
            end: &end,
            batches: &batches,
            finished_at,
        };
        let bytes =
            serde_json::to_vec_pretty(&manifest).map_err(|e| SinkError::serialize(&path, e))?;
        write_atomically(&path, &bytes).await?;
        debug!(path = %path.display(), total = end.total, "manifest written");
        Ok(())
    }
}
