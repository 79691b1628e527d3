use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{domain::UserId, Result};

const METADATA_FILE: &str = "metadata.json";
const IMAGE_EXT: &str = "jpg";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Combined,
    Original,
    Transformed,
}

impl ImageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::Combined => "combined",
            ImageKind::Original => "original",
            ImageKind::Transformed => "transformed",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of `metadata.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub filename: String,
    pub timestamp: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub style: String,
    pub image_type: ImageKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub total_images: usize,
    pub unique_senders: usize,
    pub unique_receivers: usize,
    pub styles_used: BTreeSet<String>,
}

impl ArchiveStats {
    fn from_records(records: &[ImageRecord]) -> Self {
        let senders: BTreeSet<UserId> = records.iter().map(|r| r.sender_id).collect();
        let receivers: BTreeSet<UserId> = records.iter().map(|r| r.receiver_id).collect();
        Self {
            total_images: records.len(),
            unique_senders: senders.len(),
            unique_receivers: receivers.len(),
            styles_used: records.iter().map(|r| r.style.clone()).collect(),
        }
    }
}

/// Flat directory of generated images plus a JSON metadata log.
///
/// The log is rewritten in full on every save. Saves are serialized through
/// `write_lock` so concurrent relays cannot drop each other's records.
#[derive(Debug)]
pub struct ImageArchive {
    dir: PathBuf,
    metadata_path: PathBuf,
    write_lock: Mutex<()>,
}

impl ImageArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let metadata_path = dir.join(METADATA_FILE);
        Self {
            dir,
            metadata_path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    /// Store `image` and append its metadata record. Returns the written file path.
    pub fn save(
        &self,
        image: &[u8],
        sender: UserId,
        receiver: UserId,
        style: &str,
        kind: ImageKind,
    ) -> Result<PathBuf> {
        self.save_at(Local::now(), image, sender, receiver, style, kind)
    }

    pub fn save_at(
        &self,
        now: DateTime<Local>,
        image: &[u8],
        sender: UserId,
        receiver: UserId,
        style: &str,
        kind: ImageKind,
    ) -> Result<PathBuf> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        std::fs::create_dir_all(&self.dir)?;

        let stem = format!(
            "{}_sender{}_receiver{}_{}",
            now.format("%Y%m%d_%H%M%S"),
            sender,
            receiver,
            kind
        );
        let filename = self.unused_filename(&stem);
        let path = self.dir.join(&filename);
        std::fs::write(&path, image)?;

        let record = ImageRecord {
            filename,
            timestamp: now.to_rfc3339(),
            sender_id: sender,
            receiver_id: receiver,
            style: style.to_string(),
            image_type: kind,
        };
        if let Err(e) = self.append_record(record) {
            tracing::error!(
                path = %self.metadata_path.display(),
                error = %e,
                "failed to write image metadata"
            );
        }

        Ok(path)
    }

    /// Second-resolution names collide for back-to-back saves; suffix instead of overwriting.
    fn unused_filename(&self, stem: &str) -> String {
        let first = format!("{stem}.{IMAGE_EXT}");
        if !self.dir.join(&first).exists() {
            return first;
        }
        (1u32..)
            .map(|n| format!("{stem}-{n}.{IMAGE_EXT}"))
            .find(|name| !self.dir.join(name).exists())
            .unwrap_or(first)
    }

    fn append_record(&self, record: ImageRecord) -> Result<()> {
        let mut records = self.records();
        records.push(record);
        let txt = serde_json::to_string_pretty(&records)?;
        std::fs::write(&self.metadata_path, txt)?;
        Ok(())
    }

    pub fn try_records(&self) -> Result<Vec<ImageRecord>> {
        if !self.metadata_path.exists() {
            return Ok(Vec::new());
        }
        let txt = std::fs::read_to_string(&self.metadata_path)?;
        Ok(serde_json::from_str(&txt)?)
    }

    /// Metadata log with unreadable content treated as empty.
    pub fn records(&self) -> Vec<ImageRecord> {
        self.try_records().unwrap_or_else(|e| {
            tracing::warn!(
                path = %self.metadata_path.display(),
                error = %e,
                "image metadata unreadable; treating as empty"
            );
            Vec::new()
        })
    }

    /// Aggregates recomputed from the metadata log on every call.
    pub fn stats(&self) -> ArchiveStats {
        ArchiveStats::from_records(&self.records())
    }
}
