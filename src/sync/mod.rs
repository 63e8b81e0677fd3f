//! Sync engine: moves memory between machines through a repository-local
//! directory, so history can travel alongside the code it documents.
//!
//! Export writes gzipped, content-addressed `ExportData` chunks under
//! `<repo>/.engram/`; import enumerates those chunks and applies any this
//! database has not already seen. Dedup rides entirely on the chunk id — a
//! `SHA-256` digest of the serialized payload — recorded in the store's
//! `sync_chunks` table, so exporting identical data twice produces the same
//! id and the second call is a no-op.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::storage::{ExportData, Store};
use crate::{Error, Result};

const SYNC_DIR_NAME: &str = ".engram";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    chunk_ids: Vec<String>,
}

/// Result of [`SyncEngine::status`].
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Chunk ids this database has recorded, from `sync_chunks`.
    pub local_chunk_count: i64,
    /// Chunk ids listed in the on-disk manifest.
    pub remote_chunk_count: usize,
    /// On-disk chunks not yet recorded locally.
    pub pending_import_count: usize,
}

/// Result of [`SyncEngine::export`].
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// `true` if the delta was empty (nothing written) or this exact
    /// payload was already exported once before.
    pub is_empty: bool,
    /// The chunk id, present even when `is_empty` because the payload
    /// matched an already-recorded chunk.
    pub chunk_id: Option<String>,
    /// Number of sessions included in the chunk.
    pub sessions_exported: usize,
    /// Number of observations included in the chunk.
    pub observations_exported: usize,
    /// Number of prompts included in the chunk.
    pub prompts_exported: usize,
}

/// Result of [`SyncEngine::import`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Number of chunks newly applied.
    pub chunks_imported: usize,
    /// Number of chunks already recorded, skipped without reading.
    pub chunks_skipped: usize,
    /// Sessions inserted across all applied chunks.
    pub sessions_imported: usize,
    /// Observations inserted across all applied chunks.
    pub observations_imported: usize,
    /// Prompts inserted across all applied chunks.
    pub prompts_imported: usize,
}

/// Drives export/import of a store's memory through `<repo>/.engram/`.
pub struct SyncEngine {
    sync_dir: PathBuf,
}

impl SyncEngine {
    /// Creates a sync engine rooted at `<repo_dir>/.engram`.
    #[must_use]
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            sync_dir: repo_dir.as_ref().join(SYNC_DIR_NAME),
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.sync_dir.join("manifest.json")
    }

    fn chunks_dir(&self) -> PathBuf {
        self.sync_dir.join("chunks")
    }

    fn chunk_path(&self, chunk_id: &str) -> PathBuf {
        self.chunks_dir().join(format!("{chunk_id}.json.gz"))
    }

    fn read_manifest(&self) -> Result<Manifest> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(Manifest::default());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| Error::InvalidInput(e.to_string()))
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        fs::create_dir_all(&self.sync_dir)?;
        let content = serde_json::to_string_pretty(manifest)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        fs::write(self.manifest_path(), content)?;
        Ok(())
    }

    /// Reports local chunk count (from `sync_chunks`), remote chunk count
    /// (chunks listed in the manifest), and chunks on disk not yet recorded
    /// locally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] or [`Error::Io`] if bookkeeping cannot be
    /// read.
    pub fn status(&self, store: &Store) -> Result<SyncStatus> {
        let local_chunk_count = store.synced_chunk_count()?;
        let manifest = self.read_manifest()?;
        let remote_chunk_count = manifest.chunk_ids.len();

        let mut pending_import_count = 0;
        for chunk_id in &manifest.chunk_ids {
            if !store.has_synced_chunk(chunk_id)? {
                pending_import_count += 1;
            }
        }

        Ok(SyncStatus {
            local_chunk_count,
            remote_chunk_count,
            pending_import_count,
        })
    }

    /// Exports the subset of the store matching `project`, or everything
    /// when `project` is `None` (the `--all` toggle). If the delta is empty,
    /// or hashes to a chunk id already recorded, nothing is written and
    /// `is_empty` is `true`.
    ///
    /// `username` attributes the export for operator-facing reporting; it
    /// does not filter the data, since the data model has no per-row owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] or [`Error::Io`] if the store or
    /// filesystem cannot be read or written.
    pub fn export(&self, store: &Store, _username: &str, project: Option<&str>) -> Result<ExportReport> {
        let data = store.export_filtered(project)?;
        if data.sessions.is_empty() && data.observations.is_empty() && data.prompts.is_empty() {
            return Ok(ExportReport {
                is_empty: true,
                chunk_id: None,
                sessions_exported: 0,
                observations_exported: 0,
                prompts_exported: 0,
            });
        }

        let payload = serde_json::to_vec(&data).map_err(|e| Error::InvalidInput(e.to_string()))?;
        let chunk_id = content_hash(&data);

        if store.has_synced_chunk(&chunk_id)? {
            return Ok(ExportReport {
                is_empty: true,
                chunk_id: Some(chunk_id),
                sessions_exported: 0,
                observations_exported: 0,
                prompts_exported: 0,
            });
        }

        fs::create_dir_all(self.chunks_dir())?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload)?;
        let compressed = encoder.finish()?;
        fs::write(self.chunk_path(&chunk_id), compressed)?;

        let mut manifest = self.read_manifest()?;
        if !manifest.chunk_ids.contains(&chunk_id) {
            manifest.chunk_ids.push(chunk_id.clone());
        }
        self.write_manifest(&manifest)?;
        store.record_synced_chunk(&chunk_id)?;

        Ok(ExportReport {
            is_empty: false,
            chunk_id: Some(chunk_id),
            sessions_exported: data.sessions.len(),
            observations_exported: data.observations.len(),
            prompts_exported: data.prompts.len(),
        })
    }

    /// Applies every manifest chunk this store has not already recorded, in
    /// manifest order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] or [`Error::Io`] if a chunk cannot be read,
    /// decompressed, parsed, or applied.
    pub fn import(&self, store: &Store) -> Result<ImportReport> {
        let manifest = self.read_manifest()?;
        let mut report = ImportReport::default();

        for chunk_id in &manifest.chunk_ids {
            if store.has_synced_chunk(chunk_id)? {
                report.chunks_skipped += 1;
                continue;
            }

            let compressed = fs::read(self.chunk_path(chunk_id))?;
            let mut decoder = GzDecoder::new(compressed.as_slice());
            let mut payload = String::new();
            decoder.read_to_string(&mut payload)?;
            let data: ExportData =
                serde_json::from_str(&payload).map_err(|e| Error::InvalidInput(e.to_string()))?;

            let stats = store.import(&data)?;
            store.record_synced_chunk(chunk_id)?;

            report.chunks_imported += 1;
            report.sessions_imported += stats.sessions_imported;
            report.observations_imported += stats.observations_imported;
            report.prompts_imported += stats.prompts_imported;
        }

        Ok(report)
    }
}

/// Hashes only the content-bearing fields of an export — sessions,
/// observations, prompts — excluding `exported_at` and `version`, so that
/// re-exporting byte-identical underlying data always produces the same
/// chunk id regardless of when the export ran.
fn content_hash(data: &ExportData) -> String {
    #[derive(Serialize)]
    struct Canonical<'a> {
        sessions: &'a [crate::storage::Session],
        observations: &'a [crate::storage::Observation],
        prompts: &'a [crate::storage::Prompt],
    }
    let canonical = Canonical {
        sessions: &data.sessions,
        observations: &data.observations,
        prompts: &data.prompts,
    };
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}
