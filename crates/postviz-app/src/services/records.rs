//! Persistent per-item generation records.
//!
//! One record per content item, stored in LMDB. Every record carries a
//! version; a commit succeeds only when the stored version matches the
//! version the caller read, so concurrent writers surface a conflict instead
//! of silently overwriting each other.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bincode::config;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::{AppPaths, PathError};
use crate::pipeline::kinds::ArtifactKind;

const RECORD_ENV_MAP_SIZE_BYTES: usize = 1 << 28; // 256 MiB
const DATABASE_NAME: &str = "records";

/// Lifecycle state of one item's visualization run. `Pending` is the implicit
/// state of an identifier absent from the store and is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Generating => "generating",
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire encoding of a generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Png,
    Jpg,
    Other,
}

impl ImageEncoding {
    pub fn from_mime_type(mime_type: &str) -> Self {
        match mime_type {
            "image/png" => ImageEncoding::Png,
            "image/jpeg" | "image/jpg" => ImageEncoding::Jpg,
            _ => ImageEncoding::Other,
        }
    }
}

/// One uploaded visual asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub url: String,
    pub encoding: ImageEncoding,
    pub generated_at_ms: i64,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

/// Persisted status and artifact map for one content item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub item_id: String,
    pub slug: String,
    pub status: RecordStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub artifacts: BTreeMap<ArtifactKind, Artifact>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    /// Commit counter for optimistic concurrency; 0 until first persisted.
    #[serde(default)]
    pub version: u64,
}

impl GenerationRecord {
    #[must_use]
    pub fn new(item_id: impl Into<String>, slug: impl Into<String>) -> Self {
        let item_id = item_id.into();
        debug_assert!(!item_id.is_empty());
        let now_ms = current_timestamp_ms();
        Self {
            item_id,
            slug: slug.into(),
            status: RecordStatus::Generating,
            error: None,
            artifacts: BTreeMap::new(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            version: 0,
        }
    }

    pub fn set_status(&mut self, status: RecordStatus, error: Option<String>) {
        debug_assert!(error.is_none() || status == RecordStatus::Failed);
        self.status = status;
        self.error = error;
        self.touch();
    }

    pub fn insert_artifact(&mut self, kind: ArtifactKind, artifact: Artifact) {
        self.artifacts.insert(kind, artifact);
        self.touch();
    }

    /// Bump the update timestamp, keeping it strictly increasing even when
    /// two mutations land inside the same millisecond.
    fn touch(&mut self) {
        self.updated_at_ms = current_timestamp_ms().max(self.updated_at_ms + 1);
    }
}

pub(crate) fn current_timestamp_ms() -> i64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    since_epoch.as_millis() as i64
}

/// Errors emitted by the record store.
#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Heed(#[from] heed::Error),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("record `{0}` not found")]
    NotFound(String),
    #[error("slug `{slug}` already belongs to record `{other}` (writing `{item_id}`)")]
    SlugConflict {
        slug: String,
        item_id: String,
        other: String,
    },
    #[error("version conflict on `{item_id}`: committed at {expected}, store has {found}")]
    VersionConflict {
        item_id: String,
        expected: u64,
        found: u64,
    },
}

/// LMDB-backed persistence for generation records.
#[derive(Debug)]
pub struct GenerationRecordStore {
    env: Env,
    records: Database<Str, Bytes>,
}

impl GenerationRecordStore {
    pub fn open(paths: &AppPaths) -> Result<Self, RecordStoreError> {
        let path = paths.records_lmdb_dir()?;
        debug_assert!(path.exists());

        let mut options = EnvOpenOptions::new();
        options.max_dbs(4);
        options.map_size(RECORD_ENV_MAP_SIZE_BYTES);
        let env = unsafe {
            // SAFETY: LMDB requires callers to uphold environment lifetime invariants.
            options.open(&path)?
        };
        let records = {
            let rtxn = env.read_txn()?;
            let opened = env.open_database::<Str, Bytes>(&rtxn, Some(DATABASE_NAME))?;
            drop(rtxn);
            match opened {
                Some(existing) => existing,
                None => {
                    let mut wtxn = env.write_txn()?;
                    let db = env.create_database::<Str, Bytes>(&mut wtxn, Some(DATABASE_NAME))?;
                    wtxn.commit()?;
                    db
                }
            }
        };
        Ok(Self { env, records })
    }

    pub fn get(&self, item_id: &str) -> Result<Option<GenerationRecord>, RecordStoreError> {
        debug_assert!(!item_id.is_empty());
        let rtxn = self.env.read_txn()?;
        let value = self.records.get(&rtxn, item_id)?;
        if let Some(raw) = value {
            let (record, _) = decode_from_slice::<GenerationRecord, _>(raw, config::standard())?;
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    /// Slug lookup used by presentation layers. Slugs are not indexed; this is
    /// a linear scan over the whole store.
    pub fn get_by_slug(&self, slug: &str) -> Result<Option<GenerationRecord>, RecordStoreError> {
        debug_assert!(!slug.is_empty());
        let rtxn = self.env.read_txn()?;
        let iter = self.records.iter(&rtxn)?;
        for entry in iter {
            let (_, raw) = entry?;
            let (record, _) = decode_from_slice::<GenerationRecord, _>(raw, config::standard())?;
            if record.slug == slug {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Version-checked upsert.
    ///
    /// A record read at version N commits only while the store still holds
    /// version N (0 meaning "absent"); the persisted copy is returned with
    /// its version incremented and its update timestamp bumped. Slug
    /// uniqueness across records is enforced in the same transaction.
    pub fn commit(
        &self,
        record: &GenerationRecord,
    ) -> Result<GenerationRecord, RecordStoreError> {
        debug_assert!(!record.item_id.is_empty());
        let mut wtxn = self.env.write_txn()?;

        let found = match self.records.get(&wtxn, record.item_id.as_str())? {
            Some(raw) => {
                let (existing, _) =
                    decode_from_slice::<GenerationRecord, _>(raw, config::standard())?;
                existing.version
            }
            None => 0,
        };
        if found != record.version {
            return Err(RecordStoreError::VersionConflict {
                item_id: record.item_id.clone(),
                expected: record.version,
                found,
            });
        }

        // Slug uniqueness across all records at write time.
        {
            let iter = self.records.iter(&wtxn)?;
            for entry in iter {
                let (key, raw) = entry?;
                if key == record.item_id {
                    continue;
                }
                let (other, _) = decode_from_slice::<GenerationRecord, _>(raw, config::standard())?;
                if other.slug == record.slug {
                    return Err(RecordStoreError::SlugConflict {
                        slug: record.slug.clone(),
                        item_id: record.item_id.clone(),
                        other: other.item_id,
                    });
                }
            }
        }

        let mut persisted = record.clone();
        persisted.version = found + 1;
        persisted.updated_at_ms = current_timestamp_ms().max(record.updated_at_ms.max(0) + 1);

        let encoded = encode_to_vec(&persisted, config::standard())?;
        self.records
            .put(&mut wtxn, persisted.item_id.as_str(), encoded.as_slice())?;
        wtxn.commit()?;
        Ok(persisted)
    }

    /// Bounded read-modify-write loop around [`Self::commit`]; reapplies the
    /// mutation after a version conflict.
    pub fn modify<F>(
        &self,
        item_id: &str,
        max_attempts: u32,
        mut mutate: F,
    ) -> Result<GenerationRecord, RecordStoreError>
    where
        F: FnMut(&mut GenerationRecord),
    {
        debug_assert!(max_attempts > 0);
        let mut attempt = 0;
        loop {
            let mut record = self
                .get(item_id)?
                .ok_or_else(|| RecordStoreError::NotFound(item_id.to_string()))?;
            mutate(&mut record);
            match self.commit(&record) {
                Ok(persisted) => return Ok(persisted),
                Err(RecordStoreError::VersionConflict { .. }) if attempt + 1 < max_attempts => {
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    pub fn list(&self) -> Result<Vec<GenerationRecord>, RecordStoreError> {
        let rtxn = self.env.read_txn()?;
        let iter = self.records.iter(&rtxn)?;
        let mut out = Vec::new();
        for entry in iter {
            let (_, raw) = entry?;
            let (record, _) = decode_from_slice::<GenerationRecord, _>(raw, config::standard())?;
            out.push(record);
        }
        Ok(out)
    }

    pub fn remove(&self, item_id: &str) -> Result<bool, RecordStoreError> {
        debug_assert!(!item_id.is_empty());
        let mut wtxn = self.env.write_txn()?;
        let removed = self.records.delete(&mut wtxn, item_id)?;
        wtxn.commit()?;
        Ok(removed)
    }

    pub fn count_by_status(&self, status: RecordStatus) -> Result<usize, RecordStoreError> {
        let rtxn = self.env.read_txn()?;
        let iter = self.records.iter(&rtxn)?;
        let mut count = 0_usize;
        for entry in iter {
            let (_, raw) = entry?;
            let (record, _) = decode_from_slice::<GenerationRecord, _>(raw, config::standard())?;
            if record.status == status {
                count = count.saturating_add(1);
            }
        }
        Ok(count)
    }

    /// Records in the given status not updated within the age threshold.
    pub fn list_stuck(
        &self,
        status: RecordStatus,
        age_threshold_ms: i64,
    ) -> Result<Vec<GenerationRecord>, RecordStoreError> {
        debug_assert!(age_threshold_ms > 0);
        let cutoff_ms = current_timestamp_ms().saturating_sub(age_threshold_ms);

        let rtxn = self.env.read_txn()?;
        let iter = self.records.iter(&rtxn)?;
        let mut out = Vec::new();
        for entry in iter {
            let (_, raw) = entry?;
            let (record, _) = decode_from_slice::<GenerationRecord, _>(raw, config::standard())?;
            if record.status == status && record.updated_at_ms <= cutoff_ms {
                out.push(record);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(temp: &TempDir) -> GenerationRecordStore {
        let paths = AppPaths::new(temp.path()).expect("paths");
        GenerationRecordStore::open(&paths).expect("open store")
    }

    fn artifact(url: &str) -> Artifact {
        Artifact {
            url: url.to_string(),
            encoding: ImageEncoding::Png,
            generated_at_ms: current_timestamp_ms(),
            size_bytes: Some(3),
        }
    }

    #[test]
    fn new_records_start_generating_and_unversioned() {
        let record = GenerationRecord::new("item-1", "intro-post");
        assert_eq!(record.status, RecordStatus::Generating);
        assert_eq!(record.version, 0);
        assert!(record.artifacts.is_empty());
        assert!(record.error.is_none());
    }

    #[test]
    fn commit_assigns_versions_and_bumps_timestamps() {
        let temp = TempDir::new().expect("temp dir");
        let store = open_store(&temp);

        let record = GenerationRecord::new("item-1", "intro-post");
        let first = store.commit(&record).expect("first commit");
        assert_eq!(first.version, 1);

        let mut updated = first.clone();
        updated.insert_artifact(ArtifactKind::Infographic, artifact("u1"));
        let second = store.commit(&updated).expect("second commit");
        assert_eq!(second.version, 2);
        assert!(second.updated_at_ms > first.updated_at_ms);
        assert_eq!(second.artifacts.len(), 1);
    }

    #[test]
    fn stale_commits_surface_a_version_conflict() {
        let temp = TempDir::new().expect("temp dir");
        let store = open_store(&temp);

        let record = GenerationRecord::new("item-1", "intro-post");
        let committed = store.commit(&record).expect("initial commit");

        // Writer A advances the record.
        let mut a = committed.clone();
        a.insert_artifact(ArtifactKind::Infographic, artifact("a"));
        store.commit(&a).expect("writer A commits");

        // Writer B still holds the old version; its commit must not clobber A.
        let mut b = committed;
        b.insert_artifact(ArtifactKind::Diagram, artifact("b"));
        let err = store.commit(&b).expect_err("stale write rejected");
        assert!(matches!(
            err,
            RecordStoreError::VersionConflict {
                expected: 1,
                found: 2,
                ..
            }
        ));

        let stored = store.get("item-1").expect("get").expect("present");
        assert!(stored.artifacts.contains_key(&ArtifactKind::Infographic));
        assert!(!stored.artifacts.contains_key(&ArtifactKind::Diagram));
    }

    #[test]
    fn slugs_are_unique_across_records() {
        let temp = TempDir::new().expect("temp dir");
        let store = open_store(&temp);

        store
            .commit(&GenerationRecord::new("item-1", "shared-slug"))
            .expect("first record");
        let err = store
            .commit(&GenerationRecord::new("item-2", "shared-slug"))
            .expect_err("duplicate slug rejected");
        assert!(matches!(err, RecordStoreError::SlugConflict { .. }));
    }

    #[test]
    fn get_by_slug_scans_the_store() {
        let temp = TempDir::new().expect("temp dir");
        let store = open_store(&temp);

        assert!(store.get_by_slug("missing").expect("scan").is_none());

        store
            .commit(&GenerationRecord::new("item-1", "intro-post"))
            .expect("commit");
        let found = store
            .get_by_slug("intro-post")
            .expect("scan")
            .expect("present");
        assert_eq!(found.item_id, "item-1");
    }

    #[test]
    fn modify_retries_through_conflicts() {
        let temp = TempDir::new().expect("temp dir");
        let store = open_store(&temp);

        let committed = store
            .commit(&GenerationRecord::new("item-1", "intro-post"))
            .expect("commit");

        // Interleave a competing write so the first modify attempt conflicts.
        let mut competing = committed.clone();
        competing.insert_artifact(ArtifactKind::Infographic, artifact("x"));
        store.commit(&competing).expect("competing write");

        // modify() reads fresh state, so it wins regardless.
        let persisted = store
            .modify("item-1", 3, |record| {
                record.set_status(RecordStatus::Completed, None)
            })
            .expect("modify succeeds");
        assert_eq!(persisted.status, RecordStatus::Completed);
        assert!(persisted.artifacts.contains_key(&ArtifactKind::Infographic));
    }

    #[test]
    fn stuck_records_are_listed_past_the_age_threshold() {
        let temp = TempDir::new().expect("temp dir");
        let store = open_store(&temp);

        let mut record = GenerationRecord::new("item-1", "intro-post");
        record.updated_at_ms = current_timestamp_ms() - 10_000;
        let mut persisted = store.commit(&record).expect("commit");
        // commit() bumps updated_at_ms; age the stored copy directly.
        persisted.updated_at_ms = current_timestamp_ms() - 10_000;
        let encoded = encode_to_vec(&persisted, config::standard()).expect("encode");
        let mut wtxn = store.env.write_txn().expect("txn");
        store
            .records
            .put(&mut wtxn, "item-1", encoded.as_slice())
            .expect("put");
        wtxn.commit().expect("commit txn");

        let stuck = store
            .list_stuck(RecordStatus::Generating, 5_000)
            .expect("list stuck");
        assert_eq!(stuck.len(), 1);

        let fresh = store
            .list_stuck(RecordStatus::Generating, 60_000)
            .expect("list stuck");
        assert!(fresh.is_empty());
    }
}
