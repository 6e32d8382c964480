//! The pipeline orchestrator.
//!
//! Drives one content item at a time through flatten → key points → the four
//! image kinds → uploads → record commits, strictly sequentially. Per-kind
//! failures are absorbed into typed outcomes; only a missing content item or
//! a key-point failure aborts a run.

use std::{sync::Arc, time::Duration};

use backon::{ExponentialBuilder, Retryable};
use bon::Builder;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use postviz_server::provider::RegenerationMode;

use crate::cms::{CmsError, ContentItem, ContentSource};
use crate::pipeline::kinds::ArtifactKind;
use crate::services::artifacts::{
    ArtifactStore, ArtifactStoreError, artifact_path,
};
use crate::services::context::Governors;
use crate::services::generators::{ArtifactGenerator, GenerationInput, GeneratorError};
use crate::services::keypoints::{KeyPointError, KeyPointExtractor};
use crate::services::model::{ImageModel, ModelError, TextModel};
use crate::services::records::{
    Artifact, GenerationRecord, GenerationRecordStore, ImageEncoding, RecordStatus,
    RecordStoreError, current_timestamp_ms,
};
use crate::text::{flatten_body, text_or_fallback};

/// Errors that make a whole run fail. Per-kind generation and upload errors
/// never surface here; they are folded into [`Outcome::Failed`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Blog post not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Cms(#[from] CmsError),
    #[error(transparent)]
    KeyPoints(#[from] KeyPointError),
    #[error(transparent)]
    Records(#[from] RecordStoreError),
    #[error(transparent)]
    Path(#[from] crate::paths::PathError),
    #[error(transparent)]
    Artifacts(#[from] ArtifactStoreError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("{0}")]
    Message(String),
}

impl PipelineError {
    pub fn message(msg: impl Into<String>) -> Self {
        PipelineError::Message(msg.into())
    }
}

#[derive(Debug, Error)]
enum ProduceError {
    #[error(transparent)]
    Generate(#[from] GeneratorError),
    #[error(transparent)]
    Upload(#[from] ArtifactStoreError),
}

/// What happened to one artifact kind during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Outcome {
    Generated { url: String },
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindOutcome {
    pub kind: ArtifactKind,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Typed result of a single-item run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub item_id: String,
    pub slug: String,
    pub status: RecordStatus,
    pub outcomes: Vec<KindOutcome>,
}

impl RunReport {
    pub fn generated_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|entry| matches!(entry.outcome, Outcome::Generated { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub slug: String,
    pub error: String,
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BatchItemError>,
}

/// Result of an explicit out-of-band cleanup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub item_id: String,
    pub deleted_artifacts: usize,
}

fn default_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(15))
        .with_max_times(2)
        .with_jitter()
}

/// Sequences extraction, generation, upload, and record commits for one item.
#[derive(Builder)]
pub struct GenerationOrchestrator {
    cms: Arc<dyn ContentSource>,
    records: Arc<GenerationRecordStore>,
    artifacts: Arc<dyn ArtifactStore>,
    text_model: Arc<dyn TextModel>,
    image_model: Arc<dyn ImageModel>,
    #[builder(default)]
    governors: Governors,
    #[builder(default = default_backoff())]
    backoff: ExponentialBuilder,
}

impl GenerationOrchestrator {
    /// Run the pipeline for one slug.
    pub async fn run(
        &self,
        slug: &str,
        mode: RegenerationMode,
    ) -> Result<RunReport, PipelineError> {
        debug_assert!(!slug.is_empty());

        let item = self
            .cms
            .fetch_by_slug(slug)
            .await?
            .ok_or_else(|| PipelineError::NotFound(slug.to_string()))?;
        info!(slug, item_id = %item.id, ?mode, "starting visualization run");

        let mut record = self.mark_generating(&item, mode).await?;

        let flattened = flatten_body(item.body.as_ref());
        let body_text = text_or_fallback(&flattened, &item.title, &item.description);

        let extractor = KeyPointExtractor::new(self.text_model.clone());
        let key_points = match extractor.extract(&body_text).await {
            Ok(points) => points,
            Err(error) => {
                let message = error.to_string();
                warn!(slug, %message, "key point extraction failed; aborting run");
                record.set_status(RecordStatus::Failed, Some(message));
                self.commit(&mut record)?;
                return Err(error.into());
            }
        };
        debug!(slug, count = key_points.len(), "key points extracted");

        let generator = ArtifactGenerator::new(self.text_model.clone(), self.image_model.clone());
        let input = GenerationInput {
            title: &item.title,
            description: &item.description,
            body_text: &body_text,
            key_points: &key_points,
        };

        let mut outcomes = Vec::with_capacity(ArtifactKind::ALL.len());
        for (index, kind) in ArtifactKind::ALL.into_iter().enumerate() {
            let is_last = index + 1 == ArtifactKind::ALL.len();

            if mode == RegenerationMode::FillMissing && record.artifacts.contains_key(&kind) {
                outcomes.push(KindOutcome {
                    kind,
                    outcome: Outcome::Skipped {
                        reason: "artifact already present".to_string(),
                    },
                });
                if is_last {
                    record.set_status(RecordStatus::Completed, None);
                    self.commit(&mut record)?;
                }
                continue;
            }

            match self.produce(&generator, kind, &item.slug, &input).await {
                Ok(artifact) => {
                    let url = artifact.url.clone();
                    record.insert_artifact(kind, artifact);
                    // The final kind's commit carries the terminal status so a
                    // crash between kinds leaves the record visibly generating.
                    if is_last {
                        record.set_status(RecordStatus::Completed, None);
                    }
                    self.commit(&mut record)?;
                    info!(slug, kind = %kind, %url, "artifact generated");
                    outcomes.push(KindOutcome {
                        kind,
                        outcome: Outcome::Generated { url },
                    });
                }
                Err(error) => {
                    warn!(slug, kind = %kind, %error, "artifact generation failed; continuing");
                    outcomes.push(KindOutcome {
                        kind,
                        outcome: Outcome::Failed {
                            reason: error.to_string(),
                        },
                    });
                    if is_last {
                        // A record never sticks in generating, even with zero
                        // successful kinds.
                        record.set_status(RecordStatus::Completed, None);
                        self.commit(&mut record)?;
                    }
                }
            }
        }

        Ok(RunReport {
            item_id: record.item_id.clone(),
            slug: record.slug.clone(),
            status: record.status,
            outcomes,
        })
    }

    /// Process slugs strictly sequentially, pacing between items.
    pub async fn run_many(&self, slugs: &[String], mode: RegenerationMode) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, slug) in slugs.iter().enumerate() {
            if index > 0 {
                if let Some(limiter) = &self.governors.items {
                    limiter.until_ready().await;
                }
            }
            report.processed += 1;
            match self.run(slug, mode).await {
                Ok(run) => {
                    report.succeeded += 1;
                    debug!(slug, generated = run.generated_count(), "item processed");
                }
                Err(error) => {
                    report.failed += 1;
                    report.errors.push(BatchItemError {
                        slug: slug.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Discover slugs whose records still need generation.
    pub async fn discover_pending(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<String>, PipelineError> {
        let items = self.cms.list_all().await?;
        let mut slugs = Vec::new();
        for item in items {
            if let Some(limit) = limit {
                if slugs.len() >= limit {
                    break;
                }
            }
            let record = self.records.get(&item.id)?;
            if needs_generation(record.as_ref()) {
                slugs.push(item.slug);
            }
        }
        Ok(slugs)
    }

    /// Scan the CMS and process every item still missing artifacts.
    pub async fn scan(
        &self,
        mode: RegenerationMode,
        limit: Option<usize>,
    ) -> Result<BatchReport, PipelineError> {
        let slugs = self.discover_pending(limit).await?;
        info!(count = slugs.len(), "scan discovered items needing visualization");
        Ok(self.run_many(&slugs, mode).await)
    }

    /// Read-only record lookup used by presentation layers.
    pub fn record_by_slug(&self, slug: &str) -> Result<Option<GenerationRecord>, PipelineError> {
        Ok(self.records.get_by_slug(slug)?)
    }

    async fn mark_generating(
        &self,
        item: &ContentItem,
        mode: RegenerationMode,
    ) -> Result<GenerationRecord, PipelineError> {
        let record = match self.records.get(&item.id)? {
            Some(mut existing) => {
                if mode == RegenerationMode::Regenerate {
                    // Full regeneration also removes the superseded objects so
                    // re-runs do not leak orphans into the artifact store.
                    for artifact in existing.artifacts.values() {
                        if let Err(error) = self.artifacts.delete(&artifact.url).await {
                            warn!(url = %artifact.url, %error, "failed to delete superseded artifact");
                        }
                    }
                    existing.artifacts.clear();
                }
                existing.slug = item.slug.clone();
                existing.set_status(RecordStatus::Generating, None);
                existing
            }
            None => GenerationRecord::new(&item.id, &item.slug),
        };
        Ok(self.records.commit(&record)?)
    }

    async fn produce(
        &self,
        generator: &ArtifactGenerator,
        kind: ArtifactKind,
        slug: &str,
        input: &GenerationInput<'_>,
    ) -> Result<Artifact, ProduceError> {
        if let Some(limiter) = &self.governors.model {
            limiter.until_ready().await;
        }

        let attempt = || async {
            let image = generator.generate(kind, input).await?;
            let uploaded_at_ms = current_timestamp_ms();
            let path = artifact_path(slug, kind, uploaded_at_ms, &image.mime_type);
            let stored = self
                .artifacts
                .upload(&image.bytes, &image.mime_type, &path)
                .await?;
            Ok(Artifact {
                url: stored.url,
                encoding: ImageEncoding::from_mime_type(&image.mime_type),
                generated_at_ms: uploaded_at_ms,
                size_bytes: Some(stored.size_bytes),
            })
        };
        attempt.retry(self.backoff.clone()).await
    }

    fn commit(&self, record: &mut GenerationRecord) -> Result<(), PipelineError> {
        *record = self.records.commit(record)?;
        Ok(())
    }
}

/// Trigger-side guard: whether an item should be (re)processed by a scan.
/// Records that are completed or generating with at least one artifact are
/// left alone; everything else needs a run.
pub fn needs_generation(record: Option<&GenerationRecord>) -> bool {
    match record {
        None => true,
        Some(record) => match record.status {
            RecordStatus::Completed | RecordStatus::Generating => record.artifacts.is_empty(),
            RecordStatus::Pending | RecordStatus::Failed => true,
        },
    }
}

/// Explicit out-of-band cleanup: delete the record and its stored objects.
pub async fn cleanup_record(
    records: &GenerationRecordStore,
    artifacts: &dyn ArtifactStore,
    slug: &str,
) -> Result<Option<CleanupReport>, PipelineError> {
    let Some(record) = records.get_by_slug(slug)? else {
        return Ok(None);
    };

    let mut deleted = 0_usize;
    for artifact in record.artifacts.values() {
        match artifacts.delete(&artifact.url).await {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(error) => {
                warn!(url = %artifact.url, %error, "failed to delete artifact during cleanup");
            }
        }
    }
    records.remove(&record.item_id)?;

    Ok(Some(CleanupReport {
        item_id: record.item_id,
        deleted_artifacts: deleted,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(status: RecordStatus, artifact_count: usize) -> GenerationRecord {
        let mut record = GenerationRecord::new("item", "slug");
        record.status = status;
        for (index, kind) in ArtifactKind::ALL.into_iter().take(artifact_count).enumerate() {
            record.artifacts.insert(
                kind,
                Artifact {
                    url: format!("u{index}"),
                    encoding: ImageEncoding::Png,
                    generated_at_ms: 0,
                    size_bytes: None,
                },
            );
        }
        record
    }

    #[test]
    fn absent_records_need_generation() {
        assert!(needs_generation(None));
    }

    #[test]
    fn completed_or_generating_with_artifacts_are_skipped() {
        assert!(!needs_generation(Some(&record_with(
            RecordStatus::Completed,
            1
        ))));
        assert!(!needs_generation(Some(&record_with(
            RecordStatus::Generating,
            2
        ))));
    }

    #[test]
    fn empty_or_failed_records_need_generation() {
        assert!(needs_generation(Some(&record_with(RecordStatus::Completed, 0))));
        assert!(needs_generation(Some(&record_with(RecordStatus::Generating, 0))));
        assert!(needs_generation(Some(&record_with(RecordStatus::Failed, 3))));
    }

    #[test]
    fn not_found_errors_carry_the_slug() {
        let error = PipelineError::NotFound("item2".to_string());
        assert_eq!(error.to_string(), "Blog post not found: item2");
    }
}
