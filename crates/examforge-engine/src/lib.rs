//! examforge-engine — The engine façade its collaborators call.
//!
//! Wires the pure core (registry, detector, validator, graders) to an
//! injected [`Store`] and exposes the authoring API (detect, validate,
//! import, track CRUD) and the taking API (submissions, grading, results).

pub mod import;
pub mod submission;

pub use import::{ImportIssue, ImportReport};
pub use submission::{StartedSubmission, SubmissionResult};

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use examforge_core::detect::{Detection, TypeDetector};
use examforge_core::error::EngineError;
use examforge_core::grade::GradingEngine;
use examforge_core::model::{QuestionType, Section, Track, TrackStatus};
use examforge_core::registry::TypeRegistry;
use examforge_core::validate::{ValidationReport, Validator};
use examforge_store::{Store, TrackFilter};

/// Engine tuning knobs. The defaults implement the published contract;
/// tests occasionally tighten them.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Character-similarity threshold for fuzzy-enabled completion graders.
    pub fuzzy_threshold: f64,
    /// Maximum sections per track.
    pub max_sections: usize,
    /// Maximum questions per section.
    pub max_questions_per_section: usize,
    /// Maximum questions per track.
    pub max_questions_total: usize,
    /// Root directory for asset existence checks; `None` skips the layer.
    pub asset_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: examforge_core::grade::FUZZY_THRESHOLD,
            max_sections: 4,
            max_questions_per_section: 10,
            max_questions_total: 40,
            asset_root: None,
        }
    }
}

/// The engine: every collaborator-facing operation hangs off this type.
pub struct ExamEngine {
    registry: Arc<TypeRegistry>,
    detector: TypeDetector,
    validator: Validator,
    grader: GradingEngine,
    store: Arc<dyn Store>,
    config: EngineConfig,
}

impl ExamEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        let registry = Arc::new(TypeRegistry::new());
        Self {
            detector: TypeDetector::new(Arc::clone(&registry)),
            validator: Validator::new(Arc::clone(&registry)),
            grader: GradingEngine::new(Arc::clone(&registry))
                .with_fuzzy_threshold(config.fuzzy_threshold),
            registry,
            store,
            config,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn grader(&self) -> &GradingEngine {
        &self.grader
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn detector(&self) -> &TypeDetector {
        &self.detector
    }

    pub(crate) fn validator(&self) -> &Validator {
        &self.validator
    }

    // --- Authoring: stateless operations ---

    /// Infer a raw question's type.
    pub fn detect(&self, raw: &Value) -> Detection {
        self.detector.detect(raw)
    }

    /// Validate a raw question. When `qtype` is absent the detector's
    /// verdict drives the type-specific checks.
    pub fn validate(&self, raw: &Value, qtype: Option<QuestionType>) -> ValidationReport {
        let qtype = qtype.or_else(|| self.detector.detect(raw).qtype);
        self.validator
            .validate(raw, qtype, self.config.asset_root.as_deref())
    }

    // --- Authoring: track CRUD ---

    /// A track with its ordered sections and questions.
    pub async fn get_track(&self, track_id: &str) -> Result<TrackBundle, EngineError> {
        let track = self
            .store
            .get_track(track_id)
            .await?
            .ok_or_else(|| EngineError::not_found("track", track_id))?;
        let sections = self.store.sections_for_track(track_id).await?;
        let questions = self.store.questions_for_track(track_id).await?;
        Ok(TrackBundle { track, sections, questions })
    }

    /// Apply an authoring patch. Status changes must move forward.
    pub async fn update_track(
        &self,
        track_id: &str,
        patch: TrackPatch,
    ) -> Result<Track, EngineError> {
        let mut track = self
            .store
            .get_track(track_id)
            .await?
            .ok_or_else(|| EngineError::not_found("track", track_id))?;

        if let Some(status) = patch.status {
            if !track.status.can_transition_to(status) {
                return Err(EngineError::InvalidTransition(format!(
                    "track status cannot move from {} to {}",
                    track.status, status
                )));
            }
            track.status = status;
        }
        if let Some(title) = patch.title {
            track.title = title;
        }
        if let Some(description) = patch.description {
            track.description = description;
        }
        if let Some(metadata) = patch.metadata {
            track.metadata = metadata;
        }
        track.updated_at = chrono::Utc::now();

        self.store.update_track(track.clone()).await?;
        Ok(track)
    }

    /// Delete a track, cascading to sections, questions, and their answers.
    pub async fn delete_track(&self, track_id: &str) -> Result<(), EngineError> {
        if !self.store.delete_track(track_id).await? {
            return Err(EngineError::not_found("track", track_id));
        }
        tracing::info!(track_id, "track deleted with cascade");
        Ok(())
    }

    pub async fn list_tracks(&self, filter: TrackFilter) -> Result<Vec<Track>, EngineError> {
        Ok(self.store.list_tracks(filter).await?)
    }
}

/// Authoring patch for [`ExamEngine::update_track`]; absent fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct TrackPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TrackStatus>,
    pub metadata: Option<Value>,
}

/// A track together with its ordered children.
#[derive(Debug, Clone)]
pub struct TrackBundle {
    pub track: Track,
    pub sections: Vec<Section>,
    pub questions: Vec<examforge_core::model::Question>,
}

impl TrackBundle {
    /// The student-safe projection: every question with its answer keys
    /// stripped.
    pub fn student_questions(&self) -> Vec<Value> {
        self.questions.iter().map(|q| q.student_view()).collect()
    }
}
