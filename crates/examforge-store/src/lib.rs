//! examforge-store — The storage seam of the engine.
//!
//! Every engine component receives an `Arc<dyn Store>` by injection; the
//! in-memory [`MemoryStore`] is the reference implementation and the one
//! tests run against. The trait is deliberately narrow: entity CRUD, the
//! atomic track-tree insert the importer needs, cascading delete, and the
//! keyed answer upsert the orchestrator relies on.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use examforge_core::error::EngineError;
use examforge_core::model::{
    Answer, Question, Section, Submission, Track, TrackKind, TrackStatus,
};

/// Storage failures. `NotFound` covers stale references; everything else is
/// a backend fault that callers may retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound { entity, id: id.into() }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::Storage(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filters for track listings.
#[derive(Debug, Clone, Default)]
pub struct TrackFilter {
    pub kind: Option<TrackKind>,
    pub status: Option<TrackStatus>,
    pub author_id: Option<String>,
}

/// The storage seam. Implementations must serialize writes per track and
/// per submission; readers never block readers.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Tracks ---

    /// Insert a track with all of its sections and questions atomically:
    /// either every row lands or none does.
    async fn insert_track_tree(
        &self,
        track: Track,
        sections: Vec<Section>,
        questions: Vec<Question>,
    ) -> StoreResult<()>;

    async fn get_track(&self, id: &str) -> StoreResult<Option<Track>>;

    /// Replace a track row. Fails with `NotFound` when it does not exist.
    async fn update_track(&self, track: Track) -> StoreResult<()>;

    /// Delete a track and cascade to its sections, questions, and the
    /// answers referencing those questions. Submissions persist orphaned.
    /// Returns whether the track existed.
    async fn delete_track(&self, id: &str) -> StoreResult<bool>;

    async fn list_tracks(&self, filter: TrackFilter) -> StoreResult<Vec<Track>>;

    // --- Sections & questions ---

    /// Sections of a track ordered by `order_index`.
    async fn sections_for_track(&self, track_id: &str) -> StoreResult<Vec<Section>>;

    /// Questions of a track ordered by section then `order_index`.
    async fn questions_for_track(&self, track_id: &str) -> StoreResult<Vec<Question>>;

    async fn get_question(&self, id: &str) -> StoreResult<Option<Question>>;

    // --- Submissions ---

    async fn insert_submission(&self, submission: Submission) -> StoreResult<()>;

    async fn get_submission(&self, id: &str) -> StoreResult<Option<Submission>>;

    /// Replace a submission row. Fails with `NotFound` when absent.
    async fn update_submission(&self, submission: Submission) -> StoreResult<()>;

    /// A student's submissions, newest first, filtered of submissions whose
    /// track has been deleted.
    async fn list_submissions(&self, student_id: &str) -> StoreResult<Vec<Submission>>;

    // --- Answers ---

    /// Upsert keyed on (submission, question): one answer per question per
    /// submission, last writer wins. Returns the stored row (the id of an
    /// existing row is preserved).
    async fn upsert_answer(&self, answer: Answer) -> StoreResult<Answer>;

    async fn get_answer(
        &self,
        submission_id: &str,
        question_id: &str,
    ) -> StoreResult<Option<Answer>>;

    async fn get_answer_by_id(&self, id: &str) -> StoreResult<Option<Answer>>;

    /// Answers of a submission, unordered.
    async fn answers_for_submission(&self, submission_id: &str) -> StoreResult<Vec<Answer>>;

    /// Replace an answer row by id. Fails with `NotFound` when absent.
    async fn update_answer(&self, answer: Answer) -> StoreResult<()>;
}
