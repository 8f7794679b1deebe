//! In-memory store.
//!
//! A single `tokio::sync::RwLock` over the table maps: writers serialize,
//! readers share, and multi-row writes (the track-tree insert, the cascading
//! delete) commit under one write guard, which gives the importer its
//! atomicity and submissions their monotonic reads.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use examforge_core::model::{Answer, Question, Section, Submission, Track};

use crate::{Store, StoreError, StoreResult, TrackFilter};

#[derive(Default)]
struct Tables {
    tracks: HashMap<String, Track>,
    sections: HashMap<String, Section>,
    questions: HashMap<String, Question>,
    submissions: HashMap<String, Submission>,
    answers: HashMap<String, Answer>,
    /// (submission_id, question_id) → answer id.
    answer_index: HashMap<(String, String), String>,
}

/// The reference `Store` implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_track_tree(
        &self,
        track: Track,
        sections: Vec<Section>,
        questions: Vec<Question>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        if tables.tracks.contains_key(&track.id) {
            return Err(StoreError::Integrity(format!(
                "track id already exists: {}",
                track.id
            )));
        }
        for section in &sections {
            if section.track_id != track.id {
                return Err(StoreError::Integrity(format!(
                    "section {} does not belong to track {}",
                    section.id, track.id
                )));
            }
        }
        for question in &questions {
            if question.track_id != track.id {
                return Err(StoreError::Integrity(format!(
                    "question {} does not belong to track {}",
                    question.id, track.id
                )));
            }
        }

        // All checks passed; every row lands under the same guard.
        tables.tracks.insert(track.id.clone(), track);
        for section in sections {
            tables.sections.insert(section.id.clone(), section);
        }
        for question in questions {
            tables.questions.insert(question.id.clone(), question);
        }
        Ok(())
    }

    async fn get_track(&self, id: &str) -> StoreResult<Option<Track>> {
        Ok(self.tables.read().await.tracks.get(id).cloned())
    }

    async fn update_track(&self, track: Track) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.tracks.contains_key(&track.id) {
            return Err(StoreError::not_found("track", &track.id));
        }
        tables.tracks.insert(track.id.clone(), track);
        Ok(())
    }

    async fn delete_track(&self, id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.tracks.remove(id).is_none() {
            return Ok(false);
        }

        tables.sections.retain(|_, s| s.track_id != id);

        let removed_questions: Vec<String> = tables
            .questions
            .values()
            .filter(|q| q.track_id == id)
            .map(|q| q.id.clone())
            .collect();
        tables.questions.retain(|_, q| q.track_id != id);

        tables
            .answers
            .retain(|_, a| !removed_questions.contains(&a.question_id));
        tables
            .answer_index
            .retain(|(_, question_id), _| !removed_questions.contains(question_id));

        Ok(true)
    }

    async fn list_tracks(&self, filter: TrackFilter) -> StoreResult<Vec<Track>> {
        let tables = self.tables.read().await;
        let mut tracks: Vec<Track> = tables
            .tracks
            .values()
            .filter(|t| filter.kind.is_none_or(|k| t.kind == k))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| {
                filter
                    .author_id
                    .as_deref()
                    .is_none_or(|a| t.author_id == a)
            })
            .cloned()
            .collect();
        tracks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tracks)
    }

    async fn sections_for_track(&self, track_id: &str) -> StoreResult<Vec<Section>> {
        let tables = self.tables.read().await;
        let mut sections: Vec<Section> = tables
            .sections
            .values()
            .filter(|s| s.track_id == track_id)
            .cloned()
            .collect();
        sections.sort_by_key(|s| s.order_index);
        Ok(sections)
    }

    async fn questions_for_track(&self, track_id: &str) -> StoreResult<Vec<Question>> {
        let tables = self.tables.read().await;
        let mut section_order: HashMap<&str, u32> = HashMap::new();
        for section in tables.sections.values() {
            if section.track_id == track_id {
                section_order.insert(&section.id, section.order_index);
            }
        }
        let mut questions: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| q.track_id == track_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| {
            (
                section_order.get(q.section_id.as_str()).copied().unwrap_or(u32::MAX),
                q.order_index,
            )
        });
        Ok(questions)
    }

    async fn get_question(&self, id: &str) -> StoreResult<Option<Question>> {
        Ok(self.tables.read().await.questions.get(id).cloned())
    }

    async fn insert_submission(&self, submission: Submission) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.submissions.contains_key(&submission.id) {
            return Err(StoreError::Integrity(format!(
                "submission id already exists: {}",
                submission.id
            )));
        }
        tables.submissions.insert(submission.id.clone(), submission);
        Ok(())
    }

    async fn get_submission(&self, id: &str) -> StoreResult<Option<Submission>> {
        Ok(self.tables.read().await.submissions.get(id).cloned())
    }

    async fn update_submission(&self, submission: Submission) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.submissions.contains_key(&submission.id) {
            return Err(StoreError::not_found("submission", &submission.id));
        }
        tables
            .submissions
            .insert(submission.id.clone(), submission);
        Ok(())
    }

    async fn list_submissions(&self, student_id: &str) -> StoreResult<Vec<Submission>> {
        let tables = self.tables.read().await;
        let mut submissions: Vec<Submission> = tables
            .submissions
            .values()
            .filter(|s| s.student_id == student_id)
            // Orphans (deleted tracks) are filtered from listings.
            .filter(|s| tables.tracks.contains_key(&s.track_id))
            .cloned()
            .collect();
        submissions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(submissions)
    }

    async fn upsert_answer(&self, mut answer: Answer) -> StoreResult<Answer> {
        let mut tables = self.tables.write().await;
        let key = (answer.submission_id.clone(), answer.question_id.clone());
        if let Some(existing_id) = tables.answer_index.get(&key) {
            answer.id = existing_id.clone();
        } else {
            tables.answer_index.insert(key, answer.id.clone());
        }
        tables.answers.insert(answer.id.clone(), answer.clone());
        Ok(answer)
    }

    async fn get_answer(
        &self,
        submission_id: &str,
        question_id: &str,
    ) -> StoreResult<Option<Answer>> {
        let tables = self.tables.read().await;
        let key = (submission_id.to_string(), question_id.to_string());
        Ok(tables
            .answer_index
            .get(&key)
            .and_then(|id| tables.answers.get(id))
            .cloned())
    }

    async fn get_answer_by_id(&self, id: &str) -> StoreResult<Option<Answer>> {
        Ok(self.tables.read().await.answers.get(id).cloned())
    }

    async fn answers_for_submission(&self, submission_id: &str) -> StoreResult<Vec<Answer>> {
        Ok(self
            .tables
            .read()
            .await
            .answers
            .values()
            .filter(|a| a.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn update_answer(&self, answer: Answer) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.answers.contains_key(&answer.id) {
            return Err(StoreError::not_found("answer", &answer.id));
        }
        tables.answers.insert(answer.id.clone(), answer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use examforge_core::model::{
        Correctness, Difficulty, QuestionPayload, QuestionType, SubmissionStatus, TrackKind,
        TrackStatus,
    };
    use serde_json::json;

    fn make_track(id: &str) -> Track {
        Track {
            id: id.into(),
            title: format!("Track {id}"),
            kind: TrackKind::Listening,
            description: String::new(),
            status: TrackStatus::Draft,
            total_sections: 1,
            total_questions: 1,
            total_marks: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            author_id: "author-1".into(),
            metadata: json!({}),
        }
    }

    fn make_section(id: &str, track_id: &str) -> Section {
        Section {
            id: id.into(),
            track_id: track_id.into(),
            order_index: 1,
            title: "Section 1".into(),
            passage_text: None,
            instructions: None,
            question_count: 1,
        }
    }

    fn make_question(id: &str, section_id: &str, track_id: &str) -> Question {
        Question {
            id: id.into(),
            section_id: section_id.into(),
            track_id: track_id.into(),
            order_index: 1,
            qtype: QuestionType::McqSingle,
            payload: QuestionPayload::ChoiceSingle {
                prompt: "?".into(),
                options: vec![],
                correct_answer: "a".into(),
            },
            marks: 1,
            difficulty: Difficulty::Medium,
            created_at: Utc::now(),
        }
    }

    fn make_submission(id: &str, track_id: &str, student: &str) -> Submission {
        Submission {
            id: id.into(),
            track_id: track_id.into(),
            student_id: student.into(),
            status: SubmissionStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            time_spent_seconds: 0,
            total_questions: 1,
            total_marks: 1,
            obtained_marks: 0.0,
            percentage: 0.0,
        }
    }

    fn make_answer(id: &str, submission_id: &str, question_id: &str) -> Answer {
        Answer {
            id: id.into(),
            submission_id: submission_id.into(),
            question_id: question_id.into(),
            question_type: QuestionType::McqSingle,
            raw_answer: json!("a"),
            correct_answer_snapshot: json!(null),
            correctness: Correctness::Pending,
            marks_obtained: 0.0,
            marks_total: 1.0,
            feedback: String::new(),
        }
    }

    #[tokio::test]
    async fn track_tree_insert_is_atomic_on_integrity_failure() {
        let store = MemoryStore::new();
        let track = make_track("t1");
        let section = make_section("s1", "t1");
        // A question pointing at a different track breaks integrity.
        let stray = make_question("q1", "s1", "other-track");

        let result = store
            .insert_track_tree(track, vec![section], vec![stray])
            .await;
        assert!(matches!(result, Err(StoreError::Integrity(_))));
        assert!(store.get_track("t1").await.unwrap().is_none());
        assert!(store.sections_for_track("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cascading_delete_removes_children_and_answers() {
        let store = MemoryStore::new();
        store
            .insert_track_tree(
                make_track("t1"),
                vec![make_section("s1", "t1")],
                vec![make_question("q1", "s1", "t1")],
            )
            .await
            .unwrap();
        store
            .insert_submission(make_submission("sub1", "t1", "student-1"))
            .await
            .unwrap();
        store
            .upsert_answer(make_answer("a1", "sub1", "q1"))
            .await
            .unwrap();

        assert!(store.delete_track("t1").await.unwrap());
        assert!(store.get_question("q1").await.unwrap().is_none());
        assert!(store.get_answer_by_id("a1").await.unwrap().is_none());
        // The submission survives orphaned…
        assert!(store.get_submission("sub1").await.unwrap().is_some());
        // …but is filtered from listings.
        assert!(store.list_submissions("student-1").await.unwrap().is_empty());
        // Deleting again reports absence.
        assert!(!store.delete_track("t1").await.unwrap());
    }

    #[tokio::test]
    async fn answer_upsert_is_keyed_per_question() {
        let store = MemoryStore::new();
        let first = store
            .upsert_answer(make_answer("a1", "sub1", "q1"))
            .await
            .unwrap();

        let mut second = make_answer("a2", "sub1", "q1");
        second.raw_answer = json!("b");
        let stored = store.upsert_answer(second).await.unwrap();

        // Same (submission, question) key keeps the original row id.
        assert_eq!(stored.id, first.id);
        let current = store.get_answer("sub1", "q1").await.unwrap().unwrap();
        assert_eq!(current.raw_answer, json!("b"));
        assert_eq!(
            store.answers_for_submission("sub1").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn list_tracks_applies_filters_newest_first() {
        let store = MemoryStore::new();
        let mut reading = make_track("t-reading");
        reading.kind = TrackKind::Reading;
        reading.status = TrackStatus::Published;
        store
            .insert_track_tree(reading, vec![], vec![])
            .await
            .unwrap();
        store
            .insert_track_tree(make_track("t-listening"), vec![], vec![])
            .await
            .unwrap();

        let all = store.list_tracks(TrackFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let published = store
            .list_tracks(TrackFilter {
                status: Some(TrackStatus::Published),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, "t-reading");

        let none = store
            .list_tracks(TrackFilter {
                author_id: Some("someone-else".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn updates_of_missing_rows_are_not_found() {
        let store = MemoryStore::new();
        let result = store.update_track(make_track("ghost")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        let result = store
            .update_submission(make_submission("ghost", "t", "s"))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }
}
