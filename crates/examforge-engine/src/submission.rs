//! Submission lifecycle: start, incremental answer saves, grading on
//! submit, manual grading for writing tasks, and result publication.
//!
//! Status flow is in_progress -> submitted -> graded -> published, where
//! `submitted` only occurs while a writing task still awaits its manual
//! grade.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use examforge_core::error::EngineError;
use examforge_core::model::{
    Answer, Correctness, Question, Submission, SubmissionStatus, Track,
};

use crate::ExamEngine;

/// What the student sees when a submission opens: the track and every
/// question with its answer keys stripped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSubmission {
    pub submission: Submission,
    pub track: Track,
    pub questions: Vec<Value>,
}

/// Aggregate result of a submission with its per-question breakdown.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub submission: Submission,
    pub per_question: Vec<Answer>,
}

impl ExamEngine {
    /// Open a submission against a track. The returned questions are
    /// student-safe projections.
    pub async fn start_submission(
        &self,
        track_id: &str,
        student_id: &str,
    ) -> Result<StartedSubmission, EngineError> {
        let bundle = self.get_track(track_id).await?;

        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            track_id: track_id.to_string(),
            student_id: student_id.to_string(),
            status: SubmissionStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            time_spent_seconds: 0,
            total_questions: bundle.track.total_questions,
            total_marks: bundle.track.total_marks,
            obtained_marks: 0.0,
            percentage: 0.0,
        };
        self.store().insert_submission(submission.clone()).await?;

        tracing::info!(submission_id = %submission.id, %track_id, "submission started");
        Ok(StartedSubmission {
            questions: bundle.student_questions(),
            track: bundle.track,
            submission,
        })
    }

    /// Record or replace a student's answer. Only in-progress submissions
    /// accept saves; re-saving a question overwrites the previous answer.
    pub async fn save_answer(
        &self,
        submission_id: &str,
        question_id: &str,
        raw_answer: Value,
    ) -> Result<Answer, EngineError> {
        let submission = self.require_submission(submission_id).await?;
        if submission.status != SubmissionStatus::InProgress {
            return Err(EngineError::RuleViolation(format!(
                "submission {submission_id} is {} and no longer accepts answers",
                submission.status
            )));
        }

        let question = self
            .store()
            .get_question(question_id)
            .await?
            .ok_or_else(|| EngineError::not_found("question", question_id))?;
        if question.track_id != submission.track_id {
            return Err(EngineError::InvalidInput(format!(
                "question {question_id} does not belong to the submission's track"
            )));
        }

        let answer = Answer {
            id: Uuid::new_v4().to_string(),
            submission_id: submission_id.to_string(),
            question_id: question_id.to_string(),
            question_type: question.qtype,
            raw_answer,
            correct_answer_snapshot: Value::Null,
            correctness: Correctness::Pending,
            marks_obtained: 0.0,
            marks_total: f64::from(question.marks),
            feedback: String::new(),
        };
        Ok(self.store().upsert_answer(answer).await?)
    }

    /// Close and grade a submission. Unanswered questions grade as wrong.
    /// Submitting an already closed submission returns its current result
    /// unchanged.
    pub async fn submit(&self, submission_id: &str) -> Result<SubmissionResult, EngineError> {
        let mut submission = self.require_submission(submission_id).await?;
        if submission.status != SubmissionStatus::InProgress {
            return self.get_results(submission_id).await;
        }

        let questions = self
            .store()
            .questions_for_track(&submission.track_id)
            .await?;
        let saved = self.store().answers_for_submission(submission_id).await?;

        let mut per_question = Vec::with_capacity(questions.len());
        let mut pending = 0usize;
        for question in &questions {
            let raw_answer = saved
                .iter()
                .find(|a| a.question_id == question.id)
                .map(|a| a.raw_answer.clone())
                .unwrap_or(Value::Null);
            let graded = self.grade_answer(question, submission_id, raw_answer);
            if graded.correctness == Correctness::Pending {
                pending += 1;
            }
            per_question.push(self.store().upsert_answer(graded).await?);
        }

        let now = Utc::now();
        submission.completed_at = Some(now);
        submission.time_spent_seconds =
            (now - submission.started_at).num_seconds().max(0) as u64;
        submission.status = if pending == 0 {
            SubmissionStatus::Graded
        } else {
            SubmissionStatus::Submitted
        };
        aggregate(&mut submission, &per_question);
        self.store().update_submission(submission.clone()).await?;

        tracing::info!(
            submission_id,
            status = %submission.status,
            obtained = submission.obtained_marks,
            "submission graded"
        );
        Ok(SubmissionResult { submission, per_question })
    }

    /// Apply an examiner's grade to a writing answer, then re-aggregate.
    /// Once no answers remain pending the submission moves to graded.
    pub async fn manual_grade(
        &self,
        answer_id: &str,
        is_correct: bool,
        marks_obtained: f64,
        feedback: impl Into<String>,
    ) -> Result<SubmissionResult, EngineError> {
        let mut answer = self
            .store()
            .get_answer_by_id(answer_id)
            .await?
            .ok_or_else(|| EngineError::not_found("answer", answer_id))?;

        if !(0.0..=answer.marks_total).contains(&marks_obtained) {
            return Err(EngineError::InvalidInput(format!(
                "marks must be between 0 and {}, got {marks_obtained}",
                answer.marks_total
            )));
        }

        answer.correctness = if is_correct {
            Correctness::Correct
        } else {
            Correctness::Incorrect
        };
        answer.marks_obtained = round2(marks_obtained);
        answer.feedback = feedback.into();
        self.store().update_answer(answer.clone()).await?;

        let mut submission = self.require_submission(&answer.submission_id).await?;
        let answers = self
            .store()
            .answers_for_submission(&submission.id)
            .await?;
        aggregate(&mut submission, &answers);
        if submission.status == SubmissionStatus::Submitted
            && answers.iter().all(|a| a.correctness != Correctness::Pending)
        {
            submission.status = SubmissionStatus::Graded;
        }
        self.store().update_submission(submission.clone()).await?;

        tracing::info!(answer_id, submission_id = %submission.id, "manual grade applied");
        Ok(SubmissionResult { submission, per_question: answers })
    }

    /// Release a graded submission to the student. Idempotent once
    /// published; grading must have finished first.
    pub async fn publish_results(
        &self,
        submission_id: &str,
    ) -> Result<Submission, EngineError> {
        let mut submission = self.require_submission(submission_id).await?;
        match submission.status {
            SubmissionStatus::Published => Ok(submission),
            SubmissionStatus::Graded => {
                submission.status = SubmissionStatus::Published;
                self.store().update_submission(submission.clone()).await?;
                Ok(submission)
            }
            other => Err(EngineError::RuleViolation(format!(
                "submission {submission_id} is {other}; only graded submissions publish"
            ))),
        }
    }

    /// The current aggregate and per-question state of a submission.
    pub async fn get_results(
        &self,
        submission_id: &str,
    ) -> Result<SubmissionResult, EngineError> {
        let submission = self.require_submission(submission_id).await?;
        let per_question = self.store().answers_for_submission(submission_id).await?;
        Ok(SubmissionResult { submission, per_question })
    }

    /// A student's submissions, newest first. Submissions whose track has
    /// been deleted are filtered out.
    pub async fn list_submissions(
        &self,
        student_id: &str,
    ) -> Result<Vec<Submission>, EngineError> {
        Ok(self.store().list_submissions(student_id).await?)
    }

    async fn require_submission(&self, id: &str) -> Result<Submission, EngineError> {
        self.store()
            .get_submission(id)
            .await?
            .ok_or_else(|| EngineError::not_found("submission", id))
    }

    fn grade_answer(
        &self,
        question: &Question,
        submission_id: &str,
        raw_answer: Value,
    ) -> Answer {
        let verdict = self.grader().grade(question, &raw_answer);
        Answer {
            id: Uuid::new_v4().to_string(),
            submission_id: submission_id.to_string(),
            question_id: question.id.clone(),
            question_type: question.qtype,
            raw_answer,
            correct_answer_snapshot: question.payload.answer_key(),
            correctness: verdict.correctness,
            marks_obtained: round2(verdict.fraction * f64::from(question.marks)),
            marks_total: f64::from(question.marks),
            feedback: verdict.feedback,
        }
    }
}

/// Recompute obtained marks and percentage from the answer rows. Pending
/// answers contribute nothing until manually graded.
fn aggregate(submission: &mut Submission, answers: &[Answer]) {
    submission.obtained_marks = round2(answers.iter().map(|a| a.marks_obtained).sum());
    submission.percentage = if submission.total_marks == 0 {
        0.0
    } else {
        round2(submission.obtained_marks / f64::from(submission.total_marks) * 100.0)
    };
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(2.0 / 3.0), 0.67);
        assert_eq!(round2(1.005 * 2.0), 2.01);
        assert_eq!(round2(5.0), 5.0);
    }

    #[test]
    fn aggregate_computes_percentage() {
        let mut submission = Submission {
            id: "s".into(),
            track_id: "t".into(),
            student_id: "u".into(),
            status: SubmissionStatus::Submitted,
            started_at: Utc::now(),
            completed_at: None,
            time_spent_seconds: 0,
            total_questions: 3,
            total_marks: 6,
            obtained_marks: 0.0,
            percentage: 0.0,
        };
        let answer = |marks: f64| Answer {
            id: Uuid::new_v4().to_string(),
            submission_id: "s".into(),
            question_id: Uuid::new_v4().to_string(),
            question_type: examforge_core::model::QuestionType::McqSingle,
            raw_answer: Value::Null,
            correct_answer_snapshot: Value::Null,
            correctness: Correctness::Correct,
            marks_obtained: marks,
            marks_total: 2.0,
            feedback: String::new(),
        };
        aggregate(&mut submission, &[answer(2.0), answer(1.0), answer(0.0)]);
        assert_eq!(submission.obtained_marks, 3.0);
        assert_eq!(submission.percentage, 50.0);
    }
}
