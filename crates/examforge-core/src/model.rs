//! Core data model types for examforge.
//!
//! These are the fundamental types the entire engine uses to represent
//! tracks, sections, questions, submissions, and answers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The test skill a track exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Listening,
    Reading,
    Writing,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Listening => write!(f, "listening"),
            TrackKind::Reading => write!(f, "reading"),
            TrackKind::Writing => write!(f, "writing"),
        }
    }
}

impl FromStr for TrackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "listening" => Ok(TrackKind::Listening),
            "reading" => Ok(TrackKind::Reading),
            "writing" => Ok(TrackKind::Writing),
            other => Err(format!("unknown track kind: {other}")),
        }
    }
}

/// Publication status of a track. Transitions are forward-only:
/// draft → published → active → archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Draft,
    Published,
    Active,
    Archived,
}

impl TrackStatus {
    fn rank(self) -> u8 {
        match self {
            TrackStatus::Draft => 0,
            TrackStatus::Published => 1,
            TrackStatus::Active => 2,
            TrackStatus::Archived => 3,
        }
    }

    /// Whether moving from `self` to `next` is allowed (never backward).
    pub fn can_transition_to(self, next: TrackStatus) -> bool {
        next.rank() >= self.rank()
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackStatus::Draft => write!(f, "draft"),
            TrackStatus::Published => write!(f, "published"),
            TrackStatus::Active => write!(f, "active"),
            TrackStatus::Archived => write!(f, "archived"),
        }
    }
}

/// A complete test: the top-level authored artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Unique identifier.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// The skill this track tests.
    pub kind: TrackKind,
    #[serde(default)]
    pub description: String,
    pub status: TrackStatus,
    pub total_sections: u32,
    pub total_questions: u32,
    pub total_marks: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Author identifier, opaque to the engine.
    pub author_id: String,
    /// Opaque metadata carried through unchanged.
    #[serde(default)]
    pub metadata: Value,
}

/// An ordered subdivision of a track, typically tied to one passage or
/// recording. Holds 1–10 questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub track_id: String,
    /// 1-based position within the track; unique per track, at most 4.
    pub order_index: u32,
    #[serde(default)]
    pub title: String,
    /// Reading passages only.
    #[serde(default)]
    pub passage_text: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    pub question_count: u32,
}

/// Authoring difficulty tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// A single gradeable prompt within a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub section_id: String,
    pub track_id: String,
    /// 1-based position within the section.
    pub order_index: u32,
    #[serde(rename = "type")]
    pub qtype: QuestionType,
    pub payload: QuestionPayload,
    /// Marks available; positive, defaults to 1.
    pub marks: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Student-safe projection: the payload with every answer key stripped.
    pub fn student_view(&self) -> Value {
        json!({
            "id": self.id,
            "sectionId": self.section_id,
            "trackId": self.track_id,
            "orderIndex": self.order_index,
            "type": self.qtype.to_string(),
            "marks": self.marks,
            "payload": self.payload.student_view(),
        })
    }
}

/// The closed set of supported question types.
///
/// Listening carries ten types, reading eleven, writing two. Every other
/// component consults the registry entry keyed by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    // Listening
    McqSingle,
    McqMultiple,
    SentenceCompletion,
    FormCompletion,
    TableCompletion,
    FlowchartCompletion,
    FillGaps,
    FillGapsShort,
    Matching,
    MapLabelling,
    // Reading
    TrueFalseNg,
    YesNoNg,
    MatchingHeadings,
    MatchingFeatures,
    MatchingEndings,
    MatchingInformation,
    NoteCompletion,
    SummaryCompletion,
    DiagramLabeling,
    IdentifyingInformation,
    ShortAnswer,
    // Writing
    WritingTask1,
    WritingTask2,
}

impl QuestionType {
    /// All 23 types in registry order.
    pub const ALL: [QuestionType; 23] = [
        QuestionType::McqSingle,
        QuestionType::McqMultiple,
        QuestionType::SentenceCompletion,
        QuestionType::FormCompletion,
        QuestionType::TableCompletion,
        QuestionType::FlowchartCompletion,
        QuestionType::FillGaps,
        QuestionType::FillGapsShort,
        QuestionType::Matching,
        QuestionType::MapLabelling,
        QuestionType::TrueFalseNg,
        QuestionType::YesNoNg,
        QuestionType::MatchingHeadings,
        QuestionType::MatchingFeatures,
        QuestionType::MatchingEndings,
        QuestionType::MatchingInformation,
        QuestionType::NoteCompletion,
        QuestionType::SummaryCompletion,
        QuestionType::DiagramLabeling,
        QuestionType::IdentifyingInformation,
        QuestionType::ShortAnswer,
        QuestionType::WritingTask1,
        QuestionType::WritingTask2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::McqSingle => "mcq_single",
            QuestionType::McqMultiple => "mcq_multiple",
            QuestionType::SentenceCompletion => "sentence_completion",
            QuestionType::FormCompletion => "form_completion",
            QuestionType::TableCompletion => "table_completion",
            QuestionType::FlowchartCompletion => "flowchart_completion",
            QuestionType::FillGaps => "fill_gaps",
            QuestionType::FillGapsShort => "fill_gaps_short",
            QuestionType::Matching => "matching",
            QuestionType::MapLabelling => "map_labelling",
            QuestionType::TrueFalseNg => "true_false_ng",
            QuestionType::YesNoNg => "yes_no_ng",
            QuestionType::MatchingHeadings => "matching_headings",
            QuestionType::MatchingFeatures => "matching_features",
            QuestionType::MatchingEndings => "matching_endings",
            QuestionType::MatchingInformation => "matching_information",
            QuestionType::NoteCompletion => "note_completion",
            QuestionType::SummaryCompletion => "summary_completion",
            QuestionType::DiagramLabeling => "diagram_labeling",
            QuestionType::IdentifyingInformation => "identifying_information",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::WritingTask1 => "writing_task1",
            QuestionType::WritingTask2 => "writing_task2",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestionType::ALL
            .iter()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .copied()
            .ok_or_else(|| format!("unknown question type: {s}"))
    }
}

/// A single selectable option in a choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Displayed text.
    pub text: String,
    /// Grading value; defaults to `text` during canonicalization.
    pub value: String,
}

/// One blank (or cell) with its accepted answers.
///
/// The first entry is the canonical key; the rest come from
/// `acceptableAnswers`. All entries are stored normalized (trimmed,
/// case-folded) by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blank {
    pub answers: Vec<String>,
}

impl Blank {
    pub fn new(answers: Vec<String>) -> Self {
        Self { answers }
    }
}

/// The canonical, type-dependent body of a question.
///
/// Each variant carries exactly the canonical fields of its payload family;
/// the registry maps every `QuestionType` to the family it must use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum QuestionPayload {
    /// Single-choice: mcq_single, true_false_ng, yes_no_ng,
    /// identifying_information. `options` may be empty for T/F/NG style
    /// questions where the choices are implicit.
    ChoiceSingle {
        prompt: String,
        #[serde(default)]
        options: Vec<Choice>,
        correct_answer: String,
    },
    /// Multi-choice with set semantics: mcq_multiple.
    ChoiceMultiple {
        prompt: String,
        options: Vec<Choice>,
        correct_answers: Vec<String>,
    },
    /// Per-blank completion: sentence/form/note/summary completion, fill_gaps.
    Completion {
        prompt: String,
        blanks: Vec<Blank>,
    },
    /// Word-limited completion: fill_gaps_short, short_answer.
    CompletionLimited {
        prompt: String,
        blanks: Vec<Blank>,
        max_words: u32,
    },
    /// Item → option pairing: matching, matching_headings, matching_features,
    /// matching_endings, matching_information.
    Matching {
        prompt: String,
        items: Vec<String>,
        options: Vec<String>,
        correct_matches: BTreeMap<String, String>,
    },
    /// Cell-wise completion: table_completion, flowchart_completion.
    Cells {
        prompt: String,
        cells: Vec<Blank>,
    },
    /// Label → text: map_labelling, diagram_labeling.
    Labelling {
        prompt: String,
        labels: BTreeMap<String, String>,
        #[serde(default)]
        image_url: Option<String>,
    },
    /// Free writing with length bounds: writing_task1, writing_task2.
    Writing {
        prompt: String,
        min_words: u32,
        max_words: u32,
        #[serde(default)]
        image_url: Option<String>,
    },
}

impl QuestionPayload {
    /// The payload family discriminant used by the registry.
    pub fn family(&self) -> PayloadFamily {
        match self {
            QuestionPayload::ChoiceSingle { .. } => PayloadFamily::ChoiceSingle,
            QuestionPayload::ChoiceMultiple { .. } => PayloadFamily::ChoiceMultiple,
            QuestionPayload::Completion { .. } => PayloadFamily::Completion,
            QuestionPayload::CompletionLimited { .. } => PayloadFamily::CompletionLimited,
            QuestionPayload::Matching { .. } => PayloadFamily::Matching,
            QuestionPayload::Cells { .. } => PayloadFamily::Cells,
            QuestionPayload::Labelling { .. } => PayloadFamily::Labelling,
            QuestionPayload::Writing { .. } => PayloadFamily::Writing,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            QuestionPayload::ChoiceSingle { prompt, .. }
            | QuestionPayload::ChoiceMultiple { prompt, .. }
            | QuestionPayload::Completion { prompt, .. }
            | QuestionPayload::CompletionLimited { prompt, .. }
            | QuestionPayload::Matching { prompt, .. }
            | QuestionPayload::Cells { prompt, .. }
            | QuestionPayload::Labelling { prompt, .. }
            | QuestionPayload::Writing { prompt, .. } => prompt,
        }
    }

    /// The payload with every answer key stripped: `correctAnswer(s)`,
    /// `correctMatches`, per-blank/cell/label keys, `acceptableAnswers`.
    pub fn student_view(&self) -> Value {
        match self {
            QuestionPayload::ChoiceSingle { prompt, options, .. } => json!({
                "kind": "choice_single",
                "prompt": prompt,
                "options": options,
            }),
            QuestionPayload::ChoiceMultiple { prompt, options, .. } => json!({
                "kind": "choice_multiple",
                "prompt": prompt,
                "options": options,
            }),
            QuestionPayload::Completion { prompt, blanks } => json!({
                "kind": "completion",
                "prompt": prompt,
                "blankCount": blanks.len(),
            }),
            QuestionPayload::CompletionLimited { prompt, blanks, max_words } => json!({
                "kind": "completion_limited",
                "prompt": prompt,
                "blankCount": blanks.len(),
                "maxWords": max_words,
            }),
            QuestionPayload::Matching { prompt, items, options, .. } => json!({
                "kind": "matching",
                "prompt": prompt,
                "items": items,
                "options": options,
            }),
            QuestionPayload::Cells { prompt, cells } => json!({
                "kind": "cells",
                "prompt": prompt,
                "cellCount": cells.len(),
            }),
            QuestionPayload::Labelling { prompt, labels, image_url } => json!({
                "kind": "labelling",
                "prompt": prompt,
                "labels": labels.keys().collect::<Vec<_>>(),
                "imageUrl": image_url,
            }),
            QuestionPayload::Writing { prompt, min_words, max_words, image_url } => json!({
                "kind": "writing",
                "prompt": prompt,
                "minWords": min_words,
                "maxWords": max_words,
                "imageUrl": image_url,
            }),
        }
    }

    /// The full correct key as JSON, snapshotted onto answers at grading time.
    pub fn answer_key(&self) -> Value {
        match self {
            QuestionPayload::ChoiceSingle { correct_answer, .. } => json!(correct_answer),
            QuestionPayload::ChoiceMultiple { correct_answers, .. } => json!(correct_answers),
            QuestionPayload::Completion { blanks, .. }
            | QuestionPayload::CompletionLimited { blanks, .. } => json!(blanks),
            QuestionPayload::Matching { correct_matches, .. } => json!(correct_matches),
            QuestionPayload::Cells { cells, .. } => json!(cells),
            QuestionPayload::Labelling { labels, .. } => json!(labels),
            QuestionPayload::Writing { .. } => Value::Null,
        }
    }
}

/// Discriminant of the payload variant families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFamily {
    ChoiceSingle,
    ChoiceMultiple,
    Completion,
    CompletionLimited,
    Matching,
    Cells,
    Labelling,
    Writing,
}

/// Lifecycle of one student's attempt at one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    InProgress,
    Submitted,
    Graded,
    Published,
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::InProgress => write!(f, "in_progress"),
            SubmissionStatus::Submitted => write!(f, "submitted"),
            SubmissionStatus::Graded => write!(f, "graded"),
            SubmissionStatus::Published => write!(f, "published"),
        }
    }
}

/// One student's attempt at one track.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub track_id: String,
    pub student_id: String,
    pub status: SubmissionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_spent_seconds: u64,
    pub total_questions: u32,
    pub total_marks: u32,
    pub obtained_marks: f64,
    pub percentage: f64,
}

/// Tri-valued grading outcome. `Pending` means a writing task awaits a
/// manual grade; on the wire it is `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Correctness {
    Correct,
    Incorrect,
    Pending,
}

impl From<Option<bool>> for Correctness {
    fn from(v: Option<bool>) -> Self {
        match v {
            Some(true) => Correctness::Correct,
            Some(false) => Correctness::Incorrect,
            None => Correctness::Pending,
        }
    }
}

impl From<Correctness> for Option<bool> {
    fn from(c: Correctness) -> Self {
        match c {
            Correctness::Correct => Some(true),
            Correctness::Incorrect => Some(false),
            Correctness::Pending => None,
        }
    }
}

/// The student's response to one question within a submission, including
/// the grader's verdict once graded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: String,
    pub submission_id: String,
    pub question_id: String,
    /// Type snapshot taken when the answer is saved.
    pub question_type: QuestionType,
    /// The student's input; shape matches the question's canonical answer
    /// shape (scalar, list, map, or text).
    pub raw_answer: Value,
    /// Copied from the question at grading time.
    #[serde(default)]
    pub correct_answer_snapshot: Value,
    #[serde(rename = "isCorrect")]
    pub correctness: Correctness,
    pub marks_obtained: f64,
    pub marks_total: f64,
    #[serde(default)]
    pub feedback: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_type_display_and_parse() {
        assert_eq!(QuestionType::McqSingle.to_string(), "mcq_single");
        assert_eq!(QuestionType::TrueFalseNg.to_string(), "true_false_ng");
        assert_eq!(
            "mcq_multiple".parse::<QuestionType>().unwrap(),
            QuestionType::McqMultiple
        );
        assert_eq!(
            "Writing_Task1".parse::<QuestionType>().unwrap(),
            QuestionType::WritingTask1
        );
        assert!("essay".parse::<QuestionType>().is_err());
        assert_eq!(QuestionType::ALL.len(), 23);
    }

    #[test]
    fn track_status_forward_only() {
        assert!(TrackStatus::Draft.can_transition_to(TrackStatus::Published));
        assert!(TrackStatus::Published.can_transition_to(TrackStatus::Archived));
        assert!(!TrackStatus::Active.can_transition_to(TrackStatus::Draft));
        assert!(!TrackStatus::Archived.can_transition_to(TrackStatus::Published));
        // Self-transitions are no-ops, not violations.
        assert!(TrackStatus::Active.can_transition_to(TrackStatus::Active));
    }

    #[test]
    fn correctness_wire_encoding() {
        assert_eq!(serde_json::to_value(Correctness::Correct).unwrap(), json!(true));
        assert_eq!(serde_json::to_value(Correctness::Incorrect).unwrap(), json!(false));
        assert_eq!(serde_json::to_value(Correctness::Pending).unwrap(), Value::Null);
        let c: Correctness = serde_json::from_value(Value::Null).unwrap();
        assert_eq!(c, Correctness::Pending);
    }

    #[test]
    fn student_view_strips_answer_keys() {
        let payload = QuestionPayload::ChoiceSingle {
            prompt: "Capital of France?".into(),
            options: vec![
                Choice { text: "Paris".into(), value: "A".into() },
                Choice { text: "London".into(), value: "B".into() },
            ],
            correct_answer: "A".into(),
        };
        let view = payload.student_view();
        assert!(view.get("correctAnswer").is_none());
        assert_eq!(view["options"][0]["text"], "Paris");

        let completion = QuestionPayload::Completion {
            prompt: "Fill the blank".into(),
            blanks: vec![Blank::new(vec!["main road".into()])],
        };
        let view = completion.student_view();
        assert!(view.get("blanks").is_none());
        assert_eq!(view["blankCount"], 1);
    }

    #[test]
    fn payload_serde_roundtrip() {
        let payload = QuestionPayload::Matching {
            prompt: "Match the speakers".into(),
            items: vec!["Speaker 1".into(), "Speaker 2".into()],
            options: vec!["A".into(), "B".into(), "C".into()],
            correct_matches: BTreeMap::from([
                ("Speaker 1".to_string(), "B".to_string()),
                ("Speaker 2".to_string(), "A".to_string()),
            ]),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("correctMatches"));
        let back: QuestionPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
        assert_eq!(back.family(), PayloadFamily::Matching);
    }
}
