//! Track import: structural validation, per-question detection and
//! validation, canonicalization into typed payloads, and atomic persistence.
//!
//! The import bar is deployability: a question with any critical or high
//! validation error fails the whole import and nothing is persisted.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use examforge_core::error::EngineError;
use examforge_core::grade::normalize;
use examforge_core::model::{
    Blank, Choice, Difficulty, PayloadFamily, Question, QuestionPayload, QuestionType, Section,
    Track, TrackKind, TrackStatus,
};
use examforge_core::raw::{field, image_url};
use examforge_core::validate::Severity;

use crate::ExamEngine;

/// One import problem, located within the raw track.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportIssue {
    /// Where in the track, e.g. `sections[0].questions[2]`.
    pub location: String,
    pub field: String,
    pub message: String,
    pub severity: Severity,
    pub suggested_fix: String,
}

/// The outcome of [`ExamEngine::import_track`]. On failure nothing was
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub success: bool,
    pub track_id: Option<String>,
    pub questions_created: usize,
    pub questions_by_type: BTreeMap<String, usize>,
    pub errors: Vec<ImportIssue>,
}

impl ImportReport {
    fn failure(errors: Vec<ImportIssue>) -> Self {
        Self {
            success: false,
            track_id: None,
            questions_created: 0,
            questions_by_type: BTreeMap::new(),
            errors,
        }
    }
}

/// A question canonicalized and ready to persist.
struct PreparedQuestion {
    section_idx: usize,
    order_index: u32,
    qtype: QuestionType,
    payload: QuestionPayload,
    marks: u32,
    difficulty: Difficulty,
}

impl ExamEngine {
    /// Import a raw authored track. All-or-nothing: any critical or high
    /// error anywhere in the track fails the import and persists nothing.
    pub async fn import_track(
        &self,
        raw: &Value,
        author_id: &str,
    ) -> Result<ImportReport, EngineError> {
        let mut errors: Vec<ImportIssue> = Vec::new();

        let Some(root) = raw.as_object() else {
            return Ok(ImportReport::failure(vec![issue(
                "$",
                "$",
                "track must be a JSON object",
                Severity::Critical,
                "Author the track as a JSON object with a 'sections' list",
            )]));
        };

        let sections_raw: Vec<&Value> = match field(root, "sections").and_then(Value::as_array) {
            Some(list) => list.iter().collect(),
            None => {
                return Ok(ImportReport::failure(vec![issue(
                    "$",
                    "sections",
                    "track has no 'sections' list",
                    Severity::Critical,
                    "Add a 'sections' list with 1-4 sections",
                )]));
            }
        };

        // Structural invariants: 1-4 sections, 1-10 questions each, ≤40 total.
        let limits = self.config();
        if sections_raw.is_empty() || sections_raw.len() > limits.max_sections {
            errors.push(issue(
                "$",
                "sections",
                &format!(
                    "track must have between 1 and {} sections, found {}",
                    limits.max_sections,
                    sections_raw.len()
                ),
                Severity::Critical,
                "Split or merge sections to fit the allowed range",
            ));
        }

        let mut prepared: Vec<PreparedQuestion> = Vec::new();
        let mut total_questions = 0usize;

        for (section_idx, section_raw) in sections_raw.iter().enumerate() {
            let location = format!("sections[{section_idx}]");
            let Some(section_map) = section_raw.as_object() else {
                errors.push(issue(
                    &location,
                    "$",
                    "section must be a JSON object",
                    Severity::Critical,
                    "Author each section as an object with a 'questions' list",
                ));
                continue;
            };

            let questions_raw: Vec<&Value> =
                match field(section_map, "questions").and_then(Value::as_array) {
                    Some(list) => list.iter().collect(),
                    None => {
                        errors.push(issue(
                            &location,
                            "questions",
                            "section has no 'questions' list",
                            Severity::Critical,
                            "Add a 'questions' list with 1-10 questions",
                        ));
                        continue;
                    }
                };

            if questions_raw.is_empty() || questions_raw.len() > limits.max_questions_per_section {
                errors.push(issue(
                    &location,
                    "questions",
                    &format!(
                        "section must have between 1 and {} questions, found {}",
                        limits.max_questions_per_section,
                        questions_raw.len()
                    ),
                    Severity::Critical,
                    "Move questions between sections to fit the allowed range",
                ));
                continue;
            }
            total_questions += questions_raw.len();

            for (question_idx, question_raw) in questions_raw.iter().copied().enumerate() {
                if let Some(p) =
                    self.prepare_question(question_raw, section_idx, question_idx, &mut errors)
                {
                    prepared.push(p);
                }
            }
        }

        if total_questions > limits.max_questions_total {
            errors.push(issue(
                "$",
                "sections",
                &format!(
                    "track exceeds {} questions: {total_questions}",
                    limits.max_questions_total
                ),
                Severity::Critical,
                "Split the track into multiple tracks",
            ));
        }

        if !errors.is_empty() {
            tracing::info!(errors = errors.len(), "track import rejected");
            return Ok(ImportReport::failure(errors));
        }

        // Everything is deployable; allocate ids and persist atomically.
        let now = chrono::Utc::now();
        let track_id = Uuid::new_v4().to_string();
        let kind = track_kind(root, &prepared, self.registry());

        let mut sections = Vec::with_capacity(sections_raw.len());
        for (section_idx, section_raw) in sections_raw.iter().enumerate() {
            let map = section_raw.as_object().expect("validated above");
            let count = prepared
                .iter()
                .filter(|p| p.section_idx == section_idx)
                .count();
            sections.push(Section {
                id: Uuid::new_v4().to_string(),
                track_id: track_id.clone(),
                order_index: section_idx as u32 + 1,
                title: field(map, "title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                passage_text: field(map, "passageText")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                instructions: field(map, "instructions")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                question_count: count as u32,
            });
        }

        let mut questions = Vec::with_capacity(prepared.len());
        let mut questions_by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_marks = 0u32;
        for p in prepared {
            total_marks += p.marks;
            *questions_by_type.entry(p.qtype.to_string()).or_default() += 1;
            questions.push(Question {
                id: Uuid::new_v4().to_string(),
                section_id: sections[p.section_idx].id.clone(),
                track_id: track_id.clone(),
                order_index: p.order_index,
                qtype: p.qtype,
                payload: p.payload,
                marks: p.marks,
                difficulty: p.difficulty,
                created_at: now,
            });
        }

        let track = Track {
            id: track_id.clone(),
            title: field(root, "title")
                .and_then(Value::as_str)
                .unwrap_or("Untitled track")
                .to_string(),
            kind,
            description: field(root, "description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: TrackStatus::Draft,
            total_sections: sections.len() as u32,
            total_questions: questions.len() as u32,
            total_marks,
            created_at: now,
            updated_at: now,
            author_id: author_id.to_string(),
            metadata: field(root, "metadata").cloned().unwrap_or(Value::Null),
        };

        let questions_created = questions.len();
        self.store()
            .insert_track_tree(track, sections, questions)
            .await?;

        tracing::info!(%track_id, questions_created, "track imported");
        Ok(ImportReport {
            success: true,
            track_id: Some(track_id),
            questions_created,
            questions_by_type,
            errors: Vec::new(),
        })
    }

    /// Detect, validate, and canonicalize one raw question. Issues land in
    /// `errors`; `None` means the question cannot be imported.
    fn prepare_question(
        &self,
        raw: &Value,
        section_idx: usize,
        question_idx: usize,
        errors: &mut Vec<ImportIssue>,
    ) -> Option<PreparedQuestion> {
        let location = format!("sections[{section_idx}].questions[{question_idx}]");

        let detection = self.detector().detect(raw);
        let Some(qtype) = detection.qtype else {
            errors.push(issue(
                &location,
                "type",
                "unable to detect the question type",
                Severity::Critical,
                "Declare an explicit 'type' from the supported set",
            ));
            return None;
        };

        let report =
            self.validator()
                .validate(raw, Some(qtype), self.config().asset_root.as_deref());
        if !report.deployable {
            for e in &report.errors {
                errors.push(issue(
                    &location,
                    &e.field,
                    &e.message,
                    e.severity,
                    &e.suggested_fix,
                ));
            }
            return None;
        }

        let map = raw.as_object().expect("validated as object");
        let payload = match canonicalize(map, qtype, self.registry().get(qtype).family) {
            Ok(payload) => payload,
            Err(message) => {
                errors.push(issue(
                    &location,
                    "payload",
                    &message,
                    Severity::Critical,
                    "Fix the payload so it matches the canonical shape for the type",
                ));
                return None;
            }
        };

        let marks = field(map, "marks").and_then(Value::as_u64).unwrap_or(1);
        let Some(marks) = u32::try_from(marks).ok().filter(|m| *m >= 1) else {
            errors.push(issue(
                &location,
                "marks",
                &format!("marks must be a positive integer no greater than {}", u32::MAX),
                Severity::High,
                "Set 'marks' to 1 or more",
            ));
            return None;
        };

        let difficulty = field(map, "difficulty")
            .and_then(Value::as_str)
            .and_then(|s| serde_json::from_value(Value::String(s.to_lowercase())).ok())
            .unwrap_or_default();

        Some(PreparedQuestion {
            section_idx,
            order_index: question_idx as u32 + 1,
            qtype,
            payload,
            marks,
            difficulty,
        })
    }
}

fn issue(
    location: &str,
    field: &str,
    message: &str,
    severity: Severity,
    suggested_fix: &str,
) -> ImportIssue {
    ImportIssue {
        location: location.to_string(),
        field: field.to_string(),
        message: message.to_string(),
        severity,
        suggested_fix: suggested_fix.to_string(),
    }
}

/// The track kind: explicit `kind` wins, otherwise the majority category of
/// the detected question types.
fn track_kind(
    root: &Map<String, Value>,
    prepared: &[PreparedQuestion],
    registry: &examforge_core::registry::TypeRegistry,
) -> TrackKind {
    if let Some(kind) = field(root, "kind")
        .and_then(Value::as_str)
        .and_then(|s| TrackKind::from_str(s).ok())
    {
        return kind;
    }
    let mut counts: BTreeMap<u8, (usize, TrackKind)> = BTreeMap::new();
    for p in prepared {
        let category = registry.get(p.qtype).category;
        let key = match category {
            TrackKind::Listening => 0,
            TrackKind::Reading => 1,
            TrackKind::Writing => 2,
        };
        counts.entry(key).or_insert((0, category)).0 += 1;
    }
    counts
        .values()
        .max_by_key(|(n, _)| *n)
        .map(|(_, kind)| *kind)
        .unwrap_or(TrackKind::Listening)
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(list) => list.iter().filter_map(text_of).collect(),
        other => text_of(other).map(|s| vec![s]).unwrap_or_default(),
    }
}

/// Options canonicalize to `{text, value}` pairs; a bare string becomes
/// both, and a missing `value` defaults to the text.
fn parse_options(map: &Map<String, Value>) -> Vec<Choice> {
    let Some(list) = field(map, "options").and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|entry| {
            if let Some(text) = entry.as_str() {
                let text = text.trim().to_string();
                return Some(Choice { value: text.clone(), text });
            }
            let text = entry.get("text").and_then(Value::as_str)?.trim().to_string();
            let value = entry
                .get("value")
                .and_then(Value::as_str)
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| text.clone());
            Some(Choice { text, value })
        })
        .collect()
}

/// Blanks come from a `blanks` list (strings, lists, or `{answers}`
/// objects) or from `correctAnswer`; `acceptableAnswers` merges in as
/// alternatives. Grading keys are stored normalized.
fn parse_blanks(map: &Map<String, Value>) -> Vec<Blank> {
    let mut blanks: Vec<Blank> = Vec::new();

    if let Some(list) = field(map, "blanks").and_then(Value::as_array) {
        for entry in list {
            let answers = match entry {
                Value::Object(obj) => obj
                    .get("answers")
                    .map(string_list)
                    .unwrap_or_default(),
                other => string_list(other),
            };
            blanks.push(Blank::new(answers.iter().map(|a| normalize(a)).collect()));
        }
    } else if let Some(answer) = field(map, "correctAnswer").or_else(|| field(map, "correctAnswers")) {
        for text in string_list(answer) {
            blanks.push(Blank::new(vec![normalize(&text)]));
        }
    }

    if let Some(acceptable) = field(map, "acceptableAnswers").and_then(Value::as_array) {
        let per_blank = acceptable.iter().all(Value::is_array);
        if per_blank {
            for (blank, extra) in blanks.iter_mut().zip(acceptable) {
                for text in string_list(extra) {
                    blank.answers.push(normalize(&text));
                }
            }
        } else if blanks.len() == 1 {
            for text in string_list(&Value::Array(acceptable.clone())) {
                blanks[0].answers.push(normalize(&text));
            }
        }
    }

    blanks
}

fn parse_pairs(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| text_of(v).map(|text| (k.trim().to_string(), text)))
                .collect()
        })
        .unwrap_or_default()
}

/// Rewrite a validated raw question into the canonical payload for its
/// detected type.
fn canonicalize(
    map: &Map<String, Value>,
    qtype: QuestionType,
    family: PayloadFamily,
) -> Result<QuestionPayload, String> {
    let prompt = field(map, "prompt")
        .and_then(Value::as_str)
        .ok_or("missing prompt")?
        .trim()
        .to_string();

    match family {
        PayloadFamily::ChoiceSingle => {
            let correct_answer = field(map, "correctAnswer")
                .and_then(text_of)
                .ok_or_else(|| format!("{qtype} needs a scalar correctAnswer"))?;
            Ok(QuestionPayload::ChoiceSingle {
                prompt,
                options: parse_options(map),
                correct_answer,
            })
        }
        PayloadFamily::ChoiceMultiple => {
            let key = field(map, "correctAnswers")
                .or_else(|| field(map, "correctAnswer"))
                .ok_or_else(|| format!("{qtype} needs correctAnswer(s)"))?;
            let correct_answers = string_list(key);
            if correct_answers.is_empty() {
                return Err(format!("{qtype} needs at least one correct answer"));
            }
            Ok(QuestionPayload::ChoiceMultiple {
                prompt,
                options: parse_options(map),
                correct_answers,
            })
        }
        PayloadFamily::Completion => {
            let blanks = parse_blanks(map);
            if blanks.is_empty() {
                return Err(format!("{qtype} needs blank answers"));
            }
            Ok(QuestionPayload::Completion { prompt, blanks })
        }
        PayloadFamily::CompletionLimited => {
            let blanks = parse_blanks(map);
            if blanks.is_empty() {
                return Err(format!("{qtype} needs blank answers"));
            }
            let max_words = field(map, "maxWords")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| format!("{qtype} needs a maxWords in range"))?;
            Ok(QuestionPayload::CompletionLimited { prompt, blanks, max_words })
        }
        PayloadFamily::Matching => {
            let items = field(map, "items").map(string_list).unwrap_or_default();
            let options = field(map, "options").map(string_list).unwrap_or_else(|| {
                parse_options(map).into_iter().map(|c| c.text).collect()
            });
            let correct_matches = field(map, "correctMatches")
                .map(parse_pairs)
                .unwrap_or_default();
            if correct_matches.is_empty() {
                return Err(format!("{qtype} needs correctMatches"));
            }
            Ok(QuestionPayload::Matching { prompt, items, options, correct_matches })
        }
        PayloadFamily::Cells => {
            let mut source = map.clone();
            // `cells` is the canonical spelling; tables author the same data
            // under correctAnswer.
            if let Some(cells) = field(map, "cells").cloned() {
                source.insert("blanks".into(), cells);
            }
            let cells = parse_blanks(&source);
            if cells.is_empty() {
                return Err(format!("{qtype} needs cell answers"));
            }
            Ok(QuestionPayload::Cells { prompt, cells })
        }
        PayloadFamily::Labelling => {
            let labels = field(map, "labels")
                .or_else(|| field(map, "correctAnswer"))
                .map(parse_pairs)
                .unwrap_or_default();
            if labels.is_empty() {
                return Err(format!("{qtype} needs labels"));
            }
            Ok(QuestionPayload::Labelling {
                prompt,
                labels,
                image_url: image_url(map).map(str::to_string),
            })
        }
        PayloadFamily::Writing => {
            let bound = |key| {
                field(map, key)
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
            };
            let (Some(min_words), Some(max_words)) = (bound("minWords"), bound("maxWords"))
            else {
                return Err(format!("{qtype} needs minWords and maxWords in range"));
            };
            Ok(QuestionPayload::Writing {
                prompt,
                min_words,
                max_words,
                image_url: image_url(map).map(str::to_string),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_defaults_option_value_to_text() {
        let raw = json!({
            "prompt": "Pick one",
            "options": ["Paris", "London"],
            "correctAnswer": "Paris",
        });
        let payload = canonicalize(
            raw.as_object().unwrap(),
            QuestionType::McqSingle,
            PayloadFamily::ChoiceSingle,
        )
        .unwrap();
        let QuestionPayload::ChoiceSingle { options, .. } = payload else {
            panic!("wrong family");
        };
        assert_eq!(options[0].text, "Paris");
        assert_eq!(options[0].value, "Paris");
    }

    #[test]
    fn canonicalize_scalar_answer_becomes_singleton_blank() {
        let raw = json!({ "prompt": "Fill in", "correctAnswer": "Main Road" });
        let payload = canonicalize(
            raw.as_object().unwrap(),
            QuestionType::FillGaps,
            PayloadFamily::Completion,
        )
        .unwrap();
        let QuestionPayload::Completion { blanks, .. } = payload else {
            panic!("wrong family");
        };
        assert_eq!(blanks.len(), 1);
        // Grading keys are stored normalized.
        assert_eq!(blanks[0].answers, vec!["main road".to_string()]);
    }

    #[test]
    fn canonicalize_merges_acceptable_answers() {
        let raw = json!({
            "prompt": "Fill in",
            "correctAnswer": "colour",
            "acceptableAnswers": ["color"],
        });
        let payload = canonicalize(
            raw.as_object().unwrap(),
            QuestionType::SentenceCompletion,
            PayloadFamily::Completion,
        )
        .unwrap();
        let QuestionPayload::Completion { blanks, .. } = payload else {
            panic!("wrong family");
        };
        assert_eq!(blanks[0].answers, vec!["colour".to_string(), "color".to_string()]);
    }

    #[test]
    fn canonicalize_rejects_out_of_range_word_limits() {
        let raw = json!({
            "prompt": "Fill in",
            "correctAnswer": "pool",
            "maxWords": 5_000_000_000u64,
        });
        let result = canonicalize(
            raw.as_object().unwrap(),
            QuestionType::FillGapsShort,
            PayloadFamily::CompletionLimited,
        );
        assert!(result.is_err());

        let raw = json!({
            "prompt": "Write an essay",
            "minWords": 250,
            "maxWords": 5_000_000_000u64,
        });
        let result = canonicalize(
            raw.as_object().unwrap(),
            QuestionType::WritingTask2,
            PayloadFamily::Writing,
        );
        assert!(result.is_err());
    }

    #[test]
    fn canonicalize_rejects_writing_without_bounds() {
        let raw = json!({ "prompt": "Write an essay", "minWords": 250 });
        let result = canonicalize(
            raw.as_object().unwrap(),
            QuestionType::WritingTask2,
            PayloadFamily::Writing,
        );
        assert!(result.is_err());
    }

    #[test]
    fn track_kind_prefers_explicit_field() {
        let root = json!({ "kind": "reading" });
        let kind = track_kind(
            root.as_object().unwrap(),
            &[],
            &examforge_core::registry::TypeRegistry::new(),
        );
        assert_eq!(kind, TrackKind::Reading);
    }
}
