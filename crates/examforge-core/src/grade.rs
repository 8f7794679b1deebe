//! Type-specific graders.
//!
//! Grading is deterministic and side-effect free: a canonical question plus a
//! raw student answer maps to a [`Verdict`]. The orchestrator scales the
//! fraction by the question's marks; graders never touch storage.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::TextDiff;

use crate::model::{Blank, Correctness, Question, QuestionPayload};
use crate::registry::{GraderId, TypeRegistry};

/// Character-similarity threshold for the fuzzy completion fallback.
pub const FUZZY_THRESHOLD: f64 = 0.85;

/// The outcome of grading one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    #[serde(rename = "isCorrect")]
    pub correctness: Correctness,
    /// Fraction of the question's marks earned, in [0, 1].
    pub fraction: f64,
    pub feedback: String,
}

impl Verdict {
    pub fn correct(feedback: impl Into<String>) -> Self {
        Self { correctness: Correctness::Correct, fraction: 1.0, feedback: feedback.into() }
    }

    pub fn incorrect(feedback: impl Into<String>) -> Self {
        Self { correctness: Correctness::Incorrect, fraction: 0.0, feedback: feedback.into() }
    }

    pub fn partial(fraction: f64, feedback: impl Into<String>) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        Self {
            correctness: if fraction >= 1.0 {
                Correctness::Correct
            } else {
                Correctness::Incorrect
            },
            fraction,
            feedback: feedback.into(),
        }
    }

    pub fn pending(feedback: impl Into<String>) -> Self {
        Self { correctness: Correctness::Pending, fraction: 0.0, feedback: feedback.into() }
    }
}

/// Dispatches canonical questions to their grader by registry entry.
pub struct GradingEngine {
    registry: Arc<TypeRegistry>,
    fuzzy_threshold: f64,
}

impl GradingEngine {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry, fuzzy_threshold: FUZZY_THRESHOLD }
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    /// Grade one answer. Pure: repeated invocation yields identical verdicts.
    pub fn grade(&self, question: &Question, raw_answer: &Value) -> Verdict {
        if is_empty_answer(raw_answer) {
            return Verdict::incorrect("no answer provided");
        }

        let spec = self.registry.get(question.qtype);
        match (spec.grader, &question.payload) {
            (GraderId::ExactChoice, QuestionPayload::ChoiceSingle { correct_answer, .. }) => {
                grade_exact_choice(correct_answer, raw_answer)
            }
            (GraderId::ChoiceSet, QuestionPayload::ChoiceMultiple { correct_answers, .. }) => {
                grade_choice_set(correct_answers, raw_answer)
            }
            (GraderId::BlankFill, QuestionPayload::Completion { blanks, .. }) => {
                let fuzzy = spec.fuzzy_match.then_some(self.fuzzy_threshold);
                grade_blanks(blanks, raw_answer, fuzzy, "blank")
            }
            (
                GraderId::BlankFillLimited,
                QuestionPayload::CompletionLimited { blanks, max_words, .. },
            ) => {
                let over = answer_entries(raw_answer)
                    .iter()
                    .any(|entry| word_count(entry) > *max_words as usize);
                if over {
                    return Verdict::incorrect(format!("exceeds {max_words}-word limit"));
                }
                grade_blanks(blanks, raw_answer, None, "blank")
            }
            (GraderId::PairMatch, QuestionPayload::Matching { correct_matches, .. }) => {
                grade_pairs(correct_matches, raw_answer, "item")
            }
            (GraderId::CellMatch, QuestionPayload::Cells { cells, .. }) => {
                grade_blanks(cells, raw_answer, None, "cell")
            }
            (GraderId::LabelMatch, QuestionPayload::Labelling { labels, .. }) => {
                grade_pairs(labels, raw_answer, "label")
            }
            (GraderId::WritingLength, QuestionPayload::Writing { min_words, max_words, .. }) => {
                grade_writing(*min_words, *max_words, raw_answer)
            }
            (grader, payload) => {
                tracing::warn!(
                    qtype = %question.qtype,
                    ?grader,
                    family = ?payload.family(),
                    "payload family does not match grader; grading not supported"
                );
                Verdict::incorrect("grading not supported")
            }
        }
    }
}

/// Lowercase, trim, and collapse internal whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalize and fold the T/F/NG synonym groups: `t↔true↔yes`,
/// `f↔false↔no`, `ng↔not given`.
pub fn fold_synonyms(text: &str) -> String {
    let normalized = normalize(text);
    match normalized.as_str() {
        "t" | "true" | "yes" | "y" => "true".to_string(),
        "f" | "false" | "no" | "n" => "false".to_string(),
        "ng" | "not given" | "notgiven" => "not given".to_string(),
        _ => normalized,
    }
}

/// Character-level similarity in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    TextDiff::from_chars(a, b).ratio() as f64
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn is_empty_answer(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(list) => list.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// A scalar student answer as text; numbers and booleans stringify.
fn scalar_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        // A singleton list is accepted where a scalar is expected.
        Value::Array(list) if list.len() == 1 => scalar_text(&list[0]),
        _ => None,
    }
}

/// The student answer as an ordered list of entries; a scalar becomes a
/// singleton.
fn answer_entries(raw: &Value) -> Vec<String> {
    match raw {
        Value::Array(list) => list
            .iter()
            .map(|v| scalar_text(v).unwrap_or_default())
            .collect(),
        other => scalar_text(other).map(|s| vec![s]).unwrap_or_default(),
    }
}

fn grade_exact_choice(correct: &str, raw: &Value) -> Verdict {
    let Some(given) = scalar_text(raw) else {
        return Verdict::incorrect("answer must be a single value");
    };
    if fold_synonyms(&given) == fold_synonyms(correct) {
        Verdict::correct("correct")
    } else {
        Verdict::incorrect("incorrect")
    }
}

/// Set semantics with corrected-for-wrong partial credit:
/// `max(0, correct_selected − incorrect_selected) / |correctSet|`, clamped.
fn grade_choice_set(correct: &[String], raw: &Value) -> Verdict {
    let correct_set: BTreeSet<String> = correct.iter().map(|s| normalize(s)).collect();
    let selected: BTreeSet<String> = match raw {
        Value::Array(list) => list
            .iter()
            .filter_map(|v| scalar_text(v))
            .map(|s| normalize(&s))
            .collect(),
        other => scalar_text(other)
            .map(|s| BTreeSet::from([normalize(&s)]))
            .unwrap_or_default(),
    };
    if correct_set.is_empty() {
        return Verdict::incorrect("question has no answer key");
    }

    let correct_selected = selected.intersection(&correct_set).count();
    let incorrect_selected = selected.difference(&correct_set).count();
    let fraction = (correct_selected.saturating_sub(incorrect_selected)) as f64
        / correct_set.len() as f64;

    Verdict::partial(
        fraction,
        format!("{correct_selected} of {} correct selections", correct_set.len()),
    )
}

/// Per-blank (or per-cell) equality with an optional fuzzy fallback;
/// the fraction is the mean over blanks.
fn grade_blanks(blanks: &[Blank], raw: &Value, fuzzy: Option<f64>, unit: &str) -> Verdict {
    if blanks.is_empty() {
        return Verdict::incorrect("question has no answer key");
    }
    let entries = answer_entries(raw);

    let mut hits = 0usize;
    for (idx, blank) in blanks.iter().enumerate() {
        let Some(given) = entries.get(idx) else { continue };
        let given = normalize(given);
        if given.is_empty() {
            continue;
        }
        let exact = blank.answers.iter().any(|a| normalize(a) == given);
        let close = !exact
            && fuzzy.is_some_and(|threshold| {
                blank
                    .answers
                    .iter()
                    .any(|a| similarity(&normalize(a), &given) >= threshold)
            });
        if exact || close {
            hits += 1;
        }
    }

    Verdict::partial(
        hits as f64 / blanks.len() as f64,
        format!("{hits} of {} {unit}s correct", blanks.len()),
    )
}

/// Element-wise map comparison under case-folded equality.
fn grade_pairs(correct: &BTreeMap<String, String>, raw: &Value, unit: &str) -> Verdict {
    if correct.is_empty() {
        return Verdict::incorrect("question has no answer key");
    }
    let Some(given) = raw.as_object() else {
        return Verdict::incorrect(format!("answer must map each {unit} to a choice"));
    };

    let folded_given: BTreeMap<String, String> = given
        .iter()
        .filter_map(|(k, v)| scalar_text(v).map(|text| (normalize(k), normalize(&text))))
        .collect();

    let mut hits = 0usize;
    for (item, expected) in correct {
        if folded_given.get(&normalize(item)) == Some(&normalize(expected)) {
            hits += 1;
        }
    }

    Verdict::partial(
        hits as f64 / correct.len() as f64,
        format!("{hits} of {} {unit}s correct", correct.len()),
    )
}

/// Word-count gate for writing tasks. In-range essays await manual grading.
fn grade_writing(min_words: u32, max_words: u32, raw: &Value) -> Verdict {
    let Some(essay) = raw.as_str() else {
        return Verdict::incorrect("answer must be the essay text");
    };
    let words = word_count(essay);
    if words < min_words as usize {
        return Verdict::incorrect(format!("too short: {words} words, minimum {min_words}"));
    }
    if words > max_words as usize {
        return Verdict::incorrect(format!("too long: {words} words, maximum {max_words}"));
    }
    Verdict::pending("awaits manual grading")
}
