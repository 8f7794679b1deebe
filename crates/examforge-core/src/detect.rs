//! Question type auto-detection.
//!
//! Six independent heuristics each cast a `(type, confidence)` vote over a
//! raw authored question object. Votes are pooled per type as
//! Σ(confidence × method weight); the winner's pooled sum is normalized by
//! the total weight of the methods that voted for it. An explicit in-registry
//! `type` field short-circuits the vote at confidence 1.0.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{QuestionType, TrackKind};
use crate::raw::{audio_url, field, has, image_url, options_list};
use crate::registry::TypeRegistry;

/// The six detection heuristics, in descending weight order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Structure,
    Keyword,
    DataType,
    AnswerPattern,
    Complexity,
    Asset,
}

impl DetectionMethod {
    pub fn weight(self) -> f64 {
        match self {
            DetectionMethod::Structure => 0.25,
            DetectionMethod::Keyword => 0.20,
            DetectionMethod::DataType => 0.20,
            DetectionMethod::AnswerPattern => 0.15,
            DetectionMethod::Complexity => 0.10,
            DetectionMethod::Asset => 0.10,
        }
    }
}

/// Confidence bands reported alongside the numeric confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            ConfidenceLevel::High
        } else if confidence >= 0.7 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// One method's vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodVote {
    pub method: DetectionMethod,
    #[serde(rename = "type")]
    pub qtype: QuestionType,
    pub confidence: f64,
}

/// The detector's overall verdict for one raw question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    #[serde(rename = "type")]
    pub qtype: Option<QuestionType>,
    pub confidence: f64,
    pub level: ConfidenceLevel,
    /// Per-method results, empty when an explicit `type` short-circuited.
    pub votes: Vec<MethodVote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Detection {
    fn invalid(message: &str) -> Self {
        Self {
            qtype: None,
            confidence: 0.0,
            level: ConfidenceLevel::Low,
            votes: Vec::new(),
            error: Some(message.to_string()),
        }
    }
}

/// Infers question types from raw authored JSON.
pub struct TypeDetector {
    registry: Arc<TypeRegistry>,
}

impl TypeDetector {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Detect the type of a raw question object.
    pub fn detect(&self, raw: &Value) -> Detection {
        let Some(map) = raw.as_object() else {
            return Detection::invalid("invalid: question must be a JSON object");
        };

        // An explicit, known type skips the vote entirely.
        if let Some(declared) = field(map, "type").and_then(Value::as_str) {
            if let Some(spec) = self.registry.lookup(declared) {
                return Detection {
                    qtype: Some(spec.qtype),
                    confidence: 1.0,
                    level: ConfidenceLevel::High,
                    votes: Vec::new(),
                    error: None,
                };
            }
        }

        let mut votes = Vec::new();
        let methods: [(DetectionMethod, Option<(QuestionType, f64)>); 6] = [
            (DetectionMethod::Structure, detect_structure(map)),
            (DetectionMethod::Keyword, self.detect_keyword(map)),
            (DetectionMethod::DataType, detect_data_type(map)),
            (DetectionMethod::AnswerPattern, detect_answer_pattern(map)),
            (DetectionMethod::Complexity, detect_complexity(map)),
            (DetectionMethod::Asset, detect_asset(map)),
        ];
        for (method, vote) in methods {
            if let Some((qtype, confidence)) = vote {
                votes.push(MethodVote { method, qtype, confidence });
            }
        }

        if votes.is_empty() {
            return Detection {
                qtype: None,
                confidence: 0.0,
                level: ConfidenceLevel::Low,
                votes,
                error: None,
            };
        }

        // Pool weighted votes per candidate type.
        let mut pooled: HashMap<QuestionType, (f64, f64)> = HashMap::new();
        for vote in &votes {
            let entry = pooled.entry(vote.qtype).or_insert((0.0, 0.0));
            entry.0 += vote.confidence * vote.method.weight();
            entry.1 += vote.method.weight();
        }

        let winner = pooled
            .iter()
            .max_by(|(a_type, (a_sum, _)), (b_type, (b_sum, _))| {
                a_sum
                    .partial_cmp(b_sum)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Residual tie: prefer listening > reading > writing.
                    .then_with(|| {
                        category_rank(self.registry.get(**b_type).category)
                            .cmp(&category_rank(self.registry.get(**a_type).category))
                    })
            })
            .map(|(qtype, (sum, weight))| (*qtype, (sum / weight).clamp(0.0, 1.0)));

        let (qtype, confidence) = winner.expect("non-empty vote pool");
        tracing::debug!(%qtype, confidence, votes = votes.len(), "type detected");

        Detection {
            qtype: Some(qtype),
            confidence,
            level: ConfidenceLevel::from_confidence(confidence),
            votes,
            error: None,
        }
    }

    /// Keyword method: case-insensitive substring match of prompt and
    /// instructions against each type's keyword bag. Confidence grows with
    /// the number of matched keywords.
    fn detect_keyword(&self, map: &Map<String, Value>) -> Option<(QuestionType, f64)> {
        let mut haystack = String::new();
        for key in ["prompt", "instructions", "title"] {
            if let Some(text) = field(map, key).and_then(Value::as_str) {
                haystack.push_str(&text.to_lowercase());
                haystack.push(' ');
            }
        }
        if haystack.trim().is_empty() {
            return None;
        }

        let mut best: Option<(QuestionType, usize)> = None;
        for spec in self.registry.iter() {
            let hits = spec
                .keywords
                .iter()
                .filter(|kw| haystack.contains(&kw.to_lowercase()))
                .count();
            if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
                best = Some((spec.qtype, hits));
            }
        }

        best.map(|(qtype, hits)| (qtype, (0.5 + 0.15 * hits as f64).min(0.95)))
    }
}

fn category_rank(kind: TrackKind) -> u8 {
    match kind {
        TrackKind::Listening => 0,
        TrackKind::Reading => 1,
        TrackKind::Writing => 2,
    }
}

/// Structure method: field shapes route directly to a type.
fn detect_structure(map: &Map<String, Value>) -> Option<(QuestionType, f64)> {
    // Writing tasks are the only types bounded by min/max words.
    if has(map, "minWords") && has(map, "maxWords") {
        let has_figure = image_url(map).is_some();
        return Some(if has_figure {
            (QuestionType::WritingTask1, 0.9)
        } else {
            (QuestionType::WritingTask2, 0.85)
        });
    }

    if has(map, "items") && has(map, "options") && has(map, "correctMatches") {
        return Some((QuestionType::Matching, 0.9));
    }

    if has(map, "table") {
        return Some((QuestionType::TableCompletion, 0.9));
    }
    if has(map, "flowchart") {
        return Some((QuestionType::FlowchartCompletion, 0.9));
    }
    if has(map, "form") {
        return Some((QuestionType::FormCompletion, 0.85));
    }

    if has(map, "labels") {
        let on_map = image_url(map).is_some_and(|url| url.to_lowercase().contains("map"));
        return Some(if on_map {
            (QuestionType::MapLabelling, 0.9)
        } else {
            (QuestionType::DiagramLabeling, 0.75)
        });
    }

    if let Some(options) = options_list(map) {
        let pairs = options.iter().all(|o| {
            o.is_string() || (o.get("text").is_some() && o.get("value").is_some())
        });
        if !options.is_empty() && pairs {
            let multi = field(map, "correctAnswer").is_some_and(Value::is_array)
                || has(map, "correctAnswers");
            return Some(if multi {
                (QuestionType::McqMultiple, 0.9)
            } else {
                (QuestionType::McqSingle, 0.9)
            });
        }
    }

    if has(map, "maxWords") {
        return Some((QuestionType::FillGapsShort, 0.8));
    }
    if has(map, "blanks") || has(map, "gaps") {
        return Some((QuestionType::FillGaps, 0.7));
    }

    None
}

/// DataType method: the JSON type of `correctAnswer` paired with the
/// presence/shape of `options`.
fn detect_data_type(map: &Map<String, Value>) -> Option<(QuestionType, f64)> {
    let answer = field(map, "correctAnswer")
        .or_else(|| field(map, "correctAnswers"))
        .or_else(|| field(map, "correctMatches"))?;
    let has_options = options_list(map).is_some_and(|o| !o.is_empty());

    match answer {
        Value::Array(_) if has_options => Some((QuestionType::McqMultiple, 0.7)),
        Value::Array(_) => Some((QuestionType::FillGaps, 0.5)),
        Value::Object(_) => Some((QuestionType::Matching, 0.65)),
        Value::String(_) | Value::Number(_) | Value::Bool(_) if has_options => {
            Some((QuestionType::McqSingle, 0.7))
        }
        Value::String(_) | Value::Number(_) => Some((QuestionType::SentenceCompletion, 0.4)),
        _ => None,
    }
}

/// AnswerPattern method: what the answer content looks like.
fn detect_answer_pattern(map: &Map<String, Value>) -> Option<(QuestionType, f64)> {
    let answer = field(map, "correctAnswer")?;

    if let Some(text) = answer.as_str() {
        let folded = text.trim().to_lowercase();
        match folded.as_str() {
            "t" | "f" | "ng" | "true" | "false" | "not given" => {
                return Some((QuestionType::IdentifyingInformation, 0.75));
            }
            "yes" | "no" => return Some((QuestionType::YesNoNg, 0.7)),
            _ => {}
        }
        let words = folded.split_whitespace().count();
        if words > 10 {
            return Some((QuestionType::WritingTask2, 0.5));
        }
        if words <= 3 && folded.chars().any(|c| c.is_ascii_digit()) {
            return Some((QuestionType::SentenceCompletion, 0.55));
        }
        if words <= 3 {
            return Some((QuestionType::SentenceCompletion, 0.45));
        }
    }

    if let Some(list) = answer.as_array() {
        let all_short = list.iter().all(|v| {
            v.as_str().is_some_and(|s| s.split_whitespace().count() <= 3)
        });
        if !list.is_empty() && all_short {
            return Some((QuestionType::FillGaps, 0.55));
        }
    }

    None
}

/// Complexity method: option counts, cell counts, and nesting depth act as a
/// weak tie-break among candidates.
fn detect_complexity(map: &Map<String, Value>) -> Option<(QuestionType, f64)> {
    if let Some(table) = field(map, "table") {
        if depth(table) >= 2 {
            return Some((QuestionType::TableCompletion, 0.4));
        }
    }
    if let Some(options) = options_list(map) {
        if options.len() >= 6 {
            return Some((QuestionType::Matching, 0.4));
        }
        if (2..=5).contains(&options.len()) {
            return Some((QuestionType::McqSingle, 0.35));
        }
    }
    let nesting = 1 + map.values().map(depth).max().unwrap_or(0);
    if nesting >= 4 {
        return Some((QuestionType::FlowchartCompletion, 0.3));
    }
    None
}

fn depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Asset method: presence and naming of media URLs.
fn detect_asset(map: &Map<String, Value>) -> Option<(QuestionType, f64)> {
    if let Some(url) = image_url(map) {
        let lowered = url.to_lowercase();
        if lowered.contains("map") {
            return Some((QuestionType::MapLabelling, 0.85));
        }
        if lowered.contains("diagram") {
            return Some((QuestionType::DiagramLabeling, 0.8));
        }
        if (lowered.contains("chart") || lowered.contains("graph")) && has(map, "minWords") {
            return Some((QuestionType::WritingTask1, 0.8));
        }
        return Some((QuestionType::DiagramLabeling, 0.4));
    }

    if audio_url(map).is_some() {
        // Audio implies listening; fill-gaps is the weakest safe guess.
        return Some((QuestionType::FillGaps, 0.3));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detector() -> TypeDetector {
        TypeDetector::new(Arc::new(TypeRegistry::new()))
    }

    #[test]
    fn explicit_type_short_circuits_at_full_confidence() {
        let raw = json!({
            "type": "mcq_single",
            "prompt": "Capital of France?",
            "options": [{"text": "Paris", "value": "A"}],
            "correctAnswer": "A",
        });
        let detection = detector().detect(&raw);
        assert_eq!(detection.qtype, Some(QuestionType::McqSingle));
        assert_eq!(detection.confidence, 1.0);
        assert_eq!(detection.level, ConfidenceLevel::High);
        assert!(detection.votes.is_empty());
    }

    #[test]
    fn unknown_explicit_type_falls_back_to_voting() {
        let raw = json!({
            "type": "made_up_type",
            "prompt": "Choose the correct letter",
            "options": [
                {"text": "Paris", "value": "A"},
                {"text": "London", "value": "B"},
            ],
            "correctAnswer": "A",
        });
        let detection = detector().detect(&raw);
        assert_eq!(detection.qtype, Some(QuestionType::McqSingle));
        assert!(!detection.votes.is_empty());
    }

    #[test]
    fn non_object_input_is_invalid() {
        let detection = detector().detect(&json!("just a string"));
        assert_eq!(detection.qtype, None);
        assert_eq!(detection.confidence, 0.0);
        assert_eq!(detection.level, ConfidenceLevel::Low);
        assert!(detection.error.as_deref().unwrap_or("").contains("invalid"));
    }

    #[test]
    fn empty_object_yields_no_votes() {
        let detection = detector().detect(&json!({}));
        assert_eq!(detection.qtype, None);
        assert_eq!(detection.confidence, 0.0);
        assert!(detection.votes.is_empty());
        assert!(detection.error.is_none());
    }

    #[test]
    fn mcq_single_detected_by_structure_and_datatype() {
        let raw = json!({
            "prompt": "Choose the correct letter.",
            "options": [
                {"text": "Paris", "value": "A"},
                {"text": "London", "value": "B"},
                {"text": "Berlin", "value": "C"},
            ],
            "correctAnswer": "A",
        });
        let detection = detector().detect(&raw);
        assert_eq!(detection.qtype, Some(QuestionType::McqSingle));
        assert!(detection.confidence >= 0.7, "got {}", detection.confidence);
        let methods: Vec<_> = detection.votes.iter().map(|v| v.method).collect();
        assert!(methods.contains(&DetectionMethod::Structure));
        assert!(methods.contains(&DetectionMethod::DataType));
    }

    #[test]
    fn list_valued_answer_with_options_is_mcq_multiple() {
        let raw = json!({
            "prompt": "Which TWO cities are capitals?",
            "options": [
                {"text": "Paris", "value": "A"},
                {"text": "Lyon", "value": "B"},
                {"text": "Berlin", "value": "C"},
            ],
            "correctAnswer": ["A", "C"],
        });
        let detection = detector().detect(&raw);
        assert_eq!(detection.qtype, Some(QuestionType::McqMultiple));
    }

    #[test]
    fn min_max_words_route_to_writing() {
        let essay = json!({
            "prompt": "Some people believe that... Discuss both views and give your opinion.",
            "minWords": 250,
            "maxWords": 350,
        });
        let detection = detector().detect(&essay);
        assert_eq!(detection.qtype, Some(QuestionType::WritingTask2));

        let letter = json!({
            "prompt": "The chart below shows electricity production. Summarise the information.",
            "minWords": 150,
            "maxWords": 200,
            "imageUrl": "assets/electricity-chart.png",
        });
        let detection = detector().detect(&letter);
        assert_eq!(detection.qtype, Some(QuestionType::WritingTask1));
    }

    #[test]
    fn map_image_routes_to_map_labelling() {
        let raw = json!({
            "prompt": "Label the plan of the library.",
            "labels": {"1": "entrance", "2": "café"},
            "imageUrl": "media/library-map.png",
        });
        let detection = detector().detect(&raw);
        assert_eq!(detection.qtype, Some(QuestionType::MapLabelling));
    }

    #[test]
    fn tfng_answer_pattern_votes_identifying_information() {
        let raw = json!({
            "prompt": "The museum opened in 1950.",
            "correctAnswer": "NG",
        });
        let detection = detector().detect(&raw);
        assert_eq!(detection.qtype, Some(QuestionType::IdentifyingInformation));
    }

    #[test]
    fn keyword_method_reads_instructions() {
        let raw = json!({
            "prompt": "Questions 1-5",
            "instructions": "Complete the table below with NO MORE THAN TWO WORDS.",
            "table": {"rows": [["city", ""], ["", "1842"]]},
            "correctAnswer": ["london", "founded"],
        });
        let detection = detector().detect(&raw);
        assert_eq!(detection.qtype, Some(QuestionType::TableCompletion));
    }

    #[test]
    fn matching_detected_from_items_options_matches() {
        let raw = json!({
            "prompt": "Match each speaker to an opinion.",
            "items": ["Speaker 1", "Speaker 2"],
            "options": ["A", "B", "C"],
            "correctMatches": {"Speaker 1": "B", "Speaker 2": "A"},
        });
        let detection = detector().detect(&raw);
        assert_eq!(detection.qtype, Some(QuestionType::Matching));
        assert!(detection.confidence >= 0.7);
    }

    #[test]
    fn snake_case_fields_are_accepted() {
        let raw = json!({
            "prompt": "Choose the correct letter.",
            "options": [
                {"text": "Paris", "value": "A"},
                {"text": "London", "value": "B"},
            ],
            "correct_answer": "A",
        });
        let detection = detector().detect(&raw);
        assert_eq!(detection.qtype, Some(QuestionType::McqSingle));
    }
}
