//! The type registry: the discriminant table every other component consults.
//!
//! For each of the 23 question types the registry records the payload family,
//! the required authoring fields, the canonical answer shape, the grader id,
//! the detector keyword bag, and whether the completion graders may fall back
//! to fuzzy matching. Built once at startup and shared read-only.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{PayloadFamily, QuestionType, TrackKind};

/// The shape a student answer must take for a given type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerShape {
    /// A single scalar value (choice value, T/F/NG token).
    Scalar,
    /// An ordered list of strings (one per blank or cell).
    List,
    /// An unordered, deduplicated set of choice values.
    Set,
    /// A map from item/label to chosen value.
    Map,
    /// Free-form prose.
    Text,
}

/// Identifies which grader implementation handles a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraderId {
    /// Normalized + synonym-folded exact scalar match.
    ExactChoice,
    /// Set comparison with corrected-for-wrong partial credit.
    ChoiceSet,
    /// Per-blank equality with optional fuzzy fallback; mean over blanks.
    BlankFill,
    /// BlankFill plus a hard word-limit check.
    BlankFillLimited,
    /// Element-wise map comparison; fraction = matches / items.
    PairMatch,
    /// Cell-wise equality; fraction = matching cells / total cells.
    CellMatch,
    /// Per-label equality.
    LabelMatch,
    /// Word-count gate; in-range essays await manual grading.
    WritingLength,
}

/// Everything the engine knows about one question type.
#[derive(Debug, Clone)]
pub struct TypeSpec {
    pub qtype: QuestionType,
    /// Which track kind this type belongs to, for routing.
    pub category: TrackKind,
    pub family: PayloadFamily,
    pub answer_shape: AnswerShape,
    pub grader: GraderId,
    /// Authoring fields that must be present (layer-1 validation).
    pub required_fields: &'static [&'static str],
    /// Case-insensitive substrings the detector's keyword method looks for.
    pub keywords: &'static [&'static str],
    /// Whether the blank-fill grader may accept ≥0.85 character similarity.
    /// Defaults to exact matching; enabled only where the grading contract
    /// names the fallback explicitly.
    pub fuzzy_match: bool,
}

/// The closed table of supported question types.
#[derive(Debug)]
pub struct TypeRegistry {
    specs: HashMap<QuestionType, TypeSpec>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut specs = HashMap::with_capacity(QuestionType::ALL.len());
        for spec in build_specs() {
            specs.insert(spec.qtype, spec);
        }
        debug_assert_eq!(specs.len(), QuestionType::ALL.len());
        Self { specs }
    }

    pub fn get(&self, qtype: QuestionType) -> &TypeSpec {
        // The table is total over the closed enum.
        &self.specs[&qtype]
    }

    /// Parse a raw type string, returning its spec when it is a known type.
    pub fn lookup(&self, raw: &str) -> Option<&TypeSpec> {
        QuestionType::from_str(raw).ok().map(|t| self.get(t))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeSpec> {
        QuestionType::ALL.iter().map(|t| &self.specs[t])
    }

    pub fn types_for(&self, category: TrackKind) -> Vec<QuestionType> {
        self.iter()
            .filter(|s| s.category == category)
            .map(|s| s.qtype)
            .collect()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_specs() -> Vec<TypeSpec> {
    use AnswerShape::*;
    use GraderId::*;
    use PayloadFamily as F;
    use QuestionType as Q;
    use TrackKind::*;

    vec![
        // --- Listening ---
        TypeSpec {
            qtype: Q::McqSingle,
            category: Listening,
            family: F::ChoiceSingle,
            answer_shape: Scalar,
            grader: ExactChoice,
            required_fields: &["prompt", "options", "correctAnswer"],
            keywords: &["choose the correct letter", "choose one answer", "circle the correct"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::McqMultiple,
            category: Listening,
            family: F::ChoiceMultiple,
            answer_shape: Set,
            grader: ChoiceSet,
            required_fields: &["prompt", "options", "correctAnswer"],
            keywords: &["choose two", "choose three", "which two", "which three", "select all"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::SentenceCompletion,
            category: Listening,
            family: F::Completion,
            answer_shape: List,
            grader: BlankFill,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["complete the sentence", "complete the sentences", "finish the sentence"],
            fuzzy_match: true,
        },
        TypeSpec {
            qtype: Q::FormCompletion,
            category: Listening,
            family: F::Completion,
            answer_shape: List,
            grader: BlankFill,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["complete the form", "fill in the form", "booking form"],
            fuzzy_match: true,
        },
        TypeSpec {
            qtype: Q::TableCompletion,
            category: Listening,
            family: F::Cells,
            answer_shape: List,
            grader: CellMatch,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["complete the table", "fill in the table"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::FlowchartCompletion,
            category: Listening,
            family: F::Cells,
            answer_shape: List,
            grader: CellMatch,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["complete the flowchart", "complete the flow chart", "flow-chart"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::FillGaps,
            category: Listening,
            family: F::Completion,
            answer_shape: List,
            grader: BlankFill,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["fill in the gaps", "fill in the gap", "fill in the blanks", "fill the gap"],
            fuzzy_match: true,
        },
        TypeSpec {
            qtype: Q::FillGapsShort,
            category: Listening,
            family: F::CompletionLimited,
            answer_shape: List,
            grader: BlankFillLimited,
            required_fields: &["prompt", "correctAnswer", "maxWords"],
            keywords: &["no more than", "one word only", "write one word", "words and/or a number"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::Matching,
            category: Listening,
            family: F::Matching,
            answer_shape: Map,
            grader: PairMatch,
            required_fields: &["prompt", "items", "options", "correctMatches"],
            keywords: &["match the", "matching", "match each"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::MapLabelling,
            category: Listening,
            family: F::Labelling,
            answer_shape: Map,
            grader: LabelMatch,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["label the map", "label the plan", "on the map"],
            fuzzy_match: false,
        },
        // --- Reading ---
        TypeSpec {
            qtype: Q::TrueFalseNg,
            category: Reading,
            family: F::ChoiceSingle,
            answer_shape: Scalar,
            grader: ExactChoice,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["true false not given", "true, false or not given", "true/false/not given"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::YesNoNg,
            category: Reading,
            family: F::ChoiceSingle,
            answer_shape: Scalar,
            grader: ExactChoice,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["yes no not given", "yes, no or not given", "yes/no/not given"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::MatchingHeadings,
            category: Reading,
            family: F::Matching,
            answer_shape: Map,
            grader: PairMatch,
            required_fields: &["prompt", "items", "options", "correctMatches"],
            keywords: &["matching headings", "choose the correct heading", "list of headings"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::MatchingFeatures,
            category: Reading,
            family: F::Matching,
            answer_shape: Map,
            grader: PairMatch,
            required_fields: &["prompt", "items", "options", "correctMatches"],
            keywords: &["matching features", "match each statement", "match the features"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::MatchingEndings,
            category: Reading,
            family: F::Matching,
            answer_shape: Map,
            grader: PairMatch,
            required_fields: &["prompt", "items", "options", "correctMatches"],
            keywords: &["sentence endings", "complete each sentence with the correct ending"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::MatchingInformation,
            category: Reading,
            family: F::Matching,
            answer_shape: Map,
            grader: PairMatch,
            required_fields: &["prompt", "items", "options", "correctMatches"],
            keywords: &["which paragraph contains", "matching information"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::NoteCompletion,
            category: Reading,
            family: F::Completion,
            answer_shape: List,
            grader: BlankFill,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["complete the notes", "complete the note"],
            fuzzy_match: true,
        },
        TypeSpec {
            qtype: Q::SummaryCompletion,
            category: Reading,
            family: F::Completion,
            answer_shape: List,
            grader: BlankFill,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["complete the summary", "summary below"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::DiagramLabeling,
            category: Reading,
            family: F::Labelling,
            answer_shape: Map,
            grader: LabelMatch,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["label the diagram", "diagram label", "parts of the diagram"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::IdentifyingInformation,
            category: Reading,
            family: F::ChoiceSingle,
            answer_shape: Scalar,
            grader: ExactChoice,
            required_fields: &["prompt", "correctAnswer"],
            keywords: &["identifying information", "does the following statement agree"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::ShortAnswer,
            category: Reading,
            family: F::CompletionLimited,
            answer_shape: List,
            grader: BlankFillLimited,
            required_fields: &["prompt", "correctAnswer", "maxWords"],
            keywords: &["answer the questions below", "short answer", "short-answer"],
            fuzzy_match: false,
        },
        // --- Writing ---
        TypeSpec {
            qtype: Q::WritingTask1,
            category: Writing,
            family: F::Writing,
            answer_shape: Text,
            grader: WritingLength,
            required_fields: &["prompt", "minWords", "maxWords"],
            keywords: &["write a letter", "describe the chart", "describe the graph", "summarise the information"],
            fuzzy_match: false,
        },
        TypeSpec {
            qtype: Q::WritingTask2,
            category: Writing,
            family: F::Writing,
            answer_shape: Text,
            grader: WritingLength,
            required_fields: &["prompt", "minWords", "maxWords"],
            keywords: &["write an essay", "to what extent do you agree", "discuss both views", "give your opinion"],
            fuzzy_match: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_all_types() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.iter().count(), 23);
        for qtype in QuestionType::ALL {
            // get() must be total
            let spec = registry.get(qtype);
            assert_eq!(spec.qtype, qtype);
            assert!(spec.required_fields.contains(&"prompt"));
        }
    }

    #[test]
    fn category_partition() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.types_for(TrackKind::Listening).len(), 10);
        assert_eq!(registry.types_for(TrackKind::Reading).len(), 11);
        assert_eq!(registry.types_for(TrackKind::Writing).len(), 2);
    }

    #[test]
    fn lookup_accepts_known_strings_only() {
        let registry = TypeRegistry::new();
        assert!(registry.lookup("mcq_single").is_some());
        assert!(registry.lookup("true_false_ng").is_some());
        assert!(registry.lookup("essay_freeform").is_none());
    }

    #[test]
    fn fuzzy_flag_is_conservative() {
        let registry = TypeRegistry::new();
        let fuzzy: Vec<_> = registry.iter().filter(|s| s.fuzzy_match).map(|s| s.qtype).collect();
        assert_eq!(
            fuzzy,
            vec![
                QuestionType::SentenceCompletion,
                QuestionType::FormCompletion,
                QuestionType::FillGaps,
                QuestionType::NoteCompletion,
            ]
        );
        // Word-limited graders never fuzz: the limit is the contract.
        assert!(!registry.get(QuestionType::FillGapsShort).fuzzy_match);
    }
}
