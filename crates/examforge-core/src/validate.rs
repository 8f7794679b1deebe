//! Four-layer question validation.
//!
//! Layers run in order — schema, data-type, content, asset — and append
//! issues with a severity. Critical and high issues collect into `errors`,
//! medium and low into `warnings`. A question is *valid* when it has no
//! critical errors and *deployable* when it has neither critical nor high
//! errors; authoring tools can save drafts with warnings while activation
//! of broken questions stays blocked.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::QuestionType;
use crate::raw::{answer_key, audio_url, field, image_url, options_list};
use crate::registry::TypeRegistry;

/// How bad an issue is. Critical/high block, medium/low warn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

/// One validation finding, always with a suggested fix for the author.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: Severity,
    pub suggested_fix: String,
}

/// Issue counts by severity plus the deploy gate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub can_deploy: bool,
}

/// The full validation outcome for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub deployable: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let mut summary = ValidationSummary::default();
        for issue in &issues {
            match issue.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
        }
        let (errors, warnings): (Vec<_>, Vec<_>) =
            issues.into_iter().partition(|i| i.severity.is_error());
        let is_valid = summary.critical == 0;
        let deployable = is_valid && summary.high == 0;
        summary.can_deploy = deployable;
        Self { is_valid, deployable, errors, warnings, summary }
    }
}

/// Validates raw authored questions against the four-layer contract.
pub struct Validator {
    registry: Arc<TypeRegistry>,
}

impl Validator {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Validate one raw question. `qtype` is the declared or detected type
    /// (when known, its registry entry drives the required-field checks);
    /// `asset_root` enables the asset existence layer.
    pub fn validate(
        &self,
        raw: &Value,
        qtype: Option<QuestionType>,
        asset_root: Option<&Path>,
    ) -> ValidationReport {
        let mut issues = Vec::new();

        let Some(map) = raw.as_object() else {
            issues.push(ValidationIssue {
                field: "$".into(),
                message: "question must be a JSON object".into(),
                severity: Severity::Critical,
                suggested_fix: "Author the question as a JSON object with at least 'prompt' and an answer key".into(),
            });
            return ValidationReport::from_issues(issues);
        };

        self.layer_schema(map, qtype, &mut issues);
        layer_data_type(map, &mut issues);
        layer_content(map, &mut issues);
        if let Some(root) = asset_root {
            layer_assets(map, root, &mut issues);
        }

        ValidationReport::from_issues(issues)
    }

    /// Layer 1 — schema: `prompt` and an answer key must exist at the root,
    /// plus the type-specific required fields from the registry.
    fn layer_schema(
        &self,
        map: &serde_json::Map<String, Value>,
        qtype: Option<QuestionType>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        if field(map, "prompt").is_none() {
            issues.push(ValidationIssue {
                field: "prompt".into(),
                message: "missing required field 'prompt'".into(),
                severity: Severity::Critical,
                suggested_fix: "Add a 'prompt' string with the question text".into(),
            });
        }

        let is_writing = matches!(
            qtype,
            Some(QuestionType::WritingTask1 | QuestionType::WritingTask2)
        );
        // Writing tasks have no answer key; their word bounds stand in.
        let has_key = answer_key(map).is_some()
            || (is_writing && field(map, "minWords").is_some() && field(map, "maxWords").is_some());
        if !has_key {
            issues.push(ValidationIssue {
                field: "answer_key".into(),
                message: "missing answer key (correctAnswer / correctAnswers / correctMatches)".into(),
                severity: Severity::Critical,
                suggested_fix: "Provide the correct answer(s) for auto-grading, or word bounds for writing tasks".into(),
            });
        }

        if let Some(qtype) = qtype {
            let spec = self.registry.get(qtype);
            for required in spec.required_fields {
                // The generic prompt/answer-key checks above already cover these.
                if *required == "prompt" || *required == "correctAnswer" {
                    continue;
                }
                if field(map, required).is_none() {
                    issues.push(ValidationIssue {
                        field: (*required).to_string(),
                        message: format!("{qtype} requires field '{required}'"),
                        severity: Severity::High,
                        suggested_fix: format!("Add '{required}' as required by {qtype}"),
                    });
                }
            }
        }
    }
}

/// Layer 2 — data types of well-known fields.
fn layer_data_type(map: &serde_json::Map<String, Value>, issues: &mut Vec<ValidationIssue>) {
    if let Some(prompt) = field(map, "prompt") {
        if !prompt.is_string() {
            issues.push(ValidationIssue {
                field: "prompt".into(),
                message: "'prompt' must be a string".into(),
                severity: Severity::Critical,
                suggested_fix: "Change 'prompt' to a string".into(),
            });
        }
    }

    if let Some(options) = field(map, "options") {
        if !options.is_array() {
            issues.push(ValidationIssue {
                field: "options".into(),
                message: "'options' must be a list".into(),
                severity: Severity::High,
                suggested_fix: "Author 'options' as a list of {text, value} objects".into(),
            });
        }
    }

    if let Some(answer) = field(map, "correctAnswer") {
        if answer.is_null() {
            issues.push(ValidationIssue {
                field: "correctAnswer".into(),
                message: "'correctAnswer' must be a string, list, map, number, or boolean".into(),
                severity: Severity::High,
                suggested_fix: "Replace the null answer key with a concrete value".into(),
            });
        }
    }

    for key in ["minWords", "maxWords"] {
        if let Some(v) = field(map, key) {
            if !v.is_number() {
                issues.push(ValidationIssue {
                    field: key.into(),
                    message: format!("'{key}' must be a number"),
                    severity: Severity::High,
                    suggested_fix: format!("Change '{key}' to a positive integer"),
                });
            }
        }
    }
}

/// Layer 3 — content: non-empty texts, answer keys that reference real
/// options, coherent word bounds.
fn layer_content(map: &serde_json::Map<String, Value>, issues: &mut Vec<ValidationIssue>) {
    if let Some(prompt) = field(map, "prompt").and_then(Value::as_str) {
        if prompt.trim().is_empty() {
            issues.push(ValidationIssue {
                field: "prompt".into(),
                message: "'prompt' is empty".into(),
                severity: Severity::High,
                suggested_fix: "Write the question text into 'prompt'".into(),
            });
        }
    }

    if let Some(options) = options_list(map) {
        let mut values = Vec::new();
        for (idx, option) in options.iter().enumerate() {
            let text = option
                .as_str()
                .or_else(|| option.get("text").and_then(Value::as_str));
            if text.is_some_and(|t| t.trim().is_empty()) {
                issues.push(ValidationIssue {
                    field: format!("options[{idx}].text"),
                    message: "option text is empty".into(),
                    severity: Severity::Medium,
                    suggested_fix: "Fill in the option text or remove the option".into(),
                });
            }
            let value = option
                .get("value")
                .and_then(Value::as_str)
                .or(text)
                .or_else(|| option.as_str());
            if let Some(v) = value {
                values.push(v.trim().to_lowercase());
            }
        }

        // Every correctAnswer value must be one of the option values.
        let answers: Vec<String> = match field(map, "correctAnswer")
            .or_else(|| field(map, "correctAnswers"))
        {
            Some(Value::String(s)) => vec![s.trim().to_lowercase()],
            Some(Value::Array(list)) => list
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_lowercase())
                .collect(),
            _ => Vec::new(),
        };
        for answer in answers {
            if !values.is_empty() && !values.contains(&answer) {
                issues.push(ValidationIssue {
                    field: "correctAnswer".into(),
                    message: format!("answer '{answer}' is not one of the option values"),
                    severity: Severity::High,
                    suggested_fix: "Set 'correctAnswer' to the value of one of the options".into(),
                });
            }
        }
    }

    let min_words = field(map, "minWords").and_then(Value::as_u64);
    let max_words = field(map, "maxWords").and_then(Value::as_u64);
    if let (Some(min), Some(max)) = (min_words, max_words) {
        if min > max {
            issues.push(ValidationIssue {
                field: "minWords".into(),
                message: format!("minWords ({min}) exceeds maxWords ({max})"),
                severity: Severity::High,
                suggested_fix: "Swap or correct the word bounds so minWords ≤ maxWords".into(),
            });
        }
    }
}

/// Layer 4 — assets: every referenced audio/image file must exist under the
/// asset root. A missing asset breaks the question at delivery time, so it
/// is critical.
fn layer_assets(
    map: &serde_json::Map<String, Value>,
    asset_root: &Path,
    issues: &mut Vec<ValidationIssue>,
) {
    let refs = [("audioUrl", audio_url(map)), ("imageUrl", image_url(map))];
    for (field_name, url) in refs {
        let Some(url) = url else { continue };
        // Remote URLs are a delivery concern, not a filesystem one.
        if url.starts_with("http://") || url.starts_with("https://") {
            continue;
        }
        let path = asset_root.join(url);
        if !path.is_file() {
            issues.push(ValidationIssue {
                field: field_name.into(),
                message: format!("referenced asset does not exist: {url}"),
                severity: Severity::Critical,
                suggested_fix: format!("Upload the file to {} or fix the reference", path.display()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> Validator {
        Validator::new(Arc::new(TypeRegistry::new()))
    }

    #[test]
    fn well_formed_mcq_is_deployable() {
        let raw = json!({
            "prompt": "Capital of France?",
            "options": [
                {"text": "Paris", "value": "A"},
                {"text": "London", "value": "B"},
            ],
            "correctAnswer": "A",
        });
        let report = validator().validate(&raw, Some(QuestionType::McqSingle), None);
        assert!(report.is_valid);
        assert!(report.deployable);
        assert!(report.errors.is_empty());
        assert!(report.summary.can_deploy);
    }

    #[test]
    fn non_object_is_critical() {
        let report = validator().validate(&json!(42), None, None);
        assert!(!report.is_valid);
        assert_eq!(report.summary.critical, 1);
    }

    #[test]
    fn missing_prompt_and_key_are_critical() {
        let report = validator().validate(&json!({}), None, None);
        assert!(!report.is_valid);
        assert_eq!(report.summary.critical, 2);
        let fields: Vec<_> = report.errors.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"prompt"));
        assert!(fields.contains(&"answer_key"));
        assert!(report.errors.iter().all(|i| !i.suggested_fix.is_empty()));
    }

    #[test]
    fn empty_prompt_blocks_deploy_but_not_save() {
        let raw = json!({ "prompt": "   ", "correctAnswer": "x" });
        let report = validator().validate(&raw, None, None);
        assert!(report.is_valid, "high severity still saves as draft");
        assert!(!report.deployable);
        assert!(report
            .errors
            .iter()
            .any(|i| i.field == "prompt" && i.severity == Severity::High));
    }

    #[test]
    fn answer_outside_options_is_high() {
        let raw = json!({
            "prompt": "Pick one",
            "options": [{"text": "Paris", "value": "A"}, {"text": "London", "value": "B"}],
            "correctAnswer": "C",
        });
        let report = validator().validate(&raw, Some(QuestionType::McqSingle), None);
        assert!(!report.deployable);
        assert!(report.errors.iter().any(|i| i.field == "correctAnswer"));
    }

    #[test]
    fn writing_task_needs_no_answer_key() {
        let raw = json!({
            "prompt": "Write an essay about urbanization.",
            "minWords": 250,
            "maxWords": 350,
        });
        let report = validator().validate(&raw, Some(QuestionType::WritingTask2), None);
        assert!(report.deployable, "errors: {:?}", report.errors);
    }

    #[test]
    fn inverted_word_bounds_are_high() {
        let raw = json!({
            "prompt": "Write a letter.",
            "minWords": 300,
            "maxWords": 150,
        });
        let report = validator().validate(&raw, Some(QuestionType::WritingTask1), None);
        assert!(!report.deployable);
        assert!(report.errors.iter().any(|i| i.message.contains("exceeds")));
    }

    #[test]
    fn type_required_fields_come_from_registry() {
        let raw = json!({ "prompt": "Match them", "correctMatches": {"a": "1"} });
        let report = validator().validate(&raw, Some(QuestionType::Matching), None);
        // items and options are required for matching
        let fields: Vec<_> = report.errors.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"items"));
        assert!(fields.contains(&"options"));
    }

    #[test]
    fn empty_option_text_is_a_warning() {
        let raw = json!({
            "prompt": "Pick one",
            "options": [{"text": "", "value": "A"}, {"text": "London", "value": "B"}],
            "correctAnswer": "B",
        });
        let report = validator().validate(&raw, Some(QuestionType::McqSingle), None);
        assert!(report.deployable);
        assert!(report.warnings.iter().any(|i| i.field.starts_with("options[0]")));
    }

    #[test]
    fn missing_asset_is_critical() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("present.mp3"), b"audio").unwrap();

        let ok = json!({
            "prompt": "Listen and answer.",
            "correctAnswer": "x",
            "audioUrl": "present.mp3",
        });
        let report = validator().validate(&ok, None, Some(dir.path()));
        assert!(report.is_valid, "errors: {:?}", report.errors);

        let missing = json!({
            "prompt": "Listen and answer.",
            "correctAnswer": "x",
            "audioUrl": "absent.mp3",
        });
        let report = validator().validate(&missing, None, Some(dir.path()));
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|i| i.severity == Severity::Critical
            && i.message.contains("absent.mp3")));
    }

    #[test]
    fn remote_assets_are_not_checked() {
        let dir = tempfile::tempdir().unwrap();
        let raw = json!({
            "prompt": "Look at the image.",
            "correctAnswer": "x",
            "imageUrl": "https://cdn.example.com/map.png",
        });
        let report = validator().validate(&raw, None, Some(dir.path()));
        assert!(report.is_valid);
    }

    #[test]
    fn summary_counts_by_severity() {
        let raw = json!({
            "prompt": "",
            "options": [{"text": "", "value": "A"}],
            "correctAnswer": "B",
        });
        let report = validator().validate(&raw, None, None);
        assert_eq!(report.summary.high, 2); // empty prompt + answer not in options
        assert_eq!(report.summary.medium, 1); // empty option text
        assert!(!report.summary.can_deploy);
    }
}
