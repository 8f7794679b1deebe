//! Accessors over raw authored question JSON.
//!
//! Third-party authoring tools spell fields in camelCase or snake_case;
//! these helpers accept both so the detector, validator, and normalizer
//! agree on what a raw question contains.

use serde_json::{Map, Value};

/// Fetch a field, accepting both camelCase and snake_case spellings.
pub fn field<'v>(map: &'v Map<String, Value>, camel: &str) -> Option<&'v Value> {
    if let Some(v) = map.get(camel) {
        return Some(v);
    }
    let snake = camel
        .chars()
        .flat_map(|c| {
            if c.is_ascii_uppercase() {
                vec!['_', c.to_ascii_lowercase()]
            } else {
                vec![c]
            }
        })
        .collect::<String>();
    map.get(&snake)
}

pub fn has(map: &Map<String, Value>, key: &str) -> bool {
    field(map, key).is_some()
}

/// The `options` list, when present and list-shaped.
pub fn options_list(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    field(map, "options").and_then(Value::as_array)
}

/// The answer key under any of its authoring spellings.
pub fn answer_key<'v>(map: &'v Map<String, Value>) -> Option<&'v Value> {
    field(map, "correctAnswer")
        .or_else(|| field(map, "correctAnswers"))
        .or_else(|| field(map, "correctMatches"))
        .or_else(|| field(map, "blanks"))
}

pub fn image_url(map: &Map<String, Value>) -> Option<&str> {
    field(map, "imageUrl")
        .or_else(|| field(map, "image"))
        .and_then(Value::as_str)
}

pub fn audio_url(map: &Map<String, Value>) -> Option<&str> {
    field(map, "audioUrl")
        .or_else(|| field(map, "audio"))
        .and_then(Value::as_str)
}
