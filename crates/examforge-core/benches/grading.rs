use std::collections::BTreeMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use examforge_core::grade::GradingEngine;
use examforge_core::model::{
    Blank, Choice, Difficulty, Question, QuestionPayload, QuestionType,
};
use examforge_core::registry::TypeRegistry;

fn make_question(qtype: QuestionType, payload: QuestionPayload) -> Question {
    Question {
        id: "bench-q".into(),
        section_id: "bench-s".into(),
        track_id: "bench-t".into(),
        order_index: 1,
        qtype,
        payload,
        marks: 1,
        difficulty: Difficulty::Medium,
        created_at: chrono::Utc::now(),
    }
}

fn bench_grading(c: &mut Criterion) {
    let engine = GradingEngine::new(Arc::new(TypeRegistry::new()));

    let mcq = make_question(
        QuestionType::McqMultiple,
        QuestionPayload::ChoiceMultiple {
            prompt: "Which three apply?".into(),
            options: (b'A'..=b'H')
                .map(|v| Choice {
                    text: format!("option {}", v as char),
                    value: (v as char).to_string(),
                })
                .collect(),
            correct_answers: vec!["A".into(), "C".into(), "F".into()],
        },
    );
    let mcq_answer = json!(["a", "C", "D", "f"]);

    let completion = make_question(
        QuestionType::SentenceCompletion,
        QuestionPayload::Completion {
            prompt: "Complete the sentences.".into(),
            blanks: (0..10)
                .map(|i| Blank::new(vec![format!("answer number {i}")]))
                .collect(),
        },
    );
    let completion_answer = json!((0..10)
        .map(|i| format!("Answer  Number {i}"))
        .collect::<Vec<_>>());

    let matching = make_question(
        QuestionType::MatchingHeadings,
        QuestionPayload::Matching {
            prompt: "Match the headings.".into(),
            items: (0..8).map(|i| format!("Paragraph {i}")).collect(),
            options: (0..10).map(|i| format!("{i}")).collect(),
            correct_matches: (0..8)
                .map(|i| (format!("Paragraph {i}"), format!("{}", (i + 3) % 10)))
                .collect::<BTreeMap<_, _>>(),
        },
    );
    let matching_answer = json!((0..8)
        .map(|i| (format!("Paragraph {i}"), format!("{}", (i + 3) % 10)))
        .collect::<BTreeMap<_, _>>());

    c.bench_function("grade_mcq_multiple", |b| {
        b.iter(|| engine.grade(black_box(&mcq), black_box(&mcq_answer)))
    });
    c.bench_function("grade_completion_fuzzy", |b| {
        b.iter(|| engine.grade(black_box(&completion), black_box(&completion_answer)))
    });
    c.bench_function("grade_matching", |b| {
        b.iter(|| engine.grade(black_box(&matching), black_box(&matching_answer)))
    });
}

criterion_group!(benches, bench_grading);
criterion_main!(benches);
