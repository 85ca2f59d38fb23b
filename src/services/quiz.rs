use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::operations::quizzes::QuizQuestion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuestionType {
    pub const ALL: [QuestionType; 3] = [Self::MultipleChoice, Self::TrueFalse, Self::ShortAnswer];

    /// Accepts `multiple_choice`, `Multiple Choice`, `true-false` and similar spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c.to_ascii_lowercase() })
            .collect();
        match normalized.as_str() {
            "multiple_choice" => Some(Self::MultipleChoice),
            "true_false" => Some(Self::TrueFalse),
            "short_answer" => Some(Self::ShortAnswer),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple_choice",
            Self::TrueFalse => "true_false",
            Self::ShortAnswer => "short_answer",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub user_answer: Option<String>,
    pub correct_answer: Option<String>,
    pub is_correct: bool,
    pub points_earned: i64,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeReport {
    pub score: i64,
    pub total_points: i64,
    pub results: Vec<QuestionResult>,
}

pub fn answers_match(given: &str, expected: &str) -> bool {
    given.trim().to_lowercase() == expected.trim().to_lowercase()
}

/// Flattens submitted answers to strings. Booleans and numbers are accepted
/// for true/false and numeric answers, nulls are dropped.
pub fn normalize_answers(raw: &serde_json::Map<String, serde_json::Value>) -> BTreeMap<String, String> {
    raw.iter()
        .filter_map(|(question_id, value)| {
            let answer = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((question_id.clone(), answer))
        })
        .collect()
}

pub fn grade(questions: &[QuizQuestion], answers: &BTreeMap<String, String>) -> GradeReport {
    let mut score = 0;
    let mut total_points = 0;
    let mut results = Vec::with_capacity(questions.len());

    for question in questions {
        let points = question.points.max(0);
        total_points += points;

        let user_answer = answers.get(&question.id).cloned();
        let is_correct = match (&user_answer, &question.correct_answer) {
            (Some(given), Some(expected)) => answers_match(given, expected),
            _ => false,
        };
        let points_earned = if is_correct { points } else { 0 };
        score += points_earned;

        results.push(QuestionResult {
            question_id: question.id.clone(),
            user_answer,
            correct_answer: question.correct_answer.clone(),
            is_correct,
            points_earned,
            explanation: question.explanation.clone(),
        });
    }

    GradeReport {
        score,
        total_points,
        results,
    }
}
