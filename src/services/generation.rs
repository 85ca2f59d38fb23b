use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::services::llm_provider::{ChatMessage, LLMError, TextGenerator};
use crate::services::quiz::QuestionType;

pub const MIN_ITEMS: usize = 1;
pub const MAX_ITEMS: usize = 50;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("AI generation is not configured")]
    Unavailable,
    #[error("language model request failed: {0}")]
    Provider(#[from] LLMError),
    #[error("language model returned an empty response")]
    Empty,
    #[error("could not parse generated {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedCard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedQuestion {
    pub question: String,
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub points: i64,
}

pub fn clamp_count(requested: Option<i64>, default: usize) -> usize {
    requested
        .map(|n| n.clamp(MIN_ITEMS as i64, MAX_ITEMS as i64) as usize)
        .unwrap_or(default)
}

/// Prompting and output parsing on top of a [`TextGenerator`].
#[derive(Clone)]
pub struct StudyAssistant {
    generator: Arc<dyn TextGenerator>,
}

impl StudyAssistant {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn is_available(&self) -> bool {
        self.generator.is_available()
    }

    pub async fn summarize(&self, text: &str, max_words: usize) -> Result<String, GenerationError> {
        let prompt = format!(
            "Create a clear, concise summary of the following content in approximately {max_words} words. \
             Focus on key concepts, main ideas and details that are useful for studying.\n\nContent:\n{text}"
        );
        self.run(vec![
            ChatMessage::system("You are an expert summarizer."),
            ChatMessage::user(prompt),
        ])
        .await
    }

    pub async fn notes_from_transcription(&self, transcription: &str) -> Result<String, GenerationError> {
        let prompt = format!(
            "Transform the following lecture transcription into well-organized study notes. \
             Use headings, bullet points for key concepts, **bold** for important terms \
             and finish with a brief summary.\n\nTranscription:\n{transcription}"
        );
        self.run(vec![
            ChatMessage::system("You are an expert note-taker."),
            ChatMessage::user(prompt),
        ])
        .await
    }

    pub async fn generate_flashcards(&self, content: &str, num_cards: usize) -> Result<Vec<GeneratedCard>, GenerationError> {
        let prompt = format!(
            "Generate exactly {num_cards} flashcards from the content below. \
             Each card has a question or term on the front and a concise answer on the back.\n\
             Return ONLY a JSON array like [{{\"front\": \"...\", \"back\": \"...\"}}].\n\nContent:\n{content}"
        );
        let raw = self
            .run(vec![
                ChatMessage::system("You are an expert educator creating flashcards for students."),
                ChatMessage::user(prompt),
            ])
            .await?;

        let mut cards = parse_flashcards(&raw)?;
        cards.truncate(num_cards);
        Ok(cards)
    }

    pub async fn generate_quiz_questions(
        &self,
        content: &str,
        num_questions: usize,
        question_types: &[QuestionType],
    ) -> Result<Vec<GeneratedQuestion>, GenerationError> {
        let types = if question_types.is_empty() {
            &QuestionType::ALL[..]
        } else {
            question_types
        };
        let type_list = types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ");

        let prompt = format!(
            "Generate exactly {num_questions} quiz questions from the content below using a mix of: {type_list}.\n\
             Return ONLY a JSON object {{\"questions\": [...]}} where each question has \
             \"question\", \"question_type\", \"options\" (4 options, multiple_choice only), \
             \"correct_answer\" and \"explanation\".\n\nContent:\n{content}"
        );
        let raw = self
            .run(vec![
                ChatMessage::system("You are an expert educator creating quiz questions that test understanding."),
                ChatMessage::user(prompt),
            ])
            .await?;

        let mut questions = parse_quiz_questions(&raw)?;
        questions.truncate(num_questions);
        Ok(questions)
    }

    pub async fn tutor_reply(
        &self,
        message: &str,
        history: &[ChatMessage],
        subject: Option<&str>,
    ) -> Result<String, GenerationError> {
        let mut system = String::from(
            "You are a patient and encouraging study tutor. Explain concepts clearly, \
             use examples when helpful, break complex topics down and say so honestly \
             when you do not know something.",
        );
        if let Some(subject) = subject {
            system.push_str(&format!("\nCurrent subject context: {subject}"));
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(message));

        self.run(messages).await
    }

    async fn run(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        if !self.generator.is_available() {
            return Err(GenerationError::Unavailable);
        }
        let output = self.generator.complete(&messages).await?;
        let output = output.trim();
        if output.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(output.to_string())
    }
}

pub fn parse_flashcards(raw: &str) -> Result<Vec<GeneratedCard>, GenerationError> {
    let items = extract_items(raw, "flashcards").ok_or(GenerationError::Malformed("flashcards"))?;

    let total = items.len();
    let cards: Vec<GeneratedCard> = items.iter().filter_map(validate_card).collect();
    if cards.len() < total {
        tracing::warn!(dropped = total - cards.len(), total, "discarded invalid generated flashcards");
    }
    if cards.is_empty() {
        return Err(GenerationError::Malformed("flashcards"));
    }
    Ok(cards)
}

pub fn parse_quiz_questions(raw: &str) -> Result<Vec<GeneratedQuestion>, GenerationError> {
    let items = extract_items(raw, "questions").ok_or(GenerationError::Malformed("quiz questions"))?;

    let total = items.len();
    let questions: Vec<GeneratedQuestion> = items.iter().filter_map(validate_question).collect();
    if questions.len() < total {
        tracing::warn!(dropped = total - questions.len(), total, "discarded invalid generated questions");
    }
    if questions.is_empty() {
        return Err(GenerationError::Malformed("quiz questions"));
    }
    Ok(questions)
}

fn validate_card(item: &Value) -> Option<GeneratedCard> {
    Some(GeneratedCard {
        front: text_field(item, "front")?,
        back: text_field(item, "back")?,
    })
}

fn validate_question(item: &Value) -> Option<GeneratedQuestion> {
    let question = text_field(item, "question")?;
    let question_type = item
        .get("question_type")
        .or_else(|| item.get("type"))
        .and_then(Value::as_str)
        .and_then(QuestionType::parse)?;
    let correct_answer = scalar_text(item.get("correct_answer")?)?;

    let options = match question_type {
        QuestionType::MultipleChoice => {
            let options: Vec<String> = item
                .get("options")?
                .as_array()?
                .iter()
                .filter_map(scalar_text)
                .collect();
            if options.len() < 2 {
                return None;
            }
            Some(options)
        }
        _ => None,
    };

    let correct_answer = match question_type {
        QuestionType::TrueFalse => match correct_answer.to_lowercase().as_str() {
            "true" => "True".to_string(),
            "false" => "False".to_string(),
            _ => return None,
        },
        _ => correct_answer,
    };

    let points = item
        .get("points")
        .and_then(Value::as_i64)
        .filter(|p| *p > 0)
        .unwrap_or(1);

    Some(GeneratedQuestion {
        question,
        question_type,
        options,
        correct_answer,
        explanation: text_field(item, "explanation"),
        points,
    })
}

fn text_field(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Finds the item list in model output: a bare array or an object holding
/// the list under `key`.
fn extract_items(raw: &str, key: &str) -> Option<Vec<Value>> {
    match extract_json(raw)? {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

fn extract_json(raw: &str) -> Option<Value> {
    let text = strip_code_fences(raw);
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    let array = outermost(text, '[', ']');
    let object = outermost(text, '{', '}');

    // Try whichever structure opens first, then the other.
    let mut candidates = [array, object];
    candidates.sort_by_key(|c| c.map_or(usize::MAX, |(start, _)| start));
    candidates
        .into_iter()
        .flatten()
        .find_map(|(start, end)| serde_json::from_str::<Value>(&text[start..=end]).ok())
}

fn outermost(text: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then_some((start, end))
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(fence_start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[fence_start + 3..];
    // Skip an optional language tag on the opening fence line.
    let body_start = after_fence.find('\n').map_or(0, |i| i + 1);
    let body = &after_fence[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Canned(Option<&'static str>);

    #[async_trait]
    impl TextGenerator for Canned {
        fn is_available(&self) -> bool {
            self.0.is_some()
        }

        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LLMError> {
            self.0.map(str::to_string).ok_or(LLMError::NotConfigured("LLM_API_KEY"))
        }
    }

    #[test]
    fn test_parse_bare_array() {
        let cards = parse_flashcards(r#"[{"front": "Q1", "back": "A1"}, {"front": "Q2", "back": "A2"}]"#).unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].front, "Q1");
    }

    #[test]
    fn test_parse_fenced_object_with_prose() {
        let raw = "Here you go:\n```json\n{\"flashcards\": [{\"front\": \"Term\", \"back\": \"Definition\"}]}\n```\nEnjoy!";
        let cards = parse_flashcards(raw).unwrap();
        assert_eq!(cards, vec![GeneratedCard { front: "Term".into(), back: "Definition".into() }]);
    }

    #[test]
    fn test_parse_array_inside_prose() {
        let raw = "Sure! [{\"front\": \"a\", \"back\": \"b\"}] Hope that helps.";
        assert_eq!(parse_flashcards(raw).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_cards_dropped() {
        let raw = r#"[{"front": "ok", "back": "fine"}, {"front": "", "back": "x"}, {"front": "missing back"}, 7]"#;
        let cards = parse_flashcards(raw).unwrap();
        assert_eq!(cards.len(), 1);
    }

    #[test]
    fn test_no_valid_cards_is_error() {
        assert!(matches!(parse_flashcards("no json here"), Err(GenerationError::Malformed(_))));
        assert!(matches!(parse_flashcards("[]"), Err(GenerationError::Malformed(_))));
        assert!(matches!(parse_flashcards(r#"{"cards": []}"#), Err(GenerationError::Malformed(_))));
    }

    #[test]
    fn test_parse_questions_validates_types() {
        let raw = r#"{"questions": [
            {"question": "Capital of France?", "question_type": "multiple_choice", "options": ["Paris", "Rome", "Oslo", "Bern"], "correct_answer": "Paris", "explanation": "It is."},
            {"question": "Sky is blue?", "question_type": "true_false", "correct_answer": true},
            {"question": "Name a prime.", "question_type": "short_answer", "correct_answer": 7},
            {"question": "One option", "question_type": "multiple_choice", "options": ["A"], "correct_answer": "A"},
            {"question": "Bad tf", "question_type": "true_false", "correct_answer": "maybe"},
            {"question": "Essay", "question_type": "essay", "correct_answer": "x"}
        ]}"#;
        let questions = parse_quiz_questions(raw).unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].options.as_ref().map(Vec::len), Some(4));
        assert_eq!(questions[1].correct_answer, "True");
        assert_eq!(questions[2].correct_answer, "7");
        assert_eq!(questions[2].points, 1);
    }

    #[test]
    fn test_clamp_count() {
        assert_eq!(clamp_count(None, 10), 10);
        assert_eq!(clamp_count(Some(0), 10), 1);
        assert_eq!(clamp_count(Some(500), 10), 50);
        assert_eq!(clamp_count(Some(7), 10), 7);
    }

    #[tokio::test]
    async fn test_unavailable_generator() {
        let assistant = StudyAssistant::new(Arc::new(Canned(None)));
        let result = assistant.summarize("text", 100).await;
        assert!(matches!(result, Err(GenerationError::Unavailable)));
    }

    #[tokio::test]
    async fn test_generation_truncates_to_requested_count() {
        let assistant = StudyAssistant::new(Arc::new(Canned(Some(
            r#"[{"front":"1","back":"1"},{"front":"2","back":"2"},{"front":"3","back":"3"}]"#,
        ))));
        let cards = assistant.generate_flashcards("content", 2).await.unwrap();
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_output_is_empty_error() {
        let assistant = StudyAssistant::new(Arc::new(Canned(Some("   "))));
        let result = assistant.notes_from_transcription("words").await;
        assert!(matches!(result, Err(GenerationError::Empty)));
    }
}
