//! Question bank loading
//!
//! The bank is a JSON document `{"questions": [...]}` served next to the
//! game. Loading never fails outward: anything unusable falls back to a
//! built-in question so the race can always start.

use serde::{Deserialize, Serialize};

use crate::error::QuestionError;

/// Path the web build fetches the bank from
pub const QUESTION_PATH: &str = "/questions/calculus.json";

/// Number of answer choices per question
pub const ANSWER_COUNT: usize = 4;

/// A multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    /// Prompt shown to the player
    pub text: String,
    pub answers: Vec<String>,
    pub correct_index: usize,
    /// Points earned for a correct answer
    pub points: u32,
}

impl Question {
    pub fn validate(&self) -> Result<(), QuestionError> {
        let invalid = |reason: &str| QuestionError::Invalid {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("missing id"));
        }
        if self.answers.len() != ANSWER_COUNT {
            return Err(invalid("expected exactly 4 answers"));
        }
        if self.correct_index >= ANSWER_COUNT {
            return Err(invalid("correctIndex out of range"));
        }
        if self.points == 0 {
            return Err(invalid("points must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct QuestionFile {
    questions: Vec<Question>,
}

/// Built-in bank used when nothing better is available
pub fn fallback_questions() -> Vec<Question> {
    vec![Question {
        id: "fallback_001".to_string(),
        text: "What is the derivative of x?".to_string(),
        answers: vec!["1".into(), "0".into(), "x".into(), "x^2".into()],
        correct_index: 0,
        points: 5,
    }]
}

/// Parse a bank, dropping invalid questions
///
/// Errors only if the document is malformed or no valid question remains.
pub fn parse_questions(json: &str) -> Result<Vec<Question>, QuestionError> {
    let file: QuestionFile = serde_json::from_str(json)?;

    let mut seen = std::collections::HashSet::new();
    let mut valid = Vec::with_capacity(file.questions.len());
    for q in file.questions {
        if let Err(e) = q.validate() {
            log::warn!("Skipping question: {}", e);
            continue;
        }
        if !seen.insert(q.id.clone()) {
            log::warn!("Skipping duplicate question id {:?}", q.id);
            continue;
        }
        valid.push(q);
    }

    if valid.is_empty() {
        return Err(QuestionError::Empty);
    }
    Ok(valid)
}

/// Parse a bank, substituting the fallback on any failure
pub fn load_questions(json: &str) -> Vec<Question> {
    match parse_questions(json) {
        Ok(questions) => {
            log::info!("Loaded {} questions", questions.len());
            questions
        }
        Err(e) => {
            log::warn!("Failed to load questions ({}). Using fallbacks.", e);
            fallback_questions()
        }
    }
}

/// Fetch and parse the bank from the hosting page (WASM only)
#[cfg(target_arch = "wasm32")]
pub async fn fetch_questions() -> Vec<Question> {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    async fn fetch_text() -> Result<String, wasm_bindgen::JsValue> {
        let window = web_sys::window().ok_or("no window")?;
        let response: web_sys::Response = JsFuture::from(window.fetch_with_str(QUESTION_PATH))
            .await?
            .dyn_into()?;
        if !response.ok() {
            return Err(format!("HTTP {}", response.status()).into());
        }
        let text = JsFuture::from(response.text()?).await?;
        text.as_string().ok_or_else(|| "response is not text".into())
    }

    match fetch_text().await {
        Ok(json) => load_questions(&json),
        Err(e) => {
            log::error!("Error loading questions from {}: {:?}", QUESTION_PATH, e);
            fallback_questions()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"{
        "questions": [
            {"id": "test_001", "text": "d/dx x^2", "answers": ["2x", "x", "2", "x^2"], "correctIndex": 0, "points": 10},
            {"id": "test_002", "text": "d/dx 5", "answers": ["5", "0", "1", "x"], "correctIndex": 1, "points": 20}
        ]
    }"#;

    #[test]
    fn test_parse_valid_bank() {
        let questions = parse_questions(BANK).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, "test_001");
        assert_eq!(questions[1].correct_index, 1);
        assert_eq!(questions[1].points, 20);
    }

    #[test]
    fn test_malformed_document_falls_back() {
        let questions = load_questions("{ not json");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "fallback_001");

        let questions = load_questions(r#"{"items": []}"#);
        assert_eq!(questions[0].id, "fallback_001");
    }

    #[test]
    fn test_empty_bank_falls_back() {
        assert!(matches!(
            parse_questions(r#"{"questions": []}"#),
            Err(QuestionError::Empty)
        ));
        assert!(load_questions(r#"{"questions": []}"#)[0].id.contains("fallback"));
    }

    #[test]
    fn test_invalid_questions_skipped() {
        let json = r#"{"questions": [
            {"id": "three", "text": "?", "answers": ["a", "b", "c"], "correctIndex": 0, "points": 1},
            {"id": "range", "text": "?", "answers": ["a", "b", "c", "d"], "correctIndex": 4, "points": 1},
            {"id": "zero", "text": "?", "answers": ["a", "b", "c", "d"], "correctIndex": 0, "points": 0},
            {"id": "ok", "text": "?", "answers": ["a", "b", "c", "d"], "correctIndex": 3, "points": 7},
            {"id": "ok", "text": "dup", "answers": ["a", "b", "c", "d"], "correctIndex": 0, "points": 7}
        ]}"#;
        let questions = parse_questions(json).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "ok");
        assert_eq!(questions[0].text, "?");
    }

    #[test]
    fn test_fallback_is_valid() {
        for q in fallback_questions() {
            assert!(q.validate().is_ok());
        }
    }
}
