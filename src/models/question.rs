// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Question difficulty tier. Maps to the Postgres 'difficulty' enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "difficulty", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
}

/// A single answer option of a question.
/// Stored inside the question's JSONB 'options' column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub text: String,
    pub is_correct: bool,
}

/// Represents the 'questions' table in the database.
/// This is the canonical record, including the correct-answer flags;
/// it must never reach a test-taking client unsanitized.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub stream_id: i64,
    pub subject_id: i64,
    pub topic_id: i64,

    /// The text content of the question.
    pub question_text: String,

    /// Ordered list of options. Stored as a JSON array in the database.
    pub options: Json<Vec<QuestionOption>>,

    /// Explanation shown in the post-submission review.
    pub explanation: Option<String>,

    pub difficulty: Difficulty,

    /// Soft-delete flag. Inactive questions are excluded from generation.
    pub is_active: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Question {
    /// Index of the single option flagged correct.
    pub fn correct_option(&self) -> Option<usize> {
        self.options.iter().position(|o| o.is_correct)
    }

    /// Strips correctness-revealing data for delivery to a test-taker.
    /// Only the id, text, option texts (order preserved), difficulty and
    /// taxonomy references survive the projection.
    pub fn sanitize(&self) -> SanitizedQuestion {
        SanitizedQuestion {
            id: self.id,
            question_text: self.question_text.clone(),
            options: self.options.iter().map(|o| o.text.clone()).collect(),
            difficulty: self.difficulty,
            stream_id: self.stream_id,
            subject_id: self.subject_id,
            topic_id: self.topic_id,
        }
    }
}

/// DTO for sending a question to a test-taker (excludes answer flags and
/// explanation).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedQuestion {
    pub id: i64,
    pub question_text: String,
    pub options: Vec<String>,
    pub difficulty: Difficulty,
    pub stream_id: i64,
    pub subject_id: i64,
    pub topic_id: i64,
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub stream_id: i64,
    pub subject_id: i64,
    pub topic_id: i64,
    #[validate(length(min = 10, max = 1000))]
    pub question_text: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<QuestionOption>,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
    pub difficulty: Difficulty,
}

/// DTO for updating a question. Fields are optional; an options update
/// re-validates the single-correct-answer invariant.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub question_text: Option<String>,
    pub options: Option<Vec<QuestionOption>>,
    pub explanation: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub is_active: Option<bool>,
}

/// Validates a question's option list before any write: 2 to 6 options,
/// non-empty texts, and exactly one option flagged correct.
pub fn validate_options(options: &[QuestionOption]) -> Result<(), validator::ValidationError> {
    if options.len() < 2 || options.len() > 6 {
        return Err(validator::ValidationError::new("options_count_out_of_range"));
    }
    for opt in options {
        if opt.text.is_empty() || opt.text.len() > 500 {
            return Err(validator::ValidationError::new("option_text_length"));
        }
    }
    let correct = options.iter().filter(|o| o.is_correct).count();
    if correct != 1 {
        return Err(validator::ValidationError::new("exactly_one_correct_required"));
    }
    Ok(())
}
