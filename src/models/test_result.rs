// src/models/test_result.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

use crate::models::question::{Difficulty, SanitizedQuestion};

/// Difficulty selector for a generated test. `Mixed` draws from all three
/// tiers; the others restrict the pool to one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestDifficulty {
    Easy,
    Medium,
    Hard,
    Mixed,
}

impl Default for TestDifficulty {
    fn default() -> Self {
        TestDifficulty::Mixed
    }
}

impl TestDifficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            TestDifficulty::Easy => "easy",
            TestDifficulty::Medium => "medium",
            TestDifficulty::Hard => "hard",
            TestDifficulty::Mixed => "mixed",
        }
    }

    /// The single tier for fixed-difficulty mode, `None` for mixed.
    pub fn fixed_tier(self) -> Option<Difficulty> {
        match self {
            TestDifficulty::Easy => Some(Difficulty::Easy),
            TestDifficulty::Medium => Some(Difficulty::Medium),
            TestDifficulty::Hard => Some(Difficulty::Hard),
            TestDifficulty::Mixed => None,
        }
    }
}

/// DTO for requesting a generated test.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTestRequest {
    /// Required; checked explicitly so a missing stream is a 400, not a
    /// deserialization rejection.
    pub stream_id: Option<i64>,

    /// Empty = unrestricted within the stream.
    #[serde(default)]
    pub subject_ids: Vec<i64>,

    /// Empty = unrestricted within the selected subjects.
    #[serde(default)]
    pub topic_ids: Vec<i64>,

    #[validate(range(min = 1, max = 200, message = "numQuestions must be between 1 and 200"))]
    pub num_questions: i64,

    #[serde(default)]
    pub difficulty: TestDifficulty,
}

/// Metadata accompanying a generated test.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMetadata {
    pub stream: String,
    pub subjects: Vec<String>,
    pub topics: Vec<String>,
    /// Realized count; may be below the requested count on shortage.
    pub total_questions: usize,
    pub difficulty: TestDifficulty,
    /// Suggested limit in minutes.
    pub time_limit: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTestResponse {
    pub questions: Vec<SanitizedQuestion>,
    pub metadata: TestMetadata,
}

/// A single submitted answer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: i64,

    /// `-1` or absent denotes a skipped question.
    #[serde(default)]
    pub selected_option_index: Option<i32>,

    #[serde(default)]
    pub time_taken_seconds: i64,
}

impl Answer {
    pub fn is_skipped(&self) -> bool {
        matches!(self.selected_option_index, None | Some(-1))
    }
}

/// DTO for submitting a completed test.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestRequest {
    pub stream_id: Option<i64>,

    #[serde(default)]
    pub subject_ids: Vec<i64>,

    #[serde(default)]
    pub topic_ids: Vec<i64>,

    /// Required; `None` (absent) is rejected as a 400.
    pub answers: Option<Vec<Answer>>,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    #[serde(default)]
    pub difficulty: TestDifficulty,
}

/// Per-question outcome stored inside a test result's JSONB column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub question_id: i64,
    /// Submitted option index; `-1` for skipped.
    pub selected_option: i32,
    pub is_correct: bool,
    /// Seconds spent on this question, as reported by the client.
    pub time_taken: i64,
}

/// Represents the 'test_results' table. Immutable once created.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: i64,
    pub user_id: i64,
    pub stream_id: i64,
    pub subject_ids: Json<Vec<i64>>,
    pub topic_ids: Json<Vec<i64>>,
    pub total_questions: i64,
    pub answered_questions: i64,
    pub correct_answers: i64,
    pub wrong_answers: i64,
    pub skipped_questions: i64,
    pub score: i64,
    pub percentage: f64,
    /// Wall-clock duration in minutes.
    pub time_taken: i64,
    pub difficulty: String,
    pub questions: Json<Vec<QuestionOutcome>>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A test result prepared for insertion. `validate` must pass before the
/// row is written; a violation aborts the whole submission.
#[derive(Debug)]
pub struct NewTestResult {
    pub user_id: i64,
    pub stream_id: i64,
    pub subject_ids: Vec<i64>,
    pub topic_ids: Vec<i64>,
    pub total_questions: i64,
    pub answered_questions: i64,
    pub correct_answers: i64,
    pub wrong_answers: i64,
    pub skipped_questions: i64,
    pub score: i64,
    pub percentage: f64,
    pub time_taken: i64,
    pub difficulty: String,
    pub questions: Vec<QuestionOutcome>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl NewTestResult {
    /// Creation invariants, checked before persistence:
    /// answered = correct + wrong, end after start, and the stored
    /// percentage within one point of the recomputed value.
    pub fn validate(&self) -> Result<(), String> {
        if self.answered_questions != self.correct_answers + self.wrong_answers {
            return Err(format!(
                "answered ({}) != correct ({}) + wrong ({})",
                self.answered_questions, self.correct_answers, self.wrong_answers
            ));
        }

        if self.end_time <= self.start_time {
            return Err("end_time must be after start_time".to_string());
        }

        let expected = if self.total_questions == 0 {
            0.0
        } else {
            (self.correct_answers as f64 / self.total_questions as f64 * 100.0).round()
        };
        if (self.percentage - expected).abs() > 1.0 {
            return Err(format!(
                "percentage {} deviates from recomputed {}",
                self.percentage, expected
            ));
        }

        Ok(())
    }
}

/// Aggregate counters of a scored submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub total_questions: i64,
    pub answered_questions: i64,
    pub correct_answers: i64,
    pub wrong_answers: i64,
    pub skipped_questions: i64,
    pub score: i64,
    pub percentage: f64,
    pub time_taken: i64,
    pub difficulty: String,
}

/// Post-submission review entry: transparency is restored once the test
/// is complete.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQuestion {
    pub question_id: i64,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_option: i32,
    pub selected_option: i32,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestResponse {
    pub test_result_id: i64,
    pub summary: TestSummary,
    pub questions: Vec<ReviewQuestion>,
}
