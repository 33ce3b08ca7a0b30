// src/handlers/quiz.rs

use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rand::{Rng, seq::SliceRandom};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{Difficulty, Question},
        test_result::{
            Answer, GenerateTestRequest, GenerateTestResponse, NewTestResult, QuestionOutcome,
            ReviewQuestion, SubmitTestRequest, SubmitTestResponse, TestMetadata, TestResult,
            TestSummary,
        },
    },
    utils::jwt::Claims,
};

const QUESTION_COLUMNS: &str = "id, stream_id, subject_id, topic_id, question_text, options, \
     explanation, difficulty, is_active, created_at, updated_at";

/// Marks per correct answer and penalty per wrong answer.
const CORRECT_MARKS: i64 = 4;
const WRONG_PENALTY: i64 = 1;

/// Per-tier target counts (Easy, Medium, Hard) for a mixed paper.
/// The remainder of the three-way split goes to Easy first, then Medium.
fn tier_targets(requested: usize) -> [usize; 3] {
    let base = requested / 3;
    let remainder = requested % 3;
    [
        base + usize::from(remainder > 0),
        base + usize::from(remainder > 1),
        base,
    ]
}

/// Uniformly shuffles a pool and keeps at most `count` questions.
fn draw<R: Rng + ?Sized>(rng: &mut R, mut pool: Vec<Question>, count: usize) -> Vec<Question> {
    pool.shuffle(rng);
    pool.truncate(count);
    pool
}

/// Assembles a mixed paper from the three tier pools. Each tier is capped
/// at its target; there is no backfill from other tiers, so an
/// under-stocked tier shrinks the paper.
fn assemble_mixed<R: Rng + ?Sized>(
    rng: &mut R,
    pools: [Vec<Question>; 3],
    requested: usize,
) -> Vec<Question> {
    let targets = tier_targets(requested);
    let mut picked = Vec::with_capacity(requested);
    for (pool, target) in pools.into_iter().zip(targets) {
        picked.extend(draw(rng, pool, target));
    }
    picked.shuffle(rng);
    picked
}

/// Scoring failure cases.
#[derive(Debug, PartialEq)]
enum ScoreError {
    UnknownQuestion(i64),
    MissingCorrectOption(i64),
}

impl From<ScoreError> for AppError {
    fn from(err: ScoreError) -> Self {
        match err {
            ScoreError::UnknownQuestion(id) => {
                AppError::BadRequest(format!("Question {} not found", id))
            }
            ScoreError::MissingCorrectOption(id) => AppError::InternalServerError(format!(
                "Question {} has no correct option",
                id
            )),
        }
    }
}

/// Aggregate outcome of reconciling a submission against the canonical
/// question records.
#[derive(Debug)]
struct Score {
    total: i64,
    answered: i64,
    correct: i64,
    wrong: i64,
    skipped: i64,
    score: i64,
    percentage: f64,
    outcomes: Vec<QuestionOutcome>,
    review: Vec<ReviewQuestion>,
}

/// Reconciles submitted answers against canonical questions, in input
/// order. Pure: identical inputs always produce identical scores.
fn score_answers(
    answers: &[Answer],
    questions: &HashMap<i64, Question>,
) -> Result<Score, ScoreError> {
    let mut correct = 0i64;
    let mut wrong = 0i64;
    let mut skipped = 0i64;
    let mut outcomes = Vec::with_capacity(answers.len());
    let mut review = Vec::with_capacity(answers.len());

    for answer in answers {
        let question = questions
            .get(&answer.question_id)
            .ok_or(ScoreError::UnknownQuestion(answer.question_id))?;
        let correct_index = question
            .correct_option()
            .ok_or(ScoreError::MissingCorrectOption(question.id))? as i32;

        let (selected, is_correct) = if answer.is_skipped() {
            skipped += 1;
            (-1, false)
        } else {
            // Exact integer comparison; any non-matching index is wrong.
            let selected = answer.selected_option_index.unwrap_or(-1);
            let is_correct = selected == correct_index;
            if is_correct {
                correct += 1;
            } else {
                wrong += 1;
            }
            (selected, is_correct)
        };

        outcomes.push(QuestionOutcome {
            question_id: question.id,
            selected_option: selected,
            is_correct,
            time_taken: answer.time_taken_seconds,
        });
        review.push(ReviewQuestion {
            question_id: question.id,
            question_text: question.question_text.clone(),
            options: question.options.iter().map(|o| o.text.clone()).collect(),
            correct_option: correct_index,
            selected_option: selected,
            is_correct,
            explanation: question.explanation.clone(),
        });
    }

    let total = answers.len() as i64;
    let percentage = if total == 0 {
        0.0
    } else {
        round_two_decimals(correct as f64 / total as f64 * 100.0)
    };

    Ok(Score {
        total,
        answered: total - skipped,
        correct,
        wrong,
        skipped,
        score: correct * CORRECT_MARKS - wrong * WRONG_PENALTY,
        percentage,
        outcomes,
        review,
    })
}

fn round_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Wall-clock duration in whole minutes, rounded.
fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    ((end - start).num_milliseconds() as f64 / 60_000.0).round() as i64
}

/// Suggested time limit: 1.5 minutes per question, rounded up.
fn suggested_time_limit(count: usize) -> i64 {
    (count * 3).div_ceil(2) as i64
}

/// Fetches the eligible question pool for one difficulty tier (or all
/// tiers when `tier` is None) under the taxonomy filter.
async fn fetch_question_pool(
    pool: &PgPool,
    stream_id: i64,
    subject_ids: &[i64],
    topic_ids: &[i64],
    tier: Option<Difficulty>,
) -> Result<Vec<Question>, AppError> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM questions WHERE is_active = TRUE AND stream_id = ",
        QUESTION_COLUMNS
    ));
    builder.push_bind(stream_id);

    if !subject_ids.is_empty() {
        builder.push(" AND subject_id IN (");
        let mut separated = builder.separated(",");
        for id in subject_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
    }

    if !topic_ids.is_empty() {
        builder.push(" AND topic_id IN (");
        let mut separated = builder.separated(",");
        for id in topic_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
    }

    if let Some(tier) = tier {
        builder.push(" AND difficulty = ");
        builder.push_bind(tier);
    }

    let questions = builder
        .build_query_as::<Question>()
        .fetch_all(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch question pool: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(questions)
}

/// Resolves display names for a set of taxonomy node IDs.
async fn fetch_names(pool: &PgPool, table: &str, ids: &[i64]) -> Result<Vec<String>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT name FROM {} WHERE id IN (", table));
    let mut separated = builder.separated(",");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    builder.push(" ORDER BY name");

    let names = builder.build_query_scalar::<String>().fetch_all(pool).await?;
    Ok(names)
}

/// Generates a randomized test.
///
/// * Mixed difficulty splits the requested count across the three tiers,
///   remainder Easy-first then Medium; fixed difficulty draws from the one
///   matching pool.
/// * An empty pool is a 404; a partial pool is returned as-is with a
///   warning logged.
/// * Every question is sanitized before it leaves the handler.
pub async fn generate_test(
    State(pool): State<PgPool>,
    payload: Result<Json<GenerateTestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let stream_id = req
        .stream_id
        .ok_or(AppError::BadRequest("streamId is required".to_string()))?;

    let stream_name: String = sqlx::query_scalar("SELECT name FROM streams WHERE id = $1")
        .bind(stream_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Stream not found".to_string()))?;

    let requested = req.num_questions as usize;

    let selected = match req.difficulty.fixed_tier() {
        Some(tier) => {
            let eligible =
                fetch_question_pool(&pool, stream_id, &req.subject_ids, &req.topic_ids, Some(tier))
                    .await?;
            // Request-local RNG; no state shared across requests.
            let mut rng = rand::rng();
            draw(&mut rng, eligible, requested)
        }
        None => {
            let mut pools = Vec::with_capacity(3);
            for tier in Difficulty::ALL {
                pools.push(
                    fetch_question_pool(
                        &pool,
                        stream_id,
                        &req.subject_ids,
                        &req.topic_ids,
                        Some(tier),
                    )
                    .await?,
                );
            }
            let [easy, medium, hard]: [Vec<Question>; 3] = pools
                .try_into()
                .map_err(|_| AppError::InternalServerError("tier pool mismatch".to_string()))?;
            let mut rng = rand::rng();
            assemble_mixed(&mut rng, [easy, medium, hard], requested)
        }
    };

    if selected.is_empty() {
        return Err(AppError::NotFound(
            "No questions match the selected criteria. Try different subjects, topics or difficulty."
                .to_string(),
        ));
    }

    if selected.len() < requested {
        tracing::warn!(
            requested,
            available = selected.len(),
            "question pool shortage for stream {}",
            stream_id
        );
    }

    let subjects = fetch_names(&pool, "subjects", &req.subject_ids).await?;
    let topics = fetch_names(&pool, "topics", &req.topic_ids).await?;

    let questions: Vec<_> = selected.iter().map(|q| q.sanitize()).collect();
    let metadata = TestMetadata {
        stream: stream_name,
        subjects,
        topics,
        total_questions: questions.len(),
        difficulty: req.difficulty,
        time_limit: suggested_time_limit(questions.len()),
    };

    Ok(Json(GenerateTestResponse { questions, metadata }))
}

/// Scores a submitted test and persists an immutable result record.
///
/// The whole submission fails if any referenced question is missing or a
/// result invariant is violated; no partial result is ever stored.
pub async fn submit_test(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<SubmitTestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let stream_id = req
        .stream_id
        .ok_or(AppError::BadRequest("streamId is required".to_string()))?;
    let answers = req
        .answers
        .ok_or(AppError::BadRequest("answers must be an array".to_string()))?;

    if answers.is_empty() {
        return Err(AppError::BadRequest("No answers submitted".to_string()));
    }

    let user_id = claims.user_id()?;

    // Canonical records are re-fetched; the sanitized test the client saw
    // is never trusted for scoring.
    let distinct_ids: Vec<i64> = answers
        .iter()
        .map(|a| a.question_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM questions WHERE id IN (",
        QUESTION_COLUMNS
    ));
    let mut separated = builder.separated(",");
    for id in &distinct_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let canonical: Vec<Question> = builder
        .build_query_as()
        .fetch_all(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    if canonical.len() != distinct_ids.len() {
        return Err(AppError::BadRequest(
            "One or more submitted questions could not be found".to_string(),
        ));
    }

    let questions: HashMap<i64, Question> = canonical.into_iter().map(|q| (q.id, q)).collect();

    let score = score_answers(&answers, &questions)?;
    let time_taken = duration_minutes(req.start_time, req.end_time);

    let new_result = NewTestResult {
        user_id,
        stream_id,
        subject_ids: req.subject_ids,
        topic_ids: req.topic_ids,
        total_questions: score.total,
        answered_questions: score.answered,
        correct_answers: score.correct,
        wrong_answers: score.wrong,
        skipped_questions: score.skipped,
        score: score.score,
        percentage: score.percentage,
        time_taken,
        difficulty: req.difficulty.as_str().to_string(),
        questions: score.outcomes,
        start_time: req.start_time,
        end_time: req.end_time,
    };
    new_result.validate().map_err(AppError::InternalServerError)?;

    let test_result_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO test_results
        (user_id, stream_id, subject_ids, topic_ids, total_questions, answered_questions,
         correct_answers, wrong_answers, skipped_questions, score, percentage, time_taken,
         difficulty, questions, start_time, end_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING id
        "#,
    )
    .bind(new_result.user_id)
    .bind(new_result.stream_id)
    .bind(sqlx::types::Json(&new_result.subject_ids))
    .bind(sqlx::types::Json(&new_result.topic_ids))
    .bind(new_result.total_questions)
    .bind(new_result.answered_questions)
    .bind(new_result.correct_answers)
    .bind(new_result.wrong_answers)
    .bind(new_result.skipped_questions)
    .bind(new_result.score)
    .bind(new_result.percentage)
    .bind(new_result.time_taken)
    .bind(&new_result.difficulty)
    .bind(sqlx::types::Json(&new_result.questions))
    .bind(new_result.start_time)
    .bind(new_result.end_time)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to persist test result: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(SubmitTestResponse {
        test_result_id,
        summary: TestSummary {
            total_questions: score.total,
            answered_questions: score.answered,
            correct_answers: score.correct,
            wrong_answers: score.wrong,
            skipped_questions: score.skipped,
            score: score.score,
            percentage: score.percentage,
            time_taken,
            difficulty: new_result.difficulty,
        },
        questions: score.review,
    }))
}

/// Lists the caller's test results, newest first.
pub async fn test_history(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let results = sqlx::query_as::<_, TestResult>(
        r#"
        SELECT id, user_id, stream_id, subject_ids, topic_ids, total_questions,
               answered_questions, correct_answers, wrong_answers, skipped_questions,
               score, percentage, time_taken, difficulty, questions, start_time,
               end_time, created_at
        FROM test_results
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT 50
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(results))
}

/// Retrieves one test result. Owner or admin only.
pub async fn test_result_detail(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let result = sqlx::query_as::<_, TestResult>(
        r#"
        SELECT id, user_id, stream_id, subject_ids, topic_ids, total_questions,
               answered_questions, correct_answers, wrong_answers, skipped_questions,
               score, percentage, time_taken, difficulty, questions, start_time,
               end_time, created_at
        FROM test_results
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Test result not found".to_string()))?;

    // Non-owners get a 404, not a 403.
    if result.user_id != user_id && !claims.is_admin() {
        return Err(AppError::NotFound("Test result not found".to_string()));
    }

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionOption;
    use chrono::TimeDelta;
    use rand::{SeedableRng, rngs::StdRng};
    use sqlx::types::Json as SqlJson;

    fn make_question(id: i64, difficulty: Difficulty, correct_index: usize) -> Question {
        let options = (0..4)
            .map(|i| QuestionOption {
                text: format!("Option {}", i),
                is_correct: i == correct_index,
            })
            .collect();
        Question {
            id,
            stream_id: 1,
            subject_id: 1,
            topic_id: 1,
            question_text: format!("Sample question number {}", id),
            options: SqlJson(options),
            explanation: None,
            difficulty,
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    fn make_pool(start_id: i64, count: usize, difficulty: Difficulty) -> Vec<Question> {
        (0..count as i64)
            .map(|i| make_question(start_id + i, difficulty, 0))
            .collect()
    }

    fn answer(question_id: i64, selected: Option<i32>) -> Answer {
        Answer {
            question_id,
            selected_option_index: selected,
            time_taken_seconds: 10,
        }
    }

    #[test]
    fn tier_targets_splits_remainder_easy_first() {
        assert_eq!(tier_targets(20), [7, 7, 6]);
        assert_eq!(tier_targets(9), [3, 3, 3]);
        assert_eq!(tier_targets(1), [1, 0, 0]);
        assert_eq!(tier_targets(2), [1, 1, 0]);
        assert_eq!(tier_targets(100), [34, 33, 33]);
    }

    #[test]
    fn draw_returns_distinct_subset() {
        let mut rng = StdRng::seed_from_u64(7);
        let picked = draw(&mut rng, make_pool(1, 10, Difficulty::Easy), 4);

        assert_eq!(picked.len(), 4);
        let ids: HashSet<i64> = picked.iter().map(|q| q.id).collect();
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| (1..=10).contains(id)));
    }

    #[test]
    fn draw_caps_at_pool_size() {
        let mut rng = StdRng::seed_from_u64(7);
        let picked = draw(&mut rng, make_pool(1, 3, Difficulty::Hard), 10);
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn mixed_paper_honors_tier_split() {
        let mut rng = StdRng::seed_from_u64(11);
        let picked = assemble_mixed(
            &mut rng,
            [
                make_pool(1, 10, Difficulty::Easy),
                make_pool(100, 10, Difficulty::Medium),
                make_pool(200, 10, Difficulty::Hard),
            ],
            20,
        );

        assert_eq!(picked.len(), 20);
        let count =
            |tier| picked.iter().filter(|q| q.difficulty == tier).count();
        assert_eq!(count(Difficulty::Easy), 7);
        assert_eq!(count(Difficulty::Medium), 7);
        assert_eq!(count(Difficulty::Hard), 6);
    }

    #[test]
    fn mixed_paper_shrinks_on_tier_shortage() {
        // 5 Easy, 5 Medium, 1 Hard; nine requested -> targets 3/3/3 but
        // only one Hard exists, so the paper holds seven questions.
        let mut rng = StdRng::seed_from_u64(3);
        let picked = assemble_mixed(
            &mut rng,
            [
                make_pool(1, 5, Difficulty::Easy),
                make_pool(100, 5, Difficulty::Medium),
                make_pool(200, 1, Difficulty::Hard),
            ],
            9,
        );

        assert_eq!(picked.len(), 7);
        let count =
            |tier| picked.iter().filter(|q| q.difficulty == tier).count();
        assert_eq!(count(Difficulty::Easy), 3);
        assert_eq!(count(Difficulty::Medium), 3);
        assert_eq!(count(Difficulty::Hard), 1);
    }

    #[test]
    fn scoring_applies_marking_scheme() {
        // 10 answers: 6 correct, 3 wrong, 1 skipped.
        let questions: HashMap<i64, Question> = (1..=10)
            .map(|id| (id, make_question(id, Difficulty::Medium, 0)))
            .collect();
        let mut answers: Vec<Answer> = (1..=6).map(|id| answer(id, Some(0))).collect();
        answers.extend((7..=9).map(|id| answer(id, Some(2))));
        answers.push(answer(10, Some(-1)));

        let score = score_answers(&answers, &questions).unwrap();

        assert_eq!(score.total, 10);
        assert_eq!(score.correct, 6);
        assert_eq!(score.wrong, 3);
        assert_eq!(score.skipped, 1);
        assert_eq!(score.answered, 9);
        assert_eq!(score.answered, score.correct + score.wrong);
        assert_eq!(score.score, 21);
        assert_eq!(score.percentage, 60.0);
    }

    #[test]
    fn skipped_answers_count_neither_correct_nor_wrong() {
        let questions: HashMap<i64, Question> =
            [(1, make_question(1, Difficulty::Easy, 1))].into();
        let submitted = vec![answer(1, None)];

        let score = score_answers(&submitted, &questions).unwrap();

        assert_eq!(score.correct, 0);
        assert_eq!(score.wrong, 0);
        assert_eq!(score.skipped, 1);
        assert!(!score.outcomes[0].is_correct);
        assert_eq!(score.outcomes[0].selected_option, -1);
        // The review still discloses the correct option.
        assert_eq!(score.review[0].correct_option, 1);
    }

    #[test]
    fn scoring_is_deterministic() {
        let questions: HashMap<i64, Question> = (1..=5)
            .map(|id| (id, make_question(id, Difficulty::Hard, 2)))
            .collect();
        let answers: Vec<Answer> = (1..=5).map(|id| answer(id, Some(2))).collect();

        let first = score_answers(&answers, &questions).unwrap();
        let second = score_answers(&answers, &questions).unwrap();

        assert_eq!(first.score, second.score);
        assert_eq!(first.percentage, second.percentage);
    }

    #[test]
    fn unknown_question_fails_whole_submission() {
        let questions: HashMap<i64, Question> =
            [(1, make_question(1, Difficulty::Easy, 0))].into();
        let submitted = vec![answer(1, Some(0)), answer(99, Some(0))];

        let result = score_answers(&submitted, &questions);
        assert_eq!(result.unwrap_err(), ScoreError::UnknownQuestion(99));
    }

    #[test]
    fn empty_submission_scores_zero_percent() {
        let score = score_answers(&[], &HashMap::new()).unwrap();
        assert_eq!(score.total, 0);
        assert_eq!(score.percentage, 0.0);
        assert_eq!(score.score, 0);
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        // 1 of 3 correct -> 33.333... -> 33.33
        let questions: HashMap<i64, Question> = (1..=3)
            .map(|id| (id, make_question(id, Difficulty::Easy, 0)))
            .collect();
        let submitted = vec![answer(1, Some(0)), answer(2, Some(3)), answer(3, Some(3))];

        let score = score_answers(&submitted, &questions).unwrap();
        assert_eq!(score.percentage, 33.33);
    }

    #[test]
    fn duration_rounds_to_nearest_minute() {
        let start = Utc::now();
        assert_eq!(duration_minutes(start, start + TimeDelta::minutes(12)), 12);
        assert_eq!(duration_minutes(start, start + TimeDelta::seconds(90)), 2);
        assert_eq!(duration_minutes(start, start + TimeDelta::seconds(29)), 0);
    }

    #[test]
    fn time_limit_is_ninety_seconds_per_question() {
        assert_eq!(suggested_time_limit(10), 15);
        assert_eq!(suggested_time_limit(7), 11);
        assert_eq!(suggested_time_limit(1), 2);
    }
}
