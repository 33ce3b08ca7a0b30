// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{
            CreateQuestionRequest, Difficulty, Question, UpdateQuestionRequest, validate_options,
        },
        taxonomy::{
            CreateStreamRequest, CreateSubjectRequest, CreateTopicRequest, NodeState,
            UpdateNodeRequest,
        },
        user::{ROLE_ADMIN, ROLE_USER, User},
    },
    utils::{hash::hash_password, jwt::Claims},
};

fn validate_role(role: &str) -> Result<(), AppError> {
    if role == ROLE_USER || role == ROLE_ADMIN {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Role must be '{}' or '{}'",
            ROLE_USER, ROLE_ADMIN
        )))
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Lists every account, newest first. Password hashes are skipped by the
/// `User` serializer.
/// Admin only.
pub async fn list_users(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, username, password, role, created_at FROM users ORDER BY id DESC",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(users))
}

/// Create payload for the admin path, which unlike registration may pick
/// the role.
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters."))]
    pub username: String,
    #[validate(length(min = 4, max = 128, message = "Password must be 4 to 128 characters."))]
    pub password: String,
    pub role: String,
}

/// Creates an account with an explicit role.
/// Admin only.
pub async fn create_user(
    State(pool): State<PgPool>,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    validate_role(&payload.role)?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (username, password, role) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&payload.username)
    .bind(hash_password(&payload.password)?)
    .bind(&payload.role)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        AppError::unique_violation(e, format!("Username '{}' already exists", payload.username))
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Update payload for a user. Absent fields are left untouched.
#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub username: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
}

/// Applies a partial update to a user.
/// Admin only.
pub async fn update_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.username.is_none() && payload.role.is_none() && payload.password.is_none() {
        return Ok(StatusCode::OK);
    }
    if let Some(ref role) = payload.role {
        validate_role(role)?;
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = builder.separated(", ");

    let conflict_name = payload.username.clone();
    if let Some(username) = payload.username {
        separated.push("username = ");
        separated.push_bind_unseparated(username);
    }
    if let Some(role) = payload.role {
        separated.push("role = ");
        separated.push_bind_unseparated(role);
    }
    if let Some(password) = payload.password {
        separated.push("password = ");
        separated.push_bind_unseparated(hash_password(&password)?);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        AppError::unique_violation(
            e,
            format!(
                "Username '{}' already exists",
                conflict_name.unwrap_or_default()
            ),
        )
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Removes an account. Self-deletion is rejected so the system cannot
/// lose its last administrator by accident.
/// Admin only.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id()? {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// Creates a new stream.
/// Admin only.
pub async fn create_stream(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateStreamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO streams (name, description) VALUES ($1, $2) RETURNING id",
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .fetch_one(&pool)
    .await
    .map_err(|e| AppError::unique_violation(e, format!("Stream '{}' already exists", payload.name)))?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Creates a new subject under a stream.
/// Admin only.
pub async fn create_subject(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let stream: Option<i64> = sqlx::query_scalar("SELECT id FROM streams WHERE id = $1")
        .bind(payload.stream_id)
        .fetch_optional(&pool)
        .await?;
    if stream.is_none() {
        return Err(AppError::NotFound("Stream not found".to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO subjects (stream_id, name, description) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(payload.stream_id)
    .bind(&payload.name)
    .bind(&payload.description)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        AppError::unique_violation(
            e,
            format!("Subject '{}' already exists in this stream", payload.name),
        )
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Creates a new topic under a subject.
/// Admin only.
pub async fn create_topic(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateTopicRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let subject: Option<i64> = sqlx::query_scalar("SELECT id FROM subjects WHERE id = $1")
        .bind(payload.subject_id)
        .fetch_optional(&pool)
        .await?;
    if subject.is_none() {
        return Err(AppError::NotFound("Subject not found".to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO topics (subject_id, name, description) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(payload.subject_id)
    .bind(&payload.name)
    .bind(&payload.description)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        AppError::unique_violation(
            e,
            format!("Topic '{}' already exists in this subject", payload.name),
        )
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Which taxonomy level a node update/delete targets, with the table
/// names needed for the child guards.
struct NodeTables {
    table: &'static str,
    child_table: &'static str,
    child_fk: &'static str,
    label: &'static str,
}

const STREAM_TABLES: NodeTables = NodeTables {
    table: "streams",
    child_table: "subjects",
    child_fk: "stream_id",
    label: "Stream",
};
const SUBJECT_TABLES: NodeTables = NodeTables {
    table: "subjects",
    child_table: "topics",
    child_fk: "subject_id",
    label: "Subject",
};
const TOPIC_TABLES: NodeTables = NodeTables {
    table: "topics",
    child_table: "questions",
    child_fk: "topic_id",
    label: "Topic",
};

/// Shared update path for taxonomy nodes: optional rename/description,
/// and activation changes routed through the node state machine.
async fn update_node(
    pool: &PgPool,
    tables: &NodeTables,
    id: i64,
    payload: UpdateNodeRequest,
) -> Result<StatusCode, AppError> {
    let is_active: bool = sqlx::query_scalar(&format!(
        "SELECT is_active FROM {} WHERE id = $1",
        tables.table
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound(format!("{} not found", tables.label)))?;

    if let Some(new_name) = payload.name {
        if new_name.is_empty() || new_name.len() > 100 {
            return Err(AppError::BadRequest("Name length must be between 1 and 100".to_string()));
        }
        sqlx::query(&format!("UPDATE {} SET name = $1 WHERE id = $2", tables.table))
            .bind(&new_name)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| AppError::unique_violation(e, format!("Name '{}' already exists", new_name)))?;
    }

    if let Some(new_description) = payload.description {
        sqlx::query(&format!(
            "UPDATE {} SET description = $1 WHERE id = $2",
            tables.table
        ))
        .bind(&new_description)
        .bind(id)
        .execute(pool)
        .await?;
    }

    if let Some(target_active) = payload.is_active {
        let state = NodeState::from_flag(is_active);
        let next = if target_active {
            state.activate()
        } else {
            let active_children: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM {} WHERE {} = $1 AND is_active = TRUE",
                tables.child_table, tables.child_fk
            ))
            .bind(id)
            .fetch_one(pool)
            .await?;
            state.deactivate(active_children).map_err(AppError::Conflict)?
        };

        sqlx::query(&format!(
            "UPDATE {} SET is_active = $1 WHERE id = $2",
            tables.table
        ))
        .bind(next.as_flag())
        .bind(id)
        .execute(pool)
        .await?;
    }

    Ok(StatusCode::OK)
}

/// Shared delete path for taxonomy nodes. Deletion is a referential
/// integrity guard: blocked while the node has any children at all.
async fn delete_node(
    pool: &PgPool,
    tables: &NodeTables,
    id: i64,
) -> Result<StatusCode, AppError> {
    let children: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE {} = $1",
        tables.child_table, tables.child_fk
    ))
    .bind(id)
    .fetch_one(pool)
    .await?;

    if children > 0 {
        return Err(AppError::Conflict(format!(
            "{} still has {} {}",
            tables.label, children, tables.child_table
        )));
    }

    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", tables.table))
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete {}: {:?}", tables.label, e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("{} not found", tables.label)));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_stream(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateNodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    update_node(&pool, &STREAM_TABLES, id, payload).await
}

pub async fn delete_stream(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    delete_node(&pool, &STREAM_TABLES, id).await
}

pub async fn update_subject(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateNodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    update_node(&pool, &SUBJECT_TABLES, id, payload).await
}

pub async fn delete_subject(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    delete_node(&pool, &SUBJECT_TABLES, id).await
}

pub async fn update_topic(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateNodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    update_node(&pool, &TOPIC_TABLES, id, payload).await
}

pub async fn delete_topic(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    delete_node(&pool, &TOPIC_TABLES, id).await
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

/// Query parameters for the admin question listing.
#[derive(Debug, Deserialize)]
pub struct QuestionListParams {
    pub stream_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub difficulty: Option<Difficulty>,
}

/// Lists canonical questions (including answer flags and inactive rows),
/// optionally filtered by taxonomy and difficulty.
/// Admin only.
pub async fn list_questions(
    State(pool): State<PgPool>,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT id, stream_id, subject_id, topic_id, question_text, options, explanation, \
         difficulty, is_active, created_at, updated_at FROM questions WHERE 1 = 1",
    );

    if let Some(stream_id) = params.stream_id {
        builder.push(" AND stream_id = ");
        builder.push_bind(stream_id);
    }
    if let Some(subject_id) = params.subject_id {
        builder.push(" AND subject_id = ");
        builder.push_bind(subject_id);
    }
    if let Some(topic_id) = params.topic_id {
        builder.push(" AND topic_id = ");
        builder.push_bind(topic_id);
    }
    if let Some(difficulty) = params.difficulty {
        builder.push(" AND difficulty = ");
        builder.push_bind(difficulty);
    }
    builder.push(" ORDER BY id DESC");

    let questions = builder
        .build_query_as::<Question>()
        .fetch_all(&pool)
        .await?;

    Ok(Json(questions))
}

/// Creates a new question.
///
/// The option list is validated before the write: 2-6 options and exactly
/// one flagged correct.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    // The taxonomy chain must be consistent before the row is created.
    let chain: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM topics t
        JOIN subjects s ON t.subject_id = s.id
        WHERE t.id = $1 AND s.id = $2 AND s.stream_id = $3
        "#,
    )
    .bind(payload.topic_id)
    .bind(payload.subject_id)
    .bind(payload.stream_id)
    .fetch_one(&pool)
    .await?;
    if chain == 0 {
        return Err(AppError::BadRequest(
            "Topic does not belong to the given subject and stream".to_string(),
        ));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions
        (stream_id, subject_id, topic_id, question_text, options, explanation, difficulty)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(payload.stream_id)
    .bind(payload.subject_id)
    .bind(payload.topic_id)
    .bind(&payload.question_text)
    .bind(sqlx::types::Json(&payload.options))
    .bind(&payload.explanation)
    .bind(payload.difficulty)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Updates a question by ID. An options update re-validates the
/// single-correct-answer invariant before anything is written.
/// Admin only.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.question_text.is_none()
        && payload.options.is_none()
        && payload.explanation.is_none()
        && payload.difficulty.is_none()
        && payload.is_active.is_none()
    {
        return Ok(StatusCode::OK);
    }

    if let Some(ref options) = payload.options {
        validate_options(options)
            .map_err(|e| AppError::BadRequest(format!("Invalid options: {}", e.code)))?;
    }
    if let Some(ref text) = payload.question_text {
        if text.len() < 10 || text.len() > 1000 {
            return Err(AppError::BadRequest(
                "Question text length must be between 10 and 1000".to_string(),
            ));
        }
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(question_text) = payload.question_text {
        separated.push("question_text = ");
        separated.push_bind_unseparated(question_text);
    }

    if let Some(options) = payload.options {
        separated.push("options = ");
        separated.push_bind_unseparated(sqlx::types::Json(options));
    }

    if let Some(explanation) = payload.explanation {
        separated.push("explanation = ");
        separated.push_bind_unseparated(explanation);
    }

    if let Some(difficulty) = payload.difficulty {
        separated.push("difficulty = ");
        separated.push_bind_unseparated(difficulty);
    }

    if let Some(is_active) = payload.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }

    separated.push("updated_at = NOW()");

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deactivates a question (soft delete). Result records may still
/// reference it, so the row is never removed.
/// Admin only.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE questions SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to deactivate question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
