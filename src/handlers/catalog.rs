// src/handlers/catalog.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::taxonomy::{Stream, Subject, Topic},
};

/// Lists all active streams.
pub async fn list_streams(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let streams = sqlx::query_as::<_, Stream>(
        r#"
        SELECT id, name, description, is_active, created_at
        FROM streams
        WHERE is_active = TRUE
        ORDER BY name
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(streams))
}

/// Lists the active subjects of a stream.
pub async fn list_subjects(
    State(pool): State<PgPool>,
    Path(stream_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _stream = sqlx::query_as::<_, Stream>(
        "SELECT id, name, description, is_active, created_at FROM streams WHERE id = $1",
    )
    .bind(stream_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Stream not found".to_string()))?;

    let subjects = sqlx::query_as::<_, Subject>(
        r#"
        SELECT id, stream_id, name, description, is_active, created_at
        FROM subjects
        WHERE stream_id = $1 AND is_active = TRUE
        ORDER BY name
        "#,
    )
    .bind(stream_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(subjects))
}

/// Lists the active topics of a subject.
pub async fn list_topics(
    State(pool): State<PgPool>,
    Path(subject_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _subject = sqlx::query_as::<_, Subject>(
        "SELECT id, stream_id, name, description, is_active, created_at FROM subjects WHERE id = $1",
    )
    .bind(subject_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Subject not found".to_string()))?;

    let topics = sqlx::query_as::<_, Topic>(
        r#"
        SELECT id, subject_id, name, description, is_active, created_at
        FROM topics
        WHERE subject_id = $1 AND is_active = TRUE
        ORDER BY name
        "#,
    )
    .bind(subject_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(topics))
}
