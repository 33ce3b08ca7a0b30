// tests/api_tests.rs

use prep_backend::{config::Config, routes, state::AppState};
use prep_backend::models::question::{Difficulty, QuestionOption};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;

/// Boots the full router against the `DATABASE_URL` Postgres on a random
/// local port and returns the base URL. Migrations run first, so a fresh
/// database works out of the box.
async fn spawn_app() -> String {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        port: 0,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let app = routes::create_router(AppState::new(pool, config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let address = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

async fn test_pool() -> PgPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test DB")
}

/// Seeds one stream -> subject -> topic chain and returns their IDs.
async fn seed_taxonomy(pool: &PgPool) -> (i64, i64, i64) {
    let suffix = &uuid::Uuid::new_v4().to_string()[..8];

    let stream_id: i64 =
        sqlx::query_scalar("INSERT INTO streams (name) VALUES ($1) RETURNING id")
            .bind(format!("Stream {}", suffix))
            .fetch_one(pool)
            .await
            .unwrap();

    let subject_id: i64 = sqlx::query_scalar(
        "INSERT INTO subjects (stream_id, name) VALUES ($1, $2) RETURNING id",
    )
    .bind(stream_id)
    .bind(format!("Subject {}", suffix))
    .fetch_one(pool)
    .await
    .unwrap();

    let topic_id: i64 = sqlx::query_scalar(
        "INSERT INTO topics (subject_id, name) VALUES ($1, $2) RETURNING id",
    )
    .bind(subject_id)
    .bind(format!("Topic {}", suffix))
    .fetch_one(pool)
    .await
    .unwrap();

    (stream_id, subject_id, topic_id)
}

/// Seeds `count` questions for a tier. The correct option is always the
/// first one.
async fn seed_questions(
    pool: &PgPool,
    (stream_id, subject_id, topic_id): (i64, i64, i64),
    difficulty: Difficulty,
    count: usize,
) {
    for i in 0..count {
        let options = vec![
            QuestionOption { text: "Right answer".to_string(), is_correct: true },
            QuestionOption { text: "Wrong answer 1".to_string(), is_correct: false },
            QuestionOption { text: "Wrong answer 2".to_string(), is_correct: false },
            QuestionOption { text: "Wrong answer 3".to_string(), is_correct: false },
        ];
        sqlx::query(
            r#"
            INSERT INTO questions
            (stream_id, subject_id, topic_id, question_text, options, explanation, difficulty)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(stream_id)
        .bind(subject_id)
        .bind(topic_id)
        .bind(format!("Seeded question number {}", i))
        .bind(Json(&options))
        .bind("Because the first option is right.")
        .bind(difficulty)
        .execute(pool)
        .await
        .unwrap();
    }
}

/// Registers a fresh user and returns (username, bearer token).
async fn register_and_login(client: &reqwest::Client, address: &str) -> (String, String) {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let password = "password123";

    client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Register failed");

    let login_resp = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    let token = login_resp["token"].as_str().expect("Token not found").to_string();
    (username, token)
}

#[tokio::test]
async fn unknown_route_is_404() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/no/such/route", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_creates_account() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]),
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    // The stored hash must never appear in the response.
    assert!(body.get("password").is_none());
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn register_rejects_short_username() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": "yo",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn generate_requires_stream_id() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/quiz/generate", address))
        .json(&serde_json::json!({ "numQuestions": 10 }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn generate_rejects_out_of_range_count() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;
    let (stream_id, _, _) = seed_taxonomy(&pool).await;

    for bad_count in [0, 201] {
        let response = client
            .post(format!("{}/api/quiz/generate", address))
            .json(&serde_json::json!({
                "streamId": stream_id,
                "numQuestions": bad_count
            }))
            .send()
            .await
            .expect("Failed to execute request");

        assert_eq!(response.status().as_u16(), 400, "count {}", bad_count);
    }
}

#[tokio::test]
async fn generate_unknown_stream_is_404() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/quiz/generate", address))
        .json(&serde_json::json!({
            "streamId": 999_999_999,
            "numQuestions": 10
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn generate_empty_pool_is_404_with_hint() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;
    // A stream with no questions at all.
    let (stream_id, _, _) = seed_taxonomy(&pool).await;

    let response = client
        .post(format!("{}/api/quiz/generate", address))
        .json(&serde_json::json!({
            "streamId": stream_id,
            "numQuestions": 5
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Try different"));
}

#[tokio::test]
async fn full_test_flow() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let chain = seed_taxonomy(&pool).await;
    seed_questions(&pool, chain, Difficulty::Easy, 6).await;
    seed_questions(&pool, chain, Difficulty::Medium, 6).await;
    seed_questions(&pool, chain, Difficulty::Hard, 6).await;

    let (_, token) = register_and_login(&client, &address).await;

    // 1. Generate a mixed paper.
    let generate_resp = client
        .post(format!("{}/api/quiz/generate", address))
        .json(&serde_json::json!({
            "streamId": chain.0,
            "numQuestions": 9,
            "difficulty": "mixed"
        }))
        .send()
        .await
        .expect("Generate failed");

    assert_eq!(generate_resp.status().as_u16(), 200);
    let body_text = generate_resp.text().await.unwrap();
    // The answer key and explanation must never leave the server here.
    assert!(!body_text.contains("isCorrect"));
    assert!(!body_text.contains("explanation"));

    let generated: serde_json::Value = serde_json::from_str(&body_text).unwrap();
    let questions = generated["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 9);
    assert_eq!(generated["metadata"]["totalQuestions"], 9);
    // ceil(9 * 1.5) minutes
    assert_eq!(generated["metadata"]["timeLimit"], 14);
    assert_eq!(generated["metadata"]["difficulty"], "mixed");
    for q in questions {
        assert_eq!(q["options"].as_array().unwrap().len(), 4);
        assert!(q["options"][0].is_string());
    }

    // 2. Submit: 6 correct (seeded correct option is index 0), 2 wrong,
    //    1 skipped.
    let answers: Vec<serde_json::Value> = questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let selected = match i {
                0..=5 => 0,
                6 | 7 => 2,
                _ => -1,
            };
            serde_json::json!({
                "questionId": q["id"],
                "selectedOptionIndex": selected,
                "timeTakenSeconds": 30
            })
        })
        .collect();

    let submit_resp = client
        .post(format!("{}/api/quiz/submit", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "streamId": chain.0,
            "answers": answers,
            "startTime": "2026-08-04T10:00:00Z",
            "endTime": "2026-08-04T10:12:00Z",
            "difficulty": "mixed"
        }))
        .send()
        .await
        .expect("Submit failed");

    assert_eq!(submit_resp.status().as_u16(), 200);
    let result: serde_json::Value = submit_resp.json().await.unwrap();

    let summary = &result["summary"];
    assert_eq!(summary["totalQuestions"], 9);
    assert_eq!(summary["correctAnswers"], 6);
    assert_eq!(summary["wrongAnswers"], 2);
    assert_eq!(summary["skippedQuestions"], 1);
    assert_eq!(summary["answeredQuestions"], 8);
    // 6*4 - 2*1
    assert_eq!(summary["score"], 22);
    // round(6/9 * 100, 2)
    assert_eq!(summary["percentage"], 66.67);
    assert_eq!(summary["timeTaken"], 12);

    // The review restores the correct option for every question.
    let review = result["questions"].as_array().unwrap();
    assert_eq!(review.len(), 9);
    for q in review {
        assert_eq!(q["correctOption"], 0);
    }

    // 3. The result shows up in the caller's history.
    let result_id = result["testResultId"].as_i64().unwrap();
    let history: serde_json::Value = client
        .get(format!("{}/api/quiz/history", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("History failed")
        .json()
        .await
        .unwrap();

    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"].as_i64().unwrap(), result_id);

    // 4. Detail fetch by id.
    let detail_resp = client
        .get(format!("{}/api/quiz/results/{}", address, result_id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Detail failed");
    assert_eq!(detail_resp.status().as_u16(), 200);
}

#[tokio::test]
async fn mixed_generation_flags_shortage_with_smaller_paper() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let chain = seed_taxonomy(&pool).await;
    seed_questions(&pool, chain, Difficulty::Easy, 5).await;
    seed_questions(&pool, chain, Difficulty::Medium, 5).await;
    seed_questions(&pool, chain, Difficulty::Hard, 1).await;

    let response = client
        .post(format!("{}/api/quiz/generate", address))
        .json(&serde_json::json!({
            "streamId": chain.0,
            "numQuestions": 9,
            "difficulty": "mixed"
        }))
        .send()
        .await
        .expect("Generate failed");

    assert_eq!(response.status().as_u16(), 200);
    let generated: serde_json::Value = response.json().await.unwrap();
    // Targets 3/3/3, but only one Hard question exists.
    assert_eq!(generated["questions"].as_array().unwrap().len(), 7);
    assert_eq!(generated["metadata"]["totalQuestions"], 7);
}

#[tokio::test]
async fn fixed_generation_returns_pool_when_short() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let chain = seed_taxonomy(&pool).await;
    seed_questions(&pool, chain, Difficulty::Easy, 5).await;

    let response = client
        .post(format!("{}/api/quiz/generate", address))
        .json(&serde_json::json!({
            "streamId": chain.0,
            "numQuestions": 10,
            "difficulty": "easy"
        }))
        .send()
        .await
        .expect("Generate failed");

    assert_eq!(response.status().as_u16(), 200);
    let generated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(generated["questions"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn submit_with_unknown_question_creates_no_result() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;
    let (stream_id, _, _) = seed_taxonomy(&pool).await;

    let (_, token) = register_and_login(&client, &address).await;

    let submit_resp = client
        .post(format!("{}/api/quiz/submit", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "streamId": stream_id,
            "answers": [
                { "questionId": 999_999_999, "selectedOptionIndex": 0 }
            ],
            "startTime": "2026-08-04T10:00:00Z",
            "endTime": "2026-08-04T10:05:00Z"
        }))
        .send()
        .await
        .expect("Submit failed");

    assert_eq!(submit_resp.status().as_u16(), 400);

    // The rejected submission must not leave a result behind.
    let history: serde_json::Value = client
        .get(format!("{}/api/quiz/history", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("History failed")
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn submit_rejects_non_array_answers() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;
    let (stream_id, _, _) = seed_taxonomy(&pool).await;

    let (_, token) = register_and_login(&client, &address).await;

    let response = client
        .post(format!("{}/api/quiz/submit", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "streamId": stream_id,
            "answers": "not an array",
            "startTime": "2026-08-04T10:00:00Z",
            "endTime": "2026-08-04T10:05:00Z"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn submit_requires_auth() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/quiz/submit", address))
        .json(&serde_json::json!({
            "streamId": 1,
            "answers": [],
            "startTime": "2026-08-04T10:00:00Z",
            "endTime": "2026-08-04T10:05:00Z"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}
