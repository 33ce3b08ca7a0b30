// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, catalog, quiz},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

fn cors_layer() -> CorsLayer {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
}

/// Assembles the application router.
///
/// Route groups and their protection levels:
/// * `/api/auth`, `/api/catalog`, `/api/quiz/generate` are public.
/// * `/api/quiz/submit`, history and result detail need a bearer token.
/// * `/api/admin/*` needs a bearer token AND the admin role.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let catalog_routes = Router::new()
        .route("/streams", get(catalog::list_streams))
        .route("/streams/{id}/subjects", get(catalog::list_subjects))
        .route("/subjects/{id}/topics", get(catalog::list_topics));

    let quiz_routes = Router::new()
        .route("/generate", post(quiz::generate_test))
        .merge(
            Router::new()
                .route("/submit", post(quiz::submit_test))
                .route("/history", get(quiz::test_history))
                .route("/results/{id}", get(quiz::test_result_detail))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/streams", post(admin::create_stream))
        .route(
            "/streams/{id}",
            put(admin::update_stream).delete(admin::delete_stream),
        )
        .route("/subjects", post(admin::create_subject))
        .route(
            "/subjects/{id}",
            put(admin::update_subject).delete(admin::delete_subject),
        )
        .route("/topics", post(admin::create_topic))
        .route(
            "/topics/{id}",
            put(admin::update_topic).delete(admin::delete_topic),
        )
        .route(
            "/questions",
            get(admin::list_questions).post(admin::create_question),
        )
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        // Layers run outside in: the auth check decodes the token, then
        // the admin check inspects the decoded claims.
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/catalog", catalog_routes)
        .nest("/api/quiz", quiz_routes)
        .nest("/api/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}
