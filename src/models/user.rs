// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Role names stored in `users.role`.
pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

/// A row of the 'users' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,

    /// Argon2 hash. Never serialized.
    #[serde(skip)]
    pub password: String,

    /// One of [`ROLE_USER`] or [`ROLE_ADMIN`].
    pub role: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Registration payload. New accounts always get the default role.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters."))]
    pub username: String,
    #[validate(length(min = 4, max = 128, message = "Password must be 4 to 128 characters."))]
    pub password: String,
}

/// Login payload.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}
