use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::{CreateUserRequest, User};

/// Longest display name accepted
pub const MAX_DISPLAY_NAME_LEN: usize = 80;

pub struct UsersService;

impl UsersService {
    /// Creates a new user
    pub async fn create_user(pool: &PgPool, req: &CreateUserRequest) -> AppResult<User> {
        let password_hash = User::hash_password(&req.password)?;
        let display_name = normalize_display_name(req.display_name.as_deref())?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, display_name, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, display_name, password_hash, is_active, created_at, last_login
            "#,
        )
        .bind(req.email.trim().to_lowercase())
        .bind(&display_name)
        .bind(&password_hash)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Email already exists".to_string())
            }
            _ => AppError::Internal(format!("Failed to create user: {}", e)),
        })?;

        Ok(user)
    }

    /// Gets a user by email
    pub async fn get_by_email(pool: &PgPool, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, display_name, password_hash, is_active, created_at, last_login
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Gets a user by ID
    pub async fn get_by_id(pool: &PgPool, user_id: i32) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, display_name, password_hash, is_active, created_at, last_login
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Updates the last login timestamp for a user
    pub async fn update_last_login(pool: &PgPool, user_id: i32) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET last_login = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Sets or clears the display name
    pub async fn update_display_name(
        pool: &PgPool,
        user_id: i32,
        display_name: Option<&str>,
    ) -> AppResult<User> {
        let display_name = normalize_display_name(display_name)?;

        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET display_name = $1
            WHERE id = $2
            RETURNING id, email, display_name, password_hash, is_active, created_at, last_login
            "#,
        )
        .bind(&display_name)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))
    }
}

fn normalize_display_name(name: Option<&str>) -> AppResult<Option<String>> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) if n.chars().count() > MAX_DISPLAY_NAME_LEN => Err(AppError::Validation(
            format!("Display name cannot exceed {} characters", MAX_DISPLAY_NAME_LEN),
        )),
        Some(n) => Ok(Some(n.to_string())),
        None => Ok(None),
    }
}
