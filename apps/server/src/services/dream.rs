use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::dream::MAX_TITLE_LEN;
use crate::models::{Dream, NewDream, PublicDream, UpdateDream};
use crate::pagination::{page_offset, SortOrder};

pub struct DreamService;

impl DreamService {
    /// Stores a freshly woven dream
    pub async fn create(pool: &PgPool, input: &NewDream) -> AppResult<Dream> {
        let dream = sqlx::query_as::<_, Dream>(
            r#"
            INSERT INTO dreams (id, user_id, dream_text, title, content, image_url, mood, style, is_public)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, user_id, dream_text, title, content, image_url, mood, style,
                      is_public, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.dream_text)
        .bind(&input.title)
        .bind(&input.content)
        .bind(&input.image_url)
        .bind(&input.mood)
        .bind(&input.style)
        .bind(input.is_public)
        .fetch_one(pool)
        .await?;

        Ok(dream)
    }

    /// Gets a dream by ID
    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> AppResult<Dream> {
        let dream = sqlx::query_as::<_, Dream>(
            r#"
            SELECT id, user_id, dream_text, title, content, image_url, mood, style,
                   is_public, created_at, updated_at
            FROM dreams
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Dream with id {} not found", id)))?;

        Ok(dream)
    }

    /// Gets a dream the user may see (their own, or a public one)
    pub async fn get_visible(pool: &PgPool, id: Uuid, user_id: i32) -> AppResult<Dream> {
        let dream = Self::get_by_id(pool, id).await?;
        if !dream.is_visible_to(user_id) {
            // Private dreams of other users are indistinguishable from missing ones
            return Err(AppError::NotFound(format!("Dream with id {} not found", id)));
        }
        Ok(dream)
    }

    /// Lists a user's own dreams with offset-based pagination
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: i32,
        order: SortOrder,
        page: i64,
        per_page: i64,
    ) -> AppResult<(Vec<Dream>, i64)> {
        let offset = page_offset(page, per_page)?;

        let total_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dreams WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

        let order_clause = match order {
            SortOrder::Asc => "ORDER BY created_at ASC, id ASC",
            SortOrder::Desc => "ORDER BY created_at DESC, id DESC",
        };

        let query = format!(
            r#"
            SELECT id, user_id, dream_text, title, content, image_url, mood, style,
                   is_public, created_at, updated_at
            FROM dreams
            WHERE user_id = $1
            {}
            LIMIT $2 OFFSET $3
            "#,
            order_clause
        );

        let dreams = sqlx::query_as::<_, Dream>(&query)
            .bind(user_id)
            .bind(per_page)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok((dreams, total_count.0))
    }

    /// Lists the public dream library
    pub async fn list_public(
        pool: &PgPool,
        order: SortOrder,
        page: i64,
        per_page: i64,
    ) -> AppResult<(Vec<PublicDream>, i64)> {
        let offset = page_offset(page, per_page)?;

        let total_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dreams WHERE is_public")
            .fetch_one(pool)
            .await?;

        let order_clause = match order {
            SortOrder::Asc => "ORDER BY d.created_at ASC, d.id ASC",
            SortOrder::Desc => "ORDER BY d.created_at DESC, d.id DESC",
        };

        let query = format!(
            r#"
            SELECT d.id, d.title, d.content, d.image_url, d.mood,
                   COALESCE(NULLIF(TRIM(u.display_name), ''), SPLIT_PART(u.email, '@', 1)) AS author_name,
                   d.created_at
            FROM dreams d
            JOIN users u ON u.id = d.user_id
            WHERE d.is_public
            {}
            LIMIT $1 OFFSET $2
            "#,
            order_clause
        );

        let dreams = sqlx::query_as::<_, PublicDream>(&query)
            .bind(per_page)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok((dreams, total_count.0))
    }

    /// Updates title and/or visibility of a dream owned by `user_id`
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        user_id: i32,
        input: UpdateDream,
    ) -> AppResult<Dream> {
        let dream = Self::get_owned(pool, id, user_id).await?;

        let title = match input.title {
            Some(ref title) => {
                let title = title.trim();
                if title.is_empty() {
                    return Err(AppError::Validation("Title cannot be empty".to_string()));
                }
                if title.chars().count() > MAX_TITLE_LEN {
                    return Err(AppError::Validation(format!(
                        "Title cannot exceed {} characters",
                        MAX_TITLE_LEN
                    )));
                }
                title.to_string()
            }
            None => dream.title,
        };
        let is_public = input.is_public.unwrap_or(dream.is_public);

        let dream = sqlx::query_as::<_, Dream>(
            r#"
            UPDATE dreams SET title = $1, is_public = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING id, user_id, dream_text, title, content, image_url, mood, style,
                      is_public, created_at, updated_at
            "#,
        )
        .bind(&title)
        .bind(is_public)
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(dream)
    }

    /// Deletes a dream owned by `user_id`. Its generation event is kept.
    pub async fn delete(pool: &PgPool, id: Uuid, user_id: i32) -> AppResult<()> {
        Self::get_owned(pool, id, user_id).await?;
        Self::delete_unchecked(pool, id).await
    }

    /// Deletes a dream without an ownership check
    pub async fn delete_unchecked(pool: &PgPool, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM dreams WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn get_owned(pool: &PgPool, id: Uuid, user_id: i32) -> AppResult<Dream> {
        let dream = Self::get_visible(pool, id, user_id).await?;
        if dream.user_id != user_id {
            return Err(AppError::Forbidden(
                "Only the dreamer can change this dream".to_string(),
            ));
        }
        Ok(dream)
    }
}
