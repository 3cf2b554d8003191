use crate::authentication::AuthenticatedUser;
use crate::routes::e500;
use actix_web::{web, HttpResponse};
use anyhow::Context;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct UserProfile {
    #[sqlx(rename = "user_id")]
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub storage_used: i64,
    pub storage_limit: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// What a client gets back after registering or logging in.
#[derive(serde::Serialize)]
pub struct AuthResponse {
    pub user: UserProfile,
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[tracing::instrument(name = "Get user profile", skip(pool))]
pub async fn get_user_profile(
    pool: &sqlx::PgPool,
    user_id: Uuid,
) -> Result<UserProfile, anyhow::Error> {
    let profile = sqlx::query_as(
        r#"
        SELECT user_id, email, name, storage_used, storage_limit, created_at
        FROM users
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("Failed to perform query to retrieve the user profile")?;

    Ok(profile)
}

#[tracing::instrument(name = "Get profile", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn profile(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
) -> Result<HttpResponse, actix_web::Error> {
    let profile = get_user_profile(&pool, *user.user_id)
        .await
        .map_err(e500)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "user": profile })))
}
