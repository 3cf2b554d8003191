use crate::authentication::{compute_password_hash, JwtKeys};
use crate::domain::{NewPassword, NewUser, UserEmail, UserName};
use crate::routes::profile::{get_user_profile, AuthResponse};
use crate::routes::{error_chain_fmt, json_error};
use crate::startup::DefaultQuota;
use crate::telemetry::spawn_blocking_with_tracing;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use anyhow::Context;
use secrecy::{ExposeSecret, Secret};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(serde::Deserialize)]
pub struct RegisterBody {
    email: String,
    password: Secret<String>,
    name: String,
}

impl TryFrom<RegisterBody> for NewUser {
    type Error = String;

    fn try_from(value: RegisterBody) -> Result<Self, Self::Error> {
        let email = UserEmail::parse(value.email)?;
        let name = UserName::parse(value.name)?;
        let password = NewPassword::parse(value.password)?;

        Ok(NewUser {
            email,
            name,
            password,
        })
    }
}

#[derive(thiserror::Error)]
pub enum RegisterError {
    #[error("{0}")]
    Validation(String),
    #[error("A user with this email address already exists")]
    AlreadyExists,
    #[error("Something went wrong")]
    Unexpected(#[from] anyhow::Error),
}

impl fmt::Debug for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for RegisterError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), &self.to_string())
    }
}

#[tracing::instrument(
    name = "Register a new user",
    skip(pool, jwt_keys, default_quota, body),
    fields(
        user_email = %body.email,
        user_id = tracing::field::Empty
    )
)]
pub async fn register(
    pool: web::Data<sqlx::PgPool>,
    jwt_keys: web::Data<JwtKeys>,
    default_quota: web::Data<DefaultQuota>,
    body: web::Json<RegisterBody>,
) -> Result<HttpResponse, RegisterError> {
    let new_user: NewUser = body.0.try_into().map_err(RegisterError::Validation)?;

    let user_id = insert_user(&pool, new_user, default_quota.0)
        .await?
        .ok_or(RegisterError::AlreadyExists)?;
    tracing::Span::current().record("user_id", &tracing::field::display(&user_id));

    let user = get_user_profile(&pool, user_id).await?;
    let issued = jwt_keys.issue(user.id, &user.email)?;

    Ok(HttpResponse::Created().json(AuthResponse {
        user,
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}

/// Returns `None` when the email address is already taken.
#[tracing::instrument(name = "Saving new user details in the database", skip(pool, new_user))]
async fn insert_user(
    pool: &sqlx::PgPool,
    new_user: NewUser,
    storage_limit: i64,
) -> Result<Option<Uuid>, anyhow::Error> {
    let password = new_user.password.into_secret();
    let password_hash = spawn_blocking_with_tracing(move || compute_password_hash(password))
        .await
        .context("Failed to spawn blocking task")??;

    let user_id = Uuid::new_v4();

    let result = sqlx::query(
        r#"
        INSERT INTO users(user_id, email, name, password_hash, storage_used, storage_limit, created_at)
        VALUES($1, $2, $3, $4, 0, $5, $6)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(new_user.email.as_ref())
    .bind(new_user.name.as_ref())
    .bind(password_hash.expose_secret())
    .bind(storage_limit)
    .bind(OffsetDateTime::now_utc())
    .execute(pool)
    .await
    .context("Failed to insert the new user")?;

    if result.rows_affected() == 0 {
        Ok(None)
    } else {
        Ok(Some(user_id))
    }
}
