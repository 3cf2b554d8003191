use crate::authentication::{validate_credentials, AuthError, Credentials, JwtKeys};
use crate::routes::profile::{get_user_profile, AuthResponse};
use crate::routes::{error_chain_fmt, json_error};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use secrecy::Secret;
use std::fmt;

#[derive(thiserror::Error)]
pub enum LoginError {
    #[error("Invalid credentials")]
    Auth(#[source] anyhow::Error),
    #[error("Something went wrong")]
    Unexpected(#[from] anyhow::Error),
}

impl fmt::Debug for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for LoginError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), &self.to_string())
    }
}

#[derive(serde::Deserialize)]
pub struct LoginBody {
    email: String,
    password: Secret<String>,
}

#[tracing::instrument(
    name = "Do login",
    skip(pool, jwt_keys, body),
    fields(
        user_email = tracing::field::Empty,
        user_id = tracing::field::Empty
    )
)]
pub async fn login(
    pool: web::Data<sqlx::PgPool>,
    jwt_keys: web::Data<JwtKeys>,
    body: web::Json<LoginBody>,
) -> Result<HttpResponse, LoginError> {
    let credentials = Credentials {
        email: body.0.email,
        password: body.0.password,
    };

    tracing::Span::current().record("user_email", &tracing::field::display(&credentials.email));

    let user_id = validate_credentials(&pool, credentials)
        .await
        .map_err(|err| match err {
            AuthError::InvalidCredentials(_) => LoginError::Auth(err.into()),
            AuthError::Unexpected(_) => LoginError::Unexpected(err.into()),
        })?;

    tracing::Span::current().record("user_id", &tracing::field::display(&user_id));

    let user = get_user_profile(&pool, user_id).await?;
    let issued = jwt_keys.issue(user.id, &user.email)?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        user,
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}
