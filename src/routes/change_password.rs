use crate::authentication::{self, validate_credentials, AuthError, AuthenticatedUser, Credentials};
use crate::domain::NewPassword;
use crate::routes::profile::get_user_profile;
use crate::routes::{error_chain_fmt, json_error};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use secrecy::{ExposeSecret, Secret};
use std::fmt;

#[derive(thiserror::Error)]
pub enum ChangePasswordError {
    #[error("{0}")]
    Validation(String),
    #[error("The current password is incorrect")]
    InvalidCurrentPassword(#[source] anyhow::Error),
    #[error("Something went wrong")]
    Unexpected(#[from] anyhow::Error),
}

impl fmt::Debug for ChangePasswordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for ChangePasswordError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCurrentPassword(_) => StatusCode::UNAUTHORIZED,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), &self.to_string())
    }
}

#[derive(serde::Deserialize)]
pub struct ChangePasswordBody {
    current_password: Secret<String>,
    new_password: Secret<String>,
    new_password_check: Secret<String>,
}

#[tracing::instrument(name = "Change password", skip(pool, user, body), fields(user_id = %user.user_id))]
pub async fn change_password(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    body: web::Json<ChangePasswordBody>,
) -> Result<HttpResponse, ChangePasswordError> {
    let body = body.into_inner();

    if body.new_password.expose_secret() != body.new_password_check.expose_secret() {
        return Err(ChangePasswordError::Validation(
            "You entered two different new passwords - the field values must match.".to_string(),
        ));
    }
    let new_password =
        NewPassword::parse(body.new_password).map_err(ChangePasswordError::Validation)?;

    let profile = get_user_profile(&pool, *user.user_id).await?;

    let credentials = Credentials {
        email: profile.email,
        password: body.current_password,
    };

    if let Err(err) = validate_credentials(&pool, credentials).await {
        return match err {
            AuthError::InvalidCredentials(_) => {
                Err(ChangePasswordError::InvalidCurrentPassword(err.into()))
            }
            AuthError::Unexpected(_) => Err(ChangePasswordError::Unexpected(err.into())),
        };
    }

    authentication::change_password(&pool, *user.user_id, new_password.into_secret()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Your password has been changed" })))
}
