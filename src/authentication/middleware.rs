use crate::authentication::JwtKeys;
use crate::revocation;
use crate::routes::{e500, json_error};
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::error::InternalError;
use actix_web::http::header::{HeaderMap, AUTHORIZATION, WWW_AUTHENTICATE};
use actix_web::http::StatusCode;
use actix_web::{web, HttpMessage};
use actix_web_lab::middleware::Next;
use anyhow::{anyhow, Context};
use std::ops::Deref;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Copy, Clone, Debug)]
pub struct UserId(Uuid);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Deref for UserId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The identity behind a verified bearer token.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub token_id: Uuid,
    pub expires_at: OffsetDateTime,
}

pub async fn reject_anonymous_users(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let token = bearer_token(req.headers()).map_err(unauthorized)?;

    let keys = req
        .app_data::<web::Data<JwtKeys>>()
        .cloned()
        .context("JWT keys are not configured")
        .map_err(e500)?;
    let pool = req
        .app_data::<web::Data<sqlx::PgPool>>()
        .cloned()
        .context("The database pool is not configured")
        .map_err(e500)?;

    let claims = keys.decode(&token).map_err(unauthorized)?;
    let expires_at = claims.expires_at().map_err(unauthorized)?;

    if revocation::is_revoked(&pool, claims.jti)
        .await
        .map_err(e500)?
    {
        return Err(unauthorized(anyhow!("The token has been revoked")));
    }

    req.extensions_mut().insert(AuthenticatedUser {
        user_id: UserId(claims.sub),
        token_id: claims.jti,
        expires_at,
    });

    next.call(req).await
}

fn bearer_token(headers: &HeaderMap) -> Result<String, anyhow::Error> {
    let header_value = headers
        .get(AUTHORIZATION)
        .context("The 'Authorization' header was missing")?;
    let header_value_string = header_value
        .to_str()
        .context("The 'Authorization' header was not a valid ASCII string")?;

    let token = header_value_string
        .strip_prefix("Bearer ")
        .context("The 'Authorization' header scheme was not 'Bearer'")?
        .trim();

    if token.is_empty() {
        return Err(anyhow!("The bearer token was empty"));
    }

    Ok(token.to_string())
}

fn unauthorized(err: anyhow::Error) -> actix_web::Error {
    tracing::info!(error.cause_chain = ?err, "rejecting anonymous request");

    let mut response = json_error(StatusCode::UNAUTHORIZED, "Invalid or missing access token");
    response.headers_mut().insert(
        WWW_AUTHENTICATE,
        actix_web::http::header::HeaderValue::from_static("Bearer"),
    );

    InternalError::from_response(err, response).into()
}
