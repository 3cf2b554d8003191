use crate::authentication::AuthenticatedUser;
use crate::revocation;
use crate::routes::e500;
use actix_web::{web, HttpResponse};

#[tracing::instrument(
    name = "Do logout",
    skip(pool, user),
    fields(user_id = %user.user_id)
)]
pub async fn logout(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
) -> Result<HttpResponse, actix_web::Error> {
    revocation::revoke(&pool, *user.user_id, user.token_id, user.expires_at)
        .await
        .map_err(e500)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Logout successful" })))
}
