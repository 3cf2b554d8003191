use actix_web::body::to_bytes;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use anyhow::anyhow;
use sqlx::postgres::{PgHasArrayType, PgTypeInfo};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug)]
pub struct IdempotencyKey(String);

const MAX_KEY_LENGTH: usize = 50;

impl TryFrom<String> for IdempotencyKey {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.is_empty() {
            Err(anyhow!("idempotency key cannot be empty"))
        } else if s.len() >= MAX_KEY_LENGTH {
            Err(anyhow!(
                "idempotency key must be shorter than {} characters",
                MAX_KEY_LENGTH
            ))
        } else {
            Ok(Self(s))
        }
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, sqlx::Type)]
#[sqlx(type_name = "header_pair")]
struct HeaderPairRecord {
    name: String,
    value: Vec<u8>,
}

impl PgHasArrayType for HeaderPairRecord {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_header_pair")
    }
}

#[derive(sqlx::FromRow)]
struct SavedResponseRecord {
    response_status_code: Option<i16>,
    response_headers: Option<Vec<HeaderPairRecord>>,
    response_body: Option<Vec<u8>>,
}

pub async fn get_saved_response(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    idempotency_key: &IdempotencyKey,
) -> Result<Option<HttpResponse>, anyhow::Error> {
    let saved_response: Option<SavedResponseRecord> = sqlx::query_as(
        r#"
            SELECT
                response_status_code,
                response_headers,
                response_body
            FROM idempotency
            WHERE user_id = $1 AND idempotency_key = $2
            "#,
    )
    .bind(user_id)
    .bind(idempotency_key.as_ref())
    .fetch_optional(pool)
    .await?;

    // Rebuild the response

    let saved_response = match saved_response {
        Some(SavedResponseRecord {
            response_status_code: Some(status_code),
            response_headers,
            response_body: Some(body),
        }) => (status_code, response_headers.unwrap_or_default(), body),
        _ => return Ok(None),
    };

    let (response_status_code, response_headers, response_body) = saved_response;

    let response_status_code = response_status_code.try_into()?;
    let status_code = StatusCode::from_u16(response_status_code)?;

    let mut response_builder = HttpResponse::build(status_code);
    for HeaderPairRecord { name, value } in response_headers {
        response_builder.append_header((name, value));
    }

    let response = response_builder.body(response_body);

    Ok(Some(response))
}

pub enum NextAction {
    StartProcessing(Transaction<'static, Postgres>),
    ReturnSavedResponse(HttpResponse),
}

/// Claims the key for this request, or hands back the response stored by
/// the request that claimed it first.
///
/// A concurrent request with the same key blocks on the insert until the
/// first one commits.
pub async fn try_processing(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    idempotency_key: &IdempotencyKey,
) -> Result<NextAction, anyhow::Error> {
    let mut transaction = pool.begin().await?;

    let n_inserted_rows = sqlx::query(
        r#"
        INSERT INTO idempotency (user_id, idempotency_key, created_at)
        VALUES ($1, $2, now())
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(idempotency_key.as_ref())
    .execute(&mut transaction)
    .await?
    .rows_affected();

    if n_inserted_rows > 0 {
        Ok(NextAction::StartProcessing(transaction))
    } else {
        let saved_response = get_saved_response(pool, user_id, idempotency_key)
            .await?
            .ok_or_else(|| anyhow!("We expected a saved response, we didn't find it"))?;

        Ok(NextAction::ReturnSavedResponse(saved_response))
    }
}

pub async fn save_response(
    mut transaction: Transaction<'static, Postgres>,
    user_id: Uuid,
    idempotency_key: &IdempotencyKey,
    http_response: HttpResponse,
) -> Result<HttpResponse, anyhow::Error> {
    let (response_head, body) = http_response.into_parts();
    let body = to_bytes(body).await.map_err(|err| anyhow!("{}", err))?;

    let status_code = response_head.status().as_u16() as i16;
    let headers = {
        let mut h = Vec::with_capacity(response_head.headers().len());
        for (name, value) in response_head.headers().iter() {
            let name = name.as_str().to_owned();
            let value = value.as_bytes().to_owned();
            h.push(HeaderPairRecord { name, value });
        }
        h
    };

    sqlx::query(
        r#"
        UPDATE idempotency
        SET
            response_status_code = $3,
            response_headers = $4,
            response_body = $5
        WHERE
            user_id = $1 AND
            idempotency_key = $2
        "#,
    )
    .bind(user_id)
    .bind(idempotency_key.as_ref())
    .bind(status_code)
    .bind(headers)
    .bind(body.as_ref())
    .execute(&mut transaction)
    .await?;

    transaction.commit().await?;

    let http_response = response_head.set_body(body).map_into_boxed_body();

    Ok(http_response)
}
