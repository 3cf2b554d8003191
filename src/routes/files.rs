use crate::authentication::AuthenticatedUser;
use crate::domain::{FileName, Pagination};
use crate::routes::emails::PageInfo;
use crate::routes::{contains_pattern, deserialize_some, error_chain_fmt, json_error};
use crate::startup::UploadLimit;
use actix_web::http::header::{self, ContentDisposition, DispositionParam, DispositionType};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use anyhow::Context;
use futures_util::StreamExt;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(thiserror::Error)]
pub enum FileError {
    #[error("{0}")]
    Validation(String),
    #[error("File not found")]
    NotFound,
    #[error("Storage quota exceeded")]
    QuotaExceeded,
    #[error("The file is too large")]
    PayloadTooLarge,
    #[error("Something went wrong")]
    Unexpected(#[from] anyhow::Error),
}

impl fmt::Debug for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for FileError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::QuotaExceeded | Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), &self.to_string())
    }
}

impl From<sqlx::Error> for FileError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unexpected(err.into())
    }
}

const FILE_COLUMNS: &str =
    "id, folder_id, name, mime_type, size, is_starred, deleted_at, created_at, updated_at";

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: Uuid,
    pub folder_id: Option<Uuid>,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub is_starred: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

type PgTransaction = sqlx::Transaction<'static, sqlx::Postgres>;

#[derive(serde::Deserialize)]
pub struct UploadQuery {
    name: String,
    folder_id: Option<Uuid>,
}

/// Clients that don't know the type send `application/octet-stream`; the
/// file name is a better hint then.
fn resolve_mime_type(content_type: Option<&str>, name: &FileName) -> String {
    match content_type.map(str::trim) {
        Some(content_type)
            if !content_type.is_empty()
                && content_type != mime_guess::mime::APPLICATION_OCTET_STREAM.essence_str() =>
        {
            content_type.to_string()
        }
        _ => mime_guess::from_path(name.as_ref())
            .first_or_octet_stream()
            .to_string(),
    }
}

/// Reads the request body, giving up as soon as it grows past `limit` bytes.
async fn read_content(mut payload: web::Payload, limit: usize) -> Result<web::Bytes, FileError> {
    let mut content = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.context("Failed to read the upload")?;
        if content.len() + chunk.len() > limit {
            return Err(FileError::PayloadTooLarge);
        }
        content.extend_from_slice(&chunk);
    }

    Ok(content.freeze())
}

#[tracing::instrument(
    name = "Upload a file",
    skip(request, pool, user, query, limit, payload),
    fields(user_id = %user.user_id, file_name = %query.name, size = tracing::field::Empty)
)]
pub async fn upload_file(
    request: HttpRequest,
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    query: web::Query<UploadQuery>,
    limit: web::Data<UploadLimit>,
    payload: web::Payload,
) -> Result<HttpResponse, FileError> {
    let owner_id = *user.user_id;
    let UploadQuery { name, folder_id } = query.into_inner();

    let name = FileName::parse(name).map_err(FileError::Validation)?;
    let content = read_content(payload, limit.0).await?;
    tracing::Span::current().record("size", &content.len());
    if content.is_empty() {
        return Err(FileError::Validation("The file is empty".to_string()));
    }
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let mime_type = resolve_mime_type(content_type, &name);
    let size = i64::try_from(content.len()).context("File size out of range")?;

    let mut transaction = pool.begin().await?;

    if let Some(folder_id) = folder_id {
        if !cloud_folder_exists(&mut transaction, owner_id, folder_id).await? {
            return Err(FileError::Validation("Unknown folder".to_string()));
        }
    }

    reserve_storage(&mut transaction, owner_id, size).await?;

    let now = OffsetDateTime::now_utc();
    let file: FileRecord = sqlx::query_as(&format!(
        r#"
        INSERT INTO files (id, owner_id, folder_id, name, mime_type, size, is_starred, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, $7)
        RETURNING {}
        "#,
        FILE_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(owner_id)
    .bind(folder_id)
    .bind(name.as_ref())
    .bind(&mime_type)
    .bind(size)
    .bind(now)
    .fetch_one(&mut transaction)
    .await
    .context("Failed to store the file metadata")?;

    sqlx::query("INSERT INTO file_contents (file_id, content) VALUES ($1, $2)")
        .bind(file.id)
        .bind(content.as_ref())
        .execute(&mut transaction)
        .await
        .context("Failed to store the file content")?;

    transaction.commit().await?;

    Ok(HttpResponse::Created().json(file))
}

/// Charges `size` bytes to the owner, refusing to go over their limit.
#[tracing::instrument(skip(transaction))]
async fn reserve_storage(
    transaction: &mut PgTransaction,
    owner_id: Uuid,
    size: i64,
) -> Result<(), FileError> {
    let reserved: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE users
        SET storage_used = storage_used + $2
        WHERE user_id = $1 AND storage_used + $2 <= storage_limit
        RETURNING storage_used
        "#,
    )
    .bind(owner_id)
    .bind(size)
    .fetch_optional(transaction)
    .await
    .context("Failed to update the storage usage")?;

    reserved.map(|_| ()).ok_or(FileError::QuotaExceeded)
}

pub(crate) async fn cloud_folder_exists(
    transaction: &mut PgTransaction,
    owner_id: Uuid,
    folder_id: Uuid,
) -> Result<bool, anyhow::Error> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT 1 FROM file_folders WHERE id = $1 AND owner_id = $2")
            .bind(folder_id)
            .bind(owner_id)
            .fetch_optional(transaction)
            .await
            .context("Failed to look up the folder")?;

    Ok(row.is_some())
}

#[derive(serde::Deserialize)]
pub struct FileListQuery {
    folder_id: Option<Uuid>,
    q: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
    #[serde(default)]
    trashed: bool,
}

/// Without a `folder_id` every file of the caller is listed.
#[tracing::instrument(name = "List files", skip(pool, user, query), fields(user_id = %user.user_id))]
pub async fn list_files(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    query: web::Query<FileListQuery>,
) -> Result<HttpResponse, FileError> {
    let query = query.into_inner();
    let pagination = Pagination::parse(query.page, query.limit).map_err(FileError::Validation)?;
    let search = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(contains_pattern);

    let filter = r#"
        WHERE owner_id = $1
        AND (deleted_at IS NOT NULL) = $2
        AND ($3::uuid IS NULL OR folder_id = $3)
        AND ($4::text IS NULL OR name ILIKE $4)
    "#;

    let files: Vec<FileRecord> = sqlx::query_as(&format!(
        "SELECT {} FROM files {} ORDER BY created_at DESC LIMIT $5 OFFSET $6",
        FILE_COLUMNS, filter
    ))
    .bind(*user.user_id)
    .bind(query.trashed)
    .bind(query.folder_id)
    .bind(search.as_deref())
    .bind(pagination.limit)
    .bind(pagination.offset())
    .fetch_all(pool.get_ref())
    .await
    .context("Failed to list files")?;

    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM files {}", filter))
        .bind(*user.user_id)
        .bind(query.trashed)
        .bind(query.folder_id)
        .bind(search.as_deref())
        .fetch_one(pool.get_ref())
        .await
        .context("Failed to count files")?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "files": files,
        "pagination": PageInfo {
            page: pagination.page,
            limit: pagination.limit,
            total,
        },
    })))
}

#[tracing::instrument(name = "Get file", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn get_file(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    file_id: web::Path<Uuid>,
) -> Result<HttpResponse, FileError> {
    let file: FileRecord = sqlx::query_as(&format!(
        "SELECT {} FROM files WHERE id = $1 AND owner_id = $2",
        FILE_COLUMNS
    ))
    .bind(file_id.into_inner())
    .bind(*user.user_id)
    .fetch_optional(pool.get_ref())
    .await
    .context("Failed to fetch the file")?
    .ok_or(FileError::NotFound)?;

    Ok(HttpResponse::Ok().json(file))
}

#[derive(sqlx::FromRow)]
struct FileContent {
    name: String,
    mime_type: String,
    content: Vec<u8>,
}

/// Trashed files cannot be downloaded.
#[tracing::instrument(name = "Download file", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn download_file(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    file_id: web::Path<Uuid>,
) -> Result<HttpResponse, FileError> {
    let file: FileContent = sqlx::query_as(
        r#"
        SELECT f.name, f.mime_type, c.content
        FROM files f
        JOIN file_contents c ON c.file_id = f.id
        WHERE f.id = $1 AND f.owner_id = $2 AND f.deleted_at IS NULL
        "#,
    )
    .bind(file_id.into_inner())
    .bind(*user.user_id)
    .fetch_optional(pool.get_ref())
    .await
    .context("Failed to fetch the file content")?
    .ok_or(FileError::NotFound)?;

    Ok(HttpResponse::Ok()
        .content_type(file.mime_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(file.name)],
        })
        .body(file.content))
}

#[derive(Debug, serde::Deserialize)]
pub struct UpdateFileBody {
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    folder_id: Option<Option<Uuid>>,
    starred: Option<bool>,
}

#[tracing::instrument(
    name = "Update file",
    skip(pool, user, body),
    fields(user_id = %user.user_id)
)]
pub async fn update_file(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    file_id: web::Path<Uuid>,
    body: web::Json<UpdateFileBody>,
) -> Result<HttpResponse, FileError> {
    let owner_id = *user.user_id;
    let UpdateFileBody {
        name,
        folder_id,
        starred,
    } = body.into_inner();

    let name = name
        .map(FileName::parse)
        .transpose()
        .map_err(FileError::Validation)?;

    let mut transaction = pool.begin().await?;

    let file = lock_file(&mut transaction, owner_id, file_id.into_inner())
        .await?
        .ok_or(FileError::NotFound)?;
    if file.deleted_at.is_some() {
        return Err(FileError::Validation(
            "A trashed file cannot be modified".to_string(),
        ));
    }

    if let Some(Some(folder_id)) = folder_id {
        if !cloud_folder_exists(&mut transaction, owner_id, folder_id).await? {
            return Err(FileError::Validation("Unknown folder".to_string()));
        }
    }

    let file: FileRecord = sqlx::query_as(&format!(
        r#"
        UPDATE files
        SET name = $2, folder_id = $3, is_starred = $4, updated_at = now()
        WHERE id = $1
        RETURNING {}
        "#,
        FILE_COLUMNS
    ))
    .bind(file.id)
    .bind(name.as_ref().map_or(file.name.as_str(), |n| n.as_ref()))
    .bind(folder_id.unwrap_or(file.folder_id))
    .bind(starred.unwrap_or(file.is_starred))
    .fetch_one(&mut transaction)
    .await
    .context("Failed to update the file")?;

    transaction.commit().await?;

    Ok(HttpResponse::Ok().json(file))
}

/// The first delete moves a file to the trash; deleting a trashed file
/// purges it and gives its bytes back to the owner's quota.
#[tracing::instrument(name = "Delete file", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn delete_file(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    file_id: web::Path<Uuid>,
) -> Result<HttpResponse, FileError> {
    let owner_id = *user.user_id;
    let mut transaction = pool.begin().await?;

    let file = lock_file(&mut transaction, owner_id, file_id.into_inner())
        .await?
        .ok_or(FileError::NotFound)?;

    if file.deleted_at.is_none() {
        let file: FileRecord = sqlx::query_as(&format!(
            "UPDATE files SET deleted_at = now(), updated_at = now() WHERE id = $1 RETURNING {}",
            FILE_COLUMNS
        ))
        .bind(file.id)
        .fetch_one(&mut transaction)
        .await
        .context("Failed to trash the file")?;
        transaction.commit().await?;

        return Ok(HttpResponse::Ok().json(file));
    }

    sqlx::query("DELETE FROM files WHERE id = $1")
        .bind(file.id)
        .execute(&mut transaction)
        .await
        .context("Failed to purge the file")?;

    sqlx::query(
        "UPDATE users SET storage_used = GREATEST(storage_used - $2, 0) WHERE user_id = $1",
    )
    .bind(owner_id)
    .bind(file.size)
    .execute(&mut transaction)
    .await
    .context("Failed to reclaim the storage of the file")?;

    transaction.commit().await?;

    Ok(HttpResponse::NoContent().finish())
}

#[tracing::instrument(name = "Restore file", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn restore_file(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    file_id: web::Path<Uuid>,
) -> Result<HttpResponse, FileError> {
    let mut transaction = pool.begin().await?;

    let file = lock_file(&mut transaction, *user.user_id, file_id.into_inner())
        .await?
        .ok_or(FileError::NotFound)?;
    if file.deleted_at.is_none() {
        return Err(FileError::Validation("The file is not in the trash".to_string()));
    }

    let file: FileRecord = sqlx::query_as(&format!(
        "UPDATE files SET deleted_at = NULL, updated_at = now() WHERE id = $1 RETURNING {}",
        FILE_COLUMNS
    ))
    .bind(file.id)
    .fetch_one(&mut transaction)
    .await
    .context("Failed to restore the file")?;

    transaction.commit().await?;

    Ok(HttpResponse::Ok().json(file))
}

async fn lock_file(
    transaction: &mut PgTransaction,
    owner_id: Uuid,
    file_id: Uuid,
) -> Result<Option<FileRecord>, anyhow::Error> {
    let file = sqlx::query_as(&format!(
        "SELECT {} FROM files WHERE id = $1 AND owner_id = $2 FOR UPDATE",
        FILE_COLUMNS
    ))
    .bind(file_id)
    .bind(owner_id)
    .fetch_optional(transaction)
    .await
    .context("Failed to fetch the file")?;

    Ok(file)
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct CloudUsage {
    pub used: i64,
    pub limit: i64,
    pub files: i64,
}

#[tracing::instrument(name = "Cloud usage", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn cloud_usage(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
) -> Result<HttpResponse, FileError> {
    let usage: CloudUsage = sqlx::query_as(
        r#"
        SELECT
            u.storage_used AS used,
            u.storage_limit AS "limit",
            (SELECT COUNT(*) FROM files f WHERE f.owner_id = u.user_id AND f.deleted_at IS NULL) AS files
        FROM users u
        WHERE u.user_id = $1
        "#,
    )
    .bind(*user.user_id)
    .fetch_one(pool.get_ref())
    .await
    .context("Failed to compute the storage usage")?;

    Ok(HttpResponse::Ok().json(usage))
}
