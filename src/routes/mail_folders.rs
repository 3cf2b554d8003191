use crate::authentication::AuthenticatedUser;
use crate::domain::Folder;
use crate::routes::{error_chain_fmt, json_error};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use anyhow::Context;
use std::collections::HashMap;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(thiserror::Error)]
pub enum MailFolderError {
    #[error("{0}")]
    Validation(String),
    #[error("A folder with this name already exists")]
    AlreadyExists,
    #[error("Folder not found")]
    NotFound,
    #[error("Something went wrong")]
    Unexpected(#[from] anyhow::Error),
}

impl fmt::Debug for MailFolderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for MailFolderError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), &self.to_string())
    }
}

impl From<sqlx::Error> for MailFolderError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unexpected(err.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderKind {
    System,
    Custom,
}

#[derive(Debug, serde::Serialize)]
pub struct MailFolder {
    pub name: String,
    pub kind: FolderKind,
    pub total: i64,
    pub unread: i64,
}

#[derive(sqlx::FromRow)]
struct FolderCounts {
    folder: String,
    total: i64,
    unread: i64,
}

#[tracing::instrument(name = "List mail folders", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn list_mail_folders(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
) -> Result<HttpResponse, MailFolderError> {
    let counts: Vec<FolderCounts> = sqlx::query_as(
        r#"
        SELECT folder, COUNT(*) AS total, COUNT(*) FILTER (WHERE NOT is_read) AS unread
        FROM emails
        WHERE owner_id = $1
        GROUP BY folder
        "#,
    )
    .bind(*user.user_id)
    .fetch_all(pool.get_ref())
    .await
    .context("Failed to count emails per folder")?;

    let custom: Vec<(String,)> =
        sqlx::query_as("SELECT name FROM mail_folders WHERE owner_id = $1 ORDER BY name")
            .bind(*user.user_id)
            .fetch_all(pool.get_ref())
            .await
            .context("Failed to list the custom mail folders")?;

    let folders = build_folder_list(
        counts,
        custom.into_iter().map(|(name,)| name).collect::<Vec<_>>(),
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({ "folders": folders })))
}

fn build_folder_list(counts: Vec<FolderCounts>, custom: Vec<String>) -> Vec<MailFolder> {
    let counts: HashMap<String, (i64, i64)> = counts
        .into_iter()
        .map(|c| (c.folder, (c.total, c.unread)))
        .collect();

    let system = Folder::SYSTEM
        .iter()
        .map(|f| (f.as_str().to_string(), FolderKind::System));
    let custom = custom.into_iter().map(|name| (name, FolderKind::Custom));

    system
        .chain(custom)
        .map(|(name, kind)| {
            let (total, unread) = counts.get(&name).copied().unwrap_or_default();
            MailFolder {
                name,
                kind,
                total,
                unread,
            }
        })
        .collect()
}

#[derive(serde::Deserialize)]
pub struct CreateMailFolderBody {
    name: String,
}

#[tracing::instrument(
    name = "Create a mail folder",
    skip(pool, user, body),
    fields(user_id = %user.user_id, folder = %body.name)
)]
pub async fn create_mail_folder(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    body: web::Json<CreateMailFolderBody>,
) -> Result<HttpResponse, MailFolderError> {
    let folder = Folder::parse(&body.name).map_err(MailFolderError::Validation)?;
    if folder.is_system() {
        return Err(MailFolderError::Validation(format!(
            "{} is a reserved folder name",
            folder
        )));
    }

    let created_at = OffsetDateTime::now_utc();
    let result = sqlx::query(
        r#"
        INSERT INTO mail_folders (owner_id, name, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(*user.user_id)
    .bind(folder.as_str())
    .bind(created_at)
    .execute(pool.get_ref())
    .await
    .context("Failed to create the mail folder")?;

    if result.rows_affected() == 0 {
        return Err(MailFolderError::AlreadyExists);
    }

    Ok(HttpResponse::Created().json(MailFolder {
        name: folder.to_string(),
        kind: FolderKind::Custom,
        total: 0,
        unread: 0,
    }))
}

/// Emails in a deleted folder land in the inbox.
#[tracing::instrument(name = "Delete a mail folder", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn delete_mail_folder(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    name: web::Path<String>,
) -> Result<HttpResponse, MailFolderError> {
    let folder = Folder::parse(&name).map_err(|_| MailFolderError::NotFound)?;
    if folder.is_system() {
        return Err(MailFolderError::Validation(
            "System folders cannot be deleted".to_string(),
        ));
    }

    let owner_id: Uuid = *user.user_id;
    let mut transaction = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM mail_folders WHERE owner_id = $1 AND name = $2")
        .bind(owner_id)
        .bind(folder.as_str())
        .execute(&mut transaction)
        .await
        .context("Failed to delete the mail folder")?;
    if deleted.rows_affected() == 0 {
        return Err(MailFolderError::NotFound);
    }

    sqlx::query("UPDATE emails SET folder = 'inbox' WHERE owner_id = $1 AND folder = $2")
        .bind(owner_id)
        .bind(folder.as_str())
        .execute(&mut transaction)
        .await
        .context("Failed to move emails out of the deleted folder")?;

    sqlx::query(
        r#"
        UPDATE emails SET deleted_from = 'inbox'
        WHERE owner_id = $1 AND folder = 'trash' AND deleted_from = $2
        "#,
    )
    .bind(owner_id)
    .bind(folder.as_str())
    .execute(&mut transaction)
    .await
    .context("Failed to update trashed emails of the deleted folder")?;

    transaction.commit().await?;

    Ok(HttpResponse::NoContent().finish())
}
