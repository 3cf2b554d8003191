use crate::authentication::AuthenticatedUser;
use crate::domain::FileName;
use crate::routes::files::cloud_folder_exists;
use crate::routes::{error_chain_fmt, json_error};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use anyhow::Context;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(thiserror::Error)]
pub enum CloudFolderError {
    #[error("{0}")]
    Validation(String),
    #[error("Folder not found")]
    NotFound,
    #[error("{0}")]
    Conflict(&'static str),
    #[error("Something went wrong")]
    Unexpected(#[from] anyhow::Error),
}

impl fmt::Debug for CloudFolderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for CloudFolderError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), &self.to_string())
    }
}

impl From<sqlx::Error> for CloudFolderError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unexpected(err.into())
    }
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct CloudFolder {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(serde::Deserialize)]
pub struct CreateCloudFolderBody {
    name: String,
    parent_id: Option<Uuid>,
}

#[tracing::instrument(
    name = "Create a cloud folder",
    skip(pool, user, body),
    fields(user_id = %user.user_id, folder = %body.name)
)]
pub async fn create_cloud_folder(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    body: web::Json<CreateCloudFolderBody>,
) -> Result<HttpResponse, CloudFolderError> {
    let owner_id = *user.user_id;
    let CreateCloudFolderBody { name, parent_id } = body.into_inner();
    let name = FileName::parse(name).map_err(CloudFolderError::Validation)?;

    let mut transaction = pool.begin().await?;

    if let Some(parent_id) = parent_id {
        if !cloud_folder_exists(&mut transaction, owner_id, parent_id).await? {
            return Err(CloudFolderError::Validation(
                "Unknown parent folder".to_string(),
            ));
        }
    }

    let folder: Option<CloudFolder> = sqlx::query_as(
        r#"
        INSERT INTO file_folders (id, owner_id, parent_id, name, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING
        RETURNING id, parent_id, name, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(owner_id)
    .bind(parent_id)
    .bind(name.as_ref())
    .bind(OffsetDateTime::now_utc())
    .fetch_optional(&mut transaction)
    .await
    .context("Failed to create the folder")?;

    let folder = folder.ok_or(CloudFolderError::Conflict(
        "A folder with this name already exists here",
    ))?;
    transaction.commit().await?;

    Ok(HttpResponse::Created().json(folder))
}

#[derive(serde::Deserialize)]
pub struct CloudFolderQuery {
    parent_id: Option<Uuid>,
}

/// Lists the children of `parent_id`, or the root folders without one.
#[tracing::instrument(name = "List cloud folders", skip(pool, user, query), fields(user_id = %user.user_id))]
pub async fn list_cloud_folders(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    query: web::Query<CloudFolderQuery>,
) -> Result<HttpResponse, CloudFolderError> {
    let folders: Vec<CloudFolder> = sqlx::query_as(
        r#"
        SELECT id, parent_id, name, created_at
        FROM file_folders
        WHERE owner_id = $1 AND parent_id IS NOT DISTINCT FROM $2
        ORDER BY name
        "#,
    )
    .bind(*user.user_id)
    .bind(query.parent_id)
    .fetch_all(pool.get_ref())
    .await
    .context("Failed to list the folders")?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "folders": folders })))
}

#[derive(sqlx::FromRow)]
struct FolderContents {
    live_files: i64,
    subfolders: i64,
}

/// Only empty folders can be deleted; trashed files left in them move to the root.
#[tracing::instrument(name = "Delete a cloud folder", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn delete_cloud_folder(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    folder_id: web::Path<Uuid>,
) -> Result<HttpResponse, CloudFolderError> {
    let owner_id = *user.user_id;
    let folder_id = folder_id.into_inner();
    let mut transaction = pool.begin().await?;

    let locked: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM file_folders WHERE id = $1 AND owner_id = $2 FOR UPDATE",
    )
    .bind(folder_id)
    .bind(owner_id)
    .fetch_optional(&mut transaction)
    .await
    .context("Failed to fetch the folder")?;
    if locked.is_none() {
        return Err(CloudFolderError::NotFound);
    }

    let contents: FolderContents = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM files WHERE folder_id = $1 AND deleted_at IS NULL) AS live_files,
            (SELECT COUNT(*) FROM file_folders WHERE parent_id = $1) AS subfolders
        "#,
    )
    .bind(folder_id)
    .fetch_one(&mut transaction)
    .await
    .context("Failed to inspect the folder contents")?;

    if contents.live_files > 0 || contents.subfolders > 0 {
        return Err(CloudFolderError::Conflict("The folder is not empty"));
    }

    sqlx::query("UPDATE files SET folder_id = NULL WHERE folder_id = $1")
        .bind(folder_id)
        .execute(&mut transaction)
        .await
        .context("Failed to move trashed files to the root")?;

    sqlx::query("DELETE FROM file_folders WHERE id = $1")
        .bind(folder_id)
        .execute(&mut transaction)
        .await
        .context("Failed to delete the folder")?;

    transaction.commit().await?;

    Ok(HttpResponse::NoContent().finish())
}
