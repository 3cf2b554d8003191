use crate::authentication::AuthenticatedUser;
use crate::domain::{Folder, Pagination};
use crate::routes::{contains_pattern, error_chain_fmt, json_error};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use anyhow::Context;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(thiserror::Error)]
pub enum EmailError {
    #[error("{0}")]
    Validation(String),
    #[error("Email not found")]
    NotFound,
    #[error("Something went wrong")]
    Unexpected(#[from] anyhow::Error),
}

impl fmt::Debug for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for EmailError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), &self.to_string())
    }
}

impl From<sqlx::Error> for EmailError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unexpected(err.into())
    }
}

const EMAIL_COLUMNS: &str = "id, message_id, from_address, to_address, subject, body, html_body, \
     folder, deleted_from, is_read, is_starred, is_important, received_at";

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct EmailRecord {
    pub id: Uuid,
    pub message_id: String,
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub body: String,
    pub html_body: Option<String>,
    pub folder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_from: Option<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_important: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

#[derive(serde::Serialize)]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

#[derive(serde::Deserialize)]
pub struct EmailListQuery {
    folder: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
    search: Option<String>,
}

#[tracing::instrument(
    name = "List emails",
    skip(pool, user, query),
    fields(user_id = %user.user_id, folder = tracing::field::Empty)
)]
pub async fn list_emails(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    query: web::Query<EmailListQuery>,
) -> Result<HttpResponse, EmailError> {
    let query = query.into_inner();

    let folder = match query.folder {
        Some(folder) => Folder::parse(&folder).map_err(EmailError::Validation)?,
        None => Folder::default(),
    };
    tracing::Span::current().record("folder", &tracing::field::display(&folder));

    let pagination = Pagination::parse(query.page, query.limit).map_err(EmailError::Validation)?;
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(contains_pattern);

    let filter = r#"
        WHERE owner_id = $1
        AND folder = $2
        AND ($3::text IS NULL OR subject ILIKE $3 OR body ILIKE $3 OR from_address ILIKE $3)
    "#;

    let emails: Vec<EmailRecord> = sqlx::query_as(&format!(
        "SELECT {} FROM emails {} ORDER BY received_at DESC LIMIT $4 OFFSET $5",
        EMAIL_COLUMNS, filter
    ))
    .bind(*user.user_id)
    .bind(folder.as_str())
    .bind(search.as_deref())
    .bind(pagination.limit)
    .bind(pagination.offset())
    .fetch_all(pool.get_ref())
    .await
    .context("Failed to list emails")?;

    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM emails {}", filter))
        .bind(*user.user_id)
        .bind(folder.as_str())
        .bind(search.as_deref())
        .fetch_one(pool.get_ref())
        .await
        .context("Failed to count emails")?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "emails": emails,
        "pagination": PageInfo {
            page: pagination.page,
            limit: pagination.limit,
            total,
        },
    })))
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct EmailStats {
    pub unread: i64,
    pub sent: i64,
    pub starred: i64,
    pub trash: i64,
}

#[tracing::instrument(name = "Email stats", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn email_stats(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
) -> Result<HttpResponse, EmailError> {
    let stats: EmailStats = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE folder = 'inbox' AND NOT is_read) AS unread,
            COUNT(*) FILTER (WHERE folder = 'sent') AS sent,
            COUNT(*) FILTER (WHERE is_starred AND folder <> 'trash') AS starred,
            COUNT(*) FILTER (WHERE folder = 'trash') AS trash
        FROM emails
        WHERE owner_id = $1
        "#,
    )
    .bind(*user.user_id)
    .fetch_one(pool.get_ref())
    .await
    .context("Failed to compute email stats")?;

    Ok(HttpResponse::Ok().json(stats))
}

/// Opening an email marks it as read.
#[tracing::instrument(name = "Get email", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn get_email(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    email_id: web::Path<Uuid>,
) -> Result<HttpResponse, EmailError> {
    let email: EmailRecord = sqlx::query_as(&format!(
        "UPDATE emails SET is_read = TRUE WHERE id = $1 AND owner_id = $2 RETURNING {}",
        EMAIL_COLUMNS
    ))
    .bind(email_id.into_inner())
    .bind(*user.user_id)
    .fetch_optional(pool.get_ref())
    .await
    .context("Failed to fetch the email")?
    .ok_or(EmailError::NotFound)?;

    Ok(HttpResponse::Ok().json(email))
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EmailAction {
    Read { value: bool },
    Star { value: bool },
    Important { value: bool },
    Archive,
    Move { folder: String },
    Restore,
}

/// The mutable part of an email.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EmailState {
    pub folder: String,
    pub deleted_from: Option<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_important: bool,
}

impl EmailState {
    pub fn apply(mut self, action: &EmailAction) -> Result<EmailState, String> {
        match action {
            EmailAction::Read { value } => self.is_read = *value,
            EmailAction::Star { value } => self.is_starred = *value,
            EmailAction::Important { value } => self.is_important = *value,
            EmailAction::Archive => self.move_to(&Folder::Archive),
            EmailAction::Move { folder } => self.move_to(&Folder::parse(folder)?),
            EmailAction::Restore => {
                if self.folder != Folder::Trash.as_str() {
                    return Err("The email is not in the trash".to_string());
                }
                self.folder = self
                    .deleted_from
                    .take()
                    .unwrap_or_else(|| Folder::Inbox.to_string());
            }
        }
        Ok(self)
    }

    /// Trashing remembers where the email came from so it can be restored.
    pub fn move_to(&mut self, folder: &Folder) {
        if *folder == Folder::Trash {
            if self.folder != Folder::Trash.as_str() {
                self.deleted_from = Some(std::mem::take(&mut self.folder));
            }
        } else {
            self.deleted_from = None;
        }
        self.folder = folder.to_string();
    }
}

#[tracing::instrument(
    name = "Update email",
    skip(pool, user, action),
    fields(user_id = %user.user_id, action = ?action.0)
)]
pub async fn update_email(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    email_id: web::Path<Uuid>,
    action: web::Json<EmailAction>,
) -> Result<HttpResponse, EmailError> {
    let email_id = email_id.into_inner();
    let mut transaction = pool.begin().await?;

    let state = lock_email_state(&mut transaction, *user.user_id, email_id)
        .await?
        .ok_or(EmailError::NotFound)?;

    let mut new_state = state.apply(&action).map_err(EmailError::Validation)?;

    let folder = Folder::parse(&new_state.folder).map_err(EmailError::Validation)?;
    if !folder.is_system()
        && !custom_folder_exists(&mut transaction, *user.user_id, folder.as_str()).await?
    {
        match action.0 {
            // The folder was deleted while the email sat in the trash.
            EmailAction::Restore => new_state.folder = Folder::Inbox.to_string(),
            _ => {
                return Err(EmailError::Validation(format!(
                    "The folder {} does not exist",
                    folder
                )))
            }
        }
    }

    let email = save_email_state(&mut transaction, email_id, &new_state).await?;
    transaction.commit().await?;

    Ok(HttpResponse::Ok().json(email))
}

/// Deleting moves an email to the trash; deleting it from the trash is final.
#[tracing::instrument(name = "Delete email", skip(pool, user), fields(user_id = %user.user_id))]
pub async fn delete_email(
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    email_id: web::Path<Uuid>,
) -> Result<HttpResponse, EmailError> {
    let email_id = email_id.into_inner();
    let mut transaction = pool.begin().await?;

    let mut state = lock_email_state(&mut transaction, *user.user_id, email_id)
        .await?
        .ok_or(EmailError::NotFound)?;

    if state.folder == Folder::Trash.as_str() {
        sqlx::query("DELETE FROM emails WHERE id = $1")
            .bind(email_id)
            .execute(&mut transaction)
            .await
            .context("Failed to delete the email")?;
        transaction.commit().await?;

        return Ok(HttpResponse::NoContent().finish());
    }

    state.move_to(&Folder::Trash);
    let email = save_email_state(&mut transaction, email_id, &state).await?;
    transaction.commit().await?;

    Ok(HttpResponse::Ok().json(email))
}

type PgTransaction = sqlx::Transaction<'static, sqlx::Postgres>;

async fn lock_email_state(
    transaction: &mut PgTransaction,
    owner_id: Uuid,
    email_id: Uuid,
) -> Result<Option<EmailState>, anyhow::Error> {
    let state = sqlx::query_as(
        r#"
        SELECT folder, deleted_from, is_read, is_starred, is_important
        FROM emails
        WHERE id = $1 AND owner_id = $2
        FOR UPDATE
        "#,
    )
    .bind(email_id)
    .bind(owner_id)
    .fetch_optional(transaction)
    .await
    .context("Failed to fetch the email state")?;

    Ok(state)
}

async fn save_email_state(
    transaction: &mut PgTransaction,
    email_id: Uuid,
    state: &EmailState,
) -> Result<EmailRecord, anyhow::Error> {
    let email = sqlx::query_as(&format!(
        r#"
        UPDATE emails
        SET folder = $2, deleted_from = $3, is_read = $4, is_starred = $5, is_important = $6
        WHERE id = $1
        RETURNING {}
        "#,
        EMAIL_COLUMNS
    ))
    .bind(email_id)
    .bind(&state.folder)
    .bind(&state.deleted_from)
    .bind(state.is_read)
    .bind(state.is_starred)
    .bind(state.is_important)
    .fetch_one(transaction)
    .await
    .context("Failed to update the email")?;

    Ok(email)
}

pub(crate) async fn custom_folder_exists(
    transaction: &mut PgTransaction,
    owner_id: Uuid,
    name: &str,
) -> Result<bool, anyhow::Error> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT 1 FROM mail_folders WHERE owner_id = $1 AND name = $2")
            .bind(owner_id)
            .bind(name)
            .fetch_optional(transaction)
            .await
            .context("Failed to look up the mail folder")?;

    Ok(row.is_some())
}
