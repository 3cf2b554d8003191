use crate::authentication::AuthenticatedUser;
use crate::domain::{EmailSubject, Folder, UserEmail};
use crate::idempotency::{save_response, try_processing, IdempotencyKey, NextAction};
use crate::routes::{error_chain_fmt, json_error};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use anyhow::Context;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[derive(thiserror::Error)]
pub enum SendEmailError {
    #[error("{0}")]
    Validation(String),
    #[error("Something went wrong")]
    Unexpected(#[from] anyhow::Error),
}

impl fmt::Debug for SendEmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for SendEmailError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), &self.to_string())
    }
}

impl From<sqlx::Error> for SendEmailError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unexpected(err.into())
    }
}

#[derive(serde::Deserialize)]
pub struct SendEmailBody {
    to: String,
    subject: String,
    body: String,
    html: Option<String>,
}

#[derive(Debug)]
struct OutgoingEmail {
    to: UserEmail,
    subject: EmailSubject,
    body: String,
    html: String,
}

impl TryFrom<SendEmailBody> for OutgoingEmail {
    type Error = String;

    fn try_from(value: SendEmailBody) -> Result<Self, Self::Error> {
        let to = UserEmail::parse(value.to)?;
        let subject = EmailSubject::parse(value.subject)?;
        if value.body.trim().is_empty() {
            return Err("The email body cannot be empty".to_string());
        }
        let html = match value.html {
            Some(html) if !html.trim().is_empty() => html,
            _ => format!("<div>{}</div>", escape_html(&value.body)),
        };

        Ok(Self {
            to,
            subject,
            body: value.body,
            html,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Local,
    Queued,
}

#[derive(serde::Serialize)]
struct SentEmail<'a> {
    id: Uuid,
    message_id: &'a str,
    delivery: Delivery,
}

#[tracing::instrument(
    name = "Send an email",
    skip(pool, user, body, request),
    fields(
        user_id = %user.user_id,
        delivery = tracing::field::Empty
    )
)]
pub async fn send_email(
    request: HttpRequest,
    pool: web::Data<sqlx::PgPool>,
    user: web::ReqData<AuthenticatedUser>,
    body: web::Json<SendEmailBody>,
) -> Result<HttpResponse, SendEmailError> {
    let user_id = *user.user_id;
    let email: OutgoingEmail = body.into_inner().try_into().map_err(SendEmailError::Validation)?;

    let idempotency_key = match request.headers().get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| SendEmailError::Validation("Invalid idempotency key".to_string()))?;
            let key = IdempotencyKey::try_from(value.to_string())
                .map_err(|err| SendEmailError::Validation(err.to_string()))?;
            Some(key)
        }
        None => None,
    };

    let mut transaction = match &idempotency_key {
        Some(key) => match try_processing(&pool, user_id, key).await? {
            NextAction::StartProcessing(transaction) => transaction,
            NextAction::ReturnSavedResponse(response) => return Ok(response),
        },
        None => pool.begin().await?,
    };

    let sender = get_sender(&mut transaction, user_id).await?;
    let message_id = new_message_id(&sender.email);
    let now = OffsetDateTime::now_utc();

    let id = insert_email(
        &mut transaction,
        &NewEmail {
            owner_id: user_id,
            message_id: &message_id,
            from_address: &sender.email,
            to_address: email.to.as_ref(),
            email: &email,
            folder: Folder::Sent,
            is_read: true,
            received_at: now,
        },
    )
    .await?;

    let delivery = match find_local_user(&mut transaction, &email.to).await? {
        Some(recipient_id) => {
            insert_email(
                &mut transaction,
                &NewEmail {
                    owner_id: recipient_id,
                    message_id: &message_id,
                    from_address: &sender.email,
                    to_address: email.to.as_ref(),
                    email: &email,
                    folder: Folder::Inbox,
                    is_read: false,
                    received_at: now,
                },
            )
            .await?;
            Delivery::Local
        }
        None => {
            enqueue_outbound_email(&mut transaction, &sender, &email).await?;
            Delivery::Queued
        }
    };
    tracing::Span::current().record("delivery", &tracing::field::debug(&delivery));

    let response = HttpResponse::Created().json(SentEmail {
        id,
        message_id: &message_id,
        delivery,
    });

    match idempotency_key {
        Some(key) => Ok(save_response(transaction, user_id, &key, response).await?),
        None => {
            transaction.commit().await?;
            Ok(response)
        }
    }
}

type PgTransaction = sqlx::Transaction<'static, sqlx::Postgres>;

#[derive(sqlx::FromRow)]
struct Sender {
    email: String,
    name: String,
}

async fn get_sender(transaction: &mut PgTransaction, user_id: Uuid) -> Result<Sender, anyhow::Error> {
    let sender = sqlx::query_as("SELECT email, name FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(transaction)
        .await
        .context("Failed to fetch the sender")?;

    Ok(sender)
}

#[tracing::instrument(skip(transaction))]
async fn find_local_user(
    transaction: &mut PgTransaction,
    email: &UserEmail,
) -> Result<Option<Uuid>, anyhow::Error> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT user_id FROM users WHERE email = $1")
        .bind(email.as_ref())
        .fetch_optional(transaction)
        .await
        .context("Failed to look up the recipient")?;

    Ok(row.map(|(user_id,)| user_id))
}

struct NewEmail<'a> {
    owner_id: Uuid,
    message_id: &'a str,
    from_address: &'a str,
    to_address: &'a str,
    email: &'a OutgoingEmail,
    folder: Folder,
    is_read: bool,
    received_at: OffsetDateTime,
}

#[tracing::instrument(skip_all, fields(owner_id = %new_email.owner_id, folder = %new_email.folder))]
async fn insert_email(
    transaction: &mut PgTransaction,
    new_email: &NewEmail<'_>,
) -> Result<Uuid, anyhow::Error> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO emails (
            id, owner_id, message_id, from_address, to_address, subject, body, html_body,
            folder, is_read, is_starred, is_important, received_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE, FALSE, $11)
        "#,
    )
    .bind(id)
    .bind(new_email.owner_id)
    .bind(new_email.message_id)
    .bind(new_email.from_address)
    .bind(new_email.to_address)
    .bind(new_email.email.subject.as_ref())
    .bind(&new_email.email.body)
    .bind(&new_email.email.html)
    .bind(new_email.folder.as_str())
    .bind(new_email.is_read)
    .bind(new_email.received_at)
    .execute(transaction)
    .await
    .context("Failed to store the email")?;

    Ok(id)
}

#[tracing::instrument(skip_all)]
async fn enqueue_outbound_email(
    transaction: &mut PgTransaction,
    sender: &Sender,
    email: &OutgoingEmail,
) -> Result<(), anyhow::Error> {
    sqlx::query(
        r#"
        INSERT INTO outbound_queue (
            id, from_name, reply_to, recipient, subject, text_content, html_content,
            n_retries, execute_after, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 0, now(), now())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&sender.name)
    .bind(&sender.email)
    .bind(email.to.as_ref())
    .bind(email.subject.as_ref())
    .bind(&email.body)
    .bind(&email.html)
    .execute(transaction)
    .await
    .context("Failed to enqueue the outbound email")?;

    Ok(())
}

fn new_message_id(sender: &str) -> String {
    let domain = sender.rsplit_once('@').map_or("tauos.org", |(_, domain)| domain);
    format!("<{}@{}>", Uuid::new_v4(), domain)
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '\n' => escaped.push_str("<br>"),
            c => escaped.push(c),
        }
    }
    escaped
}
