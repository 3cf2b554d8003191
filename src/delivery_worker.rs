use crate::configuration::Settings;
use crate::domain::UserEmail;
use crate::relay::{self, OutboundEmail};
use crate::startup::get_connection_pool;
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

/// Deliveries failing this many times are dropped.
pub const MAX_DELIVERY_ATTEMPTS: i32 = 5;

#[derive(Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
    TaskCompleted,
    EmptyQueue,
}

#[derive(sqlx::FromRow)]
struct QueuedEmail {
    id: Uuid,
    from_name: String,
    reply_to: String,
    recipient: String,
    subject: String,
    text_content: String,
    html_content: String,
    n_retries: i32,
}

#[tracing::instrument(
    skip_all,
    fields(
        outbound_email_id = tracing::field::Empty,
        recipient = tracing::field::Empty,
    )
)]
pub async fn try_execute_task(
    pool: &sqlx::PgPool,
    email_client: &relay::Client,
) -> Result<ExecutionOutcome, anyhow::Error> {
    let (transaction, queued) = match dequeue_task(pool).await? {
        Some(task) => task,
        None => return Ok(ExecutionOutcome::EmptyQueue),
    };

    tracing::Span::current()
        .record("outbound_email_id", &tracing::field::display(&queued.id))
        .record("recipient", &tracing::field::display(&queued.recipient));

    let recipient = match UserEmail::parse(queued.recipient.clone()) {
        Ok(recipient) => recipient,
        Err(err) => {
            error!(
                error.message = %err,
                "Dropping an outbound email, its recipient is invalid",
            );
            delete_task(transaction, queued.id).await?;
            return Ok(ExecutionOutcome::TaskCompleted);
        }
    };

    let send_result = email_client
        .send_email(&OutboundEmail {
            recipient: &recipient,
            from_name: &queued.from_name,
            reply_to: &queued.reply_to,
            subject: &queued.subject,
            html_content: &queued.html_content,
            text_content: &queued.text_content,
        })
        .await;

    match send_result {
        Ok(()) => delete_task(transaction, queued.id).await?,
        Err(err) if queued.n_retries + 1 >= MAX_DELIVERY_ATTEMPTS => {
            error!(
                error.cause_chain = ?err,
                error.message = %err,
                "Failed to deliver an outbound email, giving up",
            );
            delete_task(transaction, queued.id).await?;
        }
        Err(err) => {
            error!(
                error.cause_chain = ?err,
                error.message = %err,
                "Failed to deliver an outbound email, retrying later",
            );
            postpone_task(transaction, queued.id, queued.n_retries + 1).await?;
        }
    }

    Ok(ExecutionOutcome::TaskCompleted)
}

type PgTransaction = sqlx::Transaction<'static, sqlx::Postgres>;

#[tracing::instrument(skip_all)]
async fn dequeue_task(
    pool: &sqlx::PgPool,
) -> Result<Option<(PgTransaction, QueuedEmail)>, anyhow::Error> {
    let mut transaction = pool.begin().await?;

    let record: Option<QueuedEmail> = sqlx::query_as(
        r#"
        SELECT id, from_name, reply_to, recipient, subject, text_content, html_content, n_retries
        FROM outbound_queue
        WHERE execute_after <= now()
        ORDER BY execute_after
        FOR UPDATE
        SKIP LOCKED
        LIMIT 1
        "#,
    )
    .fetch_optional(&mut transaction)
    .await?;

    Ok(record.map(|record| (transaction, record)))
}

#[tracing::instrument(skip_all)]
async fn delete_task(mut transaction: PgTransaction, id: Uuid) -> Result<(), anyhow::Error> {
    sqlx::query("DELETE FROM outbound_queue WHERE id = $1")
        .bind(id)
        .execute(&mut transaction)
        .await?;

    transaction.commit().await?;

    Ok(())
}

#[tracing::instrument(skip_all)]
async fn postpone_task(
    mut transaction: PgTransaction,
    id: Uuid,
    n_retries: i32,
) -> Result<(), anyhow::Error> {
    sqlx::query(
        r#"
        UPDATE outbound_queue
        SET n_retries = $2, execute_after = now() + make_interval(secs => $3)
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(n_retries)
    .bind(retry_backoff(n_retries).as_secs_f64())
    .execute(&mut transaction)
    .await?;

    transaction.commit().await?;

    Ok(())
}

/// Exponential backoff: 2s, 4s, 8s, ...
pub fn retry_backoff(n_retries: i32) -> Duration {
    let exponent = n_retries.clamp(1, 16) as u32;
    Duration::from_secs(2u64.pow(exponent))
}

async fn worker_loop(pool: sqlx::PgPool, email_client: relay::Client) -> Result<(), anyhow::Error> {
    loop {
        match try_execute_task(&pool, &email_client).await {
            Ok(ExecutionOutcome::TaskCompleted) => {}
            Ok(ExecutionOutcome::EmptyQueue) => {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(err) => {
                error!(error.cause_chain = ?err, "outbound delivery failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

pub async fn run_worker_until_stopped(configuration: Settings) -> Result<(), anyhow::Error> {
    let pool = get_connection_pool(&configuration.database);
    let email_client = configuration.relay.client()?;

    worker_loop(pool, email_client).await
}
