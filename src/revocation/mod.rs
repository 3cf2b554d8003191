use anyhow::Context;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CleanupConfig {
    enabled: bool,
    interval: std::time::Duration,
}

impl CleanupConfig {
    pub fn new(enabled: bool, interval: std::time::Duration) -> Self {
        Self { enabled, interval }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self::new(false, std::time::Duration::from_secs(30))
    }
}

/// Launch a background task purging expired revocations if necessary.
pub fn spawn_cleanup(pool: sqlx::PgPool, cleanup_config: CleanupConfig) {
    if cleanup_config.enabled {
        tokio::spawn(async move {
            clean_revoked_tokens(pool, cleanup_config.interval).await;
        });
    }
}

async fn clean_revoked_tokens(pool: sqlx::PgPool, clean_interval: std::time::Duration) {
    let mut interval = tokio::time::interval(clean_interval);
    loop {
        let _ = interval.tick().await;

        match purge_expired(&pool, OffsetDateTime::now_utc()).await {
            Ok(cleaned) => {
                tracing::debug!(%cleaned, "revoked tokens cleanup done");
            }
            Err(err) => match err {
                sqlx::Error::PoolClosed => {
                    tracing::debug!("pool is closed");
                    return;
                }
                _ => tracing::error!(?err, "unable to cleanup revoked tokens"),
            },
        }
    }
}

/// Revoked tokens past their own expiry are rejected by signature checks
/// anyway, so their rows can go.
pub async fn purge_expired(pool: &sqlx::PgPool, now: OffsetDateTime) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[tracing::instrument(name = "Revoke token", skip(pool))]
pub async fn revoke(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    token_id: Uuid,
    expires_at: OffsetDateTime,
) -> Result<(), anyhow::Error> {
    sqlx::query(
        r#"
        INSERT INTO revoked_tokens(token_id, user_id, expires_at)
        VALUES($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(token_id)
    .bind(user_id)
    .bind(expires_at)
    .execute(pool)
    .await
    .context("Failed to store the revoked token")?;

    Ok(())
}

#[tracing::instrument(name = "Check token revocation", skip(pool))]
pub async fn is_revoked(pool: &sqlx::PgPool, token_id: Uuid) -> Result<bool, anyhow::Error> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM revoked_tokens WHERE token_id = $1")
        .bind(token_id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up the revoked tokens")?;

    Ok(row.is_some())
}
