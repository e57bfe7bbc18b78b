//! Email outbox worker and delivery abstraction.
//!
//! Registration, resend, and password-reset flows enqueue rows in
//! `email_outbox` inside their own transactions, so an account and its
//! pending email commit or roll back together. A background task polls the
//! table, locks a batch with `FOR UPDATE SKIP LOCKED`, and hands each row to
//! an [`EmailSender`]. Failures are retried with exponential backoff and
//! jitter until a max attempt count, then parked as `failed`.
//!
//! The default sender is [`LogEmailSender`], which logs the payload instead
//! of delivering real mail. Swapping in an SMTP or API sender is a matter of
//! implementing the trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

/// A row pulled from the outbox, ready for delivery.
#[derive(Clone, Debug)]
pub struct OutboxEmail {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Delivery abstraction used by the outbox worker.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver one message, or return an error to schedule a retry.
    async fn send(&self, email: &OutboxEmail) -> Result<()>;
}

/// Local-dev sender: logs the message and reports success.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, email: &OutboxEmail) -> Result<()> {
        info!(
            to_email = %email.to_email,
            template = %email.template,
            payload = %email.payload_json,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// Defaults: 5s poll, 10 rows per batch, 5 attempts, 5s to 5m backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    /// Clamp zero/inverted settings to workable values.
    #[must_use]
    fn normalized(self) -> Self {
        let poll_interval = self.poll_interval.max(Duration::from_secs(1));
        let backoff_base = self.backoff_base.max(Duration::from_secs(1));
        Self {
            poll_interval,
            batch_size: self.batch_size.max(1),
            max_attempts: self.max_attempts.max(1),
            backoff_base,
            backoff_max: self.backoff_max.max(backoff_base),
        }
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the background task that drains the outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    let config = config.normalized();
    tokio::spawn(async move {
        loop {
            if let Err(err) = drain_batch(&pool, sender.as_ref(), &config).await {
                error!("email outbox batch failed: {err:#}");
            }
            sleep(config.poll_interval).await;
        }
    })
}

async fn drain_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool.begin().await.context("begin outbox transaction")?;

    // Locked batch so concurrent workers never double-send a row.
    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at, created_at
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size).unwrap_or(1))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    let count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let email = OutboxEmail {
            to_email: row.get("to_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };

        let outcome = sender.send(&email).await;
        let attempt = u32::try_from(attempts).unwrap_or(0).saturating_add(1);
        settle_row(&mut tx, id, attempt, outcome, config).await?;
    }

    tx.commit().await.context("commit outbox transaction")?;

    Ok(count)
}

async fn settle_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempt: u32,
    outcome: Result<()>,
    config: &EmailWorkerConfig,
) -> Result<()> {
    let attempt_i32 = i32::try_from(attempt).unwrap_or(i32::MAX);

    let (query, last_error, delay_ms) = match &outcome {
        Ok(()) => (
            r"
            UPDATE email_outbox
            SET status = 'sent',
                attempts = $2,
                last_error = NULL,
                sent_at = NOW(),
                next_attempt_at = NOW()
            WHERE id = $1
            ",
            None,
            None,
        ),
        Err(err) if attempt >= config.max_attempts => (
            r"
            UPDATE email_outbox
            SET status = 'failed',
                attempts = $2,
                last_error = $3,
                next_attempt_at = NOW()
            WHERE id = $1
            ",
            Some(err.to_string()),
            None,
        ),
        Err(err) => {
            let delay = backoff_delay(attempt, config.backoff_base, config.backoff_max);
            (
                r"
                UPDATE email_outbox
                SET status = 'pending',
                    attempts = $2,
                    last_error = $3,
                    next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                WHERE id = $1
                ",
                Some(err.to_string()),
                Some(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX)),
            )
        }
    };

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let mut statement = sqlx::query(query).bind(id).bind(attempt_i32);
    if let Some(message) = last_error {
        statement = statement.bind(message);
    }
    if let Some(delay_ms) = delay_ms {
        statement = statement.bind(delay_ms);
    }
    statement
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to settle email outbox row")?;

    Ok(())
}

/// Exponential backoff capped at `max`, with jitter in [delay/2, delay].
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let delay = base.checked_mul(1 << shift).unwrap_or(max).min(max);

    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_clamps_zeroes() {
        let config = EmailWorkerConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0)
            .with_backoff_base_seconds(0)
            .with_backoff_max_seconds(0)
            .normalized();

        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert!(config.backoff_max >= config.backoff_base);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);

        for attempt in 1..=10 {
            let delay = backoff_delay(attempt, base, max);
            assert!(delay <= max);
        }

        // Attempt 10 would be 5s * 512 uncapped; jitter keeps it above max/2.
        let delay = backoff_delay(10, base, max);
        assert!(delay >= max / 2);
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let sender = LogEmailSender;
        let email = OutboxEmail {
            to_email: "alice@example.com".to_string(),
            template: "verify_email".to_string(),
            payload_json: "{}".to_string(),
        };
        assert!(sender.send(&email).await.is_ok());
    }
}
