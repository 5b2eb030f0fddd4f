use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    PgPool, Row,
    postgres::{PgPoolOptions, PgRow},
};

use common::{OrderId, PaymentId};

use crate::{
    AuditEvent, LedgerError, PaymentRecord, PaymentStatus, Result, store::PaymentLedger,
};

/// PostgreSQL-backed ledger implementation.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a ledger over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database and creates a small pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_payment(row: PgRow) -> Result<PaymentRecord> {
        let status_text: String = row.try_get("status")?;
        let status = PaymentStatus::parse(&status_text)
            .ok_or(LedgerError::UnknownStatus(status_text))?;

        Ok(PaymentRecord {
            payment_id: PaymentId::new(row.try_get::<String, _>("payment_id")?),
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            status,
            amount: row.try_get("amount")?,
        })
    }

    fn row_to_event(row: PgRow) -> Result<AuditEvent> {
        Ok(AuditEvent {
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            event_type: row.try_get("type")?,
            payload: row.try_get("payload")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

#[async_trait]
impl PaymentLedger for PostgresLedger {
    #[tracing::instrument(skip(self))]
    async fn try_create_payment(
        &self,
        payment_id: &PaymentId,
        order_id: &OrderId,
    ) -> Result<bool> {
        // The conditional insert is the whole idempotency story: the row
        // that comes back tells this caller whether it won the claim.
        let row = sqlx::query(
            r#"
            INSERT INTO payments (payment_id, order_id, status)
            VALUES ($1, $2, 'created')
            ON CONFLICT (payment_id) DO NOTHING
            RETURNING payment_id
            "#,
        )
        .bind(payment_id.as_str())
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let created = row.is_some();
        if created {
            metrics::counter!("ledger_payments_created_total").increment(1);
        }
        Ok(created)
    }

    async fn get_payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(
            "SELECT payment_id, order_id, status, amount FROM payments WHERE payment_id = $1",
        )
        .bind(payment_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn mark_charged(&self, payment_id: &PaymentId, amount: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE payments SET status = 'charged', amount = $2 WHERE payment_id = $1",
        )
        .bind(payment_id.as_str())
        .bind(amount)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::PaymentNotFound(payment_id.clone()));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, payload))]
    async fn append_event(
        &self,
        order_id: &OrderId,
        event_type: &str,
        payload: Value,
    ) -> Result<()> {
        sqlx::query("INSERT INTO events (order_id, type, payload) VALUES ($1, $2, $3)")
            .bind(order_id.as_str())
            .bind(event_type)
            .bind(payload)
            .execute(&self.pool)
            .await?;

        metrics::counter!("ledger_events_appended_total").increment(1);
        Ok(())
    }

    async fn events_for_order(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query(
            "SELECT order_id, type, payload, recorded_at FROM events WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }
}
