use crate::models::CycleRecord;
use crate::persistence::Ledger;
use crate::{BotError, Result};
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Postgres-backed trade ledger (`orders` and `balance` tables)
pub struct PostgresLedger {
    pool: PgPool,
    symbol: String,
}

fn to_decimal(value: f64, column: &str) -> Result<Decimal> {
    Decimal::from_f64(value)
        .ok_or_else(|| BotError::Ledger(format!("{} is not representable: {}", column, value)))
}

impl PostgresLedger {
    /// Connect to Postgres and apply pending migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    /// * `symbol` - Instrument the recorded orders belong to
    pub async fn new(database_url: &str, symbol: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres ledger");

        Ok(Self {
            pool,
            symbol: symbol.to_string(),
        })
    }

    /// Number of balance snapshots recorded so far
    pub async fn cycle_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM balance")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl Ledger for PostgresLedger {
    async fn record_cycle(&self, record: &CycleRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for fill in &record.fills {
            sqlx::query(
                r#"
                INSERT INTO orders (order_id, symbol, quantity, price, timestamp)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (order_id) DO NOTHING
                "#,
            )
            .bind(&fill.order_id)
            .bind(&self.symbol)
            .bind(fill.filled_quantity)
            .bind(to_decimal(fill.filled_price, "price")?)
            .bind(fill.filled_at)
            .execute(&mut *tx)
            .await?;
        }

        let snapshot = &record.snapshot;
        sqlx::query(
            r#"
            INSERT INTO balance (id, balance_before, balance_after, timestamp, sell_order_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(snapshot.id)
        .bind(to_decimal(snapshot.balance_before, "balance_before")?)
        .bind(to_decimal(snapshot.balance_after, "balance_after")?)
        .bind(snapshot.timestamp)
        .bind(&snapshot.closing_order_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "💾 Recorded cycle closed by {} ({} orders)",
            snapshot.closing_order_id,
            record.fills.len()
        );

        Ok(())
    }
}
