pub mod postgres;

pub use postgres::PostgresLedger;

use crate::persistence::{Ledger, MemoryLedger};
use crate::settings::DatabaseSettings;
use crate::Result;
use std::sync::Arc;

/// Pick the ledger backend for a run
///
/// Without a configured database trade history lives in memory only. A
/// configured database that cannot be reached is a startup error.
pub async fn open_ledger(
    database: Option<&DatabaseSettings>,
    symbol: &str,
) -> Result<Arc<dyn Ledger>> {
    let Some(database) = database else {
        tracing::warn!("No database configured, trade history is kept in memory only");
        return Ok(Arc::new(MemoryLedger::new()));
    };

    let ledger = PostgresLedger::new(&database.url, symbol).await?;
    tracing::info!("Postgres ledger enabled");
    Ok(Arc::new(ledger))
}
