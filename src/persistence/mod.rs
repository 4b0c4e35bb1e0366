use crate::models::CycleRecord;
use crate::{BotError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Append-only trade ledger
///
/// A completed cycle's executed orders and its balance snapshot are written in
/// one call, so an abandoned or failed cycle never leaves partial records.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn record_cycle(&self, record: &CycleRecord) -> Result<()>;
}

/// In-process ledger, used when no database is configured
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    records: Arc<Mutex<Vec<CycleRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All cycles recorded so far, oldest first
    pub fn records(&self) -> Vec<CycleRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => {
                tracing::warn!("Memory ledger lock poisoned, reading recovered records");
                poisoned.into_inner().clone()
            }
        }
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn record_cycle(&self, record: &CycleRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| BotError::Ledger(e.to_string()))?;
        records.push(record.clone());

        tracing::info!(
            closing_order_id = %record.snapshot.closing_order_id,
            orders = record.fills.len(),
            balance_after = record.snapshot.balance_after,
            "Recorded cycle in memory ledger"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FillRecord, TradeCycleResult};
    use chrono::Utc;

    fn fill(order_id: &str, quantity: i64, price: f64) -> FillRecord {
        FillRecord {
            order_id: order_id.to_string(),
            filled_price: price,
            filled_quantity: quantity,
            filled_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_ledger_appends() {
        let ledger = MemoryLedger::new();
        assert!(ledger.records().is_empty());

        let result = TradeCycleResult {
            pre_balance: 1.0,
            post_balance: 1.001,
            closing_order_id: "sell-1".to_string(),
        };
        let record = CycleRecord::new(
            vec![fill("buy-1", 1, 19900.0), fill("sell-1", -1, 20099.0)],
            &result,
        );

        ledger.record_cycle(&record).await.unwrap();

        let records = ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fills.len(), 2);
        assert_eq!(records[0].snapshot.closing_order_id, "sell-1");
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let ledger = MemoryLedger::new();
        let handle = ledger.clone();

        let result = TradeCycleResult {
            pre_balance: 1.0,
            post_balance: 1.0,
            closing_order_id: "s".to_string(),
        };
        handle
            .record_cycle(&CycleRecord::new(vec![fill("s", -1, 1.0)], &result))
            .await
            .unwrap();

        assert_eq!(ledger.records().len(), 1);
    }

    #[tokio::test]
    async fn test_records_survive_poisoned_lock() {
        let ledger = MemoryLedger::new();
        let result = TradeCycleResult {
            pre_balance: 1.0,
            post_balance: 1.0002,
            closing_order_id: "sell-1".to_string(),
        };
        ledger
            .record_cycle(&CycleRecord::new(vec![fill("sell-1", -1, 20099.0)], &result))
            .await
            .unwrap();

        let records = ledger.records.clone();
        let _ = std::thread::spawn(move || {
            let _guard = records.lock().unwrap();
            panic!("writer crashed while holding the ledger");
        })
        .join();
        assert!(ledger.records.is_poisoned());

        let recovered = ledger.records();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].snapshot.closing_order_id, "sell-1");
    }
}
