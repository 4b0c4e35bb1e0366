// Operator notifications
pub mod telegram;

use crate::Result;
use async_trait::async_trait;

pub use telegram::TelegramNotifier;

/// Best-effort sink for human-readable trade and error messages
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat_target: &str, text: &str) -> Result<()>;
}

/// Notifier that only writes to the log, used when no chat is configured
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, chat_target: &str, text: &str) -> Result<()> {
        tracing::info!(chat = %chat_target, "📣 {}", text);
        Ok(())
    }
}
