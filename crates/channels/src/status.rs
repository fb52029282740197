use async_trait::async_trait;

use crate::Result;

/// The uniform surface every channel exposes to the session manager.
///
/// `connected` is advisory: implementations report their best current
/// knowledge and the manager degrades any error to `false`. `disconnect`
/// is idempotent — tearing down an absent session is success.
#[async_trait]
pub trait ChannelStatus: Send + Sync {
    async fn connected(&self, user_id: &str) -> Result<bool>;
    async fn disconnect(&self, user_id: &str) -> Result<()>;
}
