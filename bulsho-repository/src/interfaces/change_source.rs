use async_trait::async_trait;
use bulsho_shared::types::ChangeEvent;
use tokio::sync::{broadcast, mpsc};

use crate::errors::RelationStoreError;

/// A realtime feed of row changes.
///
/// Implementations push validated [`ChangeEvent`]s into `sender` until the
/// feed ends, the receiver is dropped, or `shutdown` fires.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn run(
        &self,
        sender: mpsc::Sender<ChangeEvent>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), RelationStoreError>;
}
