use async_trait::async_trait;
use bulsho_shared::types::ChangeEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::errors::RelationStoreError;
use crate::interfaces::ChangeSource;

/// Change feed fed by hand, standing in for a datastore's realtime push.
#[derive(Debug, Clone)]
pub struct InMemoryChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl InMemoryChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every running listener. Returns how many received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryChangeFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl ChangeSource for InMemoryChangeFeed {
    async fn run(
        &self,
        sender: mpsc::Sender<ChangeEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), RelationStoreError> {
        let mut events = self.sender.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("In-memory change feed shutting down");
                    break;
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if sender.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Change feed listener lagged, events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_published_events_are_forwarded() {
        let feed = InMemoryChangeFeed::default();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (event_tx, mut event_rx) = mpsc::channel(8);

        let running = {
            let feed = feed.clone();
            tokio::spawn(async move { feed.run(event_tx, shutdown_rx).await })
        };
        while feed.listener_count() == 0 {
            tokio::task::yield_now().await;
        }

        let event = ChangeEvent::AnswerDeleted { id: Uuid::new_v4() };
        assert_eq!(feed.publish(event.clone()), 1);
        assert_eq!(event_rx.recv().await, Some(event));

        shutdown_tx.send(()).unwrap();
        assert!(running.await.unwrap().is_ok());
    }

    #[test]
    fn test_publish_without_listeners() {
        let feed = InMemoryChangeFeed::new(4);
        assert_eq!(feed.publish(ChangeEvent::AnswerDeleted { id: Uuid::new_v4() }), 0);
    }
}
