//! Change-feed orchestrator.
//!
//! Drains the realtime feed and reduces every event into the relation cache
//! and the open comment threads. Also reacts to sign-in changes by dropping the
//! previous user's relation values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bulsho_repository::ChangeSource;
use bulsho_shared::types::ChangeEvent;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, instrument};

use crate::errors::SyncError;
use crate::session::Session;
use crate::state::SharedRelations;
use crate::tree::SharedThreads;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Size of the change event channel buffer.
    pub channel_buffer_size: usize,
    /// How often progress is logged.
    pub progress_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
            progress_interval: Duration::from_secs(10),
        }
    }
}

/// Counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub events_processed: u64,
    pub relations_updated: u64,
    pub threads_updated: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events_processed: AtomicU64,
    relations_updated: AtomicU64,
    threads_updated: AtomicU64,
}

pub struct SyncOrchestrator {
    source: Arc<dyn ChangeSource>,
    relations: SharedRelations,
    threads: SharedThreads,
    session: Session,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
    counters: Arc<Counters>,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn ChangeSource>,
        relations: SharedRelations,
        threads: SharedThreads,
        session: Session,
    ) -> Self {
        Self::with_config(
            source,
            relations,
            threads,
            session,
            OrchestratorConfig::default(),
        )
    }

    pub fn with_config(
        source: Arc<dyn ChangeSource>,
        relations: SharedRelations,
        threads: SharedThreads,
        session: Session,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            source,
            relations,
            threads,
            session,
            config,
            shutdown_tx,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            events_processed: self.counters.events_processed.load(Ordering::Relaxed),
            relations_updated: self.counters.relations_updated.load(Ordering::Relaxed),
            threads_updated: self.counters.threads_updated.load(Ordering::Relaxed),
        }
    }

    /// A sender that stops a running orchestrator from another task.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run until the feed ends, a shutdown is requested or Ctrl-C is received.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), SyncError> {
        info!("Starting sync orchestrator");

        let (event_tx, mut event_rx) =
            mpsc::channel::<ChangeEvent>(self.config.channel_buffer_size);

        let source = Arc::clone(&self.source);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let feed_handle = tokio::spawn(async move {
            let result = source.run(event_tx, shutdown_rx).await;
            if let Err(e) = &result {
                error!(error = %e, "Change feed error");
            }
            result
        });

        let mut users = self.session.subscribe();
        let _ = users.borrow_and_update();
        let mut session_open = true;

        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut prev_events: u64 = 0;
        let mut prev_time = std::time::Instant::now();

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => self.process_event(&event),
                        None => {
                            info!("Change feed ended");
                            break;
                        }
                    }
                }
                changed = users.changed(), if session_open => {
                    match changed {
                        Ok(()) => {
                            let user = *users.borrow_and_update();
                            self.relations.with(|cache| cache.clear_values());
                            info!(user_id = ?user, "Session changed, cleared own relations");
                        }
                        Err(_) => {
                            debug!("Session handle dropped");
                            session_open = false;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = progress_timer.tick() => {
                    let stats = self.stats();
                    let now = std::time::Instant::now();
                    let elapsed_secs = now.duration_since(prev_time).as_secs_f64();
                    let events_per_sec = if elapsed_secs > 0.0 {
                        (stats.events_processed.saturating_sub(prev_events) as f64) / elapsed_secs
                    } else {
                        0.0
                    };

                    info!(
                        events_processed = stats.events_processed,
                        relations_updated = stats.relations_updated,
                        threads_updated = stats.threads_updated,
                        events_per_sec = format!("{:.2}", events_per_sec),
                        "Sync progress"
                    );

                    prev_events = stats.events_processed;
                    prev_time = now;
                }
            }
        }

        // Drain whatever the feed already delivered.
        event_rx.close();
        while let Some(event) = event_rx.recv().await {
            self.process_event(&event);
        }

        let feed_result = feed_handle.await;

        let stats = self.stats();
        info!(
            total_events_processed = stats.events_processed,
            total_relations_updated = stats.relations_updated,
            total_threads_updated = stats.threads_updated,
            "Orchestrator shutdown complete"
        );

        match feed_result {
            Ok(result) => result.map_err(SyncError::from),
            Err(e) => Err(SyncError::feed(format!("change feed task failed: {}", e))),
        }
    }

    /// Reduce one event into local state.
    fn process_event(&self, event: &ChangeEvent) {
        self.counters
            .events_processed
            .fetch_add(1, Ordering::Relaxed);

        match event {
            ChangeEvent::RelationChanged { .. } | ChangeEvent::AggregateRefreshed { .. } => {
                let user = self.session.current_user();
                if self.relations.with(|cache| cache.apply_event(event, user)) {
                    self.counters
                        .relations_updated
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
            ChangeEvent::AnswerInserted(_)
            | ChangeEvent::AnswerUpdated(_)
            | ChangeEvent::AnswerDeleted { .. } => {
                if self.threads.apply_event(event) {
                    self.counters.threads_updated.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        debug!(?event, "Processed change event");
    }
}
