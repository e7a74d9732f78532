use std::sync::Arc;

use bulsho_repository::{
    postgres::run_migrations, AnswerStore, ChangeSource, InMemoryAnswerStore, InMemoryChangeFeed,
    InMemoryRelationStore, MutationClient, MutationClientConfig, PgChangeListener,
    PostgresAnswerStore, PostgresRelationStore, RelationStore,
};
use bulsho_shared::types::{QuestionId, RelationKind, VotableType};
use bulsho_sync::{
    session, CommentThread, OrchestratorConfig, Reconciler, ReconcilerConfig, RelationLoader,
    SessionHandle, SharedRelations, SharedThreads, SyncOrchestrator, TracingNotifier,
};
use tracing::info;

use crate::config::{Backend, Settings};
use crate::errors::AppError;

/// `Dependencies` holds every wired component of the sync service.
///
/// The reconciler, loader and orchestrator share one relation cache and one
/// session, so a toggle, a hydration and a change-feed event all see the same
/// state.
pub struct Dependencies {
    pub client: Arc<MutationClient>,
    pub answers: Arc<dyn AnswerStore>,
    pub session: SessionHandle,
    pub relations: SharedRelations,
    pub threads: SharedThreads,
    pub reconciler: Reconciler,
    pub loader: RelationLoader,
    pub orchestrator: SyncOrchestrator,
    /// Publisher for the memory backend's change feed.
    pub memory_feed: Option<Arc<InMemoryChangeFeed>>,
}

impl Dependencies {
    /// Creates a new `Dependencies` instance from `settings`.
    ///
    /// For the postgres backend this connects to `DATABASE_URL` and applies
    /// pending migrations before anything else is built.
    ///
    /// # Returns
    ///
    /// A `Result` which is `Ok(Self)` on successful initialization or an
    /// `AppError` if the database cannot be reached or migrated.
    pub async fn new(settings: &Settings) -> Result<Self, AppError> {
        let (relation_store, answers, source, memory_feed): (
            Arc<dyn RelationStore>,
            Arc<dyn AnswerStore>,
            Arc<dyn ChangeSource>,
            Option<Arc<InMemoryChangeFeed>>,
        ) = match settings.backend {
            Backend::Postgres => {
                let database_url = settings
                    .database_url
                    .as_deref()
                    .ok_or_else(|| AppError::config("DATABASE_URL must be set"))?;
                let pool = sqlx::PgPool::connect(database_url).await?;
                run_migrations(&pool).await?;
                info!("Database migrations applied");

                (
                    Arc::new(PostgresRelationStore::new(pool.clone()).await?),
                    Arc::new(PostgresAnswerStore::new(pool.clone()).await?),
                    Arc::new(PgChangeListener::new(pool)),
                    None,
                )
            }
            Backend::Memory => {
                let feed = Arc::new(InMemoryChangeFeed::new(settings.channel_buffer_size));
                (
                    Arc::new(InMemoryRelationStore::new()),
                    Arc::new(InMemoryAnswerStore::new()),
                    feed.clone(),
                    Some(feed),
                )
            }
        };

        let client = Arc::new(MutationClient::with_config(
            relation_store,
            MutationClientConfig::with_max_batch_size(settings.max_batch_size)
                .request_timeout(settings.request_timeout),
        ));

        let (session_handle, session) = session(settings.user_id);
        let relations = SharedRelations::new();
        let threads = SharedThreads::new();

        let reconciler = Reconciler::with_config(
            client.clone(),
            session.clone(),
            Arc::new(TracingNotifier),
            relations.clone(),
            ReconcilerConfig {
                timeout: settings.request_timeout,
                ..ReconcilerConfig::default()
            },
        );
        let loader = RelationLoader::new(client.clone(), session.clone(), relations.clone());
        let orchestrator = SyncOrchestrator::with_config(
            source,
            relations.clone(),
            threads.clone(),
            session,
            OrchestratorConfig {
                channel_buffer_size: settings.channel_buffer_size,
                ..OrchestratorConfig::default()
            },
        );

        Ok(Dependencies {
            client,
            answers,
            session: session_handle,
            relations,
            threads,
            reconciler,
            loader,
            orchestrator,
            memory_feed,
        })
    }

    /// Open the thread of `question_id` and hydrate its vote counts.
    ///
    /// Returns the number of answers loaded.
    pub async fn load_question(&self, question_id: QuestionId) -> Result<usize, AppError> {
        let answers = self.answers.answers_for_question(question_id).await?;
        let answer_ids: Vec<_> = answers.iter().map(|answer| answer.id).collect();
        self.threads.insert(CommentThread::new(question_id, answers));

        self.loader
            .hydrate(RelationKind::Vote(VotableType::Question), &[question_id])
            .await?;
        self.loader
            .hydrate(RelationKind::Vote(VotableType::Answer), &answer_ids)
            .await?;

        info!(%question_id, answers = answer_ids.len(), "Question loaded");
        Ok(answer_ids.len())
    }
}
