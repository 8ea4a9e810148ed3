//! Agents
//!
//! An agent is a set of actions registered together to reach a user-facing
//! goal. This module also wires configuration into the pieces every agent
//! runs on: model router, suspension store, planner and executor.

pub mod star_news;

use crate::capability::CapabilityResolver;
use crate::config::{Config, StorageBackend};
use crate::db::Database;
use crate::executor::Executor;
use crate::llm::openai::OpenAIProvider;
use crate::llm::prompt::PromptRunner;
use crate::llm::router::ModelRouter;
use crate::llm::LLMProvider;
use crate::message_bus::MessageBus;
use crate::planner::Planner;
use crate::pool::SessionPool;
use crate::registry::ActionRegistry;
use crate::suspension::{InMemorySuspensionStore, SuspensionStore};
use sdk::errors::EngineError;
use star_news::{HoroscopeApiService, HoroscopeService, StarNewsFinder, StarNewsSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Router over the configured OpenAI-compatible endpoint
pub fn model_router(config: &Config) -> ModelRouter {
    let provider: Arc<dyn LLMProvider> = Arc::new(OpenAIProvider::new(config.llm.openai.clone()));
    router_with_providers(config, vec![provider])
}

/// Router over the given providers, using the configured default and timeout
pub fn router_with_providers(config: &Config, providers: Vec<Arc<dyn LLMProvider>>) -> ModelRouter {
    let router = ModelRouter::new(providers).with_timeout(Duration::from_secs(config.llm.timeout_secs));
    match &config.llm.default_model {
        Some(model) => router.with_default_model(model.clone()),
        None => router,
    }
}

/// Open the configured suspension store
pub async fn open_suspension_store(config: &Config) -> Result<Arc<dyn SuspensionStore>, EngineError> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemorySuspensionStore::new())),
        StorageBackend::Sqlite => {
            let path = config.database_path();
            let db = Database::new(&path)
                .await
                .map_err(|e| EngineError::Database(format!("{:#}", e)))?;
            info!("Suspended sessions stored in {}", path.display());
            Ok(Arc::new(db.suspensions()))
        }
    }
}

/// Planner and executor for `registry` with configured limits
pub fn build_executor(
    config: &Config,
    registry: ActionRegistry,
    store: Arc<dyn SuspensionStore>,
    bus: Option<Arc<MessageBus>>,
) -> Executor {
    let capabilities: Arc<dyn CapabilityResolver> = Arc::new(config.capability_resolver());
    let planner = Planner::new(Arc::new(registry), capabilities).with_max_depth(config.planner.max_depth);

    let executor = Executor::new(planner, store).with_settings(config.executor_settings());
    match bus {
        Some(bus) => executor.with_message_bus(bus),
        None => executor,
    }
}

/// Pool running sessions on `executor`, sized from config
pub fn session_pool(config: &Config, executor: Arc<Executor>) -> SessionPool {
    SessionPool::new(executor, config.executor.max_concurrent_sessions)
}

/// Horoscope client for the configured API
pub fn horoscope_service(config: &Config) -> Result<Arc<dyn HoroscopeService>, EngineError> {
    let service = HoroscopeApiService::new(config.star_news.horoscope_base_url.clone())
        .map_err(|e| EngineError::Config(format!("{:#}", e)))?;
    Ok(Arc::new(service))
}

/// Registry holding the star news actions
pub fn star_news_registry(
    config: &Config,
    router: Arc<ModelRouter>,
    horoscopes: Arc<dyn HoroscopeService>,
) -> Result<ActionRegistry, EngineError> {
    let finder = Arc::new(StarNewsFinder::new(
        Arc::new(PromptRunner::new(router)),
        horoscopes,
        StarNewsSettings::from(&config.star_news),
    ));

    let mut registry = ActionRegistry::new();
    finder.register(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::WEB;
    use crate::world::WorldState;
    use async_trait::async_trait;
    use sdk::types::{TypeKey, Typed};
    use star_news::{UserInput, Writeup};
    use tempfile::TempDir;

    struct Quiet;

    #[async_trait]
    impl HoroscopeService for Quiet {
        async fn daily_horoscope(&self, _sign: &str) -> anyhow::Result<String> {
            Ok("a quiet day".to_string())
        }
    }

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.core.data_dir = dir.path().to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_sqlite_store_from_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.storage.backend = StorageBackend::Sqlite;

        let store = open_suspension_store(&config).await.unwrap();
        assert!(store.pending().await.unwrap().is_empty());
        assert!(dir.path().join("lodestar.db").exists());
    }

    #[tokio::test]
    async fn test_without_web_the_goal_is_not_viable() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let router = Arc::new(router_with_providers(&config, vec![]));

        let registry = star_news_registry(&config, router, Arc::new(Quiet)).unwrap();
        let store = open_suspension_store(&config).await.unwrap();
        let executor = build_executor(&config, registry, store, None);

        let world = WorldState::with(&UserInput::new("Lynda is a Scorpio")).unwrap();
        let err = executor.run(Writeup::type_key(), world).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::NoViableAction { goal, missing } if goal == "RelevantNewsStories" && missing == WEB
        ));
    }

    #[test]
    fn test_build_executor_applies_limits() {
        let mut config = Config::default();
        config.executor.max_attempts = 7;
        config.capabilities.insert(WEB.to_string(), true);

        let executor = build_executor(
            &config,
            ActionRegistry::new(),
            Arc::new(InMemorySuspensionStore::new()),
            None,
        );
        assert_eq!(executor.settings().max_attempts, 7);
        assert!(executor.planner().capabilities().is_available(WEB));
        assert!(executor.planner().registry().is_empty());
        assert_eq!(TypeKey::new("Writeup"), Writeup::type_key());
    }

    #[test]
    fn test_session_pool_sized_from_config() {
        let mut config = Config::default();
        config.executor.max_concurrent_sessions = 3;

        let executor = Arc::new(build_executor(
            &config,
            ActionRegistry::new(),
            Arc::new(InMemorySuspensionStore::new()),
            None,
        ));
        let pool = session_pool(&config, executor);
        assert_eq!(pool.max_concurrent(), 3);
        assert_eq!(pool.available(), 3);
    }
}
