//! Application state: configuration, the session store, the oracle, and the live run registry.
//!
//! This module owns:
//!   - the trainer config (from TOML or defaults)
//!   - the session store (in-memory; authoritative for XP and progression)
//!   - the training oracle (OpenAI when configured, otherwise the local bank)
//!   - handles to running session tasks, keyed by run id

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::config::{load_trainer_config_from_env, TrainerConfig};
use crate::engine::SessionHandle;
use crate::error::{TrainerError, TrainerResult};
use crate::openai::OpenAI;
use crate::oracle::{LocalOracle, TrainingOracle};
use crate::store::{InMemoryStore, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub config: TrainerConfig,
    pub store: Arc<dyn SessionStore>,
    pub oracle: Arc<dyn TrainingOracle>,
    pub runs: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl AppState {
    /// Build state from env: load config, create the store, pick the oracle.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_trainer_config_from_env().unwrap_or_default();
        let store = InMemoryStore::new(config.progression.xp.clone(), config.progression.levels.clone());

        let oracle: Arc<dyn TrainingOracle> = match OpenAI::from_env(config.prompts.clone()) {
            Some(oa) => {
                info!(target: "spin_trainer_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
                Arc::new(oa)
            }
            None => {
                info!(target: "spin_trainer_backend", extra_scenarios = config.scenarios.len(), "OpenAI disabled (no OPENAI_API_KEY). Using local scenario bank.");
                Arc::new(LocalOracle::new(config.scenarios.clone()))
            }
        };

        Self::with_parts(config, Arc::new(store), oracle)
    }

    pub fn with_parts(config: TrainerConfig, store: Arc<dyn SessionStore>, oracle: Arc<dyn TrainingOracle>) -> Self {
        Self { config, store, oracle, runs: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Track a new run. Runs whose task has already stopped are pruned on the way.
    #[instrument(level = "debug", skip(self, handle), fields(run_id = %handle.run_id()))]
    pub async fn register_run(&self, handle: SessionHandle) {
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, h| !h.is_closed());
        if runs.len() != before {
            debug!(target: "spin_trainer_backend", pruned = before - runs.len(), "Pruned finished runs");
        }
        runs.insert(handle.run_id().to_string(), handle);
    }

    #[instrument(level = "debug", skip(self), fields(%run_id))]
    pub async fn get_run(&self, run_id: &str) -> TrainerResult<SessionHandle> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| TrainerError::NotFound(format!("run {run_id}")))
    }

    /// Stop and forget a run (socket closed).
    #[instrument(level = "debug", skip(self), fields(%run_id))]
    pub async fn drop_run(&self, run_id: &str) {
        if let Some(handle) = self.runs.write().await.remove(run_id) {
            handle.shutdown();
        }
    }
}
