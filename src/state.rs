//! Shared application state and per-request service construction.
//!
//! The store and the insight model live for the process; the TickTick client
//! is built per request from the user's stored token, so services stay
//! user-agnostic and token refreshes take effect immediately.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::ai::{AiEngine, InsightModel, OpenRouterClient};
use crate::analyzer::{AnalyzerSettings, TaskAnalyzer};
use crate::config::Config;
use crate::db::{DbUser, InsightDb};
use crate::email::EmailReceiver;
use crate::energy_tracker::EnergyTracker;
use crate::error::AppError;
use crate::prioritizer::Prioritizer;
use crate::ticktick::{TaskService, TickTickClient, TickTickOAuth};

pub struct AppState {
    db: Arc<Mutex<InsightDb>>,
    model: Arc<dyn InsightModel>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let db = match &config.db_path {
            Some(path) => InsightDb::open_at(path.clone())?,
            None => InsightDb::open()?,
        };
        let client = OpenRouterClient::new(
            &config.openrouter_api_key,
            &config.ai_model,
            config.ai_temperature,
        );
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            model: Arc::new(AiEngine::new(client)),
            config,
        })
    }

    pub fn db(&self) -> Arc<Mutex<InsightDb>> {
        Arc::clone(&self.db)
    }

    fn store(&self) -> Result<MutexGuard<'_, InsightDb>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal("insight store lock poisoned".into()))
    }

    /// The single local user (created on first use). Service operations take
    /// an explicit user id, so growing this into real multi-tenancy means
    /// changing only this resolution step.
    pub fn default_user(&self) -> Result<DbUser, AppError> {
        let store = self.store()?;
        let id = store.ensure_user(None)?;
        store
            .get_user(id)?
            .ok_or_else(|| AppError::Internal("default user row vanished".into()))
    }

    /// A task service bound to the user's stored token. Fails fast with a
    /// re-authenticate signal when no token exists — no fallback is valid.
    pub fn task_service_for(&self, user: &DbUser) -> Result<Arc<dyn TaskService>, AppError> {
        match user.access_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => Ok(Arc::new(TickTickClient::new(token))),
            None => Err(AppError::Auth(
                "No TickTick credentials stored. Connect TickTick and try again.".into(),
            )),
        }
    }

    pub fn analyzer(&self, tasks: Arc<dyn TaskService>) -> Arc<TaskAnalyzer> {
        Arc::new(TaskAnalyzer::new(
            self.db(),
            tasks,
            Arc::clone(&self.model),
            AnalyzerSettings::from(&self.config),
        ))
    }

    pub fn prioritizer(&self) -> Prioritizer {
        Prioritizer::new(self.db(), Arc::clone(&self.model))
    }

    pub fn energy_tracker(&self) -> EnergyTracker {
        EnergyTracker::new(self.db())
    }

    pub fn email_receiver(&self, tasks: Arc<dyn TaskService>) -> EmailReceiver {
        let analyzer = self.analyzer(Arc::clone(&tasks));
        EmailReceiver::new(self.db(), tasks, Arc::clone(&self.model), analyzer)
    }

    pub fn ticktick_oauth(&self) -> TickTickOAuth {
        TickTickOAuth::new(
            &self.config.ticktick_client_id,
            &self.config.ticktick_client_secret,
            &self.config.ticktick_redirect_uri,
        )
    }
}
