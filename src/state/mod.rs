pub mod board;
pub mod game;
pub mod game_config;
pub mod hub;
pub mod player;
pub mod registry;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig, dao::question_store::QuestionStore, error::ServiceError,
    services::token_service::TokenService,
};

pub use self::registry::Registry;

pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, room registry, token keys and config.
pub struct AppState {
    question_store: RwLock<Option<Arc<dyn QuestionStore>>>,
    degraded: watch::Sender<bool>,
    registry: Registry,
    tokens: Option<TokenService>,
    config: Arc<AppConfig>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a question store is installed.
    pub fn new(config: AppConfig, tokens: Option<TokenService>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            question_store: RwLock::new(None),
            degraded: degraded_tx,
            registry: Registry::default(),
            tokens,
            config: Arc::new(config),
        })
    }

    /// Obtain a handle to the current question store, if one is installed.
    pub async fn question_store(&self) -> Option<Arc<dyn QuestionStore>> {
        let guard = self.question_store.read().await;
        guard.as_ref().cloned()
    }

    /// Like [`AppState::question_store`] but fails while degraded.
    pub async fn require_question_store(&self) -> Result<Arc<dyn QuestionStore>, ServiceError> {
        self.question_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new question store and leave degraded mode.
    pub async fn set_question_store(&self, store: Arc<dyn QuestionStore>) {
        {
            let mut guard = self.question_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current question store and enter degraded mode.
    pub async fn clear_question_store(&self) {
        {
            let mut guard = self.question_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Public and private games plus the player → game index.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Token signer, or a server error when no key pair was configured.
    pub fn tokens(&self) -> Result<&TokenService, ServiceError> {
        self.tokens
            .as_ref()
            .ok_or_else(|| ServiceError::Config("token keys are not configured".into()))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
