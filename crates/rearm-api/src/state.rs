//! Shared state handed to every route handler.

use std::sync::Arc;
use std::time::Instant;

use rearm_action::Registrar;
use rearm_core::config::RearmConfig;
use rearm_skill::SkillRouter;
use rearm_storage::EventStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RearmConfig>,
    pub skill: Arc<SkillRouter>,
    pub registrar: Registrar,
    pub store: EventStore,
    /// Bearer token required on `/v1` routes.
    pub api_token: String,
    /// Port the server actually binds; browser origins are allowed for it.
    pub port: u16,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: RearmConfig,
        skill: SkillRouter,
        registrar: Registrar,
        store: EventStore,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            port: config.general.port,
            config: Arc::new(config),
            skill: Arc::new(skill),
            registrar,
            store,
            api_token: api_token.into(),
            start_time: Instant::now(),
        }
    }

    /// Bind to `port` instead of the configured one.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}
