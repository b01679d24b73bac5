use std::sync::Arc;

use crate::{
    bridge::Bridge, database::Database, env::BotConfig, library::Library, player::AudioClient,
    settings::Settings, voice_manager::Presence,
};

/// Everything a command handler needs, built once at start-up.
#[derive(Clone)]
pub struct AppState {
    pub library: Library,
    pub settings: Settings,
    pub bridge: Bridge,
    pub audio: Arc<dyn AudioClient>,
    pub presence: Presence,
    pub config: Arc<BotConfig>,
}

impl AppState {
    pub fn new(db: Database, audio: Arc<dyn AudioClient>, config: BotConfig) -> Self {
        let library = Library::new(db.clone(), audio.clone());
        let settings = Settings::new(db);
        let bridge = Bridge::new(library.clone(), settings.clone(), audio.clone());
        Self {
            library,
            settings,
            bridge,
            audio,
            presence: Presence::default(),
            config: Arc::new(config),
        }
    }
}
