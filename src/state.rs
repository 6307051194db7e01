use std::sync::Arc;

use crate::config::ServerConfig;
use crate::db;
use crate::db::map::MapStore;
use crate::db::replay::ReplayRepository;
use crate::errors::ServerError;
use crate::game::registry::GameRegistry;
use crate::models::player::PlayerRegistry;

/// Server-scoped state, passed explicitly into every session. There are
/// no module-level registries: dropping the state drops the world.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub games: Arc<GameRegistry>,
    pub players: Arc<PlayerRegistry>,
    pub replay: ReplayRepository,
    pub maps: MapStore,
}

impl AppState {
    /// Connects the replay store and the map store per the configuration.
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let replay_pool = db::connect(config.replay_db_url.as_deref()).await?;
        let replay = ReplayRepository::new(replay_pool);
        replay.ensure_schema().await?;
        let maps = MapStore::connect(config.map_db_url.as_deref()).await?;
        Ok(Self {
            config: Arc::new(config),
            games: Arc::new(GameRegistry::new()),
            players: Arc::new(PlayerRegistry::new()),
            replay,
            maps,
        })
    }
}
