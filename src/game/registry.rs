//! Process-wide registry of live games, keyed by name.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::db::map::MapStore;
use crate::db::replay::{ReplayLog, ReplayRepository};
use crate::errors::ServerError;
use crate::game::Game;

#[derive(Default)]
pub struct GameRegistry {
    games: Mutex<HashMap<String, Arc<Game>>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Game>> {
        self.games.lock().await.get(name).cloned()
    }

    /// Returns the game registered under `name`, creating it on first
    /// login. The caller is responsible for checking that an existing
    /// game matches the requested player count.
    pub async fn get_or_create(
        &self,
        name: &str,
        num_players: u32,
        config: &Arc<ServerConfig>,
        maps: &MapStore,
        replay: &ReplayRepository,
    ) -> Result<Arc<Game>, ServerError> {
        let mut games = self.games.lock().await;
        if let Some(game) = games.get(name) {
            return Ok(Arc::clone(game));
        }
        let map = maps.load(&config.map_name).await?;
        let towns = map.towns().len() as u32;
        if num_players == 0 || num_players > towns {
            return Err(ServerError::BadCommand(format!(
                "incorrect players number {num_players}, the map houses 1..={towns}"
            )));
        }
        let log = ReplayLog::open(replay.clone(), name, &map.name, num_players).await?;
        let game = Game::new(name, num_players, map, Arc::clone(config), Some(log));
        games.insert(name.to_string(), Arc::clone(&game));
        Ok(game)
    }

    pub async fn remove(&self, name: &str) {
        self.games.lock().await.remove(name);
    }

    /// Stops every registered game, flushing replays. Called on server
    /// shutdown.
    pub async fn stop_all(&self) {
        let games: Vec<Arc<Game>> = {
            let mut games = self.games.lock().await;
            games.drain().map(|(_, game)| game).collect()
        };
        for game in games {
            game.stop().await;
        }
    }
}
