//! The per-game actor.
//!
//! A `Game` owns its state behind one coarse `Mutex` and coordinates two
//! signals with it: `start_tick` lets the turn barrier force an early tick,
//! and the `tick_done` watch channel lets TURN handlers block until the
//! tick they asked for has happened. A dedicated tick task drives the
//! clock for every running game; observed games have no task and are
//! ticked synchronously by the observer.

pub mod engine;
pub mod events;
pub mod registry;
pub mod upgrade;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};
use tokio::sync::{Mutex, Notify, watch};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::db::replay::ReplayLog;
use crate::errors::ServerError;
use crate::models::map::Map;
use crate::models::player::Player;
use crate::models::train::Train;
use crate::protocol::{MoveRequest, UpgradeRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Init,
    Run,
    Finished,
}

/// A line switch accepted while the train was moving; applied when the
/// train reaches its forward endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedMove {
    pub speed: i32,
    pub line_idx: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventCooldowns {
    pub hijackers: u32,
    pub parasites: u32,
    pub refugees: u32,
}

/// Everything behind the game lock.
pub struct GameInner {
    pub map: Map,
    pub state: GameState,
    pub current_tick: u64,
    pub players: BTreeMap<Uuid, Player>,
    pub next_train_moves: HashMap<u32, QueuedMove>,
    pub event_cooldowns: EventCooldowns,
    pub config: Arc<ServerConfig>,
    pub(crate) rng: StdRng,
}

impl GameInner {
    pub(crate) fn new(map: Map, config: Arc<ServerConfig>) -> Self {
        Self {
            map,
            state: GameState::Init,
            current_tick: 0,
            players: BTreeMap::new(),
            next_train_moves: HashMap::new(),
            event_cooldowns: EventCooldowns::default(),
            config,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Places a new player: claims the first free town, parks the
    /// configured number of trains at its point. Returns true when the
    /// game became full and moved to Run.
    pub(crate) fn join(&mut self, idx: Uuid, name: &str, num_players: u32) -> Result<bool, ServerError> {
        let town_id = self
            .map
            .posts
            .values()
            .find(|p| p.as_town().is_some_and(|t| t.player_id.is_none()))
            .map(|p| p.idx)
            .ok_or_else(|| ServerError::AccessDenied("the game is full".into()))?;
        let home_point = self.map.posts[&town_id].point_id;
        self.map
            .posts
            .get_mut(&town_id)
            .and_then(|p| p.as_town_mut())
            .expect("post was a town above")
            .player_id = Some(idx);

        let line = *self
            .map
            .line_at_point(home_point)
            .ok_or(ServerError::Internal)?;
        let position = line.position_of(home_point).ok_or(ServerError::Internal)?;

        let mut player = Player::new(idx, name, home_point, town_id);
        for _ in 0..self.config.trains_count {
            let train_idx = self.map.trains.len() as u32 + 1;
            let train = Train::new(train_idx, idx, line.idx, position);
            player.trains.push(train_idx);
            self.map.add_train(train);
        }
        self.players.insert(idx, player);

        if self.players.len() as u32 == num_players {
            self.state = GameState::Run;
            return Ok(true);
        }
        Ok(false)
    }

    /// Dynamic layer: posts, trains and the per-player scoreboard. Events
    /// are visible to their owner only (observers see everything); after a
    /// player reads the layer their events are acknowledged and cleared.
    pub(crate) fn layer1(&mut self, viewer: Option<Uuid>) -> Value {
        let posts: Vec<Value> = self
            .map
            .posts
            .values()
            .map(|post| post.snapshot(viewer.is_none() || post.owner() == viewer))
            .collect();
        let trains: Vec<Value> = self
            .map
            .trains
            .values()
            .map(|train| train.snapshot(viewer.is_none() || Some(train.player_id) == viewer))
            .collect();
        let mut rating = serde_json::Map::new();
        for player in self.players.values() {
            rating.insert(
                player.idx.to_string(),
                json!({
                    "idx": player.idx,
                    "name": player.name,
                    "rating": player.rating(&self.map),
                }),
            );
        }
        let value = json!({
            "idx": self.map.idx,
            "post": posts,
            "train": trains,
            "rating": rating,
        });
        if let Some(viewer) = viewer {
            self.clear_events_for(viewer);
        }
        value
    }

    fn clear_events_for(&mut self, player: Uuid) {
        for post in self.map.posts.values_mut() {
            if post.owner() == Some(player) {
                post.events.clear();
            }
        }
        for train in self.map.trains.values_mut() {
            if train.player_id == player {
                train.events.clear();
            }
        }
    }
}

pub struct Game {
    pub name: String,
    pub num_players: u32,
    observed: bool,
    config: Arc<ServerConfig>,
    pub(crate) inner: Mutex<GameInner>,
    start_tick: Notify,
    stop_signal: Notify,
    stopped: AtomicBool,
    tick_done: watch::Sender<u64>,
    pub replay: Option<Arc<ReplayLog>>,
}

impl Game {
    pub fn new(
        name: &str,
        num_players: u32,
        map: Map,
        config: Arc<ServerConfig>,
        replay: Option<ReplayLog>,
    ) -> Arc<Self> {
        tracing::info!(game = name, num_players, map = %map.name, "create game");
        let (tick_done, _) = watch::channel(0);
        Arc::new(Self {
            name: name.to_string(),
            num_players,
            observed: replay.is_none(),
            inner: Mutex::new(GameInner::new(map, config.clone())),
            config,
            start_tick: Notify::new(),
            stop_signal: Notify::new(),
            stopped: AtomicBool::new(false),
            tick_done,
            replay: replay.map(Arc::new),
        })
    }

    pub fn is_observed(&self) -> bool {
        self.observed
    }

    /// Adds a player (or lets a departed one rejoin) and returns the
    /// player snapshot. Reaching the target player count moves the game
    /// to Run and starts its tick task.
    pub async fn add_player(self: &Arc<Self>, idx: Uuid, name: &str) -> Result<Value, ServerError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if let Some(player) = inner.players.get_mut(&idx) {
            player.in_game = true;
            tracing::info!(game = %self.name, player = name, "player rejoined");
            let snapshot = inner.players[&idx].snapshot(&inner.map);
            return Ok(snapshot);
        }
        if inner.players.len() as u32 >= self.num_players {
            return Err(ServerError::AccessDenied("the game is full".into()));
        }

        tracing::info!(game = %self.name, player = name, "add player");
        let started = inner.join(idx, name, self.num_players)?;
        let snapshot = inner.players[&idx].snapshot(&inner.map);
        drop(guard);

        if started {
            tracing::info!(game = %self.name, "all players are in, game runs");
            if !self.observed {
                self.spawn_tick_task();
            }
        }
        Ok(snapshot)
    }

    /// Marks the player out of the game; returns whether anybody is left.
    pub async fn remove_player(&self, idx: Uuid) -> bool {
        let mut inner = self.inner.lock().await;
        if let Some(player) = inner.players.get_mut(&idx) {
            player.in_game = false;
        }
        inner.players.values().any(|p| p.in_game)
    }

    /// The turn barrier. Marks the player done; once every participating
    /// player is done the tick task is signalled to run early. The caller
    /// then waits for the next completed tick, up to `turn_timeout`.
    pub async fn turn(&self, player_idx: Uuid) -> Result<(), ServerError> {
        let mut tick_rx = self.tick_done.subscribe();
        tick_rx.borrow_and_update();
        {
            let mut inner = self.inner.lock().await;
            if inner.state != GameState::Run {
                return Err(ServerError::NotReady("game is not running yet".into()));
            }
            let player = inner
                .players
                .get_mut(&player_idx)
                .ok_or_else(|| ServerError::AccessDenied("login required".into()))?;
            player.turn_done = true;
            let all_done = inner
                .players
                .values()
                .filter(|p| p.in_game)
                .all(|p| p.turn_done);
            if all_done {
                self.start_tick.notify_one();
            }
        }
        match tokio::time::timeout(self.config.turn_timeout, tick_rx.changed()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ServerError::Internal),
            Err(_) => Err(ServerError::Timeout),
        }
    }

    pub async fn move_train(
        &self,
        player: Option<Uuid>,
        req: MoveRequest,
    ) -> Result<(), ServerError> {
        let mut inner = self.inner.lock().await;
        if inner.state != GameState::Run {
            return Err(ServerError::NotReady("game is not running yet".into()));
        }
        engine::move_train(&mut inner, player, req)
    }

    pub async fn upgrade(&self, player: Uuid, req: &UpgradeRequest) -> Result<(), ServerError> {
        let mut inner = self.inner.lock().await;
        if inner.state != GameState::Run {
            return Err(ServerError::NotReady("game is not running yet".into()));
        }
        upgrade::make_upgrade(&mut inner, player, req)
    }

    /// Serializes a map layer. Layer 1 read by a player acknowledges and
    /// clears that player's events; observer reads (`viewer == None`)
    /// clear nothing.
    pub async fn map_layer(&self, viewer: Option<Uuid>, layer: u32) -> Result<String, ServerError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let value = match layer {
            0 => inner.map.layer0(),
            1 => inner.layer1(viewer),
            10 => inner.map.layer10(),
            _ => return Err(ServerError::ResourceNotFound(format!("no such layer: {layer}"))),
        };
        Ok(value.to_string())
    }

    /// Runs exactly one tick synchronously. Observed games only.
    pub async fn tick_once(&self) {
        let mut guard = self.inner.lock().await;
        engine::tick(&mut guard, None);
    }

    /// Stops the clock, flushes the replay and marks the game finished.
    pub async fn stop(&self) {
        tracing::info!(game = %self.name, "game stopped");
        {
            let mut inner = self.inner.lock().await;
            inner.state = GameState::Finished;
        }
        self.stopped.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a tick task that is mid-tick
        // still wakes promptly on its next wait.
        self.stop_signal.notify_one();
        if let Some(replay) = &self.replay {
            if let Err(err) = replay.flush().await {
                tracing::error!(game = %self.name, %err, "failed to flush replay");
            }
        }
    }

    fn spawn_tick_task(self: &Arc<Self>) {
        let game = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = game.stop_signal.notified() => {}
                    _ = game.start_tick.notified() => {}
                    _ = tokio::time::sleep(game.config.tick_time) => {}
                }
                if game.stopped.load(Ordering::SeqCst) {
                    break;
                }
                let tick = {
                    let mut guard = game.inner.lock().await;
                    engine::tick(&mut guard, game.replay.as_deref());
                    guard.current_tick
                };
                game.tick_done.send_replace(tick);
                if let Some(replay) = &game.replay {
                    if let Err(err) = replay.flush().await {
                        tracing::error!(game = %game.name, %err, "failed to flush replay");
                    }
                }
            }
            tracing::debug!(game = %game.name, "tick task exited");
        });
    }
}
