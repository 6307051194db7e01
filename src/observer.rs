//! Time travel over recorded games.
//!
//! An observer connection picks one recorded game, rebuilds its initial
//! state by replaying the LOGIN actions into an observed game (no tick
//! task, no replay writes), and then scrubs back and forth: forward by
//! consuming MOVE/TURN actions through the engine, backward by resetting
//! and replaying from the start.

use std::sync::Arc;

use serde_json::Value;

use crate::db::replay::ActionRecord;
use crate::errors::ServerError;
use crate::game::Game;
use crate::protocol::{Action, IdxRequest, LoginRequest, MapRequest, MoveRequest};
use crate::state::AppState;

pub struct Observer {
    state: AppState,
    game: Option<Arc<Game>>,
    actions: Vec<ActionRecord>,
    game_name: String,
    map_name: String,
    num_players: u32,
    current_turn: i64,
    current_action: usize,
    max_turn: i64,
}

impl Observer {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            game: None,
            actions: Vec::new(),
            game_name: String::new(),
            map_name: String::new(),
            num_players: 0,
            current_turn: 0,
            current_action: 0,
            max_turn: 0,
        }
    }

    /// The list of recorded games, as the OBSERVER response body.
    pub async fn games_list(&self) -> Result<String, ServerError> {
        let games = self.state.replay.get_all_games().await?;
        Ok(serde_json::to_string(&games)?)
    }

    /// Dispatches one observer command.
    pub async fn handle(
        &mut self,
        action: Action,
        payload: Value,
    ) -> Result<Option<String>, ServerError> {
        match action {
            Action::Observer => Ok(Some(self.games_list().await?)),
            Action::Game => {
                let req: IdxRequest = serde_json::from_value(payload)?;
                self.select_game(req.idx).await?;
                Ok(None)
            }
            Action::Turn => {
                let req: IdxRequest = serde_json::from_value(payload)?;
                self.turn(req.idx).await?;
                Ok(None)
            }
            Action::Map => {
                let req: MapRequest = serde_json::from_value(payload)?;
                let game = self
                    .game
                    .as_ref()
                    .ok_or_else(|| ServerError::ResourceNotFound("no game selected".into()))?;
                // Observer reads never clear events.
                Ok(Some(game.map_layer(None, req.layer).await?))
            }
            _ => Err(ServerError::BadCommand(
                "the command is not available to observers".into(),
            )),
        }
    }

    async fn select_game(&mut self, game_id: i64) -> Result<(), ServerError> {
        let record = self
            .state
            .replay
            .get_all_games()
            .await?
            .into_iter()
            .find(|g| g.idx == game_id)
            .ok_or_else(|| ServerError::ResourceNotFound(format!("no such game: {game_id}")))?;
        tracing::info!(game = %record.name, "observer selected game");
        self.game_name = record.name;
        self.map_name = record.map;
        self.num_players = record.num_players;
        self.max_turn = record.length;
        self.actions = self.state.replay.get_all_actions(game_id).await?;
        self.reset_game().await
    }

    /// Rebuilds the observed game at turn zero by replaying logins.
    async fn reset_game(&mut self) -> Result<(), ServerError> {
        let map = self.state.maps.load(&self.map_name).await?;
        let game = Game::new(
            &self.game_name,
            self.num_players,
            map,
            Arc::clone(&self.state.config),
            None,
        );
        for action in &self.actions {
            if action.code != Action::Login.code() {
                continue;
            }
            let Some(message) = &action.message else {
                continue;
            };
            let login: LoginRequest = serde_json::from_str(message)?;
            let idx = self.state.players.resolve(&login.name);
            game.add_player(idx, &login.name).await?;
        }
        self.game = Some(game);
        self.current_turn = 0;
        self.current_action = 0;
        Ok(())
    }

    /// Consumes recorded actions forward until `turns` ticks have been
    /// replayed or the log runs out.
    async fn play_turns(&mut self, turns: i64) -> Result<(), ServerError> {
        let game = self
            .game
            .as_ref()
            .cloned()
            .ok_or_else(|| ServerError::BadCommand("no game selected".into()))?;
        let mut played = 0;
        while self.current_action < self.actions.len() && played < turns {
            let action = self.actions[self.current_action].clone();
            self.current_action += 1;
            match Action::from_code(action.code) {
                Some(Action::Move) => {
                    if let Some(message) = &action.message {
                        if let Ok(req) = serde_json::from_str::<MoveRequest>(message) {
                            if let Err(err) = game.move_train(None, req).await {
                                tracing::warn!(%err, "recorded move did not replay");
                            }
                        }
                    }
                }
                Some(Action::Turn) => {
                    game.tick_once().await;
                    played += 1;
                    self.current_turn += 1;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Moves the observed game to the given turn, clamped to the recorded
    /// range. Rewinding resets and replays from the beginning.
    pub async fn turn(&mut self, target: i64) -> Result<(), ServerError> {
        if self.game.is_none() {
            return Err(ServerError::BadCommand("no game selected".into()));
        }
        if self.actions.is_empty() {
            return Err(ServerError::ResourceNotFound(
                "the game has no recorded actions".into(),
            ));
        }
        let target = target.clamp(0, self.max_turn);
        if target == self.current_turn {
            return Ok(());
        }
        if target > self.current_turn {
            let delta = target - self.current_turn;
            self.play_turns(delta).await?;
        } else {
            self.reset_game().await?;
            if target > 0 {
                self.play_turns(target).await?;
            }
        }
        self.current_turn = target;
        Ok(())
    }
}
