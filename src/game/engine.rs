//! The tick pipeline and the movement rules.
//!
//! One tick runs a fixed sequence: cooldowns, replenishment, movement,
//! collisions, arrivals, town consumption, random events, tick counter.
//! Request handlers interleave between ticks under the same lock and
//! never observe a half-applied tick.

use uuid::Uuid;

use crate::db::replay::ReplayLog;
use crate::errors::ServerError;
use crate::game::{GameInner, QueuedMove, events};
use crate::models::event::Event;
use crate::models::post::{PostKind, PostType};
use crate::protocol::{Action, MoveRequest};

/// Advances the game by exactly one tick.
pub(crate) fn tick(inner: &mut GameInner, replay: Option<&ReplayLog>) {
    let tick_no = inner.current_tick + 1;
    decrement_cooldowns(inner);
    replenish_posts(inner);
    move_trains(inner);
    if inner.config.collisions_enabled {
        resolve_collisions(inner, tick_no);
    }
    process_arrivals(inner, tick_no);
    update_towns(inner, tick_no);
    events::run_random_events(inner, tick_no, replay);
    inner.current_tick = tick_no;
    if let Some(replay) = replay {
        replay.add_action(Action::Turn.code(), None);
    }
    for player in inner.players.values_mut() {
        player.turn_done = false;
    }
    tracing::debug!(tick = tick_no, "game tick");
}

fn decrement_cooldowns(inner: &mut GameInner) {
    for train in inner.map.trains.values_mut() {
        train.cooldown = train.cooldown.saturating_sub(1);
    }
    let cd = &mut inner.event_cooldowns;
    cd.hijackers = cd.hijackers.saturating_sub(1);
    cd.parasites = cd.parasites.saturating_sub(1);
    cd.refugees = cd.refugees.saturating_sub(1);
}

fn replenish_posts(inner: &mut GameInner) {
    for post in inner.map.posts.values_mut() {
        match &mut post.kind {
            PostKind::Market(market) => {
                if market.product < market.product_capacity {
                    market.product =
                        (market.product + market.replenishment).min(market.product_capacity);
                }
            }
            PostKind::Storage(storage) => {
                if storage.armor < storage.armor_capacity {
                    storage.armor =
                        (storage.armor + storage.replenishment).min(storage.armor_capacity);
                }
            }
            PostKind::Town(_) => {}
        }
    }
}

fn move_trains(inner: &mut GameInner) {
    let fuel_enabled = inner.config.fuel_enabled;
    let mut exhausted = Vec::new();
    let ids: Vec<u32> = inner.map.trains.keys().copied().collect();
    for id in ids {
        let line_idx = inner.map.trains[&id].line_idx;
        let Some(line) = inner.map.lines.get(&line_idx).copied() else {
            tracing::error!(train = id, line = line_idx, "train is on an unknown line");
            continue;
        };
        let train = inner.map.trains.get_mut(&id).expect("train id from keys");
        let moved = if train.speed > 0 && train.position < line.length {
            train.position += 1;
            true
        } else if train.speed < 0 && train.position > 0 {
            train.position -= 1;
            true
        } else {
            false
        };
        if moved && fuel_enabled {
            if train.fuel < train.fuel_consumption {
                exhausted.push(id);
            } else {
                train.fuel -= train.fuel_consumption;
            }
        }
    }
    for id in exhausted {
        tracing::info!(train = id, "train ran out of fuel, towing home");
        send_train_home(inner, id);
    }
}

/// Point id under the train if it stands on a line endpoint.
fn train_point(inner: &GameInner, train_id: u32) -> Option<u32> {
    let train = inner.map.trains.get(&train_id)?;
    let line = inner.map.lines.get(&train.line_idx)?;
    if train.position == 0 {
        Some(line.points[0])
    } else if train.position == line.length {
        Some(line.points[1])
    } else {
        None
    }
}

fn trains_collide(inner: &GameInner, a: u32, b: u32) -> bool {
    let ta = &inner.map.trains[&a];
    let tb = &inner.map.trains[&b];
    match (train_point(inner, a), train_point(inner, b)) {
        (Some(pa), Some(pb)) => {
            // Towns are safe harbors.
            pa == pb
                && inner
                    .map
                    .post_at_point(pa)
                    .is_none_or(|post| post.post_type() != PostType::Town)
        }
        _ => {
            if ta.line_idx != tb.line_idx {
                return false;
            }
            if ta.position == tb.position {
                return true;
            }
            if ta.position.abs_diff(tb.position) != 1 {
                return false;
            }
            // Adjacent and closing in on each other.
            let (lo, hi) = if ta.position < tb.position {
                (ta, tb)
            } else {
                (tb, ta)
            };
            lo.speed > 0 && hi.speed < 0
        }
    }
}

fn resolve_collisions(inner: &mut GameInner, tick_no: u64) {
    let ids: Vec<u32> = inner.map.trains.keys().copied().collect();
    let mut pairs = Vec::new();
    for (i, &a) in ids.iter().enumerate() {
        for &b in &ids[i + 1..] {
            if trains_collide(inner, a, b) {
                pairs.push((a, b));
            }
        }
    }
    for (a, b) in pairs {
        tracing::info!(train_a = a, train_b = b, tick = tick_no, "train collision");
        if let Some(train) = inner.map.trains.get_mut(&a) {
            train.events.push(Event::train_collision(tick_no, b));
        }
        if let Some(train) = inner.map.trains.get_mut(&b) {
            train.events.push(Event::train_collision(tick_no, a));
        }
        send_train_home(inner, a);
        send_train_home(inner, b);
    }
}

/// Teleports a train back to its owner's town: re-anchored on a line
/// touching the home point, stopped, cargo lost, collision cooldown on.
pub(crate) fn send_train_home(inner: &mut GameInner, train_id: u32) {
    let Some(owner) = inner.map.trains.get(&train_id).map(|t| t.player_id) else {
        return;
    };
    let Some(player) = inner.players.get(&owner) else {
        return;
    };
    let home = player.home;
    let cooldown = inner
        .map
        .posts
        .get(&player.town)
        .and_then(|p| p.as_town())
        .map(|t| t.train_cooldown)
        .unwrap_or(0);
    let Some(line) = inner.map.line_at_point(home).copied() else {
        return;
    };
    let position = line.position_of(home).expect("line touches home");
    inner.next_train_moves.remove(&train_id);
    let train = inner.map.trains.get_mut(&train_id).expect("checked above");
    train.line_idx = line.idx;
    train.position = position;
    train.speed = 0;
    train.devastate();
    train.cooldown = cooldown;
}

fn process_arrivals(inner: &mut GameInner, tick_no: u64) {
    let ids: Vec<u32> = inner.map.trains.keys().copied().collect();
    for id in ids {
        if let Some(point) = train_point(inner, id) {
            train_in_point(inner, id, point, tick_no);
        }
    }
}

fn train_in_point(inner: &mut GameInner, train_id: u32, point_idx: u32, tick_no: u64) {
    if let Some(post_id) = inner.map.points.get(&point_idx).and_then(|p| p.post_id) {
        train_in_post(inner, train_id, post_id, tick_no);
    }

    match inner.next_train_moves.remove(&train_id) {
        Some(next) => {
            let line_to = match inner.map.lines.get(&next.line_idx).copied() {
                Some(line) => line,
                None => return,
            };
            let train = inner.map.trains.get_mut(&train_id).expect("train exists");
            if next.line_idx == train.line_idx {
                // Same line queued again: stop at the terminal position.
                let at_terminal = (train.speed > 0 && train.position == line_to.length)
                    || (train.speed < 0 && train.position == 0);
                if at_terminal {
                    train.speed = 0;
                }
            } else {
                train.speed = next.speed;
                train.line_idx = next.line_idx;
                train.position = if next.speed > 0 { 0 } else { line_to.length };
            }
        }
        None => {
            let train = inner.map.trains.get_mut(&train_id).expect("train exists");
            train.speed = 0;
        }
    }
}

/// Loading and unloading when a train stands in a post.
fn train_in_post(inner: &mut GameInner, train_id: u32, post_id: u32, tick_no: u64) {
    let full_unload = inner.config.full_unload;
    let fuel_enabled = inner.config.fuel_enabled;
    let map = &mut inner.map;
    let Some(train) = map.trains.get_mut(&train_id) else {
        return;
    };
    let Some(post) = map.posts.get_mut(&post_id) else {
        return;
    };
    match &mut post.kind {
        PostKind::Town(town) => {
            if town.player_id != Some(train.player_id) {
                return;
            }
            let goods = train.goods;
            let accepted = match train.post_type {
                Some(PostType::Market) => {
                    let (accepted, hit_cap) = town.add_product(goods);
                    if goods > 0 && hit_cap {
                        post.events.push(Event::product_overflow(tick_no, town.product));
                    }
                    accepted
                }
                Some(PostType::Storage) => {
                    let (accepted, hit_cap) = town.add_armor(goods);
                    if goods > 0 && hit_cap {
                        post.events.push(Event::armor_overflow(tick_no, town.armor));
                    }
                    accepted
                }
                _ => 0,
            };
            if full_unload {
                train.devastate();
            } else {
                train.goods -= accepted;
                if train.goods == 0 {
                    train.post_type = None;
                }
            }
            if fuel_enabled {
                train.fuel = train.fuel_capacity;
            }
        }
        PostKind::Market(market) => {
            if matches!(train.post_type, Some(PostType::Storage)) {
                return;
            }
            let take = market.product.min(train.goods_capacity - train.goods);
            if take > 0 {
                market.product -= take;
                train.load(PostType::Market, take);
            }
        }
        PostKind::Storage(storage) => {
            if matches!(train.post_type, Some(PostType::Market)) {
                return;
            }
            let take = storage.armor.min(train.goods_capacity - train.goods);
            if take > 0 {
                storage.armor -= take;
                train.load(PostType::Storage, take);
            }
        }
    }
}

fn update_towns(inner: &mut GameInner, tick_no: u64) {
    let town_ids = inner.map.towns();
    for id in town_ids {
        let post = inner.map.posts.get_mut(&id).expect("town id from view");
        let PostKind::Town(town) = &mut post.kind else {
            continue;
        };
        let owned = town.player_id.is_some();
        let population_before = town.population;
        if town.product < town.population {
            town.population = town.population.saturating_sub(1);
        }
        town.product = town.product.saturating_sub(town.population);
        if !owned {
            continue;
        }
        if population_before > 0 && town.population == 0 {
            tracing::info!(town = id, tick = tick_no, "town population is gone");
            post.events.push(Event::game_over(tick_no));
        }
        if town.product == 0 {
            post.events.push(Event::product_lack(tick_no));
        }
        if town.armor == 0 {
            post.events.push(Event::armor_lack(tick_no));
        }
    }
}

/// What an accepted MOVE does to the train.
enum MoveDecision {
    SetSpeed,
    Anchor { position: u32 },
    Defer,
}

/// Processes a MOVE command under the game lock. `player` is `None` for
/// observer playback, which skips the ownership check.
pub(crate) fn move_train(
    inner: &mut GameInner,
    player: Option<Uuid>,
    req: MoveRequest,
) -> Result<(), ServerError> {
    let speed = req.speed.signum();
    let train = inner
        .map
        .trains
        .get(&req.train_idx)
        .ok_or_else(|| ServerError::ResourceNotFound(format!("no such train: {}", req.train_idx)))?;
    if let Some(player) = player {
        if train.player_id != player {
            return Err(ServerError::AccessDenied(
                "the train belongs to another player".into(),
            ));
        }
    }
    let line_to = *inner
        .map
        .lines
        .get(&req.line_idx)
        .ok_or_else(|| ServerError::ResourceNotFound(format!("no such line: {}", req.line_idx)))?;
    if train.cooldown > 0 {
        return Err(ServerError::BadCommand("the train is on cooldown".into()));
    }
    let line_from = inner.map.lines[&train.line_idx];

    let decision = if speed == 0 || req.line_idx == train.line_idx {
        MoveDecision::SetSpeed
    } else if train.speed == 0 {
        let anchor = if train.position == line_from.length {
            Some(line_from.points[1])
        } else if train.position == 0 {
            Some(line_from.points[0])
        } else {
            None
        };
        match anchor {
            Some(point) => match line_to.position_of(point) {
                Some(position) => MoveDecision::Anchor { position },
                None => {
                    return Err(ServerError::BadCommand(
                        "the target line does not touch the train's point".into(),
                    ));
                }
            },
            None => {
                return Err(ServerError::BadCommand(
                    "the train is standing on the line and has to continue its run".into(),
                ));
            }
        }
    } else {
        // Moving: the forward endpoint must meet the target line on the
        // side matching the requested direction.
        let compatible = match (train.speed > 0, speed > 0) {
            (true, true) => line_from.points[1] == line_to.points[0],
            (true, false) => line_from.points[1] == line_to.points[1],
            (false, true) => line_from.points[0] == line_to.points[0],
            (false, false) => line_from.points[0] == line_to.points[1],
        };
        if !compatible {
            return Err(ServerError::BadCommand(
                "the target line does not continue the train's run".into(),
            ));
        }
        MoveDecision::Defer
    };

    inner.next_train_moves.remove(&req.train_idx);
    let train = inner
        .map
        .trains
        .get_mut(&req.train_idx)
        .expect("checked above");
    match decision {
        MoveDecision::SetSpeed => train.speed = speed,
        MoveDecision::Anchor { position } => {
            train.line_idx = req.line_idx;
            train.position = position;
            train.speed = speed;
        }
        MoveDecision::Defer => {
            inner.next_train_moves.insert(
                req.train_idx,
                QueuedMove {
                    speed,
                    line_idx: req.line_idx,
                },
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::game::GameState;
    use crate::game::test_support::{inner_on, player_id, solo};
    use crate::models::event::EventType;

    fn mv(train_idx: u32, speed: i32, line_idx: u32) -> MoveRequest {
        MoveRequest {
            train_idx,
            speed,
            line_idx,
        }
    }

    #[test]
    fn test_tick_advances_counter_and_resets_turn_done() {
        let mut inner = solo("map02", ServerConfig::testing());
        for player in inner.players.values_mut() {
            player.turn_done = true;
        }
        tick(&mut inner, None);
        assert_eq!(inner.current_tick, 1);
        assert!(inner.players.values().all(|p| !p.turn_done));
    }

    #[test]
    fn test_transport_run_to_market_and_back() {
        // Train 1 starts at the town (point 1); line 1 leads to the small
        // market (product 5) one unit away.
        let mut inner = solo("map02", ServerConfig::testing());
        let player = player_id(&inner, "solo");

        move_train(&mut inner, Some(player), mv(1, 1, 1)).unwrap();
        tick(&mut inner, None);

        let train = &inner.map.trains[&1];
        assert_eq!(train.line_idx, 1);
        assert_eq!(train.position, 1);
        assert_eq!(train.speed, 0, "no queued move, train stops at the market");
        assert_eq!(train.goods, 5);
        assert_eq!(train.post_type, Some(PostType::Market));
        assert_eq!(inner.map.posts[&4].snapshot(true)["product"], 0);

        move_train(&mut inner, Some(player), mv(1, -1, 1)).unwrap();
        tick(&mut inner, None);

        let train = &inner.map.trains[&1];
        assert_eq!(train.position, 0);
        assert_eq!(train.speed, 0);
        assert_eq!(train.goods, 0, "unloaded at the town");
        assert!(train.post_type.is_none());
        // 35 initial, +5 delivered, two ticks of consumption by 3 souls.
        assert_eq!(inner.map.posts[&1].snapshot(true)["product"], 34);
        // The market replenished by 1 while the train was away.
        assert_eq!(inner.map.posts[&4].snapshot(true)["product"], 1);
    }

    #[test]
    fn test_market_keeps_feeding_a_parked_train() {
        let mut inner = solo("map02", ServerConfig::testing());
        let player = player_id(&inner, "solo");
        move_train(&mut inner, Some(player), mv(1, 1, 1)).unwrap();
        tick(&mut inner, None); // arrive, load 5
        tick(&mut inner, None); // market replenished 1, parked train takes it
        assert_eq!(inner.map.trains[&1].goods, 6);
    }

    #[test]
    fn test_armor_haul_overflows_town_capacity() {
        // town-alpha (armor 80/100) and the storage (armor 30) sit three
        // units apart on line 3.
        let mut inner = solo("map03", ServerConfig::testing());
        let player = player_id(&inner, "solo");

        move_train(&mut inner, Some(player), mv(1, 1, 3)).unwrap();
        for _ in 0..3 {
            tick(&mut inner, None);
        }
        let train = &inner.map.trains[&1];
        assert_eq!(train.goods, 30);
        assert_eq!(train.post_type, Some(PostType::Storage));
        assert_eq!(inner.map.posts[&4].snapshot(true)["armor"], 0);

        move_train(&mut inner, Some(player), mv(1, -1, 3)).unwrap();
        for _ in 0..3 {
            tick(&mut inner, None);
        }
        let town = inner.map.posts[&1].as_town().unwrap();
        assert_eq!(town.armor, 100, "only 20 of the 30 fit");
        assert!(
            inner.map.posts[&1]
                .events
                .iter()
                .any(|e| e.kind == EventType::ResourceOverflow),
            "hitting the armor cap is reported to the owner"
        );
        let train = &inner.map.trains[&1];
        assert_eq!(train.goods, 0, "the rest is lost on a full unload");
        assert!(train.post_type.is_none());
    }

    #[test]
    fn test_cargo_kinds_do_not_mix() {
        let mut inner = solo("map03", ServerConfig::testing());
        // A train carrying armor stops at the market: nothing loads.
        {
            let train = inner.map.trains.get_mut(&1).unwrap();
            train.post_type = Some(PostType::Storage);
            train.goods = 5;
            train.line_idx = 1;
            train.position = inner.map.lines[&1].length;
        }
        tick(&mut inner, None);
        let train = &inner.map.trains[&1];
        assert_eq!(train.goods, 5);
        assert_eq!(train.post_type, Some(PostType::Storage));
        assert_eq!(
            inner.map.posts[&3].snapshot(true)["product"],
            30,
            "market untouched"
        );
    }

    #[test]
    fn test_move_rejects_unknown_ids_and_foreign_trains() {
        let mut inner = inner_on("map03", ServerConfig::testing(), &["a", "b"]);
        let a = player_id(&inner, "a");
        let b = player_id(&inner, "b");
        let b_train = inner.players[&b].trains[0];

        assert!(matches!(
            move_train(&mut inner, Some(a), mv(99, 1, 1)),
            Err(ServerError::ResourceNotFound(_))
        ));
        assert!(matches!(
            move_train(&mut inner, Some(a), mv(1, 1, 99)),
            Err(ServerError::ResourceNotFound(_))
        ));
        assert!(matches!(
            move_train(&mut inner, Some(a), mv(b_train, 1, 1)),
            Err(ServerError::AccessDenied(_))
        ));
        // Observer playback skips the ownership check.
        assert!(move_train(&mut inner, None, mv(b_train, 0, 1)).is_ok());
    }

    #[test]
    fn test_move_from_endpoint_onto_touching_line() {
        let mut inner = solo("map02", ServerConfig::testing());
        let player = player_id(&inner, "solo");
        // Train parked at point 1; line 18 (6-1) touches it.
        move_train(&mut inner, Some(player), mv(1, -1, 18)).unwrap();
        let train = &inner.map.trains[&1];
        assert_eq!(train.line_idx, 18);
        assert_eq!(train.position, inner.map.lines[&18].length);
        assert_eq!(train.speed, -1);
    }

    #[test]
    fn test_move_from_endpoint_onto_disconnected_line_fails() {
        let mut inner = solo("map02", ServerConfig::testing());
        let player = player_id(&inner, "solo");
        // Line 10 (10-11) does not touch point 1.
        assert!(matches!(
            move_train(&mut inner, Some(player), mv(1, 1, 10)),
            Err(ServerError::BadCommand(_))
        ));
    }

    #[test]
    fn test_stopped_mid_line_cannot_switch() {
        let mut inner = solo("map02", ServerConfig::testing());
        let player = player_id(&inner, "solo");
        // Run one unit into line 13 (length 2), then stop.
        move_train(&mut inner, Some(player), mv(1, 1, 13)).unwrap();
        tick(&mut inner, None);
        move_train(&mut inner, Some(player), mv(1, 0, 13)).unwrap();
        tick(&mut inner, None);
        assert_eq!(inner.map.trains[&1].position, 1);

        assert!(matches!(
            move_train(&mut inner, Some(player), mv(1, 1, 1)),
            Err(ServerError::BadCommand(_))
        ));
        // Continuing on the same line is fine.
        move_train(&mut inner, Some(player), mv(1, -1, 13)).unwrap();
        tick(&mut inner, None);
        assert_eq!(inner.map.trains[&1].position, 0);
    }

    #[test]
    fn test_deferred_switch_applies_at_the_endpoint() {
        let mut inner = solo("map02", ServerConfig::testing());
        let player = player_id(&inner, "solo");
        // Moving along line 13 (1-2, length 2) towards point 2; line 14
        // (2-3) starts there.
        move_train(&mut inner, Some(player), mv(1, 1, 13)).unwrap();
        tick(&mut inner, None);
        move_train(&mut inner, Some(player), mv(1, 1, 14)).unwrap();
        assert!(inner.next_train_moves.contains_key(&1));
        tick(&mut inner, None);

        let train = &inner.map.trains[&1];
        assert_eq!(train.line_idx, 14);
        assert_eq!(train.position, 0);
        assert_eq!(train.speed, 1);
        assert!(inner.next_train_moves.is_empty());
    }

    #[test]
    fn test_incompatible_deferred_switch_rejected() {
        let mut inner = solo("map02", ServerConfig::testing());
        let player = player_id(&inner, "solo");
        move_train(&mut inner, Some(player), mv(1, 1, 13)).unwrap();
        tick(&mut inner, None);
        // Line 18 touches point 1 (behind the train), not point 2.
        assert!(matches!(
            move_train(&mut inner, Some(player), mv(1, 1, 18)),
            Err(ServerError::BadCommand(_))
        ));
    }

    #[test]
    fn test_head_on_collision_on_one_line() {
        let mut inner = solo("map02", ServerConfig::testing());
        let player = player_id(&inner, "solo");
        // Both trains onto line 13 (length 2) the same tick.
        move_train(&mut inner, Some(player), mv(1, 1, 13)).unwrap();
        move_train(&mut inner, Some(player), mv(2, 1, 13)).unwrap();
        tick(&mut inner, None);

        for idx in [1u32, 2] {
            let train = &inner.map.trains[&idx];
            assert_eq!(train.speed, 0);
            assert_eq!(train.goods, 0);
            assert_eq!(train.cooldown, 2, "level 1 town collision cooldown");
            let line = inner.map.lines[&train.line_idx];
            assert_eq!(line.position_of(1), Some(train.position), "back home");
            let collision: Vec<_> = train
                .events
                .iter()
                .filter(|e| e.kind == EventType::TrainCollision)
                .collect();
            assert_eq!(collision.len(), 1);
            let other = if idx == 1 { 2 } else { 1 };
            assert_eq!(collision[0].train, Some(other));
        }

        // MOVE during cooldown is rejected, and works again after it.
        assert!(matches!(
            move_train(&mut inner, Some(player), mv(1, 1, 13)),
            Err(ServerError::BadCommand(_))
        ));
        tick(&mut inner, None);
        tick(&mut inner, None);
        assert_eq!(inner.map.trains[&1].cooldown, 0);
        assert!(move_train(&mut inner, Some(player), mv(1, 1, 13)).is_ok());
    }

    #[test]
    fn test_adjacent_trains_meeting_head_on_collide() {
        let mut inner = solo("map02", ServerConfig::testing());
        // Place the trains by hand on line 11 (length 3), approaching.
        {
            let train = inner.map.trains.get_mut(&1).unwrap();
            train.line_idx = 11;
            train.position = 0;
            train.speed = 1;
        }
        {
            let train = inner.map.trains.get_mut(&2).unwrap();
            train.line_idx = 11;
            train.position = 3;
            train.speed = -1;
        }
        // After one tick they are at 1 and 2, adjacent and converging.
        tick(&mut inner, None);
        assert!(
            inner.map.trains.values().all(|t| t.cooldown == 2),
            "both trains sent home with a cooldown"
        );
    }

    #[test]
    fn test_trains_parked_at_their_town_do_not_collide() {
        let mut inner = solo("map02", ServerConfig::testing());
        tick(&mut inner, None);
        for train in inner.map.trains.values() {
            assert!(train.events.is_empty());
            assert_eq!(train.cooldown, 0);
        }
    }

    #[test]
    fn test_collisions_can_be_disabled() {
        let mut config = ServerConfig::testing();
        config.collisions_enabled = false;
        let mut inner = solo("map02", config);
        let player = player_id(&inner, "solo");
        move_train(&mut inner, Some(player), mv(1, 1, 13)).unwrap();
        move_train(&mut inner, Some(player), mv(2, 1, 13)).unwrap();
        tick(&mut inner, None);
        assert!(inner.map.trains.values().all(|t| t.cooldown == 0));
        assert_eq!(inner.map.trains[&1].position, 1);
    }

    #[test]
    fn test_town_consumption_and_starvation() {
        let mut inner = solo("map02", ServerConfig::testing());
        // town-one: population 3, product 35.
        tick(&mut inner, None);
        let town = inner.map.posts[&1].as_town().unwrap();
        assert_eq!(town.population, 3);
        assert_eq!(town.product, 32);

        // Drain the product; population starts to starve.
        inner
            .map
            .posts
            .get_mut(&1)
            .unwrap()
            .as_town_mut()
            .unwrap()
            .product = 0;
        tick(&mut inner, None);
        let town = inner.map.posts[&1].as_town().unwrap();
        assert_eq!(town.population, 2);
    }

    #[test]
    fn test_game_over_on_empty_town() {
        let mut inner = solo("map02", ServerConfig::testing());
        {
            let town = inner.map.posts.get_mut(&1).unwrap().as_town_mut().unwrap();
            town.product = 0;
            town.population = 1;
        }
        tick(&mut inner, None);
        let post = &inner.map.posts[&1];
        assert_eq!(post.as_town().unwrap().population, 0);
        assert!(
            post.events
                .iter()
                .any(|e| e.kind == EventType::GameOver)
        );
    }

    #[test]
    fn test_fuel_exhaustion_sends_train_home() {
        let mut config = ServerConfig::testing();
        config.fuel_enabled = true;
        let mut inner = solo("map02", config);
        let player = player_id(&inner, "solo");
        inner.map.trains.get_mut(&1).unwrap().fuel = 0;
        move_train(&mut inner, Some(player), mv(1, 1, 13)).unwrap();
        tick(&mut inner, None);

        let train = &inner.map.trains[&1];
        assert_eq!(train.speed, 0);
        assert_eq!(train.cooldown, 2);
        let line = inner.map.lines[&train.line_idx];
        assert_eq!(line.position_of(1), Some(train.position));
    }

    #[test]
    fn test_full_game_state_survives_engine_use() {
        let mut inner = solo("map02", ServerConfig::testing());
        assert_eq!(inner.state, GameState::Run);
        let player = player_id(&inner, "solo");
        move_train(&mut inner, Some(player), mv(1, 1, 1)).unwrap();
        for _ in 0..6 {
            tick(&mut inner, None);
        }
        // Invariants: positions in range, goods within capacity.
        for train in inner.map.trains.values() {
            let line = inner.map.lines[&train.line_idx];
            assert!(train.position <= line.length);
            assert!(train.goods <= train.goods_capacity);
            assert_eq!(train.goods == 0, train.post_type.is_none());
        }
        for post in inner.map.posts.values() {
            if let Some(town) = post.as_town() {
                assert!(town.population <= town.population_capacity);
                assert!(town.product <= town.product_capacity);
                assert!(town.armor <= town.armor_capacity);
            }
        }
    }
}
