//! Level upgrades for towns and trains.
//!
//! A single request may mix posts and trains; it is validated as a whole
//! and applied atomically: either every entity levels up and the armor
//! is deducted, or nothing changes.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::errors::ServerError;
use crate::game::GameInner;
use crate::protocol::UpgradeRequest;

pub(crate) fn make_upgrade(
    inner: &mut GameInner,
    player_idx: Uuid,
    req: &UpgradeRequest,
) -> Result<(), ServerError> {
    let player = inner
        .players
        .get(&player_idx)
        .ok_or_else(|| ServerError::AccessDenied("login required".into()))?;
    let town_id = player.town;
    let home_point = player.home;

    let post_ids: BTreeSet<u32> = req.post.iter().copied().collect();
    let train_ids: BTreeSet<u32> = req.train.iter().copied().collect();
    let mut cost: u32 = 0;

    for id in &post_ids {
        let post = inner
            .map
            .posts
            .get(id)
            .ok_or_else(|| ServerError::ResourceNotFound(format!("no such post: {id}")))?;
        let town = post
            .as_town()
            .ok_or_else(|| ServerError::BadCommand("only towns can be upgraded".into()))?;
        if town.player_id != Some(player_idx) {
            return Err(ServerError::AccessDenied(
                "the town belongs to another player".into(),
            ));
        }
        let price = town.next_level_price.ok_or_else(|| {
            ServerError::BadCommand(format!("post {id} is already at the top level"))
        })?;
        cost += price;
    }

    for id in &train_ids {
        let train = inner
            .map
            .trains
            .get(id)
            .ok_or_else(|| ServerError::ResourceNotFound(format!("no such train: {id}")))?;
        if train.player_id != player_idx {
            return Err(ServerError::AccessDenied(
                "the train belongs to another player".into(),
            ));
        }
        let price = train.next_level_price.ok_or_else(|| {
            ServerError::BadCommand(format!("train {id} is already at the top level"))
        })?;
        let at_home = inner
            .map
            .lines
            .get(&train.line_idx)
            .and_then(|line| line.position_of(home_point))
            == Some(train.position);
        if !at_home {
            return Err(ServerError::BadCommand(format!(
                "train {id} has to be at its town to upgrade"
            )));
        }
        cost += price;
    }

    let armor = inner
        .map
        .posts
        .get(&town_id)
        .and_then(|p| p.as_town())
        .map(|t| t.armor)
        .ok_or(ServerError::Internal)?;
    if cost > armor {
        return Err(ServerError::BadCommand(format!(
            "not enough armor: have {armor}, need {cost}"
        )));
    }

    tracing::info!(
        player = %player_idx,
        posts = post_ids.len(),
        trains = train_ids.len(),
        cost,
        "upgrade"
    );
    inner
        .map
        .posts
        .get_mut(&town_id)
        .and_then(|p| p.as_town_mut())
        .expect("checked above")
        .armor -= cost;
    for id in post_ids {
        inner
            .map
            .posts
            .get_mut(&id)
            .and_then(|p| p.as_town_mut())
            .expect("validated above")
            .level_up();
    }
    for id in train_ids {
        inner
            .map
            .trains
            .get_mut(&id)
            .expect("validated above")
            .level_up();
    }
    Ok(())
}
