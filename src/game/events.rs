//! Random world events: refugees, hijackers, parasites.
//!
//! Each class rolls independently on every tick where its cooldown is
//! down, mutates every owned town, and arms its cooldown proportionally
//! to the power it rolled.

use rand::Rng;

use crate::db::replay::ReplayLog;
use crate::game::GameInner;
use crate::models::event::Event;
use crate::models::post::PostKind;
use crate::protocol::Action;

pub(crate) fn run_random_events(inner: &mut GameInner, tick_no: u64, replay: Option<&ReplayLog>) {
    refugees_arrival(inner, tick_no, replay);
    hijackers_assault(inner, tick_no, replay);
    parasites_assault(inner, tick_no, replay);
}

/// Rolls 1..=100 against the class probability; `None` when the event
/// does not happen, otherwise the drawn power.
fn roll(inner: &mut GameInner, probability: u32, range: (u32, u32)) -> Option<u32> {
    if probability == 0 {
        return None;
    }
    if inner.rng.random_range(1..=100) > probability {
        return None;
    }
    Some(inner.rng.random_range(range.0..=range.1))
}

fn record(replay: Option<&ReplayLog>, event: &Event) {
    if let Some(replay) = replay {
        if let Ok(message) = serde_json::to_string(event) {
            replay.add_action(Action::Event.code(), Some(&message));
        }
    }
}

fn refugees_arrival(inner: &mut GameInner, tick_no: u64, replay: Option<&ReplayLog>) {
    if inner.event_cooldowns.refugees > 0 {
        return;
    }
    let odds = inner.config.events.refugees;
    let Some(number) = roll(inner, odds.probability, odds.power_range) else {
        return;
    };
    tracing::info!(number, tick = tick_no, "refugees arrived");
    for post in inner.map.posts.values_mut() {
        let PostKind::Town(town) = &mut post.kind else {
            continue;
        };
        if town.player_id.is_none() {
            continue;
        }
        let (_, hit_cap) = town.add_population(number);
        post.events.push(Event::refugees_arrival(tick_no, number));
        if hit_cap {
            post.events
                .push(Event::population_overflow(tick_no, town.population));
        }
    }
    inner.event_cooldowns.refugees = odds.cooldown_coef * number;
    record(replay, &Event::refugees_arrival(tick_no, number));
}

fn hijackers_assault(inner: &mut GameInner, tick_no: u64, replay: Option<&ReplayLog>) {
    if inner.event_cooldowns.hijackers > 0 {
        return;
    }
    let odds = inner.config.events.hijackers;
    let Some(power) = roll(inner, odds.probability, odds.power_range) else {
        return;
    };
    tracing::info!(power, tick = tick_no, "hijackers assault");
    for post in inner.map.posts.values_mut() {
        let PostKind::Town(town) = &mut post.kind else {
            continue;
        };
        if town.player_id.is_none() {
            continue;
        }
        // Armor absorbs the blow; whatever gets through costs lives.
        let breach = power.saturating_sub(town.armor);
        let population_before = town.population;
        town.population = town.population.saturating_sub(breach);
        town.armor = town.armor.saturating_sub(power);
        post.events.push(Event::hijackers_assault(tick_no, power));
        if population_before > 0 && town.population == 0 {
            post.events.push(Event::game_over(tick_no));
        }
    }
    inner.event_cooldowns.hijackers = odds.cooldown_coef * power;
    record(replay, &Event::hijackers_assault(tick_no, power));
}

fn parasites_assault(inner: &mut GameInner, tick_no: u64, replay: Option<&ReplayLog>) {
    if inner.event_cooldowns.parasites > 0 {
        return;
    }
    let odds = inner.config.events.parasites;
    let Some(power) = roll(inner, odds.probability, odds.power_range) else {
        return;
    };
    tracing::info!(power, tick = tick_no, "parasites assault");
    for post in inner.map.posts.values_mut() {
        let PostKind::Town(town) = &mut post.kind else {
            continue;
        };
        if town.player_id.is_none() {
            continue;
        }
        town.product = town.product.saturating_sub(power);
        post.events.push(Event::parasites_assault(tick_no, power));
    }
    inner.event_cooldowns.parasites = odds.cooldown_coef * power;
    record(replay, &Event::parasites_assault(tick_no, power));
}

#[cfg(test)]
mod tests {
    use crate::config::{EventOdds, ServerConfig};
    use crate::game::engine;
    use crate::game::test_support::solo;
    use crate::models::event::EventType;

    #[test]
    fn test_refugee_cadence_follows_cooldown() {
        // 100% probability, power 1, coefficient 5: arrivals land on
        // ticks 1 and 6 only over a six-tick run.
        let mut inner = solo("map02", ServerConfig::testing_with_events());
        let mut arrivals = Vec::new();
        for tick in 1..=6u64 {
            engine::tick(&mut inner, None);
            let events = &inner.map.posts[&1].events;
            if events
                .iter()
                .any(|e| e.kind == EventType::RefugeesArrival && e.tick == tick)
            {
                arrivals.push(tick);
            }
        }
        assert_eq!(arrivals, vec![1, 6]);
        let town = inner.map.posts[&1].as_town().unwrap();
        assert_eq!(town.population, 5, "3 souls plus two refugees");
    }

    #[test]
    fn test_hijackers_armor_absorbs_power() {
        let mut config = ServerConfig::testing();
        config.events.hijackers = EventOdds {
            probability: 100,
            power_range: (2, 2),
            cooldown_coef: 5,
        };
        let mut inner = solo("map03", config);
        // town-alpha: population 4, armor 80. Armor eats the whole blow.
        engine::tick(&mut inner, None);
        let town = inner.map.posts[&1].as_town().unwrap();
        assert_eq!(town.population, 4);
        assert_eq!(town.armor, 78);
        assert!(
            inner.map.posts[&1]
                .events
                .iter()
                .any(|e| e.kind == EventType::HijackersAssault)
        );
    }

    #[test]
    fn test_hijackers_breach_costs_population() {
        let mut config = ServerConfig::testing();
        config.events.hijackers = EventOdds {
            probability: 100,
            power_range: (3, 3),
            cooldown_coef: 5,
        };
        let mut inner = solo("map02", config);
        // town-one has no armor at all.
        engine::tick(&mut inner, None);
        let town = inner.map.posts[&1].as_town().unwrap();
        assert_eq!(town.population, 0);
        assert_eq!(town.armor, 0);
    }

    #[test]
    fn test_parasites_eat_product() {
        let mut config = ServerConfig::testing();
        config.events.parasites = EventOdds {
            probability: 100,
            power_range: (4, 4),
            cooldown_coef: 5,
        };
        let mut inner = solo("map02", config);
        engine::tick(&mut inner, None);
        let town = inner.map.posts[&1].as_town().unwrap();
        // 35 initial, -4 parasites... minus the 3 the population ate first.
        assert_eq!(town.product, 28);
        assert!(
            inner.map.posts[&1]
                .events
                .iter()
                .any(|e| e.kind == EventType::ParasitesAssault)
        );
    }

    #[test]
    fn test_disabled_events_never_fire() {
        let mut inner = solo("map02", ServerConfig::testing());
        for _ in 0..5 {
            engine::tick(&mut inner, None);
        }
        assert!(
            inner.map.posts[&1]
                .events
                .iter()
                .all(|e| e.kind != EventType::RefugeesArrival
                    && e.kind != EventType::HijackersAssault
                    && e.kind != EventType::ParasitesAssault)
        );
    }
}
