//! Run lifecycle
//!
//! Builds a run from a seed and moves it between levels: board setup from a
//! level descriptor, leaving the shop, and finishing the tutorial. Upgrades,
//! anomalies, score, currency and shields carry over between levels.

use glam::IVec2;

use super::boss::new_boss;
use super::enemy::{new_enemy, spawn_enemy};
use super::geometry::WallMap;
use super::layout::parse_layout;
use super::shop::ShopError;
use super::spawn::{find_safe_start, spawn_coins, spawn_pickups_if_needed};
use super::state::{AnomalyKind, EnemyBehavior, GameState, GameStatus, Segment, ShopState};
use crate::consts::*;
use crate::levels::{LevelData, level_for};
use crate::tuning::Tuning;

/// Extra enemies per level under the congestion anomaly
const CONGESTION_EXTRA: u32 = 2;
const MAX_LEVEL_COINS: u32 = 8;

/// Start a fresh run at `start_level_id` (0 plays the tutorial)
pub fn new_run(seed: u64, tuning: Tuning, start_level_id: u32, now: u64) -> GameState {
    let mut state = GameState::with_tuning(seed, tuning);
    let level = level_for(start_level_id, &mut state.rng);
    start_level(&mut state, &level, now);
    log::info!("New run (seed {}) starting at level {}", seed, start_level_id);
    state
}

/// Load `level` into the run, keeping everything the run has earned
pub fn start_level(state: &mut GameState, level: &LevelData, now: u64) {
    let parsed = parse_layout(&level.layout);
    state.walls = parsed.walls;
    state.segments.clear();
    state.enemies.clear();
    state.pickups.clear();
    state.coins.clear();
    state.portal = None;
    state.secret_portal = None;
    state.secret_portal_spawned = false;
    state.boss = None;

    for spawn in &parsed.enemies {
        let id = state.next_entity_id();
        let enemy = new_enemy(id, spawn.pos, spawn.behavior, now, &mut state.rng);
        state.enemies.push(enemy);
    }

    // chassis first so bonus enemies keep their distance from it
    let start = find_safe_start(&state.walls, &state.enemies);
    let head_id = state.next_entity_id();
    state.segments.push(Segment::head(head_id, start, now));
    state.direction = IVec2::ZERO;

    let map = WallMap::new(&state.walls);
    let mut bonus = level.enemy_count_bonus;
    if state.has_anomaly(AnomalyKind::Congestion) {
        bonus += CONGESTION_EXTRA;
    }
    for n in 0..bonus as usize {
        let behavior = if level.enemy_types.is_empty() {
            EnemyBehavior::Patrol
        } else {
            level.enemy_types[n % level.enemy_types.len()]
        };
        spawn_enemy(state, &map, behavior, now);
    }

    state.level_id = level.id;
    state.level_name = level.name.clone();
    state.integrity = level.integrity;
    state.required_sequence = level.sequence.clone();
    state.sequence_matched = false;
    state.pending_type = None;
    state.tick_rate = level.tick_rate;
    state.fill_chain = 0;
    state.level_started_at = now;
    state.last_trap_shift_at = now;
    state.countdown_until = now + state.tuning.countdown_ms;
    state.paused_from = None;
    state.status = if level.id == TUTORIAL_LEVEL {
        GameStatus::Tutorial
    } else {
        GameStatus::Countdown
    };

    state.buffs.invulnerable_until = 0;
    state.buffs.stasis_until = 0;
    state.buffs.ability_active_until = 0;
    state.buffs.ability_cooldown_until = 0;

    state.shop = ShopState::default();
    state.evasion = None;
    state.game_over_reason = None;
    state.game_over_at = None;

    if state.is_boss_level() {
        let boss = new_boss(state, &map, level.id, now);
        state.boss = Some(boss);
    }
    spawn_pickups_if_needed(state, &map);
    let coins = (3 + level.id / 2).min(MAX_LEVEL_COINS);
    spawn_coins(state, &map, coins as usize);

    log::info!(
        "Level {} '{}' started: integrity {}, sequence {:?}, {} enemies",
        state.level_id,
        state.level_name,
        state.integrity,
        state.required_sequence,
        state.enemies.len()
    );
}

/// Id of the level after `current`; custom levels continue the campaign
pub fn next_level_id(current: u32) -> u32 {
    if current == CUSTOM_LEVEL_ID { 1 } else { current + 1 }
}

/// Close the shop and load the next level
pub fn leave_shop(state: &mut GameState, now: u64) -> Result<(), ShopError> {
    if state.status != GameStatus::LevelUp {
        return Err(ShopError::Closed);
    }
    let next = next_level_id(state.level_id);
    let level = level_for(next, &mut state.rng);
    start_level(state, &level, now);
    Ok(())
}

/// Leave the tutorial summary for level 1. Returns false unless the
/// tutorial was just completed.
pub fn finish_tutorial(state: &mut GameState, now: u64) -> bool {
    if state.status != GameStatus::TutorialSummary {
        return false;
    }
    let level = level_for(1, &mut state.rng);
    start_level(state, &level, now);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_center;
    use crate::sim::geometry::distance;
    use crate::sim::layout::tests::layout_with;
    use crate::sim::shop::{apply_upgrade, open_shop, purchase};
    use crate::sim::state::{MatterType, PickupKind, UpgradeKind};

    fn custom(cells: &[(i32, i32, char)]) -> LevelData {
        LevelData {
            id: CUSTOM_LEVEL_ID,
            name: "Custom".to_string(),
            integrity: 4,
            sequence: vec![MatterType::Beta],
            layout: layout_with(cells),
            enemy_count_bonus: 0,
            enemy_types: Vec::new(),
            tick_rate: 100,
        }
    }

    #[test]
    fn test_new_run_places_head_and_matter() {
        let state = new_run(11, Tuning::default(), 1, 0);
        assert_eq!(state.status, GameStatus::Countdown);
        assert_eq!(state.countdown_until, 3_000);
        assert_eq!(state.segments.len(), 1);
        assert_eq!(state.head_pos(), grid_center());
        for matter in MatterType::ALL {
            assert!(state.pickups.iter().any(|p| p.kind == PickupKind::Matter(matter)));
        }
        assert!(!state.coins.is_empty());
        assert!(state.boss.is_none());
    }

    #[test]
    fn test_tutorial_starts_in_tutorial_status() {
        let state = new_run(2, Tuning::default(), TUTORIAL_LEVEL, 0);
        assert_eq!(state.status, GameStatus::Tutorial);
        assert_eq!(state.integrity, 2);
        assert!(state.is_tutorial());
    }

    #[test]
    fn test_boss_level_spawns_boss() {
        let state = new_run(3, Tuning::default(), 5, 0);
        assert!(state.is_boss_level());
        assert!(state.boss.is_some());
        assert!(state.required_sequence.is_empty());
    }

    #[test]
    fn test_layout_enemies_and_bonus_enemies() {
        let mut state = GameState::new(4);
        let mut level = custom(&[(3, 3, 'S'), (36, 26, 'C')]);
        level.enemy_count_bonus = 2;
        level.enemy_types = vec![EnemyBehavior::Ghost];
        start_level(&mut state, &level, 0);
        assert_eq!(state.enemies.len(), 4);
        assert_eq!(
            state.enemies.iter().filter(|e| e.behavior == EnemyBehavior::Ghost).count(),
            2
        );
        assert!(state.enemies.iter().any(|e| e.pos == IVec2::new(3, 3)));
    }

    #[test]
    fn test_congestion_adds_enemies() {
        let mut state = GameState::new(4);
        state.modifiers.push(AnomalyKind::Congestion.modifier());
        start_level(&mut state, &custom(&[]), 0);
        assert_eq!(state.enemies.len(), CONGESTION_EXTRA as usize);
        assert!(state.enemies.iter().all(|e| e.behavior == EnemyBehavior::Patrol));
    }

    #[test]
    fn test_start_keeps_run_progress_and_shields() {
        let mut state = GameState::new(6);
        state.score = 900;
        state.currency = 12;
        state.buffs.shields = 1;
        state.buffs.invulnerable_until = 50_000;
        apply_upgrade(&mut state.upgrades, UpgradeKind::Magnet);
        start_level(&mut state, &custom(&[]), 1_000);
        assert_eq!(state.score, 900);
        assert_eq!(state.currency, 12);
        assert_eq!(state.buffs.shields, 1);
        assert_eq!(state.buffs.invulnerable_until, 0);
        assert_eq!(state.upgrades.len(), 1);
        assert_eq!(state.required_sequence, vec![MatterType::Beta]);
        assert_eq!(state.tick_rate, 100);
    }

    #[test]
    fn test_start_avoids_blocked_centre() {
        let mut cells = Vec::new();
        for y in 11..20 {
            for x in 16..25 {
                cells.push((x, y, '#'));
            }
        }
        let mut state = GameState::new(1);
        start_level(&mut state, &custom(&cells), 0);
        let head = state.head_pos();
        assert!(state.walls.iter().all(|w| !w.contains(head)));
        assert!(distance(head, grid_center()) > 4.0);
    }

    #[test]
    fn test_leave_shop_advances_level() {
        let mut state = new_run(8, Tuning::default(), 3, 0);
        assert_eq!(leave_shop(&mut state, 10), Err(ShopError::Closed));

        open_shop(&mut state, true);
        purchase(&mut state, 0).unwrap();
        leave_shop(&mut state, 10).unwrap();
        assert_eq!(state.level_id, 4);
        assert_eq!(state.status, GameStatus::Countdown);
        assert_eq!(state.upgrades.len(), 1);
        assert!(state.shop.offers.is_empty());
    }

    #[test]
    fn test_custom_level_continues_at_one() {
        assert_eq!(next_level_id(CUSTOM_LEVEL_ID), 1);
        assert_eq!(next_level_id(4), 5);
    }

    #[test]
    fn test_finish_tutorial_only_from_summary() {
        let mut state = new_run(5, Tuning::default(), TUTORIAL_LEVEL, 0);
        assert!(!finish_tutorial(&mut state, 100));
        state.status = GameStatus::TutorialSummary;
        assert!(finish_tutorial(&mut state, 100));
        assert_eq!(state.level_id, 1);
        assert_eq!(state.status, GameStatus::Countdown);
    }
}
