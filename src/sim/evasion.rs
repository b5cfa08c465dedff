//! Evasion run
//!
//! A short lane-dodging minigame reached through the secret portal. It runs on
//! its own fixed 30 ms step over a continuous 40x30 field: obstacle rows scroll
//! down toward the player, each row leaves exactly one gap, and coins may sit
//! in the gap.

use glam::Vec2;
use rand::Rng;

use super::event::{SoundEffect, VfxEvent, VfxKind};
use super::geometry::aabb_overlap_f;
use super::shop::open_shop;
use super::state::{EvasionCoin, EvasionObstacle, EvasionState, GameState, GameStatus};
use super::tick::{TickInput, TickOutput};
use crate::consts::*;

pub const PLAYER_WIDTH: f32 = 2.0;
pub const PLAYER_HEIGHT: f32 = 1.0;
/// Player row (top edge)
pub const PLAYER_Y: f32 = (GRID_HEIGHT - 3) as f32;
pub const COIN_SIZE: f32 = 1.0;
/// Lateral speed (cells per second)
const LATERAL_SPEED: f32 = 20.0;
const COIN_IN_GAP_CHANCE: f64 = 0.5;

/// Scroll speed in cells per second for `level`
pub fn scroll_speed(level: u32) -> f32 {
    (8.0 + 2.0 * level.saturating_sub(1) as f32).min(20.0)
}

/// Milliseconds between obstacle rows
pub fn row_interval_ms(level: u32) -> u64 {
    1_400u64.saturating_sub(100 * level.saturating_sub(1) as u64).max(600)
}

/// Width of the single gap in each row (cells)
pub fn gap_width(level: u32) -> f32 {
    (8.0 - level.saturating_sub(1) as f32).max(4.0)
}

/// Switch the run into evasion mode
pub fn enter_evasion(state: &mut GameState) {
    state.evasion = Some(EvasionState {
        player_x: (GRID_WIDTH as f32 - PLAYER_WIDTH) / 2.0,
        obstacles: Vec::new(),
        coins: Vec::new(),
        timer_ms: state.tuning.evasion_duration_ms,
        spawn_timer_ms: 0,
        scroll_offset: 0.0,
        coins_collected: 0,
    });
    state.status = GameStatus::Evasion;
    log::info!("Entering evasion run at level {}", state.evasion_level);
}

fn spawn_row(state: &mut GameState, evasion: &mut EvasionState) {
    let width = GRID_WIDTH as f32;
    let gap = gap_width(state.evasion_level);
    let gap_x = state.rng.random_range(0.0..=(width - gap)).floor();
    let y = -1.0;

    if gap_x > 0.0 {
        evasion.obstacles.push(EvasionObstacle {
            pos: Vec2::new(0.0, y),
            size: Vec2::new(gap_x, 1.0),
        });
    }
    let right = gap_x + gap;
    if right < width {
        evasion.obstacles.push(EvasionObstacle {
            pos: Vec2::new(right, y),
            size: Vec2::new(width - right, 1.0),
        });
    }
    if state.rng.random_bool(COIN_IN_GAP_CHANCE) {
        let x = gap_x + state.rng.random_range(0.0..=(gap - COIN_SIZE));
        evasion.coins.push(EvasionCoin { pos: Vec2::new(x, y) });
    }
}

fn bank(state: &mut GameState, collected: u32) -> u32 {
    let amount = collected * state.tuning.evasion_coin_value;
    state.currency += amount;
    amount
}

/// Advance the evasion run by one fixed step
pub fn process_evasion_tick(prev: &GameState, input: &TickInput) -> TickOutput {
    let mut state = prev.clone();
    let mut vfx = Vec::new();
    let mut sfx = Vec::new();

    if state.status != GameStatus::Evasion {
        return TickOutput::passive(state, input);
    }
    let Some(mut evasion) = state.evasion.take() else {
        state.status = GameStatus::EvasionFail;
        return TickOutput::passive(state, input);
    };

    let dt = EVASION_STEP_MS as f32 / 1000.0;
    let max_x = GRID_WIDTH as f32 - PLAYER_WIDTH;
    evasion.player_x = (evasion.player_x + input.direction.x.signum() as f32 * LATERAL_SPEED * dt).clamp(0.0, max_x);

    let dy = scroll_speed(state.evasion_level) * dt;
    for obstacle in &mut evasion.obstacles {
        obstacle.pos.y += dy;
    }
    for coin in &mut evasion.coins {
        coin.pos.y += dy;
    }
    evasion.scroll_offset = (evasion.scroll_offset + dy) % 1.0;
    let bottom = GRID_HEIGHT as f32;
    evasion.obstacles.retain(|o| o.pos.y < bottom);
    evasion.coins.retain(|c| c.pos.y < bottom);

    evasion.spawn_timer_ms += EVASION_STEP_MS;
    if evasion.spawn_timer_ms >= row_interval_ms(state.evasion_level) {
        evasion.spawn_timer_ms = 0;
        spawn_row(&mut state, &mut evasion);
    }

    let player_pos = Vec2::new(evasion.player_x, PLAYER_Y);
    let player_size = Vec2::new(PLAYER_WIDTH, PLAYER_HEIGHT);

    let crashed = evasion
        .obstacles
        .iter()
        .any(|o| aabb_overlap_f(player_pos, player_size, o.pos, o.size));
    if crashed {
        let banked = bank(&mut state, evasion.coins_collected);
        state.status = GameStatus::EvasionFail;
        vfx.push(VfxEvent {
            kind: VfxKind::Debris,
            x: player_pos.x,
            y: player_pos.y,
            color: None,
        });
        sfx.push(SoundEffect::EvasionCrash);
        log::info!("Evasion run crashed, banked {}", banked);
    } else {
        let before = evasion.coins.len();
        let coin_size = Vec2::splat(COIN_SIZE);
        evasion
            .coins
            .retain(|c| !aabb_overlap_f(player_pos, player_size, c.pos, coin_size));
        let picked = (before - evasion.coins.len()) as u32;
        if picked > 0 {
            evasion.coins_collected += picked;
            sfx.push(SoundEffect::EvasionCoin);
        }

        evasion.timer_ms = evasion.timer_ms.saturating_sub(EVASION_STEP_MS);
        if evasion.timer_ms == 0 {
            let banked = bank(&mut state, evasion.coins_collected);
            state.evasion_level += 1;
            state.status = GameStatus::EvasionReward;
            sfx.push(SoundEffect::EvasionClear);
            log::info!("Evasion run cleared, banked {}", banked);
        }
    }

    state.evasion = Some(evasion);
    TickOutput {
        vfx_events: vfx,
        sfx,
        ..TickOutput::passive(state, input)
    }
}

/// Hand a finished evasion run to the shop; a clean run earns a free pick.
/// Returns false if no run was waiting to finish.
pub fn finish_evasion(state: &mut GameState) -> bool {
    let free_pick = match state.status {
        GameStatus::EvasionReward => true,
        GameStatus::EvasionFail => false,
        _ => return false,
    };
    state.evasion = None;
    open_shop(state, free_pick);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec2;

    fn evading() -> GameState {
        let mut state = GameState::new(9);
        state.level_id = 3;
        enter_evasion(&mut state);
        state
    }

    fn step(dir: i32) -> TickInput {
        TickInput {
            direction: IVec2::new(dir, 0),
            ..Default::default()
        }
    }

    #[test]
    fn test_timer_expiry_rewards_and_banks() {
        let mut state = evading();
        state.currency = 4;
        if let Some(ev) = state.evasion.as_mut() {
            ev.timer_ms = EVASION_STEP_MS;
            ev.coins_collected = 3;
        }
        let out = process_evasion_tick(&state, &step(0));
        assert_eq!(out.state.status, GameStatus::EvasionReward);
        assert_eq!(out.state.currency, 4 + 3 * state.tuning.evasion_coin_value);
        assert_eq!(out.state.evasion_level, 2);
        assert!(out.sfx.contains(&SoundEffect::EvasionClear));
    }

    #[test]
    fn test_obstacle_hit_fails_and_banks() {
        let mut state = evading();
        if let Some(ev) = state.evasion.as_mut() {
            ev.coins_collected = 2;
            ev.obstacles.push(EvasionObstacle {
                pos: Vec2::new(0.0, PLAYER_Y),
                size: Vec2::new(GRID_WIDTH as f32, 1.0),
            });
        }
        let out = process_evasion_tick(&state, &step(0));
        assert_eq!(out.state.status, GameStatus::EvasionFail);
        assert_eq!(out.state.currency, 2 * state.tuning.evasion_coin_value);
        assert_eq!(out.state.evasion_level, 1);
    }

    #[test]
    fn test_coin_pickup_counts() {
        let mut state = evading();
        let x = state.evasion.as_ref().unwrap().player_x;
        if let Some(ev) = state.evasion.as_mut() {
            ev.coins.push(EvasionCoin {
                pos: Vec2::new(x, PLAYER_Y),
            });
        }
        let out = process_evasion_tick(&state, &step(0));
        let ev = out.state.evasion.unwrap();
        assert_eq!(ev.coins_collected, 1);
        assert!(ev.coins.is_empty());
        assert_eq!(out.state.currency, 0);
    }

    #[test]
    fn test_player_clamped_to_field() {
        let mut state = evading();
        for _ in 0..200 {
            state = process_evasion_tick(&state, &step(-1)).state;
            if state.status != GameStatus::Evasion {
                break;
            }
        }
        assert!(state.evasion.unwrap().player_x >= 0.0);
    }

    #[test]
    fn test_rows_leave_exactly_one_gap() {
        let mut state = evading();
        let mut ev = state.evasion.take().unwrap();
        for _ in 0..20 {
            ev.obstacles.clear();
            spawn_row(&mut state, &mut ev);
            let covered: f32 = ev.obstacles.iter().map(|o| o.size.x).sum();
            assert!((GRID_WIDTH as f32 - covered - gap_width(state.evasion_level)).abs() < 1e-4);
            assert!(ev.obstacles.len() <= 2);
        }
    }

    #[test]
    fn test_difficulty_scales_with_level() {
        assert!(scroll_speed(5) > scroll_speed(1));
        assert!(row_interval_ms(5) < row_interval_ms(1));
        assert!(gap_width(5) < gap_width(1));
        assert_eq!(gap_width(50), 4.0);
    }

    #[test]
    fn test_finish_hands_run_to_shop() {
        let mut state = evading();
        state.status = GameStatus::EvasionReward;
        assert!(finish_evasion(&mut state));
        assert_eq!(state.status, GameStatus::LevelUp);
        assert!(state.shop.free_pick_available);
        assert!(state.evasion.is_none());

        let mut failed = evading();
        failed.status = GameStatus::EvasionFail;
        assert!(finish_evasion(&mut failed));
        assert!(!failed.shop.free_pick_available);

        let mut idle = evading();
        assert!(!finish_evasion(&mut idle));
    }

    #[test]
    fn test_game_tick_delegates_to_evasion() {
        let state = evading();
        let out = crate::sim::tick::process_game_tick(&state, &step(1));
        let before = state.evasion.as_ref().unwrap().player_x;
        assert!(out.state.evasion.unwrap().player_x > before);
    }
}
