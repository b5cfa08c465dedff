//! End-to-end runs through the public API: level setup, a full clear into the
//! shop and on to the next level, the tutorial loop, the evasion detour and
//! seed replay.

use glam::IVec2;

use serpent_core::consts::*;
use serpent_core::levels::LevelData;
use serpent_core::sim::state::{Pickup, Portal};
use serpent_core::sim::{
    GameState, GameStatus, MatterType, PickupKind, Segment, TickInput, TickOutput, finish_evasion, finish_tutorial,
    leave_shop, new_run, process_game_tick, purchase, start_level,
};
use serpent_core::tuning::Tuning;

const LEVEL_JSON: &str = r#"{
    "id": 3,
    "name": "Open Floor",
    "integrity": 1,
    "sequence": ["alpha"],
    "layout": [],
    "tickRate": 100
}"#;

fn tick(state: &GameState, direction: IVec2, now: u64) -> TickOutput {
    process_game_tick(
        state,
        &TickInput {
            direction,
            timestamp: now,
            ..Default::default()
        },
    )
}

/// Replace every pickup with a single matter pickup at `pos`
fn only_pickup(state: &mut GameState, pos: IVec2, matter: MatterType) {
    state.pickups.clear();
    let id = state.next_entity_id();
    state.pickups.push(Pickup {
        id,
        pos,
        kind: PickupKind::Matter(matter),
    });
}

/// Put the chassis one step left of `target`, heading right
fn line_up(state: &mut GameState, target: IVec2) {
    for (i, segment) in state.segments.iter_mut().enumerate() {
        segment.pos = target - IVec2::new(i as i32 + 1, 0);
    }
    state.direction = IVec2::X;
}

fn open_floor() -> GameState {
    let level = LevelData::from_json(LEVEL_JSON).unwrap();
    let mut state = GameState::new(21);
    start_level(&mut state, &level, 0);
    state.coins.clear();
    state
}

#[test]
fn test_descriptor_level_starts_with_countdown() {
    let state = open_floor();
    assert_eq!(state.status, GameStatus::Countdown);
    assert_eq!(state.level_name, "Open Floor");
    assert_eq!(state.required_sequence, vec![MatterType::Alpha]);
    assert_eq!(state.tick_rate, 100);
    assert_eq!(state.head_pos(), serpent_core::grid_center());

    // nothing moves before the countdown ends
    let out = tick(&state, IVec2::X, 1_000);
    assert_eq!(out.state.status, GameStatus::Countdown);
    assert_eq!(out.state.head_pos(), state.head_pos());
}

#[test]
fn test_clear_level_shop_and_advance() {
    let mut state = open_floor();
    let start = state.head_pos();
    let mut now = state.countdown_until;

    // grow an empty alpha segment
    only_pickup(&mut state, start + IVec2::X, MatterType::Alpha);
    state = tick(&state, IVec2::X, now).state;
    assert_eq!(state.status, GameStatus::Playing);
    assert_eq!(state.segments.len(), 2);
    assert_eq!(state.pending_type, Some(MatterType::Alpha));

    // fill it: integrity reached and the sequence matches
    now += 100;
    only_pickup(&mut state, start + IVec2::new(2, 0), MatterType::Alpha);
    state = tick(&state, IVec2::ZERO, now).state;
    assert_eq!(state.charged_count(), 1);
    assert!(state.sequence_matched);
    let portal = state.portal.expect("portal opens once integrity is reached");

    // step into the portal
    now += 100;
    state.pickups.clear();
    line_up(&mut state, portal.pos);
    let out = tick(&state, IVec2::ZERO, now);
    assert!(out.unlocks.contains(&"level_3".to_string()));
    let mut state = out.state;
    assert_eq!(state.status, GameStatus::LevelUp);
    assert!(state.shop.free_pick_available);
    assert_eq!(state.shop.offers.len(), 3);
    assert!(state.score >= state.tuning.level_clear_score);

    let offer = state.shop.offers[0].clone();
    purchase(&mut state, 0).unwrap();
    leave_shop(&mut state, now).unwrap();
    assert_eq!(state.level_id, 4);
    assert_eq!(state.status, GameStatus::Countdown);
    assert_eq!(state.segments.len(), 1);
    assert!(state.has_upgrade(offer.upgrade));
    if let Some(anomaly) = offer.anomaly {
        assert!(state.has_anomaly(anomaly));
    }
}

#[test]
fn test_tutorial_respawns_then_summarises() {
    let mut state = new_run(4, Tuning::default(), TUTORIAL_LEVEL, 0);
    assert_eq!(state.status, GameStatus::Tutorial);

    // hull breach in the tutorial respawns with code 98
    state.segments.truncate(1);
    state.segments[0].pos = IVec2::new(1, 15);
    let out = tick(&state, IVec2::NEG_X, 100);
    assert_eq!(out.tutorial_error, Some(98));
    assert!(out.reset_input);
    let mut state = out.state;
    assert_eq!(state.status, GameStatus::Tutorial);
    assert_eq!(state.segments.len(), 1);

    // charge past integrity and exit
    let head = state.head_pos();
    state.segments.push(Segment {
        charged: true,
        ..Segment::empty_body(900, head - IVec2::X, MatterType::Alpha, 0)
    });
    state.segments.push(Segment {
        charged: true,
        ..Segment::empty_body(901, head - IVec2::new(2, 0), MatterType::Beta, 0)
    });
    state.pickups.clear();
    state = tick(&state, IVec2::ZERO, 200).state;
    let portal = state.portal.expect("tutorial portal");
    line_up(&mut state, portal.pos);
    state.pickups.clear();
    let out = process_game_tick(
        &state,
        &TickInput {
            timestamp: 300,
            tutorial_step: 3,
            ..Default::default()
        },
    );
    assert_eq!(out.next_tutorial_step, 4);
    let mut state = out.state;
    assert_eq!(state.status, GameStatus::TutorialSummary);

    assert!(finish_tutorial(&mut state, 400));
    assert_eq!(state.level_id, 1);
}

#[test]
fn test_secret_portal_detour_ends_in_shop() {
    let mut state = open_floor();
    state.status = GameStatus::Playing;
    state.integrity = 10;
    state.pickups.clear();
    let secret = IVec2::new(30, 8);
    state.secret_portal = Some(Portal {
        pos: secret,
        expires_at: Some(50_000),
    });
    state.secret_portal_spawned = true;
    line_up(&mut state, secret);

    let out = tick(&state, IVec2::ZERO, 4_000);
    assert!(out.unlocks.contains(&"evasion".to_string()));
    let mut state = out.state;
    assert_eq!(state.status, GameStatus::Evasion);
    assert!(state.secret_portal.is_none());

    let mut now = 4_000;
    let limit = state.tuning.evasion_duration_ms / EVASION_STEP_MS + 10;
    for _ in 0..limit {
        if state.status != GameStatus::Evasion {
            break;
        }
        now += EVASION_STEP_MS;
        state = tick(&state, IVec2::ZERO, now).state;
    }
    assert!(matches!(
        state.status,
        GameStatus::EvasionReward | GameStatus::EvasionFail
    ));
    let rewarded = state.status == GameStatus::EvasionReward;

    assert!(finish_evasion(&mut state));
    assert_eq!(state.status, GameStatus::LevelUp);
    assert_eq!(state.shop.free_pick_available, rewarded);
    leave_shop(&mut state, now).unwrap();
    assert_eq!(state.level_id, 4);
}

#[test]
fn test_same_seed_replays_identically() {
    let inputs: Vec<IVec2> = (0..300)
        .map(|i| match (i * 7 + i / 13) % 5 {
            0 => IVec2::X,
            1 => IVec2::Y,
            2 => IVec2::NEG_X,
            3 => IVec2::NEG_Y,
            _ => IVec2::ZERO,
        })
        .collect();

    let play = |seed: u64| {
        let mut state = new_run(seed, Tuning::default(), 6, 0);
        let mut now = state.countdown_until;
        for &dir in &inputs {
            now += state.effective_tick_rate(now);
            state = tick(&state, dir, now).state;
        }
        serde_json::to_string(&state).unwrap()
    };

    assert_eq!(play(77), play(77));
    assert_ne!(play(77), play(78));
}

#[test]
fn test_state_round_trips_through_json() {
    let state = new_run(12, Tuning::default(), 2, 0);
    let json = serde_json::to_string(&state).unwrap();
    let back: GameState = serde_json::from_str(&json).unwrap();
    assert_eq!(serde_json::to_string(&back).unwrap(), json);
    assert_eq!(back.walls, state.walls);
}
