//! Boss state machines
//!
//! One boss per arena level. Each kind updates independently and reports an
//! outcome; the tick engine applies damage, pickups and death uniformly.

use glam::{IVec2, Vec2};
use rand::Rng;

use super::event::{VfxEvent, VfxKind};
use super::geometry::{CARDINALS, WallMap, distance, point_in_polygon, secondary_step_toward, step_toward};
use super::spawn::{Occupancy, find_clear_area, random_safe_with};
use super::state::{Boss, BossKind, GameState, MatterType, Pickup, PickupKind};

pub const PURSUIT_SEQUENCE_LEN: usize = 3;
const PURSUIT_HP: u32 = 3;
const PURSUIT_TELEPORT_DISTANCE: f32 = 15.0;
const PURSUIT_JITTER_CHANCE: f64 = 0.3;

const RESOURCE_HP: u32 = 5;
const RESOURCE_SPAWN_INTERVAL_MS: u64 = 4_000;
const RESOURCE_FIRST_SPAWN_MS: u64 = 2_000;
const ANCHORS_PER_WAVE: usize = 3;
const ANCHOR_LIFETIME_MS: u64 = 6_000;

const AREA_HP: u32 = 40;
const AREA_SIZE: i32 = 4;
const AREA_DRIFT_TICKS: u32 = 20;
/// Chassis length needed before encirclement counts
const AREA_ENCIRCLE_LENGTH: usize = 15;

const RACE_HP: u32 = 10;
const RACE_STEP_MS: u64 = 120;
const RACE_POOL: usize = 3;
pub const RACE_LETHAL_SCORE: u32 = 10;

/// What a boss update asks the tick engine to do
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BossOutcome {
    pub vfx: Vec<VfxEvent>,
    pub pickups_to_add: Vec<Pickup>,
    /// Pickup ids to remove (claimed or expired)
    pub removed_pickups: Vec<u32>,
    pub damage: u32,
    /// Kills regardless of shields and invulnerability
    pub lethal: bool,
    pub died: bool,
    pub hit: bool,
}

fn random_sequence(state: &mut GameState, len: usize) -> Vec<MatterType> {
    (0..len).map(|_| MatterType::random(&mut state.rng)).collect()
}

/// Boss for arena `level_id`, cycling through the four kinds
pub fn new_boss(state: &mut GameState, map: &WallMap, level_id: u32, now: u64) -> Boss {
    let cycle = (level_id / crate::consts::BOSS_LEVEL_INTERVAL).saturating_sub(1) % 4;
    let (kind, hp, size) = match cycle {
        0 => (
            BossKind::Pursuit {
                sequence: random_sequence(state, PURSUIT_SEQUENCE_LEN),
                move_counter: 0,
            },
            PURSUIT_HP,
            2,
        ),
        1 => (
            BossKind::ResourceRace {
                next_spawn_at: now + RESOURCE_FIRST_SPAWN_MS,
            },
            RESOURCE_HP,
            2,
        ),
        2 => (BossKind::AreaDenial { drift_counter: 0 }, AREA_HP, AREA_SIZE),
        _ => (
            BossKind::RaceCondition {
                score: 0,
                next_move_at: now + RACE_STEP_MS,
            },
            RACE_HP,
            2,
        ),
    };
    let pos = find_clear_area(state, map, IVec2::splat(size), 10.0);
    log::info!("Boss {} spawned at {:?} with {} hp", kind.name(), pos, hp);
    Boss {
        pos,
        width: size,
        height: size,
        hp,
        max_hp: hp,
        kind,
    }
}

/// True while the chassis' charged tail ends with the pursuit boss' sequence
pub fn pursuit_vulnerable(boss: &Boss, charged: &[MatterType]) -> bool {
    match &boss.kind {
        BossKind::Pursuit { sequence, .. } => !sequence.is_empty() && charged.ends_with(sequence),
        _ => false,
    }
}

/// Apply `amount` damage; returns true when the boss dies
pub fn damage_boss(boss: &mut Boss, amount: u32) -> bool {
    boss.hp = boss.hp.saturating_sub(amount);
    boss.hp == 0
}

/// Advance the active boss one tick.
///
/// The boss is taken out of `state` for the duration of the update and put
/// back unless it died.
pub fn update_boss(state: &mut GameState, map: &WallMap, now: u64) -> BossOutcome {
    let mut out = BossOutcome::default();
    let Some(mut boss) = state.boss.take() else {
        return out;
    };

    match boss.kind.clone() {
        BossKind::Pursuit { .. } => update_pursuit(state, map, &mut boss, &mut out),
        BossKind::ResourceRace { .. } => update_resource(state, map, &mut boss, now, &mut out),
        BossKind::AreaDenial { .. } => update_area(state, map, &mut boss, &mut out),
        BossKind::RaceCondition { .. } => update_race(state, map, &mut boss, now, &mut out),
    }

    if boss.hp == 0 {
        out.died = true;
    }
    if !out.died {
        state.boss = Some(boss);
    }
    out
}

/// Try to shift the boss by `dir`; false if its footprint would hit a wall
fn try_shift(boss: &mut Boss, map: &WallMap, dir: IVec2) -> bool {
    if dir == IVec2::ZERO {
        return false;
    }
    let next = boss.pos + dir;
    if map.area_clear(next, IVec2::new(boss.width, boss.height)) {
        boss.pos = next;
        true
    } else {
        false
    }
}

fn boss_cell(boss: &Boss) -> IVec2 {
    boss.pos + IVec2::new(boss.width / 2, boss.height / 2)
}

fn update_pursuit(state: &mut GameState, map: &WallMap, boss: &mut Boss, out: &mut BossOutcome) {
    let head = state.head_pos();
    let vulnerable = pursuit_vulnerable(boss, &state.charged_variants());

    let cadence = 2 + boss.hp;
    let BossKind::Pursuit { move_counter, .. } = &mut boss.kind else {
        return;
    };
    *move_counter += 1;
    let should_move = *move_counter >= cadence;
    if should_move {
        *move_counter = 0;
    }

    if should_move {
        let from = boss_cell(boss);
        let (primary, secondary) = if vulnerable {
            let mut away = -step_toward(from, head);
            if away == IVec2::ZERO || state.rng.random_bool(PURSUIT_JITTER_CHANCE) {
                let side = if state.rng.random_bool(0.5) { 1 } else { -1 };
                let base = if away == IVec2::ZERO { IVec2::X } else { away };
                away = IVec2::new(-base.y, base.x) * side;
            }
            (away, IVec2::new(-away.y, away.x))
        } else {
            (step_toward(from, head), secondary_step_toward(from, head))
        };
        if !try_shift(boss, map, primary) {
            try_shift(boss, map, secondary);
        }
    }

    if !boss.contains(head) {
        return;
    }
    if vulnerable {
        out.hit = true;
        out.vfx.push(VfxEvent::at(VfxKind::BossHit, head));
        if damage_boss(boss, 1) {
            return;
        }
        let sequence = random_sequence(state, PURSUIT_SEQUENCE_LEN);
        if let BossKind::Pursuit { sequence: current, .. } = &mut boss.kind {
            *current = sequence;
        }
        boss.pos = find_clear_area(state, map, IVec2::new(boss.width, boss.height), PURSUIT_TELEPORT_DISTANCE);
        out.vfx.push(VfxEvent::at(VfxKind::BossTeleport, boss.pos));
    } else {
        out.damage += 1;
    }
}

fn update_resource(state: &mut GameState, map: &WallMap, boss: &mut Boss, now: u64, out: &mut BossOutcome) {
    for pickup in &state.pickups {
        if let PickupKind::ChronosAnchor { expires_at } = pickup.kind
            && now >= expires_at
        {
            out.removed_pickups.push(pickup.id);
            out.damage += 1;
            out.vfx.push(VfxEvent::colored(VfxKind::AnchorExpired, pickup.pos, pickup.kind.color()));
        }
    }

    let BossKind::ResourceRace { next_spawn_at } = &mut boss.kind else {
        return;
    };
    if now < *next_spawn_at {
        return;
    }
    *next_spawn_at = now + RESOURCE_SPAWN_INTERVAL_MS;

    let mut occupancy = Occupancy::from_state(state);
    for cell in boss.cells() {
        occupancy.insert(cell);
    }
    for _ in 0..ANCHORS_PER_WAVE {
        let pos = random_safe_with(state, map, &occupancy);
        occupancy.insert(pos);
        let id = state.next_entity_id();
        out.pickups_to_add.push(Pickup {
            id,
            pos,
            kind: PickupKind::ChronosAnchor {
                expires_at: now + ANCHOR_LIFETIME_MS,
            },
        });
    }
    let size = IVec2::new(boss.width, boss.height);
    boss.pos = find_clear_area(state, map, size, 6.0);
    out.vfx.push(VfxEvent::at(VfxKind::BossTeleport, boss.pos));
}

fn update_area(state: &mut GameState, map: &WallMap, boss: &mut Boss, out: &mut BossOutcome) {
    let BossKind::AreaDenial { drift_counter } = &mut boss.kind else {
        return;
    };
    *drift_counter += 1;
    if *drift_counter >= AREA_DRIFT_TICKS {
        *drift_counter = 0;
        let dir = CARDINALS[state.rng.random_range(0..CARDINALS.len())];
        try_shift(boss, map, dir);
    }

    if state.segments.len() > AREA_ENCIRCLE_LENGTH {
        let polygon: Vec<Vec2> = state
            .segments
            .iter()
            .map(|s| s.pos.as_vec2() + Vec2::splat(0.5))
            .collect();
        if point_in_polygon(boss.center(), &polygon) {
            out.hit = true;
            damage_boss(boss, 1);
            out.vfx.push(VfxEvent::colored(VfxKind::BossHit, boss_cell(boss), 0xff4136));
        }
    }

    if boss.contains(state.head_pos()) {
        out.damage += 1;
    }
}

fn update_race(state: &mut GameState, map: &WallMap, boss: &mut Boss, now: u64, out: &mut BossOutcome) {
    let BossKind::RaceCondition { score, next_move_at } = &mut boss.kind else {
        return;
    };

    if now >= *next_move_at {
        *next_move_at = now + RACE_STEP_MS;
        let from = boss.pos + IVec2::new(boss.width / 2, boss.height / 2);
        let target = state
            .pickups
            .iter()
            .filter(|p| p.kind == PickupKind::OmegaParticle)
            .min_by(|a, b| distance(a.pos, from).total_cmp(&distance(b.pos, from)))
            .map(|p| p.pos);
        if let Some(target) = target {
            let size = IVec2::new(boss.width, boss.height);
            for dir in [step_toward(from, target), secondary_step_toward(from, target)] {
                let next = boss.pos + dir;
                if dir != IVec2::ZERO && map.area_clear(next, size) {
                    boss.pos = next;
                    break;
                }
            }
        }
    }

    let footprint = (boss.pos, IVec2::new(boss.width, boss.height));
    let inside = |p: IVec2| {
        p.x >= footprint.0.x && p.x < footprint.0.x + footprint.1.x && p.y >= footprint.0.y && p.y < footprint.0.y + footprint.1.y
    };
    for pickup in &state.pickups {
        if pickup.kind == PickupKind::OmegaParticle && inside(pickup.pos) {
            out.removed_pickups.push(pickup.id);
            *score += 1;
            out.vfx.push(VfxEvent::colored(VfxKind::BossHit, pickup.pos, pickup.kind.color()));
        }
    }
    if *score >= RACE_LETHAL_SCORE {
        out.lethal = true;
    }

    let remaining = state
        .pickups
        .iter()
        .filter(|p| p.kind == PickupKind::OmegaParticle && !out.removed_pickups.contains(&p.id))
        .count();
    let mut occupancy = Occupancy::from_state(state);
    for cell in boss.cells() {
        occupancy.insert(cell);
    }
    for _ in remaining..RACE_POOL {
        let pos = random_safe_with(state, map, &occupancy);
        occupancy.insert(pos);
        let id = state.next_entity_id();
        out.pickups_to_add.push(Pickup {
            id,
            pos,
            kind: PickupKind::OmegaParticle,
        });
    }
}
