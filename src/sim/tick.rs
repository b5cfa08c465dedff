//! Core game tick
//!
//! `process_game_tick` never touches the previous state: it clones it, runs the
//! per-tick steps in dependency order and returns the next state together with
//! the effects the host should present. The timestamp is read once from the
//! input and threaded through every step.

use glam::IVec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::boss::{damage_boss, update_boss};
use super::enemy::{relocate_enemy, spawn_enemy, update_enemies};
use super::evasion::{enter_evasion, process_evasion_tick};
use super::event::{SoundEffect, VfxEvent, VfxKind};
use super::gate::resolve_warp;
use super::geometry::{WallMap, distance, in_bounds, is_perimeter, step_toward};
use super::shop::open_shop;
use super::spawn::{
    Occupancy, find_clear_area, find_safe_start, spawn_coins, spawn_pickup, spawn_pickups_if_needed, spawn_portal,
};
use super::state::{
    AnomalyKind, Boss, BossKind, GameState, GameStatus, MatterType, PickupKind, Portal, Segment, UpgradeKind, Wall,
    WallKind,
};
use crate::consts::*;
use crate::grid_center;

/// Box half-size searched by the magnetic wall anomaly
const MAGNETIC_WALL_RANGE: i32 = 3;
/// Stasis seconds when an orb is picked up without the upgrade
const DEFAULT_STASIS_SECS: f32 = 3.0;
/// Extra score for killing a boss, in boss-hit units
const BOSS_KILL_MULTIPLIER: u64 = 4;

/// Input for a single tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickInput {
    /// Next queued direction, components in {-1, 0, 1}; zero keeps the heading
    pub direction: IVec2,
    /// Wall clock for this tick (ms)
    pub timestamp: u64,
    pub tutorial_step: u32,
    pub tutorial_input_count: u32,
    pub seen_hp_tutorial: bool,
    pub seen_evasion_tutorial: bool,
    /// Pause toggle
    pub pause: bool,
    /// Trigger the velocity sync ability
    pub activate_ability: bool,
}

/// Result of a tick
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub state: GameState,
    pub should_trigger_hp_tutorial: bool,
    pub next_tutorial_step: u32,
    pub tutorial_error: Option<u32>,
    /// Host should clear its queued directions
    pub reset_input: bool,
    /// Host should replace its heading with this
    pub forced_direction: Option<IVec2>,
    pub vfx_events: Vec<VfxEvent>,
    pub sfx: Vec<SoundEffect>,
    /// Achievement / tutorial unlock ids
    pub unlocks: Vec<String>,
}

impl TickOutput {
    /// Output carrying only the new state
    pub(crate) fn passive(state: GameState, input: &TickInput) -> Self {
        Self {
            state,
            should_trigger_hp_tutorial: false,
            next_tutorial_step: input.tutorial_step,
            tutorial_error: None,
            reset_input: false,
            forced_direction: None,
            vfx_events: Vec::new(),
            sfx: Vec::new(),
            unlocks: Vec::new(),
        }
    }
}

/// Ways a run can end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatal {
    IncompatibleMatter,
    Wall,
    Trap,
    Enemy,
    SequenceMismatch,
    HeadTrauma,
    Boss,
    RivalVictory,
}

impl Fatal {
    pub fn reason(self) -> &'static str {
        match self {
            Fatal::IncompatibleMatter => "Critical failure: incompatible matter",
            Fatal::Wall => "Hull breach: collided with a wall",
            Fatal::Trap => "Hull breach: triggered a trap",
            Fatal::Enemy => "Destroyed by a hostile",
            Fatal::SequenceMismatch => "Portal rejected the charge sequence",
            Fatal::HeadTrauma => "Head trauma: self-collision",
            Fatal::Boss => "Overwhelmed by the guardian",
            Fatal::RivalVictory => "The rival claimed the omega particles",
        }
    }

    /// Error code the tutorial shows after a scripted respawn
    pub fn tutorial_code(self) -> u32 {
        match self {
            Fatal::IncompatibleMatter => 97,
            Fatal::Wall | Fatal::Trap => 98,
            Fatal::Enemy => 99,
            Fatal::SequenceMismatch => 96,
            Fatal::HeadTrauma => 95,
            Fatal::Boss | Fatal::RivalVictory => 94,
        }
    }
}

/// Why the step sequence stopped early
enum Halt {
    Fatal(Fatal),
    /// Status changed (shop, tutorial summary, evasion)
    Transition,
}

type Step = Result<(), Halt>;

/// Per-tick scratch: effects and flags collected while stepping
struct Frame<'a> {
    input: &'a TickInput,
    /// Chassis at the start of the tick (bounce target)
    prev: &'a [Segment],
    now: u64,
    vfx: Vec<VfxEvent>,
    sfx: Vec<SoundEffect>,
    unlocks: Vec<String>,
    reset_input: bool,
    forced_direction: Option<IVec2>,
    tutorial_error: Option<u32>,
    hp_tutorial: bool,
    next_tutorial_step: u32,
    moved: bool,
    collected: bool,
    filled: bool,
    exited: bool,
}

impl<'a> Frame<'a> {
    fn new(input: &'a TickInput, prev: &'a [Segment]) -> Self {
        Self {
            input,
            prev,
            now: input.timestamp,
            vfx: Vec::new(),
            sfx: Vec::new(),
            unlocks: Vec::new(),
            reset_input: false,
            forced_direction: None,
            tutorial_error: None,
            hp_tutorial: false,
            next_tutorial_step: input.tutorial_step,
            moved: false,
            collected: false,
            filled: false,
            exited: false,
        }
    }

    fn finish(self, state: GameState) -> TickOutput {
        TickOutput {
            state,
            should_trigger_hp_tutorial: self.hp_tutorial,
            next_tutorial_step: self.next_tutorial_step,
            tutorial_error: self.tutorial_error,
            reset_input: self.reset_input,
            forced_direction: self.forced_direction,
            vfx_events: self.vfx,
            sfx: self.sfx,
            unlocks: self.unlocks,
        }
    }
}

/// Advance the run by one tick
pub fn process_game_tick(prev: &GameState, input: &TickInput) -> TickOutput {
    if prev.status == GameStatus::Evasion {
        return process_evasion_tick(prev, input);
    }

    let mut state = prev.clone();
    let mut frame = Frame::new(input, &prev.segments);

    if input.pause {
        toggle_pause(&mut state);
        return frame.finish(state);
    }

    match state.status {
        GameStatus::Playing | GameStatus::Tutorial => {}
        GameStatus::Countdown if frame.now >= state.countdown_until => {
            state.status = GameStatus::Playing;
            frame.sfx.push(SoundEffect::Countdown);
        }
        _ => return frame.finish(state),
    }

    activate_ability(&mut state, &mut frame);

    if let Err(Halt::Fatal(fatal)) = run_steps(&mut state, &mut frame) {
        fail(&mut state, &mut frame, fatal);
    }
    advance_tutorial(&state, &mut frame);
    frame.finish(state)
}

fn toggle_pause(state: &mut GameState) {
    match state.status {
        GameStatus::Playing | GameStatus::Tutorial | GameStatus::Countdown => {
            state.paused_from = Some(state.status);
            state.status = GameStatus::Paused;
        }
        GameStatus::Paused => {
            state.status = state.paused_from.take().unwrap_or(GameStatus::Playing);
        }
        _ => {}
    }
}

fn activate_ability(state: &mut GameState, frame: &mut Frame) {
    if !frame.input.activate_ability || frame.now < state.buffs.ability_cooldown_until {
        return;
    }
    let Some(secs) = state.upgrade_value(UpgradeKind::VelocitySync) else {
        return;
    };
    state.buffs.ability_active_until = frame.now + (secs * 1000.0) as u64;
    state.buffs.ability_cooldown_until = state.buffs.ability_active_until + state.tuning.ability_cooldown_ms;
    frame.sfx.push(SoundEffect::PowerUp);
}

fn run_steps(state: &mut GameState, frame: &mut Frame) -> Step {
    // 1. periodic anomalies
    shift_traps(state, frame);
    let map = WallMap::new(&state.walls);

    // 2. magnet
    attract_coins(state, &map);

    // 3-7. steering, warp, pickups, rebuild, walls
    let dir = resolve_direction(state, frame, &map);
    if dir != IVec2::ZERO && !state.segments.is_empty() {
        move_chassis(state, frame, &map, dir)?;
    }

    // 8. rapid decay
    decay(state, frame);

    // 9. boss
    step_boss(state, frame, &map)?;

    // 10. enemies
    step_enemies(state, frame, &map)?;

    // 11. self-collision
    if frame.moved {
        check_self_collision(state, frame)?;
    }

    // 12. sequence
    mark_sequence(state);

    // 13. portals
    step_portals(state, frame, &map)?;

    // 14. coins
    collect_coins(state, frame);

    // 15. HUD guidance
    state.pending_type = pending_type(&state.segments);

    // 16. replenish
    spawn_pickups_if_needed(state, &map);
    Ok(())
}

fn shift_traps(state: &mut GameState, frame: &mut Frame) {
    if !state.has_anomaly(AnomalyKind::TrapShift)
        || frame.now.saturating_sub(state.last_trap_shift_at) < state.tuning.trap_shift_interval_ms
    {
        return;
    }
    state.last_trap_shift_at = frame.now;

    let movable: Vec<usize> = state
        .walls
        .iter()
        .enumerate()
        .filter(|(_, w)| w.kind == WallKind::Trap && !w.cells().any(is_perimeter))
        .map(|(i, _)| i)
        .collect();
    for i in movable {
        let trap = state.walls[i];
        let others: Vec<Wall> = state
            .walls
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, w)| *w)
            .collect();
        let map = WallMap::new(&others);
        let pos = find_clear_area(state, &map, IVec2::new(trap.width, trap.height), 4.0);
        state.walls[i].x = pos.x;
        state.walls[i].y = pos.y;
        frame.vfx.push(VfxEvent::at(VfxKind::TrapShift, pos));
    }
    log::debug!("Traps shifted at {}", frame.now);
}

fn attract_coins(state: &mut GameState, map: &WallMap) {
    let Some(range) = state.upgrade_value(UpgradeKind::Magnet) else {
        return;
    };
    if state.segments.is_empty() {
        return;
    }
    let head = state.head_pos();
    let mut occupancy = Occupancy::from_state(state);
    for coin in &mut state.coins {
        let d = distance(coin.pos, head);
        if d == 0.0 || d > range {
            continue;
        }
        let next = coin.pos + step_toward(coin.pos, head);
        if !map.is_blocked(next) && !occupancy.contains(next) {
            occupancy.remove(coin.pos);
            occupancy.insert(next);
            coin.pos = next;
        }
    }
}

fn resolve_direction(state: &mut GameState, frame: &mut Frame, map: &WallMap) -> IVec2 {
    let mut dir = state.direction;
    let wanted = frame.input.direction.clamp(IVec2::NEG_ONE, IVec2::ONE);
    let cardinal = wanted != IVec2::ZERO && (wanted.x == 0 || wanted.y == 0);
    if cardinal && !into_neck(&state.segments, wanted) {
        dir = wanted;
    }

    if dir != IVec2::ZERO
        && state.has_anomaly(AnomalyKind::MagneticWalls)
        && state.rng.random_bool(state.tuning.magnetic_wall_chance)
        && let Some(pull) = magnetic_pull(state, map)
    {
        dir = pull;
        frame.forced_direction = Some(pull);
    }
    dir
}

/// True if moving `dir` would fold the head back onto the first body segment
fn into_neck(segments: &[Segment], dir: IVec2) -> bool {
    match segments {
        [head, neck, ..] => head.pos + dir == neck.pos,
        _ => false,
    }
}

/// Step toward the nearest wall cell in the box around the head
fn magnetic_pull(state: &GameState, map: &WallMap) -> Option<IVec2> {
    let head = state.head_pos();
    let mut nearest: Option<(f32, IVec2)> = None;
    for dy in -MAGNETIC_WALL_RANGE..=MAGNETIC_WALL_RANGE {
        for dx in -MAGNETIC_WALL_RANGE..=MAGNETIC_WALL_RANGE {
            let p = head + IVec2::new(dx, dy);
            if p == head || !in_bounds(p) || !map.is_blocked(p) {
                continue;
            }
            let d = distance(p, head);
            if nearest.is_none_or(|(nd, _)| d < nd) {
                nearest = Some((d, p));
            }
        }
    }
    let (_, wall) = nearest?;
    let pull = step_toward(head, wall);
    (pull != IVec2::ZERO && !into_neck(&state.segments, pull)).then_some(pull)
}

/// Deferred chassis edits, by index into the pre-rebuild chassis
#[derive(Debug, Default)]
struct Plan {
    fills: Vec<usize>,
    unfill: Option<usize>,
    grow: Option<MatterType>,
}

/// New segment appended at the tail by a rebuild
#[derive(Debug, Clone, Copy)]
pub struct Growth {
    pub id: u32,
    pub variant: MatterType,
}

/// Follow-the-leader rebuild.
///
/// Body index `i` of `prev` stays at index `i` (only its position changes);
/// growth appends one empty segment at the vacated tail position.
pub fn rebuild_chassis(prev: &[Segment], head: Segment, growth: Option<Growth>, now: u64) -> Vec<Segment> {
    let mut next = Vec::with_capacity(prev.len() + 1);
    next.push(head);
    for i in 1..prev.len() {
        next.push(Segment {
            pos: prev[i - 1].pos,
            ..prev[i].clone()
        });
    }
    if let (Some(growth), Some(tail)) = (growth, prev.last()) {
        next.push(Segment::empty_body(growth.id, tail.pos, growth.variant, now));
    }
    next
}

fn move_chassis(state: &mut GameState, frame: &mut Frame, map: &WallMap, mut dir: IVec2) -> Step {
    let prev = frame.prev;
    let mut target = state.head_pos() + dir;
    let mut warped = false;

    // 4. gates
    if let Some(WallKind::Gate(link)) = map.kind_at(&state.walls, target) {
        let warp = resolve_warp(&state.walls, map, link, dir, &mut state.rng, |p| {
            !prev.iter().any(|s| s.pos == p)
        });
        if let Some(warp) = warp {
            frame.vfx.push(VfxEvent::at(VfxKind::Warp, target));
            frame.vfx.push(VfxEvent::at(VfxKind::Warp, warp.pos));
            frame.sfx.push(SoundEffect::Warp);
            target = warp.pos;
            dir = warp.dir;
            warped = true;
        }
    }
    state.direction = dir;

    // 5. pickups decide before the structure changes
    let plan = resolve_pickup(state, frame, map, target)?;

    // 6. rebuild, then apply the plan by stable index
    let head = Segment::head(state.next_entity_id(), target, frame.now);
    let growth = plan.grow.map(|variant| Growth {
        id: state.next_entity_id(),
        variant,
    });
    state.segments = rebuild_chassis(&state.segments, head, growth, frame.now);
    for &i in &plan.fills {
        if let Some(segment) = state.segments.get_mut(i) {
            segment.charged = true;
        }
    }
    if let Some(i) = plan.unfill {
        unfill(state, frame, i);
    }
    frame.moved = true;

    // 7. walls
    if warped {
        return Ok(());
    }
    check_walls(state, frame, map)
}

fn resolve_pickup(state: &mut GameState, frame: &mut Frame, map: &WallMap, at: IVec2) -> Result<Plan, Halt> {
    let Some(pickup) = state.pickups.iter().find(|p| p.pos == at).cloned() else {
        return Ok(Plan::default());
    };
    state.pickups.retain(|p| p.id != pickup.id);
    let color = pickup.kind.color();

    match pickup.kind {
        PickupKind::Matter(matter) => return collect_matter(state, frame, map, matter, at),
        PickupKind::StasisOrb => {
            let secs = state.upgrade_value(UpgradeKind::StasisField).unwrap_or(DEFAULT_STASIS_SECS);
            state.buffs.stasis_until = frame.now + (secs * 1000.0) as u64;
            frame.vfx.push(VfxEvent::colored(VfxKind::Stasis, at, color));
            frame.sfx.push(SoundEffect::PowerUp);
        }
        PickupKind::Shield => {
            state.buffs.shields = (state.buffs.shields + 1).min(state.shield_capacity());
            frame.vfx.push(VfxEvent::colored(VfxKind::ShieldBlock, at, color));
            frame.sfx.push(SoundEffect::PowerUp);
        }
        PickupKind::ChronosAnchor { .. } => {
            strike_boss(state, frame, at, |k| matches!(k, BossKind::ResourceRace { .. }));
        }
        PickupKind::OmegaParticle => {
            strike_boss(state, frame, at, |k| matches!(k, BossKind::RaceCondition { .. }));
        }
    }
    Ok(Plan::default())
}

fn collect_matter(
    state: &mut GameState,
    frame: &mut Frame,
    map: &WallMap,
    matter: MatterType,
    at: IVec2,
) -> Result<Plan, Halt> {
    let mut plan = Plan::default();
    frame.collected = true;

    let matching = |s: &Segment| s.is_empty_body() && s.variant == Some(matter);
    if let Some(i) = state.segments.iter().rposition(matching) {
        plan.fills.push(i);
        on_fill(state, frame, map, matter, at, &mut plan);
        return Ok(plan);
    }

    if state.segments.iter().any(Segment::is_empty_body) {
        state.fill_chain = 0;
        return match absorb_hit(state, frame) {
            Absorb::Charge(i) => {
                plan.unfill = Some(i);
                Ok(plan)
            }
            Absorb::Fatal => Err(Halt::Fatal(Fatal::IncompatibleMatter)),
            Absorb::Invulnerable | Absorb::Shield => Ok(plan),
        };
    }

    plan.grow = Some(matter);
    state.score += state.tuning.grow_score;
    frame.vfx.push(VfxEvent::colored(VfxKind::Grow, at, matter.color()));
    frame.sfx.push(SoundEffect::Grow);
    Ok(plan)
}

fn on_fill(state: &mut GameState, frame: &mut Frame, map: &WallMap, matter: MatterType, at: IVec2, plan: &mut Plan) {
    if state.charged_count() == 0 {
        frame.unlocks.push("first_fill".to_string());
    }
    state.score += state.tuning.fill_score;
    frame.filled = true;
    frame.vfx.push(VfxEvent::colored(VfxKind::Fill, at, matter.color()));
    frame.sfx.push(SoundEffect::Fill);

    if let Some(extra) = state.upgrade_value(UpgradeKind::WirelessFill) {
        let mut extra = extra as usize;
        for i in (1..state.segments.len()).rev() {
            if extra == 0 {
                break;
            }
            let s = &state.segments[i];
            if s.is_empty_body() && s.variant == Some(matter) && !plan.fills.contains(&i) {
                plan.fills.push(i);
                extra -= 1;
            }
        }
    }

    if let Some(gain) = state.upgrade_value(UpgradeKind::Harvester) {
        state.currency += gain as u32;
    }

    if let Some(percent) = state.upgrade_value(UpgradeKind::Replicator)
        && state.rng.random_bool((percent as f64 / 100.0).clamp(0.0, 1.0))
    {
        spawn_pickup(state, map, PickupKind::Matter(matter));
    }

    state.fill_chain += 1;
    if state.fill_chain >= CHAIN_THRESHOLD {
        state.fill_chain = 0;
        trigger_chain(state, frame, map, at, plan);
    }
}

fn trigger_chain(state: &mut GameState, frame: &mut Frame, map: &WallMap, at: IVec2, plan: &mut Plan) {
    if state.has_upgrade(UpgradeKind::ChainShield) {
        let until = frame.now + state.tuning.chain_invulnerability_ms;
        state.buffs.invulnerable_until = state.buffs.invulnerable_until.max(until);
        frame.vfx.push(VfxEvent::at(VfxKind::ShieldBlock, at));
    }
    if state.has_upgrade(UpgradeKind::ChainEmp) {
        emp(state, frame, map, at);
    }
    if state.has_upgrade(UpgradeKind::ChainAutoFill)
        && let Some(i) = (1..state.segments.len())
            .rev()
            .find(|&i| state.segments[i].is_empty_body() && !plan.fills.contains(&i))
    {
        plan.fills.push(i);
    }
}

fn emp(state: &mut GameState, frame: &mut Frame, map: &WallMap, at: IVec2) {
    let radius = state.tuning.emp_radius;
    let hit: Vec<usize> = state
        .enemies
        .iter()
        .enumerate()
        .filter(|(_, e)| distance(e.pos, at) <= radius)
        .map(|(i, _)| i)
        .collect();
    frame.vfx.push(VfxEvent::at(VfxKind::Emp, at));
    frame.sfx.push(SoundEffect::Emp);
    for i in hit {
        destroy_enemy(state, frame, map, i);
    }
}

/// Kill enemy `index` for score and respawn it elsewhere
fn destroy_enemy(state: &mut GameState, frame: &mut Frame, map: &WallMap, index: usize) {
    let Some(enemy) = state.enemies.get(index) else {
        return;
    };
    let (pos, color, behavior) = (enemy.pos, enemy.color, enemy.behavior);
    state.score += state.tuning.enemy_kill_score;
    frame.vfx.push(VfxEvent::colored(VfxKind::EnemyDestroyed, pos, color));
    frame.sfx.push(SoundEffect::EnemyKill);
    relocate_enemy(state, map, index);

    if state.has_anomaly(AnomalyKind::Hydra) && state.enemies.len() < state.tuning.max_enemies {
        spawn_enemy(state, map, behavior, frame.now);
        spawn_coins(state, map, 1);
    }
}

fn check_walls(state: &mut GameState, frame: &mut Frame, map: &WallMap) -> Step {
    let head = state.head_pos();
    let kind = if in_bounds(head) {
        map.kind_at(&state.walls, head)
    } else {
        Some(WallKind::Solid)
    };
    match kind {
        None => Ok(()),
        Some(WallKind::Trap) => Err(Halt::Fatal(Fatal::Trap)),
        Some(_) if state.has_upgrade(UpgradeKind::HullStabilizer) => {
            bounce(state, frame);
            Ok(())
        }
        Some(_) if state.buffs.shields > 0 => {
            block_with_shield(state, frame, head);
            bounce(state, frame);
            Ok(())
        }
        Some(_) => Err(Halt::Fatal(Fatal::Wall)),
    }
}

/// Put the chassis back where it stood at the start of the tick and stop.
/// Charge and length changes made earlier in the tick stand.
fn bounce(state: &mut GameState, frame: &mut Frame) {
    let prev = frame.prev;
    state.segments.truncate(prev.len());
    for (segment, before) in state.segments.iter_mut().zip(prev) {
        segment.pos = before.pos;
    }
    if let (Some(head), Some(before)) = (state.segments.first_mut(), prev.first()) {
        *head = before.clone();
    }
    state.direction = IVec2::ZERO;
    frame.reset_input = true;
    frame.moved = false;
}

fn block_with_shield(state: &mut GameState, frame: &mut Frame, at: IVec2) {
    state.buffs.shields = state.buffs.shields.saturating_sub(1);
    frame.vfx.push(VfxEvent::at(VfxKind::ShieldBlock, at));
    frame.sfx.push(SoundEffect::ShieldBlock);
}

fn decay(state: &mut GameState, frame: &mut Frame) {
    if !state.has_anomaly(AnomalyKind::RapidDecay) {
        return;
    }
    let max_age = state.tuning.decay_age_ms;
    let rotten = state
        .segments
        .iter()
        .position(|s| s.is_empty_body() && frame.now.saturating_sub(s.created_at) > max_age);
    if let Some(i) = rotten {
        truncate(state, frame, i, VfxKind::Decay);
    }
}

fn truncate(state: &mut GameState, frame: &mut Frame, index: usize, kind: VfxKind) {
    for segment in state.segments.iter().skip(index) {
        let color = segment.variant.map_or(0xffffff, MatterType::color);
        frame.vfx.push(VfxEvent::colored(kind, segment.pos, color));
    }
    state.segments.truncate(index);
}

/// How a damaging hit was absorbed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Absorb {
    Invulnerable,
    Shield,
    /// Newest charged segment (index) loses its charge
    Charge(usize),
    Fatal,
}

/// Decide a hit: invulnerability, then shields, then charge, then fatal.
/// A charge loss is left to the caller so it can be deferred.
fn absorb_hit(state: &mut GameState, frame: &mut Frame) -> Absorb {
    let head = state.head_pos();
    if state.is_invulnerable(frame.now) {
        return Absorb::Invulnerable;
    }
    if state.buffs.shields > 0 {
        block_with_shield(state, frame, head);
        return Absorb::Shield;
    }
    match state.segments.iter().rposition(|s| s.charged) {
        Some(i) => {
            state.buffs.invulnerable_until = frame.now + state.tuning.damage_invulnerability_ms;
            frame.sfx.push(SoundEffect::Damage);
            if !frame.input.seen_hp_tutorial {
                frame.hp_tutorial = true;
            }
            Absorb::Charge(i)
        }
        None => Absorb::Fatal,
    }
}

fn unfill(state: &mut GameState, frame: &mut Frame, index: usize) {
    if let Some(segment) = state.segments.get_mut(index) {
        segment.charged = false;
        segment.sequence_part = false;
        let color = segment.variant.map_or(0xffffff, MatterType::color);
        frame.vfx.push(VfxEvent::colored(VfxKind::Unfill, segment.pos, color));
    }
}

/// Apply one unit of damage right away
fn take_damage(state: &mut GameState, frame: &mut Frame, fatal: Fatal) -> Step {
    match absorb_hit(state, frame) {
        Absorb::Charge(i) => {
            unfill(state, frame, i);
            Ok(())
        }
        Absorb::Fatal => Err(Halt::Fatal(fatal)),
        Absorb::Invulnerable | Absorb::Shield => Ok(()),
    }
}

/// Chassis-delivered boss damage (anchor or particle collection)
fn strike_boss(state: &mut GameState, frame: &mut Frame, at: IVec2, applies: fn(&BossKind) -> bool) {
    let Some(boss) = state.boss.as_mut() else {
        return;
    };
    if !applies(&boss.kind) {
        return;
    }
    let died = damage_boss(boss, 1);
    state.score += state.tuning.boss_hit_score;
    frame.vfx.push(VfxEvent::at(VfxKind::BossHit, at));
    frame.sfx.push(SoundEffect::BossHit);
    if died && let Some(boss) = state.boss.take() {
        boss_defeated(state, frame, &boss);
    }
}

fn boss_defeated(state: &mut GameState, frame: &mut Frame, boss: &Boss) {
    let name = boss.kind.name();
    state.score += state.tuning.boss_hit_score * BOSS_KILL_MULTIPLIER;
    state
        .pickups
        .retain(|p| !matches!(p.kind, PickupKind::ChronosAnchor { .. } | PickupKind::OmegaParticle));

    let center = grid_center();
    state.portal = Some(Portal {
        pos: center,
        expires_at: None,
    });
    frame.vfx.push(VfxEvent::at(VfxKind::BossDeath, boss.pos));
    frame.vfx.push(VfxEvent::at(VfxKind::PortalOpen, center));
    frame.sfx.push(SoundEffect::BossDeath);
    frame.sfx.push(SoundEffect::PortalOpen);
    frame.unlocks.push(format!("boss_{name}"));
    log::info!("Boss {} defeated on level {}", name, state.level_id);
}

fn step_boss(state: &mut GameState, frame: &mut Frame, map: &WallMap) -> Step {
    let Some(before) = state.boss.clone() else {
        return Ok(());
    };
    let out = update_boss(state, map, frame.now);
    frame.vfx.extend(out.vfx);
    state.pickups.retain(|p| !out.removed_pickups.contains(&p.id));
    state.pickups.extend(out.pickups_to_add);

    if out.hit {
        state.score += state.tuning.boss_hit_score;
        frame.sfx.push(SoundEffect::BossHit);
    }
    if out.died {
        boss_defeated(state, frame, &before);
        return Ok(());
    }
    if out.lethal {
        return Err(Halt::Fatal(Fatal::RivalVictory));
    }
    for _ in 0..out.damage {
        take_damage(state, frame, Fatal::Boss)?;
    }
    Ok(())
}

fn step_enemies(state: &mut GameState, frame: &mut Frame, map: &WallMap) -> Step {
    let before: Vec<IVec2> = state.enemies.iter().map(|e| e.pos).collect();
    update_enemies(state, map, frame.now, &mut frame.vfx);
    if state.segments.is_empty() {
        return Ok(());
    }
    let head = state.head_pos();
    let old_head = frame.prev.first().map(|s| s.pos);
    // an enemy that traded cells with the head met it on the way
    let crossed = |i: usize, pos: IVec2| before.get(i) == Some(&head) && old_head == Some(pos);
    let Some(index) = state
        .enemies
        .iter()
        .enumerate()
        .position(|(i, e)| e.pos == head || crossed(i, e.pos))
    else {
        return Ok(());
    };
    match absorb_hit(state, frame) {
        Absorb::Invulnerable => destroy_enemy(state, frame, map, index),
        Absorb::Shield => {
            frame.vfx.push(VfxEvent::at(VfxKind::EnemyDestroyed, head));
            relocate_enemy(state, map, index);
        }
        Absorb::Charge(i) => {
            unfill(state, frame, i);
            frame.vfx.push(VfxEvent::at(VfxKind::EnemyDestroyed, head));
            relocate_enemy(state, map, index);
        }
        Absorb::Fatal => return Err(Halt::Fatal(Fatal::Enemy)),
    }
    Ok(())
}

fn check_self_collision(state: &mut GameState, frame: &mut Frame) -> Step {
    let head = state.head_pos();
    let Some(index) = state.segments.iter().skip(1).position(|s| s.pos == head).map(|i| i + 1) else {
        return Ok(());
    };
    if state.has_anomaly(AnomalyKind::HeadTrauma) {
        return Err(Halt::Fatal(Fatal::HeadTrauma));
    }
    truncate(state, frame, index, VfxKind::Truncate);
    Ok(())
}

/// Start index of `required` as a contiguous run inside `charged`.
/// An empty requirement always matches.
pub fn sequence_matches(charged: &[MatterType], required: &[MatterType]) -> Option<usize> {
    if required.is_empty() {
        return Some(0);
    }
    charged.windows(required.len()).position(|w| w == required)
}

fn mark_sequence(state: &mut GameState) {
    for segment in &mut state.segments {
        segment.sequence_part = false;
    }
    let charged: Vec<usize> = (0..state.segments.len())
        .filter(|&i| state.segments[i].charged && state.segments[i].variant.is_some())
        .collect();
    let variants: Vec<MatterType> = charged.iter().filter_map(|&i| state.segments[i].variant).collect();

    let found = sequence_matches(&variants, &state.required_sequence);
    state.sequence_matched = found.is_some();
    if let Some(start) = found {
        for &i in charged.iter().skip(start).take(state.required_sequence.len()) {
            state.segments[i].sequence_part = true;
        }
    }
}

fn step_portals(state: &mut GameState, frame: &mut Frame, map: &WallMap) -> Step {
    let now = frame.now;
    let charged = state.charged_count();
    let integrity = state.integrity;

    if let Some(secret) = state.secret_portal
        && secret.expires_at.is_some_and(|t| now >= t)
    {
        state.secret_portal = None;
        frame.vfx.push(VfxEvent::at(VfxKind::PortalClose, secret.pos));
    }
    if !state.secret_portal_spawned
        && !state.is_boss_level()
        && !state.is_tutorial()
        && charged > integrity + state.tuning.secret_portal_surplus
    {
        let pos = spawn_portal(state, map);
        state.secret_portal = Some(Portal {
            pos,
            expires_at: Some(now + state.tuning.secret_portal_ttl_ms),
        });
        state.secret_portal_spawned = true;
        frame.vfx.push(VfxEvent::colored(VfxKind::PortalOpen, pos, 0xffd700));
        frame.unlocks.push("secret_portal".to_string());
        log::debug!("Secret portal opened at {:?}", pos);
    }

    // boss arenas open their exit when the boss dies
    if !state.is_boss_level() {
        if charged >= integrity && state.portal.is_none() {
            let pos = spawn_portal(state, map);
            state.portal = Some(Portal { pos, expires_at: None });
            frame.vfx.push(VfxEvent::at(VfxKind::PortalOpen, pos));
            frame.sfx.push(SoundEffect::PortalOpen);
        } else if charged < integrity
            && let Some(portal) = state.portal.take()
        {
            frame.vfx.push(VfxEvent::at(VfxKind::PortalClose, portal.pos));
        }
    }

    if !frame.moved {
        return Ok(());
    }
    let head = state.head_pos();

    if state.secret_portal.is_some_and(|p| p.contains(head)) {
        state.secret_portal = None;
        if !frame.input.seen_evasion_tutorial {
            frame.unlocks.push("evasion".to_string());
        }
        frame.sfx.push(SoundEffect::Warp);
        enter_evasion(state);
        return Err(Halt::Transition);
    }

    if state.portal.is_some_and(|p| p.contains(head)) {
        if state.sequence_matched || state.is_boss_level() {
            complete_level(state, frame);
            return Err(Halt::Transition);
        }
        if state.buffs.shields > 0 {
            block_with_shield(state, frame, head);
            bounce(state, frame);
            return Ok(());
        }
        return Err(Halt::Fatal(Fatal::SequenceMismatch));
    }
    Ok(())
}

fn complete_level(state: &mut GameState, frame: &mut Frame) {
    state.score += state.tuning.level_clear_score;
    frame.exited = true;
    frame.sfx.push(SoundEffect::LevelComplete);
    frame.unlocks.push(format!("level_{}", state.level_id));
    log::info!("Level {} complete, score {}", state.level_id, state.score);
    if state.is_tutorial() {
        state.status = GameStatus::TutorialSummary;
    } else {
        open_shop(state, true);
    }
}

fn collect_coins(state: &mut GameState, frame: &mut Frame) {
    if state.segments.is_empty() {
        return;
    }
    let head = state.head_pos();
    let Some(coin) = state.coins.iter().find(|c| c.pos == head).cloned() else {
        return;
    };
    state.coins.retain(|c| c.id != coin.id);
    let scrambled = state.has_anomaly(AnomalyKind::CreditScramble)
        && state.rng.random_bool(state.tuning.credit_scramble_chance);
    if !scrambled {
        state.currency += coin.value;
    }
    frame.vfx.push(VfxEvent::colored(VfxKind::CoinCollect, head, 0xffd700));
    frame.sfx.push(SoundEffect::Coin);
}

/// Variant of the newest empty segment
fn pending_type(segments: &[Segment]) -> Option<MatterType> {
    segments.iter().rev().find(|s| s.is_empty_body()).and_then(|s| s.variant)
}

fn fail(state: &mut GameState, frame: &mut Frame, fatal: Fatal) {
    let now = frame.now;
    state.direction = IVec2::ZERO;
    state.fill_chain = 0;
    state.pending_type = None;
    frame.reset_input = true;

    if state.is_tutorial() {
        let start = find_safe_start(&state.walls, &state.enemies);
        let id = state.next_entity_id();
        state.segments = vec![Segment::head(id, start, now)];
        state.status = GameStatus::Tutorial;
        state.buffs.invulnerable_until = now + state.tuning.damage_invulnerability_ms;
        frame.tutorial_error = Some(fatal.tutorial_code());
        frame.vfx.push(VfxEvent::at(VfxKind::Respawn, start));
        frame.sfx.push(SoundEffect::Damage);
        log::debug!("Tutorial respawn after {:?}", fatal);
        return;
    }

    for segment in &state.segments {
        let color = segment.variant.map_or(0xffffff, MatterType::color);
        frame.vfx.push(VfxEvent::colored(VfxKind::Debris, segment.pos, color));
    }
    state.segments.clear();
    state.status = GameStatus::GameOver;
    state.game_over_reason = Some(fatal.reason().to_string());
    state.game_over_at = Some(now);
    frame.sfx.push(SoundEffect::GameOver);
    log::info!("Game over on level {}: {}", state.level_id, fatal.reason());
}

/// Tutorial steps: move, collect, fill, portal
fn advance_tutorial(state: &GameState, frame: &mut Frame) {
    if !state.is_tutorial() || frame.tutorial_error.is_some() {
        return;
    }
    let step = frame.input.tutorial_step;
    let done = match step {
        0 => frame.moved,
        1 => frame.collected,
        2 => frame.filled,
        3 => frame.exited,
        _ => false,
    };
    if done {
        frame.next_tutorial_step = step + 1;
    }
}
