//! Spawn and placement
//!
//! Finds clear cells for the chassis, pickups, coins, portals and bosses.
//! Searches are bounded; on exhaustion they degrade to a best-effort
//! coordinate instead of failing.

use std::collections::HashSet;

use glam::IVec2;
use rand::Rng;

use super::geometry::{WallMap, distance, in_bounds};
use super::state::{Coin, Enemy, GameState, MatterType, Pickup, PickupKind, UpgradeKind, Wall};
use crate::consts::*;
use crate::grid_center;

/// Random placement attempts before falling back to a scan
const PLACEMENT_ATTEMPTS: usize = 200;
/// Pickups and coins keep this far from the head
const MIN_HEAD_DISTANCE: f32 = 3.0;

/// Cells already taken by entities
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    cells: HashSet<IVec2>,
}

impl Occupancy {
    pub fn from_state(state: &GameState) -> Self {
        let mut cells = HashSet::new();
        cells.extend(state.segments.iter().map(|s| s.pos));
        cells.extend(state.enemies.iter().map(|e| e.pos));
        cells.extend(state.pickups.iter().map(|p| p.pos));
        cells.extend(state.coins.iter().map(|c| c.pos));
        for portal in state.portal.iter().chain(state.secret_portal.iter()) {
            for dy in 0..PORTAL_SIZE {
                for dx in 0..PORTAL_SIZE {
                    cells.insert(portal.pos + IVec2::new(dx, dy));
                }
            }
        }
        if let Some(boss) = &state.boss {
            cells.extend(boss.cells());
        }
        Self { cells }
    }

    pub fn contains(&self, p: IVec2) -> bool {
        self.cells.contains(&p)
    }

    pub fn insert(&mut self, p: IVec2) {
        self.cells.insert(p);
    }

    pub fn remove(&mut self, p: IVec2) {
        self.cells.remove(&p);
    }

    fn area_free(&self, pos: IVec2, size: IVec2) -> bool {
        (pos.y..pos.y + size.y).all(|y| (pos.x..pos.x + size.x).all(|x| !self.contains(IVec2::new(x, y))))
    }
}

/// True if the square of `radius` around `center` is on the board, wall-free and enemy-free
fn area_safe(map: &WallMap, enemies: &[Enemy], center: IVec2, radius: i32) -> bool {
    let min = center - IVec2::splat(radius);
    let max = center + IVec2::splat(radius);
    if !in_bounds(min) || !in_bounds(max) {
        return false;
    }
    let size = IVec2::splat(radius * 2 + 1);
    map.area_clear(min, size)
        && !enemies.iter().any(|e| {
            e.pos.x >= min.x && e.pos.x <= max.x && e.pos.y >= min.y && e.pos.y <= max.y
        })
}

fn nearest_safe_to_center(map: &WallMap, enemies: &[Enemy], radius: i32) -> Option<IVec2> {
    let center = grid_center();
    if area_safe(map, enemies, center, radius) {
        return Some(center);
    }
    let mut best: Option<(f32, IVec2)> = None;
    for y in radius..GRID_HEIGHT - radius {
        for x in radius..GRID_WIDTH - radius {
            let candidate = IVec2::new(x, y);
            if !area_safe(map, enemies, candidate, radius) {
                continue;
            }
            let d = distance(candidate, center);
            if best.is_none_or(|(bd, _)| d < bd) {
                best = Some((d, candidate));
                if d <= GOOD_ENOUGH_START_DISTANCE {
                    return Some(candidate);
                }
            }
        }
    }
    best.map(|(_, p)| p)
}

/// Chassis placement: the clear spot nearest the board centre
pub fn find_safe_start(walls: &[Wall], enemies: &[Enemy]) -> IVec2 {
    let map = WallMap::new(walls);
    if let Some(p) = nearest_safe_to_center(&map, enemies, SAFE_START_RADIUS) {
        return p;
    }
    if let Some(p) = nearest_safe_to_center(&map, enemies, SAFE_START_FALLBACK_RADIUS) {
        log::warn!("No radius-{} start area, using degraded radius", SAFE_START_RADIUS);
        return p;
    }
    log::warn!("No safe start area at all, using fixed fallback");
    IVec2::new(FALLBACK_START.0, FALLBACK_START.1)
}

/// A random free cell away from the head
pub fn random_safe(state: &mut GameState, map: &WallMap) -> IVec2 {
    let occupancy = Occupancy::from_state(state);
    random_safe_with(state, map, &occupancy)
}

pub fn random_safe_with(state: &mut GameState, map: &WallMap, occupancy: &Occupancy) -> IVec2 {
    let head = state.head_pos();
    let usable = |p: IVec2| !map.is_blocked(p) && !occupancy.contains(p) && distance(p, head) >= MIN_HEAD_DISTANCE;

    for _ in 0..PLACEMENT_ATTEMPTS {
        let p = IVec2::new(
            state.rng.random_range(1..GRID_WIDTH - 1),
            state.rng.random_range(1..GRID_HEIGHT - 1),
        );
        if usable(p) {
            return p;
        }
    }
    log::warn!("Random placement exhausted, scanning for a free cell");
    (1..GRID_HEIGHT - 1)
        .flat_map(|y| (1..GRID_WIDTH - 1).map(move |x| IVec2::new(x, y)))
        .find(|p| usable(*p))
        .unwrap_or_else(grid_center)
}

/// A clear `size` footprint at least `min_head_distance` from the head.
/// Returns the farthest clear candidate seen when the constraint cannot be met.
pub fn find_clear_area(state: &mut GameState, map: &WallMap, size: IVec2, min_head_distance: f32) -> IVec2 {
    let occupancy = Occupancy::from_state(state);
    let head = state.head_pos();
    let mut best: Option<(f32, IVec2)> = None;

    for _ in 0..PLACEMENT_ATTEMPTS {
        let p = IVec2::new(
            state.rng.random_range(1..GRID_WIDTH - size.x),
            state.rng.random_range(1..GRID_HEIGHT - size.y),
        );
        if !map.area_clear(p, size) || !occupancy.area_free(p, size) {
            continue;
        }
        let d = distance(p, head);
        if d > min_head_distance {
            return p;
        }
        if best.is_none_or(|(bd, _)| d > bd) {
            best = Some((d, p));
        }
    }
    log::warn!("Area placement exhausted ({}x{}), using best effort", size.x, size.y);
    best.map(|(_, p)| p).unwrap_or_else(grid_center)
}

/// Exit portal placement
pub fn spawn_portal(state: &mut GameState, map: &WallMap) -> IVec2 {
    find_clear_area(state, map, IVec2::splat(PORTAL_SIZE), PORTAL_MIN_DISTANCE)
}

/// Place one pickup of `kind` and return its id
pub fn spawn_pickup(state: &mut GameState, map: &WallMap, kind: PickupKind) -> u32 {
    let pos = random_safe(state, map);
    let id = state.next_entity_id();
    state.pickups.push(Pickup { id, pos, kind });
    id
}

/// Keep every base matter type on the board and roll for special pickups
pub fn spawn_pickups_if_needed(state: &mut GameState, map: &WallMap) {
    for matter in MatterType::ALL {
        let present = state
            .pickups
            .iter()
            .any(|p| p.kind == PickupKind::Matter(matter));
        if !present {
            spawn_pickup(state, map, PickupKind::Matter(matter));
        }
    }

    let has_special = |state: &GameState, kind: PickupKind| state.pickups.iter().any(|p| p.kind == kind);

    if state.has_upgrade(UpgradeKind::StasisField) && !has_special(state, PickupKind::StasisOrb) {
        let chance = state.tuning.stasis_orb_chance;
        if state.rng.random_bool(chance) {
            spawn_pickup(state, map, PickupKind::StasisOrb);
        }
    }

    if state.has_upgrade(UpgradeKind::ShieldGenerator)
        && !has_special(state, PickupKind::Shield)
        && state.buffs.shields < state.shield_capacity()
    {
        let chance = state.tuning.shield_pickup_chance;
        if state.rng.random_bool(chance) {
            spawn_pickup(state, map, PickupKind::Shield);
        }
    }
}

/// Scatter `count` coins
pub fn spawn_coins(state: &mut GameState, map: &WallMap, count: usize) {
    let mut occupancy = Occupancy::from_state(state);
    for _ in 0..count {
        let pos = random_safe_with(state, map, &occupancy);
        occupancy.insert(pos);
        let id = state.next_entity_id();
        let value = state.tuning.coin_value;
        state.coins.push(Coin { id, pos, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::layout::{parse_layout, tests::layout_with};
    use crate::sim::state::{EnemyBehavior, Segment};

    fn enemy_at(pos: IVec2) -> Enemy {
        Enemy {
            id: 1,
            pos,
            behavior: EnemyBehavior::Stationary,
            color: 0,
            move_speed: 0,
            current_tick: 0,
            dir: IVec2::ZERO,
            frozen: false,
            trail: Vec::new(),
            spawned_at: None,
        }
    }

    #[test]
    fn test_safe_start_prefers_center() {
        let parsed = parse_layout(&layout_with(&[]));
        assert_eq!(find_safe_start(&parsed.walls, &[]), grid_center());
    }

    #[test]
    fn test_safe_start_avoids_blocked_center() {
        let parsed = parse_layout(&layout_with(&[(20, 15, '#')]));
        let enemies = [enemy_at(IVec2::new(18, 15))];
        let start = find_safe_start(&parsed.walls, &enemies);
        assert_ne!(start, grid_center());
        let map = WallMap::new(&parsed.walls);
        assert!(area_safe(&map, &enemies, start, SAFE_START_RADIUS));
        assert!(distance(start, grid_center()) <= 8.0);
    }

    #[test]
    fn test_safe_start_degrades_then_falls_back() {
        // walls every 6th column and row leave only 5x5 pockets
        let mut cells = Vec::new();
        for y in 0..GRID_HEIGHT {
            for x in 0..GRID_WIDTH {
                if x % 6 == 0 || y % 6 == 0 {
                    cells.push((x, y, '#'));
                }
            }
        }
        let parsed = parse_layout(&layout_with(&cells));
        let start = find_safe_start(&parsed.walls, &[]);
        let map = WallMap::new(&parsed.walls);
        assert!(area_safe(&map, &[], start, SAFE_START_FALLBACK_RADIUS));

        let full: Vec<_> = (0..GRID_HEIGHT)
            .flat_map(|y| (0..GRID_WIDTH).map(move |x| (x, y, '#')))
            .collect();
        let parsed = parse_layout(&layout_with(&full));
        assert_eq!(
            find_safe_start(&parsed.walls, &[]),
            IVec2::new(FALLBACK_START.0, FALLBACK_START.1)
        );
    }

    #[test]
    fn test_pickup_invariant_spawns_each_base_type() {
        let mut state = GameState::new(11);
        state.walls = parse_layout(&layout_with(&[])).walls;
        state.segments = vec![Segment::head(1, grid_center(), 0)];
        let map = WallMap::new(&state.walls);
        spawn_pickups_if_needed(&mut state, &map);
        for matter in MatterType::ALL {
            assert_eq!(
                state.pickups.iter().filter(|p| p.kind == PickupKind::Matter(matter)).count(),
                1
            );
        }
        // idempotent while present
        spawn_pickups_if_needed(&mut state, &map);
        assert_eq!(state.pickups.len(), 3);
        assert!(state.pickups.iter().all(|p| !map.is_blocked(p.pos)));
    }

    #[test]
    fn test_specials_require_upgrade() {
        let mut state = GameState::new(5);
        state.tuning.stasis_orb_chance = 1.0;
        state.tuning.shield_pickup_chance = 1.0;
        state.walls = parse_layout(&layout_with(&[])).walls;
        let map = WallMap::new(&state.walls);
        spawn_pickups_if_needed(&mut state, &map);
        assert!(!state.pickups.iter().any(|p| p.kind == PickupKind::StasisOrb));

        state.upgrades.push(crate::sim::shop::new_upgrade(UpgradeKind::StasisField));
        spawn_pickups_if_needed(&mut state, &map);
        spawn_pickups_if_needed(&mut state, &map);
        assert_eq!(state.pickups.iter().filter(|p| p.kind == PickupKind::StasisOrb).count(), 1);
    }

    #[test]
    fn test_portal_keeps_distance_from_head() {
        let mut state = GameState::new(21);
        state.walls = parse_layout(&layout_with(&[])).walls;
        state.segments = vec![Segment::head(1, IVec2::new(3, 3), 0)];
        let map = WallMap::new(&state.walls);
        let portal = spawn_portal(&mut state, &map);
        assert!(distance(portal, IVec2::new(3, 3)) > PORTAL_MIN_DISTANCE);
        assert!(map.area_clear(portal, IVec2::splat(PORTAL_SIZE)));
    }

    #[test]
    fn test_coins_do_not_stack() {
        let mut state = GameState::new(2);
        state.walls = parse_layout(&layout_with(&[])).walls;
        let map = WallMap::new(&state.walls);
        spawn_coins(&mut state, &map, 10);
        let unique: HashSet<_> = state.coins.iter().map(|c| c.pos).collect();
        assert_eq!(unique.len(), 10);
    }
}
