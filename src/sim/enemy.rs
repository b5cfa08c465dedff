//! Enemy AI
//!
//! Behaviours:
//!   - **Stationary** never moves.
//!   - **Patrol** holds its heading and reverses on obstacles.
//!   - **RandomWalk** re-rolls its heading 20% of the time it moves.
//!   - **Chase** runs a bounded BFS toward the chassis head, greedy fallback.
//!   - **Ghost** steps greedily toward the head straight through walls.
//!   - **Replicator** chases and duplicates on a timer.
//!
//! Every enemy moves once its tick accumulator reaches `move_speed`.
//! Stasis freezes all of them.

use std::collections::{HashSet, VecDeque};

use glam::IVec2;
use rand::Rng;
use rand_pcg::Pcg32;

use super::event::{VfxEvent, VfxKind};
use super::gate::resolve_warp;
use super::geometry::{CARDINALS, WallMap, in_bounds, secondary_step_toward, step_toward};
use super::spawn::find_clear_area;
use super::state::{Enemy, EnemyBehavior, GameState, Wall, WallKind};
use crate::consts::*;

/// Respawned enemies keep at least this far from the head
const RESPAWN_DISTANCE: f32 = 8.0;
/// Chance per eligible tick that a random walker picks a new heading
const RANDOM_TURN_CHANCE: f64 = 0.2;

impl EnemyBehavior {
    /// Default ticks-per-move
    pub fn move_speed(self) -> u32 {
        match self {
            EnemyBehavior::Stationary => 0,
            EnemyBehavior::Patrol => 3,
            EnemyBehavior::RandomWalk => 3,
            EnemyBehavior::Chase => 4,
            EnemyBehavior::Ghost => 6,
            EnemyBehavior::Replicator => 5,
        }
    }

    pub fn color(self) -> u32 {
        match self {
            EnemyBehavior::Stationary => 0x9e9e9e,
            EnemyBehavior::Patrol => 0xff851b,
            EnemyBehavior::RandomWalk => 0xffdc00,
            EnemyBehavior::Chase => 0xff4136,
            EnemyBehavior::Ghost => 0xb10dc9,
            EnemyBehavior::Replicator => 0x01ff70,
        }
    }
}

fn random_cardinal(rng: &mut Pcg32) -> IVec2 {
    CARDINALS[rng.random_range(0..CARDINALS.len())]
}

/// Build an enemy with its behaviour's defaults
pub fn new_enemy(id: u32, pos: IVec2, behavior: EnemyBehavior, now: u64, rng: &mut Pcg32) -> Enemy {
    let dir = match behavior {
        EnemyBehavior::Patrol | EnemyBehavior::RandomWalk => random_cardinal(rng),
        _ => IVec2::ZERO,
    };
    Enemy {
        id,
        pos,
        behavior,
        color: behavior.color(),
        move_speed: behavior.move_speed(),
        current_tick: 0,
        dir,
        frozen: false,
        trail: Vec::new(),
        spawned_at: (behavior == EnemyBehavior::Replicator).then_some(now),
    }
}

/// Place a new enemy of `behavior` away from the head
pub fn spawn_enemy(state: &mut GameState, map: &WallMap, behavior: EnemyBehavior, now: u64) {
    let pos = find_clear_area(state, map, IVec2::ONE, RESPAWN_DISTANCE);
    let id = state.next_entity_id();
    let enemy = new_enemy(id, pos, behavior, now, &mut state.rng);
    state.enemies.push(enemy);
}

/// "Destroyed and respawned elsewhere": move enemy `index` to a fresh cell
pub fn relocate_enemy(state: &mut GameState, map: &WallMap, index: usize) {
    let pos = find_clear_area(state, map, IVec2::ONE, RESPAWN_DISTANCE);
    if let Some(enemy) = state.enemies.get_mut(index) {
        enemy.pos = pos;
        enemy.trail.clear();
        enemy.current_tick = 0;
    }
}

/// Bounded BFS toward `target`; greedy axis step when no path is found in depth
pub fn chase_direction(from: IVec2, target: IVec2, map: &WallMap) -> IVec2 {
    if from == target {
        return IVec2::ZERO;
    }
    let mut visited: HashSet<IVec2> = HashSet::from([from]);
    let mut queue: VecDeque<(IVec2, IVec2, usize)> = VecDeque::with_capacity(64);

    for dir in CARDINALS {
        let next = from + dir;
        if next == target {
            return dir;
        }
        if !map.is_blocked(next) && visited.insert(next) {
            queue.push_back((next, dir, 1));
        }
    }

    while let Some((cell, first, depth)) = queue.pop_front() {
        if depth >= CHASE_SEARCH_DEPTH {
            continue;
        }
        for dir in CARDINALS {
            let next = cell + dir;
            if next == target {
                return first;
            }
            if !map.is_blocked(next) && visited.insert(next) {
                queue.push_back((next, first, depth + 1));
            }
        }
    }

    greedy_direction(from, target, |p| !map.is_blocked(p))
}

fn greedy_direction(from: IVec2, target: IVec2, passable: impl Fn(IVec2) -> bool) -> IVec2 {
    let primary = step_toward(from, target);
    if primary != IVec2::ZERO && passable(from + primary) {
        return primary;
    }
    let secondary = secondary_step_toward(from, target);
    if secondary != IVec2::ZERO && passable(from + secondary) {
        return secondary;
    }
    IVec2::ZERO
}

/// Move every enemy one tick
pub fn update_enemies(state: &mut GameState, map: &WallMap, now: u64, vfx: &mut Vec<VfxEvent>) {
    if state.stasis_active(now) {
        for enemy in &mut state.enemies {
            enemy.frozen = true;
        }
        return;
    }

    let head = state.head_pos();
    // walkers treat the body as solid; only the head is a valid target
    let body: HashSet<IVec2> = state.segments.iter().skip(1).map(|s| s.pos).collect();
    let mut occupied: HashSet<IVec2> = state.enemies.iter().map(|e| e.pos).collect();
    occupied.extend(&body);

    for i in 0..state.enemies.len() {
        let mut enemy = state.enemies[i].clone();
        enemy.frozen = false;
        if enemy.move_speed == 0 {
            state.enemies[i] = enemy;
            continue;
        }
        enemy.current_tick += 1;
        if enemy.current_tick < enemy.move_speed {
            state.enemies[i] = enemy;
            continue;
        }
        enemy.current_tick = 0;

        if !body.contains(&enemy.pos) {
            occupied.remove(&enemy.pos);
        }
        step_enemy(&mut enemy, head, &state.walls, map, &mut state.rng, &occupied, vfx);
        occupied.insert(enemy.pos);
        state.enemies[i] = enemy;
    }

    replicate(state, map, now, &mut occupied);
}

fn step_enemy(
    enemy: &mut Enemy,
    head: IVec2,
    walls: &[Wall],
    map: &WallMap,
    rng: &mut Pcg32,
    occupied: &HashSet<IVec2>,
    vfx: &mut Vec<VfxEvent>,
) {
    let from = enemy.pos;
    match enemy.behavior {
        EnemyBehavior::Stationary => return,
        EnemyBehavior::Patrol => {
            if enemy.dir == IVec2::ZERO {
                enemy.dir = random_cardinal(rng);
            }
        }
        EnemyBehavior::RandomWalk => {
            if enemy.dir == IVec2::ZERO || rng.random_bool(RANDOM_TURN_CHANCE) {
                enemy.dir = random_cardinal(rng);
            }
        }
        EnemyBehavior::Chase | EnemyBehavior::Replicator => {
            enemy.dir = chase_direction(from, head, map);
        }
        EnemyBehavior::Ghost => {
            enemy.dir = greedy_direction(from, head, |p| {
                in_bounds(p) && p.x > 0 && p.y > 0 && p.x < GRID_WIDTH - 1 && p.y < GRID_HEIGHT - 1
            });
            if enemy.dir != IVec2::ZERO {
                enemy.pos = from + enemy.dir;
                enemy.record_trail(from);
            }
            return;
        }
    }

    if enemy.dir == IVec2::ZERO {
        return;
    }
    let target = from + enemy.dir;
    let reverses = matches!(enemy.behavior, EnemyBehavior::Patrol | EnemyBehavior::RandomWalk);

    match map.kind_at(walls, target) {
        None if in_bounds(target) && !occupied.contains(&target) => {
            enemy.pos = target;
            enemy.record_trail(from);
        }
        Some(WallKind::Gate(link)) => {
            match resolve_warp(walls, map, link, enemy.dir, rng, |p| !occupied.contains(&p)) {
                Some(warp) => {
                    enemy.pos = warp.pos;
                    enemy.dir = warp.dir;
                    enemy.record_trail(from);
                    vfx.push(VfxEvent::colored(VfxKind::Warp, warp.pos, enemy.color));
                }
                None if reverses => enemy.dir = -enemy.dir,
                None => {}
            }
        }
        _ if reverses => enemy.dir = -enemy.dir,
        _ => {}
    }
}

fn replicate(state: &mut GameState, map: &WallMap, now: u64, occupied: &mut HashSet<IVec2>) {
    let interval = state.tuning.replicate_interval_ms;
    let max = state.tuning.max_enemies;
    let mut children = Vec::new();

    for enemy in state.enemies.iter_mut() {
        if enemy.behavior != EnemyBehavior::Replicator {
            continue;
        }
        let Some(born) = enemy.spawned_at else {
            enemy.spawned_at = Some(now);
            continue;
        };
        if now.saturating_sub(born) < interval {
            continue;
        }
        enemy.spawned_at = Some(now);
        let spot = CARDINALS
            .iter()
            .map(|d| enemy.pos + *d)
            .find(|p| !map.is_blocked(*p) && !occupied.contains(p));
        if let Some(spot) = spot {
            occupied.insert(spot);
            children.push(spot);
        }
    }

    for pos in children {
        if state.enemies.len() >= max {
            break;
        }
        let id = state.next_entity_id();
        let child = new_enemy(id, pos, EnemyBehavior::Replicator, now, &mut state.rng);
        state.enemies.push(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::layout::{parse_layout, tests::layout_with};
    use crate::sim::state::{MatterType, Segment};
    use rand::SeedableRng;

    fn state_with(cells: &[(i32, i32, char)], head: IVec2) -> GameState {
        let mut state = GameState::new(3);
        state.walls = parse_layout(&layout_with(cells)).walls;
        state.segments = vec![Segment::head(100, head, 0)];
        state
    }

    fn add_enemy(state: &mut GameState, pos: IVec2, behavior: EnemyBehavior) -> usize {
        let mut rng = Pcg32::seed_from_u64(1);
        let mut enemy = new_enemy(state.enemies.len() as u32 + 1, pos, behavior, 0, &mut rng);
        enemy.move_speed = 1;
        state.enemies.push(enemy);
        state.enemies.len() - 1
    }

    #[test]
    fn test_stationary_never_moves() {
        let mut state = state_with(&[], IVec2::new(5, 5));
        let i = add_enemy(&mut state, IVec2::new(10, 10), EnemyBehavior::Stationary);
        state.enemies[i].move_speed = 0;
        let map = WallMap::new(&state.walls);
        for t in 0..20 {
            update_enemies(&mut state, &map, t, &mut Vec::new());
        }
        assert_eq!(state.enemies[i].pos, IVec2::new(10, 10));
    }

    #[test]
    fn test_move_speed_gates_movement() {
        let mut state = state_with(&[], IVec2::new(5, 5));
        let i = add_enemy(&mut state, IVec2::new(20, 5), EnemyBehavior::Chase);
        state.enemies[i].move_speed = 3;
        let map = WallMap::new(&state.walls);
        update_enemies(&mut state, &map, 0, &mut Vec::new());
        update_enemies(&mut state, &map, 0, &mut Vec::new());
        assert_eq!(state.enemies[i].pos, IVec2::new(20, 5));
        update_enemies(&mut state, &map, 0, &mut Vec::new());
        assert_eq!(state.enemies[i].pos, IVec2::new(19, 5));
    }

    #[test]
    fn test_patrol_reverses_on_wall() {
        let mut state = state_with(&[(12, 10, '#')], IVec2::new(5, 25));
        let i = add_enemy(&mut state, IVec2::new(11, 10), EnemyBehavior::Patrol);
        state.enemies[i].dir = IVec2::X;
        let map = WallMap::new(&state.walls);
        update_enemies(&mut state, &map, 0, &mut Vec::new());
        assert_eq!(state.enemies[i].pos, IVec2::new(11, 10));
        assert_eq!(state.enemies[i].dir, IVec2::NEG_X);
        update_enemies(&mut state, &map, 0, &mut Vec::new());
        assert_eq!(state.enemies[i].pos, IVec2::new(10, 10));
    }

    #[test]
    fn test_patrol_reverses_on_body() {
        let mut state = state_with(&[], IVec2::new(11, 10));
        state.segments.push(Segment::empty_body(101, IVec2::new(10, 10), MatterType::Alpha, 0));
        let i = add_enemy(&mut state, IVec2::new(9, 10), EnemyBehavior::Patrol);
        state.enemies[i].dir = IVec2::X;
        let map = WallMap::new(&state.walls);
        update_enemies(&mut state, &map, 0, &mut Vec::new());
        assert_eq!(state.enemies[i].pos, IVec2::new(9, 10));
        assert_eq!(state.enemies[i].dir, IVec2::NEG_X);
    }

    #[test]
    fn test_chase_paths_around_wall() {
        // wall between enemy and head with a gap at the bottom
        let cells: Vec<_> = (2..20).map(|y| (15, y, '#')).collect();
        let map = WallMap::new(&parse_layout(&layout_with(&cells)).walls);
        let dir = chase_direction(IVec2::new(14, 18), IVec2::new(16, 18), &map);
        assert_eq!(dir, IVec2::Y);
    }

    #[test]
    fn test_chase_falls_back_to_greedy_beyond_depth() {
        let map = WallMap::new(&parse_layout(&layout_with(&[])).walls);
        let dir = chase_direction(IVec2::new(2, 2), IVec2::new(37, 27), &map);
        assert_eq!(dir, IVec2::X);
    }

    #[test]
    fn test_ghost_passes_through_walls() {
        let mut state = state_with(&[(11, 10, '#')], IVec2::new(15, 10));
        let i = add_enemy(&mut state, IVec2::new(10, 10), EnemyBehavior::Ghost);
        let map = WallMap::new(&state.walls);
        update_enemies(&mut state, &map, 0, &mut Vec::new());
        assert_eq!(state.enemies[i].pos, IVec2::new(11, 10));
    }

    #[test]
    fn test_stasis_freezes() {
        let mut state = state_with(&[], IVec2::new(5, 5));
        let i = add_enemy(&mut state, IVec2::new(20, 5), EnemyBehavior::Chase);
        state.buffs.stasis_until = 1_000;
        let map = WallMap::new(&state.walls);
        update_enemies(&mut state, &map, 500, &mut Vec::new());
        assert!(state.enemies[i].frozen);
        assert_eq!(state.enemies[i].pos, IVec2::new(20, 5));
        update_enemies(&mut state, &map, 1_000, &mut Vec::new());
        assert!(!state.enemies[i].frozen);
        assert_eq!(state.enemies[i].pos, IVec2::new(19, 5));
    }

    #[test]
    fn test_patrol_warps_through_gate() {
        let mut state = state_with(&[(12, 10, 'G'), (30, 20, 'G')], IVec2::new(5, 25));
        let i = add_enemy(&mut state, IVec2::new(11, 10), EnemyBehavior::Patrol);
        state.enemies[i].dir = IVec2::X;
        let map = WallMap::new(&state.walls);
        let mut vfx = Vec::new();
        update_enemies(&mut state, &map, 0, &mut vfx);
        assert_eq!(state.enemies[i].pos, IVec2::new(31, 20));
        assert_eq!(state.enemies[i].dir, IVec2::X);
        assert!(vfx.iter().any(|e| e.kind == VfxKind::Warp));
    }

    #[test]
    fn test_replicator_duplicates_on_interval() {
        let mut state = state_with(&[], IVec2::new(5, 5));
        let i = add_enemy(&mut state, IVec2::new(20, 20), EnemyBehavior::Replicator);
        state.enemies[i].move_speed = 100;
        let map = WallMap::new(&state.walls);
        update_enemies(&mut state, &map, 7_999, &mut Vec::new());
        assert_eq!(state.enemies.len(), 1);
        update_enemies(&mut state, &map, 8_000, &mut Vec::new());
        assert_eq!(state.enemies.len(), 2);
        assert_eq!(state.enemies[0].spawned_at, Some(8_000));
        assert_eq!(state.enemies[1].spawned_at, Some(8_000));
    }

    #[test]
    fn test_trail_is_bounded() {
        let mut state = state_with(&[], IVec2::new(38, 15));
        let i = add_enemy(&mut state, IVec2::new(2, 15), EnemyBehavior::Chase);
        let map = WallMap::new(&state.walls);
        for t in 0..20 {
            update_enemies(&mut state, &map, t, &mut Vec::new());
        }
        assert_eq!(state.enemies[i].trail.len(), ENEMY_TRAIL_LENGTH);
    }
}
