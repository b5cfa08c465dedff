//! Level descriptors
//!
//! Levels arrive as camelCase JSON from the host (or a saved custom level) or
//! are generated procedurally from the level id. Difficulty scales with id:
//! more walls, traps, gates and enemies, a higher charge target, a longer
//! required sequence and a faster tick.

use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::sim::layout::{EnemySpawn, export_layout};
use crate::sim::state::{EnemyBehavior, GameState, MatterType};

/// Default tick interval (ms)
pub const DEFAULT_TICK_RATE: u64 = 120;
const MIN_TICK_RATE: u64 = 70;
/// Half-size of the square kept clear around the board centre
const CENTER_CLEARANCE: i32 = 6;

const BOSS_NAMES: [&str; 4] = ["Pursuit", "Resource Race", "Area Denial", "Race Condition"];

/// Errors reading or writing a level descriptor
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("invalid level json: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_tick_rate() -> u64 {
    DEFAULT_TICK_RATE
}

/// External level descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelData {
    pub id: u32,
    pub name: String,
    /// Charge needed to open the exit portal
    pub integrity: u32,
    /// Required charge sequence
    #[serde(default)]
    pub sequence: Vec<MatterType>,
    /// ASCII rows, see `sim::layout`
    pub layout: Vec<String>,
    /// Enemies spawned on top of the layout's own
    #[serde(default)]
    pub enemy_count_bonus: u32,
    /// Behaviour pool for bonus enemies
    #[serde(default)]
    pub enemy_types: Vec<EnemyBehavior>,
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u64,
}

impl LevelData {
    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        let level: LevelData = serde_json::from_str(json)?;
        log::debug!("Loaded level {} ({})", level.id, level.name);
        Ok(level)
    }

    pub fn to_json(&self) -> Result<String, LevelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Copy for saving as a custom level (id reset to the sentinel)
    pub fn to_custom(&self) -> LevelData {
        LevelData {
            id: CUSTOM_LEVEL_ID,
            ..self.clone()
        }
    }

    /// Capture the current board as a custom level
    pub fn snapshot(state: &GameState) -> LevelData {
        let spawns: Vec<EnemySpawn> = state.enemies.iter().map(EnemySpawn::from).collect();
        LevelData {
            id: CUSTOM_LEVEL_ID,
            name: state.level_name.clone(),
            integrity: state.integrity,
            sequence: state.required_sequence.clone(),
            layout: export_layout(&state.walls, &spawns),
            enemy_count_bonus: 0,
            enemy_types: Vec::new(),
            tick_rate: state.tick_rate,
        }
    }
}

/// Level descriptor for `id`
pub fn level_for(id: u32, rng: &mut Pcg32) -> LevelData {
    if id == TUTORIAL_LEVEL {
        tutorial_level()
    } else if crate::is_boss_level(id) {
        boss_arena(id)
    } else {
        generate_level(id, rng)
    }
}

fn blank_grid() -> Vec<Vec<char>> {
    let mut grid = vec![vec!['.'; GRID_WIDTH as usize]; GRID_HEIGHT as usize];
    for (y, row) in grid.iter_mut().enumerate() {
        for (x, cell) in row.iter_mut().enumerate() {
            let (x, y) = (x as i32, y as i32);
            if x == 0 || y == 0 || x == GRID_WIDTH - 1 || y == GRID_HEIGHT - 1 {
                *cell = '#';
            }
        }
    }
    grid
}

fn rows(grid: Vec<Vec<char>>) -> Vec<String> {
    grid.into_iter().map(|r| r.into_iter().collect()).collect()
}

fn stamp(grid: &mut [Vec<char>], x: i32, y: i32, w: i32, h: i32, ch: char) {
    for yy in y..y + h {
        for xx in x..x + w {
            grid[yy as usize][xx as usize] = ch;
        }
    }
}

/// Level 0: an open room with two short walls
pub fn tutorial_level() -> LevelData {
    let mut grid = blank_grid();
    stamp(&mut grid, 6, 6, 8, 1, '#');
    stamp(&mut grid, 26, 23, 8, 1, '#');
    LevelData {
        id: TUTORIAL_LEVEL,
        name: "Calibration".to_string(),
        integrity: 2,
        sequence: vec![MatterType::Alpha],
        layout: rows(grid),
        enemy_count_bonus: 0,
        enemy_types: Vec::new(),
        tick_rate: 150,
    }
}

/// Boss arena: four pillars, no sequence, no regular enemies
pub fn boss_arena(id: u32) -> LevelData {
    let mut grid = blank_grid();
    for (x, y) in [(8, 6), (30, 6), (8, 22), (30, 22)] {
        stamp(&mut grid, x, y, 2, 2, '#');
    }
    let cycle = (id / BOSS_LEVEL_INTERVAL).saturating_sub(1) as usize % BOSS_NAMES.len();
    LevelData {
        id,
        name: format!("Arena: {}", BOSS_NAMES[cycle]),
        integrity: 0,
        sequence: Vec::new(),
        layout: rows(grid),
        enemy_count_bonus: 0,
        enemy_types: Vec::new(),
        tick_rate: 110,
    }
}

fn near_center(x: i32, y: i32, w: i32, h: i32) -> bool {
    let (cx, cy) = GRID_CENTER;
    x < cx + CENTER_CLEARANCE
        && x + w > cx - CENTER_CLEARANCE
        && y < cy + CENTER_CLEARANCE
        && y + h > cy - CENTER_CLEARANCE
}

/// Random interior cell outside the centre clearance that is still empty
fn free_cell(grid: &[Vec<char>], rng: &mut Pcg32) -> Option<(i32, i32)> {
    (0..100).find_map(|_| {
        let x = rng.random_range(2..GRID_WIDTH - 2);
        let y = rng.random_range(2..GRID_HEIGHT - 2);
        (grid[y as usize][x as usize] == '.' && !near_center(x, y, 1, 1)).then_some((x, y))
    })
}

/// Procedural level scaled by `id`
pub fn generate_level(id: u32, rng: &mut Pcg32) -> LevelData {
    let mut grid = blank_grid();

    let blocks = (3 + id / 2).min(14);
    for _ in 0..blocks {
        let w = rng.random_range(1..=5);
        let h = rng.random_range(1..=4);
        let x = rng.random_range(2..GRID_WIDTH - 2 - w);
        let y = rng.random_range(2..GRID_HEIGHT - 2 - h);
        if !near_center(x, y, w, h) {
            stamp(&mut grid, x, y, w, h, '#');
        }
    }

    let traps = (id.saturating_sub(2) / 2).min(6);
    for _ in 0..traps {
        if let Some((x, y)) = free_cell(&grid, rng) {
            grid[y as usize][x as usize] = 'T';
        }
    }

    let mut gate_pairs = Vec::new();
    if id >= 4 {
        gate_pairs.push('G');
    }
    if id >= 8 {
        gate_pairs.push('1');
    }
    for ch in gate_pairs {
        for _ in 0..2 {
            if let Some((x, y)) = free_cell(&grid, rng) {
                grid[y as usize][x as usize] = ch;
            }
        }
    }

    let mut pool = vec![EnemyBehavior::Patrol, EnemyBehavior::RandomWalk];
    if id >= 3 {
        pool.push(EnemyBehavior::Chase);
    }
    let placed = (1 + id / 4).min(4);
    for _ in 0..placed {
        let behavior = pool[rng.random_range(0..pool.len())];
        if let (Some((x, y)), Some(glyph)) = (free_cell(&grid, rng), behavior.glyph()) {
            grid[y as usize][x as usize] = glyph;
        }
    }

    let mut enemy_types = pool.clone();
    if id >= 6 {
        enemy_types.push(EnemyBehavior::Ghost);
    }
    if id >= 9 {
        enemy_types.push(EnemyBehavior::Replicator);
    }

    let sequence_len = (1 + id / 3).min(4) as usize;
    let sequence = (0..sequence_len).map(|_| MatterType::random(rng)).collect();

    LevelData {
        id,
        name: format!("Sector {id}"),
        integrity: (3 + id).min(18),
        sequence,
        layout: rows(grid),
        enemy_count_bonus: (id / 3).min(5),
        enemy_types,
        tick_rate: DEFAULT_TICK_RATE.saturating_sub(4 * id as u64).max(MIN_TICK_RATE),
    }
}
