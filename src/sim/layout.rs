//! ASCII level layout compiler
//!
//! Turns editor output (rows of `. # T G 0-9 S P W C`) into wall rectangles,
//! gate wiring and enemy spawns. Best effort: ragged rows are clamped or
//! padded and unknown characters read as empty.

use std::collections::VecDeque;

use glam::IVec2;
use serde::{Deserialize, Serialize};

use super::geometry::{CARDINALS, in_bounds};
use super::state::{Enemy, EnemyBehavior, GateChannel, GateLink, Wall, WallKind};
use crate::consts::*;

/// An enemy placed by the layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnemySpawn {
    pub pos: IVec2,
    pub behavior: EnemyBehavior,
}

impl From<&Enemy> for EnemySpawn {
    fn from(enemy: &Enemy) -> Self {
        Self {
            pos: enemy.pos,
            behavior: enemy.behavior,
        }
    }
}

/// Output of `parse_layout`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLayout {
    pub walls: Vec<Wall>,
    pub enemies: Vec<EnemySpawn>,
}

impl EnemyBehavior {
    /// Layout glyph; behaviours the editor cannot place have none
    pub fn glyph(self) -> Option<char> {
        match self {
            EnemyBehavior::Stationary => Some('S'),
            EnemyBehavior::Patrol => Some('P'),
            EnemyBehavior::RandomWalk => Some('W'),
            EnemyBehavior::Chase => Some('C'),
            EnemyBehavior::Ghost | EnemyBehavior::Replicator => None,
        }
    }

    pub fn from_glyph(ch: char) -> Option<Self> {
        match ch {
            'S' => Some(EnemyBehavior::Stationary),
            'P' => Some(EnemyBehavior::Patrol),
            'W' => Some(EnemyBehavior::RandomWalk),
            'C' => Some(EnemyBehavior::Chase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Solid,
    Trap,
}

impl RunKind {
    fn wall_kind(self) -> WallKind {
        match self {
            RunKind::Solid => WallKind::Solid,
            RunKind::Trap => WallKind::Trap,
        }
    }
}

/// Compile a layout into walls and enemy spawns
pub fn parse_layout<S: AsRef<str>>(rows: &[S]) -> ParsedLayout {
    let mut rects: Vec<Wall> = Vec::new();
    let mut gate_cells: Vec<(IVec2, GateChannel)> = Vec::new();
    let mut enemies = Vec::new();

    for y in 0..GRID_HEIGHT {
        let row: Vec<char> = rows
            .get(y as usize)
            .map(|r| r.as_ref().chars().take(GRID_WIDTH as usize).collect())
            .unwrap_or_default();

        let mut run: Option<(RunKind, i32)> = None;
        for x in 0..GRID_WIDTH {
            let ch = row.get(x as usize).copied().unwrap_or('.');
            let class = match ch {
                '#' => Some(RunKind::Solid),
                'T' => Some(RunKind::Trap),
                _ => None,
            };

            if let Some((kind, start)) = run
                && Some(kind) != class
            {
                rects.push(run_rect(kind, start, x, y));
                run = None;
            }
            if run.is_none()
                && let Some(kind) = class
            {
                run = Some((kind, x));
            }

            match ch {
                'G' => gate_cells.push((IVec2::new(x, y), GateChannel::Auto)),
                '0'..='9' => {
                    let digit = ch.to_digit(10).unwrap_or(0) as u8;
                    gate_cells.push((IVec2::new(x, y), GateChannel::Explicit(digit)));
                }
                _ => {
                    if let Some(behavior) = EnemyBehavior::from_glyph(ch) {
                        enemies.push(EnemySpawn {
                            pos: IVec2::new(x, y),
                            behavior,
                        });
                    }
                }
            }
        }
        if let Some((kind, start)) = run {
            rects.push(run_rect(kind, start, GRID_WIDTH, y));
        }
    }

    let gates = link_gates(&gate_cells);
    close_boundary(&mut rects, &gates);

    let mut walls = merge_vertical(rects);
    walls.extend(gates);

    log::debug!(
        "Parsed layout: {} walls, {} gate cells, {} enemies",
        walls.len(),
        gate_cells.len(),
        enemies.len()
    );

    ParsedLayout { walls, enemies }
}

fn run_rect(kind: RunKind, start: i32, end: i32, y: i32) -> Wall {
    Wall {
        x: start,
        y,
        width: end - start,
        height: 1,
        kind: kind.wall_kind(),
    }
}

/// Flood-fill gate cells into clusters and wire their targets
fn link_gates(cells: &[(IVec2, GateChannel)]) -> Vec<Wall> {
    let mut grid: Vec<Option<usize>> = vec![None; (GRID_WIDTH * GRID_HEIGHT) as usize];
    let index = |p: IVec2| (p.y * GRID_WIDTH + p.x) as usize;
    for (i, (pos, _)) in cells.iter().enumerate() {
        grid[index(*pos)] = Some(i);
    }

    // cluster id per cell, ids assigned in scan order
    let mut cluster_of: Vec<Option<u32>> = vec![None; cells.len()];
    let mut channels: Vec<GateChannel> = Vec::new();
    for start in 0..cells.len() {
        if cluster_of[start].is_some() {
            continue;
        }
        let id = channels.len() as u32;
        let channel = cells[start].1;
        channels.push(channel);
        cluster_of[start] = Some(id);

        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            let pos = cells[current].0;
            for dir in CARDINALS {
                let next = pos + dir;
                if !in_bounds(next) {
                    continue;
                }
                if let Some(n) = grid[index(next)]
                    && cluster_of[n].is_none()
                    && cells[n].1 == channel
                {
                    cluster_of[n] = Some(id);
                    queue.push_back(n);
                }
            }
        }
    }

    let auto: Vec<u32> = (0..channels.len() as u32)
        .filter(|&id| channels[id as usize] == GateChannel::Auto)
        .collect();

    let target_of = |id: u32| -> Option<u32> {
        match channels[id as usize] {
            GateChannel::Auto => {
                if auto.len() < 2 {
                    return None;
                }
                let pos = auto.iter().position(|&c| c == id)?;
                Some(auto[(pos + 1) % auto.len()])
            }
            channel @ GateChannel::Explicit(_) => (0..channels.len() as u32)
                .find(|&other| other != id && channels[other as usize] == channel),
        }
    };

    cells
        .iter()
        .zip(cluster_of)
        .map(|(&(pos, channel), cluster)| {
            let cluster = cluster.unwrap_or(0);
            Wall::cell(
                pos.x,
                pos.y,
                WallKind::Gate(GateLink {
                    cluster,
                    channel,
                    target: target_of(cluster),
                }),
            )
        })
        .collect()
}

/// Give every uncovered perimeter cell a solid wall
fn close_boundary(rects: &mut Vec<Wall>, gates: &[Wall]) {
    let mut covered = vec![false; (GRID_WIDTH * GRID_HEIGHT) as usize];
    for wall in rects.iter().chain(gates) {
        for cell in wall.cells() {
            if in_bounds(cell) {
                covered[(cell.y * GRID_WIDTH + cell.x) as usize] = true;
            }
        }
    }
    let is_covered = |x: i32, y: i32| covered[(y * GRID_WIDTH + x) as usize];

    for y in [0, GRID_HEIGHT - 1] {
        let mut start: Option<i32> = None;
        for x in 0..=GRID_WIDTH {
            let open = x < GRID_WIDTH && !is_covered(x, y);
            match (open, start) {
                (true, None) => start = Some(x),
                (false, Some(s)) => {
                    rects.push(run_rect(RunKind::Solid, s, x, y));
                    start = None;
                }
                _ => {}
            }
        }
    }
    for y in 1..GRID_HEIGHT - 1 {
        for x in [0, GRID_WIDTH - 1] {
            if !is_covered(x, y) {
                rects.push(Wall::cell(x, y, WallKind::Solid));
            }
        }
    }
}

/// Merge vertically stacked solid/trap rectangles of identical span
fn merge_vertical(mut rects: Vec<Wall>) -> Vec<Wall> {
    let kind_rank = |kind: WallKind| match kind {
        WallKind::Solid => 0,
        WallKind::Trap => 1,
        WallKind::Gate(_) => 2,
    };
    rects.sort_by_key(|w| (kind_rank(w.kind), w.x, w.width, w.y));

    let mut merged: Vec<Wall> = Vec::with_capacity(rects.len());
    for rect in rects {
        if let Some(last) = merged.last_mut()
            && last.kind == rect.kind
            && last.x == rect.x
            && last.width == rect.width
            && rect.y == last.y + last.height
        {
            last.height += rect.height;
            continue;
        }
        merged.push(rect);
    }
    merged
}

/// Render walls and enemies back into layout rows (editor export)
pub fn export_layout(walls: &[Wall], enemies: &[EnemySpawn]) -> Vec<String> {
    let mut grid = vec![vec!['.'; GRID_WIDTH as usize]; GRID_HEIGHT as usize];
    for wall in walls {
        let glyph = match wall.kind {
            WallKind::Solid => '#',
            WallKind::Trap => 'T',
            WallKind::Gate(GateLink {
                channel: GateChannel::Auto,
                ..
            }) => 'G',
            WallKind::Gate(GateLink {
                channel: GateChannel::Explicit(d),
                ..
            }) => char::from_digit(u32::from(d), 10).unwrap_or('G'),
        };
        for cell in wall.cells().filter(|c| in_bounds(*c)) {
            grid[cell.y as usize][cell.x as usize] = glyph;
        }
    }
    for spawn in enemies {
        if let Some(glyph) = spawn.behavior.glyph()
            && in_bounds(spawn.pos)
        {
            grid[spawn.pos.y as usize][spawn.pos.x as usize] = glyph;
        }
    }
    grid.into_iter().map(|row| row.into_iter().collect()).collect()
}
