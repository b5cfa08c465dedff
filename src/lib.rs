//! Serpent Core - simulation core of a grid arcade game
//!
//! Core modules:
//! - `sim`: Deterministic simulation (chassis, matter, enemies, bosses, evasion run)
//! - `levels`: Level descriptors and procedural level scaling
//! - `tuning`: Data-driven game balance
//! - `audio`: Host-side sound dispatch for the effects a tick emits

pub mod audio;
pub mod levels;
pub mod sim;
pub mod tuning;

pub use levels::LevelData;
pub use tuning::Tuning;

use glam::IVec2;

/// Game configuration constants
pub mod consts {
    /// Board dimensions (cells)
    pub const GRID_WIDTH: i32 = 40;
    pub const GRID_HEIGHT: i32 = 30;
    pub const GRID_CENTER: (i32, i32) = (GRID_WIDTH / 2, GRID_HEIGHT / 2);

    /// Clearance radius for chassis placement, and the degraded retry radius
    pub const SAFE_START_RADIUS: i32 = 4;
    pub const SAFE_START_FALLBACK_RADIUS: i32 = 2;
    /// Placement used when no clear area exists anywhere
    pub const FALLBACK_START: (i32, i32) = (5, 5);
    /// A start candidate this close to the centre ends the search early
    pub const GOOD_ENOUGH_START_DISTANCE: f32 = 5.0;

    /// Enemy trail history (render only)
    pub const ENEMY_TRAIL_LENGTH: usize = 8;
    /// Breadth-first search depth for chasing enemies
    pub const CHASE_SEARCH_DEPTH: usize = 15;

    /// Exit portal footprint and minimum distance from the head
    pub const PORTAL_SIZE: i32 = 2;
    pub const PORTAL_MIN_DISTANCE: f32 = 15.0;

    /// Level ids
    pub const TUTORIAL_LEVEL: u32 = 0;
    pub const BOSS_LEVEL_INTERVAL: u32 = 5;
    pub const CUSTOM_LEVEL_ID: u32 = 999;

    /// Consecutive fills that trigger chain upgrades
    pub const CHAIN_THRESHOLD: u32 = 3;

    /// Evasion run fixed step (ms)
    pub const EVASION_STEP_MS: u64 = 30;
}

/// Board centre as a grid point
#[inline]
pub fn grid_center() -> IVec2 {
    IVec2::new(consts::GRID_CENTER.0, consts::GRID_CENTER.1)
}

/// True if the level id is a boss arena
#[inline]
pub fn is_boss_level(level_id: u32) -> bool {
    level_id > 0
        && level_id != consts::CUSTOM_LEVEL_ID
        && level_id.is_multiple_of(consts::BOSS_LEVEL_INTERVAL)
}
