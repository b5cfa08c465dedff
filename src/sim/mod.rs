//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - The host supplies the timestamp; nothing reads a clock
//! - Seeded RNG only, carried inside `GameState`
//! - Stable iteration order (by insertion)
//! - No rendering, audio or platform dependencies

pub mod boss;
pub mod enemy;
pub mod evasion;
pub mod event;
pub mod gate;
pub mod geometry;
pub mod layout;
pub mod run;
pub mod shop;
pub mod spawn;
pub mod state;
pub mod tick;

pub use evasion::{finish_evasion, process_evasion_tick};
pub use event::{SoundEffect, VfxEvent, VfxKind};
pub use layout::{EnemySpawn, ParsedLayout, export_layout, parse_layout};
pub use run::{finish_tutorial, leave_shop, new_run, start_level};
pub use shop::{ShopError, purchase, reroll};
pub use state::{
    AnomalyKind, Boss, BossKind, Enemy, EnemyBehavior, GameState, GameStatus, MatterType, Pickup, PickupKind,
    Segment, UpgradeKind, Wall, WallKind,
};
pub use tick::{Fatal, TickInput, TickOutput, process_game_tick};
