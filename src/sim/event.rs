//! Effect events emitted during a tick.
//!
//! The presentation layer consumes these for particles and sound; the
//! simulation never draws or plays anything itself.

use glam::IVec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VfxKind {
    Fill,
    Unfill,
    Grow,
    ShieldBlock,
    Warp,
    EnemyDestroyed,
    Emp,
    BossHit,
    BossDeath,
    BossTeleport,
    AnchorExpired,
    PortalOpen,
    PortalClose,
    CoinCollect,
    Stasis,
    Decay,
    Truncate,
    /// Chassis pieces scattered at game over
    Debris,
    TrapShift,
    Respawn,
}

/// Visual effect descriptor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VfxEvent {
    pub kind: VfxKind,
    pub x: f32,
    pub y: f32,
    pub color: Option<u32>,
}

impl VfxEvent {
    pub fn at(kind: VfxKind, pos: IVec2) -> Self {
        Self {
            kind,
            x: pos.x as f32,
            y: pos.y as f32,
            color: None,
        }
    }

    pub fn colored(kind: VfxKind, pos: IVec2, color: u32) -> Self {
        Self {
            color: Some(color),
            ..Self::at(kind, pos)
        }
    }
}

/// Sound effect cues, dispatched by the host's audio service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundEffect {
    Fill,
    Grow,
    Damage,
    ShieldBlock,
    Warp,
    Coin,
    EnemyKill,
    Emp,
    PowerUp,
    BossHit,
    BossDeath,
    PortalOpen,
    LevelComplete,
    GameOver,
    Countdown,
    EvasionCoin,
    EvasionCrash,
    EvasionClear,
}
