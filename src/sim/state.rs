//! Game state and core simulation types
//!
//! Everything a tick reads or writes lives here, including the PRNG, so two
//! states built from the same seed and fed the same inputs stay identical.

use glam::{IVec2, Vec2};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::tuning::Tuning;

/// The three base kinds of matter a chassis segment can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatterType {
    Alpha,
    Beta,
    Gamma,
}

impl MatterType {
    pub const ALL: [MatterType; 3] = [MatterType::Alpha, MatterType::Beta, MatterType::Gamma];

    /// Display colour (0xRRGGBB) forwarded with effect events
    pub fn color(self) -> u32 {
        match self {
            MatterType::Alpha => 0x00e5ff,
            MatterType::Beta => 0xff2bd6,
            MatterType::Gamma => 0xffd400,
        }
    }

    pub fn random(rng: &mut Pcg32) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }
}

/// Role of a chassis segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    Head,
    Body,
}

/// One unit of the chassis. Index 0 is always the head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: u32,
    pub pos: IVec2,
    pub kind: SegmentKind,
    pub charged: bool,
    /// Matter type that satisfies this segment (body only)
    pub variant: Option<MatterType>,
    /// Part of the matched required sequence (render highlight)
    #[serde(default)]
    pub sequence_part: bool,
    /// Timestamp the segment was grown (ms)
    pub created_at: u64,
}

impl Segment {
    pub fn head(id: u32, pos: IVec2, now: u64) -> Self {
        Self {
            id,
            pos,
            kind: SegmentKind::Head,
            charged: false,
            variant: None,
            sequence_part: false,
            created_at: now,
        }
    }

    /// A freshly grown, empty body segment
    pub fn empty_body(id: u32, pos: IVec2, variant: MatterType, now: u64) -> Self {
        Self {
            id,
            pos,
            kind: SegmentKind::Body,
            charged: false,
            variant: Some(variant),
            sequence_part: false,
            created_at: now,
        }
    }

    pub fn is_empty_body(&self) -> bool {
        self.kind == SegmentKind::Body && !self.charged
    }
}

/// Gate pairing channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateChannel {
    /// `G` cells: clusters pair sequentially
    Auto,
    /// Digit cells: clusters pair with clusters sharing the digit
    Explicit(u8),
}

/// Teleport wiring of one gate cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateLink {
    pub cluster: u32,
    pub channel: GateChannel,
    /// Parse-time partner (fixed for auto, display label for explicit)
    pub target: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallKind {
    Solid,
    /// Always lethal
    Trap,
    Gate(GateLink),
}

/// Axis-aligned wall rectangle in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wall {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub kind: WallKind,
}

impl Wall {
    pub fn cell(x: i32, y: i32, kind: WallKind) -> Self {
        Self {
            x,
            y,
            width: 1,
            height: 1,
            kind,
        }
    }

    pub fn contains(&self, p: IVec2) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }

    pub fn gate(&self) -> Option<GateLink> {
        match self.kind {
            WallKind::Gate(link) => Some(link),
            _ => None,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = IVec2> + '_ {
        (self.y..self.y + self.height)
            .flat_map(move |y| (self.x..self.x + self.width).map(move |x| IVec2::new(x, y)))
    }
}

/// Pickup types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickupKind {
    Matter(MatterType),
    /// Freezes enemies for the stasis field duration
    StasisOrb,
    /// +1 shield charge
    Shield,
    /// Resource-boss anchor; hurts the chassis if left to expire
    ChronosAnchor { expires_at: u64 },
    /// Race-boss particle
    OmegaParticle,
}

impl PickupKind {
    pub fn color(self) -> u32 {
        match self {
            PickupKind::Matter(m) => m.color(),
            PickupKind::StasisOrb => 0x7fdbff,
            PickupKind::Shield => 0x2ecc40,
            PickupKind::ChronosAnchor { .. } => 0xb10dc9,
            PickupKind::OmegaParticle => 0xffffff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    pub id: u32,
    pub pos: IVec2,
    pub kind: PickupKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub id: u32,
    pub pos: IVec2,
    pub value: u32,
}

/// Exit or secret portal (PORTAL_SIZE square anchored at `pos`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub pos: IVec2,
    pub expires_at: Option<u64>,
}

impl Portal {
    pub fn contains(&self, p: IVec2) -> bool {
        p.x >= self.pos.x
            && p.x < self.pos.x + PORTAL_SIZE
            && p.y >= self.pos.y
            && p.y < self.pos.y + PORTAL_SIZE
    }
}

/// Enemy movement behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyBehavior {
    Stationary,
    Patrol,
    RandomWalk,
    Chase,
    /// Chases through walls
    Ghost,
    /// Chases and periodically duplicates
    Replicator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    pub id: u32,
    pub pos: IVec2,
    pub behavior: EnemyBehavior,
    pub color: u32,
    /// Ticks per move (0 = never moves)
    pub move_speed: u32,
    /// Tick accumulator
    pub current_tick: u32,
    pub dir: IVec2,
    #[serde(default)]
    pub frozen: bool,
    /// Recent positions, newest first (render only)
    #[serde(default)]
    pub trail: Vec<IVec2>,
    /// Replication clock (ms)
    pub spawned_at: Option<u64>,
}

impl Enemy {
    pub fn record_trail(&mut self, from: IVec2) {
        self.trail.insert(0, from);
        self.trail.truncate(ENEMY_TRAIL_LENGTH);
    }
}

/// Boss variants, each with its own state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BossKind {
    /// Vulnerable only while the chassis tail ends with `sequence`
    Pursuit {
        sequence: Vec<MatterType>,
        move_counter: u32,
    },
    /// Spawns expiring anchors and teleports
    ResourceRace { next_spawn_at: u64 },
    /// Must be encircled by the chassis
    AreaDenial { drift_counter: u32 },
    /// Races the chassis for omega particles
    RaceCondition { score: u32, next_move_at: u64 },
}

impl BossKind {
    pub fn name(&self) -> &'static str {
        match self {
            BossKind::Pursuit { .. } => "pursuit",
            BossKind::ResourceRace { .. } => "resource_race",
            BossKind::AreaDenial { .. } => "area_denial",
            BossKind::RaceCondition { .. } => "race_condition",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boss {
    pub pos: IVec2,
    pub width: i32,
    pub height: i32,
    pub hp: u32,
    pub max_hp: u32,
    pub kind: BossKind,
}

impl Boss {
    pub fn contains(&self, p: IVec2) -> bool {
        p.x >= self.pos.x
            && p.x < self.pos.x + self.width
            && p.y >= self.pos.y
            && p.y < self.pos.y + self.height
    }

    /// Geometric centre in continuous cell coordinates
    pub fn center(&self) -> Vec2 {
        self.pos.as_vec2() + Vec2::new(self.width as f32, self.height as f32) * 0.5
    }

    pub fn cells(&self) -> impl Iterator<Item = IVec2> + '_ {
        (self.pos.y..self.pos.y + self.height).flat_map(move |y| {
            (self.pos.x..self.pos.x + self.width).map(move |x| IVec2::new(x, y))
        })
    }
}

/// Upgrade catalog entries (see `shop` for values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeKind {
    Magnet,
    Harvester,
    Replicator,
    WirelessFill,
    StasisField,
    ShieldGenerator,
    VelocitySync,
    HullStabilizer,
    ChainShield,
    ChainEmp,
    ChainAutoFill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upgrade {
    pub kind: UpgradeKind,
    pub name: String,
    pub level: u32,
    pub max_level: u32,
    pub value: f32,
    pub value_per_level: f32,
    /// On/off passive capped at level 1
    pub binary: bool,
}

/// Persistent per-run curses attached to shop offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Traps relocate periodically
    TrapShift,
    /// Steering is occasionally pulled toward nearby walls
    MagneticWalls,
    /// Old empty segments rot away
    RapidDecay,
    /// Self-collision is fatal
    HeadTrauma,
    /// Coins sometimes pay nothing
    CreditScramble,
    /// Destroyed enemies split
    Hydra,
    /// Extra enemies per level
    Congestion,
    /// Shop prices rise
    Inflation,
}

/// An active anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    pub kind: AnomalyKind,
    pub name: String,
    pub description: String,
    pub data: Option<u32>,
}

/// Time-windowed buffs (timestamps in ms)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Buffs {
    pub invulnerable_until: u64,
    pub stasis_until: u64,
    pub shields: u32,
    pub ability_active_until: u64,
    pub ability_cooldown_until: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopOffer {
    pub upgrade: UpgradeKind,
    pub anomaly: Option<AnomalyKind>,
    pub cost: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopState {
    pub offers: Vec<ShopOffer>,
    pub free_pick_available: bool,
}

/// Current status of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Level intro; play starts at `countdown_until`
    Countdown,
    Playing,
    Paused,
    /// Level cleared, shop open
    LevelUp,
    GameOver,
    /// Level 0 play
    Tutorial,
    TutorialSummary,
    Evasion,
    EvasionReward,
    EvasionFail,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvasionObstacle {
    pub pos: Vec2,
    pub size: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvasionCoin {
    pub pos: Vec2,
}

/// Evasion run sub-state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvasionState {
    /// Lane position (left edge, continuous)
    pub player_x: f32,
    pub obstacles: Vec<EvasionObstacle>,
    pub coins: Vec<EvasionCoin>,
    pub timer_ms: u64,
    pub spawn_timer_ms: u64,
    /// Visual scroll offset (render only)
    pub scroll_offset: f32,
    pub coins_collected: u32,
}

/// Complete game state (deterministic, serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// Run seed for reproducibility
    pub seed: u64,
    pub rng: Pcg32,
    pub tuning: Tuning,

    pub status: GameStatus,
    pub level_id: u32,
    pub level_name: String,
    pub level_started_at: u64,
    pub countdown_until: u64,
    /// Status to resume when unpausing
    pub paused_from: Option<GameStatus>,

    pub segments: Vec<Segment>,
    /// Current heading
    pub direction: IVec2,
    pub enemies: Vec<Enemy>,
    pub pickups: Vec<Pickup>,
    pub coins: Vec<Coin>,
    pub walls: Vec<Wall>,
    pub portal: Option<Portal>,
    pub secret_portal: Option<Portal>,
    /// The secret portal only appears once per level
    pub secret_portal_spawned: bool,
    pub boss: Option<Boss>,

    pub score: u64,
    pub currency: u32,
    /// Charge needed to open the exit portal
    pub integrity: u32,
    pub required_sequence: Vec<MatterType>,
    pub sequence_matched: bool,
    /// Variant of the newest empty segment (HUD guidance)
    pub pending_type: Option<MatterType>,

    pub upgrades: Vec<Upgrade>,
    pub modifiers: Vec<Modifier>,
    pub buffs: Buffs,
    /// Consecutive successful fills
    pub fill_chain: u32,
    pub last_trap_shift_at: u64,

    pub shop: ShopState,
    /// Base tick interval (ms)
    pub tick_rate: u64,
    pub is_testing: bool,

    pub evasion: Option<EvasionState>,
    pub evasion_level: u32,

    pub game_over_reason: Option<String>,
    pub game_over_at: Option<u64>,

    next_id: u32,
}

impl GameState {
    /// Create an empty run with the given seed; `run::start_level` populates it
    pub fn new(seed: u64) -> Self {
        Self::with_tuning(seed, Tuning::default())
    }

    pub fn with_tuning(seed: u64, tuning: Tuning) -> Self {
        Self {
            seed,
            rng: Pcg32::seed_from_u64(seed),
            tuning,
            status: GameStatus::Countdown,
            level_id: 0,
            level_name: String::new(),
            level_started_at: 0,
            countdown_until: 0,
            paused_from: None,
            segments: Vec::new(),
            direction: IVec2::ZERO,
            enemies: Vec::new(),
            pickups: Vec::new(),
            coins: Vec::new(),
            walls: Vec::new(),
            portal: None,
            secret_portal: None,
            secret_portal_spawned: false,
            boss: None,
            score: 0,
            currency: 0,
            integrity: 0,
            required_sequence: Vec::new(),
            sequence_matched: false,
            pending_type: None,
            upgrades: Vec::new(),
            modifiers: Vec::new(),
            buffs: Buffs::default(),
            fill_chain: 0,
            last_trap_shift_at: 0,
            shop: ShopState::default(),
            tick_rate: 120,
            is_testing: false,
            evasion: None,
            evasion_level: 1,
            game_over_reason: None,
            game_over_at: None,
            next_id: 1,
        }
    }

    /// Allocate a new entity ID
    pub fn next_entity_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn head(&self) -> Option<&Segment> {
        self.segments.first()
    }

    pub fn head_pos(&self) -> IVec2 {
        self.segments.first().map(|s| s.pos).unwrap_or_else(crate::grid_center)
    }

    pub fn body(&self) -> &[Segment] {
        self.segments.get(1..).unwrap_or(&[])
    }

    pub fn charged_count(&self) -> u32 {
        self.body().iter().filter(|s| s.charged).count() as u32
    }

    /// Variants of charged body segments, head to tail
    pub fn charged_variants(&self) -> Vec<MatterType> {
        self.body()
            .iter()
            .filter(|s| s.charged)
            .filter_map(|s| s.variant)
            .collect()
    }

    pub fn upgrade(&self, kind: UpgradeKind) -> Option<&Upgrade> {
        self.upgrades.iter().find(|u| u.kind == kind)
    }

    pub fn has_upgrade(&self, kind: UpgradeKind) -> bool {
        self.upgrade(kind).is_some()
    }

    pub fn upgrade_value(&self, kind: UpgradeKind) -> Option<f32> {
        self.upgrade(kind).map(|u| u.value)
    }

    pub fn has_anomaly(&self, kind: AnomalyKind) -> bool {
        self.modifiers.iter().any(|m| m.kind == kind)
    }

    pub fn is_invulnerable(&self, now: u64) -> bool {
        now < self.buffs.invulnerable_until
    }

    pub fn stasis_active(&self, now: u64) -> bool {
        now < self.buffs.stasis_until
    }

    pub fn ability_active(&self, now: u64) -> bool {
        now < self.buffs.ability_active_until
    }

    /// Tick interval the host should use right now (velocity sync slows it)
    pub fn effective_tick_rate(&self, now: u64) -> u64 {
        if self.ability_active(now) {
            (self.tick_rate as f32 * self.tuning.ability_slowdown).round() as u64
        } else {
            self.tick_rate
        }
    }

    pub fn is_boss_level(&self) -> bool {
        crate::is_boss_level(self.level_id)
    }

    pub fn is_tutorial(&self) -> bool {
        self.level_id == TUTORIAL_LEVEL
    }

    /// Shield capacity granted by the shield generator (1 without it)
    pub fn shield_capacity(&self) -> u32 {
        self.upgrade_value(UpgradeKind::ShieldGenerator)
            .map(|v| v.max(1.0) as u32)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_unique() {
        let mut state = GameState::new(7);
        let a = state.next_entity_id();
        let b = state.next_entity_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wall_cells_cover_rect() {
        let wall = Wall {
            x: 2,
            y: 3,
            width: 2,
            height: 3,
            kind: WallKind::Solid,
        };
        let cells: Vec<_> = wall.cells().collect();
        assert_eq!(cells.len(), 6);
        assert!(cells.iter().all(|c| wall.contains(*c)));
        assert!(!wall.contains(IVec2::new(4, 3)));
    }

    #[test]
    fn test_effective_tick_rate_slows_while_ability_active() {
        let mut state = GameState::new(1);
        state.tick_rate = 100;
        state.buffs.ability_active_until = 5_000;
        assert_eq!(state.effective_tick_rate(1_000), 150);
        assert_eq!(state.effective_tick_rate(5_000), 100);
    }

    #[test]
    fn test_state_serializes() {
        let state = GameState::new(3);
        let json = serde_json::to_string(&state).unwrap();
        let back: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seed, 3);
        assert_eq!(back.status, GameStatus::Countdown);
    }
}
