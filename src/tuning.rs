//! Game balance values
//!
//! Loaded from JSON by the host (missing fields fall back to defaults) and
//! carried inside `GameState`, so a tick never reads anything outside its state.

use serde::{Deserialize, Serialize};

/// Errors loading a tuning file
#[derive(Debug, thiserror::Error)]
pub enum TuningError {
    #[error("invalid tuning json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("tuning value out of range: {0}")]
    OutOfRange(&'static str),
}

/// Data-driven balance values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    // === Chassis ===
    /// Invulnerability granted after losing a charge (ms)
    pub damage_invulnerability_ms: u64,
    /// Invulnerability granted by a chain-shield burst (ms)
    pub chain_invulnerability_ms: u64,
    /// Age after which an empty segment rots under the rapid-decay anomaly (ms)
    pub decay_age_ms: u64,
    /// Countdown before a level starts (ms)
    pub countdown_ms: u64,

    // === Scoring ===
    pub fill_score: u64,
    pub grow_score: u64,
    pub enemy_kill_score: u64,
    pub boss_hit_score: u64,
    pub level_clear_score: u64,
    pub coin_value: u32,

    // === Specials ===
    /// Per-tick spawn chance of a stasis orb (owner of stasis field only)
    pub stasis_orb_chance: f64,
    /// Per-tick spawn chance of a shield pickup (owner of shield generator only)
    pub shield_pickup_chance: f64,
    /// Velocity sync cooldown (ms)
    pub ability_cooldown_ms: u64,
    /// Tick interval multiplier while velocity sync is active
    pub ability_slowdown: f32,
    /// EMP radius in cells
    pub emp_radius: f32,

    // === Portals ===
    /// Charge above integrity needed for the secret portal
    pub secret_portal_surplus: u32,
    pub secret_portal_ttl_ms: u64,

    // === Anomalies ===
    pub trap_shift_interval_ms: u64,
    pub magnetic_wall_chance: f64,
    pub credit_scramble_chance: f64,

    // === Enemies ===
    pub replicate_interval_ms: u64,
    pub max_enemies: usize,

    // === Shop ===
    pub shop_offer_count: usize,
    pub reroll_cost: u32,

    // === Evasion ===
    pub evasion_duration_ms: u64,
    pub evasion_coin_value: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            damage_invulnerability_ms: 1_500,
            chain_invulnerability_ms: 3_000,
            decay_age_ms: 4_000,
            countdown_ms: 3_000,

            fill_score: 10,
            grow_score: 5,
            enemy_kill_score: 50,
            boss_hit_score: 250,
            level_clear_score: 100,
            coin_value: 1,

            stasis_orb_chance: 0.01,
            shield_pickup_chance: 0.015,
            ability_cooldown_ms: 15_000,
            ability_slowdown: 1.5,
            emp_radius: 8.0,

            secret_portal_surplus: 5,
            secret_portal_ttl_ms: 10_000,

            trap_shift_interval_ms: 10_000,
            magnetic_wall_chance: 0.15,
            credit_scramble_chance: 0.25,

            replicate_interval_ms: 8_000,
            max_enemies: 24,

            shop_offer_count: 3,
            reroll_cost: 5,

            evasion_duration_ms: 15_000,
            evasion_coin_value: 5,
        }
    }
}

impl Tuning {
    /// Parse tuning from JSON; absent fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, TuningError> {
        let tuning: Tuning = serde_json::from_str(json)?;
        tuning.validate()?;
        log::info!("Loaded tuning overrides");
        Ok(tuning)
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), TuningError> {
        let chances = [
            ("stasis_orb_chance", self.stasis_orb_chance),
            ("shield_pickup_chance", self.shield_pickup_chance),
            ("magnetic_wall_chance", self.magnetic_wall_chance),
            ("credit_scramble_chance", self.credit_scramble_chance),
        ];
        for (name, chance) in chances {
            if !(0.0..=1.0).contains(&chance) {
                return Err(TuningError::OutOfRange(name));
            }
        }
        if self.ability_slowdown < 1.0 {
            return Err(TuningError::OutOfRange("ability_slowdown"));
        }
        if self.shop_offer_count == 0 {
            return Err(TuningError::OutOfRange("shop_offer_count"));
        }
        Ok(())
    }
}
