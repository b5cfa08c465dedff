//! Upgrade shop
//!
//! Offers pair a random upgrade with a unique anomaly. Accepting an offer
//! merges the upgrade into the active set and attaches the anomaly for the
//! rest of the run.

use rand::seq::SliceRandom;

use super::state::{AnomalyKind, GameState, GameStatus, Modifier, ShopOffer, Upgrade, UpgradeKind};

/// Why a shop action was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShopError {
    #[error("the shop is not open")]
    Closed,
    #[error("no offer at index {0}")]
    NoSuchOffer(usize),
    #[error("need {cost} credits, have {available}")]
    InsufficientFunds { cost: u32, available: u32 },
}

impl UpgradeKind {
    pub const ALL: [UpgradeKind; 11] = [
        UpgradeKind::Magnet,
        UpgradeKind::Harvester,
        UpgradeKind::Replicator,
        UpgradeKind::WirelessFill,
        UpgradeKind::StasisField,
        UpgradeKind::ShieldGenerator,
        UpgradeKind::VelocitySync,
        UpgradeKind::HullStabilizer,
        UpgradeKind::ChainShield,
        UpgradeKind::ChainEmp,
        UpgradeKind::ChainAutoFill,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UpgradeKind::Magnet => "Coin Magnet",
            UpgradeKind::Harvester => "Harvester",
            UpgradeKind::Replicator => "Matter Replicator",
            UpgradeKind::WirelessFill => "Wireless Fill",
            UpgradeKind::StasisField => "Stasis Field",
            UpgradeKind::ShieldGenerator => "Shield Generator",
            UpgradeKind::VelocitySync => "Velocity Sync",
            UpgradeKind::HullStabilizer => "Hull Stabilizer",
            UpgradeKind::ChainShield => "Chain: Shield Burst",
            UpgradeKind::ChainEmp => "Chain: EMP",
            UpgradeKind::ChainAutoFill => "Chain: Auto Fill",
        }
    }

    /// (base value, value per level, max level)
    fn scaling(self) -> (f32, f32, u32) {
        match self {
            UpgradeKind::Magnet => (3.0, 1.0, 3),
            UpgradeKind::Harvester => (1.0, 1.0, 3),
            UpgradeKind::Replicator => (15.0, 10.0, 3),
            UpgradeKind::WirelessFill => (1.0, 1.0, 3),
            UpgradeKind::StasisField => (3.0, 1.0, 3),
            UpgradeKind::ShieldGenerator => (1.0, 1.0, 3),
            UpgradeKind::VelocitySync => (3.0, 1.0, 3),
            UpgradeKind::HullStabilizer
            | UpgradeKind::ChainShield
            | UpgradeKind::ChainEmp
            | UpgradeKind::ChainAutoFill => (1.0, 0.0, 1),
        }
    }

    pub fn is_binary(self) -> bool {
        self.scaling().2 == 1
    }

    fn base_cost(self) -> u32 {
        match self {
            UpgradeKind::Magnet | UpgradeKind::Harvester => 8,
            UpgradeKind::Replicator | UpgradeKind::WirelessFill => 12,
            UpgradeKind::StasisField | UpgradeKind::ShieldGenerator => 10,
            UpgradeKind::VelocitySync => 9,
            UpgradeKind::HullStabilizer => 15,
            UpgradeKind::ChainShield | UpgradeKind::ChainEmp | UpgradeKind::ChainAutoFill => 14,
        }
    }
}

impl AnomalyKind {
    pub const ALL: [AnomalyKind; 8] = [
        AnomalyKind::TrapShift,
        AnomalyKind::MagneticWalls,
        AnomalyKind::RapidDecay,
        AnomalyKind::HeadTrauma,
        AnomalyKind::CreditScramble,
        AnomalyKind::Hydra,
        AnomalyKind::Congestion,
        AnomalyKind::Inflation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AnomalyKind::TrapShift => "Tectonic Drift",
            AnomalyKind::MagneticWalls => "Magnetic Walls",
            AnomalyKind::RapidDecay => "Rapid Decay",
            AnomalyKind::HeadTrauma => "Head Trauma",
            AnomalyKind::CreditScramble => "Credit Scramble",
            AnomalyKind::Hydra => "Hydra Protocol",
            AnomalyKind::Congestion => "Congestion",
            AnomalyKind::Inflation => "Inflation",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AnomalyKind::TrapShift => "Traps relocate every 10 seconds.",
            AnomalyKind::MagneticWalls => "Nearby walls sometimes pull your heading.",
            AnomalyKind::RapidDecay => "Empty segments older than 4 seconds rot away.",
            AnomalyKind::HeadTrauma => "Biting your own body is fatal.",
            AnomalyKind::CreditScramble => "Coins have a 25% chance to pay nothing.",
            AnomalyKind::Hydra => "Destroyed enemies split in two.",
            AnomalyKind::Congestion => "Two extra enemies every level.",
            AnomalyKind::Inflation => "Shop prices rise by 25%.",
        }
    }

    pub fn modifier(self) -> Modifier {
        Modifier {
            kind: self,
            name: self.name().to_string(),
            description: self.description().to_string(),
            data: None,
        }
    }
}

/// A level-1 upgrade of `kind`
pub fn new_upgrade(kind: UpgradeKind) -> Upgrade {
    let (base, per_level, max_level) = kind.scaling();
    Upgrade {
        kind,
        name: kind.name().to_string(),
        level: 1,
        max_level,
        value: base,
        value_per_level: per_level,
        binary: kind.is_binary(),
    }
}

/// Merge one level of `kind` into the active upgrade set
pub fn apply_upgrade(upgrades: &mut Vec<Upgrade>, kind: UpgradeKind) {
    match upgrades.iter_mut().find(|u| u.kind == kind) {
        Some(upgrade) => {
            if upgrade.level < upgrade.max_level {
                upgrade.level += 1;
                let (base, _, _) = kind.scaling();
                upgrade.value = base + upgrade.value_per_level * (upgrade.level - 1) as f32;
            }
        }
        None => upgrades.push(new_upgrade(kind)),
    }
}

fn offer_cost(state: &GameState, kind: UpgradeKind) -> u32 {
    let owned = state.upgrade(kind).map_or(0, |u| u.level);
    let cost = kind.base_cost() * (owned + 1);
    if state.has_anomaly(AnomalyKind::Inflation) {
        (cost as f32 * 1.25).ceil() as u32
    } else {
        cost
    }
}

/// Draw distinct upgrades (not maxed) each paired with a distinct, inactive anomaly
pub fn generate_offers(state: &mut GameState) -> Vec<ShopOffer> {
    let mut upgrades: Vec<UpgradeKind> = UpgradeKind::ALL
        .into_iter()
        .filter(|k| state.upgrade(*k).is_none_or(|u| u.level < u.max_level))
        .collect();
    let mut anomalies: Vec<AnomalyKind> = AnomalyKind::ALL
        .into_iter()
        .filter(|a| !state.has_anomaly(*a))
        .collect();
    upgrades.shuffle(&mut state.rng);
    anomalies.shuffle(&mut state.rng);

    let count = state.tuning.shop_offer_count;
    upgrades
        .into_iter()
        .take(count)
        .enumerate()
        .map(|(i, upgrade)| ShopOffer {
            upgrade,
            anomaly: anomalies.get(i).copied(),
            cost: offer_cost(state, upgrade),
        })
        .collect()
}

/// Open the shop after a cleared level
pub fn open_shop(state: &mut GameState, free_pick: bool) {
    state.shop.offers = generate_offers(state);
    state.shop.free_pick_available = free_pick;
    state.status = GameStatus::LevelUp;
    log::info!(
        "Shop open after level {} ({} offers, free pick: {})",
        state.level_id,
        state.shop.offers.len(),
        free_pick
    );
}

/// Accept offer `index`: free pick first, otherwise pay its cost
pub fn purchase(state: &mut GameState, index: usize) -> Result<(), ShopError> {
    if state.status != GameStatus::LevelUp {
        return Err(ShopError::Closed);
    }
    let offer = state
        .shop
        .offers
        .get(index)
        .cloned()
        .ok_or(ShopError::NoSuchOffer(index))?;

    if state.shop.free_pick_available {
        state.shop.free_pick_available = false;
    } else if state.currency < offer.cost {
        return Err(ShopError::InsufficientFunds {
            cost: offer.cost,
            available: state.currency,
        });
    } else {
        state.currency -= offer.cost;
    }

    apply_upgrade(&mut state.upgrades, offer.upgrade);
    if let Some(anomaly) = offer.anomaly {
        state.modifiers.push(anomaly.modifier());
    }
    state.shop.offers.remove(index);
    log::info!("Purchased {:?} with anomaly {:?}", offer.upgrade, offer.anomaly);
    Ok(())
}

/// Replace the current offers for a fee
pub fn reroll(state: &mut GameState) -> Result<(), ShopError> {
    if state.status != GameStatus::LevelUp {
        return Err(ShopError::Closed);
    }
    let cost = state.tuning.reroll_cost;
    if state.currency < cost {
        return Err(ShopError::InsufficientFunds {
            cost,
            available: state.currency,
        });
    }
    state.currency -= cost;
    state.shop.offers = generate_offers(state);
    Ok(())
}
