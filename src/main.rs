//! Serpent Core headless runner
//!
//! Drives a run with a simple autopilot and prints a JSON summary. Useful for
//! soak-testing balance changes and checking that a seed replays identically.
//!
//! Usage: `serpent-core [seed] [ticks] [--level N] [--tuning FILE]`

#[cfg(not(target_arch = "wasm32"))]
mod headless {
    use glam::IVec2;
    use serde::Serialize;

    use serpent_core::audio::{AudioManager, LogSink};
    use serpent_core::consts::*;
    use serpent_core::sim::evasion::{PLAYER_WIDTH, PLAYER_Y, gap_width};
    use serpent_core::sim::geometry::{CARDINALS, WallMap, distance};
    use serpent_core::sim::state::UpgradeKind;
    use serpent_core::sim::{
        GameState, GameStatus, PickupKind, TickInput, finish_evasion, finish_tutorial, leave_shop, new_run,
        process_game_tick, purchase,
    };
    use serpent_core::tuning::{Tuning, TuningError};

    #[derive(Debug, thiserror::Error)]
    pub enum CliError {
        #[error("bad argument '{0}'")]
        BadArgument(String),
        #[error("cannot read {path}: {source}")]
        Io {
            path: String,
            source: std::io::Error,
        },
        #[error(transparent)]
        Tuning(#[from] TuningError),
        #[error(transparent)]
        Json(#[from] serde_json::Error),
    }

    struct Options {
        seed: u64,
        ticks: u64,
        level: u32,
        tuning: Tuning,
    }

    fn parse_args() -> Result<Options, CliError> {
        let mut opts = Options {
            seed: 1,
            ticks: 5_000,
            level: 1,
            tuning: Tuning::default(),
        };
        let mut positional = 0;
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            let number = |s: &str| s.parse::<u64>().map_err(|_| CliError::BadArgument(s.to_string()));
            match arg.as_str() {
                "--level" => {
                    let value = args.next().unwrap_or_default();
                    opts.level = number(&value)? as u32;
                }
                "--tuning" => {
                    let path = args.next().unwrap_or_default();
                    let json = std::fs::read_to_string(&path).map_err(|source| CliError::Io { path, source })?;
                    opts.tuning = Tuning::from_json(&json)?;
                }
                _ if positional == 0 => {
                    opts.seed = number(&arg)?;
                    positional += 1;
                }
                _ if positional == 1 => {
                    opts.ticks = number(&arg)?;
                    positional += 1;
                }
                _ => return Err(CliError::BadArgument(arg.clone())),
            }
        }
        Ok(opts)
    }

    #[derive(Debug, Serialize)]
    struct Summary {
        seed: u64,
        ticks: u64,
        level_id: u32,
        levels_cleared: u32,
        score: u64,
        currency: u32,
        status: GameStatus,
        upgrades: Vec<UpgradeKind>,
        game_over_reason: Option<String>,
    }

    /// Cell the chassis should head for
    fn target(state: &GameState) -> Option<IVec2> {
        if let Some(portal) = state.portal
            && (state.sequence_matched || state.is_boss_level())
        {
            return Some(portal.pos);
        }
        let head = state.head_pos();
        let wanted = state.pending_type;
        state
            .pickups
            .iter()
            .filter(|p| !matches!((p.kind, wanted), (PickupKind::Matter(m), Some(w)) if m != w))
            .min_by(|a, b| distance(a.pos, head).total_cmp(&distance(b.pos, head)))
            .map(|p| p.pos)
    }

    /// Greedy step toward the target that does not walk into anything
    fn steer(state: &GameState, map: &WallMap) -> IVec2 {
        let head = state.head_pos();
        let Some(goal) = target(state) else {
            return state.direction;
        };
        let safe = |dir: IVec2| {
            let next = head + dir;
            !map.is_blocked(next)
                && !state.segments.iter().any(|s| s.pos == next)
                && !state.enemies.iter().any(|e| distance(e.pos, next) < 1.5)
        };
        CARDINALS
            .into_iter()
            .filter(|&dir| safe(dir))
            .min_by(|&a, &b| distance(head + a, goal).total_cmp(&distance(head + b, goal)))
            .unwrap_or(state.direction)
    }

    /// Lateral input toward the gap of the nearest incoming row
    fn dodge(state: &GameState) -> IVec2 {
        let Some(ev) = &state.evasion else {
            return IVec2::ZERO;
        };
        let Some(row_y) = ev
            .obstacles
            .iter()
            .map(|o| o.pos.y)
            .filter(|&y| y <= PLAYER_Y)
            .max_by(f32::total_cmp)
        else {
            return IVec2::ZERO;
        };
        let gap_start = ev
            .obstacles
            .iter()
            .find(|o| o.pos.y == row_y && o.pos.x == 0.0)
            .map_or(0.0, |o| o.size.x);
        let centre = gap_start + gap_width(state.evasion_level) / 2.0;
        let player = ev.player_x + PLAYER_WIDTH / 2.0;
        if (centre - player).abs() < 0.5 {
            IVec2::ZERO
        } else {
            IVec2::new((centre - player).signum() as i32, 0)
        }
    }

    pub fn run() -> Result<(), CliError> {
        let opts = parse_args()?;
        let mut now = 0;
        let mut state = new_run(opts.seed, opts.tuning, opts.level, now);
        let mut audio = AudioManager::new(LogSink);
        let mut tutorial_step = 0;
        let mut levels_cleared = 0;
        let mut ticks = 0;

        while ticks < opts.ticks {
            match state.status {
                GameStatus::GameOver => break,
                GameStatus::LevelUp => {
                    levels_cleared += 1;
                    if !state.shop.offers.is_empty() && purchase(&mut state, 0).is_err() {
                        log::debug!("Skipping the shop, nothing affordable");
                    }
                    if let Err(e) = leave_shop(&mut state, now) {
                        log::warn!("Could not leave the shop: {}", e);
                        break;
                    }
                    continue;
                }
                GameStatus::TutorialSummary => {
                    finish_tutorial(&mut state, now);
                    continue;
                }
                GameStatus::EvasionReward | GameStatus::EvasionFail => {
                    finish_evasion(&mut state);
                    continue;
                }
                _ => {}
            }

            let (direction, step) = if state.status == GameStatus::Evasion {
                (dodge(&state), EVASION_STEP_MS)
            } else {
                let map = WallMap::new(&state.walls);
                (steer(&state, &map), state.effective_tick_rate(now))
            };
            now += step;
            let input = TickInput {
                direction,
                timestamp: now,
                tutorial_step,
                seen_hp_tutorial: true,
                seen_evasion_tutorial: true,
                ..Default::default()
            };
            let out = process_game_tick(&state, &input);
            audio.dispatch(&out.sfx);
            for unlock in &out.unlocks {
                log::info!("Unlocked {}", unlock);
            }
            tutorial_step = out.next_tutorial_step;
            state = out.state;
            ticks += 1;
        }

        let summary = Summary {
            seed: opts.seed,
            ticks,
            level_id: state.level_id,
            levels_cleared,
            score: state.score,
            currency: state.currency,
            status: state.status,
            upgrades: state.upgrades.iter().map(|u| u.kind).collect(),
            game_over_reason: state.game_over_reason.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Serpent Core (headless) starting...");
    if let Err(e) = headless::run() {
        log::error!("{}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // the library is driven by the host page on wasm
}
