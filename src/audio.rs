//! Audio dispatch
//!
//! The simulation only names sound cues; the host owns an `AudioManager` and
//! hands it each tick's `sfx` list. Synthesis lives behind `AudioSink`, so a
//! browser, a native mixer or a test recorder can sit underneath.

use crate::sim::SoundEffect;

/// Something that can actually make a sound
pub trait AudioSink {
    /// Play `effect` at `volume` (0.0 - 1.0, already mixed)
    fn play(&mut self, effect: SoundEffect, volume: f32);
}

/// Sink that writes cues to the log (headless runs)
#[derive(Debug, Default)]
pub struct LogSink;

impl AudioSink for LogSink {
    fn play(&mut self, effect: SoundEffect, volume: f32) {
        log::debug!("sfx {:?} @ {:.2}", effect, volume);
    }
}

impl SoundEffect {
    /// Relative loudness of each cue
    pub fn base_gain(self) -> f32 {
        match self {
            SoundEffect::Fill | SoundEffect::Grow | SoundEffect::Coin | SoundEffect::EvasionCoin => 0.5,
            SoundEffect::Warp | SoundEffect::PowerUp | SoundEffect::Countdown => 0.6,
            SoundEffect::Damage | SoundEffect::ShieldBlock | SoundEffect::EnemyKill => 0.7,
            SoundEffect::BossHit | SoundEffect::PortalOpen | SoundEffect::EvasionCrash => 0.8,
            SoundEffect::Emp
            | SoundEffect::BossDeath
            | SoundEffect::LevelComplete
            | SoundEffect::GameOver
            | SoundEffect::EvasionClear => 1.0,
        }
    }
}

/// Audio manager for the game
pub struct AudioManager<S: AudioSink> {
    sink: S,
    master_volume: f32,
    sfx_volume: f32,
    muted: bool,
}

impl<S: AudioSink + Default> Default for AudioManager<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: AudioSink> AudioManager<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            master_volume: 0.8,
            sfx_volume: 1.0,
            muted: false,
        }
    }

    /// Set master volume (0.0 - 1.0)
    pub fn set_master_volume(&mut self, vol: f32) {
        self.master_volume = vol.clamp(0.0, 1.0);
    }

    /// Set SFX volume (0.0 - 1.0)
    pub fn set_sfx_volume(&mut self, vol: f32) {
        self.sfx_volume = vol.clamp(0.0, 1.0);
    }

    /// Mute/unmute all audio
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.master_volume * self.sfx_volume
        }
    }

    /// Play a sound effect
    pub fn play(&mut self, effect: SoundEffect) {
        let vol = self.effective_volume() * effect.base_gain();
        if vol <= 0.0 {
            return;
        }
        self.sink.play(effect, vol);
    }

    /// Play every cue a tick produced, each distinct cue once
    pub fn dispatch(&mut self, effects: &[SoundEffect]) {
        for (i, effect) in effects.iter().enumerate() {
            if !effects[..i].contains(effect) {
                self.play(*effect);
            }
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
