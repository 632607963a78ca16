//! Priority-tiered alarm composition.
//!
//! Each [`Priority`] maps to a [`MixRule`] in a [`PriorityPolicy`] table:
//!
//! | priority | prefix | suffix | pre-gain | post-gain |
//! |----------|--------|--------|----------|-----------|
//! | 0 | none | none | 0 dB | 0 dB |
//! | 1 | short tone | none | +10 dB | +8 dB |
//! | 2 | long tone | none | +10 dB | +8 dB |
//! | 3 | long tone | long tone | +10 dB | +8 dB |
//!
//! The speech is amplified by the pre-gain, framed by the tones, and the
//! whole clip is amplified again by the post-gain. Composition is a pure
//! function of its inputs: the same clip at the same tier always encodes to
//! the same bytes.

use crate::error::CompositionError;
use crate::pcm::Pcm;
use herald_types::{AudioClip, AudioFormat, Priority};
use serde::Deserialize;
use std::path::Path;

/// Default speech gain applied to alarm tiers before framing.
pub const DEFAULT_PRE_GAIN_DB: f32 = 10.0;

/// Default gain applied to the framed alarm clip.
pub const DEFAULT_POST_GAIN_DB: f32 = 8.0;

/// Default output sample rate (matches typical network TTS output).
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Pre-shipped alarm tones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Short,
    Long,
}

impl Tone {
    /// Static asset stem of this tone.
    pub fn asset_stem(self) -> &'static str {
        match self {
            Self::Short => "emergency_alarm_short",
            Self::Long => "emergency_alarm_long",
        }
    }
}

/// How one priority tier is mixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixRule {
    pub prefix: Option<Tone>,
    pub suffix: Option<Tone>,
    pub pre_gain_db: f32,
    pub post_gain_db: f32,
}

impl MixRule {
    const PASSTHROUGH: MixRule = MixRule {
        prefix: None,
        suffix: None,
        pre_gain_db: 0.0,
        post_gain_db: 0.0,
    };
}

/// Mixing rules indexed by priority tier.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityPolicy {
    rules: [MixRule; 4],
}

impl PriorityPolicy {
    /// Builds the standard table with the given alarm gains.
    pub fn with_gains(pre_gain_db: f32, post_gain_db: f32) -> Self {
        let alarm = |prefix, suffix| MixRule {
            prefix: Some(prefix),
            suffix,
            pre_gain_db,
            post_gain_db,
        };
        Self {
            rules: [
                MixRule::PASSTHROUGH,
                alarm(Tone::Short, None),
                alarm(Tone::Long, None),
                alarm(Tone::Long, Some(Tone::Long)),
            ],
        }
    }

    pub fn rule(&self, priority: Priority) -> &MixRule {
        &self.rules[priority.as_u8() as usize]
    }
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self::with_gains(DEFAULT_PRE_GAIN_DB, DEFAULT_POST_GAIN_DB)
    }
}

fn default_pre_gain_db() -> f32 {
    DEFAULT_PRE_GAIN_DB
}

fn default_post_gain_db() -> f32 {
    DEFAULT_POST_GAIN_DB
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

/// Mixing settings, read from keys directly under the `[audio]` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct MixingConfig {
    /// Speech gain for alarm tiers, in dB. Must not be negative.
    #[serde(default = "default_pre_gain_db")]
    pub pre_gain_db: f32,
    /// Gain over the framed alarm clip, in dB. Must not be negative.
    #[serde(default = "default_post_gain_db")]
    pub post_gain_db: f32,
    /// Sample rate of composed clips.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for MixingConfig {
    fn default() -> Self {
        Self {
            pre_gain_db: default_pre_gain_db(),
            post_gain_db: default_post_gain_db(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Alarm tones decoded at the composer's sample rate.
#[derive(Debug, Clone, Default)]
pub struct AlarmTones {
    short: Option<Pcm>,
    long: Option<Pcm>,
}

impl AlarmTones {
    /// Decodes the given encoded tones.
    pub fn from_clips(
        short: Option<&AudioClip>,
        long: Option<&AudioClip>,
        sample_rate: u32,
    ) -> Result<Self, CompositionError> {
        let decode = |clip: Option<&AudioClip>| -> Result<Option<Pcm>, CompositionError> {
            clip.map(|c| Pcm::decode(c).map(|pcm| pcm.resampled(sample_rate)))
                .transpose()
        };
        Ok(Self {
            short: decode(short)?,
            long: decode(long)?,
        })
    }

    /// Loads `emergency_alarm_{short,long}.{mp3,wav}` from `static_dir`.
    ///
    /// A missing or undecodable tone is logged and left unset; alarms that
    /// need it will then fail to compose and fall back to the raw alarm.
    pub fn load(static_dir: &Path, sample_rate: u32) -> Self {
        let load_one = |tone: Tone| -> Option<Pcm> {
            let clip = AudioFormat::ALL.iter().find_map(|format| {
                let path = static_dir.join(format!("{}.{}", tone.asset_stem(), format.extension()));
                std::fs::read(&path).ok().map(|bytes| AudioClip::new(bytes, *format))
            });
            let Some(clip) = clip else {
                tracing::warn!(tone = tone.asset_stem(), dir = %static_dir.display(), "alarm tone not found");
                return None;
            };
            match Pcm::decode(&clip) {
                Ok(pcm) => Some(pcm.resampled(sample_rate)),
                Err(e) => {
                    tracing::warn!(tone = tone.asset_stem(), "failed to decode alarm tone: {}", e);
                    None
                }
            }
        };

        Self {
            short: load_one(Tone::Short),
            long: load_one(Tone::Long),
        }
    }

    fn get(&self, tone: Tone) -> Result<&Pcm, CompositionError> {
        match tone {
            Tone::Short => self.short.as_ref(),
            Tone::Long => self.long.as_ref(),
        }
        .ok_or(CompositionError::MissingTone(tone))
    }
}

/// Applies the [`PriorityPolicy`] to synthesized speech.
#[derive(Debug, Clone)]
pub struct Composer {
    policy: PriorityPolicy,
    tones: AlarmTones,
    sample_rate: u32,
}

impl Composer {
    pub fn new(policy: PriorityPolicy, tones: AlarmTones, sample_rate: u32) -> Self {
        Self {
            policy,
            tones,
            sample_rate,
        }
    }

    pub fn policy(&self) -> &PriorityPolicy {
        &self.policy
    }

    /// Composes the final playable clip for `priority`.
    ///
    /// Output is always 16-bit mono WAV at the composer's sample rate.
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError`] if the speech cannot be decoded or a
    /// tone required by the tier was never loaded.
    pub fn compose(&self, raw: &AudioClip, priority: Priority) -> Result<AudioClip, CompositionError> {
        let rule = self.policy.rule(priority);

        let mut speech = Pcm::decode(raw)?.resampled(self.sample_rate);
        speech.amplify(rule.pre_gain_db);

        let mut out = Pcm::new(Vec::new(), self.sample_rate);
        if let Some(prefix) = rule.prefix {
            out.append(self.tones.get(prefix)?);
        }
        out.append(&speech);
        if let Some(suffix) = rule.suffix {
            out.append(self.tones.get(suffix)?);
        }
        out.amplify(rule.post_gain_db);

        out.encode_wav()
    }
}
