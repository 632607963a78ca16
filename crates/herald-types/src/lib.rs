//! Shared types for the Herald announcement pipeline.
//!
//! This crate provides the vocabulary used by every other Herald crate:
//! the validated [`AnnouncementRequest`], its content-addressed
//! [`CacheKey`], the [`Priority`] tiers that drive alarm composition, the
//! audio container formats the pipeline produces, and the device state
//! shared between discovery and playback.
//!
//! Nothing here performs I/O. Keeping these types in a leaf crate lets the
//! audio and cast crates agree on them without depending on each other.

use serde::{Deserialize, Serialize};

mod device;
mod request;

pub use device::{ConnectionState, DeviceHandle, PlaybackCommand};
pub use request::{AnnouncementRequest, CacheKey, ValidationError};

/// Priority tier of an announcement.
///
/// Tier 0 is plain speech. Tiers 1 to 3 wrap the speech in alarm tones,
/// amplify it, and force the device volume up before playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Priority {
    /// Plain speech, no alarm framing.
    #[default]
    Normal = 0,
    /// Short alarm tone before the speech.
    Alert = 1,
    /// Long alarm tone before the speech.
    Alarm = 2,
    /// Long alarm tone before and after the speech.
    Emergency = 3,
}

impl Priority {
    /// All tiers in ascending order.
    pub const ALL: [Priority; 4] = [
        Priority::Normal,
        Priority::Alert,
        Priority::Alarm,
        Priority::Emergency,
    ];

    /// Returns the numeric tier.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to convert a numeric tier to a `Priority`.
    ///
    /// Returns `None` for anything outside `0..=3`.
    pub fn from_u8(tier: u8) -> Option<Self> {
        match tier {
            0 => Some(Self::Normal),
            1 => Some(Self::Alert),
            2 => Some(Self::Alarm),
            3 => Some(Self::Emergency),
            _ => None,
        }
    }

    /// Whether this tier is an alarm (anything above `Normal`).
    pub fn is_alarm(self) -> bool {
        self > Self::Normal
    }
}

impl TryFrom<u8> for Priority {
    type Error = ValidationError;

    fn try_from(tier: u8) -> Result<Self, Self::Error> {
        Self::from_u8(tier).ok_or(ValidationError::PriorityOutOfRange(i64::from(tier)))
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.as_u8()
    }
}

/// Audio container formats produced by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// MPEG-1 Layer III, as returned by network synthesis engines.
    Mp3,
    /// RIFF/WAVE 16-bit PCM, as produced by local engines and the composer.
    Wav,
}

impl AudioFormat {
    /// Every format, in the order cache lookups probe them.
    pub const ALL: [AudioFormat; 2] = [AudioFormat::Wav, AudioFormat::Mp3];

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }

    /// MIME type announced to the playback device.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
        }
    }

    /// Guesses the format from a file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "wav" | "wave" => Some(Self::Wav),
            _ => None,
        }
    }
}

/// An encoded audio clip held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Encoded container bytes.
    pub bytes: Vec<u8>,
    /// Container format of `bytes`.
    pub format: AudioFormat,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, format: AudioFormat) -> Self {
        Self { bytes, format }
    }
}
