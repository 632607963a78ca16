//! Audio side of the Herald announcement pipeline.
//!
//! Turns announcement text into a playable clip and keeps the result:
//!
//! - [`tts`]: the [`Synthesizer`] capability and its engines (Google
//!   Translate TTS over HTTP, local `espeak-ng`).
//! - [`compose`]: the table-driven [`Composer`] that frames alarm-tier
//!   speech with alarm tones and amplifies it.
//! - [`cache`]: the content-addressed [`AudioCache`] with atomic publish.
//!
//! Each stage reports its own typed error so the orchestrating service can
//! decide, per priority tier, whether to fall back or surface the failure.

pub mod cache;
pub mod compose;
pub mod error;
pub mod pcm;
pub mod tts;

pub use cache::{AudioCache, CachedClip};
pub use compose::{AlarmTones, Composer, MixRule, MixingConfig, PriorityPolicy, Tone};
pub use error::{CacheWriteError, CompositionError, SynthesisError};
pub use tts::{build_synthesizer, EspeakTts, GoogleTts, Synthesizer, TtsConfig, TtsEngine};
