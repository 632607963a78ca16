use crate::compose::Tone;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("text exceeds maximum size: {len} bytes (limit: {limit} bytes)")]
    TextTooLong { len: usize, limit: usize },

    #[error("TTS engine error: {0}")]
    Engine(String),

    #[error("TTS request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("TTS timed out after {0} seconds")]
    Timeout(u64),

    #[error("TTS engine returned no audio")]
    EmptyOutput,
}

#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("failed to encode audio: {0}")]
    Encode(#[from] hound::Error),

    #[error("alarm tone not loaded: {0:?}")]
    MissingTone(Tone),

    #[error("input clip contains no samples")]
    EmptyInput,

    #[error("composition task failed: {0}")]
    Join(String),
}

#[derive(Error, Debug)]
pub enum CacheWriteError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to publish cached clip: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("cache write task failed: {0}")]
    Join(String),
}
