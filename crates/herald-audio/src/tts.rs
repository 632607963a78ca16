use crate::error::SynthesisError;
use async_trait::async_trait;
use herald_types::{AudioClip, AudioFormat};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Longest text chunk the translate endpoint accepts per request.
const GOOGLE_MAX_CHUNK_CHARS: usize = 100;

/// `ttsspeed` sent for slow speech.
const GOOGLE_SLOW_SPEED: &str = "0.24";

/// espeak-ng words per minute for normal and slow speech.
const ESPEAK_WPM: u32 = 175;
const ESPEAK_SLOW_WPM: u32 = 110;

/// Turns text into an encoded audio clip.
///
/// Implementations call their engine once per invocation and never cache.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Returns the unique ID of the engine (e.g., "google").
    fn id(&self) -> &'static str;

    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        slow: bool,
    ) -> Result<AudioClip, SynthesisError>;
}

/// Which synthesis engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsEngine {
    /// Google Translate's public TTS endpoint (MP3 output).
    #[default]
    Google,
    /// Local `espeak-ng` (WAV output).
    Espeak,
}

impl std::str::FromStr for TtsEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "espeak" | "espeak-ng" => Ok(Self::Espeak),
            other => Err(format!("unknown TTS engine: {other}")),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_google_endpoint() -> String {
    "https://translate.google.com/translate_tts".to_string()
}

fn default_espeak_binary() -> PathBuf {
    PathBuf::from("espeak-ng")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_text_bytes() -> usize {
    4 * 1024
}

/// Synthesis settings loaded from the `[tts]` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub engine: TtsEngine,
    /// Language used when a request does not name one.
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_google_endpoint")]
    pub google_endpoint: String,
    #[serde(default = "default_espeak_binary")]
    pub espeak_binary: PathBuf,
    /// Upper bound on one synthesis call, all chunks included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: TtsEngine::default(),
            default_language: default_language(),
            google_endpoint: default_google_endpoint(),
            espeak_binary: default_espeak_binary(),
            timeout_secs: default_timeout_secs(),
            max_text_bytes: default_max_text_bytes(),
        }
    }
}

/// Builds the configured engine.
pub fn build_synthesizer(config: &TtsConfig) -> Arc<dyn Synthesizer> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.engine {
        TtsEngine::Google => Arc::new(GoogleTts::new(
            &config.google_endpoint,
            timeout,
            config.max_text_bytes,
        )),
        TtsEngine::Espeak => Arc::new(EspeakTts::new(
            &config.espeak_binary,
            timeout,
            config.max_text_bytes,
        )),
    }
}

fn check_size(text: &str, limit: usize) -> Result<(), SynthesisError> {
    if text.len() > limit {
        return Err(SynthesisError::TextTooLong {
            len: text.len(),
            limit,
        });
    }
    Ok(())
}

/// Google Translate TTS over HTTP.
///
/// Long text is split at word boundaries into chunks the endpoint accepts;
/// the MP3 responses are concatenated frame streams and play back as one
/// clip.
#[derive(Debug, Clone)]
pub struct GoogleTts {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    max_text_bytes: usize,
}

impl GoogleTts {
    pub fn new(endpoint: &str, timeout: Duration, max_text_bytes: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; herald/0.1)")
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("tts http client setup failed, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            endpoint: endpoint.to_string(),
            timeout,
            max_text_bytes,
        }
    }

    async fn fetch_chunks(&self, chunks: &[String], language: &str, slow: bool) -> Result<Vec<u8>, SynthesisError> {
        let total = chunks.len().to_string();
        let speed = if slow { GOOGLE_SLOW_SPEED } else { "1" };
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let idx_param = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let resp = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", language),
                    ("q", chunk.as_str()),
                    ("ttsspeed", speed),
                    ("total", total.as_str()),
                    ("idx", idx_param.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        SynthesisError::Timeout(self.timeout.as_secs())
                    } else {
                        SynthesisError::Network(e)
                    }
                })?;

            if !resp.status().is_success() {
                return Err(SynthesisError::Engine(format!(
                    "endpoint returned {} for chunk {}",
                    resp.status(),
                    idx
                )));
            }

            audio.extend_from_slice(&resp.bytes().await?);
        }
        Ok(audio)
    }
}

#[async_trait]
impl Synthesizer for GoogleTts {
    fn id(&self) -> &'static str {
        "google"
    }

    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        slow: bool,
    ) -> Result<AudioClip, SynthesisError> {
        check_size(text, self.max_text_bytes)?;

        let chunks = split_text(text, GOOGLE_MAX_CHUNK_CHARS);
        // The client bounds each chunk; this bounds the whole call.
        let audio = tokio::time::timeout(self.timeout, self.fetch_chunks(&chunks, language, slow))
            .await
            .map_err(|_| SynthesisError::Timeout(self.timeout.as_secs()))??;

        if audio.is_empty() {
            return Err(SynthesisError::EmptyOutput);
        }

        tracing::debug!(engine = "google", chunks = chunks.len(), bytes = audio.len(), "synthesized speech");
        Ok(AudioClip::new(audio, AudioFormat::Mp3))
    }
}

/// Splits `text` into chunks of at most `max_chars` characters, breaking at
/// whitespace where possible.
fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() {
            word_len
        } else {
            current.chars().count() + 1 + word_len
        };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Local synthesis through `espeak-ng`.
///
/// Text is written to stdin rather than passed as an argument so that
/// leading dashes are never parsed as options.
#[derive(Debug, Clone)]
pub struct EspeakTts {
    binary: PathBuf,
    timeout: Duration,
    max_text_bytes: usize,
}

impl EspeakTts {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration, max_text_bytes: usize) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            max_text_bytes,
        }
    }
}

#[async_trait]
impl Synthesizer for EspeakTts {
    fn id(&self) -> &'static str {
        "espeak"
    }

    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        slow: bool,
    ) -> Result<AudioClip, SynthesisError> {
        check_size(text, self.max_text_bytes)?;

        let wpm = if slow { ESPEAK_SLOW_WPM } else { ESPEAK_WPM };
        let mut command = Command::new(&self.binary);
        command
            .arg("--stdout")
            .arg("--stdin")
            .arg("-v")
            .arg(language)
            .arg("-s")
            .arg(wpm.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| SynthesisError::Engine(format!("failed to spawn {:?}: {}", self.binary, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SynthesisError::Engine("failed to open stdin".to_string()))?;
        let text_owned = text.to_string();

        // Write from a separate task so a full stdout pipe cannot deadlock us.
        let write_task = tokio::spawn(async move {
            stdin.write_all(text_owned.as_bytes()).await?;
            stdin.write_all(b"\n").await
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| SynthesisError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| SynthesisError::Engine(format!("failed to wait for espeak-ng: {}", e)))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(SynthesisError::Engine(format!(
                    "failed to write to espeak-ng stdin: {}",
                    e
                )))
            }
            Err(e) => return Err(SynthesisError::Engine(format!("stdin task failed: {}", e))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::Engine(format!("espeak-ng failed: {}", stderr)));
        }
        if output.stdout.is_empty() {
            return Err(SynthesisError::EmptyOutput);
        }

        Ok(AudioClip::new(output.stdout, AudioFormat::Wav))
    }
}
