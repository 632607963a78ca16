//! Hands a media URL to the device and waits for playback to start.

use crate::capability::{CastSession, IdleReason, MediaStatus, PlayerState};
use crate::error::{CastError, PlaybackError};
use herald_types::PlaybackCommand;
use std::future::Future;
use std::time::{Duration, Instant};

/// Proof that the device accepted and started a command.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfirmation {
    pub device: String,
    pub media_url: String,
    /// Player state that counted as the acknowledgment.
    pub player_state: PlayerState,
    /// Volume forced before the load, if any.
    pub volume: Option<f32>,
    /// Time from the first command to the acknowledgment.
    pub elapsed: Duration,
}

/// Issues play commands one at a time.
///
/// `play` holds an internal queue lock for its full duration, so an alarm
/// that is being started is never interleaved with a second announcement's
/// volume or load command.
#[derive(Debug)]
pub struct PlaybackDispatcher {
    command_timeout: Duration,
    ack_timeout: Duration,
    poll_interval: Duration,
    queue: tokio::sync::Mutex<()>,
}

impl Default for PlaybackDispatcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(10))
    }
}

impl PlaybackDispatcher {
    pub fn new(command_timeout: Duration, ack_timeout: Duration) -> Self {
        Self {
            command_timeout,
            ack_timeout,
            poll_interval: Duration::from_millis(250),
            queue: tokio::sync::Mutex::new(()),
        }
    }

    /// Overrides how often the player status is polled while waiting.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Plays `command` on `session`.
    ///
    /// The volume, when present, is set before the load is issued. The call
    /// returns once the device reports the media as playing, paused, or
    /// already finished, and fails with [`PlaybackError::Timeout`] when no
    /// acknowledgment arrives in time. Nothing is retried.
    ///
    /// The player status is sampled just before the load. A later report
    /// identical to that sample is left over from earlier playback and does
    /// not count, unless it names our URL as playing.
    pub async fn play(
        &self,
        session: &dyn CastSession,
        command: &PlaybackCommand,
    ) -> Result<PlaybackConfirmation, PlaybackError> {
        let _turn = self.queue.lock().await;
        let started = Instant::now();

        if let Some(level) = command.volume {
            self.bounded("set_volume", session.set_volume(level))
                .await?
                .map_err(PlaybackError::Volume)?;
            tracing::debug!(device = session.name(), level, "volume set");
        }

        let before = match self.bounded("status", session.media_status()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::debug!(device = session.name(), error = %e, "no status before load");
                None
            }
            Err(e) => {
                tracing::debug!(device = session.name(), error = %e, "no status before load");
                None
            }
        };

        self.bounded("load", session.load(&command.media_url, &command.content_type))
            .await?
            .map_err(PlaybackError::Load)?;
        tracing::debug!(device = session.name(), url = %command.media_url, "media load issued");

        let player_state = self.await_ack(session, &command.media_url, before.as_ref()).await?;
        let elapsed = started.elapsed();

        tracing::info!(
            device = session.name(),
            url = %command.media_url,
            volume = ?command.volume,
            state = ?player_state,
            elapsed_ms = elapsed.as_millis() as u64,
            "playback acknowledged"
        );

        Ok(PlaybackConfirmation {
            device: session.name().to_string(),
            media_url: command.media_url.clone(),
            player_state,
            volume: command.volume,
            elapsed,
        })
    }

    async fn bounded<T>(
        &self,
        stage: &'static str,
        fut: impl Future<Output = Result<T, CastError>>,
    ) -> Result<Result<T, CastError>, PlaybackError> {
        tokio::time::timeout(self.command_timeout, fut)
            .await
            .map_err(|_| PlaybackError::Timeout {
                stage,
                after_ms: self.command_timeout.as_millis() as u64,
            })
    }

    async fn await_ack(
        &self,
        session: &dyn CastSession,
        media_url: &str,
        before: Option<&MediaStatus>,
    ) -> Result<PlayerState, PlaybackError> {
        let deadline = Instant::now() + self.ack_timeout;
        loop {
            let status = self
                .bounded("status", session.media_status())
                .await?
                .map_err(PlaybackError::Status)?;

            let stale = before == Some(&status) && !playing_ours(&status, media_url);
            if stale {
                tracing::trace!(device = session.name(), "status unchanged since load");
            } else if let Some(state) = acknowledged(&status, media_url)? {
                return Ok(state);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(PlaybackError::Timeout {
                    stage: "playback acknowledgment",
                    after_ms: self.ack_timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

fn playing_ours(status: &MediaStatus, media_url: &str) -> bool {
    matches!(status.player_state, PlayerState::Playing | PlayerState::Paused)
        && status.content_id.as_deref() == Some(media_url)
}

/// Interprets one status report. `Ok(None)` means keep waiting.
fn acknowledged(status: &MediaStatus, media_url: &str) -> Result<Option<PlayerState>, PlaybackError> {
    let ours = status.content_id.as_deref().map_or(true, |id| id == media_url);
    match (status.player_state, status.idle_reason) {
        (PlayerState::Playing | PlayerState::Paused, _) if ours => Ok(Some(status.player_state)),
        // Short clips can finish between two polls.
        (PlayerState::Idle, Some(IdleReason::Finished))
            if status.content_id.as_deref() == Some(media_url) =>
        {
            Ok(Some(PlayerState::Idle))
        }
        (PlayerState::Idle, Some(IdleReason::Error)) if ours => Err(PlaybackError::Rejected(format!(
            "device reported a load error for {media_url}"
        ))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Volume(f32),
        Load(String),
        Status,
    }

    /// Session that records commands and replays scripted statuses.
    struct ScriptedSession {
        calls: Mutex<Vec<Call>>,
        statuses: Mutex<VecDeque<MediaStatus>>,
        fail_volume: bool,
        hang_load: bool,
    }

    impl ScriptedSession {
        fn new(statuses: Vec<MediaStatus>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                statuses: Mutex::new(statuses.into()),
                fail_volume: false,
                hang_load: false,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CastSession for ScriptedSession {
        fn name(&self) -> &str {
            "Kitchen"
        }

        async fn set_volume(&self, level: f32) -> Result<(), CastError> {
            self.calls.lock().unwrap().push(Call::Volume(level));
            if self.fail_volume {
                return Err(CastError::Device("volume refused".into()));
            }
            Ok(())
        }

        async fn load(&self, url: &str, _content_type: &str) -> Result<(), CastError> {
            self.calls.lock().unwrap().push(Call::Load(url.to_string()));
            if self.hang_load {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn media_status(&self) -> Result<MediaStatus, CastError> {
            self.calls.lock().unwrap().push(Call::Status);
            let mut statuses = self.statuses.lock().unwrap();
            let next = if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            };
            Ok(next.unwrap_or(status(PlayerState::Idle, None, None)))
        }
    }

    fn status(player_state: PlayerState, idle_reason: Option<IdleReason>, content_id: Option<&str>) -> MediaStatus {
        MediaStatus {
            player_state,
            idle_reason,
            content_id: content_id.map(str::to_string),
        }
    }

    const URL: &str = "http://herald.local:8080/cache/abc.wav";

    fn dispatcher() -> PlaybackDispatcher {
        PlaybackDispatcher::new(Duration::from_millis(200), Duration::from_millis(300))
            .with_poll_interval(Duration::from_millis(5))
    }

    fn command(volume: Option<f32>) -> PlaybackCommand {
        PlaybackCommand::new(URL, "audio/wav", volume)
    }

    #[tokio::test]
    async fn volume_is_set_before_load() {
        let session = ScriptedSession::new(vec![status(PlayerState::Playing, None, Some(URL))]);
        let confirmation = dispatcher().play(&session, &command(Some(1.0))).await.unwrap();

        let commands: Vec<_> = session.calls().into_iter().filter(|c| *c != Call::Status).collect();
        assert_eq!(commands, vec![Call::Volume(1.0), Call::Load(URL.to_string())]);
        assert_eq!(confirmation.volume, Some(1.0));
        assert_eq!(confirmation.player_state, PlayerState::Playing);
        assert_eq!(confirmation.device, "Kitchen");
    }

    #[tokio::test]
    async fn no_volume_command_without_volume() {
        let session = ScriptedSession::new(vec![status(PlayerState::Playing, None, Some(URL))]);
        dispatcher().play(&session, &command(None)).await.unwrap();
        assert!(!session.calls().iter().any(|c| matches!(c, Call::Volume(_))));
    }

    #[tokio::test]
    async fn waits_through_buffering() {
        let session = ScriptedSession::new(vec![
            status(PlayerState::Idle, None, None),
            status(PlayerState::Buffering, None, Some(URL)),
            status(PlayerState::Playing, None, Some(URL)),
        ]);
        dispatcher().play(&session, &command(None)).await.unwrap();
        let polls = session.calls().iter().filter(|c| **c == Call::Status).count();
        assert_eq!(polls, 3);
    }

    #[tokio::test]
    async fn finished_clip_counts_as_acknowledged() {
        let session = ScriptedSession::new(vec![
            status(PlayerState::Idle, None, None),
            status(PlayerState::Idle, Some(IdleReason::Finished), Some(URL)),
        ]);
        let confirmation = dispatcher().play(&session, &command(None)).await.unwrap();
        assert_eq!(confirmation.player_state, PlayerState::Idle);
    }

    #[tokio::test]
    async fn other_media_playing_is_not_an_ack() {
        let session = ScriptedSession::new(vec![status(
            PlayerState::Playing,
            None,
            Some("http://elsewhere/other.mp3"),
        )]);
        let err = dispatcher().play(&session, &command(None)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Timeout { stage: "playback acknowledgment", .. }));
    }

    #[tokio::test]
    async fn load_error_is_rejected() {
        let session = ScriptedSession::new(vec![
            status(PlayerState::Idle, None, None),
            status(PlayerState::Idle, Some(IdleReason::Error), Some(URL)),
        ]);
        let err = dispatcher().play(&session, &command(None)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Rejected(_)));
    }

    #[tokio::test]
    async fn volume_failure_stops_before_load() {
        let mut session = ScriptedSession::new(vec![]);
        session.fail_volume = true;
        let err = dispatcher().play(&session, &command(Some(1.0))).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Volume(_)));
        assert_eq!(session.calls(), vec![Call::Volume(1.0)]);
    }

    #[tokio::test]
    async fn hung_load_times_out() {
        let mut session = ScriptedSession::new(vec![]);
        session.hang_load = true;
        let err = dispatcher().play(&session, &command(None)).await.unwrap_err();
        match err {
            PlaybackError::Timeout { stage, after_ms } => {
                assert_eq!(stage, "load");
                assert_eq!(after_ms, 200);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_plays_do_not_interleave() {
        let session = Arc::new(ScriptedSession::new(vec![status(PlayerState::Playing, None, Some(URL))]));
        let dispatcher = Arc::new(dispatcher());

        let mut tasks = Vec::new();
        for volume in [Some(0.2), Some(0.9)] {
            let session = session.clone();
            let dispatcher = dispatcher.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher.play(session.as_ref(), &command(volume)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Each play is volume, status, load, status with nothing in between.
        let calls = session.calls();
        assert_eq!(calls.len(), 8);
        for play in calls.chunks(4) {
            assert!(matches!(play[0], Call::Volume(_)));
            assert_eq!(play[1], Call::Status);
            assert!(matches!(play[2], Call::Load(_)));
            assert_eq!(play[3], Call::Status);
        }
    }

    #[tokio::test]
    async fn leftover_finished_status_is_not_an_ack() {
        // Replaying a cached clip: the device still reports the last run.
        let finished = status(PlayerState::Idle, Some(IdleReason::Finished), Some(URL));
        let session = ScriptedSession::new(vec![finished]);
        let err = dispatcher().play(&session, &command(None)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Timeout { stage: "playback acknowledgment", .. }));
    }

    #[tokio::test]
    async fn replay_is_acknowledged_once_status_changes() {
        let finished = status(PlayerState::Idle, Some(IdleReason::Finished), Some(URL));
        let session = ScriptedSession::new(vec![
            finished.clone(),
            finished,
            status(PlayerState::Buffering, None, Some(URL)),
            status(PlayerState::Playing, None, Some(URL)),
        ]);
        let confirmation = dispatcher().play(&session, &command(None)).await.unwrap();
        assert_eq!(confirmation.player_state, PlayerState::Playing);
    }

    #[tokio::test]
    async fn unchanged_anonymous_playing_is_not_an_ack() {
        let session = ScriptedSession::new(vec![status(PlayerState::Playing, None, None)]);
        let err = dispatcher().play(&session, &command(None)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Timeout { .. }));
    }

    #[tokio::test]
    async fn stale_load_error_is_not_a_rejection() {
        let session = ScriptedSession::new(vec![
            status(PlayerState::Idle, Some(IdleReason::Error), Some(URL)),
            status(PlayerState::Playing, None, Some(URL)),
        ]);
        dispatcher().play(&session, &command(None)).await.unwrap();
    }
}
