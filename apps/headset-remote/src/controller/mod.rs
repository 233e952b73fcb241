use std::time::{Duration, Instant};

use remote_proto::{ClientInfo, Command, OutboundFrame};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::restriction::{RestrictionEngine, RestrictionSignal};

mod playback;

pub use playback::PlaybackState;

/// The external media engine. Calls mirror the decoded commands.
pub trait MediaSink: Send {
    fn start(&mut self, video_id: &str);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, seconds: f64);
    /// Position reported by the decoder, if it has one.
    fn position(&self) -> Option<f64>;
}

/// On-screen transient notice display.
pub trait NoticeSink: Send {
    fn show(&mut self, text: &str);
    fn clear(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerTiming {
    pub timecode_interval: Duration,
    pub notice_ttl: Duration,
}

impl Default for ControllerTiming {
    fn default() -> Self {
        Self {
            timecode_interval: Duration::from_secs(5),
            notice_ttl: Duration::from_secs(3),
        }
    }
}

/// Applies server commands to [`PlaybackState`] and schedules status reports.
///
/// Command failures never escape: malformed or out-of-context commands are
/// logged and leave the state untouched.
pub struct SessionController {
    playback: PlaybackState,
    media: Box<dyn MediaSink>,
    notices: Box<dyn NoticeSink>,
    restriction: RestrictionEngine,
    timing: ControllerTiming,
    last_timecode: Option<Instant>,
    notice_deadline: Option<Instant>,
    snapshot: watch::Sender<PlaybackState>,
}

impl SessionController {
    pub fn new(
        media: Box<dyn MediaSink>,
        notices: Box<dyn NoticeSink>,
        restriction: RestrictionEngine,
        timing: ControllerTiming,
    ) -> Self {
        let (snapshot, _) = watch::channel(PlaybackState::default());
        Self {
            playback: PlaybackState::default(),
            media,
            notices,
            restriction,
            timing,
            last_timecode: None,
            notice_deadline: None,
            snapshot,
        }
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn restriction(&self) -> &RestrictionEngine {
        &self.restriction
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackState> {
        self.snapshot.subscribe()
    }

    pub fn subscribe_restriction(&self) -> watch::Receiver<RestrictionSignal> {
        self.restriction.subscribe()
    }

    pub fn apply(&mut self, command: Command, now: Instant) {
        debug!(
            target = "headset_remote::controller",
            command = command.kind(),
            "applying command"
        );
        if !matches!(command, Command::Unknown(_)) {
            self.clear_notice();
        }
        match command {
            Command::Play(video_id) => {
                if video_id.is_empty() {
                    warn!(
                        target = "headset_remote::controller",
                        "play without a video name ignored"
                    );
                    return;
                }
                info!(target = "headset_remote::controller", video = %video_id, "play");
                self.restriction.reset();
                self.media.start(&video_id);
                self.playback.play(video_id);
                self.last_timecode = Some(now);
            }
            Command::Pause => {
                if !self.playback.has_video() {
                    info!(target = "headset_remote::controller", "pause ignored; no active video");
                    return;
                }
                self.playback.is_playing = false;
                self.media.pause();
            }
            Command::Resume => {
                if !self.playback.has_video() {
                    info!(target = "headset_remote::controller", "resume ignored; no active video");
                    return;
                }
                self.playback.is_playing = true;
                self.media.resume();
            }
            Command::Stop => {
                info!(target = "headset_remote::controller", "stop");
                self.restriction.reset();
                self.playback.stop();
                self.media.stop();
                self.last_timecode = None;
            }
            Command::Seek(seconds) => {
                self.playback.set_position(seconds);
                if self.playback.has_video() {
                    self.media.seek(self.playback.position_seconds);
                } else {
                    info!(
                        target = "headset_remote::controller",
                        seconds, "seek recorded without an active video"
                    );
                }
            }
            Command::Notice(text) => {
                self.notices.show(&text);
                self.notice_deadline = Some(now + self.timing.notice_ttl);
            }
            Command::Unknown(raw) => {
                debug!(target = "headset_remote::controller", frame = %raw, "ignoring unknown command");
            }
        }
        self.publish();
    }

    /// Advances playback from the media position, re-evaluates restrictions
    /// and returns a timecode report when one is due.
    pub fn tick(&mut self, now: Instant) -> Option<OutboundFrame> {
        self.expire_notice(now);

        if self.playback.is_playing {
            if let Some(position) = self.media.position() {
                self.playback.set_position(position);
            }
        }
        let Some(video_id) = self.playback.current_video.as_deref() else {
            self.publish();
            return None;
        };
        self.restriction
            .update(video_id, self.playback.position_seconds);

        let mut report = None;
        if self.playback.is_playing {
            let interval = self.timing.timecode_interval;
            let due = self
                .last_timecode
                .is_none_or(|last| now.saturating_duration_since(last) >= interval);
            if due {
                self.last_timecode = Some(now);
                report = Some(OutboundFrame::Timecode(self.playback.position_seconds));
            }
        }
        self.publish();
        report
    }

    /// Frame announcing this device after a successful connect.
    pub fn on_connected(&self, info: ClientInfo) -> OutboundFrame {
        info!(
            target = "headset_remote::controller",
            name = %info.name,
            ip = %info.ip,
            "announcing client"
        );
        OutboundFrame::ClientInfo(info)
    }

    fn expire_notice(&mut self, now: Instant) {
        if self.notice_deadline.is_some_and(|deadline| now >= deadline) {
            self.clear_notice();
        }
    }

    /// A notice lasts until its deadline or the next applied command.
    fn clear_notice(&mut self) {
        if self.notice_deadline.take().is_some() {
            self.notices.clear();
        }
    }

    fn publish(&self) {
        let playback = &self.playback;
        self.snapshot.send_if_modified(|current| {
            if current == playback {
                false
            } else {
                *current = playback.clone();
                true
            }
        });
    }
}
