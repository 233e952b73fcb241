//! Stand-ins for the decoder and the overlay when running headless.

use std::time::Instant;

use tracing::info;

use crate::controller::{MediaSink, NoticeSink};

/// Clock-driven player: reports the position a real decoder would have
/// reached, without decoding anything.
#[derive(Debug, Default)]
pub struct SimulatedPlayer {
    video: Option<String>,
    offset_seconds: f64,
    resumed_at: Option<Instant>,
}

impl SimulatedPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn elapsed(&self) -> f64 {
        self.resumed_at
            .map(|at| at.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl MediaSink for SimulatedPlayer {
    fn start(&mut self, video_id: &str) {
        info!(target = "headset_remote::media", video = video_id, "starting playback");
        self.video = Some(video_id.to_string());
        self.offset_seconds = 0.0;
        self.resumed_at = Some(Instant::now());
    }

    fn pause(&mut self) {
        self.offset_seconds += self.elapsed();
        self.resumed_at = None;
        info!(target = "headset_remote::media", position = self.offset_seconds, "paused");
    }

    fn resume(&mut self) {
        if self.video.is_some() && self.resumed_at.is_none() {
            self.resumed_at = Some(Instant::now());
            info!(target = "headset_remote::media", position = self.offset_seconds, "resumed");
        }
    }

    fn stop(&mut self) {
        info!(target = "headset_remote::media", "stopped");
        *self = Self::default();
    }

    fn seek(&mut self, seconds: f64) {
        self.offset_seconds = seconds;
        if self.resumed_at.is_some() {
            self.resumed_at = Some(Instant::now());
        }
        info!(target = "headset_remote::media", position = seconds, "seek");
    }

    fn position(&self) -> Option<f64> {
        self.video.as_ref()?;
        Some(self.offset_seconds + self.elapsed())
    }
}

/// Writes notices to the log instead of an overlay.
#[derive(Debug, Default)]
pub struct LogNoticeSink;

impl NoticeSink for LogNoticeSink {
    fn show(&mut self, text: &str) {
        info!(target = "headset_remote::notice", %text, "notice shown");
    }

    fn clear(&mut self) {
        info!(target = "headset_remote::notice", "notice cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_player_has_no_position() {
        let player = SimulatedPlayer::new();
        assert_eq!(player.position(), None);
    }

    #[test]
    fn paused_seek_holds_position() {
        let mut player = SimulatedPlayer::new();
        player.start("rio.mp4");
        player.pause();
        player.seek(42.5);
        assert_eq!(player.position(), Some(42.5));
    }

    #[test]
    fn stop_forgets_video() {
        let mut player = SimulatedPlayer::new();
        player.start("rio.mp4");
        player.stop();
        assert_eq!(player.position(), None);
        player.resume();
        assert_eq!(player.position(), None);
    }
}
