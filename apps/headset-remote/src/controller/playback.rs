use serde::Serialize;

/// Playback intent as commanded by the server, independent of the decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct PlaybackState {
    pub current_video: Option<String>,
    pub position_seconds: f64,
    pub is_playing: bool,
}

impl PlaybackState {
    pub fn has_video(&self) -> bool {
        self.current_video.is_some()
    }

    pub(crate) fn play(&mut self, video_id: String) {
        self.current_video = Some(video_id);
        self.position_seconds = 0.0;
        self.is_playing = true;
    }

    pub(crate) fn stop(&mut self) {
        self.current_video = None;
        self.position_seconds = 0.0;
        self.is_playing = false;
    }

    /// Negative, `-0.0` and NaN positions all store `0.0`.
    pub(crate) fn set_position(&mut self, seconds: f64) {
        self.position_seconds = if seconds > 0.0 { seconds } else { 0.0 };
    }
}
