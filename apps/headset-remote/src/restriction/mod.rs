//! Time-windowed camera rotation limits keyed by video.
//!
//! The engine only answers "is the current position inside a window, and
//! with which angle"; clamping the camera is left to the rendering side,
//! which polls [`RestrictionEngine::current`] or subscribes to changes.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

/// Angle used when a window is configured with a non-positive limit.
pub const FALLBACK_MAX_ANGLE: f64 = 45.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestrictionWindow {
    pub video_id: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub max_angle_degrees: f64,
}

impl RestrictionWindow {
    /// Closed interval on both ends.
    pub fn contains(&self, position_seconds: f64) -> bool {
        self.start_seconds <= position_seconds && position_seconds <= self.end_seconds
    }

    pub fn effective_max_angle(&self) -> f64 {
        if self.max_angle_degrees > 0.0 {
            self.max_angle_degrees
        } else {
            FALLBACK_MAX_ANGLE
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{} {:.1}s-{:.1}s max {:.0}°",
            self.video_id,
            self.start_seconds,
            self.end_seconds,
            self.effective_max_angle()
        )
    }
}

/// Immutable lookup of windows per video, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct RestrictionTable {
    by_video: HashMap<String, Vec<RestrictionWindow>>,
    len: usize,
}

impl RestrictionTable {
    pub fn new(windows: impl IntoIterator<Item = RestrictionWindow>) -> Self {
        let mut table = Self::default();
        for window in windows {
            table.len += 1;
            table
                .by_video
                .entry(window.video_id.clone())
                .or_default()
                .push(window);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn windows_for(&self, video_id: &str) -> &[RestrictionWindow] {
        self.by_video
            .get(video_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First window of `video_id` containing the position. Overlapping
    /// windows are not rejected; the earliest configured one wins.
    pub fn find(&self, video_id: &str, position_seconds: f64) -> Option<(usize, &RestrictionWindow)> {
        self.windows_for(video_id)
            .iter()
            .enumerate()
            .find(|(_, window)| window.contains(position_seconds))
    }

    /// Videos sorted by id, for listing.
    pub fn videos(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.by_video.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// What the rendering layer consumes every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct RestrictionSignal {
    pub is_restricted: bool,
    pub max_angle_degrees: f64,
    pub description: String,
}

impl RestrictionSignal {
    fn restricted(window: &RestrictionWindow) -> Self {
        Self {
            is_restricted: true,
            max_angle_degrees: window.effective_max_angle(),
            description: window.describe(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Unrestricted,
    Restricted { video_id: String, index: usize },
}

pub struct RestrictionEngine {
    table: Arc<RestrictionTable>,
    phase: Phase,
    signal: watch::Sender<RestrictionSignal>,
}

impl RestrictionEngine {
    pub fn new(table: Arc<RestrictionTable>) -> Self {
        let (signal, _) = watch::channel(RestrictionSignal::default());
        Self {
            table,
            phase: Phase::Unrestricted,
            signal,
        }
    }

    pub fn table(&self) -> &RestrictionTable {
        &self.table
    }

    pub fn subscribe(&self) -> watch::Receiver<RestrictionSignal> {
        self.signal.subscribe()
    }

    pub fn current(&self) -> RestrictionSignal {
        self.signal.borrow().clone()
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self.phase, Phase::Restricted { .. })
    }

    /// Evaluates the position and publishes a new signal on transitions.
    pub fn update(&mut self, video_id: &str, position_seconds: f64) -> RestrictionSignal {
        match self.table.find(video_id, position_seconds) {
            Some((index, window)) => {
                let next = Phase::Restricted {
                    video_id: video_id.to_string(),
                    index,
                };
                if self.phase != next {
                    debug!(
                        target = "headset_remote::restriction",
                        video = video_id,
                        position = position_seconds,
                        window = %window.describe(),
                        "rotation restricted"
                    );
                    let signal = RestrictionSignal::restricted(window);
                    self.phase = next;
                    self.signal.send_replace(signal);
                }
            }
            None => {
                if self.phase != Phase::Unrestricted {
                    debug!(
                        target = "headset_remote::restriction",
                        video = video_id,
                        position = position_seconds,
                        "rotation unrestricted"
                    );
                    self.clear();
                }
            }
        }
        self.current()
    }

    /// Drops any active restriction, e.g. when the video changes.
    pub fn reset(&mut self) {
        if self.phase != Phase::Unrestricted {
            debug!(target = "headset_remote::restriction", "restriction reset");
            self.clear();
        }
    }

    fn clear(&mut self) {
        self.phase = Phase::Unrestricted;
        self.signal.send_replace(RestrictionSignal::default());
    }
}
