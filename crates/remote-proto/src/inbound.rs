use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    ProtoError, NOTICE_PREFIX, PAUSE_KEYWORD, PING_PREFIX, PLAY_PREFIX, RESUME_KEYWORD,
    SEEK_PREFIX, STOP_KEYWORD,
};

/// Instruction decoded from a server frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Command {
    Play(String),
    Pause,
    Resume,
    Stop,
    Seek(f64),
    Notice(String),
    Unknown(String),
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Play(_) => "play",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
            Command::Seek(_) => "seek",
            Command::Notice(_) => "notice",
            Command::Unknown(_) => "unknown",
        }
    }
}

/// Decodes one inbound frame.
///
/// Returns `None` for server liveness probes (`PING:`), which are consumed by
/// the transport layer and never reach the controller. Everything else maps
/// to a [`Command`]; frames that cannot be understood become
/// [`Command::Unknown`] and are logged, never rejected.
///
/// Rules are tried in order and the first match wins. `pause`, `resume` and
/// `stop` match anywhere in the frame, so they shadow the `seek:` and
/// `aviso:` prefixes when the payload happens to contain one of them.
pub fn decode_frame(frame: &str) -> Option<Command> {
    let text = frame.trim();

    if let Some(rest) = text.strip_prefix(PLAY_PREFIX) {
        return Some(Command::Play(rest.trim().to_string()));
    }
    if text.contains(PAUSE_KEYWORD) {
        return Some(Command::Pause);
    }
    if text.contains(RESUME_KEYWORD) {
        return Some(Command::Resume);
    }
    if text.contains(STOP_KEYWORD) {
        return Some(Command::Stop);
    }
    if let Some(rest) = text.strip_prefix(SEEK_PREFIX) {
        return Some(match parse_seconds(rest) {
            Ok(seconds) => Command::Seek(seconds),
            Err(err) => {
                warn!(
                    target = "remote_proto::decode",
                    frame = %text,
                    error = %err,
                    "dropping seek with malformed payload"
                );
                Command::Unknown(frame.to_string())
            }
        });
    }
    if let Some(rest) = text.strip_prefix(NOTICE_PREFIX) {
        return Some(Command::Notice(rest.trim().to_string()));
    }
    if text.starts_with(PING_PREFIX) {
        return None;
    }

    warn!(
        target = "remote_proto::decode",
        frame = %text,
        "unrecognized command"
    );
    Some(Command::Unknown(frame.to_string()))
}

/// Parses a seconds payload. Only finite values are accepted.
pub fn parse_seconds(payload: &str) -> Result<f64, ProtoError> {
    let trimmed = payload.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ProtoError::InvalidSeconds {
            payload: trimmed.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_play_with_trimmed_name() {
        assert_eq!(
            decode_frame("play:  rio.mp4 "),
            Some(Command::Play("rio.mp4".into()))
        );
    }

    #[test]
    fn decodes_bare_keywords() {
        assert_eq!(decode_frame("pause"), Some(Command::Pause));
        assert_eq!(decode_frame("resume"), Some(Command::Resume));
        assert_eq!(decode_frame("stop"), Some(Command::Stop));
    }

    #[test]
    fn keywords_match_as_substrings() {
        assert_eq!(decode_frame("please pause now"), Some(Command::Pause));
        assert_eq!(decode_frame("cmd:resume"), Some(Command::Resume));
        assert_eq!(decode_frame("nonstop"), Some(Command::Stop));
    }

    // Substring matching wins over the notice prefix. Tightening this would be
    // a protocol change, so the current behaviour is pinned here.
    #[test]
    fn notice_containing_keyword_decodes_as_keyword() {
        assert_eq!(decode_frame("aviso:please stop"), Some(Command::Stop));
        assert_eq!(decode_frame("aviso:pause for a moment"), Some(Command::Pause));
    }

    #[test]
    fn play_prefix_beats_keywords_in_video_name() {
        assert_eq!(
            decode_frame("play:nonstop.mp4"),
            Some(Command::Play("nonstop.mp4".into()))
        );
    }

    #[test]
    fn decodes_seek_seconds() {
        assert_eq!(decode_frame("seek:42.5"), Some(Command::Seek(42.5)));
        assert_eq!(decode_frame("seek: 7 "), Some(Command::Seek(7.0)));
        assert_eq!(decode_frame("seek:-3"), Some(Command::Seek(-3.0)));
    }

    #[test]
    fn malformed_seek_becomes_unknown() {
        for frame in ["seek:", "seek:abc", "seek:1.2.3", "seek:NaN", "seek:inf"] {
            assert_eq!(
                decode_frame(frame),
                Some(Command::Unknown(frame.to_string())),
                "frame {frame}"
            );
        }
    }

    #[test]
    fn decodes_notice_text() {
        assert_eq!(
            decode_frame("aviso: Look to your left "),
            Some(Command::Notice("Look to your left".into()))
        );
    }

    #[test]
    fn server_ping_is_swallowed() {
        assert_eq!(decode_frame("PING:638400000000000000"), None);
    }

    #[test]
    fn unrecognized_frames_keep_raw_text() {
        assert_eq!(
            decode_frame("volume:10"),
            Some(Command::Unknown("volume:10".into()))
        );
        assert_eq!(decode_frame(""), Some(Command::Unknown(String::new())));
    }

    #[test]
    fn prefixes_are_case_sensitive() {
        assert_eq!(
            decode_frame("PLAY:rio.mp4"),
            Some(Command::Unknown("PLAY:rio.mp4".into()))
        );
    }

    #[test]
    fn command_serializes_with_kind_tag() {
        let json = serde_json::to_value(Command::Seek(1.5)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "seek", "value": 1.5 }));
        assert_eq!(Command::Notice("x".into()).kind(), "notice");
    }
}
