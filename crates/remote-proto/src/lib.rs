//! Shared protocol definitions for headset ↔ control server communication.
//!
//! Frames are newline-free UTF-8 text, either a bare keyword (`pause`) or a
//! `prefix:payload` pair (`seek:42.5`). Keeping the vocabulary in its own
//! crate lets a control server reuse the exact same parsing rules as the
//! headset without pulling in the runtime.

mod inbound;
mod outbound;

pub use inbound::{decode_frame, parse_seconds, Command};
pub use outbound::{parse_outbound, ClientInfo, OutboundFrame};

use thiserror::Error;

pub const PLAY_PREFIX: &str = "play:";
pub const SEEK_PREFIX: &str = "seek:";
pub const NOTICE_PREFIX: &str = "aviso:";
pub const PING_PREFIX: &str = "PING:";
pub const TIMECODE_PREFIX: &str = "TIMECODE:";
pub const CLIENT_INFO_PREFIX: &str = "CLIENT_INFO:";

pub const PAUSE_KEYWORD: &str = "pause";
pub const RESUME_KEYWORD: &str = "resume";
pub const STOP_KEYWORD: &str = "stop";

#[derive(Debug, Error, PartialEq)]
pub enum ProtoError {
    #[error("invalid seconds value {payload:?}")]
    InvalidSeconds { payload: String },
    #[error("client info needs 4 fields, got {found}")]
    ClientInfoFields { found: usize },
    #[error("invalid battery level {payload:?}")]
    InvalidBattery { payload: String },
    #[error("unrecognized outbound frame {frame:?}")]
    UnknownFrame { frame: String },
}
