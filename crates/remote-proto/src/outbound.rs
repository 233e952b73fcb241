use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{inbound::parse_seconds, ProtoError, CLIENT_INFO_PREFIX, PING_PREFIX, TIMECODE_PREFIX};

const FIELD_SEPARATOR: char = '|';
const UNKNOWN_BATTERY: i16 = -1;

/// Device description reported once per successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub ip: String,
    pub os: String,
    /// Charge in percent; `None` when the platform cannot report it.
    pub battery: Option<u8>,
}

/// Frame sent from the headset to the control server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OutboundFrame {
    Timecode(f64),
    Ping(String),
    ClientInfo(ClientInfo),
}

impl OutboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::Timecode(_) => "timecode",
            OutboundFrame::Ping(_) => "ping",
            OutboundFrame::ClientInfo(_) => "client_info",
        }
    }
}

impl fmt::Display for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundFrame::Timecode(seconds) => write!(f, "{TIMECODE_PREFIX}{seconds:.1}"),
            OutboundFrame::Ping(token) => write!(f, "{PING_PREFIX}{token}"),
            OutboundFrame::ClientInfo(info) => {
                let battery = info.battery.map(i16::from).unwrap_or(UNKNOWN_BATTERY);
                write!(
                    f,
                    "{CLIENT_INFO_PREFIX}{}|{}|{}|{battery}",
                    sanitize(&info.name),
                    sanitize(&info.ip),
                    sanitize(&info.os),
                )
            }
        }
    }
}

fn sanitize(field: &str) -> String {
    field
        .chars()
        .map(|ch| match ch {
            FIELD_SEPARATOR => '/',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

/// Parses a headset frame on the server side.
pub fn parse_outbound(frame: &str) -> Result<OutboundFrame, ProtoError> {
    let text = frame.trim();
    if let Some(rest) = text.strip_prefix(TIMECODE_PREFIX) {
        return parse_seconds(rest).map(OutboundFrame::Timecode);
    }
    if let Some(rest) = text.strip_prefix(PING_PREFIX) {
        return Ok(OutboundFrame::Ping(rest.to_string()));
    }
    if let Some(rest) = text.strip_prefix(CLIENT_INFO_PREFIX) {
        let fields: Vec<&str> = rest.split(FIELD_SEPARATOR).collect();
        let [name, ip, os, battery] = fields.as_slice() else {
            return Err(ProtoError::ClientInfoFields {
                found: fields.len(),
            });
        };
        let level: i16 = battery
            .trim()
            .trim_end_matches('%')
            .parse()
            .map_err(|_| ProtoError::InvalidBattery {
                payload: battery.to_string(),
            })?;
        let battery = match level {
            UNKNOWN_BATTERY => None,
            0..=100 => Some(level as u8),
            _ => {
                return Err(ProtoError::InvalidBattery {
                    payload: battery.to_string(),
                })
            }
        };
        return Ok(OutboundFrame::ClientInfo(ClientInfo {
            name: name.to_string(),
            ip: ip.to_string(),
            os: os.to_string(),
            battery,
        }));
    }
    Err(ProtoError::UnknownFrame {
        frame: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode_frame, Command};

    fn quest() -> ClientInfo {
        ClientInfo {
            name: "Quest-3".into(),
            ip: "192.168.1.40".into(),
            os: "Android 12".into(),
            battery: Some(87),
        }
    }

    #[test]
    fn timecode_has_one_decimal() {
        assert_eq!(OutboundFrame::Timecode(42.5).to_string(), "TIMECODE:42.5");
        assert_eq!(OutboundFrame::Timecode(3.0).to_string(), "TIMECODE:3.0");
        assert_eq!(OutboundFrame::Timecode(12.34).to_string(), "TIMECODE:12.3");
    }

    #[test]
    fn seek_value_survives_timecode_report() {
        for frame in ["seek:42.5", "seek:0", "seek:120.25", "seek:3599.9"] {
            let Some(Command::Seek(seconds)) = decode_frame(frame) else {
                panic!("expected seek for {frame}");
            };
            let report = OutboundFrame::Timecode(seconds).to_string();
            let Ok(OutboundFrame::Timecode(echoed)) = parse_outbound(&report) else {
                panic!("expected timecode for {report}");
            };
            assert!(
                (echoed - seconds).abs() <= 0.05 + f64::EPSILON,
                "{frame} -> {report}"
            );
        }
    }

    #[test]
    fn ping_carries_token() {
        assert_eq!(
            OutboundFrame::Ping("1700000000000".into()).to_string(),
            "PING:1700000000000"
        );
    }

    #[test]
    fn client_info_layout() {
        assert_eq!(
            OutboundFrame::ClientInfo(quest()).to_string(),
            "CLIENT_INFO:Quest-3|192.168.1.40|Android 12|87"
        );
    }

    #[test]
    fn client_info_escapes_separator_and_unknown_battery() {
        let info = ClientInfo {
            name: "lobby|left".into(),
            battery: None,
            ..quest()
        };
        let frame = OutboundFrame::ClientInfo(info).to_string();
        assert_eq!(frame, "CLIENT_INFO:lobby/left|192.168.1.40|Android 12|-1");
        let parsed = parse_outbound(&frame).unwrap();
        let OutboundFrame::ClientInfo(parsed) = parsed else {
            panic!("expected client info");
        };
        assert_eq!(parsed.name, "lobby/left");
        assert_eq!(parsed.battery, None);
    }

    #[test]
    fn server_parses_client_info() {
        let frame = OutboundFrame::ClientInfo(quest()).to_string();
        assert_eq!(parse_outbound(&frame), Ok(OutboundFrame::ClientInfo(quest())));
    }

    #[test]
    fn rejects_malformed_client_info() {
        assert_eq!(
            parse_outbound("CLIENT_INFO:a|b|c"),
            Err(ProtoError::ClientInfoFields { found: 3 })
        );
        assert!(matches!(
            parse_outbound("CLIENT_INFO:a|b|c|full"),
            Err(ProtoError::InvalidBattery { .. })
        ));
        assert!(matches!(
            parse_outbound("CLIENT_INFO:a|b|c|140"),
            Err(ProtoError::InvalidBattery { .. })
        ));
    }

    #[test]
    fn rejects_unknown_outbound_frame() {
        assert!(matches!(
            parse_outbound("HELLO"),
            Err(ProtoError::UnknownFrame { .. })
        ));
    }
}
