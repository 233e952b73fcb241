use std::net::IpAddr;

use remote_proto::ClientInfo;
use sysinfo::System;

/// Source of the `CLIENT_INFO` announcement.
pub trait ClientInfoSource: Send {
    fn client_info(&self) -> ClientInfo;
}

impl ClientInfoSource for ClientInfo {
    fn client_info(&self) -> ClientInfo {
        self.clone()
    }
}

/// Reads the announcement from the host this process runs on.
#[derive(Debug, Clone)]
pub struct DeviceProbe {
    name: String,
}

impl DeviceProbe {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ClientInfoSource for DeviceProbe {
    fn client_info(&self) -> ClientInfo {
        ClientInfo {
            name: self.name.clone(),
            ip: local_ip()
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            os: os_description(),
            battery: battery_percent(),
        }
    }
}

/// First non-loopback IPv4 address, falling back to IPv6.
pub fn local_ip() -> Option<IpAddr> {
    let interfaces = if_addrs::get_if_addrs().ok()?;
    let mut candidates: Vec<IpAddr> = interfaces
        .iter()
        .filter(|iface| !iface.is_loopback())
        .map(|iface| iface.ip())
        .collect();
    candidates.sort_by_key(|ip| !ip.is_ipv4());
    candidates.into_iter().next()
}

/// OS name with version, plus the CPU architecture.
fn os_description() -> String {
    let os = System::long_os_version()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| std::env::consts::OS.to_string());
    format!("{os} {}", std::env::consts::ARCH)
}

#[cfg(target_os = "linux")]
fn battery_percent() -> Option<u8> {
    let entries = std::fs::read_dir("/sys/class/power_supply").ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        let kind = std::fs::read_to_string(path.join("type")).unwrap_or_default();
        if kind.trim() != "Battery" {
            continue;
        }
        if let Some(level) = std::fs::read_to_string(path.join("capacity"))
            .ok()
            .and_then(|raw| parse_capacity(&raw))
        {
            return Some(level);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn battery_percent() -> Option<u8> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_capacity(raw: &str) -> Option<u8> {
    raw.trim().parse::<u8>().ok().filter(|level| *level <= 100)
}

/// Machine name for the default announcement.
pub fn default_device_name() -> String {
    host_name_or_default(System::host_name())
}

fn host_name_or_default(host: Option<String>) -> String {
    host.map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "headset".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_parsing_rejects_out_of_range() {
        assert_eq!(parse_capacity("87\n"), Some(87));
        assert_eq!(parse_capacity("101"), None);
        assert_eq!(parse_capacity("full"), None);
    }

    #[test]
    fn probe_reports_configured_name_and_platform() {
        let info = DeviceProbe::new("lobby-3").client_info();
        assert_eq!(info.name, "lobby-3");
        assert!(info.os.starts_with(std::env::consts::OS));
        assert!(info.ip.parse::<IpAddr>().is_ok());
    }

    #[test]
    fn os_description_names_the_platform_version() {
        let os = os_description();
        assert!(os.ends_with(std::env::consts::ARCH), "{os}");
        if let Some(long) = System::long_os_version() {
            assert!(os.starts_with(long.trim()), "{os}");
        }
    }

    #[test]
    fn device_name_comes_from_the_host() {
        match System::host_name().map(|name| name.trim().to_string()) {
            Some(host) if !host.is_empty() => assert_eq!(default_device_name(), host),
            _ => assert_eq!(default_device_name(), "headset"),
        }
    }

    #[test]
    fn blank_host_name_falls_back() {
        assert_eq!(host_name_or_default(None), "headset");
        assert_eq!(host_name_or_default(Some("  ".into())), "headset");
        assert_eq!(host_name_or_default(Some("quest-07\n".into())), "quest-07");
    }

    #[test]
    fn static_info_is_its_own_source() {
        let info = ClientInfo {
            name: "fixed".into(),
            ip: "10.0.0.1".into(),
            os: "test".into(),
            battery: None,
        };
        assert_eq!(info.client_info(), info);
    }
}
