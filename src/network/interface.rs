use if_addrs::{get_if_addrs, IfAddr};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tracing::{debug, info};

use crate::config::InterfaceSelection;
use crate::{DialError, Result};

/// The interface the receiver advertises: where senders reach it, and the
/// hardware address used in the SSDP `WAKEUP` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
}

#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    ip: Ipv4Addr,
    is_up: bool,
}

impl LocalInterface {
    /// Resolves the configured selection once, at service start.
    pub fn resolve(selection: &InterfaceSelection) -> Result<Self> {
        match selection {
            InterfaceSelection::Fixed { ip, mac } => Ok(Self {
                name: "fixed".to_string(),
                ip: *ip,
                mac: mac.clone(),
            }),
            InterfaceSelection::Auto => Self::detect(),
        }
    }

    /// Scans the host interfaces for a usable LAN address.
    ///
    /// Loopback, link-local, down and non-private interfaces are skipped. The
    /// interface carrying the default route wins when it is among the rest.
    pub fn detect() -> Result<Self> {
        let interfaces = get_if_addrs()
            .map_err(|e| DialError::DiscoveryUnavailable(format!("failed to enumerate interfaces: {}", e)))?;

        let candidates: Vec<Candidate> = interfaces
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .filter_map(|iface| match iface.addr {
                IfAddr::V4(ref v4) => Some(Candidate {
                    is_up: operstate_up(&iface.name),
                    name: iface.name.clone(),
                    ip: v4.ip,
                }),
                IfAddr::V6(_) => None,
            })
            .collect();

        debug!("Interface candidates: {:?}", candidates);

        let routed = default_route_ipv4();
        let chosen = pick_candidate(&candidates, routed).ok_or_else(|| {
            DialError::DiscoveryUnavailable("no private, up, non-loopback IPv4 interface".to_string())
        })?;

        let local = Self {
            mac: hardware_address(&chosen.name),
            name: chosen.name.clone(),
            ip: chosen.ip,
        };

        info!(
            "Using interface {} ({}, mac {})",
            local.name,
            local.ip,
            local.mac.as_deref().unwrap_or("unknown")
        );
        Ok(local)
    }
}

fn pick_candidate(candidates: &[Candidate], routed: Option<Ipv4Addr>) -> Option<&Candidate> {
    let mut usable: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.is_up && !c.ip.is_loopback() && !c.ip.is_link_local() && c.ip.is_private())
        .collect();

    if let Some(routed) = routed {
        if let Some(found) = usable.iter().copied().find(|c| c.ip == routed) {
            return Some(found);
        }
    }

    usable.sort_by(|a, b| a.name.cmp(&b.name).then(a.ip.cmp(&b.ip)));
    usable.into_iter().next()
}

/// Address the OS would use to reach the internet, i.e. the interface with
/// the default gateway. UDP connect sends nothing.
fn default_route_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

#[cfg(target_os = "linux")]
fn operstate_up(name: &str) -> bool {
    // "unknown" is what many wifi and virtual drivers report while carrying traffic
    match std::fs::read_to_string(format!("/sys/class/net/{}/operstate", name)) {
        Ok(state) => matches!(state.trim(), "up" | "unknown"),
        Err(_) => true,
    }
}

#[cfg(not(target_os = "linux"))]
fn operstate_up(_name: &str) -> bool {
    true
}

#[cfg(target_os = "linux")]
fn hardware_address(name: &str) -> Option<String> {
    let raw = std::fs::read_to_string(format!("/sys/class/net/{}/address", name)).ok()?;
    let mac = raw.trim();
    if mac.is_empty() || mac == "00:00:00:00:00:00" {
        return None;
    }
    Some(mac.to_string())
}

// TODO: read the adapter address through GetAdaptersAddresses / getifaddrs(AF_LINK)
#[cfg(not(target_os = "linux"))]
fn hardware_address(_name: &str) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, ip: [u8; 4], is_up: bool) -> Candidate {
        Candidate {
            name: name.to_string(),
            ip: Ipv4Addr::from(ip),
            is_up,
        }
    }

    #[test]
    fn test_pick_prefers_routed_interface() {
        let candidates = vec![
            candidate("docker0", [172, 17, 0, 1], true),
            candidate("wlan0", [192, 168, 1, 30], true),
        ];
        let chosen = pick_candidate(&candidates, Some(Ipv4Addr::new(192, 168, 1, 30))).unwrap();
        assert_eq!(chosen.name, "wlan0");
    }

    #[test]
    fn test_pick_skips_public_link_local_and_down() {
        let candidates = vec![
            candidate("eth0", [8, 8, 4, 4], true),
            candidate("eth1", [169, 254, 10, 2], true),
            candidate("eth2", [10, 0, 0, 5], false),
            candidate("eth3", [10, 0, 0, 6], true),
        ];
        let chosen = pick_candidate(&candidates, Some(Ipv4Addr::new(8, 8, 4, 4))).unwrap();
        assert_eq!(chosen.name, "eth3");
    }

    #[test]
    fn test_pick_none_when_nothing_usable() {
        let candidates = vec![candidate("tun0", [100, 64, 0, 1], true)];
        assert!(pick_candidate(&candidates, None).is_none());
    }

    #[test]
    fn test_fixed_selection_is_taken_verbatim() {
        let selection = InterfaceSelection::Fixed {
            ip: Ipv4Addr::LOCALHOST,
            mac: Some("02:00:00:00:00:01".into()),
        };
        let local = LocalInterface::resolve(&selection).unwrap();
        assert_eq!(local.ip, Ipv4Addr::LOCALHOST);
        assert_eq!(local.mac.as_deref(), Some("02:00:00:00:00:01"));
    }
}
