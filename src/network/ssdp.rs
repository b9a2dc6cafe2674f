use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::config::{SsdpSettings, WakeOnLan, SSDP_MULTICAST_ADDR};
use crate::{DialError, Result, DIAL_SEARCH_TARGET};

use super::LocalInterface;

/// Fields of the unicast `200 OK` a sender gets back for its M-SEARCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpAdvertisement {
    /// URL of the device description document.
    pub location: String,
    pub uuid: String,
    pub server: String,
    pub wakeup: Option<Wakeup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wakeup {
    pub mac: String,
    pub timeout_secs: u16,
}

impl Wakeup {
    /// The header is only sent when wake-on-LAN is on and the MAC is known.
    pub fn from_config(wake: &WakeOnLan, mac: Option<&str>) -> Option<Self> {
        match mac {
            Some(mac) if wake.enabled => Some(Self {
                mac: mac.to_string(),
                timeout_secs: wake.timeout_secs,
            }),
            _ => None,
        }
    }
}

impl SsdpAdvertisement {
    pub fn render(&self) -> String {
        let wakeup = self
            .wakeup
            .as_ref()
            .map(|w| format!("WAKEUP: MAC={};Timeout={}\r\n", w.mac, w.timeout_secs))
            .unwrap_or_default();

        format!(
            "HTTP/1.1 200 OK\r\n\
             LOCATION: {location}\r\n\
             CACHE-CONTROL: max-age=1800\r\n\
             EXT:\r\n\
             BOOTID.UPNP.ORG: 1\r\n\
             SERVER: {server}\r\n\
             ST: {st}\r\n\
             USN: uuid:{uuid}::{st}\r\n\
             {wakeup}\
             \r\n",
            location = self.location,
            server = self.server,
            st = DIAL_SEARCH_TARGET,
            uuid = self.uuid,
            wakeup = wakeup,
        )
    }
}

/// Whether a datagram is a DIAL discovery request. Anything carrying the DIAL
/// search target counts; the rest of the payload is not parsed.
pub fn is_dial_search(datagram: &[u8]) -> bool {
    let needle = DIAL_SEARCH_TARGET.as_bytes();
    datagram.windows(needle.len()).any(|window| window == needle)
}

/// UDP responder answering DIAL M-SEARCH requests.
pub struct SsdpResponder {
    socket: UdpSocket,
    membership: Option<(Ipv4Addr, Ipv4Addr)>,
    reply: Vec<u8>,
    poll_interval: Duration,
}

impl SsdpResponder {
    /// Binds the SSDP port and joins the multicast group. Failures here are
    /// fatal; once bound, the responder never gives up on I/O errors.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(settings: &SsdpSettings, local: &LocalInterface, advertisement: &SsdpAdvertisement) -> Result<Self> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, settings.port));

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| DialError::bind("SSDP socket", addr, e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| DialError::bind("SSDP socket", addr, e))?;
        socket
            .bind(&addr.into())
            .map_err(|e| DialError::bind("SSDP socket", addr, e))?;

        let membership = if settings.join_multicast {
            socket
                .join_multicast_v4(&SSDP_MULTICAST_ADDR, &local.ip)
                .map_err(|e| DialError::bind("SSDP multicast membership", addr, e))?;
            Some((SSDP_MULTICAST_ADDR, local.ip))
        } else {
            None
        };

        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket.into())?;

        Ok(Self {
            socket,
            membership,
            reply: advertisement.render().into_bytes(),
            poll_interval: settings.poll_interval(),
        })
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Serves discovery requests until `should_stop` returns true. Checked at
    /// least once per poll interval, so shutdown takes at most that long.
    pub async fn run<F>(self, should_stop: F)
    where
        F: Fn() -> bool,
    {
        let _membership = MembershipGuard {
            socket: &self.socket,
            membership: self.membership,
        };

        info!(
            "SSDP responder listening on {:?}",
            self.socket.local_addr().ok()
        );

        let mut buf = vec![0u8; 4096];
        while !should_stop() {
            let (len, src) = match time::timeout(self.poll_interval, self.socket.recv_from(&mut buf)).await {
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!("SSDP receive error: {}", e);
                    continue;
                }
                Ok(Ok(received)) => received,
            };

            if !is_dial_search(&buf[..len]) {
                trace!("Dropping {} byte datagram from {}", len, src);
                continue;
            }

            debug!("Sending SSDP reply to {}", src);
            if let Err(e) = self.socket.send_to(&self.reply, src).await {
                warn!("Failed to send SSDP reply to {}: {}", src, e);
            }
        }

        info!("SSDP responder stopped");
    }
}

/// Leaves the multicast group when the loop exits, however it exits.
struct MembershipGuard<'a> {
    socket: &'a UdpSocket,
    membership: Option<(Ipv4Addr, Ipv4Addr)>,
}

impl Drop for MembershipGuard<'_> {
    fn drop(&mut self) {
        if let Some((group, iface)) = self.membership {
            if let Err(e) = self.socket.leave_multicast_v4(group, iface) {
                warn!("Failed to leave multicast group {}: {}", group, e);
            }
        }
    }
}
