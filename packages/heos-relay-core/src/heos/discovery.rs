//! SSDP discovery of HEOS devices.
//!
//! Any HEOS device on the network can serve as the control endpoint for the
//! whole fleet, so discovery stops at the first device that answers.

use std::future::poll_fn;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::task::{Context, Poll};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::ReadBuf;
use tokio::net::UdpSocket;
use tokio::time::{sleep_until, timeout_at, Instant};

use super::{HeosError, HeosResult};
use crate::protocol_constants::{HEOS_SEARCH_TARGET, SSDP_MULTICAST_ADDR, SSDP_MX_SECS};

/// Number of M-SEARCH packets sent per discovery run (UDP is lossy).
const SEND_COUNT: u32 = 3;

/// Spacing between M-SEARCH packets.
const SEND_SPACING: Duration = Duration::from_millis(300);

/// Pause after a failed receive before reading again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A device that answered an M-SEARCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Address the device should be contacted at.
    pub ip: IpAddr,
    /// Description URL from the `LOCATION` header, if present.
    pub location: Option<String>,
}

/// Builds the M-SEARCH message for HEOS devices.
fn build_msearch_message() -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: 239.255.255.250:1900\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\r\n",
        SSDP_MX_SECS, HEOS_SEARCH_TARGET
    )
}

/// Returns the value of a header line, matched case-insensitively.
fn header_value<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

/// Extracts the host from a `LOCATION` URL such as `http://10.0.0.4:60006/desc.xml`.
fn location_host(location: &str) -> Option<IpAddr> {
    let rest = location.split_once("://").map_or(location, |(_, r)| r);
    let authority = rest.split('/').next()?;
    let host = authority.rsplit_once(':').map_or(authority, |(h, _)| h);
    host.parse().ok()
}

/// Parses an SSDP response, returning `None` for non-HEOS devices.
///
/// The `LOCATION` host is preferred over the datagram source because some
/// devices answer from a different interface than the one they serve on.
pub(crate) fn parse_ssdp_response(response: &str, src_ip: IpAddr) -> Option<DiscoveredDevice> {
    let target = header_value(response, "st").or_else(|| header_value(response, "nt"))?;
    if !target.eq_ignore_ascii_case(HEOS_SEARCH_TARGET) {
        return None;
    }

    let location = header_value(response, "location").map(str::to_string);
    let ip = location
        .as_deref()
        .and_then(location_host)
        .unwrap_or(src_ip);

    Some(DiscoveredDevice { ip, location })
}

/// Creates the UDP socket used for both sending and receiving.
fn create_socket() -> HeosResult<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("[Discovery] Failed to set SO_REUSEADDR: {}", e);
    }
    // UPnP recommends a TTL of 4 for SSDP multicast
    if let Err(e) = socket.set_multicast_ttl_v4(4) {
        log::warn!("[Discovery] Failed to set multicast TTL: {}", e);
    }

    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).into())?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Discovers the first HEOS device that answers within `wait`.
pub async fn discover_first(wait: Duration) -> HeosResult<DiscoveredDevice> {
    let socket = create_socket()?;
    let msg = build_msearch_message();
    let deadline = Instant::now() + wait;

    for i in 0..SEND_COUNT {
        if let Err(e) = socket.send_to(msg.as_bytes(), SSDP_MULTICAST_ADDR).await {
            log::warn!("[Discovery] Failed to send M-SEARCH (attempt {}): {}", i + 1, e);
        }
        if let Some(device) = receive_until(&socket, Instant::now() + SEND_SPACING).await {
            return Ok(device);
        }
    }

    receive_until(&socket, deadline)
        .await
        .ok_or(HeosError::NoDevices(wait.as_millis() as u64))
}

/// Receive side of the discovery socket.
trait DatagramSource {
    fn poll_recv_from(
        &self,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<SocketAddr>>;
}

impl DatagramSource for UdpSocket {
    fn poll_recv_from(
        &self,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<SocketAddr>> {
        UdpSocket::poll_recv_from(self, cx, buf)
    }
}

/// Reads responses until a HEOS device answers or the deadline passes.
async fn receive_until(
    socket: &impl DatagramSource,
    deadline: Instant,
) -> Option<DiscoveredDevice> {
    let mut buf = [0u8; 2048];
    loop {
        let received = timeout_at(
            deadline,
            poll_fn(|cx| {
                let mut read = ReadBuf::new(&mut buf);
                socket
                    .poll_recv_from(cx, &mut read)
                    .map_ok(|src| (read.filled().len(), src))
            }),
        )
        .await;

        let (len, src) = match received {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                log::debug!("[Discovery] Receive error: {}", e);
                if Instant::now() >= deadline {
                    return None;
                }
                sleep_until((Instant::now() + RECV_ERROR_BACKOFF).min(deadline)).await;
                continue;
            }
            Err(_) => return None,
        };

        let response = String::from_utf8_lossy(&buf[..len]);
        match parse_ssdp_response(&response, src.ip()) {
            Some(device) => {
                log::info!(
                    "[Discovery] Found HEOS device at {} (location: {:?})",
                    device.ip,
                    device.location
                );
                return Some(device);
            }
            None => log::trace!("[Discovery] Ignoring SSDP response from {}", src),
        }
    }
}
