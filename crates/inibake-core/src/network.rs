//! Network probes behind `Ping` and `Online` branch conditions.

use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::debug;

/// Reachability checks used by branch conditions.
pub trait NetworkProbe: Send + Sync {
    /// Sends one echo request. Returns the round-trip time or a reason.
    fn ping(&self, host: &str, timeout: Duration) -> Result<Duration, String>;

    /// True when the machine has a routable network address.
    fn is_online(&self) -> bool;
}

/// Probe that talks to the real network.
///
/// `ping` uses an unprivileged ICMP datagram socket; on systems where those
/// are disabled it reports the socket error instead of falling back.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe;

const ICMPV4_ECHO_REQUEST: u8 = 8;
const ICMPV6_ECHO_REQUEST: u8 = 128;

fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| {
            let hi = u32::from(pair[0]) << 8;
            let lo = pair.get(1).copied().map(u32::from).unwrap_or(0);
            hi | lo
        })
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

fn echo_request(v6: bool, sequence: u16) -> Vec<u8> {
    let kind = if v6 { ICMPV6_ECHO_REQUEST } else { ICMPV4_ECHO_REQUEST };
    let mut packet = vec![kind, 0, 0, 0, 0, 0];
    packet.extend_from_slice(&sequence.to_be_bytes());
    packet.extend_from_slice(b"inibake-ping");
    // The kernel fills in the checksum for ICMPv6 datagram sockets.
    if !v6 {
        let sum = checksum(&packet);
        packet[2..4].copy_from_slice(&sum.to_be_bytes());
    }
    packet
}

impl NetworkProbe for SystemProbe {
    fn ping(&self, host: &str, timeout: Duration) -> Result<Duration, String> {
        let addr: SocketAddr = (host, 0)
            .to_socket_addrs()
            .map_err(|e| e.to_string())?
            .next()
            .ok_or_else(|| format!("cannot resolve {}", host))?;

        let v6 = addr.is_ipv6();
        let (domain, protocol) = if v6 {
            (Domain::IPV6, Protocol::ICMPV6)
        } else {
            (Domain::IPV4, Protocol::ICMPV4)
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(protocol)).map_err(|e| e.to_string())?;
        socket.set_read_timeout(Some(timeout)).map_err(|e| e.to_string())?;

        let started = Instant::now();
        socket
            .send_to(&echo_request(v6, 1), &SockAddr::from(addr))
            .map_err(|e| e.to_string())?;

        let mut buf = [MaybeUninit::<u8>::uninit(); 512];
        let received = socket.recv(&mut buf).map_err(|e| e.to_string())?;
        if received == 0 {
            return Err("empty reply".to_string());
        }
        let rtt = started.elapsed();
        debug!(host, rtt_ms = rtt.as_millis() as u64, "ping reply");
        Ok(rtt)
    }

    fn is_online(&self) -> bool {
        // Connecting a UDP socket sends nothing; it only asks the OS for a route.
        let Ok(socket) = UdpSocket::bind("0.0.0.0:0") else {
            return false;
        };
        if socket.connect("8.8.8.8:53").is_err() {
            return false;
        }
        match socket.local_addr() {
            Ok(local) => match local.ip() {
                IpAddr::V4(ip) => !ip.is_unspecified() && !ip.is_loopback(),
                IpAddr::V6(ip) => !ip.is_unspecified() && !ip.is_loopback(),
            },
            Err(_) => false,
        }
    }
}
