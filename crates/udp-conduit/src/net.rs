//! Shared socket plumbing: address families, low-level binding, and
//! multicast membership dispatch.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::{Result, UdpError};

/// Smallest staging buffer a receive loop will work with.
pub(crate) const MIN_BUFFER_SIZE: usize = 512;

/// The address family of a UDP socket, fixed for its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4.
    V4,
    /// IPv6.
    V6,
}

impl AddressFamily {
    /// The family of a socket address.
    pub fn of(addr: &SocketAddr) -> Self {
        if addr.is_ipv4() { Self::V4 } else { Self::V6 }
    }

    /// The family of a bare IP address.
    pub fn of_ip(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    /// The wildcard endpoint for this family with an OS-assigned port.
    pub fn wildcard(self) -> SocketAddr {
        match self {
            Self::V4 => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            Self::V6 => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        }
    }

    fn domain(self) -> Domain {
        match self {
            Self::V4 => Domain::IPV4,
            Self::V6 => Domain::IPV6,
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// Create a UDP socket bound to `addr` and hand it to tokio.
///
/// Goes through socket2 so `SO_REUSEADDR` can be applied before the bind.
/// Must be called from within a tokio runtime.
pub(crate) fn bind(addr: SocketAddr, reuse_address: bool) -> io::Result<UdpSocket> {
    let domain = AddressFamily::of(&addr).domain();
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(reuse_address)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// Join `group` on `socket`, which is bound to `local`.
///
/// The membership mechanism is selected by the group address's family and
/// verified against the socket's family before any OS call: IPv4 memberships
/// are interface-scoped through the bound local address, IPv6 memberships use
/// the default interface index.
pub(crate) fn join_multicast(socket: &UdpSocket, group: IpAddr, local: SocketAddr) -> Result<()> {
    match checked_group(group, local)? {
        Membership::V4 { group, interface } => socket.join_multicast_v4(group, interface)?,
        Membership::V6 { group } => socket.join_multicast_v6(&group, 0)?,
    }
    Ok(())
}

/// Revoke a membership previously added with [`join_multicast`].
pub(crate) fn leave_multicast(socket: &UdpSocket, group: IpAddr, local: SocketAddr) -> Result<()> {
    match checked_group(group, local)? {
        Membership::V4 { group, interface } => socket.leave_multicast_v4(group, interface)?,
        Membership::V6 { group } => socket.leave_multicast_v6(&group, 0)?,
    }
    Ok(())
}

enum Membership {
    V4 { group: Ipv4Addr, interface: Ipv4Addr },
    V6 { group: Ipv6Addr },
}

fn checked_group(group: IpAddr, local: SocketAddr) -> Result<Membership> {
    if !group.is_multicast() {
        return Err(UdpError::NotMulticast(group));
    }
    match (group, local.ip()) {
        (IpAddr::V4(group), IpAddr::V4(interface)) => Ok(Membership::V4 { group, interface }),
        (IpAddr::V6(group), IpAddr::V6(_)) => Ok(Membership::V6 { group }),
        (group, local_ip) => Err(UdpError::FamilyMismatch {
            socket: AddressFamily::of_ip(&local_ip),
            addr: AddressFamily::of_ip(&group),
        }),
    }
}

/// Whether a receive error is a per-datagram artifact that should not end
/// the loop. `ConnectionReset`/`ConnectionRefused` are ICMP echoes of a
/// previous send (notably on Windows loopback), not socket failures.
pub(crate) fn is_transient_recv_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
    )
}
