//! Event-driven UDP socket with channel-based delivery.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::config::{Datagram, EventConfig};
use crate::error::{Result, UdpError};
use crate::net::{self, AddressFamily};
use crate::state::SocketState;

/// Internal state guarded by one mutex so first-use transitions cannot race.
struct Inner {
    state: SocketState,
    socket: Option<Arc<UdpSocket>>,
    local_addr: Option<SocketAddr>,
    events: Option<broadcast::Sender<Datagram>>,
}

/// An event-driven UDP socket.
///
/// [`listen`](Self::listen) binds the socket and starts a background receive
/// loop; every received datagram is published to all current subscribers.
/// [`send`](Self::send) creates the socket implicitly when none exists yet,
/// so a pure sender never has to listen.
///
/// Closing (or dropping) the socket cancels the receive loop promptly;
/// subscribers then observe the channel as closed and no further datagrams
/// are delivered. An unrecoverable receive error tears the socket down the
/// same way, so a dead loop is never mistaken for a quiet one.
pub struct EventSocket {
    config: EventConfig,
    inner: Arc<Mutex<Inner>>,
    cancel: CancellationToken,
}

impl EventSocket {
    /// Create a new event socket with default configuration. No OS socket
    /// exists until the first `listen` or `send`.
    pub fn new() -> Self {
        Self::with_config(EventConfig::default())
    }

    /// Create a new event socket with the given configuration.
    pub fn with_config(config: EventConfig) -> Self {
        let (events, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: SocketState::Unbound,
                socket: None,
                local_addr: None,
                events: Some(events),
            })),
            cancel: CancellationToken::new(),
        }
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> SocketState {
        self.inner.lock().state
    }

    /// Get the local address once a socket exists.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().local_addr
    }

    /// Subscribe to received datagrams.
    ///
    /// Every subscriber observes every datagram received after it
    /// subscribed. Fails once the socket has been closed or its receive
    /// loop has terminated on an unrecoverable error.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<Datagram>> {
        let inner = self.inner.lock();
        inner
            .events
            .as_ref()
            .map(|events| events.subscribe())
            .ok_or(UdpError::InvalidState("socket is closed"))
    }

    /// Bind to `local` and start the background receive loop, returning the
    /// bound address. With `None`, the configured
    /// [`local_address`](EventConfig::local_address) is used, falling back
    /// to wildcard IPv4 with an OS-assigned port.
    ///
    /// Calling `listen` while a socket already exists is an error; the
    /// lifecycle never returns to `Unbound`. Must be called from within a
    /// tokio runtime.
    pub fn listen(&self, local: Option<SocketAddr>) -> Result<SocketAddr> {
        let (socket, events) = {
            let mut inner = self.inner.lock();
            match inner.state {
                SocketState::Unbound => {}
                SocketState::Active => {
                    return Err(UdpError::InvalidState("socket is already active"));
                }
                SocketState::Closed => return Err(UdpError::InvalidState("socket is closed")),
            }
            let addr = local
                .or(self.config.local_address)
                .unwrap_or_else(|| AddressFamily::V4.wildcard());
            let socket = Arc::new(net::bind(addr, false)?);
            self.apply_options(&socket)?;
            inner.state = SocketState::Active;
            inner.local_addr = socket.local_addr().ok();
            inner.socket = Some(socket.clone());
            let events = inner
                .events
                .clone()
                .ok_or(UdpError::InvalidState("socket is closed"))?;
            (socket, events)
        };

        self.spawn_receive_loop(socket.clone(), events);
        socket.local_addr().map_err(Into::into)
    }

    /// Send one datagram to `dest`.
    ///
    /// If no socket exists yet, one is created and bound to the configured
    /// [`local_address`](EventConfig::local_address), or to an ephemeral
    /// port of `dest`'s family when none is configured. Delivery is not
    /// guaranteed (UDP semantics).
    pub async fn send(&self, dest: SocketAddr, payload: &[u8]) -> Result<usize> {
        let socket = self.get_or_create_socket(AddressFamily::of(&dest))?;
        Ok(socket.send_to(payload, dest).await?)
    }

    /// Join a multicast group.
    ///
    /// Fails with an invalid-state error before `listen` (or a first `send`)
    /// has created a socket; IPv4 membership is expressed through the bound
    /// local address. The membership mechanism follows the group address's
    /// family, which must match the socket's.
    pub fn join_multicast_group(&self, group: IpAddr) -> Result<()> {
        let (socket, local) = self.bound_socket()?;
        net::join_multicast(&socket, group, local)
    }

    /// Leave a multicast group previously joined with
    /// [`join_multicast_group`](Self::join_multicast_group).
    pub fn drop_multicast_group(&self, group: IpAddr) -> Result<()> {
        let (socket, local) = self.bound_socket()?;
        net::leave_multicast(&socket, group, local)
    }

    /// Close the socket: cancel the receive loop, release the OS handle,
    /// and close the event channel. Idempotent and safe without prior use.
    pub fn close(&self) {
        self.cancel.cancel();
        close_inner(&self.inner);
    }

    fn get_or_create_socket(&self, family: AddressFamily) -> Result<Arc<UdpSocket>> {
        let mut inner = self.inner.lock();
        if inner.state == SocketState::Closed {
            return Err(UdpError::InvalidState("socket is closed"));
        }
        if let Some(socket) = &inner.socket {
            return Ok(socket.clone());
        }
        let addr = match self.config.local_address {
            Some(local) => {
                let local_family = AddressFamily::of(&local);
                if local_family != family {
                    return Err(UdpError::FamilyMismatch {
                        socket: local_family,
                        addr: family,
                    });
                }
                local
            }
            None => family.wildcard(),
        };
        let socket = Arc::new(net::bind(addr, false)?);
        self.apply_options(&socket)?;
        inner.state = SocketState::Active;
        inner.local_addr = socket.local_addr().ok();
        inner.socket = Some(socket.clone());
        Ok(socket)
    }

    fn apply_options(&self, socket: &UdpSocket) -> Result<()> {
        if self.config.broadcast {
            socket.set_broadcast(true)?;
        }
        Ok(())
    }

    fn bound_socket(&self) -> Result<(Arc<UdpSocket>, SocketAddr)> {
        let inner = self.inner.lock();
        match (&inner.socket, inner.local_addr) {
            (Some(socket), Some(local)) => Ok((socket.clone(), local)),
            _ => Err(UdpError::InvalidState(
                "listen must be called before changing multicast membership",
            )),
        }
    }

    fn spawn_receive_loop(&self, socket: Arc<UdpSocket>, events: broadcast::Sender<Datagram>) {
        let cancel = self.cancel.clone();
        let inner = self.inner.clone();
        let buffer_size = self.config.recv_buffer_size.max(net::MIN_BUFFER_SIZE);
        tokio::spawn(async move {
            let mut buf = vec![0u8; buffer_size];
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = socket.recv_from(&mut buf) => result,
                };
                match received {
                    Ok((len, source)) => {
                        let datagram = Datagram::new(Bytes::copy_from_slice(&buf[..len]), source);
                        // No subscribers is fine; delivery resumes with the
                        // next subscriber.
                        let _ = events.send(datagram);
                    }
                    Err(err) if net::is_transient_recv_error(&err) => {
                        tracing::warn!(
                            target: "udp_conduit::event",
                            "transient receive error: {}", err
                        );
                    }
                    Err(err) => {
                        tracing::error!(
                            target: "udp_conduit::event",
                            "receive loop terminated: {}", err
                        );
                        // Subscribers must see the channel close rather than
                        // wait forever on a loop that no longer exists.
                        cancel.cancel();
                        close_inner(&inner);
                        break;
                    }
                }
            }
        });
    }
}

/// Terminal teardown shared by `close` and a fatal receive-loop exit. Drops
/// the channel sender so every receiver observes `Closed`, and moves the
/// lifecycle to `Closed` so later `subscribe`/`listen`/`send` calls fail.
fn close_inner(inner: &Mutex<Inner>) {
    let mut inner = inner.lock();
    inner.state = SocketState::Closed;
    inner.socket = None;
    inner.events = None;
}

impl Default for EventSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EventSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSocket")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}
