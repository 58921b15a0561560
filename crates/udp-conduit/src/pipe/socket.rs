//! Stream-oriented UDP socket.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::config::PipeConfig;
use super::status::PipeEnd;
use crate::error::{Result, UdpError};
use crate::net::{self, AddressFamily};
use crate::state::SocketState;

/// Internal state guarded by one mutex so concurrent first use of the two
/// loops cannot race on bind/connect.
struct Inner {
    state: SocketState,
    socket: Option<Arc<UdpSocket>>,
    connected: Option<SocketAddr>,
}

/// A UDP socket exposed as byte-stream endpoints.
///
/// The address family is fixed at construction and holds for the socket's
/// whole lifetime. [`listen`](Self::listen) and [`send`](Self::send) may run
/// concurrently on one instance, one per direction, sharing the same socket.
///
/// Each loop returns a [`PipeEnd`] describing why it stopped; failures come
/// back as errors. Either way the completion signal fires on every exit
/// path: the listen sink is shut down, and the send source has simply been
/// consumed as far as the loop got.
pub struct UdpPipe {
    family: AddressFamily,
    config: PipeConfig,
    inner: Mutex<Inner>,
    cancel: CancellationToken,
}

impl UdpPipe {
    /// Create a new pipe for the given address family. No OS socket exists
    /// until the first `listen` or `send`.
    pub fn new(family: AddressFamily) -> Self {
        Self::with_config(family, PipeConfig::default())
    }

    /// Create a new pipe with the given configuration.
    pub fn with_config(family: AddressFamily, config: PipeConfig) -> Self {
        Self {
            family,
            config,
            inner: Mutex::new(Inner {
                state: SocketState::Unbound,
                socket: None,
                connected: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// The address family selected at construction.
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> SocketState {
        self.inner.lock().state
    }

    /// Get the local address once a socket is bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let inner = self.inner.lock();
        inner
            .socket
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
    }

    /// Get the remote address once the send loop has associated one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().connected
    }

    /// Receive datagrams into `sink` until the loop terminates.
    ///
    /// Binds to `local` (with address reuse, unless configured off) if the
    /// socket is not already bound. Each received datagram is written to the
    /// sink in full and flushed before the next receive, so a bounded sink
    /// such as the write half of [`tokio::io::simplex`] applies back
    /// pressure to the socket.
    ///
    /// Terminates with:
    /// - [`PipeEnd::Cancelled`] when the instance is closed,
    /// - [`PipeEnd::PeerClosed`] on a zero-length datagram,
    /// - [`PipeEnd::DownstreamClosed`] when the sink no longer accepts data,
    /// - `Err` on an unrecoverable socket error.
    ///
    /// The sink is shut down on every exit path, error paths included, so
    /// the consumer always observes end-of-stream.
    pub async fn listen<W>(&self, mut sink: W, local: SocketAddr) -> Result<PipeEnd>
    where
        W: AsyncWrite + Unpin,
    {
        let local_family = AddressFamily::of(&local);
        if local_family != self.family {
            let _ = sink.shutdown().await;
            return Err(UdpError::FamilyMismatch {
                socket: self.family,
                addr: local_family,
            });
        }
        let socket = match self.get_or_bind(Some(local)) {
            Ok(socket) => socket,
            Err(err) => {
                let _ = sink.shutdown().await;
                return Err(err);
            }
        };
        let mut buf = vec![0u8; self.buffer_size()];

        let end = loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => break Ok(PipeEnd::Cancelled),
                result = socket.recv_from(&mut buf) => result,
            };
            match received {
                Ok((0, _)) => break Ok(PipeEnd::PeerClosed),
                Ok((len, _)) => {
                    let flushed = tokio::select! {
                        _ = self.cancel.cancelled() => break Ok(PipeEnd::Cancelled),
                        result = write_datagram(&mut sink, &buf[..len]) => result,
                    };
                    if let Err(err) = flushed {
                        tracing::debug!(
                            target: "udp_conduit::pipe",
                            "downstream closed: {}", err
                        );
                        break Ok(PipeEnd::DownstreamClosed);
                    }
                }
                Err(err) if net::is_transient_recv_error(&err) => {
                    tracing::warn!(
                        target: "udp_conduit::pipe",
                        "transient receive error: {}", err
                    );
                }
                Err(err) => {
                    tracing::error!(
                        target: "udp_conduit::pipe",
                        "receive loop terminated: {}", err
                    );
                    break Err(UdpError::Io(err));
                }
            }
        };

        // Writer-complete signal, required on every exit path.
        let _ = sink.shutdown().await;
        end
    }

    /// Send datagrams drained from `source` until the loop terminates.
    ///
    /// Associates the socket with `remote` once (binding to the family
    /// wildcard first if unbound), then sends each contiguous run yielded by
    /// the source as exactly one datagram. Nothing is ever dropped: every
    /// run is sent, and a run the peer refuses is logged.
    ///
    /// Terminates with [`PipeEnd::SourceComplete`] on source end-of-data,
    /// [`PipeEnd::Cancelled`] when the instance is closed, or `Err` on an
    /// unrecoverable error.
    pub async fn send<R>(&self, mut source: R, remote: SocketAddr) -> Result<PipeEnd>
    where
        R: AsyncRead + Unpin,
    {
        let remote_family = AddressFamily::of(&remote);
        if remote_family != self.family {
            return Err(UdpError::FamilyMismatch {
                socket: self.family,
                addr: remote_family,
            });
        }
        let socket = self.get_or_bind(None)?;
        self.connect_once(&socket, remote).await?;
        let mut buf = vec![0u8; self.buffer_size()];

        loop {
            let read = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(PipeEnd::Cancelled),
                result = source.read(&mut buf) => result,
            };
            match read {
                Ok(0) => return Ok(PipeEnd::SourceComplete),
                Ok(len) => {
                    // One contiguous run becomes exactly one datagram.
                    let sent = tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(PipeEnd::Cancelled),
                        result = socket.send(&buf[..len]) => result,
                    };
                    match sent {
                        Ok(_) => {}
                        Err(err) if err.kind() == io::ErrorKind::ConnectionRefused => {
                            tracing::warn!(
                                target: "udp_conduit::pipe",
                                "datagram refused by peer: {}", err
                            );
                        }
                        Err(err) => {
                            tracing::error!(
                                target: "udp_conduit::pipe",
                                "send loop terminated: {}", err
                            );
                            return Err(UdpError::Io(err));
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(
                        target: "udp_conduit::pipe",
                        "input source failed: {}", err
                    );
                    return Err(UdpError::Io(err));
                }
            }
        }
    }

    /// Join a multicast group.
    ///
    /// Requires a bound socket (IPv4 membership is expressed through the
    /// bound local address). The membership mechanism follows the group
    /// address's family, which must match the socket's.
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

    /// Close the pipe: cancel both loops (if running) and release the OS
    /// handle. Idempotent and safe even if no loop was ever started.
    pub fn close(&self) {
        self.cancel.cancel();
        let mut inner = self.inner.lock();
        inner.state = SocketState::Closed;
        inner.socket = None;
        inner.connected = None;
    }

    fn buffer_size(&self) -> usize {
        self.config.buffer_size.max(net::MIN_BUFFER_SIZE)
    }

    /// First-bind-wins: whichever loop gets here first binds the socket,
    /// the other reuses it.
    fn get_or_bind(&self, local: Option<SocketAddr>) -> Result<Arc<UdpSocket>> {
        let mut inner = self.inner.lock();
        if inner.state == SocketState::Closed {
            return Err(UdpError::InvalidState("socket is closed"));
        }
        if let Some(socket) = &inner.socket {
            return Ok(socket.clone());
        }
        let addr = local.unwrap_or_else(|| self.family.wildcard());
        let socket = Arc::new(net::bind(addr, self.config.reuse_address)?);
        inner.state = SocketState::Active;
        inner.socket = Some(socket.clone());
        Ok(socket)
    }

    async fn connect_once(&self, socket: &UdpSocket, remote: SocketAddr) -> Result<()> {
        let needs_connect = {
            let mut inner = self.inner.lock();
            match inner.connected {
                Some(existing) if existing == remote => false,
                Some(_) => {
                    return Err(UdpError::InvalidState(
                        "socket is already associated with a remote endpoint",
                    ));
                }
                None => {
                    inner.connected = Some(remote);
                    true
                }
            }
        };
        if needs_connect {
            if let Err(err) = socket.connect(remote).await {
                self.inner.lock().connected = None;
                return Err(UdpError::Io(err));
            }
        }
        Ok(())
    }

    fn bound_socket(&self) -> Result<(Arc<UdpSocket>, SocketAddr)> {
        let inner = self.inner.lock();
        let socket = inner
            .socket
            .as_ref()
            .ok_or(UdpError::InvalidState(
                "a local endpoint must be bound before changing multicast membership",
            ))?
            .clone();
        let local = socket.local_addr()?;
        Ok((socket, local))
    }
}

async fn write_datagram<W>(sink: &mut W, datagram: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(datagram).await?;
    sink.flush().await
}

impl Drop for UdpPipe {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for UdpPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpPipe")
            .field("family", &self.family)
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("peer_addr", &self.peer_addr())
            .finish()
    }
}
