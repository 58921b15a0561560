//! Configuration types for the event-driven socket.

use bytes::Bytes;
use std::net::SocketAddr;

/// Configuration for an [`EventSocket`](super::EventSocket).
#[derive(Clone, Debug)]
pub struct EventConfig {
    /// Receive staging buffer size in bytes. Datagrams larger than this are
    /// truncated by the OS, so the default covers the largest possible UDP
    /// payload.
    pub recv_buffer_size: usize,
    /// Capacity of the broadcast channel carrying received datagrams. A
    /// subscriber that falls further behind than this loses the oldest
    /// datagrams.
    pub channel_capacity: usize,
    /// Enable broadcast mode on the socket.
    pub broadcast: bool,
    /// Local endpoint to bind when the socket is created implicitly by a
    /// first `send`, or by `listen(None)`. Lets a pure sender pick its
    /// source address without starting a receive loop. `None` binds a
    /// family wildcard with an OS-assigned port.
    pub local_address: Option<SocketAddr>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 64 * 1024,
            channel_capacity: 64,
            broadcast: false,
            local_address: None,
        }
    }
}

impl EventConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the receive staging buffer size.
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Set the broadcast channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Enable or disable broadcast mode.
    pub fn broadcast(mut self, enabled: bool) -> Self {
        self.broadcast = enabled;
        self
    }

    /// Set the local endpoint used for implicit binds.
    pub fn local_address(mut self, addr: SocketAddr) -> Self {
        self.local_address = Some(addr);
        self
    }
}

/// A received datagram with its source address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Datagram {
    /// The datagram payload. Cheap to clone, so fanning one datagram out to
    /// every subscriber does not copy the bytes.
    pub payload: Bytes,
    /// The source address of the datagram.
    pub source: SocketAddr,
}

impl Datagram {
    /// Create a new datagram.
    pub fn new(payload: Bytes, source: SocketAddr) -> Self {
        Self { payload, source }
    }
}
