//! Error types for UDP socket wrappers.

use std::net::IpAddr;

use thiserror::Error;

use crate::net::AddressFamily;

/// Errors surfaced by the socket wrappers.
///
/// Cancellation is never reported through this type: a cancelled loop ends
/// cleanly with a terminal status instead.
#[derive(Debug, Error)]
pub enum UdpError {
    /// The operation is not valid in the socket's current lifecycle state,
    /// e.g. multicast membership before a socket is bound, or listening on
    /// a closed instance.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A multicast operation was given an address outside the multicast
    /// range.
    #[error("{0} is not a multicast address")]
    NotMulticast(IpAddr),

    /// An address family mismatch detected before any OS call is made.
    #[error("address family mismatch: socket is {socket}, address is {addr}")]
    FamilyMismatch {
        /// Family of the socket.
        socket: AddressFamily,
        /// Family of the offending address.
        addr: AddressFamily,
    },

    /// An I/O error from binding, sending, or receiving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for UDP socket operations.
pub type Result<T> = std::result::Result<T, UdpError>;
