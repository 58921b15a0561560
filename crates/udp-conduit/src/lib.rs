//! Event-driven and stream-oriented UDP socket wrappers.
//!
//! This crate provides two independent ways to consume a UDP socket:
//!
//! - **[`EventSocket`]**: a background receive loop publishes every datagram
//!   on a broadcast channel; any number of subscriber tasks consume at their
//!   own pace without throttling the network-facing loop.
//! - **[`UdpPipe`]**: receive/send exposed as byte-stream endpoints. Inbound
//!   datagrams are written into any [`tokio::io::AsyncWrite`] sink (pair it
//!   with [`tokio::io::simplex`] for a bounded, flow-controlled buffer);
//!   outbound data is drained from an [`tokio::io::AsyncRead`] source, one
//!   datagram per contiguous read.
//!
//! Both wrappers cover binding (including OS-assigned ephemeral ports),
//! sending, IPv4/IPv6 multicast group membership, and prompt cancellation of
//! in-flight loops on close.
//!
//! # Event Example
//!
//! ```ignore
//! use udp_conduit::EventSocket;
//!
//! let socket = EventSocket::new();
//! let mut events = socket.subscribe()?;
//!
//! let addr = socket.listen(Some("0.0.0.0:5000".parse()?))?;
//! println!("listening on {addr}");
//!
//! while let Ok(datagram) = events.recv().await {
//!     println!("{} bytes from {}", datagram.payload.len(), datagram.source);
//! }
//! ```
//!
//! # Pipe Example
//!
//! ```ignore
//! use udp_conduit::{AddressFamily, UdpPipe};
//!
//! let pipe = UdpPipe::new(AddressFamily::V4);
//! let (mut reader, writer) = tokio::io::simplex(64 * 1024);
//!
//! tokio::spawn(async move {
//!     pipe.listen(writer, "0.0.0.0:5000".parse()?).await
//! });
//!
//! // Drain received datagrams as a byte stream.
//! let mut buf = [0u8; 2048];
//! let n = reader.read(&mut buf).await?;
//! ```

mod error;
mod net;
mod state;

pub mod event;
pub mod pipe;

pub use error::{Result, UdpError};
pub use net::AddressFamily;
pub use state::SocketState;

// Re-export commonly used types at the crate root
pub use event::{Datagram, EventConfig, EventSocket};
pub use pipe::{PipeConfig, PipeEnd, UdpPipe};
