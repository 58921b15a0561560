//! Event-driven UDP socket.
//!
//! An [`EventSocket`] owns one UDP socket and a background receive loop that
//! publishes every received datagram on a broadcast channel. Subscribers
//! consume at their own pace; a slow subscriber lags (and may miss old
//! datagrams) instead of throttling the receive loop.
//!
//! # Example
//!
//! ```ignore
//! use udp_conduit::{EventConfig, EventSocket};
//!
//! let socket = EventSocket::new();
//! let mut events = socket.subscribe()?;
//!
//! // Bind to an ephemeral port and start receiving.
//! let addr = socket.listen(None)?;
//! println!("listening on {addr}");
//!
//! tokio::spawn(async move {
//!     while let Ok(datagram) = events.recv().await {
//!         println!("{} bytes from {}", datagram.payload.len(), datagram.source);
//!     }
//! });
//!
//! // A pure sender never needs to listen; the socket is created on first send.
//! let sender = EventSocket::new();
//! sender.send("127.0.0.1:5000".parse()?, b"hello").await?;
//! ```

mod config;
mod socket;

pub use config::{Datagram, EventConfig};
pub use socket::EventSocket;
