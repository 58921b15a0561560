//! Stream-oriented UDP socket.
//!
//! A [`UdpPipe`] couples one UDP socket to byte-stream endpoints in both
//! directions. [`listen`](UdpPipe::listen) writes every received datagram
//! into an `AsyncWrite` sink and [`send`](UdpPipe::send) drains an
//! `AsyncRead` source, sending each contiguous read as one datagram. Pair
//! either side with [`tokio::io::simplex`] to get a bounded, flow-controlled
//! buffer between socket I/O and the application.
//!
//! Both loops may run concurrently on the same instance; they share one
//! socket and operate on disjoint directions.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio::io::AsyncReadExt;
//! use udp_conduit::{AddressFamily, UdpPipe};
//!
//! let pipe = Arc::new(UdpPipe::new(AddressFamily::V4));
//! let (mut reader, writer) = tokio::io::simplex(64 * 1024);
//!
//! let listener = {
//!     let pipe = pipe.clone();
//!     tokio::spawn(async move { pipe.listen(writer, "0.0.0.0:5000".parse()?).await })
//! };
//!
//! let mut buf = [0u8; 2048];
//! let n = reader.read(&mut buf).await?;
//! println!("got {n} bytes");
//!
//! pipe.close();
//! let end = listener.await??; // PipeEnd::Cancelled
//! ```

mod config;
mod socket;
mod status;

pub use config::PipeConfig;
pub use socket::UdpPipe;
pub use status::PipeEnd;
