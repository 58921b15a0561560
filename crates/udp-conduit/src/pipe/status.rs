//! Terminal statuses for the pipe loops.

/// Why a [`UdpPipe`](super::UdpPipe) loop ended.
///
/// Returned by [`listen`](super::UdpPipe::listen) and
/// [`send`](super::UdpPipe::send) on every clean exit so callers can tell
/// the termination paths apart; failures are reported separately through
/// the `Result`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipeEnd {
    /// The instance was closed or dropped while the loop was running.
    Cancelled,
    /// A zero-length datagram signalled peer shutdown (listen loop).
    PeerClosed,
    /// The downstream sink stopped accepting data (listen loop).
    DownstreamClosed,
    /// The upstream source reported end of data (send loop).
    SourceComplete,
}

impl std::fmt::Display for PipeEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipeEnd::Cancelled => write!(f, "Cancelled"),
            PipeEnd::PeerClosed => write!(f, "PeerClosed"),
            PipeEnd::DownstreamClosed => write!(f, "DownstreamClosed"),
            PipeEnd::SourceComplete => write!(f, "SourceComplete"),
        }
    }
}
