//! Configuration for the stream-oriented socket.

/// Configuration for a [`UdpPipe`](super::UdpPipe).
#[derive(Clone, Debug)]
pub struct PipeConfig {
    /// Staging buffer size for both loops, in bytes. Received datagrams
    /// larger than this are truncated by the OS, so the default covers the
    /// largest possible UDP payload. Values below 512 are raised to 512.
    pub buffer_size: usize,
    /// Enable `SO_REUSEADDR` before binding the listen socket.
    pub reuse_address: bool,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
            reuse_address: true,
        }
    }
}

impl PipeConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the staging buffer size.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Enable or disable address reuse on bind.
    pub fn reuse_address(mut self, enabled: bool) -> Self {
        self.reuse_address = enabled;
        self
    }
}
