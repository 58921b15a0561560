//! Lifecycle state shared by both socket wrappers.

/// Lifecycle state of a socket wrapper.
///
/// The only transitions are `Unbound -> Active` (first bind or implicit
/// connect) and `Active`/`Unbound` -> `Closed` (close or drop). There is no
/// way back to `Unbound`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SocketState {
    /// No OS socket exists yet.
    #[default]
    Unbound,
    /// An OS socket is bound and loops may be running.
    Active,
    /// The instance was closed; all operations fail from here on.
    Closed,
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketState::Unbound => write!(f, "Unbound"),
            SocketState::Active => write!(f, "Active"),
            SocketState::Closed => write!(f, "Closed"),
        }
    }
}
