//! Connection state machine (spec.md §3 "ConnectionState", §4.7).

/// Where the connection sits in the IMAP session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP/TLS established, greeting read, not yet authenticated.
    NotAuthenticated,
    /// Authenticated, no mailbox selected.
    Authenticated,
    /// A mailbox is open (`SELECT`/`EXAMINE` succeeded).
    Selected,
    /// `LOGOUT` sent/received, or the transport closed. Terminal.
    Logout,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_usable(self) -> bool {
        !matches!(self, Self::Logout)
    }
}
