//! Per-connection state of the auction relay.

use {
    model::{auction::AuctionId, vault_quote::VaultKey},
    std::{collections::HashSet, fmt, time::Duration},
    tokio::time::Instant,
};

/// Process unique identifier of a websocket connection.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed window message counter.
#[derive(Debug)]
pub struct RateLimit {
    window: Duration,
    max_messages: u32,
    window_start: Instant,
    count: u32,
}

impl RateLimit {
    pub fn new(window: Duration, max_messages: u32) -> Self {
        Self {
            window,
            max_messages,
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Counts one message and returns whether it is within the limit.
    pub fn admit(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) > self.window {
            self.window_start = now;
            self.count = 0;
        }
        self.count = self.count.saturating_add(1);
        self.count <= self.max_messages
    }
}

/// Everything the relay knows about one connection. Dropping the session
/// together with [`crate::hub::Hub::disconnect`] releases every subscription
/// the connection made.
#[derive(Debug)]
pub struct Session {
    pub id: ConnectionId,
    pub rate_limit: RateLimit,
    pub auctions: HashSet<AuctionId>,
    pub vaults: HashSet<VaultKey>,
    pub observer: bool,
}

impl Session {
    pub fn new(id: ConnectionId, rate_limit: RateLimit) -> Self {
        Self {
            id,
            rate_limit,
            auctions: Default::default(),
            vaults: Default::default(),
            observer: false,
        }
    }
}
