//! Subscription sets and fan-out of server messages to connections.

use {
    crate::{
        protocol::ServerMessage,
        session::{ConnectionId, Session},
    },
    axum::extract::ws::{Message, Utf8Bytes},
    model::{auction::AuctionId, vault_quote::VaultKey},
    std::{
        collections::{HashMap, HashSet},
        sync::{Arc, Mutex},
    },
    tokio::sync::{
        Notify,
        mpsc::{self, error::TrySendError},
    },
};

/// Frames queued for a connection's writer task.
pub type Outbox = mpsc::Sender<Message>;

/// Fires when the hub gives up on a connection that does not drain its
/// outbox.
pub struct Evicted(Arc<Notify>);

impl Evicted {
    pub async fn wait(&self) {
        self.0.notified().await
    }
}

struct Connection {
    outbox: Outbox,
    evicted: Arc<Notify>,
}

impl Connection {
    /// Queues a frame without waiting. Returns false if the connection can
    /// no longer be reached.
    fn push(&self, id: ConnectionId, text: &Utf8Bytes) -> bool {
        match self.outbox.try_send(Message::Text(text.clone())) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection = %id, "outbox full, evicting slow connection");
                self.evicted.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Connection>,
    auctions: HashMap<AuctionId, HashSet<ConnectionId>>,
    vaults: HashMap<VaultKey, HashSet<ConnectionId>>,
    observers: HashSet<ConnectionId>,
}

impl Inner {
    /// Delivers `text` to every connection in `targets`. Unreachable
    /// connections are removed from `targets` and from the hub.
    fn deliver(&mut self, targets: &mut HashSet<ConnectionId>, text: &Utf8Bytes) -> usize {
        let connections = &mut self.connections;
        let mut delivered = 0;
        targets.retain(|id| {
            let sent = connections
                .get(id)
                .is_some_and(|connection| connection.push(*id, text));
            if sent {
                delivered += 1;
            } else {
                tracing::debug!(connection = %id, "pruning unreachable subscriber");
                connections.remove(id);
            }
            sent
        });
        delivered
    }
}

#[derive(Default)]
pub struct Hub {
    inner: Mutex<Inner>,
}

impl Hub {
    /// Registers the outbox of a connection. The returned handle fires if
    /// the outbox fills up and the connection is dropped from the hub.
    pub fn connect(&self, id: ConnectionId, outbox: Outbox) -> Evicted {
        let evicted = Arc::new(Notify::new());
        let connection = Connection {
            outbox,
            evicted: evicted.clone(),
        };
        self.inner.lock().unwrap().connections.insert(id, connection);
        Evicted(evicted)
    }

    /// Removes the connection from every set the session joined.
    pub fn disconnect(&self, session: &Session) {
        let mut inner = self.inner.lock().unwrap();
        inner.connections.remove(&session.id);
        for auction in &session.auctions {
            if let Some(subscribers) = inner.auctions.get_mut(auction) {
                subscribers.remove(&session.id);
                if subscribers.is_empty() {
                    inner.auctions.remove(auction);
                }
            }
        }
        for vault in &session.vaults {
            if let Some(subscribers) = inner.vaults.get_mut(vault) {
                subscribers.remove(&session.id);
                if subscribers.is_empty() {
                    inner.vaults.remove(vault);
                }
            }
        }
        inner.observers.remove(&session.id);
    }

    pub fn connections(&self) -> usize {
        self.inner.lock().unwrap().connections.len()
    }

    pub fn subscribe_auction(&self, session: &mut Session, auction: AuctionId) {
        session.auctions.insert(auction);
        self.inner
            .lock()
            .unwrap()
            .auctions
            .entry(auction)
            .or_default()
            .insert(session.id);
    }

    pub fn auction_subscribers(&self, auction: &AuctionId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .auctions
            .get(auction)
            .map_or(0, HashSet::len)
    }

    pub fn subscribe_vault(&self, session: &mut Session, vault: VaultKey) {
        session.vaults.insert(vault);
        self.inner
            .lock()
            .unwrap()
            .vaults
            .entry(vault)
            .or_default()
            .insert(session.id);
    }

    pub fn unsubscribe_vault(&self, session: &mut Session, vault: &VaultKey) {
        session.vaults.remove(vault);
        let mut inner = self.inner.lock().unwrap();
        if let Some(subscribers) = inner.vaults.get_mut(vault) {
            subscribers.remove(&session.id);
            if subscribers.is_empty() {
                inner.vaults.remove(vault);
            }
        }
    }

    pub fn set_observer(&self, session: &mut Session, observer: bool) {
        session.observer = observer;
        let mut inner = self.inner.lock().unwrap();
        if observer {
            inner.observers.insert(session.id);
        } else {
            inner.observers.remove(&session.id);
        }
    }

    /// Sends a message to a single connection.
    pub fn send(&self, id: ConnectionId, message: &ServerMessage) {
        let Some(text) = encode(message) else { return };
        let mut inner = self.inner.lock().unwrap();
        let sent = inner
            .connections
            .get(&id)
            .is_some_and(|connection| connection.push(id, &text));
        if !sent {
            inner.connections.remove(&id);
        }
    }

    /// Sends a message to every open connection.
    pub fn broadcast_all(&self, message: &ServerMessage) -> usize {
        let Some(text) = encode(message) else { return 0 };
        let mut inner = self.inner.lock().unwrap();
        let mut targets = inner.connections.keys().copied().collect();
        inner.deliver(&mut targets, &text)
    }

    /// Sends a message to the subscribers of an auction.
    pub fn broadcast_auction(&self, auction: &AuctionId, message: &ServerMessage) -> usize {
        let Some(text) = encode(message) else { return 0 };
        let mut inner = self.inner.lock().unwrap();
        let Some(mut targets) = inner.auctions.remove(auction) else {
            return 0;
        };
        let delivered = inner.deliver(&mut targets, &text);
        if !targets.is_empty() {
            inner.auctions.insert(*auction, targets);
        }
        delivered
    }

    /// Sends a message to the subscribers of a vault channel and to all
    /// observers. Connections in both sets receive it once.
    pub fn broadcast_vault(&self, vault: &VaultKey, message: &ServerMessage) -> usize {
        let Some(text) = encode(message) else { return 0 };
        let mut inner = self.inner.lock().unwrap();
        let mut subscribers = inner.vaults.remove(vault).unwrap_or_default();
        let mut observers = std::mem::take(&mut inner.observers);
        let mut only_observers = observers.difference(&subscribers).copied().collect();

        let delivered = inner.deliver(&mut subscribers, &text)
            + inner.deliver(&mut only_observers, &text);
        observers.retain(|id| subscribers.contains(id) || only_observers.contains(id));

        inner.observers = observers;
        if !subscribers.is_empty() {
            inner.vaults.insert(*vault, subscribers);
        }
        delivered
    }

    /// Sends a message to all observers.
    pub fn broadcast_observers(&self, message: &ServerMessage) -> usize {
        let Some(text) = encode(message) else { return 0 };
        let mut inner = self.inner.lock().unwrap();
        let mut observers = std::mem::take(&mut inner.observers);
        let delivered = inner.deliver(&mut observers, &text);
        inner.observers = observers;
        delivered
    }
}

fn encode(message: &ServerMessage) -> Option<Utf8Bytes> {
    match message.encode() {
        Ok(text) => Some(text.into()),
        Err(err) => {
            tracing::error!(?err, "failed to encode server message");
            None
        }
    }
}
