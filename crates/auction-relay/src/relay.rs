//! Frame level state machine of the `/auction` websocket. Applies the
//! per-connection guards and dispatches decoded messages to the auction and
//! vault quote handlers.

use {
    crate::{
        handlers::{auction::Auctions, vault_quote::VaultQuotes},
        hub::{Evicted, Hub, Outbox},
        metrics,
        protocol::ClientMessage,
        session::{ConnectionId, RateLimit, Session},
    },
    axum::extract::ws::close_code,
    std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    },
};

#[derive(Clone, Debug)]
pub struct Config {
    pub rate_limit_window: Duration,
    pub rate_limit_max_messages: u32,
    pub max_message_size: usize,
    /// Frames queued for a connection before it is dropped as too slow.
    pub outbox_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rate_limit_window: Duration::from_secs(10),
            rate_limit_max_messages: 100,
            max_message_size: 64_000,
            outbox_capacity: 1024,
        }
    }
}

/// What the connection should do after a frame was handled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Close(CloseReason),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloseReason {
    RateLimited,
    MessageTooLarge,
}

impl CloseReason {
    pub fn code(self) -> u16 {
        match self {
            Self::RateLimited => close_code::POLICY,
            Self::MessageTooLarge => close_code::SIZE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::MessageTooLarge => "message_too_large",
        }
    }
}

pub struct Relay {
    config: Config,
    hub: Hub,
    auctions: Auctions,
    vault_quotes: VaultQuotes,
    next_connection: AtomicU64,
}

impl Relay {
    pub fn new(config: Config, auctions: Auctions, vault_quotes: VaultQuotes) -> Self {
        Self {
            config,
            hub: Hub::default(),
            auctions,
            vault_quotes,
            next_connection: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn auctions(&self) -> &Auctions {
        &self.auctions
    }

    /// Registers a new connection whose outgoing frames are queued on
    /// `outbox`. The connection must close once [`Evicted`] fires.
    pub fn connect(&self, outbox: Outbox) -> (Session, Evicted) {
        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let evicted = self.hub.connect(id, outbox);
        let session = Session::new(
            id,
            RateLimit::new(
                self.config.rate_limit_window,
                self.config.rate_limit_max_messages,
            ),
        );
        (session, evicted)
    }

    pub fn disconnect(&self, session: Session) {
        self.hub.disconnect(&session);
    }

    /// Handles one inbound text frame.
    pub async fn on_frame(&self, session: &mut Session, text: &str) -> Flow {
        if !session.rate_limit.admit() {
            tracing::info!(connection = %session.id, "rate limit exceeded");
            return Flow::Close(CloseReason::RateLimited);
        }
        if text.len() > self.config.max_message_size {
            tracing::info!(connection = %session.id, size = text.len(), "message too large");
            return Flow::Close(CloseReason::MessageTooLarge);
        }
        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(connection = %session.id, ?err, "ignoring malformed message");
                return Flow::Continue;
            }
        };
        metrics::get()
            .messages
            .with_label_values(&[message.kind()])
            .inc();
        self.dispatch(session, message).await;
        Flow::Continue
    }

    async fn dispatch(&self, session: &mut Session, message: ClientMessage) {
        let hub = &self.hub;
        match message {
            ClientMessage::AuctionStart(payload) => self.auctions.start(hub, session, payload),
            ClientMessage::AuctionSubscribe(payload) => {
                self.auctions.subscribe(hub, session, payload)
            }
            ClientMessage::BidSubmit(payload) => {
                self.auctions.submit_bid(hub, session, payload).await
            }
            ClientMessage::VaultQuoteObserve => self.vault_quotes.observe(hub, session),
            ClientMessage::VaultQuoteUnobserve => self.vault_quotes.unobserve(hub, session),
            ClientMessage::VaultQuoteSubscribe(channel) => {
                self.vault_quotes.subscribe(hub, session, channel)
            }
            ClientMessage::VaultQuoteUnsubscribe(channel) => {
                self.vault_quotes.unsubscribe(hub, session, channel)
            }
            ClientMessage::VaultQuotePublish(payload) => {
                self.vault_quotes.publish(hub, session, payload).await
            }
            ClientMessage::Unknown(kind) => {
                tracing::debug!(connection = %session.id, %kind, "ignoring unknown message type");
            }
        }
    }
}
