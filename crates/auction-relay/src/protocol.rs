//! JSON messages exchanged on the `/auction` websocket. Every frame is an
//! object `{"type": ..., "payload": ...}`.

use {
    model::{
        auction::{AuctionId, AuctionRequestPayload},
        bid::{BidPayload, ValidatedBid},
        vault_quote::{PublishVaultQuotePayload, VaultQuote},
    },
    serde::{Deserialize, Serialize, de::DeserializeOwned},
};

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeAuction {
    #[serde(default)]
    pub auction_id: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VaultChannel {
    #[serde(default)]
    pub chain_id: Option<serde_json::Number>,
    #[serde(default)]
    pub vault_address: String,
}

/// Client to server messages. Payloads that are missing or have the wrong
/// shape decode to `None` so handlers can reply with a precise error.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    AuctionStart(Option<AuctionRequestPayload>),
    AuctionSubscribe(Option<SubscribeAuction>),
    BidSubmit(Option<BidPayload>),
    VaultQuoteObserve,
    VaultQuoteUnobserve,
    VaultQuoteSubscribe(Option<VaultChannel>),
    VaultQuoteUnsubscribe(Option<VaultChannel>),
    /// Sent as `vault_quote.publish` or `vault_quote.submit`.
    VaultQuotePublish(Option<PublishVaultQuotePayload>),
    Unknown(String),
}

impl ClientMessage {
    /// Decodes a text frame. Fails only if the frame is not a JSON object
    /// with a string `type`.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let Envelope { kind, payload } = serde_json::from_str(text)?;
        Ok(match kind.as_str() {
            "auction.start" => Self::AuctionStart(parse(payload)),
            "auction.subscribe" => Self::AuctionSubscribe(parse(payload)),
            "bid.submit" => Self::BidSubmit(parse(payload)),
            "vault_quote.observe" => Self::VaultQuoteObserve,
            "vault_quote.unobserve" => Self::VaultQuoteUnobserve,
            "vault_quote.subscribe" => Self::VaultQuoteSubscribe(parse(payload)),
            "vault_quote.unsubscribe" => Self::VaultQuoteUnsubscribe(parse(payload)),
            "vault_quote.publish" | "vault_quote.submit" => Self::VaultQuotePublish(parse(payload)),
            _ => Self::Unknown(kind),
        })
    }

    /// Label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuctionStart(_) => "auction.start",
            Self::AuctionSubscribe(_) => "auction.subscribe",
            Self::BidSubmit(_) => "bid.submit",
            Self::VaultQuoteObserve => "vault_quote.observe",
            Self::VaultQuoteUnobserve => "vault_quote.unobserve",
            Self::VaultQuoteSubscribe(_) => "vault_quote.subscribe",
            Self::VaultQuoteUnsubscribe(_) => "vault_quote.unsubscribe",
            Self::VaultQuotePublish(_) => "vault_quote.publish",
            Self::Unknown(_) => "unknown",
        }
    }
}

fn parse<T: DeserializeOwned>(payload: Option<serde_json::Value>) -> Option<T> {
    match payload? {
        serde_json::Value::Null => None,
        value => serde_json::from_value(value).ok(),
    }
}

/// Server to client messages.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "auction.ack")]
    AuctionAck(AuctionAck),
    #[serde(rename = "auction.started")]
    AuctionStarted(AuctionStarted),
    #[serde(rename = "bid.ack")]
    BidAck(Ack),
    #[serde(rename = "auction.bids")]
    AuctionBids(AuctionBids),
    #[serde(rename = "vault_quote.ack")]
    VaultQuoteAck(VaultQuoteAck),
    #[serde(rename = "vault_quote.update")]
    VaultQuoteUpdate(VaultQuote),
    #[serde(rename = "vault_quote.requested")]
    VaultQuoteRequested(VaultQuoteRequested),
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionAck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<AuctionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The request as the taker sent it plus the id the relay assigned.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionStarted {
    #[serde(flatten)]
    pub auction: AuctionRequestPayload,
    pub auction_id: AuctionId,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Ack {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionBids {
    pub auction_id: AuctionId,
    pub bids: Vec<ValidatedBid>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct VaultQuoteAck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultQuoteRequested {
    pub chain_id: u64,
    pub vault_address: String,
    pub channel: String,
}

impl ServerMessage {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
