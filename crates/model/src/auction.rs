//! Auction requests as submitted by takers.
//!
//! The wire representation ([`AuctionRequestPayload`]) is deliberately lenient
//! so that malformed requests can be rejected with a precise reason instead of
//! a generic decoding error. [`AuctionRequest`] is the validated form.

use {
    crate::{json_str, json_u64, parse_address, parse_hex_bytes, u256_decimal},
    alloy::{
        primitives::{Address, B256, Bytes, U256, keccak256},
        sol,
        sol_types::{SolType, sol_data},
    },
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
    std::{
        fmt::{self, Display},
        str::FromStr,
    },
};

type PredictionsSol = sol_data::Array<sol_data::Bytes>;

type AuctionIdSol = sol! {
    tuple(
        uint256, // chainId
        address, // marketContract
        uint256, // wager
        address, // taker
        uint256, // takerNonce
        bytes32, // predictionsHash
    )
};

/// An auction request exactly as received from a taker. Fields are kept as
/// raw JSON so that a field of the wrong type is reported by validation
/// instead of failing to decode the whole request.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionRequestPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wager: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_outcomes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taker: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taker_nonce: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_contract: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<Value>,
}

/// Reason an auction request can not be minted. The `Display` output is part
/// of the wire protocol.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum InvalidAuction {
    #[error("Invalid wager")]
    Wager,
    #[error("Invalid chainId")]
    ChainId,
    #[error("Invalid marketContract")]
    MarketContract,
    #[error("Invalid resolver")]
    Resolver,
    #[error("Invalid predictedOutcomes")]
    PredictedOutcomes,
    #[error("Invalid taker")]
    Taker,
    #[error("Invalid takerNonce")]
    TakerNonce,
}

/// A structurally valid auction request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuctionRequest {
    pub wager: U256,
    pub predicted_outcomes: Vec<Bytes>,
    pub taker: Address,
    pub taker_nonce: u64,
    pub chain_id: u64,
    pub market_contract: Address,
    pub resolver: Address,
}

/// Order independent view of an auction's predicted outcomes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Normalized {
    pub predicted_outcomes: Vec<Bytes>,
    pub predictions_hash: B256,
}

/// Sorts the outcomes by their raw bytes and hashes the ABI encoded
/// `bytes[]`. Any permutation of the same outcomes yields the same hash.
pub fn normalize_payload(predicted_outcomes: &[Bytes]) -> Normalized {
    let mut sorted = predicted_outcomes.to_vec();
    sorted.sort();
    let predictions_hash = keccak256(PredictionsSol::abi_encode(&sorted));
    Normalized {
        predicted_outcomes: sorted,
        predictions_hash,
    }
}

/// Structural gate an auction has to pass before it may exist. Returns the
/// first failing check.
pub fn validate_for_mint(
    payload: &AuctionRequestPayload,
) -> Result<AuctionRequest, InvalidAuction> {
    AuctionRequest::try_from(payload)
}

impl TryFrom<&AuctionRequestPayload> for AuctionRequest {
    type Error = InvalidAuction;

    fn try_from(payload: &AuctionRequestPayload) -> Result<Self, Self::Error> {
        let wager = payload
            .wager
            .as_ref()
            .and_then(u256_decimal::positive_from_json)
            .ok_or(InvalidAuction::Wager)?;
        let chain_id = json_u64(payload.chain_id.as_ref())
            .filter(|chain_id| *chain_id > 0)
            .ok_or(InvalidAuction::ChainId)?;
        let market_contract = json_str(payload.market_contract.as_ref())
            .and_then(parse_address)
            .ok_or(InvalidAuction::MarketContract)?;
        let resolver = json_str(payload.resolver.as_ref())
            .and_then(parse_address)
            .ok_or(InvalidAuction::Resolver)?;
        let predicted_outcomes = payload
            .predicted_outcomes
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|outcomes| {
                outcomes
                    .iter()
                    .map(|outcome| {
                        parse_hex_bytes(outcome.as_str()?)
                            .filter(|bytes| !bytes.is_empty())
                            .map(Bytes::from)
                    })
                    .collect::<Option<Vec<_>>>()
            })
            .filter(|outcomes| !outcomes.is_empty())
            .ok_or(InvalidAuction::PredictedOutcomes)?;
        let taker = json_str(payload.taker.as_ref())
            .and_then(parse_address)
            .ok_or(InvalidAuction::Taker)?;
        let taker_nonce =
            json_u64(payload.taker_nonce.as_ref()).ok_or(InvalidAuction::TakerNonce)?;

        Ok(Self {
            wager,
            predicted_outcomes,
            taker,
            taker_nonce,
            chain_id,
            market_contract,
            resolver,
        })
    }
}

impl From<&AuctionRequest> for AuctionRequestPayload {
    fn from(auction: &AuctionRequest) -> Self {
        let outcomes = auction
            .predicted_outcomes
            .iter()
            .map(const_hex::encode_prefixed)
            .collect::<Vec<_>>();
        Self {
            wager: Some(json!(auction.wager.to_string())),
            predicted_outcomes: Some(json!(outcomes)),
            taker: Some(json!(auction.taker.to_string())),
            taker_nonce: Some(json!(auction.taker_nonce)),
            chain_id: Some(json!(auction.chain_id)),
            market_contract: Some(json!(auction.market_contract.to_string())),
            resolver: Some(json!(auction.resolver.to_string())),
        }
    }
}

impl AuctionRequest {
    pub fn normalize(&self) -> Normalized {
        normalize_payload(&self.predicted_outcomes)
    }

    /// Deterministic identifier: identical requests always map to the same
    /// auction.
    pub fn id(&self) -> AuctionId {
        let Normalized {
            predictions_hash, ..
        } = self.normalize();
        AuctionId(keccak256(AuctionIdSol::abi_encode_sequence(&(
            U256::from(self.chain_id),
            self.market_contract,
            self.wager,
            self.taker,
            U256::from(self.taker_nonce),
            predictions_hash,
        ))))
    }
}

/// Identifier of an auction, `0x` followed by 64 lowercase hex digits on the
/// wire.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct AuctionId(pub B256);

impl Display for AuctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AuctionId {
    type Err = alloy::hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s).map(Self)
    }
}
