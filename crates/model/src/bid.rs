//! Maker bids on an auction.

use {
    crate::{auction::AuctionId, json_str, parse_address, parse_hex_bytes, u256_decimal},
    alloy::primitives::{Address, Bytes, U256},
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Shortest signature that is plausibly an ECDSA signature.
pub const MIN_SIGNATURE_LEN: usize = 65;

/// A bid exactly as received from a maker. Like
/// [`crate::auction::AuctionRequestPayload`] the fields are raw JSON.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maker: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maker_wager: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maker_deadline: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maker_signature: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maker_nonce: Option<Value>,
}

/// A bid that passed the structural and temporal checks of
/// [`verify_maker_bid`]. Serializes to the same shape as [`BidPayload`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedBid {
    pub auction_id: AuctionId,
    pub maker: Address,
    #[serde(with = "u256_decimal")]
    pub maker_wager: U256,
    pub maker_deadline: u64,
    pub maker_signature: Bytes,
    /// Informational only. Echoed exactly as the maker sent it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maker_nonce: Option<Value>,
}

/// Reason a bid was not admitted. The `Display` output is part of the wire
/// protocol.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum BidRejection {
    #[error("invalid_payload")]
    MissingPayload,
    #[error("invalid_auction")]
    InvalidAuction,
    #[error("invalid_auction_id")]
    AuctionId,
    #[error("invalid_maker")]
    Maker,
    #[error("invalid_wager_values")]
    WagerValues,
    #[error("invalid_maker_deadline")]
    Deadline,
    #[error("quote_expired")]
    QuoteExpired,
    #[error("invalid_maker_bid_signature_format")]
    SignatureFormat,
    #[error("auction_not_found_or_expired")]
    AuctionNotFound,
}

/// Cheap structural and temporal gate for bids. Does not verify the
/// signature cryptographically, see [`crate::signature::verify_maker_bid_strict`].
///
/// `now` is the current unix time in seconds.
pub fn verify_maker_bid(bid: &BidPayload, now: u64) -> Result<ValidatedBid, BidRejection> {
    let auction_id = json_str(bid.auction_id.as_ref())
        .filter(|auction_id| !auction_id.is_empty())
        .and_then(|auction_id| auction_id.parse::<AuctionId>().ok())
        .ok_or(BidRejection::AuctionId)?;
    let maker = json_str(bid.maker.as_ref())
        .and_then(parse_address)
        .ok_or(BidRejection::Maker)?;
    let maker_wager = bid
        .maker_wager
        .as_ref()
        .and_then(u256_decimal::positive_from_json)
        .ok_or(BidRejection::WagerValues)?;
    let maker_deadline = maker_deadline(bid, now)?;
    let maker_signature = json_str(bid.maker_signature.as_ref())
        .and_then(parse_hex_bytes)
        .filter(|signature| signature.len() >= MIN_SIGNATURE_LEN)
        .ok_or(BidRejection::SignatureFormat)?;

    Ok(ValidatedBid {
        auction_id,
        maker,
        maker_wager,
        maker_deadline,
        maker_signature: maker_signature.into(),
        maker_nonce: bid.maker_nonce.clone(),
    })
}

fn maker_deadline(bid: &BidPayload, now: u64) -> Result<u64, BidRejection> {
    let deadline = bid
        .maker_deadline
        .as_ref()
        .and_then(Value::as_number)
        .ok_or(BidRejection::Deadline)?;
    let seconds = deadline
        .as_f64()
        .filter(|seconds| seconds.is_finite())
        .ok_or(BidRejection::Deadline)?;
    #[allow(clippy::cast_precision_loss)]
    if seconds <= now as f64 {
        return Err(BidRejection::QuoteExpired);
    }
    // Deadlines are signed as uint256 so fractional seconds can't be honored.
    deadline.as_u64().ok_or(BidRejection::Deadline)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        alloy::primitives::{address, b256},
        serde_json::json,
    };

    const NOW: u64 = 1_700_000_000;
    const AUCTION_ID: &str = "0xf18daa15fd3f6315d8bfbbb3cc388e3db819d463fab3a7e550f251b4619ea3d4";

    fn bid() -> BidPayload {
        serde_json::from_value(json!({
            "auctionId": AUCTION_ID,
            "maker": "0x4444444444444444444444444444444444444444",
            "makerWager": "500",
            "makerDeadline": NOW + 120,
            "makerSignature": format!("0x{}", "11".repeat(65)),
            "makerNonce": 1,
        }))
        .unwrap()
    }

    #[test]
    fn accepts_well_formed_bid() {
        let validated = verify_maker_bid(&bid(), NOW).unwrap();
        assert_eq!(
            validated,
            ValidatedBid {
                auction_id: AuctionId(b256!(
                    "f18daa15fd3f6315d8bfbbb3cc388e3db819d463fab3a7e550f251b4619ea3d4"
                )),
                maker: address!("4444444444444444444444444444444444444444"),
                maker_wager: U256::from(500),
                maker_deadline: NOW + 120,
                maker_signature: vec![0x11; 65].into(),
                maker_nonce: Some(json!(1)),
            }
        );
    }

    #[test]
    fn expired_deadline_is_rejected_even_if_otherwise_valid() {
        for deadline in [NOW, NOW - 1, 0] {
            let mut bid = bid();
            bid.maker_deadline = Some(json!(deadline));
            assert_eq!(verify_maker_bid(&bid, NOW), Err(BidRejection::QuoteExpired));
        }

        let mut bid = bid();
        bid.maker_deadline = Some(json!(-5));
        assert_eq!(verify_maker_bid(&bid, NOW), Err(BidRejection::QuoteExpired));
        assert_eq!(BidRejection::QuoteExpired.to_string(), "quote_expired");
    }

    #[test]
    fn rejects_malformed_fields() {
        let cases: &[(fn(&mut BidPayload), BidRejection)] = &[
            (|b| b.auction_id = None, BidRejection::AuctionId),
            (|b| b.auction_id = Some(json!("")), BidRejection::AuctionId),
            (|b| b.auction_id = Some(json!("0x1234")), BidRejection::AuctionId),
            (|b| b.maker = Some(json!("0x44")), BidRejection::Maker),
            (|b| b.maker = Some(json!(44)), BidRejection::Maker),
            (|b| b.maker_wager = None, BidRejection::WagerValues),
            (|b| b.maker_wager = Some(json!("0")), BidRejection::WagerValues),
            (|b| b.maker_wager = Some(json!("1e18")), BidRejection::WagerValues),
            (|b| b.maker_wager = Some(json!(-500)), BidRejection::WagerValues),
            (|b| b.maker_wager = Some(json!(0.5)), BidRejection::WagerValues),
            (|b| b.maker_deadline = None, BidRejection::Deadline),
            (
                |b| b.maker_deadline = Some(json!((NOW + 60) as f64 + 0.5)),
                BidRejection::Deadline,
            ),
            (
                |b| b.maker_deadline = Some(json!((NOW + 60).to_string())),
                BidRejection::Deadline,
            ),
            (
                |b| b.maker_signature = Some(json!("11".repeat(65))),
                BidRejection::SignatureFormat,
            ),
            (
                |b| b.maker_signature = Some(json!("0x1234")),
                BidRejection::SignatureFormat,
            ),
            (
                |b| b.maker_signature = Some(json!(format!("0x{}", "zz".repeat(65)))),
                BidRejection::SignatureFormat,
            ),
        ];
        for &(modify, expected) in cases {
            let mut bid = bid();
            modify(&mut bid);
            assert_eq!(verify_maker_bid(&bid, NOW), Err(expected));
        }
    }

    #[test]
    fn integer_maker_wagers_are_accepted() {
        let mut bid = bid();
        bid.maker_wager = Some(json!(500));
        let validated = verify_maker_bid(&bid, NOW).unwrap();
        assert_eq!(validated.maker_wager, U256::from(500));
        assert_eq!(serde_json::to_value(validated).unwrap()["makerWager"], "500");
    }

    #[test]
    fn maker_nonce_is_echoed_unchecked() {
        for nonce in [None, Some(json!(-1)), Some(json!(1.5)), Some(json!("seven"))] {
            let mut bid = bid();
            bid.maker_nonce = nonce.clone();
            let validated = verify_maker_bid(&bid, NOW).unwrap();
            assert_eq!(validated.maker_nonce, nonce);

            let echoed = serde_json::to_value(validated).unwrap();
            assert_eq!(echoed.get("makerNonce"), nonce.as_ref());
        }
    }

    #[test]
    fn serializes_like_the_payload() {
        let validated = verify_maker_bid(&bid(), NOW).unwrap();
        assert_eq!(
            serde_json::to_value(validated).unwrap(),
            json!({
                "auctionId": AUCTION_ID,
                "maker": "0x4444444444444444444444444444444444444444",
                "makerWager": "500",
                "makerDeadline": NOW + 120,
                "makerSignature": format!("0x{}", "11".repeat(65)),
                "makerNonce": 1,
            })
        );
    }
}
