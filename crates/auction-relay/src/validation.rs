use model::{
    auction::{AuctionRequestPayload, validate_for_mint},
    bid::{BidPayload, BidRejection, ValidatedBid, verify_maker_bid},
    json_str,
    u256_decimal,
};

/// Admission checks a bid has to pass before it is attached to `auction`.
/// Stops at the first failing check.
///
/// `now` is the current unix time in seconds.
pub fn basic_validate_bid(
    auction: Option<&AuctionRequestPayload>,
    bid: Option<&BidPayload>,
    now: u64,
) -> Result<ValidatedBid, BidRejection> {
    let (Some(auction), Some(bid)) = (auction, bid) else {
        return Err(BidRejection::MissingPayload);
    };
    validate_for_mint(auction).map_err(|_| BidRejection::InvalidAuction)?;
    if json_str(bid.maker.as_ref()).is_none_or(str::is_empty) {
        return Err(BidRejection::Maker);
    }
    if bid
        .maker_wager
        .as_ref()
        .and_then(u256_decimal::positive_from_json)
        .is_none()
    {
        return Err(BidRejection::WagerValues);
    }
    verify_maker_bid(bid, now)
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    const NOW: u64 = 1_700_000_000;

    fn auction() -> AuctionRequestPayload {
        serde_json::from_value(json!({
            "wager": "1000",
            "predictedOutcomes": ["0xab"],
            "taker": "0x1111111111111111111111111111111111111111",
            "takerNonce": 1,
            "chainId": 42161,
            "marketContract": "0x2222222222222222222222222222222222222222",
            "resolver": "0x3333333333333333333333333333333333333333",
        }))
        .unwrap()
    }

    fn bid() -> BidPayload {
        serde_json::from_value(json!({
            "auctionId": "0xf18daa15fd3f6315d8bfbbb3cc388e3db819d463fab3a7e550f251b4619ea3d4",
            "maker": "0x4444444444444444444444444444444444444444",
            "makerWager": "500",
            "makerDeadline": NOW + 120,
            "makerSignature": format!("0x{}", "11".repeat(65)),
            "makerNonce": 1,
        }))
        .unwrap()
    }

    #[test]
    fn accepts_valid_bid() {
        let validated = basic_validate_bid(Some(&auction()), Some(&bid()), NOW).unwrap();
        assert_eq!(validated.maker_deadline, NOW + 120);
    }

    #[test]
    fn checks_run_in_order() {
        assert_eq!(
            basic_validate_bid(None, Some(&bid()), NOW),
            Err(BidRejection::MissingPayload)
        );
        assert_eq!(
            basic_validate_bid(Some(&auction()), None, NOW),
            Err(BidRejection::MissingPayload)
        );

        // An invalid auction wins over every problem with the bid.
        let mut invalid_auction = auction();
        invalid_auction.wager = Some(json!("0"));
        let mut invalid_bid = bid();
        invalid_bid.maker = Some(json!(""));
        assert_eq!(
            basic_validate_bid(Some(&invalid_auction), Some(&invalid_bid), NOW),
            Err(BidRejection::InvalidAuction)
        );

        // An empty maker wins over a bad wager.
        invalid_bid.maker_wager = Some(json!("-1"));
        assert_eq!(
            basic_validate_bid(Some(&auction()), Some(&invalid_bid), NOW),
            Err(BidRejection::Maker)
        );

        // A bad wager wins over an expired deadline.
        let mut invalid_bid = bid();
        invalid_bid.maker_wager = None;
        invalid_bid.maker_deadline = Some(json!(NOW));
        assert_eq!(
            basic_validate_bid(Some(&auction()), Some(&invalid_bid), NOW),
            Err(BidRejection::WagerValues)
        );

        invalid_bid.maker_wager = Some(json!("0"));
        assert_eq!(
            basic_validate_bid(Some(&auction()), Some(&invalid_bid), NOW),
            Err(BidRejection::WagerValues)
        );

        invalid_bid.maker_wager = Some(json!(500));
        assert_eq!(
            basic_validate_bid(Some(&auction()), Some(&invalid_bid), NOW),
            Err(BidRejection::QuoteExpired)
        );
    }

    #[test]
    fn wrongly_typed_fields_get_their_own_reason() {
        let mut numeric_maker = bid();
        numeric_maker.maker = Some(json!(44));
        assert_eq!(
            basic_validate_bid(Some(&auction()), Some(&numeric_maker), NOW),
            Err(BidRejection::Maker)
        );

        let mut boolean_wager = bid();
        boolean_wager.maker_wager = Some(json!(true));
        assert_eq!(
            basic_validate_bid(Some(&auction()), Some(&boolean_wager), NOW),
            Err(BidRejection::WagerValues)
        );

        let mut string_chain = auction();
        string_chain.chain_id = Some(json!("42161"));
        assert_eq!(
            basic_validate_bid(Some(&string_chain), Some(&bid()), NOW),
            Err(BidRejection::InvalidAuction)
        );
    }
}
