//! Auction and bid sub-protocol: `auction.start`, `auction.subscribe` and
//! `bid.submit`.

use {
    crate::{
        hub::Hub,
        metrics,
        protocol::{Ack, AuctionAck, AuctionBids, AuctionStarted, ServerMessage, SubscribeAuction},
        registry::Registry,
        session::{ConnectionId, Session},
        validation::basic_validate_bid,
    },
    model::{
        auction::{AuctionId, AuctionRequest, AuctionRequestPayload, validate_for_mint},
        bid::{BidPayload, BidRejection, ValidatedBid},
        json_str,
        signature::{StrictVerificationError, verify_maker_bid_strict},
        time::now_in_epoch_seconds,
    },
    std::sync::Arc,
};

#[derive(Debug, thiserror::Error)]
enum SubmitError {
    #[error(transparent)]
    Rejected(#[from] BidRejection),
    #[error(transparent)]
    Signature(#[from] StrictVerificationError),
}

pub struct Auctions {
    registry: Arc<Registry>,
    strict_signatures: bool,
}

impl Auctions {
    /// With `strict_signatures` a bid is only accepted once its maker
    /// signature verified. Otherwise the signature is checked in the
    /// background and failures are only reported.
    pub fn new(registry: Arc<Registry>, strict_signatures: bool) -> Self {
        Self {
            registry,
            strict_signatures,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn start(&self, hub: &Hub, session: &mut Session, payload: Option<AuctionRequestPayload>) {
        let payload = payload.unwrap_or_default();
        let auction = match validate_for_mint(&payload) {
            Ok(auction) => auction,
            Err(err) => {
                tracing::debug!(connection = %session.id, %err, "rejected auction");
                hub.send(
                    session.id,
                    &ServerMessage::AuctionAck(AuctionAck {
                        auction_id: None,
                        error: Some(err.to_string()),
                    }),
                );
                return;
            }
        };

        let auction_id = self.registry.upsert(auction);
        metrics::get().auctions_started.inc();
        hub.subscribe_auction(session, auction_id);
        hub.send(
            session.id,
            &ServerMessage::AuctionAck(AuctionAck {
                auction_id: Some(auction_id),
                error: None,
            }),
        );
        let reached = hub.broadcast_all(&ServerMessage::AuctionStarted(AuctionStarted {
            auction: payload,
            auction_id,
        }));
        tracing::debug!(connection = %session.id, %auction_id, reached, "auction started");
        self.replay_bids(hub, session.id, auction_id);
    }

    pub fn subscribe(&self, hub: &Hub, session: &mut Session, payload: Option<SubscribeAuction>) {
        let requested = payload.map(|payload| payload.auction_id).unwrap_or_default();
        if requested.is_empty() {
            tracing::warn!(connection = %session.id, "auction.subscribe without auctionId");
            return;
        }
        let Ok(auction_id) = requested.parse::<AuctionId>() else {
            tracing::warn!(
                connection = %session.id,
                %requested,
                "auction.subscribe with malformed auctionId"
            );
            return;
        };
        hub.subscribe_auction(session, auction_id);
        self.replay_bids(hub, session.id, auction_id);
    }

    pub async fn submit_bid(&self, hub: &Hub, session: &Session, payload: Option<BidPayload>) {
        match self.admit(payload).await {
            Ok((auction_id, bids)) => {
                metrics::get().bids.with_label_values(&["accepted"]).inc();
                hub.send(session.id, &ServerMessage::BidAck(Ack::default()));
                let reached = hub.broadcast_auction(
                    &auction_id,
                    &ServerMessage::AuctionBids(AuctionBids { auction_id, bids }),
                );
                tracing::debug!(connection = %session.id, %auction_id, reached, "bid accepted");
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::debug!(connection = %session.id, %reason, "rejected bid");
                metrics::get().bids.with_label_values(&[reason.as_str()]).inc();
                hub.send(
                    session.id,
                    &ServerMessage::BidAck(Ack {
                        error: Some(reason),
                    }),
                );
            }
        }
    }

    /// Runs every admission check and stores the bid. Returns all bids of the
    /// auction on success.
    async fn admit(
        &self,
        payload: Option<BidPayload>,
    ) -> Result<(AuctionId, Vec<ValidatedBid>), SubmitError> {
        let payload = payload.ok_or(BidRejection::MissingPayload)?;
        let auction = json_str(payload.auction_id.as_ref())
            .and_then(|auction_id| auction_id.parse::<AuctionId>().ok())
            .and_then(|auction_id| self.registry.get(&auction_id))
            .ok_or(BidRejection::AuctionNotFound)?;

        let stored = AuctionRequestPayload::from(&auction);
        let bid = basic_validate_bid(Some(&stored), Some(&payload), now_in_epoch_seconds())?;

        if self.strict_signatures {
            verify_signature(auction, bid.clone()).await?;
        } else {
            // The outcome is only reported, it never affects admission.
            drop(tokio::spawn(verify_signature(auction, bid.clone())));
        }

        let auction_id = bid.auction_id;
        let bids = self.registry.add_bid(bid)?;
        Ok((auction_id, bids))
    }

    fn replay_bids(&self, hub: &Hub, connection: ConnectionId, auction_id: AuctionId) {
        let bids = self.registry.bids(&auction_id);
        if bids.is_empty() {
            return;
        }
        hub.send(
            connection,
            &ServerMessage::AuctionBids(AuctionBids { auction_id, bids }),
        );
    }
}

/// Recovers the maker signature off the async workers and reports failures.
async fn verify_signature(
    auction: AuctionRequest,
    bid: ValidatedBid,
) -> Result<(), StrictVerificationError> {
    let auction_id = bid.auction_id;
    let maker = bid.maker;
    let result = tokio::task::spawn_blocking(move || verify_maker_bid_strict(&auction, &bid))
        .await
        .unwrap_or_else(|err| {
            tracing::error!(?err, "signature verification task failed");
            Err(StrictVerificationError::VerificationFailed)
        });
    if let Err(err) = &result {
        tracing::warn!(%auction_id, %maker, %err, "maker signature did not verify");
        metrics::get()
            .strict_verification_failures
            .with_label_values(&[err.to_string().as_str()])
            .inc();
    }
    result
}
