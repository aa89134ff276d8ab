//! In-memory store of live auctions and the bids they received.

use {
    model::{
        auction::{AuctionId, AuctionRequest},
        bid::{BidRejection, ValidatedBid},
    },
    std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    },
    tokio::{task::JoinHandle, time::Instant},
};

pub const MIN_AUCTION_TTL: Duration = Duration::from_secs(5);
pub const MAX_AUCTION_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_AUCTION_TTL: Duration = Duration::from_secs(60);

struct AuctionRecord {
    auction: AuctionRequest,
    bids: Vec<ValidatedBid>,
    deadline: Instant,
}

impl AuctionRecord {
    fn is_live(&self, now: Instant) -> bool {
        now <= self.deadline
    }
}

pub struct Registry {
    auctions: Mutex<HashMap<AuctionId, AuctionRecord>>,
    ttl: Duration,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_AUCTION_TTL)
    }
}

impl Registry {
    /// Creates an empty registry. `ttl` is clamped to
    /// [`MIN_AUCTION_TTL`]..=[`MAX_AUCTION_TTL`].
    pub fn new(ttl: Duration) -> Self {
        Self {
            auctions: Default::default(),
            ttl: ttl.clamp(MIN_AUCTION_TTL, MAX_AUCTION_TTL),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores the auction and returns its deterministic id. Starting an
    /// auction that is still live keeps its bids and never shortens its
    /// deadline.
    pub fn upsert(&self, auction: AuctionRequest) -> AuctionId {
        let id = auction.id();
        let now = Instant::now();
        let deadline = now + self.ttl;

        let mut auctions = self.auctions.lock().unwrap();
        match auctions.get_mut(&id) {
            Some(record) if record.is_live(now) => {
                record.deadline = record.deadline.max(deadline);
            }
            _ => {
                auctions.insert(
                    id,
                    AuctionRecord {
                        auction,
                        bids: Vec::new(),
                        deadline,
                    },
                );
            }
        }
        id
    }

    /// Returns the auction if it is still live. Expired auctions are removed.
    pub fn get(&self, id: &AuctionId) -> Option<AuctionRequest> {
        let mut auctions = self.auctions.lock().unwrap();
        live(&mut auctions, id).map(|record| record.auction.clone())
    }

    /// Appends a bid to its auction and returns all bids the auction received
    /// so far.
    pub fn add_bid(&self, bid: ValidatedBid) -> Result<Vec<ValidatedBid>, BidRejection> {
        let mut auctions = self.auctions.lock().unwrap();
        let record = live(&mut auctions, &bid.auction_id).ok_or(BidRejection::AuctionNotFound)?;
        record.bids.push(bid);
        Ok(record.bids.clone())
    }

    /// Bids in the order they were accepted. Empty for unknown or expired
    /// auctions.
    pub fn bids(&self, id: &AuctionId) -> Vec<ValidatedBid> {
        let mut auctions = self.auctions.lock().unwrap();
        live(&mut auctions, id)
            .map(|record| record.bids.clone())
            .unwrap_or_default()
    }

    /// Removes all expired auctions and returns how many there were.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut auctions = self.auctions.lock().unwrap();
        let before = auctions.len();
        auctions.retain(|_, record| record.is_live(now));
        before - auctions.len()
    }

    pub fn len(&self) -> usize {
        self.auctions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically sweeps expired auctions until the returned handle is
    /// dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> Sweeper {
        let registry = Arc::clone(self);
        Sweeper(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = registry.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "swept expired auctions");
                }
                crate::metrics::get().live_auctions.set(
                    registry
                        .len()
                        .try_into()
                        .unwrap_or(i64::MAX),
                );
            }
        }))
    }
}

fn live<'a>(
    auctions: &'a mut HashMap<AuctionId, AuctionRecord>,
    id: &AuctionId,
) -> Option<&'a mut AuctionRecord> {
    let now = Instant::now();
    if auctions.get(id).is_some_and(|record| !record.is_live(now)) {
        auctions.remove(id);
        return None;
    }
    auctions.get_mut(id)
}

/// Owns the background sweep task and stops it when dropped.
pub struct Sweeper(JoinHandle<()>);

impl Sweeper {
    pub fn is_running(&self) -> bool {
        !self.0.is_finished()
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        alloy::primitives::{Address, U256, address},
        model::auction::{AuctionRequestPayload, validate_for_mint},
        serde_json::json,
    };

    fn auction() -> AuctionRequest {
        let payload: AuctionRequestPayload = serde_json::from_value(json!({
            "wager": "1000",
            "predictedOutcomes": ["0xab"],
            "taker": "0x1111111111111111111111111111111111111111",
            "takerNonce": 1,
            "chainId": 42161,
            "marketContract": "0x2222222222222222222222222222222222222222",
            "resolver": "0x3333333333333333333333333333333333333333",
        }))
        .unwrap();
        validate_for_mint(&payload).unwrap()
    }

    fn bid(auction_id: AuctionId, maker: Address) -> ValidatedBid {
        ValidatedBid {
            auction_id,
            maker,
            maker_wager: U256::from(500),
            maker_deadline: u64::MAX,
            maker_signature: vec![0x11; 65].into(),
            maker_nonce: Some(json!(1)),
        }
    }

    const MAKER: Address = address!("4444444444444444444444444444444444444444");

    #[tokio::test(start_paused = true)]
    async fn upsert_is_idempotent_and_keeps_bids() {
        let registry = Registry::default();
        let id = registry.upsert(auction());
        registry.add_bid(bid(id, MAKER)).unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(registry.upsert(auction()), id);
        assert_eq!(registry.bids(&id).len(), 1);
        assert_eq!(registry.len(), 1);

        // The second start extended the deadline to 30s + 60s.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(registry.get(&id).is_some());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_authoritative() {
        let registry = Registry::default();
        let id = registry.upsert(auction());
        registry.add_bid(bid(id, MAKER)).unwrap();

        // Still live at the deadline itself.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(registry.bids(&id).len(), 1);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(registry.bids(&id).is_empty());
        assert!(registry.get(&id).is_none());
        assert_eq!(
            registry.add_bid(bid(id, MAKER)),
            Err(BidRejection::AuctionNotFound)
        );
        assert!(registry.is_empty());

        // Restarting an expired auction starts over without old bids.
        assert_eq!(registry.upsert(auction()), id);
        assert!(registry.bids(&id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_is_clamped() {
        for (requested, expected) in [
            (Duration::ZERO, MIN_AUCTION_TTL),
            (Duration::from_secs(1), MIN_AUCTION_TTL),
            (Duration::from_secs(42), Duration::from_secs(42)),
            (Duration::from_secs(3600), MAX_AUCTION_TTL),
        ] {
            let registry = Registry::new(requested);
            assert_eq!(registry.ttl(), expected);

            let id = registry.upsert(auction());
            tokio::time::advance(expected).await;
            assert!(registry.get(&id).is_some());
            tokio::time::advance(Duration::from_millis(1)).await;
            assert!(registry.get(&id).is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bids_are_appended_in_order() {
        let registry = Registry::default();
        let id = registry.upsert(auction());
        let other = address!("5555555555555555555555555555555555555555");

        assert_eq!(registry.add_bid(bid(id, MAKER)).unwrap().len(), 1);
        let bids = registry.add_bid(bid(id, other)).unwrap();
        assert_eq!(
            bids.iter().map(|bid| bid.maker).collect::<Vec<_>>(),
            [MAKER, other]
        );
        assert_eq!(registry.bids(&id), bids);
        assert!(registry.bids(&AuctionId::default()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_expired_auctions_until_dropped() {
        let registry = Arc::new(Registry::new(Duration::from_secs(5)));
        let sweeper = registry.spawn_sweeper(Duration::from_secs(30));
        assert!(sweeper.is_running());

        registry.upsert(auction());
        assert_eq!(registry.len(), 1);
        // Let the immediate first tick pass.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(registry.len(), 0);

        drop(sweeper);
        registry.upsert(auction());
        tokio::time::advance(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        // Nobody looked at the auction since it expired.
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.sweep(), 1);
    }
}
