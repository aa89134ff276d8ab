//! Vault share quote sub-protocol. Publishers push signed quotes, clients
//! follow individual vaults or observe all of them.

use {
    crate::{
        hub::Hub,
        metrics,
        protocol::{ServerMessage, VaultChannel, VaultQuoteAck, VaultQuoteRequested},
        session::Session,
        vault_signers::VaultSignerFetching,
    },
    model::{
        time::now_in_epoch_millis,
        vault_quote::{PublishVaultQuotePayload, VaultKey, VaultQuote, VaultQuoteRejection},
    },
    std::{
        collections::{HashMap, hash_map::Entry},
        sync::{Arc, Mutex},
        time::Duration,
    },
};

pub struct VaultQuotes {
    signers: Arc<dyn VaultSignerFetching>,
    latest: Mutex<HashMap<VaultKey, VaultQuote>>,
    max_age: Duration,
}

impl VaultQuotes {
    pub fn new(signers: Arc<dyn VaultSignerFetching>, max_age: Duration) -> Self {
        Self {
            signers,
            latest: Default::default(),
            max_age,
        }
    }

    pub fn latest(&self, vault: &VaultKey) -> Option<VaultQuote> {
        self.latest.lock().unwrap().get(vault).cloned()
    }

    pub fn observe(&self, hub: &Hub, session: &mut Session) {
        hub.set_observer(session, true);
    }

    pub fn unobserve(&self, hub: &Hub, session: &mut Session) {
        hub.set_observer(session, false);
    }

    /// Joins a vault channel, replays its latest quote and lets observers
    /// know that somebody is interested in the vault.
    pub fn subscribe(&self, hub: &Hub, session: &mut Session, channel: Option<VaultChannel>) {
        let Some(vault) = parse_channel(channel) else {
            reject(hub, session, VaultQuoteRejection::InvalidPayload);
            return;
        };
        hub.subscribe_vault(session, vault);
        if let Some(quote) = self.latest(&vault) {
            hub.send(session.id, &ServerMessage::VaultQuoteUpdate(quote));
        }
        hub.broadcast_observers(&ServerMessage::VaultQuoteRequested(VaultQuoteRequested {
            chain_id: vault.chain_id,
            vault_address: vault.vault_address(),
            channel: vault.to_string(),
        }));
        tracing::debug!(connection = %session.id, %vault, "subscribed to vault quotes");
    }

    pub fn unsubscribe(&self, hub: &Hub, session: &mut Session, channel: Option<VaultChannel>) {
        let Some(vault) = parse_channel(channel) else {
            reject(hub, session, VaultQuoteRejection::InvalidPayload);
            return;
        };
        hub.unsubscribe_vault(session, &vault);
    }

    pub async fn publish(
        &self,
        hub: &Hub,
        session: &Session,
        payload: Option<PublishVaultQuotePayload>,
    ) {
        let quote = match self.accept(payload).await {
            Ok(quote) => quote,
            Err(err) => {
                tracing::debug!(connection = %session.id, %err, "rejected vault quote");
                reject(hub, session, err);
                return;
            }
        };

        metrics::get()
            .vault_quotes
            .with_label_values(&["accepted"])
            .inc();
        let vault = quote.key();
        let replaced = self.remember(&quote);
        hub.send(
            session.id,
            &ServerMessage::VaultQuoteAck(VaultQuoteAck {
                ok: Some(true),
                error: None,
            }),
        );
        if !replaced {
            tracing::debug!(%vault, timestamp = quote.timestamp, "kept newer vault quote");
            return;
        }
        let reached = hub.broadcast_vault(&vault, &ServerMessage::VaultQuoteUpdate(quote));
        tracing::debug!(%vault, reached, "vault quote published");
    }

    /// Stores the quote unless a newer one is already known for its vault.
    fn remember(&self, quote: &VaultQuote) -> bool {
        let mut latest = self.latest.lock().unwrap();
        match latest.entry(quote.key()) {
            Entry::Occupied(current) if current.get().timestamp > quote.timestamp => false,
            Entry::Occupied(mut current) => {
                current.insert(quote.clone());
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(quote.clone());
                true
            }
        }
    }

    async fn accept(
        &self,
        payload: Option<PublishVaultQuotePayload>,
    ) -> Result<VaultQuote, VaultQuoteRejection> {
        let payload = payload.ok_or(VaultQuoteRejection::InvalidPayload)?;
        let quote = VaultQuote::try_from(&payload)?;
        quote.ensure_fresh(now_in_epoch_millis(), self.max_age)?;
        quote.ensure_signed_by_publisher()?;

        let vault = quote.key();
        let signer = self.signers.signer(vault).await.map_err(|err| {
            tracing::warn!(%vault, ?err, "failed to fetch vault signer");
            VaultQuoteRejection::SignerUnavailable
        })?;
        if signer != quote.signed_by {
            return Err(VaultQuoteRejection::UnauthorizedSigner);
        }
        Ok(quote)
    }
}

fn parse_channel(channel: Option<VaultChannel>) -> Option<VaultKey> {
    let channel = channel?;
    VaultKey::parse(channel.chain_id.as_ref(), &channel.vault_address)
}

fn reject(hub: &Hub, session: &Session, err: VaultQuoteRejection) {
    let reason = err.to_string();
    metrics::get()
        .vault_quotes
        .with_label_values(&[reason.as_str()])
        .inc();
    hub.send(
        session.id,
        &ServerMessage::VaultQuoteAck(VaultQuoteAck {
            ok: None,
            error: Some(reason),
        }),
    );
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            handlers::testing::{connect, drain},
            vault_signers::{MockVaultSignerFetching, SignerFetchError},
        },
        alloy::{
            primitives::{Address, address},
            signers::{SignerSync, local::PrivateKeySigner},
        },
        serde_json::json,
    };

    const VAULT: Address = address!("5555555555555555555555555555555555555555");

    fn channel() -> Option<VaultChannel> {
        Some(VaultChannel {
            chain_id: Some(1.into()),
            vault_address: "0x5555555555555555555555555555555555555555".to_string(),
        })
    }

    fn signed_quote(publisher: &PrivateKeySigner, timestamp: u64) -> PublishVaultQuotePayload {
        let mut payload: PublishVaultQuotePayload = serde_json::from_value(json!({
            "chainId": 1,
            "vaultAddress": "0x5555555555555555555555555555555555555555",
            "vaultCollateralPerShare": "1.05",
            "timestamp": timestamp,
            "signedBy": publisher.address().to_string(),
            "signature": "0x",
        }))
        .unwrap();
        let message = VaultQuote::try_from(&payload).unwrap().canonical_message();
        let signature = publisher.sign_message_sync(message.as_bytes()).unwrap();
        payload.signature = const_hex::encode_prefixed(signature.as_bytes());
        payload
    }

    fn quotes_signed_by(manager: Address) -> VaultQuotes {
        let mut signers = MockVaultSignerFetching::new();
        signers.expect_signer().returning(move |_| Ok(manager));
        VaultQuotes::new(Arc::new(signers), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn published_quotes_reach_subscribers_and_observers() {
        let publisher = PrivateKeySigner::random();
        let quotes = quotes_signed_by(publisher.address());
        let hub = Hub::default();
        let (publisher_session, mut publisher_inbox) = connect(&hub, 1);
        let (mut subscriber, mut subscriber_inbox) = connect(&hub, 2);
        let (mut observer, mut observer_inbox) = connect(&hub, 3);
        let (_other, mut other_inbox) = connect(&hub, 4);

        quotes.observe(&hub, &mut observer);
        quotes.subscribe(&hub, &mut subscriber, channel());
        assert!(drain(&mut subscriber_inbox).is_empty());
        assert_eq!(
            drain(&mut observer_inbox),
            [json!({
                "type": "vault_quote.requested",
                "payload": {
                    "chainId": 1,
                    "vaultAddress": "0x5555555555555555555555555555555555555555",
                    "channel": "1:0x5555555555555555555555555555555555555555",
                },
            })]
        );

        let timestamp = now_in_epoch_millis();
        quotes
            .publish(&hub, &publisher_session, Some(signed_quote(&publisher, timestamp)))
            .await;

        assert_eq!(
            drain(&mut publisher_inbox),
            [json!({ "type": "vault_quote.ack", "payload": { "ok": true } })]
        );
        for inbox in [&mut subscriber_inbox, &mut observer_inbox] {
            let messages = drain(inbox);
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0]["type"], "vault_quote.update");
            assert_eq!(messages[0]["payload"]["vaultCollateralPerShare"], "1.05");
            assert_eq!(messages[0]["payload"]["timestamp"], timestamp);
        }
        assert!(drain(&mut other_inbox).is_empty());
        assert!(quotes.latest(&VaultKey { chain_id: 1, vault: VAULT }).is_some());
    }

    #[tokio::test]
    async fn subscribers_get_the_latest_quote() {
        let publisher = PrivateKeySigner::random();
        let quotes = quotes_signed_by(publisher.address());
        let hub = Hub::default();
        let (publisher_session, _publisher_inbox) = connect(&hub, 1);
        let (mut late, mut late_inbox) = connect(&hub, 2);

        let first = signed_quote(&publisher, now_in_epoch_millis());
        quotes.publish(&hub, &publisher_session, Some(first)).await;
        quotes.subscribe(&hub, &mut late, channel());
        let messages = drain(&mut late_inbox);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["type"], "vault_quote.update");

        quotes.unsubscribe(&hub, &mut late, channel());
        let second = signed_quote(&publisher, now_in_epoch_millis());
        quotes.publish(&hub, &publisher_session, Some(second)).await;
        assert!(drain(&mut late_inbox).is_empty());
        assert!(late.vaults.is_empty());
    }

    #[tokio::test]
    async fn older_quotes_do_not_replace_newer_ones() {
        let publisher = PrivateKeySigner::random();
        let quotes = quotes_signed_by(publisher.address());
        let hub = Hub::default();
        let (publisher_session, mut publisher_inbox) = connect(&hub, 1);
        let (mut subscriber, mut subscriber_inbox) = connect(&hub, 2);
        quotes.subscribe(&hub, &mut subscriber, channel());
        let key = VaultKey { chain_id: 1, vault: VAULT };

        let now = now_in_epoch_millis();
        let newer = signed_quote(&publisher, now);
        let older = signed_quote(&publisher, now - 10_000);
        quotes.publish(&hub, &publisher_session, Some(newer)).await;
        assert_eq!(drain(&mut subscriber_inbox).len(), 1);

        quotes.publish(&hub, &publisher_session, Some(older)).await;
        assert_eq!(
            drain(&mut publisher_inbox),
            [
                json!({ "type": "vault_quote.ack", "payload": { "ok": true } }),
                json!({ "type": "vault_quote.ack", "payload": { "ok": true } }),
            ]
        );
        assert!(drain(&mut subscriber_inbox).is_empty());
        assert_eq!(quotes.latest(&key).unwrap().timestamp, now);

        let same_instant = signed_quote(&publisher, now);
        quotes.publish(&hub, &publisher_session, Some(same_instant)).await;
        assert_eq!(drain(&mut subscriber_inbox).len(), 1);
        assert_eq!(quotes.latest(&key).unwrap().timestamp, now);
    }

    #[tokio::test]
    async fn rejects_bad_quotes() {
        let publisher = PrivateKeySigner::random();
        let impostor = PrivateKeySigner::random();
        let now = now_in_epoch_millis();

        let mut tampered = signed_quote(&publisher, now);
        tampered.vault_collateral_per_share = "2".to_string();
        let mut garbage = signed_quote(&publisher, now);
        garbage.vault_collateral_per_share = "1,05".to_string();

        let quotes = quotes_signed_by(publisher.address());
        let hub = Hub::default();
        let (mut session, mut inbox) = connect(&hub, 1);
        quotes.subscribe(&hub, &mut session, channel());
        drain(&mut inbox);

        for (payload, reason) in [
            (None, "invalid_payload"),
            (Some(garbage), "invalid_payload"),
            (Some(signed_quote(&publisher, now - 301_000)), "stale_timestamp"),
            (Some(signed_quote(&publisher, now + 301_000)), "stale_timestamp"),
            (Some(tampered), "invalid_signature"),
            (Some(signed_quote(&impostor, now)), "unauthorized_signer"),
        ] {
            quotes.publish(&hub, &session, payload).await;
            assert_eq!(
                drain(&mut inbox),
                [json!({ "type": "vault_quote.ack", "payload": { "error": reason } })]
            );
        }
        assert!(quotes.latest(&VaultKey { chain_id: 1, vault: VAULT }).is_none());
    }

    #[tokio::test]
    async fn signer_lookup_failures_are_reported() {
        let mut signers = MockVaultSignerFetching::new();
        signers
            .expect_signer()
            .returning(|vault| Err(SignerFetchError::UnsupportedChain(vault.chain_id)));
        let quotes = VaultQuotes::new(Arc::new(signers), Duration::from_secs(300));
        let hub = Hub::default();
        let (session, mut inbox) = connect(&hub, 1);

        let publisher = PrivateKeySigner::random();
        quotes
            .publish(&hub, &session, Some(signed_quote(&publisher, now_in_epoch_millis())))
            .await;
        assert_eq!(
            drain(&mut inbox),
            [json!({ "type": "vault_quote.ack", "payload": { "error": "signer_unavailable" } })]
        );
    }

    #[tokio::test]
    async fn invalid_channels_are_rejected() {
        let quotes = quotes_signed_by(Address::ZERO);
        let hub = Hub::default();
        let (mut session, mut inbox) = connect(&hub, 1);

        quotes.subscribe(&hub, &mut session, None);
        quotes.subscribe(
            &hub,
            &mut session,
            Some(VaultChannel {
                chain_id: None,
                vault_address: "0x5555555555555555555555555555555555555555".to_string(),
            }),
        );
        quotes.unsubscribe(&hub, &mut session, Some(VaultChannel::default()));
        let messages = drain(&mut inbox);
        assert_eq!(messages.len(), 3);
        assert!(
            messages
                .iter()
                .all(|message| message["payload"]["error"] == "invalid_payload")
        );
        assert!(session.vaults.is_empty());
    }
}
