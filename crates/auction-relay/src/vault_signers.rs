//! Lookup of the address that is allowed to publish quotes for a vault.

use {
    crate::arguments::NodeUrl,
    alloy::{
        primitives::Address,
        providers::{DynProvider, Provider, ProviderBuilder},
    },
    model::vault_quote::VaultKey,
    moka::sync::Cache,
    std::{collections::HashMap, sync::Arc, time::Duration},
};

alloy::sol! {
    #[sol(rpc)]
    interface IVault {
        function manager() external view returns (address);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignerFetchError {
    #[error("no node configured for chain {0}")]
    UnsupportedChain(u64),
    #[error(transparent)]
    Call(#[from] alloy::contract::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VaultSignerFetching: Send + Sync + 'static {
    /// Returns the address authorized to sign quotes for the vault.
    async fn signer(&self, vault: VaultKey) -> Result<Address, SignerFetchError>;
}

/// Reads the vault's `manager()` from the chain it lives on.
pub struct Onchain {
    providers: HashMap<u64, DynProvider>,
}

impl Onchain {
    pub fn new(nodes: &[NodeUrl]) -> Self {
        let providers = nodes
            .iter()
            .map(|node| {
                let provider = ProviderBuilder::new()
                    .connect_http(node.url.clone())
                    .erased();
                (node.chain_id, provider)
            })
            .collect();
        Self { providers }
    }

    pub fn chains(&self) -> impl Iterator<Item = u64> + '_ {
        self.providers.keys().copied()
    }
}

#[async_trait::async_trait]
impl VaultSignerFetching for Onchain {
    async fn signer(&self, vault: VaultKey) -> Result<Address, SignerFetchError> {
        let provider = self
            .providers
            .get(&vault.chain_id)
            .ok_or(SignerFetchError::UnsupportedChain(vault.chain_id))?;
        let manager = IVault::new(vault.vault, provider)
            .manager()
            .call()
            .await?;
        Ok(manager)
    }
}

/// Remembers successfully fetched signers for a fixed time. Failures are not
/// cached.
pub struct Cached {
    inner: Arc<dyn VaultSignerFetching>,
    cache: Cache<VaultKey, Address>,
}

impl Cached {
    const MAX_CAPACITY: u64 = 10_000;

    pub fn new(inner: Arc<dyn VaultSignerFetching>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(Self::MAX_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait::async_trait]
impl VaultSignerFetching for Cached {
    async fn signer(&self, vault: VaultKey) -> Result<Address, SignerFetchError> {
        if let Some(signer) = self.cache.get(&vault) {
            return Ok(signer);
        }

        let signer = self.inner.signer(vault).await?;
        tracing::debug!(%vault, %signer, "fetched vault signer");
        self.cache.insert(vault, signer);
        Ok(signer)
    }
}
