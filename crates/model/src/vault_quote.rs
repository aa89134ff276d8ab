//! Signed vault share price quotes published by vault managers.

use {
    crate::{parse_address, parse_hex_bytes, signature},
    alloy::primitives::{Address, Bytes},
    serde::{Deserialize, Serialize},
    std::{fmt, time::Duration},
};

/// A quote exactly as received from a publisher.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishVaultQuotePayload {
    #[serde(default)]
    pub chain_id: Option<serde_json::Number>,
    #[serde(default)]
    pub vault_address: String,
    #[serde(default)]
    pub vault_collateral_per_share: String,
    #[serde(default)]
    pub timestamp: Option<serde_json::Number>,
    #[serde(default)]
    pub signed_by: String,
    #[serde(default)]
    pub signature: String,
}

/// Channel a quote is published on.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct VaultKey {
    pub chain_id: u64,
    pub vault: Address,
}

impl VaultKey {
    /// Parses the `{chainId, vaultAddress}` pair clients subscribe with.
    pub fn parse(chain_id: Option<&serde_json::Number>, vault_address: &str) -> Option<Self> {
        Some(Self {
            chain_id: chain_id?.as_u64().filter(|id| *id > 0)?,
            vault: parse_address(vault_address)?,
        })
    }

    pub fn vault_address(&self) -> String {
        const_hex::encode_prefixed(self.vault)
    }
}

/// `<chainId>:<lowercase vault address>`
impl fmt::Display for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.vault_address())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum VaultQuoteRejection {
    #[error("invalid_payload")]
    InvalidPayload,
    #[error("stale_timestamp")]
    StaleTimestamp,
    #[error("invalid_signature")]
    InvalidSignature,
    #[error("signer_unavailable")]
    SignerUnavailable,
    #[error("unauthorized_signer")]
    UnauthorizedSigner,
}

/// A structurally valid quote.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultQuote {
    pub chain_id: u64,
    pub vault_address: Address,
    pub vault_collateral_per_share: String,
    pub timestamp: u64,
    pub signed_by: Address,
    pub signature: Bytes,
}

impl TryFrom<&PublishVaultQuotePayload> for VaultQuote {
    type Error = VaultQuoteRejection;

    fn try_from(payload: &PublishVaultQuotePayload) -> Result<Self, Self::Error> {
        let key = VaultKey::parse(payload.chain_id.as_ref(), &payload.vault_address)
            .ok_or(VaultQuoteRejection::InvalidPayload)?;
        if !is_decimal(&payload.vault_collateral_per_share) {
            return Err(VaultQuoteRejection::InvalidPayload);
        }
        let timestamp = payload
            .timestamp
            .as_ref()
            .and_then(serde_json::Number::as_u64)
            .ok_or(VaultQuoteRejection::InvalidPayload)?;
        let signed_by =
            parse_address(&payload.signed_by).ok_or(VaultQuoteRejection::InvalidPayload)?;
        let signature =
            parse_hex_bytes(&payload.signature).ok_or(VaultQuoteRejection::InvalidPayload)?;

        Ok(Self {
            chain_id: key.chain_id,
            vault_address: key.vault,
            vault_collateral_per_share: payload.vault_collateral_per_share.clone(),
            timestamp,
            signed_by,
            signature: signature.into(),
        })
    }
}

impl VaultQuote {
    pub fn key(&self) -> VaultKey {
        VaultKey {
            chain_id: self.chain_id,
            vault: self.vault_address,
        }
    }

    /// The text the publisher signs with `personal_sign`.
    pub fn canonical_message(&self) -> String {
        [
            "Sapience Vault Share Quote".to_string(),
            format!("Vault: {}", self.key().vault_address()),
            format!("ChainId: {}", self.chain_id),
            format!("CollateralPerShare: {}", self.vault_collateral_per_share),
            format!("Timestamp: {}", self.timestamp),
        ]
        .join("\n")
    }

    /// Rejects quotes whose timestamp is further than `max_age` from `now_ms`
    /// in either direction.
    pub fn ensure_fresh(&self, now_ms: u64, max_age: Duration) -> Result<(), VaultQuoteRejection> {
        let age = Duration::from_millis(now_ms.abs_diff(self.timestamp));
        if age > max_age {
            return Err(VaultQuoteRejection::StaleTimestamp);
        }
        Ok(())
    }

    /// Checks that the signature over the canonical message was produced by
    /// `signed_by`.
    pub fn ensure_signed_by_publisher(&self) -> Result<(), VaultQuoteRejection> {
        let signer = signature::recover_personal(&self.signature, self.canonical_message())
            .map_err(|_| VaultQuoteRejection::InvalidSignature)?;
        if signer != self.signed_by {
            return Err(VaultQuoteRejection::InvalidSignature);
        }
        Ok(())
    }
}

fn is_decimal(value: &str) -> bool {
    let (integer, fraction) = match value.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (value, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    digits(integer) && fraction.is_none_or(digits)
}
