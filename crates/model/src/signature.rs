//! Signature schemes used by makers and vault managers.
//!
//! Maker bids are approvals signed according to EIP-712 against the market
//! contract of the auction. Vault share quotes are plain text messages signed
//! according to EIP-191 (`personal_sign`).

use {
    crate::{
        auction::{AuctionRequest, normalize_payload},
        bid::ValidatedBid,
    },
    alloy::{
        primitives::{Address, B256, Signature, U256, eip191_hash_message, keccak256},
        sol,
        sol_types::SolType,
    },
    std::{fmt, sync::LazyLock},
};

type DomainSol = sol! {
    tuple(
        bytes32, // EIP712Domain type hash
        bytes32, // keccak(name)
        bytes32, // keccak(version)
        uint256, // chainId
        address, // verifyingContract
    )
};
type BidMessageSol = sol! {
    tuple(
        bytes32, // predictionsHash
        uint256, // makerWager
        uint256, // makerDeadline
    )
};
type ApproveSol = sol! {
    tuple(
        bytes32, // Approve type hash
        bytes32, // messageHash
        address, // owner
    )
};
type SigningMessageSol = sol! { tuple(bytes2, bytes32, bytes32) };

/// The EIP-712 type hash of the approval makers sign.
pub static APPROVE_TYPE_HASH: LazyLock<B256> =
    LazyLock::new(|| keccak256("Approve(bytes32 messageHash,address owner)"));

#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct DomainSeparator(pub B256);

impl fmt::Debug for DomainSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl DomainSeparator {
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        /// The EIP-712 domain name used for computing the domain separator.
        static DOMAIN_NAME: LazyLock<B256> = LazyLock::new(|| keccak256("SignatureProcessor"));
        /// The EIP-712 domain version used for computing the domain separator.
        static DOMAIN_VERSION: LazyLock<B256> = LazyLock::new(|| keccak256("1"));
        /// The EIP-712 domain type used computing the domain separator.
        static DOMAIN_TYPE_HASH: LazyLock<B256> = LazyLock::new(|| {
            keccak256(
                "EIP712Domain(string name,string version,uint256 chainId,address \
                 verifyingContract)",
            )
        });

        let encoded = DomainSol::abi_encode_sequence(&(
            *DOMAIN_TYPE_HASH,
            *DOMAIN_NAME,
            *DOMAIN_VERSION,
            U256::from(chain_id),
            verifying_contract,
        ));
        Self(keccak256(encoded))
    }
}

/// Hash of the terms a maker commits to: the set of predictions, the amount of
/// collateral offered and how long the offer stands.
pub fn bid_message_hash(predictions_hash: B256, maker_wager: U256, maker_deadline: u64) -> B256 {
    keccak256(BidMessageSol::abi_encode_sequence(&(
        predictions_hash,
        maker_wager,
        U256::from(maker_deadline),
    )))
}

/// EIP-712 hash that a maker signs to approve a bid.
pub fn approval_signing_hash(domain: &DomainSeparator, message_hash: B256, owner: Address) -> B256 {
    let struct_hash = keccak256(ApproveSol::abi_encode_sequence(&(
        *APPROVE_TYPE_HASH,
        message_hash,
        owner,
    )));
    keccak256(SigningMessageSol::abi_encode_packed(&(
        [0x19, 0x01],
        domain.0,
        struct_hash,
    )))
}

/// Recovers the address that produced a 65 byte `r || s || v` signature over
/// `hash`.
pub fn recover(signature: &[u8], hash: &B256) -> anyhow::Result<Address> {
    let signature = Signature::from_raw(signature)?;
    Ok(signature.recover_address_from_prehash(hash)?)
}

/// Recovers the signer of an EIP-191 `personal_sign` signature over `message`.
pub fn recover_personal(signature: &[u8], message: impl AsRef<[u8]>) -> anyhow::Result<Address> {
    recover(signature, &eip191_hash_message(message))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum StrictVerificationError {
    /// The signature is well-formed but was not produced by the maker.
    #[error("invalid_signature")]
    InvalidSignature,
    /// The inputs could not be hashed or the signer could not be recovered.
    #[error("verification_failed")]
    VerificationFailed,
}

/// Cryptographically verifies that `bid.maker` approved the bid's terms for
/// the given auction.
pub fn verify_maker_bid_strict(
    auction: &AuctionRequest,
    bid: &ValidatedBid,
) -> Result<(), StrictVerificationError> {
    if auction.predicted_outcomes.is_empty() {
        return Err(StrictVerificationError::VerificationFailed);
    }
    let normalized = normalize_payload(&auction.predicted_outcomes);
    let message_hash = bid_message_hash(
        normalized.predictions_hash,
        bid.maker_wager,
        bid.maker_deadline,
    );
    let domain = DomainSeparator::new(auction.chain_id, auction.market_contract);
    let hash = approval_signing_hash(&domain, message_hash, bid.maker);

    let signer = recover(&bid.maker_signature, &hash)
        .map_err(|_| StrictVerificationError::VerificationFailed)?;
    if signer != bid.maker {
        return Err(StrictVerificationError::InvalidSignature);
    }
    Ok(())
}
