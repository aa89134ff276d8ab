//! Contains the models that are exchanged over the auction relay: auction
//! requests, maker bids and vault share quotes, together with the hashing and
//! signature logic that clients and the relay have to agree on.

pub mod auction;
pub mod bid;
pub mod signature;
pub mod time;
pub mod u256_decimal;
pub mod vault_quote;

use {
    alloy::primitives::Address,
    serde_json::Value,
    std::str::FromStr,
};

/// Parses a `0x`-prefixed 20 byte hex address. Checksums are not enforced, so
/// addresses compare case-insensitively.
pub fn parse_address(value: &str) -> Option<Address> {
    let hex = value.strip_prefix("0x")?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Address::from_str(hex).ok()
}

/// Parses a `0x`-prefixed hex string into bytes.
pub fn parse_hex_bytes(value: &str) -> Option<Vec<u8>> {
    let hex = value.strip_prefix("0x")?;
    const_hex::decode(hex).ok()
}

/// String content of a payload field. Absent fields and fields of any other
/// JSON type read as `None`.
pub fn json_str(value: Option<&Value>) -> Option<&str> {
    value?.as_str()
}

/// Non-negative integer content of a payload field.
pub fn json_u64(value: Option<&Value>) -> Option<u64> {
    value?.as_u64()
}
