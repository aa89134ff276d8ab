use {
    alloy::primitives::U256,
    serde::{Deserializer, Serializer, de},
    serde_json::Value,
    std::fmt,
};

/// Parses a strictly decimal encoded u256. Unlike `U256::from_str` this does
/// not accept `0x` prefixed hex, signs or surrounding whitespace.
pub fn parse(s: &str) -> Option<U256> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(s, 10).ok()
}

/// Like [`parse`] but additionally rejects zero.
pub fn parse_positive(s: &str) -> Option<U256> {
    parse(s).filter(|value| !value.is_zero())
}

/// Reads a u256 from a JSON value holding either a decimal string or an
/// integer number. Fractional, negative and non-numeric values are rejected.
pub fn from_json(value: &Value) -> Option<U256> {
    match value {
        Value::String(s) => parse(s),
        Value::Number(number) => number.as_u64().map(U256::from),
        _ => None,
    }
}

/// Like [`from_json`] but additionally rejects zero.
pub fn positive_from_json(value: &Value) -> Option<U256> {
    from_json(value).filter(|value| !value.is_zero())
}

pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor {}
    impl de::Visitor<'_> for Visitor {
        type Value = U256;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a u256 encoded as a decimal encoded string")
        }

        fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse(s).ok_or_else(|| {
                de::Error::custom(format!("failed to decode {s:?} as decimal u256"))
            })
        }
    }

    deserializer.deserialize_str(Visitor {})
}
