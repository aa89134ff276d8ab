use chrono::Utc;

/// Current unix time in seconds.
pub fn now_in_epoch_seconds() -> u64 {
    Utc::now().timestamp().try_into().unwrap_or_default()
}

/// Current unix time in milliseconds.
pub fn now_in_epoch_millis() -> u64 {
    Utc::now().timestamp_millis().try_into().unwrap_or_default()
}
