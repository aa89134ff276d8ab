#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "auction_relay")]
pub struct Metrics {
    /// Number of currently open websocket connections.
    #[metric(labels("path"))]
    pub open_connections: prometheus::IntGaugeVec,

    /// Inbound messages by type.
    #[metric(labels("type"))]
    pub messages: prometheus::IntCounterVec,

    /// Auctions started, including restarts of live auctions.
    pub auctions_started: prometheus::IntCounter,

    /// Number of auctions currently held in memory.
    pub live_auctions: prometheus::IntGauge,

    /// Submitted bids by result. `accepted` or the rejection reason.
    #[metric(labels("result"))]
    pub bids: prometheus::IntCounterVec,

    /// Bids whose maker signature did not verify.
    #[metric(labels("reason"))]
    pub strict_verification_failures: prometheus::IntCounterVec,

    /// Published vault quotes by result. `accepted` or the rejection reason.
    #[metric(labels("result"))]
    pub vault_quotes: prometheus::IntCounterVec,

    /// Connections closed by the relay, by reason.
    #[metric(labels("reason"))]
    pub connections_closed: prometheus::IntCounterVec,

    /// Errors reported by websocket transports.
    #[metric(labels("path"))]
    pub socket_errors: prometheus::IntCounterVec,
}

pub fn get() -> &'static Metrics {
    Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
}
