use {
    anyhow::{Context, Result, ensure},
    std::{
        fmt::{self, Display, Formatter},
        net::SocketAddr,
        str::FromStr,
        time::Duration,
    },
    url::Url,
};

#[derive(clap::Parser)]
pub struct Arguments {
    #[clap(long, env, default_value = "0.0.0.0:3002")]
    pub bind_address: SocketAddr,

    #[clap(long, env, default_value = "0.0.0.0:9586")]
    pub metrics_address: SocketAddr,

    #[clap(
        long,
        env,
        default_value = "warn,auction_relay=debug,model=debug,observe=info"
    )]
    pub log_filter: String,

    /// At which log level logs should be printed to stderr instead of stdout.
    #[clap(long, env)]
    pub log_stderr_threshold: Option<tracing::Level>,

    /// Whether to use JSON format for the logs.
    #[clap(long, env, default_value = "false")]
    pub use_json_logs: bool,

    /// Serve the auction relay on `/auction`. When disabled the path responds
    /// with `410 Gone`.
    #[clap(long, env, action = clap::ArgAction::Set, default_value = "true")]
    pub enable_auction: bool,

    /// Origins allowed to open websocket connections. Empty allows any origin.
    #[clap(long, env, use_value_delimiter = true)]
    pub allowed_origins: Vec<String>,

    /// How long an auction accepts bids after it was last started. Clamped to
    /// the range 5s..=5m.
    #[clap(
        long,
        env,
        default_value = "60s",
        value_parser = humantime::parse_duration,
    )]
    pub auction_ttl: Duration,

    /// How often expired auctions are removed from memory.
    #[clap(
        long,
        env,
        default_value = "30s",
        value_parser = humantime::parse_duration,
    )]
    pub auction_sweep_interval: Duration,

    /// Length of the fixed window in which inbound messages are counted.
    #[clap(
        long,
        env,
        default_value = "10s",
        value_parser = humantime::parse_duration,
    )]
    pub rate_limit_window: Duration,

    /// Messages a connection may send per window before it gets closed.
    #[clap(long, env, default_value = "100")]
    pub rate_limit_max_messages: u32,

    /// Largest inbound message in bytes. Bigger messages close the connection.
    #[clap(long, env, default_value = "64000")]
    pub max_message_size: usize,

    /// Outgoing frames buffered per connection. Connections that fall
    /// further behind are disconnected.
    #[clap(long, env, default_value = "1024")]
    pub outbox_capacity: usize,

    /// Verify maker signatures before accepting bids. When disabled signatures
    /// are still verified in the background but failures are only logged.
    #[clap(long, env, action = clap::ArgAction::Set, default_value = "false")]
    pub strict_bid_signatures: bool,

    /// Maximum difference between a vault quote's timestamp and the current
    /// time.
    #[clap(
        long,
        env,
        default_value = "5m",
        value_parser = humantime::parse_duration,
    )]
    pub vault_quote_max_age: Duration,

    /// How long the authorized signer of a vault is cached.
    #[clap(
        long,
        env,
        default_value = "60s",
        value_parser = humantime::parse_duration,
    )]
    pub vault_signer_cache_ttl: Duration,

    /// RPC endpoints used to look up vault managers, as comma separated
    /// `chainId=url` pairs.
    #[clap(long, env, use_value_delimiter = true)]
    pub node_urls: Vec<NodeUrl>,
}

/// RPC endpoint of a single chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeUrl {
    pub chain_id: u64,
    pub url: Url,
}

impl FromStr for NodeUrl {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (chain_id, url) = s
            .split_once('=')
            .context("node url must have the form chainId=url")?;
        let chain_id = chain_id
            .trim()
            .parse()
            .with_context(|| format!("invalid chain id {chain_id:?}"))?;
        ensure!(chain_id > 0, "chain id must be positive");
        let url = url.trim().parse().context("invalid node url")?;
        Ok(Self { chain_id, url })
    }
}

impl Display for Arguments {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self {
            bind_address,
            metrics_address,
            log_filter,
            log_stderr_threshold,
            use_json_logs,
            enable_auction,
            allowed_origins,
            auction_ttl,
            auction_sweep_interval,
            rate_limit_window,
            rate_limit_max_messages,
            max_message_size,
            outbox_capacity,
            strict_bid_signatures,
            vault_quote_max_age,
            vault_signer_cache_ttl,
            node_urls,
        } = self;

        writeln!(f, "bind_address: {bind_address}")?;
        writeln!(f, "metrics_address: {metrics_address}")?;
        writeln!(f, "log_filter: {log_filter}")?;
        writeln!(f, "log_stderr_threshold: {log_stderr_threshold:?}")?;
        writeln!(f, "use_json_logs: {use_json_logs}")?;
        writeln!(f, "enable_auction: {enable_auction}")?;
        writeln!(f, "allowed_origins: {allowed_origins:?}")?;
        writeln!(f, "auction_ttl: {auction_ttl:?}")?;
        writeln!(f, "auction_sweep_interval: {auction_sweep_interval:?}")?;
        writeln!(f, "rate_limit_window: {rate_limit_window:?}")?;
        writeln!(f, "rate_limit_max_messages: {rate_limit_max_messages}")?;
        writeln!(f, "max_message_size: {max_message_size}")?;
        writeln!(f, "outbox_capacity: {outbox_capacity}")?;
        writeln!(f, "strict_bid_signatures: {strict_bid_signatures}")?;
        writeln!(f, "vault_quote_max_age: {vault_quote_max_age:?}")?;
        writeln!(f, "vault_signer_cache_ttl: {vault_signer_cache_ttl:?}")?;
        // Node urls regularly contain API keys.
        let chains = node_urls
            .iter()
            .map(|node| node.chain_id.to_string())
            .collect::<Vec<_>>();
        writeln!(f, "node_urls: SECRET for chains [{}]", chains.join(", "))?;
        Ok(())
    }
}
