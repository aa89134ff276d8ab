use {
    crate::{
        api::{self, AppState},
        arguments::Arguments,
        handlers::{auction::Auctions, vault_quote::VaultQuotes},
        registry::{Registry, Sweeper},
        relay::{self, Relay},
        vault_signers,
    },
    anyhow::{Context, Result},
    clap::Parser,
    observe::metrics::LivenessChecking,
    std::{net::SocketAddr, sync::Arc},
    tokio::{net::TcpListener, sync::oneshot},
};

struct Liveness {
    /// `None` if the auction relay is disabled.
    sweeper: Option<Sweeper>,
}

#[async_trait::async_trait]
impl LivenessChecking for Liveness {
    async fn is_alive(&self) -> bool {
        self.sweeper.as_ref().is_none_or(Sweeper::is_running)
    }
}

pub async fn start(args: impl Iterator<Item = String>) {
    let args = Arguments::parse_from(args);
    let obs_config = observe::Config::new(
        args.log_filter.as_str(),
        args.log_stderr_threshold,
        args.use_json_logs,
    );
    observe::tracing::initialize(&obs_config);
    tracing::info!("running auction relay with validated arguments:\n{}", args);
    observe::metrics::setup_registry(Some("sapience".into()), None);

    if let Err(err) = run(args, None).await {
        tracing::error!(?err, "auction relay stopped");
        std::process::exit(1);
    }
}

/// Assumes tracing and metrics registry have already been set up.
///
/// The `addr_sender` receives the address the server is bound to, which lets
/// tests bind to port 0.
pub async fn run(args: Arguments, addr_sender: Option<oneshot::Sender<SocketAddr>>) -> Result<()> {
    let (relay, sweeper) = if args.enable_auction {
        let registry = Arc::new(Registry::new(args.auction_ttl));
        let sweeper = registry.spawn_sweeper(args.auction_sweep_interval);
        let onchain = vault_signers::Onchain::new(&args.node_urls);
        tracing::info!(chains = ?onchain.chains().collect::<Vec<_>>(), "vault signer lookup");
        let signers = vault_signers::Cached::new(Arc::new(onchain), args.vault_signer_cache_ttl);
        let relay = Relay::new(
            relay::Config {
                rate_limit_window: args.rate_limit_window,
                rate_limit_max_messages: args.rate_limit_max_messages,
                max_message_size: args.max_message_size,
                outbox_capacity: args.outbox_capacity,
            },
            Auctions::new(registry, args.strict_bid_signatures),
            VaultQuotes::new(Arc::new(signers), args.vault_quote_max_age),
        );
        (Some(Arc::new(relay)), Some(sweeper))
    } else {
        tracing::warn!("auction relay is disabled");
        (None, None)
    };

    let metrics = observe::metrics::serve_metrics(
        Arc::new(Liveness { sweeper }),
        args.metrics_address,
    );

    let app = api::router(AppState {
        relay,
        chat: Default::default(),
        allowed_origins: Arc::new(args.allowed_origins.into_iter().collect()),
    });
    let listener = TcpListener::bind(args.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", args.bind_address))?;
    let address = listener.local_addr()?;
    tracing::info!(%address, "serving auction relay");
    if let Some(sender) = addr_sender {
        let _ = sender.send(address);
    }

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed");
    metrics.abort();
    result
}

#[cfg(unix)]
async fn shutdown_signal() {
    // Intercept signals for graceful shutdown. Kubernetes sends sigterm, Ctrl-C
    // sends sigint.
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .unwrap()
            .recv()
            .await
    };
    let sigint = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .unwrap()
            .recv()
            .await;
    };
    futures::pin_mut!(sigint);
    futures::pin_mut!(sigterm);
    futures::future::select(sigterm, sigint).await;
}

#[cfg(windows)]
async fn shutdown_signal() {
    // No support for signal handling on Windows.
    std::future::pending().await
}
