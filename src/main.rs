use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use receipt_relay::channels::email_poller::spawn_email_poller;
use receipt_relay::channels::{AppState, inbound_routes};
use receipt_relay::config::{AppConfig, BlobStoreConfig};
use receipt_relay::pipeline::ReceiptProcessor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    // Initialize tracing (stderr, plus a daily file when RECEIPT_LOG_DIR is set)
    let (file_layer, _log_guard) = match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, "receipt-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    eprintln!("🧾 Receipt Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!(
        "   Webhook: http://0.0.0.0:{}/inbound (max {} bytes)",
        config.http_port, config.max_body_bytes
    );

    match config.blob_store {
        BlobStoreConfig::Http { ref url, .. } => eprintln!("   Blob store: {url}"),
        BlobStoreConfig::Local { ref root } => eprintln!("   Blob store: {}", root.display()),
    }
    eprintln!("   Ledger: {}", config.airtable.ledger_table);

    // ── Pipeline ─────────────────────────────────────────────────────────
    let processor =
        Arc::new(ReceiptProcessor::from_config(&config).context("Failed to build pipeline")?);

    // ── IMAP poller (optional) ───────────────────────────────────────────
    let _poller = if config.email.imap_host.is_some() {
        eprintln!(
            "   Email: polling every {}s (allowed: {})",
            config.email.poll_interval_secs,
            if config.email.allowed_senders.is_empty() {
                "nobody".to_string()
            } else {
                config.email.allowed_senders.join(", ")
            }
        );
        Some(spawn_email_poller(config.email.clone(), Arc::clone(&processor)))
    } else {
        eprintln!("   Email: IMAP polling disabled (EMAIL_IMAP_HOST not set)");
        None
    };

    // ── Webhook ──────────────────────────────────────────────────────────
    let app = inbound_routes(AppState { processor }, config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.http_port))?;
    tracing::info!(port = config.http_port, "Webhook server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("Webhook server failed")?;

    Ok(())
}
