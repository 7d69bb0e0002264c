use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use approval_relay::api::{self, BotState, DecisionState};
use approval_relay::approval::{ApprovalGateway, DecisionRouter};
use approval_relay::bot::ApprovalBot;
use approval_relay::config::{self, Config};
use approval_relay::notification::{BotConnectorClient, FanoutDispatcher};
use approval_relay::store::postgres::PgConnector;
use approval_relay::store::table::{MemoryConnector, TableConnector};
use approval_relay::store::ReferenceStore;

mod cli;

use cli::{Cli, Commands, StoreKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let (plain_layer, json_layer) = if json_logs {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "approval_relay=debug,tower_http=info".into()),
        ))
        .with(plain_layer)
        .with(json_layer)
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Bot { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_bot(cfg, args.store, port).await
        }
        Some(Commands::Decisions { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_decisions(cfg, port).await
        }
        None => {
            let port = cfg.port;
            run_bot(cfg, args.store, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_bot(cfg: Config, store_kind: StoreKind, port: u16) -> anyhow::Result<()> {
    tracing::info!(config = ?cfg, store = ?store_kind, "starting approvals bot");

    let connector: Arc<dyn TableConnector> = match store_kind {
        StoreKind::Postgres => Arc::new(PgConnector::new(
            cfg.database_url.clone(),
            cfg.reference_table.clone(),
        )),
        StoreKind::Memory => Arc::new(MemoryConnector::default()),
    };
    let store = Arc::new(ReferenceStore::new(connector));

    // Warm the store in the background; a failure here is retried on first use.
    {
        let store = store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.ensure_ready().await {
                tracing::warn!(error = %e, "conversation store not ready yet, will retry on demand");
            }
        });
    }

    let credentials = cfg.bot_credentials();
    if credentials.is_none() {
        tracing::warn!("MICROSOFT_APP_ID / MICROSOFT_APP_PASSWORD not set, outbound messages are unauthenticated");
    }
    let sender = Arc::new(
        BotConnectorClient::new(credentials, cfg.token_url.clone())
            .with_trusted_hosts(cfg.trusted_hosts.clone()),
    );

    if cfg.function_key.is_none() {
        tracing::warn!("FUNCTIONAPP_KEY not set, decision endpoint calls carry no access key");
    }
    let router = DecisionRouter::new(cfg.function_url.clone(), cfg.function_key.clone());

    let state = Arc::new(BotState {
        bot: ApprovalBot::new(store.clone(), sender.clone(), router, cfg.prune_on_uninstall),
        fanout: FanoutDispatcher::new(store, sender),
    });

    serve(api::bot_router(state), port, "approvals bot").await
}

async fn run_decisions(cfg: Config, port: u16) -> anyhow::Result<()> {
    if cfg.function_key.is_none() {
        if cfg.production {
            anyhow::bail!("FUNCTIONAPP_KEY must be set to run the decision endpoint in production");
        }
        tracing::warn!("FUNCTIONAPP_KEY not set, decision endpoint accepts unauthenticated calls");
    }

    let state = Arc::new(DecisionState {
        gateway: ApprovalGateway::new(),
        function_key: cfg.function_key,
    });

    serve(api::decisions_router(state), port, "decision endpoint").await
}

async fn serve(app: axum::Router, port: u16, name: &str) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("{} listening on {}", name, addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
