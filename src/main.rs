use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use internal_acme_dns::{
    api,
    config::{self, Credentials},
    dns::{self, Resolver},
    store::ValidationStore,
};

#[derive(Parser)]
#[command(name = "internal-acme-dns")]
#[command(about = "Answers ACME DNS-01 challenges for internal domains")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and DNS servers (default)
    Serve(ServeArgs),
    /// Validate the credentials file and list its keys
    CheckConfig {
        /// Credentials file
        #[arg(short, long, env = config::CONFIG_FILE_ENV)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Clone)]
struct ServeArgs {
    /// Credentials file
    #[arg(short, long, env = config::CONFIG_FILE_ENV)]
    config: Option<PathBuf>,

    /// Address for the HTTP API
    #[arg(long, env = "ACME_DNS_HTTP_LISTEN", default_value = "0.0.0.0:8080")]
    http_listen: SocketAddr,

    /// Address for the DNS server (UDP and TCP)
    #[arg(long, env = "ACME_DNS_DNS_LISTEN", default_value = "0.0.0.0:53")]
    dns_listen: SocketAddr,

    /// TTL of TXT answers, in seconds
    #[arg(long, env = "ACME_DNS_TTL", default_value_t = dns::DEFAULT_TTL)]
    ttl: u32,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "internal_acme_dns=info,tower_http=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::CheckConfig { config }) => check_config(config),
        Some(Commands::Serve(args)) => {
            init_tracing();
            serve(args).await
        }
        None => {
            init_tracing();
            serve(cli.serve).await
        }
    }
}

fn check_config(config: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config::config_path(config);
    let credentials = Credentials::load(&path)?;

    println!("{}: {} key(s)", path.display(), credentials.api_keys.len());
    for (name, key) in &credentials.api_keys {
        if key.domains.is_empty() {
            println!("  {name}: (no domains)");
        } else {
            println!("  {name}: {}", key.domains.join(", "));
        }
    }

    let problems = credentials.problems();
    for problem in &problems {
        eprintln!("error: {problem}");
    }
    if !problems.is_empty() {
        anyhow::bail!("{} problem(s) in {}", problems.len(), path.display());
    }
    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config_path = config::config_path(args.config);
    match Credentials::load(&config_path) {
        Ok(credentials) => {
            tracing::info!(
                "Loaded {} API key(s) from {}",
                credentials.api_keys.len(),
                config_path.display()
            );
            for problem in credentials.problems() {
                tracing::warn!("{}", problem);
            }
        }
        // Re-read per request, so a missing file may still appear later
        Err(e) => tracing::warn!("{}", e),
    }

    let store = ValidationStore::new();
    let resolver = Resolver::new(store.clone()).with_ttl(args.ttl);
    let app = api::create_router(api::AppState::new(store, config_path));

    let udp = tokio::net::UdpSocket::bind(args.dns_listen).await?;
    let tcp = tokio::net::TcpListener::bind(args.dns_listen).await?;
    let http = tokio::net::TcpListener::bind(args.http_listen).await?;
    tracing::info!("HTTP API listening on http://{}", http.local_addr()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutting down");
        let _ = shutdown_tx.send(true);
    });

    let mut http_shutdown = shutdown_rx.clone();
    let http_server = async move {
        axum::serve(http, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.changed().await;
            })
            .await
            .map_err(anyhow::Error::from)
    };

    tokio::try_join!(
        http_server,
        async {
            dns::server::serve_udp(udp, resolver.clone(), shutdown_rx.clone())
                .await
                .map_err(anyhow::Error::from)
        },
        async {
            dns::server::serve_tcp(tcp, resolver.clone(), shutdown_rx.clone())
                .await
                .map_err(anyhow::Error::from)
        },
    )?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
