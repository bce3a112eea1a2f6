use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use connect_tunnel::adapters::{SessionTracker, TunnelBridge};
use connect_tunnel::config::AppConfig;
use connect_tunnel::domain::{Result, TunnelConnector, TunnelError, TunnelRoute};

#[derive(Parser, Debug)]
#[command(version = env!("CONNECT_TUNNEL_VERSION"), about = "Reach a remote desktop through HTTPS CONNECT proxies")]
pub struct Opts {
    /// Configuration file (defaults to the per-user config location)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Proxy to go through, repeat for a chain (https://[user:pass@]host[:port] or host:port)
    #[arg(long = "proxy", short = 'p')]
    proxies: Vec<String>,

    /// Final destination as host:port
    #[arg(long, short = 't')]
    target: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept local connections and forward each through its own tunnel
    Listen {
        /// Listen on this address instead of the configured one
        #[arg(long, short = 'b')]
        bind: Option<String>,
    },
    /// Open one tunnel and relay it over stdin/stdout
    Stdio,
    /// Open one tunnel, report the proxy's answer and close it
    Probe,
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(opts).await {
        error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(opts: Opts) -> Result<()> {
    let config = AppConfig::load(opts.config.as_deref())?.with_overrides(opts.proxies, opts.target);
    let route = config.route()?;
    let connector = config.build_connector()?;

    match opts.command {
        Command::Listen { bind } => {
            let bind = bind.unwrap_or_else(|| config.listen.clone());
            listen(connector, route, &bind).await
        }
        Command::Stdio => stdio(connector, route).await,
        Command::Probe => probe(connector, route).await,
    }
}

async fn listen(connector: TunnelConnector, route: TunnelRoute, bind: &str) -> Result<()> {
    match rlimit::increase_nofile_limit(u64::MAX) {
        Ok(limit) => debug!("open file limit raised to {}", limit),
        Err(e) => debug!("could not raise open file limit: {}", e),
    }

    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| TunnelError::Config(format!("cannot listen on {}: {}", bind, e)))?;
    let bridge = Arc::new(TunnelBridge::new(connector, route, Arc::new(SessionTracker::new())));

    bridge
        .serve(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| TunnelError::Config(format!("listener on {} failed: {}", bind, e)))
}

async fn stdio(connector: TunnelConnector, route: TunnelRoute) -> Result<()> {
    let mut tunnel = connector.connect_route(&route).await?;
    let mut local = tokio::io::join(tokio::io::stdin(), tokio::io::stdout());

    match tokio::io::copy_bidirectional(&mut local, &mut tunnel).await {
        Ok((sent, received)) => info!(sent, received, "tunnel closed"),
        Err(e) => debug!("relay ended with error: {}", e),
    }
    Ok(())
}

async fn probe(connector: TunnelConnector, route: TunnelRoute) -> Result<()> {
    let mut tunnel = connector.connect_route(&route).await?;
    println!("{}: {}", route, tunnel.status_line());
    if let Err(e) = tunnel.shutdown().await {
        debug!("shutdown after probe failed: {}", e);
    }
    Ok(())
}
