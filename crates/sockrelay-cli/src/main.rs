//! sockrelay command-line entry point

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sockrelay::{PoolConfig, RelayConfig, RelayServer};

/// Local socket relay with pooled backend connections
#[derive(Debug, Parser)]
#[command(name = "sockrelay", version, about)]
struct Args {
    /// Backend ip:port all pooled connections dial
    #[arg(long, default_value = "127.0.0.1:6379")]
    target: String,

    /// Pool minimum size
    #[arg(long, default_value_t = 5)]
    min: usize,

    /// Pool maximum size
    #[arg(long, default_value_t = 20)]
    max: usize,

    /// Seconds after which an idle pooled connection is closed
    #[arg(long, default_value_t = 3600)]
    idle: u64,

    /// Seconds to wait for active sessions to drain on shutdown
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Unix domain socket file to listen on
    #[arg(long, default_value = "/tmp/sockrelay.sock")]
    unix: PathBuf,

    /// Show run details
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        RelayConfig::default()
            .backend_addr(self.target)
            .pool(PoolConfig {
                min_connections: self.min,
                max_connections: self.max,
                idle_timeout: Duration::from_secs(self.idle),
            })
            .shutdown_timeout(Duration::from_secs(self.timeout))
            .socket_path(self.unix)
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "sockrelay=debug,info" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.into_config();
    let server = RelayServer::new(config)
        .await
        .context("failed to initialize connection pool")?;
    server.install_signal_handlers();
    server.run().await.context("relay server failed")?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        tracing::error!(error = format!("{e:#}"), "Fatal error");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["sockrelay"]).unwrap();
        assert_eq!(args.target, "127.0.0.1:6379");
        assert_eq!(args.min, 5);
        assert_eq!(args.max, 20);
        assert_eq!(args.idle, 3600);
        assert_eq!(args.timeout, 60);
        assert_eq!(args.unix, Path::new("/tmp/sockrelay.sock"));
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_into_config() {
        let args = Args::try_parse_from([
            "sockrelay",
            "--target",
            "10.0.0.9:11211",
            "--min",
            "1",
            "--max",
            "2",
            "--idle",
            "30",
            "--timeout",
            "5",
            "--unix",
            "/tmp/test.sock",
            "--verbose",
        ])
        .unwrap();
        assert!(args.verbose);

        let config = args.into_config();
        assert_eq!(config.backend_addr, "10.0.0.9:11211");
        assert_eq!(config.pool.min_connections, 1);
        assert_eq!(config.pool.max_connections, 2);
        assert_eq!(config.pool.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.socket_path, Path::new("/tmp/test.sock"));
    }
}
