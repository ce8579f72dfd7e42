//! Binary entry point: parses CLI flags, wires a [`ReqwestBackendClient`] and
//! a [`GatewayService`] together, and serves HTTP connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use s3gw::backend::ReqwestBackendClient;
use s3gw::config::{GatewayConfig, StaticConfigProvider};
use s3gw::service::GatewayServiceBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "s3gw-proxy", about = "S3 REST gateway over a Swift-style backend")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8014")]
    listen: SocketAddr,

    /// Base URL of the backend account/container/object service.
    #[arg(long)]
    backend_url: String,

    /// Value reported for `?location` requests.
    #[arg(long, default_value = "US")]
    location: String,

    /// Logger category, attached to every tracing span.
    #[arg(long, default_value = "s3gw")]
    log_route: String,

    /// Timeout for each backend HTTP call, in seconds.
    #[arg(long, default_value_t = 30)]
    backend_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    let backend = ReqwestBackendClient::with_timeout(&cli.backend_url, Duration::from_secs(cli.backend_timeout_secs))?;

    let config = GatewayConfig { location: cli.location.clone(), log_route: cli.log_route.clone(), backend_base_url: cli.backend_url.clone(), ..GatewayConfig::default() };
    let config_provider = StaticConfigProvider::new(Arc::new(config));

    let service = GatewayServiceBuilder::new(backend, config_provider).build();

    let listener = TcpListener::bind(cli.listen).await?;
    info!(addr = %cli.listen, backend = %cli.backend_url, "listening");

    let server = AutoBuilder::new(hyper_util::rt::TokioExecutor::new());
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted?;
                let io = TokioIo::new(stream);
                let service = service.clone();
                let conn = server.serve_connection(io, service);
                let conn = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        error!(?peer_addr, %err, "connection error");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    graceful.shutdown().await;
    Ok(())
}
