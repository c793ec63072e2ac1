use clap::Parser;
use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use pingora_core::services::background::background_service;
use std::path::PathBuf;
use std::sync::Arc;

use kasumi::config::Config;
use kasumi::engine::CacheEngine;
use kasumi::logging::{init_subscriber, LogFormat};
use kasumi::proxy::{KasumiProxy, TaskDrainService};

/// Kasumi - edge full-page cache built with Cloudflare's Pingora
#[derive(Parser, Debug)]
#[command(name = "kasumi")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Daemon mode
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Log output format (json or pretty)
    #[arg(long, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_subscriber(args.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let config = Config::from_file(&args.config)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        store_backend = ?config.store.backend,
        origin_override = config.origin.override_url.as_deref().unwrap_or("-"),
        purge_enabled = config.purge.enabled,
        "Configuration loaded successfully"
    );

    if args.test {
        tracing::info!("Configuration test passed");
        return Ok(());
    }

    let opt = Opt {
        daemon: args.daemon,
        ..Default::default()
    };

    let mut server = Server::new(Some(opt))?;
    server.bootstrap();

    let listen_addr = config.server.listen_addr();
    let threads = config.server.threads;
    let engine = Arc::new(CacheEngine::from_config(config)?);

    let drain = background_service("background task drain", TaskDrainService::new(engine.tasks()));
    server.add_service(drain);

    let mut proxy_service =
        pingora_proxy::http_proxy_service(&server.configuration, KasumiProxy::new(engine));
    proxy_service.threads = Some(threads);
    proxy_service.add_tcp(&listen_addr);

    tracing::info!(address = %listen_addr, "Starting Kasumi edge cache");

    server.add_service(proxy_service);
    server.run_forever();
}
