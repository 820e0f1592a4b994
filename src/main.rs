use clap::Parser;
use mongoproxy::middleware::{Chain, PlaygroundMiddleware};
use mongoproxy::{config::Config, server::Proxy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env first so clap's env fallbacks see variables
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Attempt to load config before initializing logs to pick up log_level from file
    let cfg_file_res = Config::load_from_file(cli.config.as_deref());
    let cfg_file = match &cfg_file_res {
        Ok(c) => c.clone(),
        Err(_) => Config::default(),
    };

    // Determine log filter precedence: CLI (--log-level / MONGOPROXY_LOG_LEVEL)
    // > RUST_LOG (env) > config.toml log_level > default("info")
    let filter_spec = if let Some(ref lvl) = cli.log_level {
        lvl.clone()
    } else if let Ok(env_spec) = std::env::var("RUST_LOG") {
        env_spec
    } else if let Some(ref lvl) = cfg_file.log_level {
        lvl.clone()
    } else {
        "info".to_string()
    };

    // Initialize logging with chosen filter
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter_spec))
        .compact()
        .init();

    if let Err(e) = cfg_file_res.as_ref() {
        tracing::warn!(error = %format!("{e:?}"), "invalid config; using defaults");
    }

    // Load from config file (if present), then override with CLI/env.
    let cfg = cfg_file.with_overrides(
        cli.proxy_addr.clone(),
        cli.mongo_addr.clone(),
        cli.log_level.clone(),
        cli.client_idle_timeout_ms,
        cli.message_timeout_ms,
    );
    if let Err(e) = cfg.validate() {
        anyhow::bail!("invalid configuration: {e}");
    }

    let mut chain = Chain::new();
    if cli.playground {
        chain = chain.with_stage(PlaygroundMiddleware);
    }

    let mut proxy = Proxy::new(&cfg, chain);
    tracing::info!(proxy_addr = %cfg.proxy_addr, mongo_addr = %cfg.mongo_addr, "starting mongoproxy");
    proxy.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    proxy.stop().await?;

    Ok(())
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "mongoproxy",
    version,
    about = "Intercepting proxy for the MongoDB wire protocol"
)]
struct Cli {
    /// Path to config TOML file
    #[arg(short = 'c', long = "config", env = "MONGOPROXY_CONFIG")]
    config: Option<String>,

    /// Listen address for client connections (e.g., 127.0.0.1:2000)
    #[arg(long = "proxy-addr", env = "MONGOPROXY_PROXY_ADDR")]
    proxy_addr: Option<String>,

    /// Address of the upstream MongoDB server (host:port)
    #[arg(long = "mongo-addr", env = "MONGOPROXY_MONGO_ADDR")]
    mongo_addr: Option<String>,

    /// Log level or filter spec (e.g., info or info,mongoproxy=debug)
    #[arg(long = "log-level", env = "MONGOPROXY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Disconnect a client after this long without a message
    #[arg(long = "client-idle-timeout-ms", env = "MONGOPROXY_CLIENT_IDLE_TIMEOUT_MS")]
    client_idle_timeout_ms: Option<u64>,

    /// Budget for a single request/response round trip
    #[arg(long = "message-timeout-ms", env = "MONGOPROXY_MESSAGE_TIMEOUT_MS")]
    message_timeout_ms: Option<u64>,

    /// Enable the playground middleware (logs queries, answers test.foo)
    #[arg(long = "playground", env = "MONGOPROXY_PLAYGROUND")]
    playground: bool,
}
