use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use oxgate_auth::JwtAuth;
use oxgate_core::{KvStore, MemoryRegistry, MemoryStore, ServiceRegistry};
use oxgate_gateway::{
    GatewayServer, HttpForwarder, ProxyPipeline, ResponseCache, TokenBucketLimiter,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Oxgate — reverse-proxy API gateway")]
struct Args {
    /// Path to config file (yaml/json/toml)
    #[arg(short, long, default_value = "./oxgate.yaml")]
    config: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = oxgate_config::load_config(&args.config)?;
    oxgate_tracing::init("oxgate", &cfg.gateway.logging_mode)?;

    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let registry: Arc<dyn ServiceRegistry> = Arc::new(MemoryRegistry::new());

    for service in &cfg.services {
        match service.validate() {
            Ok(()) => match registry.create(service.clone()).await {
                Ok(created) => info!(service = %created.name, id = %created.id, "service registered"),
                Err(e) => warn!(service = %service.name, error = %e, "service registration failed"),
            },
            Err(e) => warn!(service = %service.name, error = %e, "service config invalid"),
        }
    }

    let auth = Arc::new(JwtAuth::new(
        cfg.auth.secret.clone(),
        cfg.auth.issuer.clone(),
        Duration::from_secs(cfg.auth.expiration_secs),
    ));
    let limiter = TokenBucketLimiter::with_window(
        store.clone(),
        Duration::from_secs(cfg.rate_limit.window_secs),
    );
    let cache = ResponseCache::new(store.clone());
    let forwarder = Arc::new(HttpForwarder::new());

    let pipeline = Arc::new(ProxyPipeline::new(
        registry.clone(),
        auth,
        limiter,
        cache,
        forwarder,
    ));
    let server = Arc::new(GatewayServer::new(pipeline, registry));

    let addr: SocketAddr = format!("{}:{}", cfg.gateway.host, cfg.gateway.port).parse()?;
    server.serve(addr).await
}
