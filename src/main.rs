use clap::Parser;
use dns_api::{
    LookupService,
    config::{ApiConfig, Cli},
    http_server::{AppState, HttpServer},
    nameserver_reload::NameserverReloader,
    rate_limiter::{RateLimiter, RedisCounterStore},
    stats::{GraphiteSink, ServiceStats, spawn_flush_task},
    transport::UdpExchange,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = ApiConfig::from_env()?;
    Cli::parse().apply(&mut config)?;

    let transport = Arc::new(UdpExchange::new(config.query_timeout));
    let lookup = Arc::new(LookupService::from_resolv_conf(
        transport,
        &config.resolv_conf,
    )?);

    if config.watch_resolv_conf {
        if let Some(reloader) = NameserverReloader::new(lookup.clone()) {
            reloader.start();
        }
    }

    let rate_limiter = match &config.redis_server {
        Some(address) => {
            let store = RedisCounterStore::connect(address).await?;
            if let Err(e) = store.ping().await {
                warn!("Redis at {} did not answer PING: {}", address, e);
            }
            info!(
                "Rate limiting enabled: {} requests per hour per client",
                config.rate_limit_config.hourly_limit
            );
            Some(Arc::new(RateLimiter::new(
                Arc::new(store),
                config.rate_limit_config.clone(),
            )))
        }
        None => {
            info!("No redis server configured, rate limiting disabled");
            None
        }
    };

    let stats = Arc::new(ServiceStats::new()?);
    if let Some(metrics) = config.metrics.clone() {
        spawn_flush_task(
            stats.clone(),
            GraphiteSink::new(metrics),
            config.metrics_interval,
        );
    }

    let state = AppState::new(lookup, rate_limiter, stats);
    HttpServer::new(state, config.bind_addr).start().await
}
