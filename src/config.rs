use crate::error::ConfigError;
use crate::rate_limiter::RateLimitConfig;
use crate::resolv_conf::DEFAULT_RESOLV_CONF;
use crate::stats::GraphiteProtocol;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_GRAPHITE_PORT: u16 = 2003;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,

    /// Redis server holding rate limit counters (None = rate limiting disabled)
    pub redis_server: Option<String>,

    /// Rate limiting configuration, only used with a Redis server
    pub rate_limit_config: RateLimitConfig,

    /// Read timeout for one nameserver exchange
    pub query_timeout: Duration,

    /// Resolver configuration file listing the nameservers
    pub resolv_conf: PathBuf,

    /// Reload nameservers when the resolver configuration changes
    pub watch_resolv_conf: bool,

    /// Graphite destination for periodic statistics (None = disabled)
    pub metrics: Option<MetricsConfig>,

    /// How often statistics are flushed to Graphite
    pub metrics_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    pub host: String,
    pub port: u16,
    pub protocol: GraphiteProtocol,
    /// Log every metric line as it is sent
    pub verbose: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9999)),
            redis_server: None,
            rate_limit_config: RateLimitConfig::default(),
            query_timeout: Duration::from_secs(5),
            resolv_conf: PathBuf::from(DEFAULT_RESOLV_CONF),
            watch_resolv_conf: false,
            metrics: None,
            metrics_interval: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    /// Create an ApiConfig from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = var("DNSAPI_HOST") {
            let ip: IpAddr = host
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddress(host))?;
            config.bind_addr.set_ip(ip);
        }

        if let Some(port) = var("DNSAPI_PORT") {
            config.bind_addr.set_port(
                port.parse::<u16>()
                    .map_err(|_| ConfigError::InvalidPort(port))?,
            );
        }

        if let Some(redis) = var("DNSAPI_REDIS_SERVER").or_else(|| var("REDIS_URL")) {
            if !redis.is_empty() {
                config.redis_server = Some(redis);
            }
        }

        if let Some(limit) = var("DNSAPI_RATE_LIMIT") {
            config.rate_limit_config.hourly_limit = limit
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidRateLimit(limit))?;
        }

        if let Some(ms) = var("DNSAPI_RATE_LIMIT_TIMEOUT_MS") {
            let ms = ms
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(ms))?;
            config.rate_limit_config.store_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = var("DNSAPI_QUERY_TIMEOUT") {
            let secs = secs
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(secs))?;
            config.query_timeout = Duration::from_secs(secs);
        }

        if let Some(path) = var("DNSAPI_RESOLV_CONF") {
            config.resolv_conf = PathBuf::from(path);
        }

        if let Some(watch) = var("DNSAPI_WATCH_RESOLV_CONF") {
            config.watch_resolv_conf = parse_bool(&watch, false);
        }

        if let Some(secs) = var("DNSAPI_METRICS_INTERVAL") {
            let secs = secs
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(secs))?;
            config.metrics_interval = Duration::from_secs(secs);
        }

        config.metrics = match MetricsConfig::from_lookup(&var) {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Metrics disabled: {}", e);
                None
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_server.is_some() && self.rate_limit_config.hourly_limit == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "Hourly limit must be greater than 0 when rate limiting is enabled".to_string(),
            ));
        }

        if self.query_timeout.is_zero() || self.query_timeout.as_secs() > 300 {
            return Err(ConfigError::InvalidTimeout(
                "Query timeout must be between 1 and 300 seconds".to_string(),
            ));
        }

        if self.rate_limit_config.store_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "Rate limit store timeout must be greater than 0".to_string(),
            ));
        }

        if self.metrics.is_some() && self.metrics_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "Metrics interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl MetricsConfig {
    /// Read `METRICS_HOST` (or `METRICS`), `METRICS_PROTOCOL` and `METRICS_VERBOSE`
    fn from_lookup<F>(var: &F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(target) = var("METRICS_HOST")
            .or_else(|| var("METRICS"))
            .filter(|h| !h.is_empty())
        else {
            return Ok(None);
        };

        let (host, port) = split_host_port(&target);
        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidMetricsHost(target.clone()))?,
            None => DEFAULT_GRAPHITE_PORT,
        };

        let protocol = match var("METRICS_PROTOCOL").as_deref() {
            None | Some("") => GraphiteProtocol::Udp,
            Some(p) => p
                .parse()
                .map_err(|_| ConfigError::ParseError(format!("Invalid metrics protocol: {}", p)))?,
        };

        Ok(Some(Self {
            host,
            port,
            protocol,
            verbose: var("METRICS_VERBOSE").is_some_and(|v| !v.is_empty()),
        }))
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Split `host:port`, `[v6]:port`, or a bare host
fn split_host_port(target: &str) -> (String, Option<&str>) {
    if let Some(rest) = target.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            return (host.to_string(), tail.strip_prefix(':'));
        }
    }
    match target.rsplit_once(':') {
        // A bare IPv6 literal has several colons and no port
        Some((host, port)) if !host.contains(':') => (host.to_string(), Some(port)),
        _ => (target.to_string(), None),
    }
}

/// Parse a boolean from a string, with a default value for invalid input
fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

/// Command line flags; anything given here overrides the environment
#[derive(Debug, Default, Parser)]
#[command(name = "dns-api", version, about = "DNS lookups over HTTP")]
pub struct Cli {
    /// The IP to bind upon
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// The port to bind upon
    #[arg(long)]
    pub port: Option<u16>,

    /// The address of a redis-server to store rate-limiting data
    #[arg(long = "redis-server")]
    pub redis_server: Option<String>,

    /// Requests allowed per client per hour
    #[arg(long = "rate-limit")]
    pub rate_limit: Option<u32>,

    /// Resolver configuration listing the nameservers
    #[arg(long = "resolv-conf")]
    pub resolv_conf: Option<PathBuf>,

    /// Reload nameservers when the resolver configuration changes
    #[arg(long = "watch-resolv-conf")]
    pub watch_resolv_conf: bool,
}

impl Cli {
    pub fn apply(self, config: &mut ApiConfig) -> Result<(), ConfigError> {
        if let Some(host) = self.host {
            config.bind_addr.set_ip(host);
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(redis) = self.redis_server.filter(|r| !r.is_empty()) {
            config.redis_server = Some(redis);
        }
        if let Some(limit) = self.rate_limit {
            config.rate_limit_config.hourly_limit = limit;
        }
        if let Some(path) = self.resolv_conf {
            config.resolv_conf = path;
        }
        if self.watch_resolv_conf {
            config.watch_resolv_conf = true;
        }
        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ApiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr.port(), 9999);
        assert_eq!(config.rate_limit_config.hourly_limit, 200);
        assert!(config.redis_server.is_none());
        assert_eq!(config.query_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_env_overrides() {
        let config = from_vars(&[
            ("DNSAPI_HOST", "0.0.0.0"),
            ("DNSAPI_PORT", "8080"),
            ("DNSAPI_REDIS_SERVER", "localhost:6379"),
            ("DNSAPI_RATE_LIMIT", "50"),
            ("DNSAPI_WATCH_RESOLV_CONF", "yes"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.redis_server.as_deref(), Some("localhost:6379"));
        assert_eq!(config.rate_limit_config.hourly_limit, 50);
        assert!(config.watch_resolv_conf);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            from_vars(&[("DNSAPI_PORT", "http")]),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            from_vars(&[("DNSAPI_QUERY_TIMEOUT", "0")]),
            Err(ConfigError::InvalidTimeout(_))
        ));
        assert!(matches!(
            from_vars(&[("DNSAPI_REDIS_SERVER", "redis:6379"), ("DNSAPI_RATE_LIMIT", "0")]),
            Err(ConfigError::InvalidRateLimit(_))
        ));
    }

    #[test]
    fn test_metrics_from_env() {
        let config = from_vars(&[("METRICS", "graphite.example.com")]).unwrap();
        let metrics = config.metrics.unwrap();
        assert_eq!(metrics.port, DEFAULT_GRAPHITE_PORT);
        assert_eq!(metrics.protocol, GraphiteProtocol::Udp);
        assert!(!metrics.verbose);

        let config = from_vars(&[
            ("METRICS_HOST", "[::1]:2004"),
            ("METRICS_PROTOCOL", "tcp"),
            ("METRICS_VERBOSE", "1"),
        ])
        .unwrap();
        let metrics = config.metrics.unwrap();
        assert_eq!(metrics.host, "::1");
        assert_eq!(metrics.port, 2004);
        assert_eq!(metrics.address(), "[::1]:2004");
        assert_eq!(metrics.protocol, GraphiteProtocol::Tcp);
        assert!(metrics.verbose);

        assert!(from_vars(&[]).unwrap().metrics.is_none());
    }

    #[test]
    fn test_bad_metrics_target_disables_metrics() {
        let config = from_vars(&[("METRICS_HOST", "host:port"), ("DNSAPI_PORT", "8080")]).unwrap();
        assert!(config.metrics.is_none());
        assert_eq!(config.bind_addr.port(), 8080);

        let config = from_vars(&[("METRICS", "graphite:2003"), ("METRICS_PROTOCOL", "smtp")]).unwrap();
        assert!(config.metrics.is_none());
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = from_vars(&[("DNSAPI_PORT", "8080")]).unwrap();
        let cli = Cli::parse_from([
            "dns-api",
            "--port",
            "9000",
            "--redis-server",
            "127.0.0.1:6379",
            "--rate-limit",
            "10",
        ]);
        cli.apply(&mut config).unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.redis_server.as_deref(), Some("127.0.0.1:6379"));
        assert_eq!(config.rate_limit_config.hourly_limit, 10);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true", false));
        assert!(parse_bool("ON", false));
        assert!(!parse_bool("0", true));
        assert!(parse_bool("invalid", true));
        assert!(!parse_bool("invalid", false));
    }
}
