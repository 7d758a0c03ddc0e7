use crate::config::MetricsConfig;
use crate::record::RecordType;
use prometheus::{Encoder, IntCounter, IntCounterVec, Registry, TextEncoder, opts};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lookup counters, exported both as Prometheus text and as Graphite lines
pub struct ServiceStats {
    registry: Registry,
    lookups_by_type: IntCounterVec,
    queries: IntCounter,
    errors: IntCounter,
}

impl ServiceStats {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let lookups_by_type = IntCounterVec::new(
            opts!(
                "dns_lookups_by_type_total",
                "Lookups served, by record type"
            ),
            &["type"],
        )?;

        let queries = IntCounter::with_opts(opts!(
            "dns_queries_total",
            "Lookups that returned an answer"
        ))?;

        let errors = IntCounter::with_opts(opts!(
            "dns_errors_total",
            "Lookups that failed or returned no records"
        ))?;

        registry.register(Box::new(lookups_by_type.clone()))?;
        registry.register(Box::new(queries.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            lookups_by_type,
            queries,
            errors,
        })
    }

    /// Count one lookup of `rtype`
    pub fn record(&self, rtype: RecordType, success: bool) {
        self.lookups_by_type
            .with_label_values(&[rtype.as_str()])
            .inc();
        if success {
            self.queries.inc();
        } else {
            self.errors.inc();
        }
    }

    /// Counters under their Graphite keys. Keys that were never incremented are absent.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let mut metrics = BTreeMap::new();

        for rtype in RecordType::ALL {
            if let Ok(counter) = self
                .lookups_by_type
                .get_metric_with_label_values(&[rtype.as_str()])
            {
                let value = counter.get();
                if value > 0 {
                    metrics.insert(format!("dns.type.{}", rtype), value);
                }
            }
        }

        if self.queries.get() > 0 {
            metrics.insert("dns.queries".to_string(), self.queries.get());
        }
        if self.errors.get() > 0 {
            metrics.insert("dns.errors".to_string(), self.errors.get());
        }

        metrics
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphiteProtocol {
    #[default]
    Udp,
    Tcp,
}

impl FromStr for GraphiteProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(GraphiteProtocol::Udp),
            "tcp" => Ok(GraphiteProtocol::Tcp),
            other => Err(format!("unknown protocol {}", other)),
        }
    }
}

/// Render metrics in the Graphite plaintext protocol
pub fn format_lines(metrics: &BTreeMap<String, u64>, timestamp: i64) -> String {
    metrics
        .iter()
        .map(|(key, value)| format!("{} {} {}\n", key, value, timestamp))
        .collect()
}

/// Pushes snapshots to a Graphite carbon listener
pub struct GraphiteSink {
    config: MetricsConfig,
}

impl GraphiteSink {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    pub async fn send(&self, metrics: &BTreeMap<String, u64>) -> std::io::Result<()> {
        if metrics.is_empty() {
            return Ok(());
        }

        let payload = format_lines(metrics, chrono::Utc::now().timestamp());
        if self.config.verbose {
            for line in payload.lines() {
                info!("graphite: {}", line);
            }
        }

        let address = self.config.address();
        match self.config.protocol {
            GraphiteProtocol::Udp => {
                let target = tokio::net::lookup_host(&address).await?.next().ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("cannot resolve {}", address),
                    )
                })?;
                let bind = if target.is_ipv4() {
                    "0.0.0.0:0"
                } else {
                    "[::]:0"
                };
                let socket = UdpSocket::bind(bind).await?;
                socket.send_to(payload.as_bytes(), target).await?;
            }
            GraphiteProtocol::Tcp => {
                let mut stream = TcpStream::connect(&address).await?;
                stream.write_all(payload.as_bytes()).await?;
                stream.shutdown().await?;
            }
        }

        debug!("Sent {} metrics to {}", metrics.len(), address);
        Ok(())
    }
}

/// Flush a snapshot to Graphite every `interval` until the runtime stops
pub fn spawn_flush_task(
    stats: Arc<ServiceStats>,
    sink: GraphiteSink,
    interval: Duration,
) -> JoinHandle<()> {
    info!(
        "Sending metrics to {} ({:?}) every {:?}",
        sink.config.address(),
        sink.config.protocol,
        interval
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = sink.send(&stats.snapshot()).await {
                warn!("Failed to send metrics to graphite: {}", e);
            }
        }
    })
}
