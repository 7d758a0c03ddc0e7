use crate::dns::constants::DNS_PORT;
use crate::error::ConfigError;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use tracing::{debug, warn};

pub const DEFAULT_RESOLV_CONF: &str = "/etc/resolv.conf";

/// Nameservers and options read from a resolv.conf file.
///
/// Servers keep the order in which they appear in the file. Only `servers`
/// affects lookups. Names are always queried as given and the exchange
/// timeout comes from `ApiConfig::query_timeout`, so `search`, `ndots`,
/// `timeout_secs` and `attempts` are informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameserverSet {
    pub servers: Vec<SocketAddr>,
    pub search: Vec<String>,
    pub ndots: u8,
    pub timeout_secs: u64,
    pub attempts: u8,
}

impl Default for NameserverSet {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            search: Vec::new(),
            ndots: 1,
            timeout_secs: 5,
            attempts: 2,
        }
    }
}

impl NameserverSet {
    /// Build a set from explicit addresses
    pub fn from_servers(servers: Vec<SocketAddr>) -> Self {
        Self {
            servers,
            ..Default::default()
        }
    }

    /// Read and parse a resolv.conf file, failing when it yields no servers
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ResolvConfUnreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let set = Self::parse(&contents);
        if set.is_empty() {
            return Err(ConfigError::NoNameservers(path.display().to_string()));
        }

        debug!("Loaded {} nameservers from {}", set.servers.len(), path.display());
        Ok(set)
    }

    pub fn parse(contents: &str) -> Self {
        let mut set = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let Some(keyword) = fields.next() else {
                continue;
            };

            match keyword {
                "nameserver" => {
                    if let Some(addr) = fields.next() {
                        match parse_server(addr) {
                            Some(ip) => set.servers.push(SocketAddr::new(ip, DNS_PORT)),
                            None => warn!("Ignoring invalid nameserver entry: {}", addr),
                        }
                    }
                }
                // The last of "domain" and "search" wins
                "domain" => {
                    set.search = fields.next().map(|d| vec![d.to_string()]).unwrap_or_default();
                }
                "search" => {
                    set.search = fields.map(|d| d.to_string()).collect();
                }
                "options" => {
                    for option in fields {
                        set.apply_option(option);
                    }
                }
                _ => {}
            }
        }

        set
    }

    fn apply_option(&mut self, option: &str) {
        let Some((name, value)) = option.split_once(':') else {
            return;
        };
        match name {
            "ndots" => {
                if let Ok(n) = value.parse::<u8>() {
                    self.ndots = n.min(15);
                }
            }
            "timeout" => {
                if let Ok(n) = value.parse::<u64>() {
                    self.timeout_secs = n.max(1);
                }
            }
            "attempts" => {
                if let Ok(n) = value.parse::<u8>() {
                    self.attempts = n.max(1);
                }
            }
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Parse an IP literal, dropping any IPv6 zone suffix such as `%eth0`
fn parse_server(addr: &str) -> Option<IpAddr> {
    let addr = addr.split('%').next().unwrap_or(addr);
    addr.parse().ok()
}
