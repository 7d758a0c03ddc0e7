use thiserror::Error;

/// Errors raised while encoding, decoding or exchanging DNS messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid DNS header")]
    InvalidHeader,

    #[error("Invalid DNS label")]
    InvalidLabel,

    #[error("Label too long: {0} octets")]
    LabelTooLong(usize),

    #[error("DNS name too long")]
    NameTooLong,

    #[error("Invalid compression pointer at offset {0}")]
    BadPointer(usize),

    #[error("Message truncated: need {need} bytes, have {have} bytes")]
    Truncated { need: usize, have: usize },

    #[error("Invalid {rtype} record data: {reason}")]
    InvalidRecordData { rtype: u16, reason: &'static str },

    #[error("Upstream query timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Response id {got} does not match query id {expected}")]
    IdMismatch { expected: u16, got: u16 },
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DnsError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid metrics host: {0}")]
    InvalidMetricsHost(String),

    #[error("Cannot read resolver configuration {path}: {reason}")]
    ResolvConfUnreadable { path: String, reason: String },

    #[error("No nameservers found in {0}")]
    NoNameservers(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

/// Outcome of a failed lookup, as seen by the HTTP front
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("No nameservers configured")]
    NoNameservers,

    #[error("Cannot retrieve the list of name servers for {name}: {source}")]
    Transport {
        name: String,
        #[source]
        source: DnsError,
    },

    #[error("No name server to answer the question")]
    NoNameserverAnswered,

    #[error("No such domain {0}")]
    NoSuchDomain(String),

    #[error("Invalid domain name {name}: {source}")]
    InvalidName {
        name: String,
        #[source]
        source: DnsError,
    },
}

impl LookupError {
    /// NXDOMAIN is an expected answer rather than a service failure
    pub fn is_nxdomain(&self) -> bool {
        matches!(self, LookupError::NoSuchDomain(_))
    }
}

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Rate limit store did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("No embedded resource named {0}")]
    NotFound(String),
}
