pub mod assets;
pub mod config;
pub mod dns;
pub mod error;
pub mod http_server;
pub mod lookup;
pub mod nameserver_reload;
pub mod rate_limiter;
pub mod record;
pub mod resolv_conf;
pub mod resolver;
pub mod stats;
pub mod transport;

pub use dns::DNSPacket;
pub use lookup::LookupService;
pub use record::{NormalizedRecord, RecordType};
