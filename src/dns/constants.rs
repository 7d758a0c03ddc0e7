/// DNS Response Code constants from RFC 1035
pub struct DNSRcode;

impl DNSRcode {
    pub const NOERROR: u8 = 0; // No error
    pub const FORMERR: u8 = 1; // Format error
    pub const SERVFAIL: u8 = 2; // Server failure
    pub const NXDOMAIN: u8 = 3; // Name error
    pub const NOTIMP: u8 = 4; // Not implemented
    pub const REFUSED: u8 = 5; // Query refused
}

/// Standard DNS port used for every nameserver read from resolv.conf
pub const DNS_PORT: u16 = 53;

/// Largest UDP response we are prepared to receive
pub const MAX_UDP_PAYLOAD: usize = 4096;
