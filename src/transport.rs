use crate::dns::DNSPacket;
use crate::dns::constants::MAX_UDP_PAYLOAD;
use crate::error::{DnsError, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Default read timeout for a single nameserver exchange
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends one query to one nameserver and waits for its answer
#[async_trait]
pub trait DnsExchange: Send + Sync {
    async fn exchange(&self, query: &DNSPacket, server: SocketAddr) -> Result<DNSPacket>;
}

/// Plain UDP transport, one socket per exchange
#[derive(Debug, Clone)]
pub struct UdpExchange {
    timeout: Duration,
}

impl Default for UdpExchange {
    fn default() -> Self {
        Self::new(DEFAULT_EXCHANGE_TIMEOUT)
    }
}

impl UdpExchange {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn send_udp_query(&self, query_bytes: &[u8], server: SocketAddr) -> Result<Vec<u8>> {
        let bind_addr = if server.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(server).await?;
        socket.send(query_bytes).await?;

        let mut response_buf = vec![0u8; MAX_UDP_PAYLOAD];
        let response_len = socket.recv(&mut response_buf).await?;
        response_buf.truncate(response_len);
        Ok(response_buf)
    }
}

#[async_trait]
impl DnsExchange for UdpExchange {
    async fn exchange(&self, query: &DNSPacket, server: SocketAddr) -> Result<DNSPacket> {
        let query_bytes = query.serialize()?;
        trace!("Sending {} byte query to {}", query_bytes.len(), server);

        let response_bytes = timeout(self.timeout, self.send_udp_query(&query_bytes, server))
            .await
            .map_err(|_| DnsError::Timeout(self.timeout))??;

        let response = DNSPacket::parse(&response_bytes)?;
        if response.header.id != query.header.id {
            return Err(DnsError::IdMismatch {
                expected: query.header.id,
                got: response.header.id,
            });
        }

        debug!(
            "Response from {}: rcode={}, answers={}, {} bytes",
            server,
            response.header.rcode,
            response.answers.len(),
            response_bytes.len()
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::constants::DNSRcode;
    use crate::dns::enums::DNSResourceType;

    #[tokio::test]
    async fn test_udp_exchange_against_local_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let query = DNSPacket::parse(&buf[..len]).unwrap();
            let reply = query.response(DNSRcode::NXDOMAIN).serialize().unwrap();
            server.send_to(&reply, peer).await.unwrap();
        });

        let query = DNSPacket::query(4242, "nope.example.", DNSResourceType::A).unwrap();
        let response = UdpExchange::default()
            .exchange(&query, server_addr)
            .await
            .unwrap();
        assert!(response.is_nxdomain());
        assert_eq!(response.header.id, 4242);
    }

    #[tokio::test]
    async fn test_udp_exchange_times_out() {
        // Bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let query = DNSPacket::query(1, "example.com.", DNSResourceType::A).unwrap();

        let err = UdpExchange::new(Duration::from_millis(100))
            .exchange(&query, silent.local_addr().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, DnsError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_mismatched_id_rejected() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let mut reply = DNSPacket::parse(&buf[..len]).unwrap().response(0);
            reply.header.id = reply.header.id.wrapping_add(1);
            server.send_to(&reply.serialize().unwrap(), peer).await.unwrap();
        });

        let query = DNSPacket::query(10, "example.com.", DNSResourceType::A).unwrap();
        let err = UdpExchange::default()
            .exchange(&query, server_addr)
            .await
            .unwrap_err();
        assert_eq!(err, DnsError::IdMismatch { expected: 10, got: 11 });
    }
}
