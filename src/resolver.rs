use crate::dns::DNSPacket;
use crate::dns::common::fqdn;
use crate::error::LookupError;
use crate::record::RecordType;
use crate::resolv_conf::NameserverSet;
use crate::transport::DnsExchange;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends one recursive question down an ordered nameserver list.
///
/// The first transport failure aborts the whole query. A NOERROR or NXDOMAIN
/// response from any server is returned as is. Any other rcode moves on to
/// the next server.
#[derive(Clone)]
pub struct ResolverClient {
    transport: Arc<dyn DnsExchange>,
}

impl ResolverClient {
    pub fn new(transport: Arc<dyn DnsExchange>) -> Self {
        Self { transport }
    }

    pub async fn query(
        &self,
        nameservers: &NameserverSet,
        name: &str,
        rtype: RecordType,
    ) -> Result<DNSPacket, LookupError> {
        if nameservers.is_empty() {
            return Err(LookupError::NoNameservers);
        }

        let qname = fqdn(name);
        let query = DNSPacket::query(rand::random::<u16>(), &qname, rtype.into()).map_err(
            |source| LookupError::InvalidName {
                name: qname.clone(),
                source,
            },
        )?;

        for server in &nameservers.servers {
            debug!("Querying {} for {} {}", server, qname, rtype);

            let response = self.transport.exchange(&query, *server).await.map_err(|source| {
                warn!("Nameserver {} failed for {}: {}", server, qname, source);
                LookupError::Transport {
                    name: qname.clone(),
                    source,
                }
            })?;

            if response.is_success() || response.is_nxdomain() {
                return Ok(response);
            }

            debug!(
                "Nameserver {} answered rcode {} for {}, trying next",
                server, response.header.rcode, qname
            );
        }

        Err(LookupError::NoNameserverAnswered)
    }
}
