use crate::dns::common::fqdn;
use crate::error::{ConfigError, LookupError};
use crate::record::{NormalizedRecord, RecordType, normalize_all};
use crate::resolv_conf::NameserverSet;
use crate::resolver::ResolverClient;
use crate::transport::DnsExchange;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves `(name, type)` pairs into normalized records.
///
/// The nameserver set is loaded once and only replaced by [`refresh`].
///
/// [`refresh`]: LookupService::refresh
pub struct LookupService {
    resolver: ResolverClient,
    nameservers: RwLock<Arc<NameserverSet>>,
    resolv_conf: Option<PathBuf>,
}

impl LookupService {
    pub fn new(transport: Arc<dyn DnsExchange>, nameservers: NameserverSet) -> Self {
        Self {
            resolver: ResolverClient::new(transport),
            nameservers: RwLock::new(Arc::new(nameservers)),
            resolv_conf: None,
        }
    }

    /// Load nameservers from a resolv.conf file.
    ///
    /// Fails when the file cannot be read or lists no nameservers.
    pub fn from_resolv_conf(
        transport: Arc<dyn DnsExchange>,
        path: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let nameservers = NameserverSet::load(path)?;
        info!(
            "Using {} nameservers from {}: {:?}",
            nameservers.servers.len(),
            path.display(),
            nameservers.servers
        );

        let mut service = Self::new(transport, nameservers);
        service.resolv_conf = Some(path.to_path_buf());
        Ok(service)
    }

    /// Current nameserver snapshot
    pub fn nameservers(&self) -> Arc<NameserverSet> {
        self.nameservers.read().clone()
    }

    pub fn resolv_conf_path(&self) -> Option<&Path> {
        self.resolv_conf.as_deref()
    }

    /// Re-read the resolv.conf file. On failure the previous set stays active.
    pub fn refresh(&self) -> Result<Arc<NameserverSet>, ConfigError> {
        let Some(path) = &self.resolv_conf else {
            return Ok(self.nameservers());
        };

        let fresh = Arc::new(NameserverSet::load(path)?);
        let mut current = self.nameservers.write();
        if **current != *fresh {
            info!(
                "Nameservers changed: {:?} -> {:?}",
                current.servers, fresh.servers
            );
        }
        *current = fresh.clone();
        Ok(fresh)
    }

    pub async fn lookup(
        &self,
        name: &str,
        rtype: RecordType,
    ) -> Result<Vec<NormalizedRecord>, LookupError> {
        let nameservers = self.nameservers();
        let response = self.resolver.query(&nameservers, name, rtype).await?;

        if response.is_nxdomain() {
            debug!("NXDOMAIN for {} {}", name, rtype);
            return Err(LookupError::NoSuchDomain(fqdn(name)));
        }

        let records = normalize_all(&response.answers);
        debug!(
            "{} {} -> {} records ({} answers)",
            name,
            rtype,
            records.len(),
            response.answers.len()
        );
        Ok(records)
    }
}
