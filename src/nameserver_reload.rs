use crate::lookup::LookupService;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Reloads the nameserver set when resolv.conf changes or on SIGHUP
pub struct NameserverReloader {
    lookup: Arc<LookupService>,
    path: PathBuf,
}

impl NameserverReloader {
    /// Returns `None` when the lookup service was not built from a file
    pub fn new(lookup: Arc<LookupService>) -> Option<Self> {
        let path = lookup.resolv_conf_path()?.to_path_buf();
        Some(Self { lookup, path })
    }

    /// Spawn the file watcher and signal handler
    pub fn start(self) {
        info!("Watching {} for nameserver changes", self.path.display());
        let reloader = Arc::new(self);

        let watcher = reloader.clone();
        tokio::spawn(async move {
            if let Err(e) = watcher.watch_file().await {
                error!("resolv.conf watcher error: {}", e);
            }
        });

        reloader.start_signal_handler();
    }

    fn reload(&self, reason: &str) {
        match self.lookup.refresh() {
            Ok(set) => info!(
                "Reloaded {} nameservers ({})",
                set.servers.len(),
                reason
            ),
            Err(e) => warn!("Keeping previous nameservers, reload failed: {}", e),
        }
    }

    async fn watch_file(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher: RecommendedWatcher = Watcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if let Err(e) = tx.send(event) {
                        error!("Failed to send file watch event: {}", e);
                    }
                }
                Err(e) => error!("File watch error: {}", e),
            },
            notify::Config::default(),
        )?;

        // resolv.conf is commonly replaced through a rename, so watch the directory
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let file_name = self.path.file_name();
        while let Some(event) = rx.recv().await {
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                continue;
            }
            if !event.paths.iter().any(|p| p.file_name() == file_name) {
                continue;
            }

            debug!("resolv.conf changed: {:?}", event.paths);
            // Let the writer finish
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            self.reload("file changed");
        }

        Ok(())
    }

    fn start_signal_handler(self: &Arc<Self>) {
        #[cfg(unix)]
        {
            let reloader = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{SignalKind, signal};

                let mut sighup = match signal(SignalKind::hangup()) {
                    Ok(s) => s,
                    Err(e) => {
                        error!("Failed to install SIGHUP handler: {}", e);
                        return;
                    }
                };

                while sighup.recv().await.is_some() {
                    info!("Received SIGHUP, reloading nameservers");
                    reloader.reload("SIGHUP");
                }
            });
        }
    }
}
