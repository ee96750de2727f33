//! The worker: one version of the offline layer bound to its caches,
//! queue and network.

use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use url::Url;

use harbor_cache::{CacheNamespace, CacheStore, PartitionHandle, PruneReport, Purpose};
use harbor_common::{Error, Request, RequestKey, Response, Result};
use harbor_net::Fetcher;
use harbor_sync::{PendingStore, SyncEngine, SyncReport};

use crate::config::WorkerConfig;
use crate::control::{ControlEnvelope, ControlMessage, ControlOutcome};
use crate::lifecycle::Registration;
use crate::router::{Route, Router};
use crate::strategy::{CacheFirst, NetworkFirst, Strategy};

/// Result of handling an intercepted request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchDisposition {
    /// The worker answered.
    Respond(Response),
    /// Not handled; the host sends the request to the network untouched.
    PassThrough,
}

/// Result of the install step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub version: String,
    /// URLs stored in their partition.
    pub cached: Vec<String>,
    /// URLs that could not be cached, with the reason.
    pub failed: Vec<(String, String)>,
}

/// A worker version.
pub struct Worker {
    config: WorkerConfig,
    scope: Url,
    namespace: CacheNamespace,
    fetcher: Arc<dyn Fetcher>,
    router: Router,
    network_first: NetworkFirst,
    cache_first: CacheFirst,
    sync: SyncEngine,
    registration: Mutex<Registration>,
}

impl Worker {
    /// Build a worker from its configuration and injected capabilities.
    ///
    /// # Errors
    /// - Configuration fails validation
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn CacheStore>,
        queue: Arc<dyn PendingStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let scope = config.scope_url()?;
        let namespace = CacheNamespace::new(store, &config.cache_prefix, &config.version)?;
        let offline_document = RequestKey::get(&config.offline_document_url()?);

        let network_first = NetworkFirst::new(
            fetcher.clone(),
            namespace.handle(Purpose::Shell),
            namespace.handle(Purpose::OfflineFallback),
            offline_document,
        );
        let cache_first = CacheFirst::new(fetcher.clone(), namespace.handle(Purpose::ExternalApi));

        Ok(Self {
            router: Router::new(&scope),
            registration: Mutex::new(Registration::new(scope.as_str())),
            sync: SyncEngine::new(queue, fetcher.clone()),
            config,
            scope,
            namespace,
            fetcher,
            network_first,
            cache_first,
        })
    }

    /// Resume from a previously saved registration.
    pub fn with_registration(self, registration: Registration) -> Self {
        *self.lock_registration() = registration;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn namespace(&self) -> &CacheNamespace {
        &self.namespace
    }

    pub fn fetcher(&self) -> Arc<dyn Fetcher> {
        self.fetcher.clone()
    }

    /// The pending-operation queue the foreground enqueues into.
    pub fn queue(&self) -> Arc<dyn PendingStore> {
        self.sync.queue()
    }

    /// Snapshot of the lifecycle state.
    pub fn registration(&self) -> Registration {
        self.lock_registration().clone()
    }

    fn lock_registration(&self) -> MutexGuard<'_, Registration> {
        self.registration.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install this version: pre-cache the shell assets and the offline
    /// document, then move to waiting.
    ///
    /// Individual assets that fail are reported, not fatal.
    ///
    /// # Errors
    /// - A partition cannot be opened
    pub async fn install(&self) -> Result<InstallReport> {
        self.lock_registration().begin_install(self.version());
        info!("Installing worker {}", self.version());

        let report = match self.precache_all().await {
            Ok(report) => report,
            Err(e) => {
                self.lock_registration().fail_install();
                return Err(e);
            }
        };

        self.lock_registration().complete_install()?;
        info!(
            "Installed worker {}: {} cached, {} failed",
            report.version,
            report.cached.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn precache_all(&self) -> Result<InstallReport> {
        let shell = self.namespace.open(Purpose::Shell).await?;
        let offline = self.namespace.open(Purpose::OfflineFallback).await?;

        let mut report = InstallReport {
            version: self.version().to_string(),
            ..InstallReport::default()
        };

        let (cached, failed) = precache(&*self.fetcher, &shell, self.config.critical_asset_urls()?).await;
        report.cached.extend(cached);
        report.failed.extend(failed);

        let (cached, failed) =
            precache(&*self.fetcher, &offline, vec![self.config.offline_document_url()?]).await;
        report.cached.extend(cached);
        report.failed.extend(failed);

        Ok(report)
    }

    /// Activate the waiting version: prune every partition outside this
    /// version's set, then promote.
    ///
    /// # Errors
    /// - Nothing is waiting, or the waiting version is not this one
    /// - The store cannot list its partitions; the version stays waiting
    pub async fn activate(&self) -> Result<PruneReport> {
        let waiting = self.lock_registration().begin_activate()?;
        if waiting != self.version() {
            self.lock_registration().fail_activate();
            return Err(Error::InvalidInput(format!(
                "Waiting version {} is not this worker ({})",
                waiting,
                self.version()
            )));
        }

        match self.namespace.activate_current().await {
            Ok(report) => {
                self.lock_registration().complete_activate()?;
                Ok(report)
            }
            Err(e) => {
                warn!("Activation of {} failed: {}", waiting, e);
                self.lock_registration().fail_activate();
                Err(e)
            }
        }
    }

    /// Activate only if no client is controlled by the previous version.
    ///
    /// Returns `None` when activation has to wait.
    pub async fn activate_if_idle(&self, clients: usize) -> Result<Option<PruneReport>> {
        if !self.lock_registration().may_activate(clients, false) {
            debug!("Worker {} keeps waiting ({} clients)", self.version(), clients);
            return Ok(None);
        }
        self.activate().await.map(Some)
    }

    /// Handle an intercepted request.
    ///
    /// Never fails: network and storage errors are absorbed by the
    /// strategies.
    pub async fn handle_fetch(&self, request: &Request) -> FetchDisposition {
        let route = self.router.classify(request);
        let strategy: &dyn Strategy = match route {
            Route::PassThrough => {
                debug!("Passing through {} {}", request.method, request.url);
                return FetchDisposition::PassThrough;
            }
            Route::SameOrigin => &self.network_first,
            Route::CrossOrigin => &self.cache_first,
        };

        debug!("{} {} via {}", request.method, request.url, strategy.name());
        FetchDisposition::Respond(strategy.handle(request).await)
    }

    /// Handle a raw control envelope. Malformed messages are ignored.
    pub async fn handle_envelope(&self, envelope: &ControlEnvelope) -> Result<ControlOutcome> {
        match ControlMessage::from_envelope(envelope) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                warn!("Ignoring control message {}: {}", envelope.kind, e);
                Ok(ControlOutcome::Ignored {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Handle a decoded control message.
    ///
    /// # Errors
    /// - CLEAR_CACHE: the store cannot list its partitions
    pub async fn handle_message(&self, message: ControlMessage) -> Result<ControlOutcome> {
        match message {
            ControlMessage::SkipWaiting => {
                if !self.lock_registration().may_activate(0, true) {
                    debug!("SKIP_WAITING with nothing waiting");
                    return Ok(ControlOutcome::NothingWaiting);
                }
                match self.activate().await {
                    Ok(report) => Ok(ControlOutcome::Activated {
                        version: self.version().to_string(),
                        report,
                    }),
                    Err(e) => Ok(ControlOutcome::Ignored {
                        reason: e.to_string(),
                    }),
                }
            }
            ControlMessage::ClearCache => Ok(ControlOutcome::Cleared(self.namespace.clear_all().await?)),
            ControlMessage::CacheUrls(urls) => {
                let shell = self.namespace.handle(Purpose::Shell);
                let mut resolved = Vec::with_capacity(urls.len());
                let mut failed = Vec::new();
                for url in urls {
                    match self.scope.join(&url) {
                        Ok(u) => resolved.push(u),
                        Err(e) => {
                            warn!("Cannot cache '{}': {}", url, e);
                            failed.push((url, e.to_string()));
                        }
                    }
                }

                let (cached, fetch_failed) = precache(&*self.fetcher, &shell, resolved).await;
                failed.extend(fetch_failed);
                Ok(ControlOutcome::Cached { cached, failed })
            }
            ControlMessage::Unknown(kind) => {
                debug!("Ignoring unknown control message type {}", kind);
                Ok(ControlOutcome::Ignored {
                    reason: format!("Unknown message type: {}", kind),
                })
            }
        }
    }

    /// Handle a background sync trigger.
    ///
    /// Returns `None` for tags this worker does not own.
    ///
    /// # Errors
    /// - The replay cycle failed as a whole; the trigger source should
    ///   reschedule
    pub async fn handle_sync(&self, tag: &str) -> Result<Option<SyncReport>> {
        if tag != self.config.sync_tag {
            debug!("Ignoring sync tag {}", tag);
            return Ok(None);
        }
        self.sync.replay_pending().await.map(Some)
    }
}

/// Fetch each URL and store 2xx responses. Failures are per URL.
async fn precache(
    fetcher: &dyn Fetcher,
    partition: &PartitionHandle,
    urls: Vec<Url>,
) -> (Vec<String>, Vec<(String, String)>) {
    let results = join_all(urls.into_iter().map(|url| async move {
        let request = Request::get(url);
        let outcome = match fetcher.fetch(&request).await {
            Ok(response) if response.ok() => partition.put(&request, &response).await,
            Ok(response) => Err(Error::Network(format!(
                "server answered {} {}",
                response.status, response.status_text
            ))),
            Err(e) => Err(e),
        };
        (request.url.to_string(), outcome)
    }))
    .await;

    let mut cached = Vec::new();
    let mut failed = Vec::new();
    for (url, outcome) in results {
        match outcome {
            Ok(()) => cached.push(url),
            Err(e) => {
                warn!("Failed to cache {}: {}", url, e);
                failed.push((url, e.to_string()));
            }
        }
    }
    (cached, failed)
}
