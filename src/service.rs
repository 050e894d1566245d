//! The hashing service facade used by the HTTP layer and process bootstrap.
//!
//! [`HashService`] wires the durable store, the bounded cache, the job
//! coordinator and the shutdown controller together, so callers deal with a
//! single handle:
//!
//! ```rust,no_run
//! use hashgen::config::Config;
//! use hashgen::jobs::SubmitOptions;
//! use hashgen::service::HashService;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let service = HashService::open(&Config::default())?;
//! let driver = service.spawn_shutdown_driver();
//!
//! let id = service.submit(b"angryMonkey", SubmitOptions::default())?;
//! service.request_shutdown();
//! service.await_terminated().await;
//! driver.await?;
//!
//! assert!(service.get(&id)?.is_some());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::ServiceError;
use crate::jobs::{JobCoordinator, JobSettings, SubmitOptions};
use crate::shutdown::{AdmissionGate, ShutdownController, ShutdownState};
use crate::stats::Stats;
use crate::store::{BoundedCache, DurableStore, JobId, ResultRecord, StoreError};

/// Owns every stateful part of the service.
#[derive(Debug)]
pub struct HashService {
    cache: Arc<BoundedCache>,
    coordinator: JobCoordinator,
    controller: Arc<ShutdownController>,
    stats: Stats,
}

impl HashService {
    /// Open the result log named by `config` and build a running service.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the log cannot be created, read, or
    /// replayed.
    pub fn open(config: &Config) -> Result<Self, StoreError> {
        let store = DurableStore::open(&config.resolved_store_path())?
            .with_sync_writes(config.sync_writes);
        Ok(Self::with_store(
            Arc::new(store),
            config.cache_capacity,
            config.job_settings(),
        ))
    }

    /// Build a service around an already opened store.
    #[must_use]
    pub fn with_store(store: Arc<DurableStore>, capacity: usize, settings: JobSettings) -> Self {
        let cache = Arc::new(BoundedCache::new(capacity, store));
        let gate = Arc::new(AdmissionGate::new());
        let controller = Arc::new(ShutdownController::new(Arc::clone(&gate)));
        let coordinator = JobCoordinator::new(Arc::clone(&cache), gate, settings);
        Self {
            cache,
            coordinator,
            controller,
            stats: Stats::new(),
        }
    }

    /// Submit a payload for background hashing.
    ///
    /// # Errors
    ///
    /// See [`JobCoordinator::submit`].
    pub fn submit(&self, payload: &[u8], options: SubmitOptions) -> Result<JobId, ServiceError> {
        self.coordinator.submit(payload, options)
    }

    /// Look up a finished job: the cache first, then the durable store.
    ///
    /// A store hit is not copied back into the cache.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store read fails.
    pub fn get(&self, job_id: &str) -> Result<Option<ResultRecord>, ServiceError> {
        if let Some(record) = self.cache.get(job_id) {
            return Ok(Some(record));
        }
        let record = self.cache.store().lookup(job_id)?;
        if record.is_some() {
            log::trace!("Job {}: served from store", job_id);
        }
        Ok(record)
    }

    /// Begin a graceful shutdown. Idempotent.
    pub fn request_shutdown(&self) {
        self.controller.request_shutdown();
    }

    /// Resolve once every job admitted before shutdown has finished.
    pub async fn await_terminated(&self) {
        self.controller.await_terminated().await;
    }

    /// Start the task that drains work after a shutdown request.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_shutdown_driver(&self) -> JoinHandle<()> {
        self.controller.spawn_driver()
    }

    /// Resolve once the transport should stop accepting connections.
    pub async fn transport_stopped(&self) {
        self.controller.transport_stopped().await;
    }

    /// Jobs admitted but not yet done.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.coordinator.outstanding()
    }

    /// Current shutdown state.
    #[must_use]
    pub fn state(&self) -> ShutdownState {
        self.controller.state()
    }

    /// Request statistics.
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// The shutdown controller, for signal registration.
    #[must_use]
    pub fn controller(&self) -> &Arc<ShutdownController> {
        &self.controller
    }

    /// The bounded cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<BoundedCache> {
        &self.cache
    }
}
