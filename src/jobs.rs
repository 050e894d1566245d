//! Job coordinator: admission, id allocation, and background digest jobs.
//!
//! # Lifecycle
//!
//! Each accepted submission moves through
//! `Submitted -> Computing -> Stored -> Done`:
//!
//! 1. **Submitted**: the payload is validated, the admission gate counts the
//!    job, and a fresh UUID v4 is allocated.
//! 2. **Computing**: after the configured delay, the digest is computed on
//!    the blocking pool.
//! 3. **Stored**: the result is added to the [`BoundedCache`], which writes
//!    it through to the durable store.
//! 4. **Done**: the admission permit is released, whether or not the earlier
//!    steps succeeded.
//!
//! Failures after submission are logged and not retried. A job whose digest
//! fails keeps answering "not found"; one whose append fails is served from
//! memory until evicted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::digest::{self, DEFAULT_SALT_LENGTH};
use crate::error::ServiceError;
use crate::shutdown::{AdmissionGate, WorkPermit};
use crate::store::{BoundedCache, JobId};

/// Default artificial delay before a job computes its digest.
pub const DEFAULT_JOB_DELAY: Duration = Duration::from_secs(5);

/// Per-request options for [`JobCoordinator::submit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Mix random salt into the digest.
    pub add_salt: bool,
}

impl SubmitOptions {
    /// Options requesting a salted digest.
    #[must_use]
    pub fn salted() -> Self {
        Self { add_salt: true }
    }
}

/// Stages of a job, used for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Admitted and assigned an id.
    Submitted,
    /// Digest computation running.
    Computing,
    /// Result placed in the cache and appended to the store.
    Stored,
    /// Accounting released.
    Done,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::Computing => write!(f, "computing"),
            Self::Stored => write!(f, "stored"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Tunables for background jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// Delay before computing, emulating an expensive key-stretching step.
    pub delay: Duration,
    /// Salt bytes used for salted submissions.
    pub salt_length: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            delay: DEFAULT_JOB_DELAY,
            salt_length: DEFAULT_SALT_LENGTH,
        }
    }
}

impl JobSettings {
    /// Set the artificial delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the salt length for salted submissions.
    #[must_use]
    pub fn with_salt_length(mut self, length: usize) -> Self {
        self.salt_length = length;
        self
    }
}

/// Accepts hashing requests and runs them as independent tokio tasks.
#[derive(Debug, Clone)]
pub struct JobCoordinator {
    cache: Arc<BoundedCache>,
    gate: Arc<AdmissionGate>,
    settings: JobSettings,
}

impl JobCoordinator {
    /// Create a coordinator storing results in `cache` and admitting work
    /// through `gate`.
    #[must_use]
    pub fn new(cache: Arc<BoundedCache>, gate: Arc<AdmissionGate>, settings: JobSettings) -> Self {
        Self {
            cache,
            gate,
            settings,
        }
    }

    /// Submit `payload` for hashing and return the new job's id immediately.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// * [`ServiceError::Validation`] if `payload` is empty.
    /// * [`ServiceError::ServiceUnavailable`] if shutdown has begun. Nothing
    ///   is allocated or launched in that case.
    pub fn submit(&self, payload: &[u8], options: SubmitOptions) -> Result<JobId, ServiceError> {
        if payload.is_empty() {
            return Err(ServiceError::Validation("missing password".to_string()));
        }

        let Some(permit) = self.gate.try_admit() else {
            log::warn!("Refusing submission: shutdown pending");
            return Err(ServiceError::ServiceUnavailable);
        };

        let job_id = Uuid::new_v4().to_string();
        log::debug!("Job {}: {}", job_id, JobPhase::Submitted);

        let salt_length = if options.add_salt {
            self.settings.salt_length
        } else {
            0
        };
        tokio::spawn(run_job(
            job_id.clone(),
            payload.to_vec(),
            salt_length,
            self.settings.delay,
            Arc::clone(&self.cache),
            permit,
        ));

        Ok(job_id)
    }

    /// Number of admitted jobs that have not reached `Done`.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.gate.outstanding()
    }

    /// The job settings in effect.
    #[must_use]
    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }
}

async fn run_job(
    job_id: JobId,
    payload: Vec<u8>,
    salt_length: usize,
    delay: Duration,
    cache: Arc<BoundedCache>,
    permit: WorkPermit,
) {
    tokio::time::sleep(delay).await;

    let id = job_id.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        log::debug!("Job {}: {}", id, JobPhase::Computing);
        let result = digest::salted_digest(&payload, salt_length);
        cache.add(&id, result.salt, result.digest)
    })
    .await;

    match outcome {
        Ok(Ok(())) => log::debug!("Job {}: {}", job_id, JobPhase::Stored),
        Ok(Err(e)) => log::error!("Job {}: failed to persist result: {}", job_id, e),
        Err(e) => log::error!("Job {}: digest task failed: {}", job_id, e),
    }

    drop(permit);
    log::debug!("Job {}: {}", job_id, JobPhase::Done);
}
