//! Result record definitions.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Opaque identifier of one hashing request.
///
/// Job ids are generated by the coordinator as UUID v4 strings, but the
/// stores treat them as plain strings.
pub type JobId = String;

/// The stored outcome of one hashing job.
///
/// Records are immutable once written. A repeated add for the same id
/// replaces the cached value and appends a new line to the log; the latest
/// line wins on replay.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Identifier of the job that produced this record.
    pub job_id: JobId,
    /// Salt mixed into the digest input; empty when no salt was requested.
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    /// The digest bytes.
    #[serde(with = "base64_bytes")]
    pub digest: Vec<u8>,
}

impl ResultRecord {
    /// Create a new record.
    #[must_use]
    pub fn new(job_id: impl Into<JobId>, salt: Vec<u8>, digest: Vec<u8>) -> Self {
        Self {
            job_id: job_id.into(),
            salt,
            digest,
        }
    }

    /// The digest as padded URL-safe base64, the form served to clients.
    #[must_use]
    pub fn encoded_digest(&self) -> String {
        URL_SAFE.encode(&self.digest)
    }

    /// Whether a salt was mixed into this digest.
    #[must_use]
    pub fn is_salted(&self) -> bool {
        !self.salt.is_empty()
    }
}

/// Serde adapter storing byte vectors as padded URL-safe base64 strings.
mod base64_bytes {
    use base64::engine::general_purpose::URL_SAFE;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        URL_SAFE
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
