//! Job keys.
//!
//! A key is `job:{ulid}`. ULIDs sort by creation time, so a forward scan of
//! the jobs column family yields jobs in enqueue order.

use std::fmt;
use std::str::FromStr;

use ulid::Ulid;

use crate::error::StorageError;

const JOB_PREFIX: &[u8] = b"job:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobKey(Ulid);

impl JobKey {
    /// A key minted now.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// The ULID part, as shown in logs and job records.
    pub fn job_id(&self) -> String {
        self.0.to_string()
    }

    /// Milliseconds since the epoch at which the key was minted.
    pub fn created_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = JOB_PREFIX.to_vec();
        bytes.extend_from_slice(self.0.to_string().as_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let id = bytes
            .strip_prefix(JOB_PREFIX)
            .ok_or_else(|| StorageError::InvalidKey(String::from_utf8_lossy(bytes).into_owned()))?;
        let id = std::str::from_utf8(id).map_err(|e| StorageError::InvalidKey(e.to_string()))?;
        id.parse()
    }

    pub(crate) fn prefix() -> &'static [u8] {
        JOB_PREFIX
    }
}

impl Default for JobKey {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for JobKey {
    type Err = StorageError;

    /// Parse a bare job id (the ULID part).
    fn from_str(job_id: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(job_id)
            .map(Self)
            .map_err(|e| StorageError::InvalidKey(format!("'{job_id}': {e}")))
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
