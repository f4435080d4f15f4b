// src/types.rs
use std::fmt;
use std::sync::Arc;

/// Byte offset of the 32-bit nonce inside a job blob
pub const NONCE_OFFSET: usize = 39;

/// Represents a unit of work distributed to every device worker
///
/// Jobs are immutable once handed to the scheduler. Workers hold their own
/// `Arc` to the job they are running, so replacing the shared job never
/// affects a batch that is already in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Unique identifier for the job
    pub id: String,
    /// Block hashing blob, nonce embedded at [`NONCE_OFFSET`]
    pub blob: Vec<u8>,
    /// Compact 64-bit target compared against the trailing hash word
    pub target: u64,
    /// Pool difficulty of this job
    pub difficulty: u64,
    /// Pool reserves the top nonce byte for itself
    pub nicehash: bool,
}

impl Job {
    /// Creates a job with a 64-bit target, difficulty derived from it
    pub fn new(id: impl Into<String>, blob: Vec<u8>, target: u64) -> Self {
        let difficulty = if target == 0 { 0 } else { u64::MAX / target };

        Job {
            id: id.into(),
            blob,
            target,
            difficulty,
            nicehash: false,
        }
    }

    /// Marks the job as nicehash (top nonce byte fixed by the pool)
    pub fn with_nicehash(mut self, nicehash: bool) -> Self {
        self.nicehash = nicehash;
        self
    }

    /// Nonce currently stored in the blob, 0 if the blob is too short
    pub fn initial_nonce(&self) -> u32 {
        self.blob
            .get(NONCE_OFFSET..NONCE_OFFSET + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0)
    }

    /// Returns a copy of the blob with `nonce` written at [`NONCE_OFFSET`]
    pub fn blob_with_nonce(&self, nonce: u32) -> Vec<u8> {
        let mut blob = self.blob.clone();
        if blob.len() < NONCE_OFFSET + 4 {
            blob.resize(NONCE_OFFSET + 4, 0);
        }
        blob[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&nonce.to_le_bytes());
        blob
    }

    /// Whether `hash` satisfies this job's target
    pub fn meets_target(&self, hash: &[u8; 32]) -> bool {
        let mut word = [0u8; 8];
        word.copy_from_slice(&hash[24..32]);
        u64::from_le_bytes(word) < self.target
    }
}

/// A nonce proposed by a device worker, pending verification
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Job the nonce was computed against
    pub job: Arc<Job>,
    /// Proposed nonce
    pub nonce: u32,
    /// Index of the worker that produced it
    pub device_id: usize,
}

impl Candidate {
    /// Creates a new candidate
    pub fn new(job: Arc<Job>, nonce: u32, device_id: usize) -> Self {
        Candidate {
            job,
            nonce,
            device_id,
        }
    }
}

/// A verified result delivered to the listener
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Job the nonce was computed against (not necessarily the current one)
    pub job: Arc<Job>,
    /// Winning nonce
    pub nonce: u32,
    /// Authoritative hash recomputed by the verifier
    pub hash: [u8; 32],
    /// Index of the worker that found it
    pub device_id: usize,
}

impl JobResult {
    /// Identifier of the job this result belongs to
    pub fn job_id(&self) -> &str {
        &self.job.id
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job {} nonce {:08x} hash {} (device #{})",
            self.job.id,
            self.nonce,
            hex::encode(self.hash),
            self.device_id
        )
    }
}
