//! Reference CPU backend
//!
//! Double SHA-256 over the blob with the nonce patched in. A hash is a hit
//! when its trailing little-endian u64 is below the job target, the same rule
//! the verifier applies.

use crate::config::DeviceConfig;
use crate::miner::device::{Device, DeviceProvider};
use crate::miner::verifier::{Verification, Verifier};
use crate::types::Job;
use crate::utils::error::MinerError;
use sha2::{Digest, Sha256};

/// Double SHA-256 of `input`
pub fn sha256d(input: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(input);
    Sha256::digest(first).into()
}

/// Hash of `job` with `nonce` written into its blob
pub fn job_hash(job: &Job, nonce: u32) -> [u8; 32] {
    sha256d(&job.blob_with_nonce(nonce))
}

/// Creates [`CpuDevice`]s for device indices below `available`
#[derive(Debug, Clone)]
pub struct CpuProvider {
    available: usize,
}

impl CpuProvider {
    /// Provider exposing `available` CPU devices
    pub fn new(available: usize) -> Self {
        CpuProvider { available }
    }
}

impl Default for CpuProvider {
    fn default() -> Self {
        CpuProvider::new(num_cpus::get())
    }
}

impl DeviceProvider for CpuProvider {
    fn init(&self, config: &DeviceConfig) -> Result<Box<dyn Device>, MinerError> {
        if config.index >= self.available {
            return Err(MinerError::DeviceInitError {
                index: config.index,
                reason: format!("only {} CPU devices available", self.available),
            });
        }

        log::debug!(
            "CPU device #{} ready (intensity {}, worksize {})",
            config.index,
            config.intensity,
            config.worksize
        );
        Ok(Box::new(CpuDevice { index: config.index }))
    }
}

/// One CPU "device": hashes nonces sequentially on its worker thread
#[derive(Debug)]
pub struct CpuDevice {
    index: usize,
}

impl CpuDevice {
    /// Platform index this device was created for
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Device for CpuDevice {
    fn run_batch(&mut self, job: &Job, start: u32, count: u32) -> Result<Vec<u32>, MinerError> {
        let end = start as u64 + count as u64;
        if end > u32::MAX as u64 + 1 {
            return Err(MinerError::DeviceError(format!(
                "batch {:08x}+{} overflows the nonce space",
                start, count
            )));
        }

        let mut blob = job.blob_with_nonce(start);
        let mut hits = Vec::new();

        for nonce in (start as u64..end).map(|n| n as u32) {
            blob[crate::types::NONCE_OFFSET..crate::types::NONCE_OFFSET + 4]
                .copy_from_slice(&nonce.to_le_bytes());
            if job.meets_target(&sha256d(&blob)) {
                hits.push(nonce);
            }
        }

        Ok(hits)
    }
}

/// Verifier recomputing the CPU backend hash
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuVerifier;

impl Verifier for CpuVerifier {
    fn verify(&self, job: &Job, nonce: u32) -> Result<Verification, MinerError> {
        let hash = job_hash(job, nonce);
        Ok(Verification {
            hash,
            valid: job.meets_target(&hash),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn sha256d_matches_known_vector() {
        // SHA256(SHA256("hello"))
        assert_eq!(
            sha256d(b"hello"),
            hex!("9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50")
        );
    }

    #[test]
    fn provider_rejects_missing_devices() {
        let provider = CpuProvider::new(1);

        assert!(provider.init(&DeviceConfig::new(0, 16, 8)).is_ok());
        assert!(matches!(
            provider.init(&DeviceConfig::new(1, 16, 8)),
            Err(MinerError::DeviceInitError { index: 1, .. })
        ));
    }

    #[test]
    fn batch_hits_agree_with_verifier() {
        // Roughly one hash in sixteen passes this target.
        let job = Job::new("cpu", vec![0x11; 76], u64::MAX / 16);
        let mut device = CpuDevice { index: 0 };
        let hits = device.run_batch(&job, 1000, 256).unwrap();

        assert!(!hits.is_empty());
        for nonce in 1000..1256u32 {
            let verdict = CpuVerifier.verify(&job, nonce).unwrap();
            assert_eq!(verdict.valid, hits.contains(&nonce), "nonce {}", nonce);
        }
    }

    #[test]
    fn batch_reaching_the_top_of_the_range_is_allowed() {
        let job = Job::new("top", vec![0; 76], u64::MAX);
        let mut device = CpuDevice { index: 0 };

        let hits = device.run_batch(&job, u32::MAX - 3, 4).unwrap();
        assert_eq!(hits, vec![u32::MAX - 3, u32::MAX - 2, u32::MAX - 1, u32::MAX]);
        assert!(device.run_batch(&job, u32::MAX, 2).is_err());
    }
}
