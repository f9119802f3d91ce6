//! Canary sampling

use rand::Rng;
use sha2::{Digest, Sha256};
use switchboard_config::{CanaryConfig, CanarySampling};
use switchboard_core::InferenceRequest;

/// Whether the request falls into the canary share that skips inference
pub fn sampled_out(canary: &CanaryConfig, request: &InferenceRequest) -> bool {
    match canary.percent {
        0 => false,
        percent if percent >= 100 => true,
        percent => bucket(canary.sampling, request) < percent,
    }
}

/// Bucket in `0..100`
fn bucket(sampling: CanarySampling, request: &InferenceRequest) -> u32 {
    match sampling {
        CanarySampling::Random => rand::rng().random_range(0..100),
        CanarySampling::Hash => hash_bucket(request),
    }
}

fn hash_bucket(request: &InferenceRequest) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(request.context.tenant_id.as_bytes());
    hasher.update([0]);
    hasher.update(request.context.service_id.as_bytes());
    hasher.update([0]);
    hasher.update(request.prompt.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);

    u32::try_from(u64::from_be_bytes(prefix) % 100).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use switchboard_core::{Context, UseCase};

    use super::*;

    fn request(tenant: &str, prompt: &str) -> InferenceRequest {
        InferenceRequest::new(Context::new(tenant, "svc", "sdk"), UseCase::Generation, prompt)
    }

    fn canary(percent: u32, sampling: CanarySampling) -> CanaryConfig {
        CanaryConfig { percent, sampling }
    }

    #[test]
    fn zero_percent_never_samples() {
        let config = canary(0, CanarySampling::Random);
        assert!((0..200).all(|_| !sampled_out(&config, &request("t", "p"))));
    }

    #[test]
    fn hundred_percent_always_samples() {
        let config = canary(100, CanarySampling::Random);
        assert!((0..200).all(|_| sampled_out(&config, &request("t", "p"))));
    }

    #[test]
    fn hash_sampling_is_stable() {
        let config = canary(50, CanarySampling::Hash);
        let req = request("acme", "classify this");
        let first = sampled_out(&config, &req);
        assert!((0..50).all(|_| sampled_out(&config, &req) == first));
    }

    #[test]
    fn hash_buckets_spread_across_prompts() {
        let config = canary(50, CanarySampling::Hash);
        let sampled = (0..400)
            .filter(|i| sampled_out(&config, &request("acme", &format!("prompt {i}"))))
            .count();
        assert!(sampled > 100 && sampled < 300, "sampled {sampled} of 400");
    }
}
