pub mod classifier;
pub mod handler;
pub mod key_generator;
pub mod storage;

pub use classifier::{extract_token, is_idempotency_eligible, IDEMPOTENCY_HEADER};
pub use handler::{
    IdempotencyCheckResult, IdempotencyHandler, IdempotencyHandlerConfig, IdempotencyMetrics,
    MetricsSnapshot, Outcome, RequestContext,
};
pub use key_generator::{
    canonical_json, CacheKey, FingerprintGenerator, RequestDigest, RequestFingerprint, Sha256Digest,
};
pub use storage::{CachedResponse, IdempotencyStore, KeyLock, PutOutcome};
