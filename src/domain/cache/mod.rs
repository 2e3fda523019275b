//! Cache key domain - deterministic request fingerprints

mod key;

pub use key::{CacheKeyParams, Fingerprint, FingerprintGenerator};
