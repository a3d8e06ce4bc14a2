//! Protocol-wide constants and bit-exact limits

/// Protocol version carried in every manifest
pub const VCP_VERSION: &str = "1.0";

/// Maximum canonical manifest size in bytes (64 KiB)
pub const MAX_MANIFEST_SIZE: usize = 65_536;

/// Maximum canonical content size in bytes (256 KiB)
pub const MAX_CONTENT_SIZE: usize = 262_144;

/// Maximum revocation response body size in bytes (320 KiB)
pub const MAX_REVOCATION_RESPONSE_BYTES: usize = 327_680;

/// Clock skew tolerance for `iat` in minutes
pub const CLOCK_SKEW_MINUTES: i64 = 5;

/// Maximum allowed `exp - iat` in days
pub const MAX_EXP_DAYS: i64 = 90;

/// Default replay cache capacity
pub const REPLAY_CACHE_CAPACITY: usize = 100_000;

/// Prefix for content hashes on the wire
pub const HASH_PREFIX: &str = "sha256:";

/// Prefix for base64 signatures on the wire
pub const SIGNATURE_PREFIX: &str = "base64:";

/// Prefix for Ed25519 public keys on the wire
pub const PUBLIC_KEY_PREFIX: &str = "ed25519:";
