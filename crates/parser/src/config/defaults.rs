//! Default values for parser configuration.

// ============================================================================
// Ingestion
// ============================================================================

/// Hard ceiling on ingested bytes (50 MiB).
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024;

/// Files up to this size are read in one call; larger ones are streamed (1 MiB).
pub const DEFAULT_DIRECT_READ_THRESHOLD: u64 = 1024 * 1024;

/// Chunk size for incremental reads (64 KiB).
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

// ============================================================================
// References
// ============================================================================

/// Maximum `$ref` traversal depth.
pub const DEFAULT_MAX_REF_DEPTH: usize = 64;

/// Nodes the dereferencer may copy out of reference targets.
pub const DEFAULT_MAX_EXPANDED_NODES: usize = 1_000_000;

/// Per-request timeout for external fetches (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Maximum fetch attempts per external reference.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff delay.
pub const DEFAULT_MIN_DELAY_MS: u64 = 100;

/// Backoff ceiling.
pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;

/// Backoff multiplier.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Maximum entries in the external reference cache.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 100;

/// Cache entry time-to-live (5 minutes).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

// ============================================================================
// Progress
// ============================================================================

/// Minimum spacing between progress updates.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 50;

// ============================================================================
// Environment
// ============================================================================

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "APICAT_";
