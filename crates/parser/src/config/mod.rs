//! Parser configuration.
//!
//! Options are loaded with the following priority:
//! 1. Environment variables prefixed with `APICAT_` (highest priority)
//! 2. A TOML file passed to [`ParserOptions::from_file`]
//! 3. Built-in defaults (lowest priority)

use apicat_common::{
    CatalogError, ErrorMode, HttpMethod, Result, DEFAULT_MAX_ERRORS, DEFAULT_MAX_WARNINGS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod defaults;

pub use defaults::*;

/// Top-level parser options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Reaction to `ERROR`-severity failures.
    pub error_mode: ErrorMode,

    /// Cap on collected errors.
    pub max_errors: usize,

    /// Cap on collected warnings.
    pub max_warnings: usize,

    /// Record cycles as warnings instead of errors.
    pub allow_circular: bool,

    /// Maximum `$ref` traversal depth.
    pub max_ref_depth: usize,

    /// Cap on nodes copied out of reference targets while dereferencing.
    pub max_expanded_nodes: usize,

    /// Hard ceiling on ingested bytes.
    pub max_input_bytes: u64,

    /// Files up to this size are read in one call.
    pub direct_read_threshold: u64,

    /// Fetch external (`http`, `https`, `file`) references.
    pub resolve_external: bool,

    /// Inline local and external references into the working document.
    pub dereference: bool,

    /// Compute the content hash.
    pub compute_hash: bool,

    /// Minimum spacing between progress updates, in milliseconds.
    pub progress_interval_ms: u64,

    /// External reference resolution.
    pub resolver: ResolverOptions,

    /// Endpoint and schema extraction.
    pub extraction: ExtractionOptions,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::Collect,
            max_errors: DEFAULT_MAX_ERRORS,
            max_warnings: DEFAULT_MAX_WARNINGS,
            allow_circular: false,
            max_ref_depth: DEFAULT_MAX_REF_DEPTH,
            max_expanded_nodes: DEFAULT_MAX_EXPANDED_NODES,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            direct_read_threshold: DEFAULT_DIRECT_READ_THRESHOLD,
            resolve_external: true,
            dereference: true,
            compute_hash: true,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            resolver: ResolverOptions::default(),
            extraction: ExtractionOptions::default(),
        }
    }
}

impl ParserOptions {
    /// Load options from a TOML file and apply environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CatalogError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let mut options = Self::from_toml_str(&content)?;
        options.apply_env_overrides();
        options.validate()?;
        Ok(options)
    }

    /// Parse options from TOML text (no environment overrides).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn with_allow_circular(mut self, allow: bool) -> Self {
        self.allow_circular = allow;
        self
    }

    /// Apply `APICAT_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup (unprefixed keys are
    /// looked up with the `APICAT_` prefix).
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(mode) = get("ERROR_MODE").and_then(|v| v.parse().ok()) {
            self.error_mode = mode;
        }
        if let Some(allow) = get("ALLOW_CIRCULAR").and_then(|v| parse_bool(&v)) {
            self.allow_circular = allow;
        }
        if let Some(depth) = get("MAX_REF_DEPTH").and_then(|v| v.parse().ok()) {
            self.max_ref_depth = depth;
        }
        if let Some(nodes) = get("MAX_EXPANDED_NODES").and_then(|v| v.parse().ok()) {
            self.max_expanded_nodes = nodes;
        }
        if let Some(bytes) = get("MAX_INPUT_BYTES").and_then(|v| v.parse().ok()) {
            self.max_input_bytes = bytes;
        }
        if let Some(ms) = get("REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.resolver.timeout_ms = ms;
        }
        if let Some(attempts) = get("MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.resolver.retry.max_attempts = attempts;
        }
        if let Some(url) = get("BASE_URL") {
            self.resolver.base_url = Some(url);
        }
        if let Some(path) = get("BASE_PATH") {
            self.resolver.base_path = Some(PathBuf::from(path));
        }
    }

    /// Reject option combinations the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        let retry = &self.resolver.retry;
        if retry.max_attempts == 0 {
            return Err(CatalogError::Config(
                "resolver.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if retry.factor < 1.0 {
            return Err(CatalogError::Config(
                "resolver.retry.factor must be >= 1.0".to_string(),
            ));
        }
        if retry.min_delay_ms > retry.max_delay_ms {
            return Err(CatalogError::Config(
                "resolver.retry.min_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }
        if self.max_expanded_nodes == 0 {
            return Err(CatalogError::Config(
                "max_expanded_nodes must be at least 1".to_string(),
            ));
        }
        if self.resolver.cache.max_entries == 0 {
            return Err(CatalogError::Config(
                "resolver.cache.max_entries must be at least 1".to_string(),
            ));
        }
        if self.extraction.methods.is_empty() {
            return Err(CatalogError::Config(
                "extraction.methods must name at least one HTTP method".to_string(),
            ));
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// External reference resolution options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Directory that relative references resolve against.
    pub base_path: Option<PathBuf>,

    /// URL that relative references resolve against (wins over `base_path`).
    pub base_url: Option<String>,

    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Escalate any failed reference in a batch to an overall failure.
    pub fail_on_error: bool,

    /// Retry policy.
    pub retry: RetryOptions,

    /// Cache bounds.
    pub cache: CacheOptions,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            base_path: None,
            base_url: None,
            timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            fail_on_error: false,
            retry: RetryOptions::default(),
            cache: CacheOptions::default(),
        }
    }
}

impl ResolverOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Exponential backoff options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    pub min_delay_ms: u64,

    /// Delay ceiling, in milliseconds.
    pub max_delay_ms: u64,

    /// Multiplier applied per retry.
    pub factor: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_delay_ms: DEFAULT_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

/// Cache bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Maximum number of cached references.
    pub max_entries: usize,

    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl CacheOptions {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Endpoint and schema extraction options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionOptions {
    /// HTTP methods to extract.
    pub methods: Vec<HttpMethod>,

    /// Include operations marked `deprecated`.
    pub include_deprecated: bool,

    /// Capture `example`/`examples` on parameters and payloads.
    pub include_examples: bool,

    /// Track schemas embedded in operations.
    pub include_inline_schemas: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            methods: HttpMethod::DEFAULT_SET.to_vec(),
            include_deprecated: true,
            include_examples: true,
            include_inline_schemas: true,
        }
    }
}
