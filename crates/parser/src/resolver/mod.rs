//! External `$ref` resolution
//!
//! Resolves `http://`, `https://` and `file://` references (relative ones are
//! joined against a base URL or directory), narrows the fetched document by
//! the URI's JSON Pointer fragment, and caches the result by full URI. The
//! parsed document is cached as well, so fragments of one document share a
//! single fetch.
//!
//! ## Resilience
//! - Every attempt is bounded by a per-request timeout.
//! - Transient failures (timeouts, connection errors, 429/5xx) are retried
//!   with bounded exponential backoff driven by [`RetryMachine`].
//! - A failed reference yields exactly one [`ParserError`], regardless of
//!   how many attempts were made.
//! - Bodies larger than the input ceiling are rejected while they are read.
//!
//! The caches are the only state shared between concurrent fetches; they sit
//! behind mutexes and are never handed out to callers.

mod cache;
mod fetch;
mod retry;

pub use cache::{ExternalRefResult, RefCache};
pub use fetch::{DefaultFetcher, FetchError, Fetcher};
pub use retry::{RetryMachine, RetryPolicy, RetryState};

use crate::config::{ResolverOptions, DEFAULT_MAX_INPUT_BYTES};
use crate::{ingest, pointer};
use apicat_common::{ErrorCode, ParserError};
use futures::future::join_all;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Snapshot of resolver counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverStats {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub errors: u64,
    pub retries: u64,
    pub cache_size: usize,
    pub cache_hit_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    errors: AtomicU64,
    retries: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.fetches,
            &self.errors,
            &self.retries,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Outcome of resolving many references at once
#[derive(Debug, Clone, Default)]
pub struct BatchResolution {
    /// URI → resolved content
    pub resolved: BTreeMap<String, Value>,

    /// One error per failed URI
    pub failures: Vec<ParserError>,
}

impl BatchResolution {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Single error summarizing every failure, if there were any
    pub fn escalation(&self) -> Option<ParserError> {
        if self.failures.is_empty() {
            return None;
        }
        let failed: Vec<Value> = self
            .failures
            .iter()
            .map(|f| Value::String(f.location.clone().unwrap_or_default()))
            .collect();
        Some(
            ParserError::new(ErrorCode::REF_004)
                .with_detail(format!(
                    "{} of {} external references failed",
                    self.failures.len(),
                    self.failures.len() + self.resolved.len()
                ))
                .with_metadata("failed", Value::Array(failed)),
        )
    }
}

/// Fetches, narrows and caches external references
pub struct ExternalRefResolver {
    base: Option<Url>,
    timeout: Duration,
    policy: RetryPolicy,
    max_bytes: u64,
    fetcher: Arc<dyn Fetcher>,
    cache: Mutex<RefCache>,

    /// Parsed documents keyed by URL without fragment
    documents: Mutex<RefCache>,
    counters: Counters,
}

impl ExternalRefResolver {
    /// Resolver backed by reqwest and the local filesystem, reading at most
    /// `max_bytes` per document
    pub fn new(options: &ResolverOptions, max_bytes: u64) -> Self {
        let fetcher = Arc::new(DefaultFetcher::new(options.timeout(), max_bytes));
        Self::with_fetcher(options, fetcher).with_max_bytes(max_bytes)
    }

    /// Resolver backed by a custom fetcher
    pub fn with_fetcher(options: &ResolverOptions, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            base: configured_base(options),
            timeout: options.timeout(),
            policy: RetryPolicy::from(&options.retry),
            max_bytes: DEFAULT_MAX_INPUT_BYTES,
            fetcher,
            cache: Mutex::new(RefCache::new(
                options.cache.max_entries,
                options.cache.ttl(),
            )),
            documents: Mutex::new(RefCache::new(
                options.cache.max_entries,
                options.cache.ttl(),
            )),
            counters: Counters::default(),
        }
    }

    /// Reject fetched bodies larger than `max_bytes`
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Configured base URL or directory, if any
    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    /// Base for a root document: the configured base wins over the
    /// document's own location
    pub fn root_base(&self, source_location: Option<&Url>) -> Option<Url> {
        self.base.clone().or_else(|| source_location.cloned())
    }

    /// Turn a `$ref` value into an absolute URL
    pub fn resolve_uri(&self, base: Option<&Url>, reference: &str) -> Result<Url, ParserError> {
        let invalid = |detail: String| {
            ParserError::new(ErrorCode::REF_005)
                .with_detail(detail)
                .at(reference.to_string())
        };

        if let Ok(url) = Url::parse(reference) {
            return match url.scheme() {
                "http" | "https" | "file" => Ok(url),
                other => Err(invalid(format!("unsupported scheme '{}'", other))),
            };
        }

        let base = base.ok_or_else(|| {
            invalid(format!(
                "relative reference '{}' has no base path or base URL",
                reference
            ))
        })?;
        base.join(reference)
            .map_err(|e| invalid(format!("cannot join '{}': {}", reference, e)))
    }

    /// Resolve one absolute URI, consulting the cache first
    pub async fn resolve(&self, uri: &str) -> Result<ExternalRefResult, ParserError> {
        if let Some(hit) = self.lock_cache().get(uri, Instant::now()) {
            Counters::bump(&self.counters.hits);
            debug!(uri, "external reference cache hit");
            return Ok(hit);
        }
        Counters::bump(&self.counters.misses);

        match self.load(uri).await {
            Ok(result) => {
                self.lock_cache().insert(result.clone(), Instant::now());
                Ok(result)
            }
            Err(err) => {
                Counters::bump(&self.counters.errors);
                Err(err)
            }
        }
    }

    /// Resolve many URIs concurrently
    ///
    /// Distinct documents are fetched concurrently; fragments of the same
    /// document are resolved one after another so they share its fetch.
    /// Failures are collected rather than aborting the batch. With
    /// `fail_on_error`, any failure turns into a single `REF_004` error.
    pub async fn resolve_batch(
        &self,
        uris: &[String],
        fail_on_error: bool,
    ) -> Result<BatchResolution, ParserError> {
        let mut seen = HashSet::new();
        let mut by_document: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for uri in uris.iter().filter(|u| seen.insert(u.as_str())) {
            by_document
                .entry(document_key(uri))
                .or_default()
                .push(uri.as_str());
        }

        let groups = join_all(by_document.into_values().map(|group| async move {
            let mut outcomes = Vec::with_capacity(group.len());
            for uri in group {
                outcomes.push((uri, self.resolve(uri).await));
            }
            outcomes
        }))
        .await;

        let mut batch = BatchResolution::default();
        for (uri, outcome) in groups.into_iter().flatten() {
            match outcome {
                Ok(result) => {
                    batch.resolved.insert(uri.to_string(), result.content);
                }
                Err(err) => batch.failures.push(err),
            }
        }

        if fail_on_error {
            if let Some(escalated) = batch.escalation() {
                return Err(escalated);
            }
        }
        Ok(batch)
    }

    pub fn stats(&self) -> ResolverStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        ResolverStats {
            hits,
            misses,
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            cache_size: self.lock_cache().len(),
            cache_hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    /// Drop every cached entry and reset the counters
    pub fn clear(&self) {
        self.lock_cache().clear();
        self.lock_documents().clear();
        self.counters.reset();
    }

    fn lock_cache(&self) -> MutexGuard<'_, RefCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_documents(&self) -> MutexGuard<'_, RefCache> {
        self.documents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn load(&self, uri: &str) -> Result<ExternalRefResult, ParserError> {
        let url = Url::parse(uri).map_err(|e| {
            ParserError::new(ErrorCode::REF_005)
                .with_detail(e)
                .at(uri.to_string())
        })?;

        let mut document_url = url.clone();
        document_url.set_fragment(None);
        let document = self.document(&document_url, uri).await?;

        // `#` selects the fragment form, which is percent-decoded
        let content = match url.fragment() {
            Some(fragment) if !fragment.is_empty() => {
                pointer::resolve(&document, &format!("#{}", fragment))
                    .map_err(|e| e.with_metadata("uri", uri))?
                    .clone()
            }
            _ => document,
        };

        debug!(uri, "external reference resolved");
        Ok(ExternalRefResult {
            uri: uri.to_string(),
            content,
            resolved_at: chrono::Utc::now(),
        })
    }

    /// Parsed document behind `document_url`, fetched at most once while cached
    async fn document(&self, document_url: &Url, uri: &str) -> Result<Value, ParserError> {
        let cached = self.lock_documents().get(document_url.as_str(), Instant::now());
        if let Some(cached) = cached {
            debug!(uri, document = %document_url, "external document cache hit");
            return Ok(cached.content);
        }

        let body = self.fetch_with_retry(document_url).await?;
        let document = ingest::parse_text(&body, path_hint(document_url)).map_err(|e| {
            ParserError::new(ErrorCode::REF_004)
                .with_detail(&e.message)
                .at(uri.to_string())
        })?;

        self.lock_documents().insert(
            ExternalRefResult {
                uri: document_url.to_string(),
                content: document.clone(),
                resolved_at: chrono::Utc::now(),
            },
            Instant::now(),
        );
        Ok(document)
    }

    async fn fetch_with_retry(&self, url: &Url) -> Result<String, ParserError> {
        let mut machine = RetryMachine::new(self.policy.clone());
        let mut attempt = machine.start();

        loop {
            Counters::bump(&self.counters.fetches);
            let outcome = match tokio::time::timeout(self.timeout, self.fetcher.fetch(url)).await {
                Ok(Ok(body)) if body.len() as u64 > self.max_bytes => Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                }),
                Ok(outcome) => outcome,
                Err(_) => Err(FetchError::Timeout),
            };

            match outcome {
                Ok(body) => {
                    machine.record_success();
                    return Ok(body);
                }
                Err(err) => match machine.record_failure(err.is_transient()) {
                    Some(delay) => {
                        Counters::bump(&self.counters.retries);
                        warn!(
                            uri = %url,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "external fetch failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt = machine.resume().unwrap_or(attempt + 1);
                    }
                    None => return Err(self.fetch_error(url, err, attempt)),
                },
            }
        }
    }

    fn fetch_error(&self, url: &Url, err: FetchError, attempts: u32) -> ParserError {
        let base = match &err {
            FetchError::Timeout => ParserError::new(ErrorCode::NET_001)
                .with_metadata("timeout_ms", self.timeout.as_millis() as u64),
            FetchError::Status(status) => {
                ParserError::new(ErrorCode::NET_002).with_metadata("status", *status)
            }
            FetchError::Connection(_) => ParserError::new(ErrorCode::NET_003),
            FetchError::Io(_) => ParserError::new(ErrorCode::REF_004),
            FetchError::UnsupportedScheme(_) => ParserError::new(ErrorCode::REF_005),
            FetchError::TooLarge { limit } => {
                ParserError::new(ErrorCode::REF_004).with_metadata("limit", *limit)
            }
        };
        base.with_detail(format!("{} ({})", url, err))
            .at(url.to_string())
            .with_metadata("attempts", attempts)
    }
}

fn configured_base(options: &ResolverOptions) -> Option<Url> {
    if let Some(raw) = &options.base_url {
        let normalized = if raw.ends_with('/') {
            raw.clone()
        } else {
            format!("{}/", raw)
        };
        match Url::parse(&normalized) {
            Ok(url) => return Some(url),
            Err(e) => warn!(base_url = %raw, error = %e, "ignoring invalid base URL"),
        }
    }
    let path = options.base_path.as_deref()?;
    directory_url(path)
}

/// `file://` URL for a directory (trailing slash, absolute)
pub(crate) fn directory_url(path: &Path) -> Option<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    Url::from_directory_path(absolute).ok()
}

/// Fragment-less form of `uri`, used to group fragments of one document
fn document_key(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => uri.to_string(),
    }
}

fn path_hint(url: &Url) -> Option<&Path> {
    Some(Path::new(url.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryOptions, ResolverOptions};
    use async_trait::async_trait;
    use fetch::MockFetcher;
    use std::sync::atomic::AtomicUsize;

    const SPEC_BODY: &str = r#"{
        "components": {"schemas": {"Pet": {"type": "object", "title": "Pet"}}}
    }"#;

    fn fast_options() -> ResolverOptions {
        ResolverOptions {
            timeout_ms: 1_000,
            retry: RetryOptions {
                max_attempts: 3,
                min_delay_ms: 1,
                max_delay_ms: 2,
                factor: 2.0,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_repeated_uri_is_fetched_once() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url: &Url| url.as_str() == "https://specs.example.com/pet.json")
            .times(1)
            .returning(|_| Ok(SPEC_BODY.to_string()));

        let resolver = ExternalRefResolver::with_fetcher(&fast_options(), Arc::new(fetcher));
        let uri = "https://specs.example.com/pet.json#/components/schemas/Pet";

        let first = resolver.resolve(uri).await.unwrap();
        assert_eq!(first.content["title"], "Pet");
        resolver.resolve(uri).await.unwrap();
        resolver.resolve(uri).await.unwrap();

        let stats = resolver.stats();
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.cache_size, 1);
        assert!((stats.cache_hit_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().times(3).returning(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FetchError::Connection("connection reset".to_string()))
            } else {
                Ok(SPEC_BODY.to_string())
            }
        });

        let resolver = ExternalRefResolver::with_fetcher(&fast_options(), Arc::new(fetcher));
        resolver
            .resolve("https://specs.example.com/pet.json")
            .await
            .unwrap();

        let stats = resolver.stats();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(stats.fetches, 3);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Err(FetchError::Status(404)));

        let resolver = ExternalRefResolver::with_fetcher(&fast_options(), Arc::new(fetcher));
        let err = resolver
            .resolve("https://specs.example.com/missing.json")
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::NET_002);
        assert_eq!(err.metadata["status"], 404);
        assert_eq!(err.metadata["attempts"], 1);
        let stats = resolver.stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.cache_size, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_yield_one_error() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .times(3)
            .returning(|_| Err(FetchError::Status(503)));

        let resolver = ExternalRefResolver::with_fetcher(&fast_options(), Arc::new(fetcher));
        let err = resolver
            .resolve("https://specs.example.com/flaky.json")
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::NET_002);
        assert_eq!(err.metadata["attempts"], 3);
        let stats = resolver.stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.retries, 2);
    }

    struct SlowFetcher;

    #[async_trait]
    impl Fetcher for SlowFetcher {
        async fn fetch(&self, _url: &Url) -> Result<String, FetchError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(SPEC_BODY.to_string())
        }
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out() {
        let options = ResolverOptions {
            timeout_ms: 20,
            retry: RetryOptions {
                max_attempts: 2,
                min_delay_ms: 1,
                max_delay_ms: 1,
                factor: 1.0,
            },
            ..Default::default()
        };
        let resolver = ExternalRefResolver::with_fetcher(&options, Arc::new(SlowFetcher));
        let err = resolver
            .resolve("https://slow.example.com/spec.json")
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::NET_001);
        let stats = resolver.stats();
        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.retries, 1);
    }

    #[tokio::test]
    async fn test_missing_fragment_reports_segment() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Ok(SPEC_BODY.to_string()));

        let resolver = ExternalRefResolver::with_fetcher(&fast_options(), Arc::new(fetcher));
        let err = resolver
            .resolve("https://specs.example.com/pet.json#/components/schemas/Owner")
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::REF_001);
        assert_eq!(err.metadata["segment"], "Owner");
    }

    #[tokio::test]
    async fn test_batch_collects_partial_failures() {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().returning(|url: &Url| {
            if url.path().ends_with("pet.json") {
                Ok(SPEC_BODY.to_string())
            } else {
                Err(FetchError::Status(404))
            }
        });

        let resolver = ExternalRefResolver::with_fetcher(&fast_options(), Arc::new(fetcher));
        let uris = vec![
            "https://specs.example.com/pet.json".to_string(),
            "https://specs.example.com/gone.json".to_string(),
            "https://specs.example.com/pet.json".to_string(),
        ];

        let batch = resolver.resolve_batch(&uris, false).await.unwrap();
        assert_eq!(batch.resolved.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert!(!batch.is_complete());

        let err = resolver.resolve_batch(&uris, true).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::REF_004);
        assert_eq!(err.metadata["failed"][0], "https://specs.example.com/gone.json");
    }

    #[tokio::test]
    async fn test_fragments_of_one_document_share_a_fetch() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(SPEC_BODY.to_string()));

        let resolver = ExternalRefResolver::with_fetcher(&fast_options(), Arc::new(fetcher));
        let uris = vec![
            "https://specs.example.com/pet.json#/components/schemas/Pet".to_string(),
            "https://specs.example.com/pet.json#/components".to_string(),
        ];
        let batch = resolver.resolve_batch(&uris, true).await.unwrap();
        assert_eq!(batch.resolved.len(), 2);
        assert_eq!(batch.resolved[&uris[0]]["title"], "Pet");

        resolver
            .resolve("https://specs.example.com/pet.json")
            .await
            .unwrap();

        let stats = resolver.stats();
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.cache_size, 3);
    }

    #[tokio::test]
    async fn test_encoded_fragment_is_decoded() {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().returning(|_| {
            Ok(r#"{"paths": {"/users/{id}": {"get": {"operationId": "getUser"}}}}"#.to_string())
        });

        let resolver = ExternalRefResolver::with_fetcher(&fast_options(), Arc::new(fetcher));
        let result = resolver
            .resolve("https://specs.example.com/api.json#/paths/~1users~1%7Bid%7D/get")
            .await
            .unwrap();
        assert_eq!(result.content["operationId"], "getUser");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_without_retry() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(format!(r#"{{"padding": "{}"}}"#, "x".repeat(2048))));

        let resolver = ExternalRefResolver::with_fetcher(&fast_options(), Arc::new(fetcher))
            .with_max_bytes(1024);
        let err = resolver
            .resolve("https://specs.example.com/huge.json")
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::REF_004);
        assert_eq!(err.metadata["limit"], 1024);
        assert_eq!(err.metadata["attempts"], 1);
        assert_eq!(resolver.stats().retries, 0);
    }

    #[test]
    fn test_resolve_uri_against_bases() {
        let options = ResolverOptions {
            base_url: Some("https://specs.example.com/v1".to_string()),
            ..Default::default()
        };
        let resolver = ExternalRefResolver::new(&options, DEFAULT_MAX_INPUT_BYTES);
        let base = resolver.base().cloned();

        let url = resolver
            .resolve_uri(base.as_ref(), "schemas/pet.yaml#/Pet")
            .unwrap();
        assert_eq!(url.as_str(), "https://specs.example.com/v1/schemas/pet.yaml#/Pet");

        let absolute = resolver
            .resolve_uri(None, "https://other.example.com/a.json")
            .unwrap();
        assert_eq!(absolute.host_str(), Some("other.example.com"));

        let err = resolver.resolve_uri(None, "pet.json").unwrap_err();
        assert_eq!(err.code, ErrorCode::REF_005);

        let err = resolver.resolve_uri(None, "ftp://example.com/a.json").unwrap_err();
        assert_eq!(err.code, ErrorCode::REF_005);
    }

    #[test]
    fn test_clear_resets_counters() {
        let resolver = ExternalRefResolver::new(&ResolverOptions::default(), DEFAULT_MAX_INPUT_BYTES);
        Counters::bump(&resolver.counters.hits);
        resolver.clear();
        assert_eq!(resolver.stats(), ResolverStats::default());
    }
}
