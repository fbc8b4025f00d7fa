//! OpenAPI 3.x parsing pipeline
//!
//! This crate turns an OpenAPI document (in-memory tree, JSON/YAML text,
//! file, byte stream or URL) into a content-addressed [`ParsedSpec`].
//!
//! ## Pipeline
//!
//! [`SpecParser::parse`] runs a fixed sequence of stages:
//! - ingest the source under a byte ceiling
//! - gate on the declared version (`openapi: 3.x`)
//! - fetch external `$ref`s concurrently, with caching, retries and timeouts
//! - dereference local and external references
//! - detect reference cycles
//! - extract endpoints and schemas
//! - hash the canonical form of the ingested document
//!
//! Failures are typed [`ParserError`]s routed according to the configured
//! [`ErrorMode`]. Progress is reported to [`ProgressObserver`]s subscribed
//! before the call.
//!
//! ## Example
//!
//! ```no_run
//! use apicat_parser::{ParserOptions, SpecParser, SpecSource};
//!
//! # async fn run() -> Result<(), apicat_parser::ParserError> {
//! let mut parser = SpecParser::new(ParserOptions::default());
//! let outcome = parser.parse(SpecSource::infer("openapi.yaml")).await?;
//! if let Some(spec) = outcome.spec() {
//!     let manifest = parser.to_protocol_manifest(Some(spec))?;
//!     println!("{}", manifest.service.urn);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
mod cycles;
mod deref;
mod extract;
mod hash;
mod ingest;
mod parser;
pub mod pointer;
pub mod progress;
pub mod refs;
pub mod resolver;

pub use config::{CacheOptions, ExtractionOptions, ParserOptions, ResolverOptions, RetryOptions};
pub use cycles::{CircularReferenceDetector, CycleReport};
pub use extract::{EndpointExtractor, SchemaExtractor};
pub use hash::{canonicalize, generate_hash, HASH_HEX_WIDTH, HASH_SEED};
pub use ingest::{parse_text, Ingested, SpecSource, StreamIngestor};
pub use parser::SpecParser;
pub use progress::{ProgressEvent, ProgressObserver, ProgressTracker, Stage};
pub use resolver::{
    BatchResolution, DefaultFetcher, ExternalRefResolver, ExternalRefResult, FetchError, Fetcher,
    ResolverStats,
};

pub use apicat_common::{
    Endpoint, ErrorCode, ErrorMode, ErrorRegistry, Extraction, FailedParse, HttpMethod,
    ParameterLocation, ParseOutcome, ParsedSpec, ParserError, SchemaRecord, Severity, SourceKind,
};
pub use apicat_manifest::{ManifestConverter, ProtocolManifest};
