//! Parser Orchestrator
//!
//! Drives one document through the fixed stage sequence:
//!
//! ```text
//! ingest → validate → resolve external → dereference → detect cycles
//!        → extract endpoints → extract schemas → hash → finalize
//! ```
//!
//! Every stage reports to the progress tracker and routes failures through
//! [`Run::record`], which applies the error mode:
//! - `throw`: the first `ERROR`-severity failure is returned as `Err`
//! - `collect`: failures are collected and the parse keeps going
//! - `ignore`: like `collect`, but failures are left out of the result
//!
//! Unrecoverable failures (unsupported version, unreadable input) stop the
//! pipeline in every mode; `collect`/`ignore` then return a flagged
//! [`FailedParse`] carrying whatever spec existed at that point.

use crate::config::ParserOptions;
use crate::cycles::CircularReferenceDetector;
use crate::deref::Dereferencer;
use crate::extract::{EndpointExtractor, SchemaExtractor};
use crate::hash;
use crate::ingest::{Ingested, SpecSource, StreamIngestor};
use crate::progress::{ProgressObserver, ProgressTracker, Stage};
use crate::refs::{self, RefGraph, RefTarget, Scope};
use crate::resolver::{ExternalRefResolver, Fetcher, ResolverStats};
use apicat_common::{
    Endpoint, ErrorCode, ErrorCollector, ErrorMode, ErrorRegistry, Extraction, FailedParse,
    ParseOutcome, ParsedSpec, ParserError, SchemaRecord, Severity,
};
use apicat_manifest::{ManifestConverter, ProtocolManifest};
use reqwest::Url;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a pipeline run stopped early
enum Halt {
    /// `throw` mode hit an `ERROR`-severity failure
    Throw(ParserError),

    /// An unrecoverable failure ended the run
    Fatal(ParserError),
}

/// Per-call state: error routing and progress
struct Run<'p> {
    mode: ErrorMode,
    registry: Option<&'p ErrorRegistry>,
    collector: ErrorCollector,
    tracker: ProgressTracker,
}

impl<'p> Run<'p> {
    fn stage(&mut self, stage: Stage) {
        debug!(stage = %stage, "entering stage");
        self.tracker.start(stage);
    }

    fn record(&mut self, error: ParserError) -> Result<(), Halt> {
        let error = self.apply_registry(error);
        match error.severity {
            Severity::Error => warn!(code = %error.code, location = ?error.location, "{}", error.message),
            _ => debug!(code = %error.code, location = ?error.location, "{}", error.message),
        }
        self.tracker.error(&error);

        if error.is_error() && self.mode == ErrorMode::Throw {
            return Err(Halt::Throw(error));
        }
        let fatal = error.is_error() && !error.recoverable;
        self.collector.add(error.clone());
        if fatal {
            return Err(Halt::Fatal(error));
        }
        Ok(())
    }

    fn record_all(&mut self, errors: Vec<ParserError>) -> Result<(), Halt> {
        errors.into_iter().try_for_each(|e| self.record(e))
    }

    /// Record a failure that must end the run
    fn fail(&mut self, error: ParserError) -> Halt {
        match self.record(error.clone()) {
            Err(halt) => halt,
            Ok(()) => Halt::Fatal(error),
        }
    }

    /// Custom registries override the builtin defaults of codes they define;
    /// a severity set explicitly by a stage is kept
    fn apply_registry(&self, mut error: ParserError) -> ParserError {
        let Some(registry) = self.registry else {
            return error;
        };
        if !registry.is_registered(&error.code) {
            return error;
        }
        let builtin = ErrorRegistry::builtin().lookup(&error.code);
        let custom = registry.lookup(&error.code);
        if error.severity == builtin.severity {
            error.severity = custom.severity;
        }
        error.recoverable = custom.recoverable;
        error.suggestion = custom.suggestion.clone();
        error
    }

    /// Errors and warnings as the caller may see them
    fn visible(&self) -> (Vec<ParserError>, Vec<ParserError>) {
        if self.mode.exposes_failures() {
            (
                self.collector.errors().to_vec(),
                self.collector.warnings().to_vec(),
            )
        } else {
            (Vec::new(), Vec::new())
        }
    }
}

/// Parses OpenAPI 3.x documents into [`ParsedSpec`]s
///
/// A parser is reusable: each `parse()` supersedes the previous result,
/// while the external reference cache and statistics persist until
/// [`clear`](SpecParser::clear).
pub struct SpecParser {
    options: ParserOptions,
    registry: Option<ErrorRegistry>,
    resolver: ExternalRefResolver,
    ingestor: StreamIngestor,
    observers: Vec<Arc<dyn ProgressObserver>>,
    converter: ManifestConverter,
    last: Option<ParsedSpec>,
}

impl Default for SpecParser {
    fn default() -> Self {
        Self::new(ParserOptions::default())
    }
}

impl SpecParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            resolver: ExternalRefResolver::new(&options.resolver, options.max_input_bytes),
            ingestor: StreamIngestor::new(options.max_input_bytes, options.direct_read_threshold),
            options,
            registry: None,
            observers: Vec::new(),
            converter: ManifestConverter::new(),
            last: None,
        }
    }

    /// Use a custom error-code registry
    pub fn with_registry(mut self, registry: ErrorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Fetch external references through a custom fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.resolver = ExternalRefResolver::with_fetcher(&self.options.resolver, fetcher)
            .with_max_bytes(self.options.max_input_bytes);
        self
    }

    /// Register an observer for every subsequent `parse()`
    pub fn subscribe(&mut self, observer: Arc<dyn ProgressObserver>) {
        self.observers.push(observer);
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Result of the most recent successful `parse()`
    pub fn last_result(&self) -> Option<&ParsedSpec> {
        self.last.as_ref()
    }

    /// Parse one document
    ///
    /// Returns `Err` only in `throw` mode. Otherwise the outcome is either
    /// the parsed spec (check `has_errors`/`has_warnings`) or a flagged
    /// partial record when the parse could not complete.
    pub async fn parse(&mut self, source: SpecSource) -> Result<ParseOutcome, ParserError> {
        let mut tracker =
            ProgressTracker::new(self.observers.clone(), self.options.progress_interval());
        if !self.options.error_mode.exposes_failures() {
            tracker = tracker.without_errors();
        }
        let mut run = Run {
            mode: self.options.error_mode,
            registry: self.registry.as_ref(),
            collector: ErrorCollector::new(self.options.max_errors, self.options.max_warnings),
            tracker,
        };

        let mut slot = None;
        let outcome = self.run_pipeline(source, &mut run, &mut slot).await;
        let visible = run.visible();
        drop(run);

        match outcome {
            Ok(()) => {
                let spec = slot.ok_or_else(|| {
                    ParserError::new(ErrorCode::GENERAL_001).with_detail("pipeline produced no spec")
                })?;
                self.last = Some(spec.clone());
                Ok(ParseOutcome::Parsed(spec))
            }
            Err(Halt::Throw(error)) => {
                self.last = None;
                Err(error)
            }
            Err(Halt::Fatal(error)) => {
                self.last = None;
                let (errors, warnings) = visible;
                let partial = slot.map(|mut spec| {
                    spec.has_errors = !errors.is_empty();
                    spec.has_warnings = !warnings.is_empty();
                    spec.errors = errors.clone();
                    spec.warnings = warnings.clone();
                    spec
                });
                Ok(ParseOutcome::Failed(FailedParse::new(
                    &error, errors, warnings, partial,
                )))
            }
        }
    }

    async fn run_pipeline(
        &self,
        source: SpecSource,
        run: &mut Run<'_>,
        slot: &mut Option<ParsedSpec>,
    ) -> Result<(), Halt> {
        run.stage(Stage::Ingest);
        let ingested = self.ingest(source).await.map_err(|e| run.fail(e))?;
        let root_scope = Scope::Root {
            base: self.resolver.root_base(ingested.location.as_ref()),
        };
        let spec = slot.insert(ParsedSpec::new(
            ingested.document,
            ingested.kind,
            ingested.descriptor,
        ));
        run.tracker.complete_stage();

        run.stage(Stage::Validate);
        run.record_all(validate(&spec.raw))?;
        run.tracker.complete_stage();

        run.stage(Stage::ResolveExternal);
        let externals = if self.options.resolve_external {
            self.resolve_externals(&spec.raw, &root_scope, run).await?
        } else {
            BTreeMap::new()
        };
        spec.metadata.external_refs_resolved = externals.len();
        run.tracker.complete_stage();

        let graph = RefGraph {
            root: &spec.raw,
            root_scope: &root_scope,
            externals: &externals,
        };

        run.stage(Stage::Dereference);
        let dereferenced = if self.options.dereference {
            let (document, errors) = Dereferencer::new(graph, self.options.max_ref_depth)
                .with_node_budget(self.options.max_expanded_nodes)
                .run();
            run.record_all(errors)?;
            Some(document)
        } else {
            None
        };
        run.tracker.complete_stage();

        run.stage(Stage::DetectCycles);
        let detection = CircularReferenceDetector::new(self.options.max_ref_depth).detect(graph);
        let cycles = match detection {
            Ok(report) => report.cycles,
            Err(error) => {
                run.record(error)?;
                Vec::new()
            }
        };
        for cycle in &cycles {
            run.record(self.cycle_error(cycle))?;
        }
        spec.metadata.has_circular = !cycles.is_empty();
        spec.metadata.circular_refs = cycles;
        if let Some(document) = dereferenced {
            spec.set_document(document);
        }
        run.tracker.complete_stage();

        run.stage(Stage::ExtractEndpoints);
        let endpoints = EndpointExtractor::new(&spec.document, &self.options.extraction)
            .with_reported_causes(self.reported_ref_causes())
            .extract();
        spec.endpoints = endpoints.items;
        run.record_all(endpoints.errors)?;
        run.tracker.complete_stage();

        run.stage(Stage::ExtractSchemas);
        let schemas = SchemaExtractor::new(&spec.document, &self.options.extraction)
            .with_inline_source(&spec.raw)
            .extract();
        spec.schemas = schemas.items;
        run.record_all(schemas.errors)?;
        run.tracker.complete_stage();

        run.stage(Stage::Hash);
        if self.options.compute_hash {
            spec.hash = Some(hash::generate_hash(&spec.raw));
        }
        run.tracker.complete_stage();

        run.stage(Stage::Finalize);
        let (errors, warnings) = run.visible();
        spec.has_errors = !errors.is_empty();
        spec.has_warnings = !warnings.is_empty();
        spec.errors = errors;
        spec.warnings = warnings;
        let (capped_errors, capped_warnings) = run.collector.capped();
        run.tracker.complete_stage();
        run.tracker.finish();

        info!(
            title = spec.title().unwrap_or_default(),
            version = %spec.version,
            endpoints = spec.endpoints.len(),
            schemas = spec.schemas.len(),
            errors = run.collector.errors().len(),
            warnings = run.collector.warnings().len(),
            capped_errors,
            capped_warnings,
            hash = spec.hash.as_deref().unwrap_or_default(),
            "spec parsed"
        );
        Ok(())
    }

    async fn ingest(&self, source: SpecSource) -> Result<Ingested, ParserError> {
        let SpecSource::Url(url) = source else {
            return self.ingestor.ingest(source).await;
        };

        let location = Url::parse(&url).map_err(|e| {
            ParserError::new(ErrorCode::PARSE_002)
                .with_detail(format!("{}: {}", url, e))
                .at(url.clone())
        })?;
        let fetched = self.resolver.resolve(location.as_str()).await.map_err(|e| {
            match e.metadata.get("limit").cloned() {
                Some(limit) => ParserError::new(ErrorCode::PARSE_003)
                    .with_detail(&e.message)
                    .at(url.clone())
                    .with_metadata("limit", limit),
                None => ParserError::new(ErrorCode::PARSE_002)
                    .with_detail(&e.message)
                    .at(url.clone())
                    .with_metadata("cause", e.code.as_str()),
            }
        })?;

        Ok(Ingested {
            document: fetched.content,
            kind: apicat_common::SourceKind::Url,
            descriptor: Some(url),
            location: Some(location),
        })
    }

    /// Resolve external references in rounds: the root document's first,
    /// then the ones found inside fetched content
    async fn resolve_externals(
        &self,
        root: &Value,
        root_scope: &Scope,
        run: &mut Run<'_>,
    ) -> Result<BTreeMap<String, Value>, Halt> {
        let mut externals = BTreeMap::new();
        let mut seen = HashSet::new();

        let mut pending = Vec::new();
        for (location, reference) in refs::collect(root) {
            match root_scope.target(&reference) {
                Ok(RefTarget::External(url)) => {
                    let key = url.to_string();
                    if seen.insert(key.clone()) {
                        pending.push(key);
                    }
                }
                Ok(RefTarget::Local(_)) => {}
                Err(error) => run.record(error.at(location))?,
            }
        }

        let mut round = 0;
        while !pending.is_empty() {
            if round >= self.options.max_ref_depth {
                run.record(
                    ParserError::new(ErrorCode::REF_003)
                        .with_detail(format!(
                            "external references nest deeper than {} documents",
                            self.options.max_ref_depth
                        ))
                        .with_metadata("unresolved", pending.clone()),
                )?;
                break;
            }
            round += 1;
            debug!(round, count = pending.len(), "resolving external references");

            // never fails when fail_on_error is false
            let batch = self
                .resolver
                .resolve_batch(&pending, false)
                .await
                .map_err(|e| run.fail(e))?;
            let escalation = batch.escalation();
            run.record_all(batch.failures)?;
            if self.options.resolver.fail_on_error {
                if let Some(error) = escalation {
                    let error = error.with_suggestion(
                        "Fix the failing references or disable resolver.fail_on_error",
                    );
                    return Err(run.fail(ParserError { recoverable: false, ..error }));
                }
            }

            let mut next = Vec::new();
            for (uri, content) in &batch.resolved {
                let Ok(url) = Url::parse(uri) else {
                    continue;
                };
                let scope = Scope::of_external(&url);
                for (_, reference) in refs::collect(content) {
                    if let Ok(target) = scope.target(&reference) {
                        let key = target.key();
                        if seen.insert(key.clone()) {
                            next.push(key);
                        }
                    }
                }
            }
            externals.extend(batch.resolved);
            pending = next;
            run.tracker.update(100.0 * round as f64 / (round + 1) as f64);
        }

        Ok(externals)
    }

    /// Reference failures that dereferencing, cycle detection and external
    /// resolution have already recorded by the time endpoints are extracted
    fn reported_ref_causes(&self) -> Vec<ErrorCode> {
        if !self.options.dereference {
            return Vec::new();
        }
        let mut causes = vec![ErrorCode::REF_001, ErrorCode::REF_003];
        if self.options.resolve_external {
            causes.push(ErrorCode::REF_004);
        }
        causes
    }

    fn cycle_error(&self, cycle: &[String]) -> ParserError {
        let error = ParserError::new(ErrorCode::REF_002)
            .with_detail(cycle.join(" -> "))
            .with_metadata("cycle", cycle.to_vec());
        let error = match cycle.first() {
            Some(start) => error.at(start.clone()),
            None => error,
        };
        if self.options.allow_circular {
            error.with_severity(Severity::Warn)
        } else {
            error
        }
    }

    fn spec_or_last<'s>(&'s self, spec: Option<&'s ParsedSpec>) -> Result<&'s ParsedSpec, ParserError> {
        spec.or(self.last.as_ref())
            .ok_or_else(|| ParserError::new(ErrorCode::GENERAL_002))
    }

    /// Extract endpoints from `spec`, or from the last parse result
    pub fn extract_endpoints(
        &self,
        spec: Option<&ParsedSpec>,
    ) -> Result<Extraction<Endpoint>, ParserError> {
        let spec = self.spec_or_last(spec)?;
        Ok(EndpointExtractor::new(&spec.document, &self.options.extraction).extract())
    }

    /// Extract schemas from `spec`, or from the last parse result
    pub fn extract_schemas(
        &self,
        spec: Option<&ParsedSpec>,
    ) -> Result<Extraction<SchemaRecord>, ParserError> {
        let spec = self.spec_or_last(spec)?;
        Ok(SchemaExtractor::new(&spec.document, &self.options.extraction)
            .with_inline_source(&spec.raw)
            .extract())
    }

    /// Content hash of the document as ingested
    pub fn generate_hash(&self, spec: &ParsedSpec) -> String {
        hash::generate_hash(&spec.raw)
    }

    /// Convert `spec`, or the last parse result, into a manifest
    pub fn to_protocol_manifest(
        &self,
        spec: Option<&ParsedSpec>,
    ) -> Result<ProtocolManifest, ParserError> {
        let spec = self.spec_or_last(spec)?;
        Ok(self.converter.convert(spec))
    }

    pub fn resolver_stats(&self) -> ResolverStats {
        self.resolver.stats()
    }

    /// Drop the last result, the reference cache and the statistics
    pub fn clear(&mut self) {
        self.last = None;
        self.resolver.clear();
    }
}

/// Version gate and shape checks, in the order they are reported
fn validate(document: &Value) -> Vec<ParserError> {
    let Some(root) = document.as_object() else {
        return vec![ParserError::new(ErrorCode::OPENAPI_002)
            .with_detail("document root is not an object")
            .at("#")];
    };

    let mut findings = Vec::new();
    if let Some(swagger) = root.get("swagger") {
        findings.push(
            ParserError::new(ErrorCode::OPENAPI_001)
                .with_detail(format!("Swagger {} documents are not supported", display(swagger)))
                .at("#/swagger")
                .with_metadata("version", swagger.clone()),
        );
        return findings;
    }

    match root.get("openapi") {
        None => findings.push(
            ParserError::new(ErrorCode::OPENAPI_001)
                .with_detail("missing 'openapi' field")
                .at("#"),
        ),
        Some(Value::String(version)) if version.starts_with("3.") => {}
        Some(other) => findings.push(
            ParserError::new(ErrorCode::OPENAPI_001)
                .with_detail(format!("'{}' is not 3.x", display(other)))
                .at("#/openapi")
                .with_metadata("version", other.clone()),
        ),
    }
    if !findings.is_empty() {
        return findings;
    }

    if !root.contains_key("info") {
        findings.push(
            ParserError::new(ErrorCode::OPENAPI_003)
                .with_detail("'info' is missing")
                .at("#/info"),
        );
    }
    if !root.contains_key("paths") && !root.contains_key("webhooks") {
        findings.push(
            ParserError::new(ErrorCode::OPENAPI_003)
                .with_detail("'paths' is missing")
                .at("#/paths"),
        );
    }
    findings
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_version_gate() {
        let swagger = validate(&json!({"swagger": "2.0", "info": {}}));
        assert_eq!(swagger.len(), 1);
        assert_eq!(swagger[0].code, ErrorCode::OPENAPI_001);
        assert!(!swagger[0].recoverable);

        assert_eq!(validate(&json!({"openapi": 3.0}))[0].code, ErrorCode::OPENAPI_001);
        assert_eq!(validate(&json!({"openapi": "2.5.0"}))[0].code, ErrorCode::OPENAPI_001);
        assert_eq!(validate(&json!([1, 2]))[0].code, ErrorCode::OPENAPI_002);
    }

    #[test]
    fn test_validate_missing_sections_warn() {
        let findings = validate(&json!({"openapi": "3.1.0"}));
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.severity == Severity::Warn));

        assert!(validate(&json!({"openapi": "3.1.0", "info": {}, "webhooks": {}})).is_empty());
    }

    #[tokio::test]
    async fn test_derived_artifacts_need_a_parse() {
        let parser = SpecParser::default();
        assert_eq!(parser.extract_endpoints(None).unwrap_err().code, ErrorCode::GENERAL_002);
        assert_eq!(parser.extract_schemas(None).unwrap_err().code, ErrorCode::GENERAL_002);
        assert_eq!(parser.to_protocol_manifest(None).unwrap_err().code, ErrorCode::GENERAL_002);
    }

    #[tokio::test]
    async fn test_custom_registry_overrides_defaults() {
        let mut registry = ErrorRegistry::new();
        registry.register(
            ErrorCode::OPENAPI_003,
            apicat_common::ErrorDefinition::new(
                "Missing section",
                Severity::Info,
                true,
                "Sections are optional in this catalog",
            ),
        );
        let mut parser = SpecParser::default().with_registry(registry);
        let outcome = parser
            .parse(SpecSource::Document(json!({"openapi": "3.0.0", "paths": {}})))
            .await
            .unwrap();
        let spec = outcome.spec().unwrap();
        assert_eq!(spec.warnings.len(), 1);
        assert_eq!(spec.warnings[0].severity, Severity::Info);
        assert_eq!(spec.warnings[0].suggestion, "Sections are optional in this catalog");
    }
}
