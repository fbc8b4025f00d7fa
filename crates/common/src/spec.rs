//! Parse results

use crate::error::{ErrorCode, ParserError};
use crate::model::{Endpoint, SchemaRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Where a document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// In-memory structured document
    Object,
    /// Raw JSON/YAML text
    Text,
    /// Filesystem path
    File,
    /// Byte stream
    Stream,
    /// http(s) URL
    Url,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Object => "object",
            SourceKind::Text => "text",
            SourceKind::File => "file",
            SourceKind::Stream => "stream",
            SourceKind::Url => "url",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about one parse run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecMetadata {
    /// When parsing started
    pub parsed_at: DateTime<Utc>,

    /// Kind of source that was ingested
    pub source_type: SourceKind,

    /// Path or URL of the source, when it had one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Number of distinct external references resolved
    pub external_refs_resolved: usize,

    /// Whether any circular reference was found
    pub has_circular: bool,

    /// Each cycle as an ordered list of locations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub circular_refs: Vec<Vec<String>>,
}

/// Normalized result of parsing one OpenAPI document
///
/// Built once per parse call. Section fields mirror the working document
/// so callers can read them without walking the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSpec {
    /// Document exactly as ingested
    pub raw: Value,

    /// Working document (external refs resolved, local refs dereferenced)
    pub document: Value,

    /// Declared `openapi` version
    pub version: String,

    /// `info` section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,

    /// `paths` section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Value>,

    /// `components` section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Value>,

    /// `servers` section
    #[serde(default)]
    pub servers: Vec<Value>,

    /// Document-level security requirements
    #[serde(default)]
    pub security: Vec<Value>,

    /// Tag definitions
    #[serde(default)]
    pub tags: Vec<Value>,

    /// Content hash of the raw document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// Run metadata
    pub metadata: SpecMetadata,

    /// Collected `ERROR` entries
    #[serde(default)]
    pub errors: Vec<ParserError>,

    /// Collected `WARN`/`INFO` entries
    #[serde(default)]
    pub warnings: Vec<ParserError>,

    pub has_errors: bool,

    pub has_warnings: bool,

    /// Extracted operations
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    /// Extracted schema definitions
    #[serde(default)]
    pub schemas: Vec<SchemaRecord>,
}

impl ParsedSpec {
    /// Start a spec from an ingested document; the working document starts
    /// as a copy of the raw one
    pub fn new(raw: Value, source_type: SourceKind, source: Option<String>) -> Self {
        let mut spec = Self {
            document: raw.clone(),
            raw,
            version: String::new(),
            info: None,
            paths: None,
            components: None,
            servers: Vec::new(),
            security: Vec::new(),
            tags: Vec::new(),
            hash: None,
            metadata: SpecMetadata {
                parsed_at: Utc::now(),
                source_type,
                source,
                external_refs_resolved: 0,
                has_circular: false,
                circular_refs: Vec::new(),
            },
            errors: Vec::new(),
            warnings: Vec::new(),
            has_errors: false,
            has_warnings: false,
            endpoints: Vec::new(),
            schemas: Vec::new(),
        };
        spec.refresh_sections();
        spec
    }

    /// Replace the working document and re-copy its sections
    pub fn set_document(&mut self, document: Value) {
        self.document = document;
        self.refresh_sections();
    }

    fn refresh_sections(&mut self) {
        let doc = &self.document;
        self.version = doc
            .get("openapi")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.info = doc.get("info").cloned();
        self.paths = doc.get("paths").cloned();
        self.components = doc.get("components").cloned();
        self.servers = array_section(doc, "servers");
        self.security = array_section(doc, "security");
        self.tags = array_section(doc, "tags");
    }

    /// `info.title`
    pub fn title(&self) -> Option<&str> {
        self.info_field("title")
    }

    /// `info.version`
    pub fn api_version(&self) -> Option<&str> {
        self.info_field("version")
    }

    /// `info.description`
    pub fn description(&self) -> Option<&str> {
        self.info_field("description")
    }

    fn info_field(&self, key: &str) -> Option<&str> {
        self.info.as_ref()?.get(key)?.as_str()
    }

    /// Named component schemas only
    pub fn named_schemas(&self) -> impl Iterator<Item = &SchemaRecord> {
        self.schemas.iter().filter(|s| !s.inline)
    }
}

fn array_section(doc: &Value, key: &str) -> Vec<Value> {
    doc.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Flagged partial record returned when a parse cannot complete
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedParse {
    /// Always true; marks the record as a failure on the wire
    pub error: bool,

    /// Message of the failure that stopped the parse
    pub message: String,

    /// Code of the failure that stopped the parse
    pub code: ErrorCode,

    /// Errors collected before the failure (including it)
    pub errors: Vec<ParserError>,

    /// Warnings collected before the failure
    pub warnings: Vec<ParserError>,

    /// Whatever spec fragment existed at failure time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<ParsedSpec>,
}

impl FailedParse {
    pub fn new(
        cause: &ParserError,
        errors: Vec<ParserError>,
        warnings: Vec<ParserError>,
        partial: Option<ParsedSpec>,
    ) -> Self {
        Self {
            error: true,
            message: cause.message.clone(),
            code: cause.code.clone(),
            errors,
            warnings,
            partial,
        }
    }
}

/// Result of a parse in `collect`/`ignore` mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParseOutcome {
    /// Parse ran to completion (possibly with recorded errors)
    Parsed(ParsedSpec),
    /// Parse stopped early
    Failed(FailedParse),
}

impl ParseOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ParseOutcome::Failed(_))
    }

    /// Completed spec, or the partial spec of a failed parse
    pub fn spec(&self) -> Option<&ParsedSpec> {
        match self {
            ParseOutcome::Parsed(spec) => Some(spec),
            ParseOutcome::Failed(failed) => failed.partial.as_ref(),
        }
    }

    /// Completed spec only
    pub fn into_parsed(self) -> Option<ParsedSpec> {
        match self {
            ParseOutcome::Parsed(spec) => Some(spec),
            ParseOutcome::Failed(_) => None,
        }
    }

    pub fn errors(&self) -> &[ParserError] {
        match self {
            ParseOutcome::Parsed(spec) => &spec.errors,
            ParseOutcome::Failed(failed) => &failed.errors,
        }
    }

    pub fn warnings(&self) -> &[ParserError] {
        match self {
            ParseOutcome::Parsed(spec) => &spec.warnings,
            ParseOutcome::Failed(failed) => &failed.warnings,
        }
    }
}
