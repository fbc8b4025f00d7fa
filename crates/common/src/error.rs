//! Structured error taxonomy
//!
//! Every failure the pipeline records is a [`ParserError`] keyed by an
//! [`ErrorCode`]. Codes are grouped into domains by prefix:
//!
//! | Prefix      | Domain                          |
//! |-------------|---------------------------------|
//! | `OPENAPI_`  | spec version and document shape |
//! | `REF_`      | reference resolution            |
//! | `SCHEMA_`   | operation and schema structure  |
//! | `NET_`      | network access                  |
//! | `PARSE_`    | ingestion                       |
//! | `GENERAL_`  | uncategorized                   |
//!
//! The [`ErrorRegistry`] maps each code to its default message, severity,
//! recoverability and suggestion. Unknown codes resolve to a generic
//! fallback definition so any code can be formatted.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Severity of a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Stops processing in `throw` mode
    Error,
    /// Recorded but never stops processing
    Warn,
    /// Informational
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "ERROR",
            Severity::Warn => "WARN",
            Severity::Info => "INFO",
        };
        f.write_str(s)
    }
}

/// Error domain derived from a code's prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorDomain {
    OpenApi,
    Reference,
    Schema,
    Network,
    Parse,
    General,
}

impl ErrorDomain {
    /// Code prefix for this domain (without the trailing underscore)
    pub fn prefix(self) -> &'static str {
        match self {
            ErrorDomain::OpenApi => "OPENAPI",
            ErrorDomain::Reference => "REF",
            ErrorDomain::Schema => "SCHEMA",
            ErrorDomain::Network => "NET",
            ErrorDomain::Parse => "PARSE",
            ErrorDomain::General => "GENERAL",
        }
    }

    fn from_code(code: &str) -> Self {
        match code.split('_').next().unwrap_or_default() {
            "OPENAPI" => ErrorDomain::OpenApi,
            "REF" => ErrorDomain::Reference,
            "SCHEMA" => ErrorDomain::Schema,
            "NET" => ErrorDomain::Network,
            "PARSE" => ErrorDomain::Parse,
            _ => ErrorDomain::General,
        }
    }
}

/// Taxonomy key such as `OPENAPI_001`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(Cow<'static, str>);

impl ErrorCode {
    /// Unsupported or missing OpenAPI version
    pub const OPENAPI_001: ErrorCode = ErrorCode::from_static("OPENAPI_001");
    /// Document root is not a valid OpenAPI object
    pub const OPENAPI_002: ErrorCode = ErrorCode::from_static("OPENAPI_002");
    /// Recommended top-level section missing
    pub const OPENAPI_003: ErrorCode = ErrorCode::from_static("OPENAPI_003");

    /// Reference target not found
    pub const REF_001: ErrorCode = ErrorCode::from_static("REF_001");
    /// Circular reference
    pub const REF_002: ErrorCode = ErrorCode::from_static("REF_002");
    /// Maximum reference depth exceeded
    pub const REF_003: ErrorCode = ErrorCode::from_static("REF_003");
    /// External reference could not be loaded
    pub const REF_004: ErrorCode = ErrorCode::from_static("REF_004");
    /// Malformed or unsupported reference URI
    pub const REF_005: ErrorCode = ErrorCode::from_static("REF_005");

    /// Operation could not be extracted
    pub const SCHEMA_001: ErrorCode = ErrorCode::from_static("SCHEMA_001");
    /// Component schema is malformed
    pub const SCHEMA_002: ErrorCode = ErrorCode::from_static("SCHEMA_002");

    /// Request timed out
    pub const NET_001: ErrorCode = ErrorCode::from_static("NET_001");
    /// Non-success HTTP status
    pub const NET_002: ErrorCode = ErrorCode::from_static("NET_002");
    /// Connection failure
    pub const NET_003: ErrorCode = ErrorCode::from_static("NET_003");

    /// Input is not valid JSON or YAML
    pub const PARSE_001: ErrorCode = ErrorCode::from_static("PARSE_001");
    /// Input could not be read
    pub const PARSE_002: ErrorCode = ErrorCode::from_static("PARSE_002");
    /// Input exceeds the size ceiling
    pub const PARSE_003: ErrorCode = ErrorCode::from_static("PARSE_003");
    /// Input is empty or of an unsupported kind
    pub const PARSE_004: ErrorCode = ErrorCode::from_static("PARSE_004");

    /// Unexpected failure
    pub const GENERAL_001: ErrorCode = ErrorCode::from_static("GENERAL_001");
    /// Derived artifact requested before any successful parse
    pub const GENERAL_002: ErrorCode = ErrorCode::from_static("GENERAL_002");

    /// Build a code from a static string
    pub const fn from_static(code: &'static str) -> Self {
        ErrorCode(Cow::Borrowed(code))
    }

    /// Build a code from any string (custom registry entries)
    pub fn new(code: impl Into<String>) -> Self {
        ErrorCode(Cow::Owned(code.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Domain this code belongs to
    pub fn domain(&self) -> ErrorDomain {
        ErrorDomain::from_code(&self.0)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registered defaults for one error code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDefinition {
    /// Default human message
    pub message: String,

    /// Default severity
    pub severity: Severity,

    /// Whether processing can continue past this failure
    pub recoverable: bool,

    /// Suggested remedy
    pub suggestion: String,
}

impl ErrorDefinition {
    pub fn new(
        message: impl Into<String>,
        severity: Severity,
        recoverable: bool,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            severity,
            recoverable,
            suggestion: suggestion.into(),
        }
    }
}

const BUILTIN_DEFINITIONS: &[(&str, &str, Severity, bool, &str)] = &[
    (
        "OPENAPI_001",
        "Unsupported OpenAPI version",
        Severity::Error,
        false,
        "Provide an OpenAPI 3.0.x or 3.1.x document; convert Swagger 2.0 documents first",
    ),
    (
        "OPENAPI_002",
        "Invalid OpenAPI document structure",
        Severity::Error,
        false,
        "The document root must be an object with an 'openapi' field",
    ),
    (
        "OPENAPI_003",
        "Missing recommended OpenAPI section",
        Severity::Warn,
        true,
        "Add the missing top-level section to the document",
    ),
    (
        "REF_001",
        "Reference target not found",
        Severity::Error,
        true,
        "Check that the JSON Pointer in the $ref matches an existing location",
    ),
    (
        "REF_002",
        "Circular reference detected",
        Severity::Error,
        true,
        "Break the reference cycle or enable allow_circular",
    ),
    (
        "REF_003",
        "Maximum reference depth exceeded",
        Severity::Error,
        true,
        "Reduce reference nesting or raise max_ref_depth",
    ),
    (
        "REF_004",
        "External reference could not be resolved",
        Severity::Error,
        true,
        "Verify that the referenced file or URL exists and contains JSON or YAML",
    ),
    (
        "REF_005",
        "Invalid or unsupported reference URI",
        Severity::Error,
        true,
        "Use http://, https:// or file:// references, or configure a base path or base URL",
    ),
    (
        "SCHEMA_001",
        "Invalid operation definition",
        Severity::Error,
        true,
        "Check the operation's parameters, request body and responses",
    ),
    (
        "SCHEMA_002",
        "Invalid schema definition",
        Severity::Warn,
        true,
        "Component schemas must be objects",
    ),
    (
        "NET_001",
        "Network request timed out",
        Severity::Error,
        true,
        "Increase the request timeout or check connectivity to the host",
    ),
    (
        "NET_002",
        "Unexpected HTTP response status",
        Severity::Error,
        true,
        "Confirm the URL is correct and accessible without authentication",
    ),
    (
        "NET_003",
        "Network connection failed",
        Severity::Error,
        true,
        "Check network connectivity and DNS resolution",
    ),
    (
        "PARSE_001",
        "Document could not be parsed",
        Severity::Error,
        false,
        "Ensure the input is valid JSON or YAML",
    ),
    (
        "PARSE_002",
        "Document could not be read",
        Severity::Error,
        false,
        "Check that the path exists and is readable",
    ),
    (
        "PARSE_003",
        "Document exceeds the maximum input size",
        Severity::Error,
        false,
        "Raise max_input_bytes or split the document",
    ),
    (
        "PARSE_004",
        "Empty or unsupported input",
        Severity::Error,
        false,
        "Provide a JSON or YAML document, a file path or a URL",
    ),
    (
        "GENERAL_001",
        "Unexpected error",
        Severity::Error,
        false,
        "Re-run with debug logging enabled and report the issue",
    ),
    (
        "GENERAL_002",
        "No parsed specification available",
        Severity::Error,
        true,
        "Call parse() successfully before requesting derived artifacts",
    ),
];

static BUILTIN_REGISTRY: Lazy<ErrorRegistry> = Lazy::new(ErrorRegistry::new);

/// Code → definition table with a generic fallback
#[derive(Debug, Clone)]
pub struct ErrorRegistry {
    definitions: HashMap<ErrorCode, ErrorDefinition>,
    fallback: ErrorDefinition,
}

impl ErrorRegistry {
    /// Registry populated with the built-in taxonomy
    pub fn new() -> Self {
        let definitions = BUILTIN_DEFINITIONS
            .iter()
            .map(|(code, message, severity, recoverable, suggestion)| {
                (
                    ErrorCode::from_static(code),
                    ErrorDefinition::new(*message, *severity, *recoverable, *suggestion),
                )
            })
            .collect::<HashMap<_, _>>();

        let fallback = definitions
            .get(&ErrorCode::GENERAL_001)
            .cloned()
            .unwrap_or_else(|| {
                ErrorDefinition::new("Unexpected error", Severity::Error, false, "")
            });

        Self {
            definitions,
            fallback,
        }
    }

    /// Shared instance holding only the built-in codes
    pub fn builtin() -> &'static ErrorRegistry {
        &BUILTIN_REGISTRY
    }

    /// Add or replace a definition, returning the previous one
    pub fn register(
        &mut self,
        code: ErrorCode,
        definition: ErrorDefinition,
    ) -> Option<ErrorDefinition> {
        self.definitions.insert(code, definition)
    }

    pub fn is_registered(&self, code: &ErrorCode) -> bool {
        self.definitions.contains_key(code)
    }

    /// Definition for a code, or the generic fallback for unknown codes
    pub fn lookup(&self, code: &ErrorCode) -> &ErrorDefinition {
        self.definitions.get(code).unwrap_or(&self.fallback)
    }

    /// All registered codes, sorted
    pub fn codes(&self) -> Vec<&ErrorCode> {
        let mut codes: Vec<_> = self.definitions.keys().collect();
        codes.sort();
        codes
    }

    /// Create an error carrying this registry's defaults for `code`
    pub fn create(&self, code: ErrorCode) -> ParserError {
        let definition = self.lookup(&code);
        ParserError {
            message: definition.message.clone(),
            severity: definition.severity,
            recoverable: definition.recoverable,
            suggestion: definition.suggestion.clone(),
            code,
            location: None,
            metadata: BTreeMap::new(),
        }
    }
}

impl Default for ErrorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One recorded pipeline failure
///
/// Built once through the builder methods below and never mutated after it
/// has been handed to a collector.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct ParserError {
    /// Taxonomy key
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,

    /// Severity
    pub severity: Severity,

    /// Whether processing can continue
    pub recoverable: bool,

    /// Suggested remedy
    pub suggestion: String,

    /// Location path (JSON Pointer or URI) where the failure was detected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Additional structured detail
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ParserError {
    /// Create an error using the built-in registry defaults
    pub fn new(code: ErrorCode) -> Self {
        ErrorRegistry::builtin().create(code)
    }

    /// Replace the default message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Append detail to the current message (`"<message>: <detail>"`)
    pub fn with_detail(mut self, detail: impl fmt::Display) -> Self {
        self.message = format!("{}: {}", self.message, detail);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    /// Attach the location where the failure was detected
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn domain(&self) -> ErrorDomain {
        self.code.domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_codes_resolve() {
        let registry = ErrorRegistry::new();
        let def = registry.lookup(&ErrorCode::OPENAPI_001);
        assert_eq!(def.severity, Severity::Error);
        assert!(!def.recoverable);

        let def = registry.lookup(&ErrorCode::OPENAPI_003);
        assert_eq!(def.severity, Severity::Warn);
        assert!(def.recoverable);
    }

    #[test]
    fn test_unknown_code_uses_fallback() {
        let registry = ErrorRegistry::new();
        let code = ErrorCode::new("VENDOR_042");
        assert!(!registry.is_registered(&code));

        let err = registry.create(code.clone());
        assert_eq!(err.code, code);
        assert_eq!(err.message, "Unexpected error");
        assert_eq!(err.domain(), ErrorDomain::General);
    }

    #[test]
    fn test_custom_registration_overrides() {
        let mut registry = ErrorRegistry::new();
        let previous = registry.register(
            ErrorCode::SCHEMA_002,
            ErrorDefinition::new("Schema rejected", Severity::Error, false, "Fix it"),
        );
        assert!(previous.is_some());

        let err = registry.create(ErrorCode::SCHEMA_002);
        assert_eq!(err.message, "Schema rejected");
        assert_eq!(err.severity, Severity::Error);
    }

    #[test]
    fn test_domain_from_prefix() {
        assert_eq!(ErrorCode::REF_003.domain(), ErrorDomain::Reference);
        assert_eq!(ErrorCode::NET_001.domain(), ErrorDomain::Network);
        assert_eq!(ErrorCode::PARSE_002.domain(), ErrorDomain::Parse);
        assert_eq!(ErrorCode::OPENAPI_002.domain(), ErrorDomain::OpenApi);
        assert_eq!(ErrorDomain::Schema.prefix(), "SCHEMA");
    }

    #[test]
    fn test_builder_and_display() {
        let err = ParserError::new(ErrorCode::REF_001)
            .with_detail("#/components/schemas/Missing")
            .at("#/paths/~1users/get")
            .with_metadata("segment", "Missing");

        assert_eq!(
            err.to_string(),
            "[REF_001] Reference target not found: #/components/schemas/Missing"
        );
        assert_eq!(err.location.as_deref(), Some("#/paths/~1users/get"));
        assert_eq!(err.metadata["segment"], "Missing");
    }

    #[test]
    fn test_serialized_shape() {
        let err = ParserError::new(ErrorCode::NET_001).with_severity(Severity::Warn);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "NET_001");
        assert_eq!(json["severity"], "WARN");
        assert!(json.get("location").is_none());
        assert!(json.get("metadata").is_none());
    }
}
