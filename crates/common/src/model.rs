//! Extracted endpoint and schema records
//!
//! These are the structural outputs of a parse: one [`Endpoint`] per HTTP
//! operation and one [`SchemaRecord`] per schema definition. Nested schema
//! bodies stay as raw document trees.

use crate::error::ParserError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// HTTP method of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
    Trace,
}

impl HttpMethod {
    /// Methods extracted unless configured otherwise
    pub const DEFAULT_SET: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    /// Every method OpenAPI allows on a path item
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Options,
        HttpMethod::Head,
        HttpMethod::Trace,
    ];

    /// Key used for this method inside a path item (lowercase)
    pub fn key(self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Patch => "patch",
            HttpMethod::Delete => "delete",
            HttpMethod::Options => "options",
            HttpMethod::Head => "head",
            HttpMethod::Trace => "trace",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key().to_ascii_uppercase())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown HTTP method '{}'", s))
    }
}

/// Parameter location (`in`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        }
    }
}

impl FromStr for ParameterLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(ParameterLocation::Path),
            "query" => Ok(ParameterLocation::Query),
            "header" => Ok(ParameterLocation::Header),
            "cookie" => Ok(ParameterLocation::Cookie),
            other => Err(format!("unknown parameter location '{}'", other)),
        }
    }
}

/// Operation parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,

    /// Location: path, query, header, cookie
    #[serde(rename = "in")]
    pub location: ParameterLocation,

    /// Required flag (always true for path parameters)
    pub required: bool,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Deprecated flag
    #[serde(default)]
    pub deprecated: bool,

    /// Schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    /// Example value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

impl Parameter {
    /// Identity used for de-duplication
    pub fn key(&self) -> (ParameterLocation, &str) {
        (self.location, self.name.as_str())
    }
}

/// Payload description for one content type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaContent {
    /// Schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    /// Single example
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,

    /// Named examples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Value>,
}

/// Request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Required flag
    #[serde(default)]
    pub required: bool,

    /// Content type → payload
    #[serde(default)]
    pub content: BTreeMap<String, MediaContent>,
}

/// Response for one status code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Header name → header object
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Value>,

    /// Content type → payload
    #[serde(default)]
    pub content: BTreeMap<String, MediaContent>,
}

/// Security scheme name → required scopes
pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

/// One HTTP operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Path template (e.g., "/users/{id}")
    pub path: String,

    /// HTTP method
    pub method: HttpMethod,

    /// Operation ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,

    /// Summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Deprecated flag
    #[serde(default)]
    pub deprecated: bool,

    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Merged path- and operation-level parameters, unique by (location, name)
    #[serde(default)]
    pub parameters: Vec<Parameter>,

    /// Request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,

    /// Status code → response
    #[serde(default)]
    pub responses: BTreeMap<String, Response>,

    /// Effective security requirements
    #[serde(default)]
    pub security: Vec<SecurityRequirement>,

    /// Server overrides
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Value>,

    /// External documentation object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_docs: Option<Value>,

    /// Callback names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callbacks: Vec<String>,
}

impl Endpoint {
    /// Look up a parameter by location and name
    pub fn parameter(&self, location: ParameterLocation, name: &str) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| p.location == location && p.name == name)
    }
}

/// One schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// Component name, or the JSON Pointer for inline schemas
    pub name: String,

    /// JSON Pointer to the definition
    pub pointer: String,

    /// True for schemas embedded in operations rather than named components
    #[serde(default)]
    pub inline: bool,

    /// Type: string, number, integer, boolean, array, object
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,

    /// Nullable (3.0 `nullable` or a 3.1 `"null"` type entry)
    #[serde(default)]
    pub nullable: bool,

    /// Title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Property name → schema
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,

    /// Required property names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    /// Format (e.g., int64, date-time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Enum values
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,

    /// Deprecated flag
    #[serde(default)]
    pub deprecated: bool,

    /// Full definition as it appears in the working document
    pub definition: Value,
}

/// Items produced by an extraction pass plus the failures it recorded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction<T> {
    pub items: Vec<T>,
    pub errors: Vec<ParserError>,
}

impl<T> Extraction<T> {
    pub fn new(items: Vec<T>, errors: Vec<ParserError>) -> Self {
        Self { items, errors }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: Vec::new(),
        }
    }
}
