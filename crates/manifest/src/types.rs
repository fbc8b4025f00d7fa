//! Protocol Manifest wire shape
//!
//! Field names and nesting are a stable contract with catalog consumers.

use apicat_common::{HttpMethod, Parameter, RequestBody, Response, SecurityRequirement, SourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Normalized governance artifact derived from a parsed spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolManifest {
    /// Service identity
    pub service: ServiceInfo,

    /// Callable surface
    pub interface: Interface,

    /// Lifecycle and content identity
    pub metadata: ManifestMetadata,

    /// Named component schemas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,

    /// Contact, servers, documentation and license
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,

    /// One entry per spec tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<Capability>>,

    /// How the manifest was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// `urn:proto:api:<slug>/service[@<semver>]`
    pub urn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub endpoints: Vec<ManifestEndpoint>,
    pub authentication: Authentication,
}

/// One operation as exposed in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEndpoint {
    pub urn: String,
    pub method: HttpMethod,
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub responses: BTreeMap<String, Response>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityRequirement>,
}

/// Authentication derived from the first declared security scheme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Authentication {
    /// API keys, and HTTP bearer tokens carried in `Authorization`
    ApiKey {
        /// Security scheme name in `components.securitySchemes`
        scheme_name: String,

        /// Header, query or cookie parameter name
        name: String,

        /// header, query or cookie
        #[serde(rename = "in")]
        location: String,

        /// HTTP auth scheme (e.g., "bearer") when mapped from an `http` scheme
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scheme: Option<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        bearer_format: Option<String>,
    },
    Oauth2 {
        scheme_name: String,

        /// Flow names (authorizationCode, clientCredentials, ...)
        flows: Vec<String>,

        /// Union of scopes across flows, sorted
        scopes: Vec<String>,
    },
    OpenidConnect {
        scheme_name: String,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Lifecycle status; bumped together with `provenance.parser_version`
    /// when the wire shape changes
    pub status: String,
    pub openapi_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_hash: Option<String>,
    pub parsed_at: DateTime<Utc>,
    pub source_type: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    /// Schema name → definition
    pub schemas: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Value>,

    /// `externalDocs` of the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<Value>,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.contact.is_none()
            && self.servers.is_empty()
            && self.documentation.is_none()
            && self.license.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub parser: String,
    pub parser_version: String,
    pub parsed_at: DateTime<Utc>,
    pub spec_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub source_type: SourceKind,
}
