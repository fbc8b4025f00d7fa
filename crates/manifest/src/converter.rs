//! Parsed spec → Protocol Manifest

use crate::types::{
    Authentication, Capability, Context, Interface, ManifestEndpoint, ManifestMetadata,
    Provenance, ProtocolManifest, ServiceInfo, Validation,
};
use crate::urn;
use apicat_common::{Endpoint, ParsedSpec};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// `metadata.status` of every manifest produced by this converter
pub const MANIFEST_STATUS: &str = "active";

/// Parser name recorded in `provenance.parser`
pub const DEFAULT_PARSER_NAME: &str = "apicat-openapi-parser";

const UNNAMED_SERVICE: &str = "unnamed-service";

/// Maps a [`ParsedSpec`] into a [`ProtocolManifest`]
///
/// Conversion reads the spec and never modifies it.
#[derive(Debug, Clone)]
pub struct ManifestConverter {
    parser_name: String,
    parser_version: String,
}

impl Default for ManifestConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestConverter {
    pub fn new() -> Self {
        Self {
            parser_name: DEFAULT_PARSER_NAME.to_string(),
            parser_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Record a different parser identity in the provenance block
    pub fn with_parser(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            parser_name: name.into(),
            parser_version: version.into(),
        }
    }

    pub fn convert(&self, spec: &ParsedSpec) -> ProtocolManifest {
        let name = spec.title().unwrap_or(UNNAMED_SERVICE).to_string();
        let version = spec.api_version().unwrap_or_default().to_string();

        let endpoints: Vec<ManifestEndpoint> = spec
            .endpoints
            .iter()
            .map(|endpoint| manifest_endpoint(&name, &version, endpoint))
            .collect();
        debug!(service = %name, endpoints = endpoints.len(), "converting spec to manifest");

        ProtocolManifest {
            service: ServiceInfo {
                urn: urn::service_urn(&name, &version),
                description: spec.description().map(str::to_string),
                name,
                version,
            },
            interface: Interface {
                endpoints,
                authentication: authentication(spec),
            },
            metadata: ManifestMetadata {
                status: MANIFEST_STATUS.to_string(),
                openapi_version: spec.version.clone(),
                spec_hash: spec.hash.clone(),
                parsed_at: spec.metadata.parsed_at,
                source_type: spec.metadata.source_type,
            },
            validation: validation(spec),
            context: context(spec),
            capabilities: capabilities(spec),
            provenance: Some(Provenance {
                parser: self.parser_name.clone(),
                parser_version: self.parser_version.clone(),
                parsed_at: spec.metadata.parsed_at,
                spec_version: spec.version.clone(),
                spec_hash: spec.hash.clone(),
                source: spec.metadata.source.clone(),
                source_type: spec.metadata.source_type,
            }),
        }
    }
}

fn manifest_endpoint(service: &str, version: &str, endpoint: &Endpoint) -> ManifestEndpoint {
    ManifestEndpoint {
        urn: urn::endpoint_urn(service, endpoint, version),
        method: endpoint.method,
        path: endpoint.path.clone(),
        operation_id: endpoint.operation_id.clone(),
        summary: endpoint.summary.clone(),
        description: endpoint.description.clone(),
        deprecated: endpoint.deprecated,
        tags: endpoint.tags.clone(),
        parameters: endpoint.parameters.clone(),
        request_body: endpoint.request_body.clone(),
        responses: endpoint.responses.clone(),
        security: endpoint.security.clone(),
    }
}

/// Map the first declared security scheme
fn authentication(spec: &ParsedSpec) -> Authentication {
    let first = spec
        .components
        .as_ref()
        .and_then(|c| c.get("securitySchemes"))
        .and_then(Value::as_object)
        .and_then(|schemes| schemes.iter().next());
    let Some((scheme_name, scheme)) = first else {
        return Authentication::None;
    };

    let text = |key: &str| scheme.get(key).and_then(Value::as_str).map(str::to_string);
    let scheme_name = scheme_name.clone();

    match text("type").as_deref() {
        Some("apiKey") => match (text("name"), text("in")) {
            (Some(name), Some(location)) => Authentication::ApiKey {
                scheme_name,
                name,
                location,
                scheme: None,
                bearer_format: None,
            },
            _ => Authentication::None,
        },
        Some("http") if text("scheme").is_some_and(|s| s.eq_ignore_ascii_case("bearer")) => {
            Authentication::ApiKey {
                scheme_name,
                name: "Authorization".to_string(),
                location: "header".to_string(),
                scheme: Some("bearer".to_string()),
                bearer_format: text("bearerFormat"),
            }
        }
        Some("oauth2") => {
            let flows = scheme.get("flows").and_then(Value::as_object);
            let scopes: BTreeSet<String> = flows
                .into_iter()
                .flat_map(|flows| flows.values())
                .filter_map(|flow| flow.get("scopes").and_then(Value::as_object))
                .flat_map(|scopes| scopes.keys().cloned())
                .collect();
            Authentication::Oauth2 {
                scheme_name,
                flows: flows
                    .map(|f| f.keys().cloned().collect())
                    .unwrap_or_default(),
                scopes: scopes.into_iter().collect(),
            }
        }
        Some("openIdConnect") => Authentication::OpenidConnect {
            scheme_name,
            url: text("openIdConnectUrl"),
        },
        _ => Authentication::None,
    }
}

fn validation(spec: &ParsedSpec) -> Option<Validation> {
    let schemas: BTreeMap<String, Value> = spec
        .named_schemas()
        .map(|schema| (schema.name.clone(), schema.definition.clone()))
        .collect();
    (!schemas.is_empty()).then_some(Validation { schemas })
}

fn context(spec: &ParsedSpec) -> Option<Context> {
    let info = spec.info.as_ref();
    let context = Context {
        contact: info.and_then(|i| i.get("contact")).cloned(),
        servers: spec.servers.clone(),
        documentation: spec.document.get("externalDocs").cloned(),
        license: info.and_then(|i| i.get("license")).cloned(),
    };
    (!context.is_empty()).then_some(context)
}

fn capabilities(spec: &ParsedSpec) -> Option<Vec<Capability>> {
    let capabilities: Vec<Capability> = spec
        .tags
        .iter()
        .filter_map(|tag| {
            let name = tag.get("name")?.as_str()?.to_string();
            let description = tag
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(Capability { name, description })
        })
        .collect();
    (!capabilities.is_empty()).then_some(capabilities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apicat_common::{HttpMethod, SchemaRecord, SourceKind};
    use serde_json::json;

    fn spec(document: Value) -> ParsedSpec {
        ParsedSpec::new(document, SourceKind::Object, None)
    }

    fn endpoint(path: &str, operation_id: Option<&str>) -> Endpoint {
        Endpoint {
            path: path.to_string(),
            method: HttpMethod::Get,
            operation_id: operation_id.map(str::to_string),
            summary: None,
            description: None,
            deprecated: false,
            tags: Vec::new(),
            parameters: Vec::new(),
            request_body: None,
            responses: BTreeMap::new(),
            security: Vec::new(),
            servers: Vec::new(),
            external_docs: None,
            callbacks: Vec::new(),
        }
    }

    #[test]
    fn test_service_block() {
        let mut parsed = spec(json!({
            "openapi": "3.0.3",
            "info": {"title": "Order API", "version": "1.2.3", "description": "Orders"}
        }));
        parsed.hash = Some("00112233aabbccdd".to_string());
        parsed.endpoints = vec![endpoint("/orders", Some("listOrders")), endpoint("/orders/{id}", None)];

        let manifest = ManifestConverter::new().convert(&parsed);
        assert_eq!(manifest.service.urn, "urn:proto:api:order-api/service@1.2.3");
        assert_eq!(manifest.service.description.as_deref(), Some("Orders"));
        assert_eq!(manifest.interface.endpoints.len(), 2);
        assert_eq!(
            manifest.interface.endpoints[1].urn,
            "urn:proto:api:order-api/endpoint/get-orders-id@1.2.3"
        );
        assert_eq!(manifest.metadata.status, MANIFEST_STATUS);
        assert_eq!(manifest.metadata.openapi_version, "3.0.3");
        assert_eq!(manifest.metadata.spec_hash.as_deref(), Some("00112233aabbccdd"));

        let provenance = manifest.provenance.unwrap();
        assert_eq!(provenance.parser, DEFAULT_PARSER_NAME);
        assert_eq!(provenance.parser_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(provenance.source_type, SourceKind::Object);
    }

    #[test]
    fn test_authentication_mapping() {
        let auth = |schemes: Value| {
            authentication(&spec(json!({"components": {"securitySchemes": schemes}})))
        };

        assert_eq!(
            auth(json!({"key": {"type": "apiKey", "name": "X-API-Key", "in": "header"}})),
            Authentication::ApiKey {
                scheme_name: "key".to_string(),
                name: "X-API-Key".to_string(),
                location: "header".to_string(),
                scheme: None,
                bearer_format: None,
            }
        );

        let bearer = auth(json!({"jwt": {"type": "http", "scheme": "bearer", "bearerFormat": "JWT"}}));
        assert!(matches!(
            bearer,
            Authentication::ApiKey { ref name, ref scheme, .. } if name == "Authorization" && scheme.as_deref() == Some("bearer")
        ));

        let oauth = auth(json!({"oauth": {"type": "oauth2", "flows": {
            "authorizationCode": {"scopes": {"write": "", "read": ""}},
            "clientCredentials": {"scopes": {"read": ""}}
        }}}));
        assert_eq!(
            oauth,
            Authentication::Oauth2 {
                scheme_name: "oauth".to_string(),
                flows: vec!["authorizationCode".to_string(), "clientCredentials".to_string()],
                scopes: vec!["read".to_string(), "write".to_string()],
            }
        );

        let oidc = auth(json!({"oidc": {"type": "openIdConnect", "openIdConnectUrl": "https://id.example.com/.well-known"}}));
        assert!(matches!(oidc, Authentication::OpenidConnect { url: Some(_), .. }));

        assert_eq!(auth(json!({"basic": {"type": "http", "scheme": "basic"}})), Authentication::None);
        assert_eq!(authentication(&spec(json!({}))), Authentication::None);
    }

    #[test]
    fn test_optional_blocks() {
        let mut parsed = spec(json!({
            "openapi": "3.1.0",
            "info": {"title": "Pets", "version": "v1", "license": {"name": "MIT"}},
            "servers": [{"url": "https://pets.example.com"}],
            "tags": [{"name": "pets", "description": "Pet operations"}, {"name": "store"}]
        }));
        parsed.schemas = vec![
            SchemaRecord {
                name: "Pet".to_string(),
                pointer: "#/components/schemas/Pet".to_string(),
                inline: false,
                schema_type: Some("object".to_string()),
                nullable: false,
                title: None,
                description: None,
                properties: BTreeMap::new(),
                required: Vec::new(),
                format: None,
                enum_values: Vec::new(),
                deprecated: false,
                definition: json!({"type": "object"}),
            },
            SchemaRecord {
                name: "#/paths/~1pets/get/parameters/0/schema".to_string(),
                pointer: "#/paths/~1pets/get/parameters/0/schema".to_string(),
                inline: true,
                schema_type: Some("integer".to_string()),
                nullable: false,
                title: None,
                description: None,
                properties: BTreeMap::new(),
                required: Vec::new(),
                format: None,
                enum_values: Vec::new(),
                deprecated: false,
                definition: json!({"type": "integer"}),
            },
        ];

        let before = parsed.clone();
        let manifest = ManifestConverter::new().convert(&parsed);
        assert_eq!(parsed, before);

        assert_eq!(manifest.service.urn, "urn:proto:api:pets/service");
        let validation = manifest.validation.unwrap();
        assert_eq!(validation.schemas.keys().collect::<Vec<_>>(), vec!["Pet"]);

        let context = manifest.context.unwrap();
        assert_eq!(context.servers.len(), 1);
        assert_eq!(context.license.unwrap()["name"], "MIT");
        assert!(context.contact.is_none());

        let capabilities = manifest.capabilities.unwrap();
        assert_eq!(capabilities.len(), 2);
        assert_eq!(capabilities[0].description.as_deref(), Some("Pet operations"));
    }

    #[test]
    fn test_empty_spec_omits_optional_blocks() {
        let manifest = ManifestConverter::new().convert(&spec(json!({"openapi": "3.0.0"})));
        assert_eq!(manifest.service.name, UNNAMED_SERVICE);
        assert!(manifest.validation.is_none());
        assert!(manifest.context.is_none());
        assert!(manifest.capabilities.is_none());

        let wire = serde_json::to_value(&manifest).unwrap();
        assert!(wire.get("validation").is_none());
        assert_eq!(wire["interface"]["authentication"]["type"], "none");
    }
}
