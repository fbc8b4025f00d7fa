//! Integration tests for Protocol Manifest conversion

use apicat_common::{Endpoint, ParsedSpec, SchemaRecord, SourceKind};
use apicat_manifest::{Authentication, ManifestConverter, ProtocolManifest};
use serde_json::{json, Value};

fn spec_with(raw: Value, endpoints: Value) -> ParsedSpec {
    let mut spec = ParsedSpec::new(raw, SourceKind::Object, None);
    spec.endpoints = serde_json::from_value::<Vec<Endpoint>>(endpoints).unwrap();
    spec.hash = Some("00112233aabbccdd".to_string());
    spec
}

fn order_api(version: &str) -> ParsedSpec {
    let mut spec = spec_with(
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Order API", "version": version, "description": "Orders"},
            "servers": [{"url": "https://api.example.com"}],
            "tags": [{"name": "orders", "description": "Order management"}],
            "components": {
                "securitySchemes": {"bearerAuth": {"type": "http", "scheme": "bearer", "bearerFormat": "JWT"}},
                "schemas": {"Order": {"type": "object"}}
            }
        }),
        json!([
            {"path": "/orders", "method": "GET", "operation_id": "listOrders"},
            {"path": "/orders/{id}", "method": "DELETE"}
        ]),
    );
    spec.schemas = vec![serde_json::from_value::<SchemaRecord>(json!({
        "name": "Order",
        "pointer": "#/components/schemas/Order",
        "type": "object",
        "definition": {"type": "object"}
    }))
    .unwrap()];
    spec
}

#[test]
fn test_semver_version_is_appended_to_urns() {
    let manifest = ManifestConverter::new().convert(&order_api("1.2.3"));

    assert_eq!(manifest.service.name, "Order API");
    assert_eq!(manifest.service.urn, "urn:proto:api:order-api/service@1.2.3");
    assert_eq!(
        manifest.interface.endpoints[0].urn,
        "urn:proto:api:order-api/endpoint/listorders@1.2.3"
    );
    assert_eq!(
        manifest.interface.endpoints[1].urn,
        "urn:proto:api:order-api/endpoint/delete-orders-id@1.2.3"
    );
}

#[test]
fn test_non_semver_version_has_no_suffix() {
    for version in ["v1", "1.0", "2024-01-01", "1.2.3-beta"] {
        let manifest = ManifestConverter::new().convert(&order_api(version));
        assert_eq!(manifest.service.urn, "urn:proto:api:order-api/service");
        assert_eq!(manifest.service.version, version);
        assert!(manifest
            .interface
            .endpoints
            .iter()
            .all(|e| !e.urn.contains('@')));
    }
}

#[test]
fn test_manifest_wire_shape() {
    let manifest = ManifestConverter::new().convert(&order_api("1.2.3"));
    let wire = serde_json::to_value(&manifest).unwrap();

    let keys: Vec<&str> = wire.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        [
            "service",
            "interface",
            "metadata",
            "validation",
            "context",
            "capabilities",
            "provenance"
        ]
    );
    assert_eq!(wire["metadata"]["status"], "active");
    assert_eq!(wire["metadata"]["openapi_version"], "3.0.3");
    assert_eq!(wire["metadata"]["spec_hash"], "00112233aabbccdd");
    assert_eq!(wire["metadata"]["source_type"], "object");
    assert_eq!(wire["interface"]["endpoints"][0]["method"], "GET");
    assert_eq!(wire["interface"]["authentication"]["type"], "api_key");
    assert_eq!(wire["interface"]["authentication"]["in"], "header");
    assert_eq!(wire["validation"]["schemas"]["Order"]["type"], "object");
    assert_eq!(wire["context"]["servers"][0]["url"], "https://api.example.com");
    assert_eq!(wire["capabilities"][0]["name"], "orders");
    assert_eq!(wire["provenance"]["parser"], "apicat-openapi-parser");

    let reloaded: ProtocolManifest = serde_json::from_value(wire).unwrap();
    assert_eq!(reloaded, manifest);
}

#[test]
fn test_bearer_scheme_maps_to_authorization_header() {
    let manifest = ManifestConverter::new().convert(&order_api("1.2.3"));
    match manifest.interface.authentication {
        Authentication::ApiKey {
            name,
            location,
            scheme,
            ..
        } => {
            assert_eq!(name, "Authorization");
            assert_eq!(location, "header");
            assert_eq!(scheme.as_deref(), Some("bearer"));
        }
        other => panic!("unexpected authentication {:?}", other),
    }
}

#[test]
fn test_bare_spec_yields_minimal_manifest() {
    let spec = spec_with(json!({"openapi": "3.1.0"}), json!([]));
    let manifest = ManifestConverter::with_parser("catalog-importer", "9.9.9").convert(&spec);

    assert_eq!(manifest.service.urn, "urn:proto:api:unnamed-service/service");
    assert!(manifest.interface.endpoints.is_empty());
    assert_eq!(manifest.interface.authentication, Authentication::None);
    assert!(manifest.validation.is_none());
    assert!(manifest.context.is_none());
    assert!(manifest.capabilities.is_none());
    assert_eq!(manifest.provenance.unwrap().parser_version, "9.9.9");
}
