//! Protocol Manifest generation
//!
//! Converts a finished [`ParsedSpec`](apicat_common::ParsedSpec) into the
//! catalog's governance artifact:
//! - `service` with a synthesized URN
//! - `interface.endpoints` (one URN per endpoint) and `authentication`
//! - `metadata`, plus optional `validation`, `context`, `capabilities`
//!   and `provenance` blocks
//!
//! URNs take the form `urn:proto:api:<slug>/service[@<semver>]`; the
//! version suffix is only added for strict `MAJOR.MINOR.PATCH` versions.

mod converter;
mod types;
pub mod urn;

pub use converter::{ManifestConverter, DEFAULT_PARSER_NAME, MANIFEST_STATUS};
pub use types::{
    Authentication, Capability, Context, Interface, ManifestEndpoint, ManifestMetadata,
    Provenance, ProtocolManifest, ServiceInfo, Validation,
};

use apicat_common::{CatalogError, Result};
use std::path::Path;

impl ProtocolManifest {
    /// Pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write as YAML when the extension is `.yaml`/`.yml`, JSON otherwise
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let content = if is_yaml {
            self.to_yaml()?
        } else {
            self.to_json_pretty()?
        };
        std::fs::write(path, content).map_err(|e| {
            CatalogError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write manifest {}: {}", path.display(), e),
            ))
        })
    }

    /// Load a manifest previously written as JSON or YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            _ => Ok(serde_json::from_str(&content)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apicat_common::{ParsedSpec, SourceKind};
    use serde_json::json;

    fn manifest() -> ProtocolManifest {
        let spec = ParsedSpec::new(
            json!({"openapi": "3.0.0", "info": {"title": "Order API", "version": "1.2.3"}}),
            SourceKind::Text,
            None,
        );
        ManifestConverter::new().convert(&spec)
    }

    #[test]
    fn test_json_export() {
        let json = manifest().to_json_pretty().unwrap();
        assert!(json.contains("\"urn\": \"urn:proto:api:order-api/service@1.2.3\""));
    }

    #[test]
    fn test_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let original = manifest();

        for name in ["manifest.json", "manifest.yaml"] {
            let path = dir.path().join(name);
            original.write_to_file(&path).unwrap();
            let loaded = ProtocolManifest::from_file(&path).unwrap();
            assert_eq!(loaded.service, original.service);
            assert_eq!(loaded.metadata.status, "active");
        }
    }
}
