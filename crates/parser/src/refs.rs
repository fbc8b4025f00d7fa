//! `$ref` addressing shared by resolution, dereferencing and cycle detection
//!
//! Every reference is turned into a [`RefTarget`] whose [`key`](RefTarget::key)
//! names a node in the reference graph: `#/...` pointers for the root
//! document, absolute URIs for everything else.

use crate::pointer;
use apicat_common::{ErrorCode, ParserError};
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;

/// `$ref` string of a reference object
pub fn ref_of(value: &Value) -> Option<&str> {
    value.as_object()?.get("$ref")?.as_str()
}

/// Every `$ref` under `value` with the pointer of the object that holds it
///
/// References are not followed.
pub fn collect(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    walk(value, "#".to_string(), &mut out);
    out
}

fn walk(value: &Value, location: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                out.push((location.clone(), reference.to_string()));
            }
            for (key, child) in map {
                if key != "$ref" {
                    walk(child, pointer::join(&location, key), out);
                }
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(child, pointer::join(&location, &i.to_string()), out);
            }
        }
        _ => {}
    }
}

/// What a reference points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    /// A pointer into the root document
    Local(String),

    /// A location in another document
    External(Url),
}

impl RefTarget {
    /// Graph node name
    pub fn key(&self) -> String {
        match self {
            RefTarget::Local(pointer) => pointer.clone(),
            RefTarget::External(url) => url.to_string(),
        }
    }
}

/// Document a reference appears in
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    /// The root document; relative references join `base`
    Root { base: Option<Url> },

    /// A fetched document; every reference joins its URL
    External { document: Url },
}

impl Scope {
    /// Scope of the document behind an external URI
    pub fn of_external(uri: &Url) -> Self {
        let mut document = uri.clone();
        document.set_fragment(None);
        Scope::External { document }
    }

    pub fn target(&self, reference: &str) -> Result<RefTarget, ParserError> {
        let invalid = |detail: String| {
            ParserError::new(ErrorCode::REF_005)
                .with_detail(detail)
                .with_metadata("ref", reference)
        };

        match self {
            Scope::Root { .. } if reference.starts_with('#') => {
                Ok(RefTarget::Local(reference.to_string()))
            }
            Scope::Root { base } => {
                if let Ok(url) = Url::parse(reference) {
                    return Ok(RefTarget::External(url));
                }
                let base = base.as_ref().ok_or_else(|| {
                    invalid(format!(
                        "relative reference '{}' has no base path or base URL",
                        reference
                    ))
                })?;
                base.join(reference)
                    .map(RefTarget::External)
                    .map_err(|e| invalid(e.to_string()))
            }
            Scope::External { document } => document
                .join(reference)
                .map(RefTarget::External)
                .map_err(|e| invalid(e.to_string())),
        }
    }
}

/// Lookup of reference targets across the root document and fetched content
#[derive(Debug, Clone, Copy)]
pub struct RefGraph<'a> {
    pub root: &'a Value,
    pub root_scope: &'a Scope,

    /// Absolute URI → content after fragment extraction
    pub externals: &'a BTreeMap<String, Value>,
}

impl<'a> RefGraph<'a> {
    /// Target value and the scope its own references resolve in
    pub fn lookup(&self, target: &RefTarget) -> Result<Option<(&'a Value, Scope)>, ParserError> {
        match target {
            RefTarget::Local(ptr) => {
                let value = pointer::resolve(self.root, ptr)?;
                Ok(Some((value, self.root_scope.clone())))
            }
            RefTarget::External(url) => Ok(self
                .externals
                .get(url.as_str())
                .map(|value| (value, Scope::of_external(url)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collect_records_holder_pointer() {
        let doc = json!({
            "paths": {"/a/{id}": {"get": {"responses": {"200": {"$ref": "#/components/responses/Ok"}}}}},
            "list": [{"$ref": "other.json"}]
        });
        let refs = collect(&doc);
        assert_eq!(
            refs,
            vec![
                (
                    "#/paths/~1a~1{id}/get/responses/200".to_string(),
                    "#/components/responses/Ok".to_string()
                ),
                ("#/list/0".to_string(), "other.json".to_string()),
            ]
        );
    }

    #[test]
    fn test_root_scope_targets() {
        let scope = Scope::Root {
            base: Some(Url::parse("file:///specs/").unwrap()),
        };
        assert_eq!(
            scope.target("#/components/schemas/Pet").unwrap(),
            RefTarget::Local("#/components/schemas/Pet".to_string())
        );
        assert_eq!(
            scope.target("common.yaml#/Error").unwrap().key(),
            "file:///specs/common.yaml#/Error"
        );

        let bare = Scope::Root { base: None };
        assert_eq!(bare.target("common.yaml").unwrap_err().code, ErrorCode::REF_005);
    }

    #[test]
    fn test_external_scope_keeps_document() {
        let uri = Url::parse("https://example.com/v1/pet.json#/Pet").unwrap();
        let scope = Scope::of_external(&uri);
        assert_eq!(
            scope.target("#/Owner").unwrap().key(),
            "https://example.com/v1/pet.json#/Owner"
        );
        assert_eq!(
            scope.target("../shared/error.json").unwrap().key(),
            "https://example.com/shared/error.json"
        );
    }
}
