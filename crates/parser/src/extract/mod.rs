//! Structural extraction of operations and schema definitions
//!
//! Both extractors read the working document and record per-item failures
//! instead of stopping. References that survived dereferencing (cycles,
//! dereferencing disabled) are followed locally with a hop limit.

mod endpoints;
mod schemas;

pub use endpoints::EndpointExtractor;
pub use schemas::SchemaExtractor;

use crate::{pointer, refs};
use apicat_common::{ErrorCode, ParserError};
use serde_json::Value;

/// Most `$ref` hops followed for a single lookup
pub const MAX_REF_HOPS: usize = 32;

/// Follow local references from `value` until a non-reference is reached
pub(crate) fn follow<'v>(document: &'v Value, value: &'v Value) -> Result<&'v Value, ParserError> {
    let mut current = value;
    for _ in 0..MAX_REF_HOPS {
        match refs::ref_of(current) {
            None => return Ok(current),
            Some(reference) if reference.starts_with('#') => {
                current = pointer::resolve(document, reference)?;
            }
            Some(reference) => {
                return Err(ParserError::new(ErrorCode::REF_004)
                    .with_detail(format!("'{}' was not resolved", reference)));
            }
        }
    }
    Err(ParserError::new(ErrorCode::REF_003)
        .with_detail(format!("more than {} hops", MAX_REF_HOPS))
        .with_metadata("max_depth", MAX_REF_HOPS))
}

pub(crate) fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_follow_chains_and_limits() {
        let doc = json!({
            "a": {"$ref": "#/b"},
            "b": {"$ref": "#/c"},
            "c": {"type": "string"},
            "loop": {"$ref": "#/loop"}
        });
        assert_eq!(follow(&doc, &doc["a"]).unwrap()["type"], "string");
        assert_eq!(follow(&doc, &doc["loop"]).unwrap_err().code, ErrorCode::REF_003);
        assert_eq!(
            follow(&doc, &json!({"$ref": "https://example.com/x.json"}))
                .unwrap_err()
                .code,
            ErrorCode::REF_004
        );
    }
}
