//! Circular Reference Detector
//!
//! Depth-first search over the reference graph. Nodes are reference keys
//! (root pointers or absolute URIs); a node's edges are the references found
//! anywhere inside its target. Reaching a node that is still on the DFS
//! stack closes a cycle.

use crate::refs::{self, RefGraph, Scope};
use apicat_common::{ErrorCode, ParserError};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Result of a detection pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub has_circular: bool,

    /// Each cycle as a path of reference keys, first node repeated at the end
    pub cycles: Vec<Vec<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

pub struct CircularReferenceDetector {
    max_depth: usize,
}

impl CircularReferenceDetector {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Walk every reference reachable from the root document
    ///
    /// Fails with `REF_003` when a chain of references is deeper than the
    /// configured limit.
    pub fn detect(&self, graph: RefGraph<'_>) -> Result<CycleReport, ParserError> {
        let mut search = Search {
            graph,
            max_depth: self.max_depth,
            marks: HashMap::new(),
            edges: HashMap::new(),
            heights: HashMap::new(),
            stack: Vec::new(),
            cycles: Vec::new(),
            seen: HashSet::new(),
        };

        let roots = search.targets_in(graph.root, graph.root_scope);
        for key in roots {
            if !search.marks.contains_key(&key) {
                search.visit(key)?;
            }
        }

        Ok(CycleReport {
            has_circular: !search.cycles.is_empty(),
            cycles: search.cycles,
        })
    }
}

struct Search<'a> {
    graph: RefGraph<'a>,
    max_depth: usize,
    marks: HashMap<String, Mark>,
    edges: HashMap<String, Vec<String>>,

    /// Longest chain starting at a finished node, counting the node itself
    heights: HashMap<String, usize>,
    stack: Vec<String>,
    cycles: Vec<Vec<String>>,
    seen: HashSet<Vec<String>>,
}

impl<'a> Search<'a> {
    /// Returns the height of `key`
    fn visit(&mut self, key: String) -> Result<usize, ParserError> {
        if self.stack.len() >= self.max_depth {
            return Err(self.too_deep(key));
        }

        self.marks.insert(key.clone(), Mark::Active);
        self.stack.push(key.clone());

        let mut below = 0;
        for next in self.edges_of(&key) {
            match self.marks.get(&next) {
                Some(Mark::Active) => self.record_cycle(&next),
                Some(Mark::Done) => {
                    // a finished node still extends every chain that reaches it
                    let height = self.heights.get(&next).copied().unwrap_or(1);
                    if self.stack.len() + height > self.max_depth {
                        return Err(self.too_deep(next));
                    }
                    below = below.max(height);
                }
                None => below = below.max(self.visit(next)?),
            }
        }

        self.stack.pop();
        self.marks.insert(key.clone(), Mark::Done);
        self.heights.insert(key, below + 1);
        Ok(below + 1)
    }

    fn too_deep(&self, key: String) -> ParserError {
        let mut chain = self.stack.clone();
        chain.push(key.clone());
        ParserError::new(ErrorCode::REF_003)
            .with_detail(format!("chain through {} exceeds {}", key, self.max_depth))
            .at(key)
            .with_metadata("max_depth", self.max_depth)
            .with_metadata("chain", chain)
    }

    fn edges_of(&mut self, key: &str) -> Vec<String> {
        if let Some(edges) = self.edges.get(key) {
            return edges.clone();
        }

        let edges = match self.target_of(key) {
            Some((value, scope)) => self.targets_in(value, &scope),
            None => Vec::new(),
        };
        self.edges.insert(key.to_string(), edges.clone());
        edges
    }

    fn target_of(&self, key: &str) -> Option<(&'a serde_json::Value, Scope)> {
        let target = self.graph.root_scope.target(key).ok()?;
        self.graph.lookup(&target).ok().flatten()
    }

    fn targets_in(&self, value: &serde_json::Value, scope: &Scope) -> Vec<String> {
        let mut keys = Vec::new();
        for (_, reference) in refs::collect(value) {
            if let Ok(target) = scope.target(&reference) {
                let key = target.key();
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    fn record_cycle(&mut self, closing: &str) {
        let Some(start) = self.stack.iter().position(|k| k == closing) else {
            return;
        };
        let body = &self.stack[start..];

        // rotate so equal cycles found from different entry points compare equal
        let pivot = body
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut canonical: Vec<String> = body[pivot..].iter().chain(&body[..pivot]).cloned().collect();

        if self.seen.insert(canonical.clone()) {
            if let Some(first) = canonical.first().cloned() {
                canonical.push(first);
            }
            self.cycles.push(canonical);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn detect(doc: &Value, max_depth: usize) -> Result<CycleReport, ParserError> {
        let scope = Scope::Root { base: None };
        let externals = BTreeMap::new();
        CircularReferenceDetector::new(max_depth).detect(RefGraph {
            root: doc,
            root_scope: &scope,
            externals: &externals,
        })
    }

    #[test]
    fn test_two_schema_cycle() {
        let doc = json!({"components": {"schemas": {
            "A": {"properties": {"b": {"$ref": "#/components/schemas/B"}}},
            "B": {"properties": {"a": {"$ref": "#/components/schemas/A"}}}
        }}});
        let report = detect(&doc, 64).unwrap();
        assert!(report.has_circular);
        assert_eq!(
            report.cycles,
            vec![vec![
                "#/components/schemas/A".to_string(),
                "#/components/schemas/B".to_string(),
                "#/components/schemas/A".to_string(),
            ]]
        );
    }

    #[test]
    fn test_self_reference() {
        let doc = json!({"components": {"schemas": {
            "Node": {"properties": {"next": {"$ref": "#/components/schemas/Node"}}}
        }}});
        let report = detect(&doc, 64).unwrap();
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.cycles[0].len(), 2);
    }

    #[test]
    fn test_shared_target_is_not_a_cycle() {
        let doc = json!({
            "paths": {"/a": {"get": {"x": {"$ref": "#/components/schemas/Err"}, "y": {"$ref": "#/components/schemas/Err"}}}},
            "components": {"schemas": {"Err": {"type": "object"}}}
        });
        let report = detect(&doc, 64).unwrap();
        assert!(!report.has_circular);
        assert!(report.cycles.is_empty());
    }

    #[test]
    fn test_deep_chain_fails_fast() {
        let doc = json!({
            "start": {"$ref": "#/s1"},
            "s1": {"$ref": "#/s2"},
            "s2": {"$ref": "#/s3"},
            "s3": {"$ref": "#/s4"},
            "s4": {}
        });
        let err = detect(&doc, 3).unwrap_err();
        assert_eq!(err.code, ErrorCode::REF_003);
        assert!(detect(&doc, 8).is_ok());
    }

    #[test]
    fn test_long_chain_into_finished_node_is_too_deep() {
        // `short` reaches s3 first; the longer route through s1 and s2 arrives later
        let doc = json!({
            "short": {"$ref": "#/s3"},
            "long": {"$ref": "#/s1"},
            "s1": {"next": {"$ref": "#/s2"}},
            "s2": {"next": {"$ref": "#/s3"}},
            "s3": {"next": {"$ref": "#/s4"}},
            "s4": {"end": true}
        });
        assert!(detect(&doc, 4).is_ok());
        let err = detect(&doc, 3).unwrap_err();
        assert_eq!(err.code, ErrorCode::REF_003);
        assert_eq!(err.location.as_deref(), Some("#/s3"));
    }

    #[test]
    fn test_cycle_through_external_document() {
        let doc = json!({"schema": {"$ref": "https://example.com/a.json"}});
        let mut externals = BTreeMap::new();
        externals.insert(
            "https://example.com/a.json".to_string(),
            json!({"properties": {"b": {"$ref": "b.json"}}}),
        );
        externals.insert(
            "https://example.com/b.json".to_string(),
            json!({"properties": {"a": {"$ref": "a.json"}}}),
        );
        let scope = Scope::Root { base: None };
        let report = CircularReferenceDetector::new(64)
            .detect(RefGraph {
                root: &doc,
                root_scope: &scope,
                externals: &externals,
            })
            .unwrap();
        assert!(report.has_circular);
        assert_eq!(report.cycles[0][0], "https://example.com/a.json");
    }
}
