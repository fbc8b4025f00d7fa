//! Local and external dereferencing
//!
//! Produces a copy of the working document with reference objects replaced
//! by their targets. A reference whose target is already being expanded
//! closes a cycle and is left in place, so the output is always finite.
//!
//! A target whose expansion closes no cycle and is not cut short is expanded
//! once and copied on every later use. Every node copied out of
//! a target counts against a budget; once it is spent the remaining
//! references stay in place and a single `REF_003` is reported.

use crate::config::DEFAULT_MAX_EXPANDED_NODES;
use crate::pointer;
use crate::refs::{self, RefGraph, RefTarget, Scope};
use apicat_common::{ErrorCode, ParserError};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::mem;
use tracing::debug;

/// Expands `$ref` objects against a [`RefGraph`]
pub struct Dereferencer<'a> {
    graph: RefGraph<'a>,
    max_depth: usize,
    budget: usize,
    expanded: usize,
    exhausted: bool,

    /// The current expansion closed a cycle or was cut short, so its result
    /// depends on where it happened
    contextual: bool,

    /// Target key → context-free expansion and its node count
    memo: HashMap<String, (Value, usize)>,
    errors: Vec<ParserError>,
    reported: HashSet<(String, String)>,
}

impl<'a> Dereferencer<'a> {
    pub fn new(graph: RefGraph<'a>, max_depth: usize) -> Self {
        Self {
            graph,
            max_depth,
            budget: DEFAULT_MAX_EXPANDED_NODES,
            expanded: 0,
            exhausted: false,
            contextual: false,
            memo: HashMap::new(),
            errors: Vec::new(),
            reported: HashSet::new(),
        }
    }

    /// Cap on nodes copied out of reference targets
    pub fn with_node_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Dereference the root document
    ///
    /// Missing local targets are reported as `REF_001` and left unexpanded.
    /// References past the depth limit stay in place without a report; the
    /// cycle detector owns that failure. External references that were never
    /// resolved stay as they are.
    pub fn run(mut self) -> (Value, Vec<ParserError>) {
        let root = self.graph.root;
        let scope = self.graph.root_scope.clone();
        let mut stack = Vec::new();
        let output = self.expand(root, &scope, "#", &mut stack);
        debug!(
            nodes = self.expanded,
            memoized = self.memo.len(),
            exhausted = self.exhausted,
            "dereferenced document"
        );
        (output, self.errors)
    }

    fn expand(
        &mut self,
        value: &Value,
        scope: &Scope,
        location: &str,
        stack: &mut Vec<String>,
    ) -> Value {
        // the root document itself is bounded by the input ceiling
        if !stack.is_empty() {
            self.charge(1, location);
        }
        if let Some(reference) = refs::ref_of(value) {
            return self.expand_ref(value, reference, scope, location, stack);
        }

        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    let child_location = pointer::join(location, key);
                    out.insert(key.clone(), self.expand(child, scope, &child_location, stack));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, child)| {
                        self.expand(child, scope, &pointer::join(location, &i.to_string()), stack)
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn expand_ref(
        &mut self,
        holder: &Value,
        reference: &str,
        scope: &Scope,
        location: &str,
        stack: &mut Vec<String>,
    ) -> Value {
        // unresolvable URIs were already reported while resolving externals
        let Ok(target) = scope.target(reference) else {
            return holder.clone();
        };
        let key = target.key();

        if stack.contains(&key) {
            self.contextual = true;
            return holder.clone();
        }

        let (resolved, target_scope) = match self.graph.lookup(&target) {
            Ok(Some(found)) => found,
            Ok(None) => return holder.clone(),
            Err(err) => {
                if matches!(target, RefTarget::Local(_)) {
                    self.report(err.at(location.to_string()).with_metadata("ref", reference));
                }
                return holder.clone();
            }
        };

        if self.exhausted || stack.len() >= self.max_depth {
            self.contextual = true;
            return holder.clone();
        }

        if let Some(size) = self.memo.get(&key).map(|(_, size)| *size) {
            if !self.charge(size, location) {
                return holder.clone();
            }
            let cached = self
                .memo
                .get(&key)
                .map(|(value, _)| value.clone())
                .unwrap_or_else(|| holder.clone());
            return with_siblings(holder, cached);
        }

        let before = self.expanded;
        let outer = mem::replace(&mut self.contextual, false);

        stack.push(key.clone());
        let expanded = self.expand(resolved, &target_scope, &key, stack);
        stack.pop();

        if !self.contextual {
            self.memo.insert(key, (expanded.clone(), self.expanded - before));
        }
        self.contextual |= outer;

        with_siblings(holder, expanded)
    }

    /// Count `nodes` against the budget; `false` once it is spent
    fn charge(&mut self, nodes: usize, location: &str) -> bool {
        if self.exhausted {
            return false;
        }
        if self.expanded.saturating_add(nodes) > self.budget {
            self.exhausted = true;
            self.contextual = true;
            self.report(
                ParserError::new(ErrorCode::REF_003)
                    .with_detail(format!(
                        "expansion stopped after {} nodes at {}",
                        self.expanded, location
                    ))
                    .at(location.to_string())
                    .with_metadata("max_nodes", self.budget),
            );
            return false;
        }
        self.expanded += nodes;
        true
    }

    fn report(&mut self, error: ParserError) {
        let identity = (
            error.code.to_string(),
            error.location.clone().unwrap_or_default(),
        );
        if self.reported.insert(identity) {
            self.errors.push(error);
        }
    }
}

/// 3.1 allows siblings such as `description` next to `$ref`
fn with_siblings(holder: &Value, mut expanded: Value) -> Value {
    if let (Some(siblings), Value::Object(target)) = (holder.as_object(), &mut expanded) {
        for (name, sibling) in siblings {
            if name != "$ref" {
                target.insert(name.clone(), sibling.clone());
            }
        }
    }
    expanded
}
