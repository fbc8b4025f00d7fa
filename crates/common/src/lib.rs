//! Common types and utilities for the apicat OpenAPI pipeline
//!
//! This crate contains the shared data model (parsed specs, endpoints,
//! schemas), the structured error taxonomy used by every pipeline stage,
//! and the infrastructure error type used by the parser and manifest crates.

mod collector;
mod error;
mod model;
mod spec;

pub use collector::{ErrorCollector, ErrorMode, DEFAULT_MAX_ERRORS, DEFAULT_MAX_WARNINGS};
pub use error::{ErrorCode, ErrorDefinition, ErrorDomain, ErrorRegistry, ParserError, Severity};
pub use model::{
    Endpoint, Extraction, HttpMethod, MediaContent, Parameter, ParameterLocation, RequestBody,
    Response, SchemaRecord, SecurityRequirement,
};
pub use spec::{FailedParse, ParseOutcome, ParsedSpec, SourceKind, SpecMetadata};

use thiserror::Error;

/// A structured document tree (object/array/string/number/bool/null)
pub type Document = serde_json::Value;

/// Errors raised outside the parse pipeline (configuration, export, IO)
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Specification error: {0}")]
    Spec(#[from] ParserError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
