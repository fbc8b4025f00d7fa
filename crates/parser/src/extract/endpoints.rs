//! Endpoint Extractor

use super::{bool_field, follow, string_field, string_list};
use crate::config::ExtractionOptions;
use crate::pointer;
use apicat_common::{
    Endpoint, ErrorCode, Extraction, HttpMethod, MediaContent, Parameter, ParameterLocation,
    ParserError, RequestBody, Response, SecurityRequirement,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Builds one [`Endpoint`] per operation in `paths`
pub struct EndpointExtractor<'a> {
    document: &'a Value,
    options: &'a ExtractionOptions,
    reported: Vec<ErrorCode>,
}

impl<'a> EndpointExtractor<'a> {
    pub fn new(document: &'a Value, options: &'a ExtractionOptions) -> Self {
        Self {
            document,
            options,
            reported: Vec::new(),
        }
    }

    /// Reference failures an earlier stage has already recorded
    ///
    /// An operation that fails on one of these codes is skipped without an
    /// error of its own.
    pub fn with_reported_causes(mut self, codes: impl IntoIterator<Item = ErrorCode>) -> Self {
        self.reported.extend(codes);
        self
    }

    /// Extract every operation whose method is enabled
    ///
    /// A malformed path item or operation is recorded as `SCHEMA_001` and
    /// skipped; the rest are still extracted. Failures caused by a reference
    /// error listed in [`with_reported_causes`](Self::with_reported_causes)
    /// are skipped silently.
    pub fn extract(&self) -> Extraction<Endpoint> {
        let mut endpoints = Vec::new();
        let mut errors = Vec::new();

        let Some(paths) = self.document.get("paths").and_then(Value::as_object) else {
            return Extraction::new(endpoints, errors);
        };

        for (path, item) in paths {
            let item_location = pointer::build(["paths", path.as_str()]);
            let item = match follow(self.document, item) {
                Ok(item) => item,
                Err(err) => {
                    self.skip(&item_location, err, &mut errors);
                    continue;
                }
            };
            let item = match as_object(item, &item_location, "path item") {
                Ok(item) => item,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };

            for (key, operation) in item {
                let Ok(method) = key.parse::<HttpMethod>() else {
                    continue;
                };
                if !self.options.methods.contains(&method) {
                    continue;
                }
                if !self.options.include_deprecated && bool_field(operation, "deprecated") {
                    continue;
                }

                let location = pointer::join(&item_location, key);
                match self.build(path, method, item, operation, &location) {
                    Ok(endpoint) => endpoints.push(endpoint),
                    Err(err) => {
                        warn!(path = %path, method = %method, error = %err, "skipping operation");
                        self.skip(&location, err, &mut errors);
                    }
                }
            }
        }

        Extraction::new(endpoints, errors)
    }

    fn skip(&self, location: &str, cause: ParserError, errors: &mut Vec<ParserError>) {
        if self.reported.contains(&cause.code) {
            debug!(location, code = %cause.code, "reference failure already recorded");
            return;
        }
        errors.push(operation_error(location, cause));
    }

    fn build(
        &self,
        path: &str,
        method: HttpMethod,
        item: &Map<String, Value>,
        operation: &Value,
        location: &str,
    ) -> Result<Endpoint, ParserError> {
        let operation = as_object(operation, location, "operation")?;
        let op = Value::Object(operation.clone());

        let mut parameters = self.parameters(item.get("parameters"))?;
        for parameter in self.parameters(operation.get("parameters"))? {
            merge_parameter(&mut parameters, parameter);
        }

        let request_body = match operation.get("requestBody") {
            Some(body) => Some(self.request_body(follow(self.document, body)?)?),
            None => None,
        };

        let mut responses = BTreeMap::new();
        if let Some(declared) = operation.get("responses").and_then(Value::as_object) {
            for (status, response) in declared {
                let response = follow(self.document, response)?;
                responses.insert(status.clone(), self.response(response));
            }
        }

        let security = match operation.get("security") {
            Some(declared) => security_requirements(declared),
            None => self
                .document
                .get("security")
                .map(security_requirements)
                .unwrap_or_default(),
        };

        let servers = non_empty_array(operation.get("servers"))
            .or_else(|| non_empty_array(item.get("servers")))
            .unwrap_or_default();

        let callbacks = operation
            .get("callbacks")
            .and_then(Value::as_object)
            .map(|callbacks| callbacks.keys().cloned().collect())
            .unwrap_or_default();

        Ok(Endpoint {
            path: path.to_string(),
            method,
            operation_id: string_field(&op, "operationId"),
            summary: string_field(&op, "summary"),
            description: string_field(&op, "description"),
            deprecated: bool_field(&op, "deprecated"),
            tags: string_list(&op, "tags"),
            parameters,
            request_body,
            responses,
            security,
            servers,
            external_docs: operation.get("externalDocs").cloned(),
            callbacks,
        })
    }

    fn parameters(&self, declared: Option<&Value>) -> Result<Vec<Parameter>, ParserError> {
        let Some(declared) = declared else {
            return Ok(Vec::new());
        };
        let entries = declared.as_array().ok_or_else(|| {
            ParserError::new(ErrorCode::SCHEMA_001).with_detail("'parameters' must be an array")
        })?;

        let mut parameters = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let entry = follow(self.document, entry)?;
            let parameter = self.parameter(entry).ok_or_else(|| {
                ParserError::new(ErrorCode::SCHEMA_001)
                    .with_detail(format!("parameter {} needs a 'name' and a valid 'in'", index))
                    .with_metadata("index", index)
            })?;
            merge_parameter(&mut parameters, parameter);
        }
        Ok(parameters)
    }

    fn parameter(&self, entry: &Value) -> Option<Parameter> {
        let name = string_field(entry, "name")?;
        let location: ParameterLocation = entry.get("in")?.as_str()?.parse().ok()?;
        Some(Parameter {
            name,
            location,
            required: location == ParameterLocation::Path || bool_field(entry, "required"),
            description: string_field(entry, "description"),
            deprecated: bool_field(entry, "deprecated"),
            schema: entry.get("schema").cloned(),
            example: if self.options.include_examples {
                entry.get("example").cloned()
            } else {
                None
            },
        })
    }

    fn request_body(&self, body: &Value) -> Result<RequestBody, ParserError> {
        if !body.is_object() {
            return Err(ParserError::new(ErrorCode::SCHEMA_001)
                .with_detail("'requestBody' must be an object"));
        }
        Ok(RequestBody {
            description: string_field(body, "description"),
            required: bool_field(body, "required"),
            content: self.content(body.get("content")),
        })
    }

    fn response(&self, response: &Value) -> Response {
        Response {
            description: string_field(response, "description"),
            headers: response
                .get("headers")
                .and_then(Value::as_object)
                .map(|headers| {
                    headers
                        .iter()
                        .map(|(name, header)| (name.clone(), header.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            content: self.content(response.get("content")),
        }
    }

    fn content(&self, content: Option<&Value>) -> BTreeMap<String, MediaContent> {
        let Some(content) = content.and_then(Value::as_object) else {
            return BTreeMap::new();
        };
        content
            .iter()
            .map(|(media_type, media)| {
                let examples = self.options.include_examples;
                let payload = MediaContent {
                    schema: media.get("schema").cloned(),
                    example: media.get("example").filter(|_| examples).cloned(),
                    examples: media.get("examples").filter(|_| examples).cloned(),
                };
                (media_type.clone(), payload)
            })
            .collect()
    }
}

/// Insert or replace by `(location, name)`, keeping the first position
fn merge_parameter(parameters: &mut Vec<Parameter>, parameter: Parameter) {
    match parameters.iter().position(|p| p.key() == parameter.key()) {
        Some(index) => parameters[index] = parameter,
        None => parameters.push(parameter),
    }
}

fn security_requirements(declared: &Value) -> Vec<SecurityRequirement> {
    let Some(entries) = declared.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(Value::as_object)
        .map(|requirement| {
            requirement
                .iter()
                .map(|(scheme, scopes)| {
                    let scopes = scopes
                        .as_array()
                        .map(|s| s.iter().filter_map(Value::as_str).map(str::to_string).collect())
                        .unwrap_or_default();
                    (scheme.clone(), scopes)
                })
                .collect()
        })
        .collect()
}

fn non_empty_array(value: Option<&Value>) -> Option<Vec<Value>> {
    value
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .cloned()
}

fn as_object<'v>(
    value: &'v Value,
    location: &str,
    what: &str,
) -> Result<&'v Map<String, Value>, ParserError> {
    value.as_object().ok_or_else(|| {
        ParserError::new(ErrorCode::SCHEMA_001)
            .with_detail(format!("{} must be an object", what))
            .at(location.to_string())
    })
}

/// Re-code any failure inside an operation as `SCHEMA_001`
fn operation_error(location: &str, cause: ParserError) -> ParserError {
    if cause.code == ErrorCode::SCHEMA_001 {
        return cause.at(location.to_string());
    }
    ParserError::new(ErrorCode::SCHEMA_001)
        .with_detail(&cause.message)
        .at(location.to_string())
        .with_metadata("cause", cause.code.as_str())
}
