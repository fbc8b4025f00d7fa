//! Schema Extractor

use super::{bool_field, follow, string_field, string_list};
use crate::config::ExtractionOptions;
use crate::pointer;
use apicat_common::{ErrorCode, Extraction, HttpMethod, ParserError, SchemaRecord};
use serde_json::Value;

/// Builds [`SchemaRecord`]s for named component schemas and, optionally,
/// for schemas written inline in operations
pub struct SchemaExtractor<'a> {
    document: &'a Value,
    inline_source: &'a Value,
    options: &'a ExtractionOptions,
}

impl<'a> SchemaExtractor<'a> {
    pub fn new(document: &'a Value, options: &'a ExtractionOptions) -> Self {
        Self {
            document,
            inline_source: document,
            options,
        }
    }

    /// Look for inline schemas in `source` instead of the working document
    ///
    /// After dereferencing, named schemas are copied into operations; the
    /// document as ingested still tells them apart from inline ones.
    pub fn with_inline_source(mut self, source: &'a Value) -> Self {
        self.inline_source = source;
        self
    }

    pub fn extract(&self) -> Extraction<SchemaRecord> {
        let mut records = Vec::new();
        let mut errors = Vec::new();

        if let Some(schemas) = self
            .document
            .get("components")
            .and_then(|c| c.get("schemas"))
            .and_then(Value::as_object)
        {
            for (name, definition) in schemas {
                let location = pointer::build(["components", "schemas", name.as_str()]);
                match self.named(name, definition, &location) {
                    Ok(record) => records.push(record),
                    Err(err) => errors.push(err),
                }
            }
        }

        if self.options.include_inline_schemas {
            self.collect_inline(&mut records);
        }

        Extraction::new(records, errors)
    }

    fn named(&self, name: &str, definition: &Value, location: &str) -> Result<SchemaRecord, ParserError> {
        // an alias (`Pet: {$ref: ...}`) describes its target
        let resolved = follow(self.document, definition).unwrap_or(definition);
        if !resolved.is_object() {
            return Err(ParserError::new(ErrorCode::SCHEMA_002)
                .with_detail(format!("'{}' is {}", name, kind_of(resolved)))
                .at(location.to_string()));
        }
        let mut record = record_for(name.to_string(), location.to_string(), resolved);
        record.definition = definition.clone();
        Ok(record)
    }

    fn collect_inline(&self, records: &mut Vec<SchemaRecord>) {
        let Some(paths) = self.inline_source.get("paths").and_then(Value::as_object) else {
            return;
        };

        for (path, item) in paths {
            let item_location = pointer::build(["paths", path.as_str()]);
            self.inline_parameters(item.get("parameters"), &item_location, records);

            let Some(item) = item.as_object() else {
                continue;
            };
            for (key, operation) in item {
                let enabled = key
                    .parse::<HttpMethod>()
                    .map(|m| self.options.methods.contains(&m))
                    .unwrap_or(false);
                if !enabled {
                    continue;
                }
                let location = pointer::join(&item_location, key);
                self.inline_parameters(operation.get("parameters"), &location, records);

                if let Some(content) = operation.get("requestBody").and_then(|b| b.get("content")) {
                    let body_location = pointer::join(&pointer::join(&location, "requestBody"), "content");
                    self.inline_content(content, &body_location, records);
                }
                if let Some(responses) = operation.get("responses").and_then(Value::as_object) {
                    let responses_location = pointer::join(&location, "responses");
                    for (status, response) in responses {
                        if let Some(content) = response.get("content") {
                            let content_location =
                                pointer::join(&pointer::join(&responses_location, status), "content");
                            self.inline_content(content, &content_location, records);
                        }
                    }
                }
            }
        }
    }

    fn inline_parameters(&self, parameters: Option<&Value>, location: &str, records: &mut Vec<SchemaRecord>) {
        let Some(parameters) = parameters.and_then(Value::as_array) else {
            return;
        };
        let parameters_location = pointer::join(location, "parameters");
        for (index, parameter) in parameters.iter().enumerate() {
            if let Some(schema) = parameter.get("schema") {
                let schema_location = pointer::join(
                    &pointer::join(&parameters_location, &index.to_string()),
                    "schema",
                );
                push_inline(schema, schema_location, records);
            }
        }
    }

    fn inline_content(&self, content: &Value, location: &str, records: &mut Vec<SchemaRecord>) {
        let Some(content) = content.as_object() else {
            return;
        };
        for (media_type, media) in content {
            if let Some(schema) = media.get("schema") {
                let schema_location = pointer::join(&pointer::join(location, media_type), "schema");
                push_inline(schema, schema_location, records);
            }
        }
    }
}

fn push_inline(schema: &Value, location: String, records: &mut Vec<SchemaRecord>) {
    if schema.get("$ref").is_some() || !schema.is_object() {
        return;
    }
    let mut record = record_for(location.clone(), location, schema);
    record.inline = true;
    records.push(record);
}

fn record_for(name: String, location: String, schema: &Value) -> SchemaRecord {
    let (schema_type, type_allows_null) = schema_type(schema.get("type"));
    SchemaRecord {
        name,
        pointer: location,
        inline: false,
        schema_type,
        nullable: type_allows_null || bool_field(schema, "nullable"),
        title: string_field(schema, "title"),
        description: string_field(schema, "description"),
        properties: schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default(),
        required: string_list(schema, "required"),
        format: string_field(schema, "format"),
        enum_values: schema
            .get("enum")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        deprecated: bool_field(schema, "deprecated"),
        definition: schema.clone(),
    }
}

/// `type` as a single name; 3.1 type arrays contribute `"null"` as nullability
fn schema_type(declared: Option<&Value>) -> (Option<String>, bool) {
    match declared {
        Some(Value::String(name)) => (Some(name.clone()), name == "null"),
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            let nullable = names.contains(&"null");
            let primary = names.iter().find(|n| **n != "null").map(|n| n.to_string());
            (primary, nullable)
        }
        _ => (None, false),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apicat_common::Severity;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "paths": {"/pets": {"post": {
                "parameters": [{"name": "limit", "in": "query", "schema": {"type": "integer", "format": "int32"}}],
                "requestBody": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}},
                "responses": {"200": {"content": {"application/json": {"schema": {
                    "type": "array", "items": {"$ref": "#/components/schemas/Pet"}
                }}}}}
            }}},
            "components": {"schemas": {
                "Pet": {
                    "type": "object",
                    "title": "Pet",
                    "required": ["name"],
                    "properties": {"name": {"type": "string"}, "tag": {"type": ["string", "null"]}}
                },
                "Status": {"type": "string", "enum": ["available", "sold"], "deprecated": true},
                "Maybe": {"type": ["integer", "null"]},
                "Alias": {"$ref": "#/components/schemas/Pet"},
                "Broken": "not a schema"
            }}
        })
    }

    #[test]
    fn test_named_schemas() {
        let doc = document();
        let options = ExtractionOptions {
            include_inline_schemas: false,
            ..Default::default()
        };
        let result = SchemaExtractor::new(&doc, &options).extract();
        let names: Vec<&str> = result.items.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Pet", "Status", "Maybe", "Alias"]);

        let pet = &result.items[0];
        assert_eq!(pet.pointer, "#/components/schemas/Pet");
        assert_eq!(pet.schema_type.as_deref(), Some("object"));
        assert_eq!(pet.required, vec!["name".to_string()]);
        assert_eq!(pet.properties.len(), 2);

        let status = &result.items[1];
        assert!(status.deprecated);
        assert_eq!(status.enum_values.len(), 2);

        let maybe = &result.items[2];
        assert_eq!(maybe.schema_type.as_deref(), Some("integer"));
        assert!(maybe.nullable);

        let alias = &result.items[3];
        assert_eq!(alias.title.as_deref(), Some("Pet"));
        assert_eq!(alias.definition["$ref"], "#/components/schemas/Pet");
    }

    #[test]
    fn test_non_object_schema_is_a_warning() {
        let doc = document();
        let result = SchemaExtractor::new(&doc, &ExtractionOptions::default()).extract();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, ErrorCode::SCHEMA_002);
        assert_eq!(result.errors[0].severity, Severity::Warn);
        assert_eq!(result.errors[0].location.as_deref(), Some("#/components/schemas/Broken"));
    }

    #[test]
    fn test_inline_schemas_are_tracked_separately() {
        let doc = document();
        let result = SchemaExtractor::new(&doc, &ExtractionOptions::default()).extract();
        let inline: Vec<&SchemaRecord> = result.items.iter().filter(|s| s.inline).collect();

        // the request body only references Pet, so it is not inline
        assert_eq!(inline.len(), 2);
        assert_eq!(inline[0].pointer, "#/paths/~1pets/post/parameters/0/schema");
        assert_eq!(inline[0].format.as_deref(), Some("int32"));
        assert_eq!(
            inline[1].pointer,
            "#/paths/~1pets/post/responses/200/content/application~1json/schema"
        );
        assert_eq!(inline[1].schema_type.as_deref(), Some("array"));
    }
}
