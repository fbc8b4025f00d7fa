//! Stream Ingestor
//!
//! Turns any supported source into a fully materialized document tree.
//! Small files are read in one call; larger files and streams are read in
//! fixed-size chunks against a hard byte ceiling, failing as soon as the
//! ceiling is crossed.

use crate::config::READ_CHUNK_SIZE;
use apicat_common::{ErrorCode, ParserError, SourceKind};
use reqwest::Url;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Where a document comes from
pub enum SpecSource {
    /// An already-structured document
    Document(Value),

    /// JSON or YAML text
    Text(String),

    /// A file on disk
    Path(PathBuf),

    /// An `http`/`https` location
    Url(String),

    /// A byte stream
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl SpecSource {
    /// Classify a string: inline JSON, a URL, or a filesystem path
    pub fn infer(input: &str) -> Self {
        let trimmed = input.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            SpecSource::Text(input.to_string())
        } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            SpecSource::Url(trimmed.trim_end().to_string())
        } else {
            SpecSource::Path(PathBuf::from(input))
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SpecSource::Document(_) => SourceKind::Object,
            SpecSource::Text(_) => SourceKind::Text,
            SpecSource::Path(_) => SourceKind::File,
            SpecSource::Url(_) => SourceKind::Url,
            SpecSource::Reader(_) => SourceKind::Stream,
        }
    }

    /// Human-readable origin, when there is one
    pub fn descriptor(&self) -> Option<String> {
        match self {
            SpecSource::Path(path) => Some(path.display().to_string()),
            SpecSource::Url(url) => Some(url.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for SpecSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecSource::Document(_) => f.write_str("SpecSource::Document"),
            SpecSource::Text(text) => write!(f, "SpecSource::Text({} bytes)", text.len()),
            SpecSource::Path(path) => write!(f, "SpecSource::Path({})", path.display()),
            SpecSource::Url(url) => write!(f, "SpecSource::Url({})", url),
            SpecSource::Reader(_) => f.write_str("SpecSource::Reader"),
        }
    }
}

impl From<Value> for SpecSource {
    fn from(value: Value) -> Self {
        SpecSource::Document(value)
    }
}

impl From<PathBuf> for SpecSource {
    fn from(path: PathBuf) -> Self {
        SpecSource::Path(path)
    }
}

impl From<&Path> for SpecSource {
    fn from(path: &Path) -> Self {
        SpecSource::Path(path.to_path_buf())
    }
}

/// A materialized document and where it came from
#[derive(Debug, Clone)]
pub struct Ingested {
    pub document: Value,
    pub kind: SourceKind,
    pub descriptor: Option<String>,

    /// Location that relative references resolve against
    pub location: Option<Url>,
}

/// Reads sources under a byte ceiling
#[derive(Debug, Clone)]
pub struct StreamIngestor {
    max_bytes: u64,
    direct_read_threshold: u64,
}

impl StreamIngestor {
    pub fn new(max_bytes: u64, direct_read_threshold: u64) -> Self {
        Self {
            max_bytes,
            direct_read_threshold,
        }
    }

    /// Materialize a local source
    ///
    /// URL sources go through the external reference resolver instead and
    /// are rejected here with `PARSE_002`.
    pub async fn ingest(&self, source: SpecSource) -> Result<Ingested, ParserError> {
        let kind = source.kind();
        let descriptor = source.descriptor();

        let (document, location) = match source {
            SpecSource::Document(document) => (document, None),
            SpecSource::Text(text) => {
                self.check_size(text.len() as u64)?;
                (parse_text(&text, None)?, None)
            }
            SpecSource::Path(path) => {
                let text = self.read_path(&path).await?;
                (parse_text(&text, Some(&path))?, file_url(&path))
            }
            SpecSource::Reader(mut reader) => {
                let bytes = self.read_limited(&mut reader).await?;
                (parse_text(&decode_utf8(bytes)?, None)?, None)
            }
            SpecSource::Url(url) => {
                return Err(ParserError::new(ErrorCode::PARSE_002)
                    .with_detail(format!("{} must be fetched by the resolver", url))
                    .at(url));
            }
        };

        Ok(Ingested {
            document,
            kind,
            descriptor,
            location,
        })
    }

    async fn read_path(&self, path: &Path) -> Result<String, ParserError> {
        let read_error = |e: std::io::Error| {
            ParserError::new(ErrorCode::PARSE_002)
                .with_detail(format!("{}: {}", path.display(), e))
                .at(path.display().to_string())
        };

        let size = tokio::fs::metadata(path).await.map_err(read_error)?.len();
        self.check_size(size)?;

        let bytes = if size <= self.direct_read_threshold {
            debug!(path = %path.display(), size, "reading spec directly");
            tokio::fs::read(path).await.map_err(read_error)?
        } else {
            debug!(path = %path.display(), size, "reading spec in chunks");
            let mut file = tokio::fs::File::open(path).await.map_err(read_error)?;
            self.read_limited(&mut file).await?
        };
        decode_utf8(bytes)
    }

    async fn read_limited<R>(&self, reader: &mut R) -> Result<Vec<u8>, ParserError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buffer = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let read = reader.read(&mut chunk).await.map_err(|e| {
                ParserError::new(ErrorCode::PARSE_002).with_detail(e)
            })?;
            if read == 0 {
                break;
            }
            self.check_size((buffer.len() + read) as u64)?;
            buffer.extend_from_slice(&chunk[..read]);
        }
        Ok(buffer)
    }

    fn check_size(&self, size: u64) -> Result<(), ParserError> {
        if size > self.max_bytes {
            return Err(ParserError::new(ErrorCode::PARSE_003)
                .with_detail(format!("{} bytes exceeds the {} byte limit", size, self.max_bytes))
                .with_metadata("limit", self.max_bytes));
        }
        Ok(())
    }
}

fn decode_utf8(bytes: Vec<u8>) -> Result<String, ParserError> {
    String::from_utf8(bytes)
        .map_err(|e| ParserError::new(ErrorCode::PARSE_001).with_detail(format!("input is not UTF-8: {}", e)))
}

fn file_url(path: &Path) -> Option<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    Url::from_file_path(absolute).ok()
}

/// Parse JSON or YAML text
///
/// The file extension in `hint` decides the format when it is `.json`,
/// `.yaml` or `.yml`; otherwise text starting with `{` or `[` is JSON and
/// anything else is YAML.
pub fn parse_text(text: &str, hint: Option<&Path>) -> Result<Value, ParserError> {
    let trimmed = text.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Err(ParserError::new(ErrorCode::PARSE_004));
    }

    let extension = hint
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let as_json = match extension.as_deref() {
        Some("json") => true,
        Some("yaml") | Some("yml") => false,
        _ => trimmed.starts_with('{') || trimmed.starts_with('['),
    };

    if as_json {
        serde_json::from_str(trimmed).map_err(|e| {
            ParserError::new(ErrorCode::PARSE_001)
                .with_detail(&e)
                .with_metadata("line", e.line())
                .with_metadata("column", e.column())
        })
    } else {
        let yaml: serde_yaml::Value = serde_yaml::from_str(trimmed)
            .map_err(|e| ParserError::new(ErrorCode::PARSE_001).with_detail(e))?;
        yaml_to_json(yaml)
            .map_err(|detail| ParserError::new(ErrorCode::PARSE_001).with_detail(detail))
    }
}

/// YAML allows non-string keys (`200:` response codes); they become strings
fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, String> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| format!("unrepresentable number {}", n))?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<_, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    other => return Err(format!("unsupported mapping key {:?}", other)),
                };
                map.insert(key, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ingestor() -> StreamIngestor {
        StreamIngestor::new(1024, 64)
    }

    #[test]
    fn test_infer_source_kind() {
        assert_eq!(SpecSource::infer(r#"  {"openapi": "3.0.0"}"#).kind(), SourceKind::Text);
        assert_eq!(SpecSource::infer("https://api.example.com/openapi.json").kind(), SourceKind::Url);
        assert_eq!(SpecSource::infer("specs/petstore.yaml").kind(), SourceKind::File);
    }

    #[test]
    fn test_yaml_integer_keys_become_strings() {
        let doc = parse_text(
            "openapi: 3.0.3\npaths:\n  /pets:\n    get:\n      responses:\n        200:\n          description: ok\n",
            None,
        )
        .unwrap();
        assert_eq!(doc["openapi"], "3.0.3");
        assert_eq!(doc["paths"]["/pets"]["get"]["responses"]["200"]["description"], "ok");
    }

    #[test]
    fn test_empty_and_malformed_text() {
        assert_eq!(parse_text("   \n", None).unwrap_err().code, ErrorCode::PARSE_004);
        assert_eq!(parse_text("{\"open", None).unwrap_err().code, ErrorCode::PARSE_001);
    }

    #[tokio::test]
    async fn test_reader_over_ceiling_fails() {
        let payload = format!(r#"{{"padding": "{}"}}"#, "x".repeat(2048));
        let source = SpecSource::Reader(Box::new(Cursor::new(payload.into_bytes())));
        let err = ingestor().ingest(source).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PARSE_003);
    }

    #[tokio::test]
    async fn test_reader_within_ceiling() {
        let source = SpecSource::Reader(Box::new(Cursor::new(br#"{"openapi":"3.1.0"}"#.to_vec())));
        let ingested = ingestor().ingest(source).await.unwrap();
        assert_eq!(ingested.kind, SourceKind::Stream);
        assert_eq!(ingested.document["openapi"], "3.1.0");
    }

    #[tokio::test]
    async fn test_files_read_directly_and_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.json");
        std::fs::write(&small, r#"{"openapi":"3.0.0"}"#).unwrap();
        let large = dir.path().join("large.yaml");
        std::fs::write(&large, format!("openapi: 3.0.0\ninfo:\n  description: {}\n", "y".repeat(200))).unwrap();

        let small = ingestor().ingest(SpecSource::Path(small)).await.unwrap();
        assert_eq!(small.document["openapi"], "3.0.0");
        assert_eq!(small.location.unwrap().scheme(), "file");

        let large = ingestor().ingest(SpecSource::Path(large)).await.unwrap();
        assert_eq!(large.kind, SourceKind::File);
        assert_eq!(large.document["info"]["description"].as_str().unwrap().len(), 200);
    }

    #[tokio::test]
    async fn test_missing_and_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ingestor()
            .ingest(SpecSource::Path(dir.path().join("absent.json")))
            .await
            .unwrap_err();
        assert_eq!(missing.code, ErrorCode::PARSE_002);

        let big = dir.path().join("big.json");
        std::fs::write(&big, vec![b' '; 4096]).unwrap();
        let err = ingestor().ingest(SpecSource::Path(big)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PARSE_003);
    }
}
