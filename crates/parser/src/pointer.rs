//! JSON Pointer (RFC 6901) helpers

use apicat_common::{ErrorCode, ParserError};
use percent_encoding::percent_decode_str;
use serde_json::Value;

/// Decode one reference token (`~1` → `/`, then `~0` → `~`)
pub fn decode_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Encode one reference token (`~` → `~0`, then `/` → `~1`)
pub fn encode_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Split a pointer (with or without a leading `#`) into decoded tokens
///
/// A leading `#` marks the URI fragment form, whose tokens are
/// percent-decoded before `~` escapes are undone.
pub fn parse(pointer: &str) -> Result<Vec<String>, ParserError> {
    let (pointer, fragment) = match pointer.strip_prefix('#') {
        Some(rest) => (rest, true),
        None => (pointer, false),
    };
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let rest = pointer.strip_prefix('/').ok_or_else(|| {
        ParserError::new(ErrorCode::REF_005)
            .with_detail(format!("JSON Pointer must start with '/': {}", pointer))
            .at(pointer.to_string())
    })?;
    Ok(rest
        .split('/')
        .map(|token| {
            if fragment {
                decode_token(&percent_decode_str(token).decode_utf8_lossy())
            } else {
                decode_token(token)
            }
        })
        .collect())
}

/// Build a `#`-prefixed pointer from raw (unencoded) segments
pub fn build<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::from("#");
    for segment in segments {
        out.push('/');
        out.push_str(&encode_token(segment.as_ref()));
    }
    out
}

/// Append a raw segment to an existing pointer
pub fn join(pointer: &str, segment: &str) -> String {
    format!("{}/{}", pointer, encode_token(segment))
}

/// Walk `document` along `pointer`
///
/// Fails with `REF_001` naming the first segment that could not be followed.
pub fn resolve<'a>(document: &'a Value, pointer: &str) -> Result<&'a Value, ParserError> {
    let tokens = parse(pointer)?;
    let mut current = document;
    let mut walked = String::from("#");

    for token in &tokens {
        let next = match current {
            Value::Object(map) => map.get(token.as_str()),
            Value::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| {
            ParserError::new(ErrorCode::REF_001)
                .with_detail(pointer)
                .at(walked.clone())
                .with_metadata("pointer", pointer)
                .with_metadata("segment", token.as_str())
        })?;
        walked = join(&walked, token);
    }

    Ok(current)
}
