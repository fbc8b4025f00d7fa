//! Canonical serialization and content hashing
//!
//! The canonical form sorts object keys lexicographically at every level,
//! keeps array order, and writes numbers in their shortest round-trip form
//! (integral floats are written as integers). The digest is xxHash64 with
//! seed 0, rendered as 16 lowercase hex characters.
//!
//! When the crate is built without the `xxhash` feature the digest is the
//! first 16 hex characters of the SHA-256 of the same canonical bytes. The
//! output format does not change, so callers cannot tell the two apart.

use serde_json::{Number, Value};

/// Seed for the primary digest
pub const HASH_SEED: u64 = 0;

/// Width of the hex digest
pub const HASH_HEX_WIDTH: usize = 16;

/// Canonical text for a document
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json's string encoder produces the quoted, escaped form
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => {
            out.push('"');
            out.push_str(&s.escape_default().to_string());
            out.push('"');
        }
    }
}

fn canonical_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}

/// Content digest of a document
pub fn generate_hash(value: &Value) -> String {
    digest(canonicalize(value).as_bytes())
}

#[cfg(feature = "xxhash")]
fn digest(bytes: &[u8]) -> String {
    let hash = twox_hash::XxHash64::oneshot(HASH_SEED, bytes);
    format!("{:0width$x}", hash, width = HASH_HEX_WIDTH)
}

#[cfg(not(feature = "xxhash"))]
fn digest(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let full = hex::encode(Sha256::digest(bytes));
    full[..HASH_HEX_WIDTH].to_string()
}
