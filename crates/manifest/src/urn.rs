//! URN synthesis

use apicat_common::Endpoint;
use once_cell::sync::Lazy;
use regex::Regex;

pub const URN_PREFIX: &str = "urn:proto:api";

static SEMVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)$").expect("semver pattern compiles")
});

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern compiles"));

/// Lowercase, with every run of other characters collapsed to `-`
pub fn slug(input: &str) -> String {
    let lowered = input.to_lowercase();
    let slug = NON_ALNUM.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}

/// Strict `MAJOR.MINOR.PATCH`
pub fn is_semver(version: &str) -> bool {
    SEMVER.is_match(version)
}

fn version_suffix(version: &str) -> String {
    if is_semver(version) {
        format!("@{}", version)
    } else {
        String::new()
    }
}

/// `urn:proto:api:<slug(name)>/service[@<semver>]`
pub fn service_urn(name: &str, version: &str) -> String {
    format!("{}:{}/service{}", URN_PREFIX, slug(name), version_suffix(version))
}

/// `urn:proto:api:<slug(service)>/endpoint/<id>[@<semver>]`
///
/// `id` is the slugged operation id, or the slugged `"<method> <path>"`
/// when the operation has none.
pub fn endpoint_urn(service: &str, endpoint: &Endpoint, version: &str) -> String {
    let id = match endpoint.operation_id.as_deref() {
        Some(operation_id) if !operation_id.trim().is_empty() => slug(operation_id),
        _ => slug(&format!("{} {}", endpoint.method.key(), endpoint.path)),
    };
    format!(
        "{}:{}/endpoint/{}{}",
        URN_PREFIX,
        slug(service),
        id,
        version_suffix(version)
    )
}
