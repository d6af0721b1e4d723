//! Composer manifests: `composer.json` and `composer.lock`.

use super::decode;
use crate::types::{OriginKind, PackageReference, ParsedManifest};
use serde_json::Value;
use tracing::trace;

/// Parse a Composer manifest, choosing the format from the file name.
pub fn parse(file_name: &str, content: &[u8]) -> ParsedManifest {
    match file_name {
        "composer.lock" => parse_lock(content),
        _ => parse_composer_json(content),
    }
}

/// Classify a `require` constraint by where it fetches from.
pub fn classify_constraint(constraint: &str) -> OriginKind {
    let lower = constraint.trim().to_ascii_lowercase();
    if lower.starts_with("file:") {
        return OriginKind::LocalPath;
    }
    if lower.starts_with("http:") || lower.starts_with("https:") {
        return OriginKind::DirectURL;
    }
    const GIT_PREFIXES: &[&str] = &["git+ssh:", "git+http:", "git+https:", "git:"];
    if GIT_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return OriginKind::GitRef;
    }
    OriginKind::Registry
}

/// Platform requirements (`php`, `ext-*`, ...) are not installable packages.
fn is_platform_package(name: &str) -> bool {
    const PLATFORM: &[&str] = &[
        "php",
        "php-64bit",
        "php-ipv6",
        "php-zts",
        "php-debug",
        "hhvm",
        "composer",
        "composer-plugin-api",
        "composer-runtime-api",
    ];
    let lower = name.to_ascii_lowercase();
    PLATFORM.contains(&lower.as_str()) || lower.starts_with("ext-") || lower.starts_with("lib-")
}

fn parse_composer_json(content: &[u8]) -> ParsedManifest {
    let text = decode(content);
    let root: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => return ParsedManifest::empty_with(format!("invalid composer.json: {}", e)),
    };

    let mut parsed = ParsedManifest::default();
    for section in ["require", "require-dev"] {
        let Some(deps) = root.get(section).and_then(Value::as_object) else {
            continue;
        };
        for (name, constraint) in deps {
            if is_platform_package(name) {
                trace!("Skipping platform requirement {}", name);
                continue;
            }
            let constraint = constraint.as_str().unwrap_or_default();
            parsed.packages.push(PackageReference::new(
                name.as_str(),
                constraint,
                classify_constraint(constraint),
            ));
        }
    }
    parsed
}

fn parse_lock(content: &[u8]) -> ParsedManifest {
    let text = decode(content);
    let root: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => return ParsedManifest::empty_with(format!("invalid composer.lock: {}", e)),
    };

    let mut parsed = ParsedManifest::default();
    for section in ["packages", "packages-dev"] {
        for entry in root.get(section).and_then(Value::as_array).into_iter().flatten() {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                continue;
            };
            let version = entry.get("version").and_then(Value::as_str).unwrap_or_default();
            let dist_type = entry
                .get("dist")
                .and_then(|d| d.get("type"))
                .and_then(Value::as_str);
            let origin = if dist_type == Some("path") {
                OriginKind::LocalPath
            } else {
                OriginKind::Registry
            };
            parsed
                .packages
                .push(PackageReference::new(name, version, origin));
        }
    }
    parsed
}
