//! npm manifests: `package.json`, `package-lock.json` and `yarn.lock`.

use super::decode;
use crate::types::{OriginKind, PackageReference, ParsedManifest};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Dependency sections read from `package.json`.
const DEPENDENCY_SECTIONS: &[&str] = &["dependencies", "devDependencies", "peerDependencies"];

/// Bare GitHub shorthand: `user/repo` with an optional `#ref`.
static GITHUB_SHORTHAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*/[A-Za-z0-9_.-]+(#.*)?$").unwrap());

/// Parse an npm manifest, choosing the format from the file name.
pub fn parse(file_name: &str, content: &[u8]) -> ParsedManifest {
    match file_name {
        "package-lock.json" => parse_package_lock(content),
        "yarn.lock" => parse_yarn_lock(content),
        _ => parse_package_json(content),
    }
}

/// Classify a `package.json` version value by where it fetches from.
pub fn classify_spec(spec: &str) -> OriginKind {
    let lower = spec.trim().to_ascii_lowercase();

    if lower.starts_with("file:") || lower.starts_with("link:") || lower.starts_with("workspace:") {
        return OriginKind::LocalPath;
    }

    const GIT_PREFIXES: &[&str] = &[
        "git+", "git:", "github:", "gitlab:", "bitbucket:", "gist:",
    ];
    if GIT_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return OriginKind::GitRef;
    }

    if lower.starts_with("http:") || lower.starts_with("https:") {
        if lower.ends_with(".git") || lower.contains(".git#") {
            return OriginKind::GitRef;
        }
        return OriginKind::DirectURL;
    }

    if GITHUB_SHORTHAND.is_match(spec.trim()) {
        return OriginKind::GitRef;
    }

    OriginKind::Registry
}

/// Target of an `npm:<name>[@<range>]` alias. The alias key is only a local
/// name; npm installs the target package.
pub fn alias_target(spec: &str) -> Option<(&str, &str)> {
    let aliased = spec.trim().strip_prefix("npm:")?;
    if let Some(target) = split_name_range(aliased) {
        return Some(target);
    }
    // yarn berry writes `npm:<range>` for plain registry entries.
    let starts_like_name =
        aliased.starts_with('@') || aliased.starts_with(|c: char| c.is_ascii_alphabetic());
    starts_like_name.then_some((aliased, ""))
}

/// Reference for a dependency key and its version value.
fn dependency_reference(name: &str, spec: &str) -> PackageReference {
    match alias_target(spec) {
        Some((target, range)) => PackageReference::new(target, range, classify_spec(range)),
        None => PackageReference::new(name, spec, classify_spec(spec)),
    }
}

fn parse_package_json(content: &[u8]) -> ParsedManifest {
    let text = decode(content);
    let root: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => return ParsedManifest::empty_with(format!("invalid package.json: {}", e)),
    };

    let mut parsed = ParsedManifest::default();
    for section in DEPENDENCY_SECTIONS {
        let Some(deps) = root.get(*section) else {
            continue;
        };
        let Some(deps) = deps.as_object() else {
            parsed
                .diagnostics
                .push(format!("{} is not an object", section));
            continue;
        };
        for (name, value) in deps {
            let spec = value.as_str().unwrap_or_default();
            parsed.packages.push(dependency_reference(name, spec));
        }
    }

    debug!("package.json: {} references", parsed.packages.len());
    parsed
}

fn parse_package_lock(content: &[u8]) -> ParsedManifest {
    let text = decode(content);
    let root: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => return ParsedManifest::empty_with(format!("invalid package-lock.json: {}", e)),
    };

    let mut parsed = ParsedManifest::default();

    // lockfileVersion 2 and 3
    if let Some(packages) = root.get("packages").and_then(Value::as_object) {
        for (key, entry) in packages {
            let Some(pos) = key.rfind("node_modules/") else {
                continue; // root project entry
            };
            let name = &key[pos + "node_modules/".len()..];
            if name.is_empty() {
                continue;
            }
            // Aliased installs record the real package name.
            let name = entry.get("name").and_then(Value::as_str).unwrap_or(name);
            let version = entry.get("version").and_then(Value::as_str).unwrap_or_default();
            let resolved = entry.get("resolved").and_then(Value::as_str).unwrap_or_default();

            let origin = if entry.get("link").and_then(Value::as_bool).unwrap_or(false) {
                OriginKind::LocalPath
            } else {
                lock_origin(version, resolved)
            };
            parsed
                .packages
                .push(PackageReference::new(name, version, origin));
        }
        return parsed;
    }

    // lockfileVersion 1
    if let Some(deps) = root.get("dependencies").and_then(Value::as_object) {
        collect_v1_dependencies(deps, &mut parsed);
    }

    parsed
}

fn collect_v1_dependencies(deps: &Map<String, Value>, parsed: &mut ParsedManifest) {
    for (name, entry) in deps {
        let version = entry.get("version").and_then(Value::as_str).unwrap_or_default();
        let resolved = entry.get("resolved").and_then(Value::as_str).unwrap_or_default();
        let reference = match alias_target(version) {
            Some((target, pinned)) => {
                PackageReference::new(target, pinned, lock_origin(pinned, resolved))
            }
            None => PackageReference::new(name.as_str(), version, lock_origin(version, resolved)),
        };
        parsed.packages.push(reference);

        if let Some(nested) = entry.get("dependencies").and_then(Value::as_object) {
            collect_v1_dependencies(nested, parsed);
        }
    }
}

/// Origin of a lockfile entry. Registry tarball URLs stay `Registry`.
fn lock_origin(version: &str, resolved: &str) -> OriginKind {
    match classify_spec(version) {
        OriginKind::Registry => {}
        other => return other,
    }
    let lower = resolved.to_ascii_lowercase();
    if lower.starts_with("git+") || lower.starts_with("git:") {
        OriginKind::GitRef
    } else if lower.starts_with("file:") {
        OriginKind::LocalPath
    } else {
        OriginKind::Registry
    }
}

fn parse_yarn_lock(content: &[u8]) -> ParsedManifest {
    let text = decode(content);
    let mut parsed = ParsedManifest::default();

    for line in text.lines() {
        // Entry headers start at column 0 and end with a colon.
        if line.is_empty() || line.starts_with(char::is_whitespace) || line.starts_with('#') {
            continue;
        }
        let Some(header) = line.trim_end().strip_suffix(':') else {
            continue;
        };

        let first = header.split(',').next().unwrap_or_default().trim().trim_matches('"');
        let Some((name, range)) = split_name_range(first) else {
            continue; // e.g. __metadata
        };

        let reference = match alias_target(range) {
            Some((target, aliased_range)) => {
                PackageReference::new(target, aliased_range, classify_spec(aliased_range))
            }
            None => match range.strip_prefix("npm:") {
                Some(_) => PackageReference::registry(name, range),
                None => PackageReference::new(name, range, classify_spec(range)),
            },
        };
        parsed.packages.push(reference);
    }

    if parsed.packages.is_empty() && !text.trim().is_empty() {
        parsed
            .diagnostics
            .push("no entries recognized in yarn.lock".to_string());
    }
    parsed
}

/// Split `name@range` at the first `@` after an optional scope prefix.
fn split_name_range(spec: &str) -> Option<(&str, &str)> {
    let search_from = usize::from(spec.starts_with('@'));
    let at = spec[search_from..].find('@')? + search_from;
    let (name, range) = (&spec[..at], &spec[at + 1..]);
    if name.is_empty() {
        return None;
    }
    Some((name, range))
}
