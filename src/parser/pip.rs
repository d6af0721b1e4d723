//! Python manifests: requirements files, `pyproject.toml` and `setup.py`.

use super::decode;
use crate::types::{OriginKind, PackageReference, ParsedManifest};
use once_cell::sync::Lazy;
use regex::Regex;
use toml::Value;
use tracing::debug;

/// Characters that end the package name in a requirement line.
const PIP_DELIMITERS: &[char] = &['=', '<', '>', '!', ' ', '~', '#', '[', ';', '\t'];

static INSTALL_REQUIRES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)install_requires\s*=\s*\[(.*?)\]").unwrap());

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["']([^"']+)["']"#).unwrap());

static EGG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[#&]egg=([A-Za-z0-9_.\-]+)").unwrap());

/// Parse a Python manifest, choosing the format from the file name.
pub fn parse(file_name: &str, content: &[u8]) -> ParsedManifest {
    match file_name {
        "pyproject.toml" => parse_pyproject(content),
        "setup.py" => parse_setup_py(content),
        _ => parse_requirements(content),
    }
}

/// Parse a requirements file. Lines ending in `\` are joined with the next
/// line before the name is split off.
pub fn parse_requirements(content: &[u8]) -> ParsedManifest {
    let text = decode(content);
    let mut parsed = ParsedManifest::default();
    let mut line = String::new();

    for raw in text.lines() {
        let l = raw.trim();
        if l.starts_with('#') {
            continue;
        }
        if l.is_empty() {
            continue;
        }
        if let Some(head) = l.strip_suffix('\\') {
            line.push_str(head);
            continue;
        }
        line.push_str(l);

        if let Some(reference) = parse_requirement_line(&line) {
            parsed.packages.push(reference);
        }
        line.clear();
    }

    // Dangling continuation at end of file.
    if !line.is_empty() {
        if let Some(reference) = parse_requirement_line(&line) {
            parsed.packages.push(reference);
        }
    }

    parsed
}

/// Turn one logical requirement line into a reference.
pub fn parse_requirement_line(line: &str) -> Option<PackageReference> {
    let line = line.trim();

    if line.starts_with('-') {
        return parse_option_line(line);
    }

    // VCS or archive line without a name prefix.
    if let Some(origin) = url_origin(line) {
        let name = egg_name(line)?;
        return Some(PackageReference::new(name, line, origin));
    }

    let name = line
        .split(|c| PIP_DELIMITERS.contains(&c))
        .find(|field| !field.is_empty())?
        .trim();
    if name.is_empty() || name.starts_with('.') || name.starts_with('/') {
        return None;
    }
    let rest = line[line.find(name).map(|i| i + name.len()).unwrap_or(line.len())..].trim();

    // PEP 508 direct reference: `name @ url`.
    if let Some((before, url)) = rest.split_once('@') {
        if before.trim().is_empty() || before.trim_start().starts_with('[') {
            let url = url.trim();
            let origin = url_origin(url).unwrap_or(OriginKind::DirectURL);
            return Some(PackageReference::new(name, url, origin));
        }
    }

    // PEP 508 `name@url` with no spaces ends up as one field.
    if let Some((bare, url)) = name.split_once('@') {
        let origin = url_origin(url).unwrap_or(OriginKind::DirectURL);
        return Some(PackageReference::new(bare, url, origin));
    }

    let version = rest.split(';').next().unwrap_or_default().trim();
    Some(PackageReference::registry(name, version))
}

/// `-e` / `--editable` lines carry a VCS URL or local path; other options are skipped.
fn parse_option_line(line: &str) -> Option<PackageReference> {
    let target = line
        .strip_prefix("--editable")
        .or_else(|| line.strip_prefix("-e"))?
        .trim_start_matches('=')
        .trim();

    let origin = url_origin(target).unwrap_or(OriginKind::LocalPath);
    match egg_name(target) {
        Some(name) => Some(PackageReference::new(name, target, origin)),
        None => {
            debug!("Skipping editable requirement without a name: {}", target);
            None
        }
    }
}

fn egg_name(line: &str) -> Option<String> {
    EGG_NAME
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Origin of a URL-like requirement target, or `None` for a plain name.
fn url_origin(target: &str) -> Option<OriginKind> {
    let lower = target.to_ascii_lowercase();
    const VCS: &[&str] = &["git+", "hg+", "svn+", "bzr+"];
    if VCS.iter().any(|p| lower.starts_with(p)) {
        return Some(OriginKind::GitRef);
    }
    if lower.starts_with("file:") || lower.starts_with("./") || lower.starts_with("../") {
        return Some(OriginKind::LocalPath);
    }
    if lower.starts_with("http:") || lower.starts_with("https:") {
        return Some(OriginKind::DirectURL);
    }
    None
}

fn parse_pyproject(content: &[u8]) -> ParsedManifest {
    let text = decode(content);
    let root: Value = match toml::from_str::<Value>(&text) {
        Ok(v) => v,
        Err(e) => return ParsedManifest::empty_with(format!("invalid pyproject.toml: {}", e)),
    };

    let mut parsed = ParsedManifest::default();

    if let Some(project) = root.get("project") {
        let requirement_lists = project
            .get("dependencies")
            .into_iter()
            .chain(
                project
                    .get("optional-dependencies")
                    .and_then(Value::as_table)
                    .into_iter()
                    .flat_map(|groups| groups.values()),
            );
        for list in requirement_lists {
            for entry in list.as_array().into_iter().flatten() {
                if let Some(reference) = entry.as_str().and_then(parse_requirement_line) {
                    parsed.packages.push(reference);
                }
            }
        }
    }

    if let Some(poetry) = root.get("tool").and_then(|t| t.get("poetry")) {
        let mut tables: Vec<&Value> = Vec::new();
        tables.extend(poetry.get("dependencies"));
        tables.extend(poetry.get("dev-dependencies"));
        if let Some(groups) = poetry.get("group").and_then(Value::as_table) {
            tables.extend(groups.values().filter_map(|g| g.get("dependencies")));
        }

        for table in tables.into_iter().filter_map(Value::as_table) {
            for (name, spec) in table {
                if name.eq_ignore_ascii_case("python") {
                    continue;
                }
                parsed.packages.push(poetry_reference(name, spec));
            }
        }
    }

    parsed
}

fn poetry_reference(name: &str, spec: &Value) -> PackageReference {
    match spec {
        Value::String(version) => PackageReference::registry(name, version.as_str()),
        Value::Table(table) => {
            let field = |key: &str| table.get(key).and_then(Value::as_str);
            if let Some(path) = field("path") {
                PackageReference::new(name, path, OriginKind::LocalPath)
            } else if let Some(git) = field("git") {
                PackageReference::new(name, git, OriginKind::GitRef)
            } else if let Some(url) = field("url") {
                PackageReference::new(name, url, OriginKind::DirectURL)
            } else {
                PackageReference::registry(name, field("version").unwrap_or_default())
            }
        }
        _ => PackageReference::registry(name, ""),
    }
}

fn parse_setup_py(content: &[u8]) -> ParsedManifest {
    let text = decode(content);
    let Some(caps) = INSTALL_REQUIRES.captures(&text) else {
        return ParsedManifest::empty_with("no install_requires list in setup.py");
    };
    let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

    let packages = QUOTED
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .filter_map(|m| parse_requirement_line(m.as_str()))
        .collect();

    ParsedManifest {
        packages,
        diagnostics: Vec::new(),
    }
}
