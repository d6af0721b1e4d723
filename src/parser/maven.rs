//! Maven `pom.xml` parser.
//!
//! Collects `project/dependencies`, `project/build/plugins` and every
//! `project/profiles/profile/build/plugins` entry as `groupId:artifactId`
//! references. Truncated or malformed XML yields an empty list.

use super::decode;
use crate::types::{PackageReference, ParsedManifest};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

/// Anything shorter cannot be a POM.
const MIN_POM_BYTES: usize = 10;

/// Implicit group of plugins declared without one.
const DEFAULT_PLUGIN_GROUP: &str = "org.apache.maven.plugins";

const DEPENDENCY_PATH: &[&str] = &["project", "dependencies", "dependency"];
const PLUGIN_PATH: &[&str] = &["project", "build", "plugins", "plugin"];
const PROFILE_PLUGIN_PATH: &[&str] = &[
    "project", "profiles", "profile", "build", "plugins", "plugin",
];

#[derive(Debug, Default)]
struct Coordinates {
    group: Option<String>,
    artifact: Option<String>,
    version: Option<String>,
    is_plugin: bool,
    depth: usize,
}

/// Parse a `pom.xml`.
pub fn parse(content: &[u8]) -> ParsedManifest {
    if content.len() < MIN_POM_BYTES {
        return ParsedManifest::empty_with("POM file is empty or too small");
    }

    let text = decode(content);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<Coordinates> = None;
    let mut entries: Vec<Coordinates> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                if current.is_none() {
                    let is_plugin = matches_path(&stack, PLUGIN_PATH)
                        || matches_path(&stack, PROFILE_PLUGIN_PATH);
                    if is_plugin || matches_path(&stack, DEPENDENCY_PATH) {
                        current = Some(Coordinates {
                            is_plugin,
                            depth: stack.len(),
                            ..Default::default()
                        });
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let Some(coords) = current.as_mut() else {
                    continue;
                };
                if stack.len() != coords.depth + 1 {
                    continue;
                }
                let value = match t.unescape() {
                    Ok(v) => v.trim().to_string(),
                    Err(e) => {
                        return ParsedManifest::empty_with(format!("invalid POM text: {}", e))
                    }
                };
                match stack.last().map(String::as_str) {
                    Some("groupId") => coords.group = Some(value),
                    Some("artifactId") => coords.artifact = Some(value),
                    Some("version") => coords.version = Some(value),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                if let Some(coords) = current.take_if(|c| c.depth == stack.len()) {
                    entries.push(coords);
                }
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("Unable to parse POM: {}", e);
                return ParsedManifest::empty_with(format!("unable to parse POM: {}", e));
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return ParsedManifest::empty_with(format!(
            "truncated POM: <{}> is never closed",
            stack.join("/")
        ));
    }

    let mut parsed = ParsedManifest::default();
    for entry in entries {
        let Some(artifact) = entry.artifact.filter(|a| !a.is_empty()) else {
            parsed
                .diagnostics
                .push("entry without artifactId skipped".to_string());
            continue;
        };
        let group = match entry.group.filter(|g| !g.is_empty()) {
            Some(group) => group,
            None if entry.is_plugin => DEFAULT_PLUGIN_GROUP.to_string(),
            None => {
                parsed
                    .diagnostics
                    .push(format!("dependency {} has no groupId, skipped", artifact));
                continue;
            }
        };
        parsed.packages.push(PackageReference::registry(
            format!("{}:{}", group, artifact),
            entry.version.unwrap_or_default(),
        ));
    }
    parsed
}

/// Split a `groupId:artifactId` identifier.
pub fn split_coordinates(identifier: &str) -> (&str, &str) {
    identifier.split_once(':').unwrap_or((identifier, ""))
}

fn matches_path(stack: &[String], path: &[&str]) -> bool {
    stack.iter().map(String::as_str).eq(path.iter().copied())
}
