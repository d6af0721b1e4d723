//! Core types and errors for the dependency confusion scanner.

use crate::safe_space::SafeSpaces;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use thiserror::Error;

/// Errors that can occur during scanning.
#[derive(Error, Debug)]
pub enum ConfusedError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("Unsupported ecosystem: {0}")]
    UnsupportedEcosystem(String),

    #[error("Target unreachable: {target}: {reason}")]
    TargetUnreachable { target: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker pool is closed")]
    PoolClosed,
}

pub type Result<T> = std::result::Result<T, ConfusedError>;

/// A package-manager family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Pip,
    Composer,
    Maven,
    Rubygems,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 5] = [
        Ecosystem::Npm,
        Ecosystem::Pip,
        Ecosystem::Composer,
        Ecosystem::Maven,
        Ecosystem::Rubygems,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Pip => "pip",
            Ecosystem::Composer => "composer",
            Ecosystem::Maven => "maven",
            Ecosystem::Rubygems => "rubygems",
        }
    }

    /// Manifest file names recognized for this ecosystem.
    pub fn manifest_files(&self) -> &'static [&'static str] {
        match self {
            Ecosystem::Npm => &["package.json", "package-lock.json", "yarn.lock"],
            Ecosystem::Pip => &[
                "requirements.txt",
                "requirements-dev.txt",
                "setup.py",
                "pyproject.toml",
            ],
            Ecosystem::Composer => &["composer.json", "composer.lock"],
            Ecosystem::Maven => &["pom.xml"],
            Ecosystem::Rubygems => &["Gemfile", "Gemfile.lock", "gems.rb", "gems.locked"],
        }
    }

    /// Map a manifest base filename back to its ecosystem.
    pub fn from_manifest_name(file_name: &str) -> Option<Ecosystem> {
        Ecosystem::ALL
            .into_iter()
            .find(|eco| eco.manifest_files().contains(&file_name))
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = ConfusedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "npm" => Ok(Ecosystem::Npm),
            "pip" | "pypi" => Ok(Ecosystem::Pip),
            "composer" => Ok(Ecosystem::Composer),
            "maven" | "mvn" => Ok(Ecosystem::Maven),
            "rubygems" | "gem" => Ok(Ecosystem::Rubygems),
            _ => Err(ConfusedError::UnsupportedEcosystem(s.to_string())),
        }
    }
}

/// Where a dependency is fetched from, judged by its version specifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OriginKind {
    /// Resolved by name against the public registry.
    Registry,
    /// Local filesystem path.
    LocalPath,
    /// Direct archive URL.
    DirectURL,
    /// Git repository reference.
    GitRef,
}

/// A dependency declared by a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PackageReference {
    /// Ecosystem-canonical package name.
    pub identifier: String,
    /// Raw version specifier as written in the manifest.
    pub version_spec: String,
    pub origin: OriginKind,
}

impl PackageReference {
    pub fn new(
        identifier: impl Into<String>,
        version_spec: impl Into<String>,
        origin: OriginKind,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            version_spec: version_spec.into(),
            origin,
        }
    }

    pub fn registry(identifier: impl Into<String>, version_spec: impl Into<String>) -> Self {
        Self::new(identifier, version_spec, OriginKind::Registry)
    }

    pub fn is_registry(&self) -> bool {
        self.origin == OriginKind::Registry
    }
}

/// Raw manifest content waiting to be parsed.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    /// File path, `owner/repo@branch:path` or URL.
    pub target: String,
    /// Base filename used to pick the manifest format.
    pub file_name: String,
    pub ecosystem: Ecosystem,
    pub content: Vec<u8>,
}

impl ManifestSource {
    pub fn new(
        target: impl Into<String>,
        file_name: impl Into<String>,
        ecosystem: Ecosystem,
        content: Vec<u8>,
    ) -> Self {
        Self {
            target: target.into(),
            file_name: file_name.into(),
            ecosystem,
            content,
        }
    }
}

/// Output of a manifest parser. Parsers never fail; problems land in `diagnostics`.
#[derive(Debug, Clone, Default)]
pub struct ParsedManifest {
    pub packages: Vec<PackageReference>,
    pub diagnostics: Vec<String>,
}

impl ParsedManifest {
    pub fn empty_with(diagnostic: impl Into<String>) -> Self {
        Self {
            packages: Vec::new(),
            diagnostics: vec![diagnostic.into()],
        }
    }
}

/// Result of checking a package reference against its public registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryCheck {
    /// Registry answered 200.
    Available,
    /// npm entry exists but every version was unpublished.
    Unpublished,
    /// Registry answered with a non-200, non-429 status.
    NotFound { status: u16 },
    /// Still throttled after the retry budget.
    RateLimited,
    /// Transport failure, not retried.
    NetworkError(String),
    /// Non-registry origin; never looked up.
    Trusted,
}

impl RegistryCheck {
    pub fn is_available(&self) -> bool {
        matches!(self, RegistryCheck::Available | RegistryCheck::Trusted)
    }
}

/// Kind of target a scan result belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    File,
    Github,
    Web,
}

/// Mutable accumulator for one manifest; becomes a [`ScanResult`] on `finalize`.
#[derive(Debug)]
pub struct ScanRecorder {
    target: String,
    kind: ScanKind,
    ecosystem: Ecosystem,
    vulnerable: Vec<String>,
    safe: Vec<String>,
    timestamp: DateTime<Utc>,
    started: Instant,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl ScanRecorder {
    pub fn new(target: impl Into<String>, kind: ScanKind, ecosystem: Ecosystem) -> Self {
        Self {
            target: target.into(),
            kind,
            ecosystem,
            vulnerable: Vec::new(),
            safe: Vec::new(),
            timestamp: Utc::now(),
            started: Instant::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn add_vulnerable(&mut self, identifier: impl Into<String>) {
        self.vulnerable.push(identifier.into());
    }

    pub fn add_safe(&mut self, identifier: impl Into<String>) {
        self.safe.push(identifier.into());
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn vulnerable(&self) -> &[String] {
        &self.vulnerable
    }

    /// Drop vulnerable identifiers covered by a safe space, then freeze counts and duration.
    pub fn finalize(mut self, safe_spaces: &SafeSpaces) -> ScanResult {
        let before = self.vulnerable.len();
        self.vulnerable = safe_spaces.filter(std::mem::take(&mut self.vulnerable));
        let excluded = before - self.vulnerable.len();
        if excluded > 0 {
            self.metadata
                .insert("excluded_by_safe_space".to_string(), excluded.into());
        }

        ScanResult {
            total: self.vulnerable.len() + self.safe.len(),
            duration_secs: self.started.elapsed().as_secs_f64(),
            target: self.target,
            kind: self.kind,
            ecosystem: self.ecosystem,
            vulnerable: self.vulnerable,
            safe: self.safe,
            timestamp: self.timestamp,
            metadata: self.metadata,
        }
    }
}

/// Finalized, read-only outcome for one manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    target: String,
    #[serde(rename = "type")]
    kind: ScanKind,
    ecosystem: Ecosystem,
    #[serde(rename = "vulnerable_packages")]
    vulnerable: Vec<String>,
    #[serde(rename = "safe_packages")]
    safe: Vec<String>,
    #[serde(rename = "total_packages")]
    total: usize,
    timestamp: DateTime<Utc>,
    duration_secs: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl ScanResult {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn kind(&self) -> ScanKind {
        self.kind
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    pub fn vulnerable(&self) -> &[String] {
        &self.vulnerable
    }

    pub fn safe(&self) -> &[String] {
        &self.safe
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn is_vulnerable(&self) -> bool {
        !self.vulnerable.is_empty()
    }
}

/// Totals across a batch of results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_targets: usize,
    pub vulnerable_count: usize,
    pub safe_count: usize,
    pub total_duration_secs: f64,
}

/// Aggregate handed to the reporting layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub results: Vec<ScanResult>,
    pub summary: ScanSummary,
}

impl ScanReport {
    pub fn new(mut results: Vec<ScanResult>) -> Self {
        // Sort for reproducible output; collection order is not meaningful.
        results.sort_by(|a, b| a.target.cmp(&b.target));

        let mut summary = ScanSummary {
            total_targets: results.len(),
            ..Default::default()
        };
        for result in &results {
            summary.vulnerable_count += result.vulnerable.len();
            summary.safe_count += result.safe.len();
            if result.duration_secs > summary.total_duration_secs {
                summary.total_duration_secs = result.duration_secs;
            }
        }

        Self { results, summary }
    }

    /// Exit-status signal: any result with at least one vulnerable identifier.
    pub fn any_vulnerable(&self) -> bool {
        self.results.iter().any(ScanResult::is_vulnerable)
    }
}

/// Configuration for HTTP requests.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Registry lookups per second.
    pub rate_limit: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "Confused-DepConfusion-Scanner/2.0".to_string(),
            rate_limit: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecosystem_from_str() {
        assert_eq!("npm".parse::<Ecosystem>().unwrap(), Ecosystem::Npm);
        assert_eq!("mvn".parse::<Ecosystem>().unwrap(), Ecosystem::Maven);
        assert_eq!("Maven".parse::<Ecosystem>().unwrap(), Ecosystem::Maven);
        assert!(matches!(
            "cargo".parse::<Ecosystem>(),
            Err(ConfusedError::UnsupportedEcosystem(name)) if name == "cargo"
        ));
    }

    #[test]
    fn test_manifest_name_lookup() {
        assert_eq!(Ecosystem::from_manifest_name("yarn.lock"), Some(Ecosystem::Npm));
        assert_eq!(Ecosystem::from_manifest_name("pom.xml"), Some(Ecosystem::Maven));
        assert_eq!(Ecosystem::from_manifest_name("Gemfile.lock"), Some(Ecosystem::Rubygems));
        assert_eq!(Ecosystem::from_manifest_name("Cargo.toml"), None);
    }

    #[test]
    fn test_registry_check_availability() {
        assert!(RegistryCheck::Available.is_available());
        assert!(RegistryCheck::Trusted.is_available());
        assert!(!RegistryCheck::Unpublished.is_available());
        assert!(!RegistryCheck::NotFound { status: 404 }.is_available());
        assert!(!RegistryCheck::RateLimited.is_available());
        assert!(!RegistryCheck::NetworkError("dns".into()).is_available());
    }

    #[test]
    fn test_recorder_finalize_counts() {
        let mut recorder = ScanRecorder::new("package.json", ScanKind::File, Ecosystem::Npm);
        recorder.add_vulnerable("@company/private-package");
        recorder.add_vulnerable("@other/foo");
        recorder.add_safe("lodash");

        let safe_spaces = SafeSpaces::new(&["@company/*".to_string()]);
        let result = recorder.finalize(&safe_spaces);

        assert_eq!(result.vulnerable(), ["@other/foo".to_string()]);
        assert_eq!(result.safe(), ["lodash".to_string()]);
        assert_eq!(result.total(), 2);
        assert_eq!(result.metadata()["excluded_by_safe_space"], 1);
        assert!(result.duration_secs() >= 0.0);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut recorder = ScanRecorder::new("requirements.txt", ScanKind::File, Ecosystem::Pip);
        recorder.add_vulnerable("internal-lib");
        recorder.add_vulnerable("internal-lib");
        let result = recorder.finalize(&SafeSpaces::default());
        assert_eq!(result.total(), 2);
    }

    #[test]
    fn test_report_summary() {
        let mut a = ScanRecorder::new("b-target", ScanKind::Web, Ecosystem::Npm);
        a.add_vulnerable("x");
        a.add_safe("y");
        let mut b = ScanRecorder::new("a-target", ScanKind::Web, Ecosystem::Pip);
        b.add_safe("requests");

        let report = ScanReport::new(vec![
            a.finalize(&SafeSpaces::default()),
            b.finalize(&SafeSpaces::default()),
        ]);

        assert_eq!(report.summary.total_targets, 2);
        assert_eq!(report.summary.vulnerable_count, 1);
        assert_eq!(report.summary.safe_count, 2);
        assert_eq!(report.results[0].target(), "a-target");
        assert!(report.any_vulnerable());
    }

    #[test]
    fn test_scan_result_serialization_names() {
        let mut recorder = ScanRecorder::new("pom.xml", ScanKind::File, Ecosystem::Maven);
        recorder.add_vulnerable("com.acme:core");
        let json = serde_json::to_value(recorder.finalize(&SafeSpaces::default())).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["ecosystem"], "maven");
        assert_eq!(json["vulnerable_packages"][0], "com.acme:core");
        assert_eq!(json["total_packages"], 1);
    }
}
