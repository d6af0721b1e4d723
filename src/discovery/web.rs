//! Web target probing for exposed dependency manifests.

use crate::parser::base_name;
use crate::pool::WorkerPool;
use crate::scanner::Scanner;
use crate::types::{
    ConfusedError, Ecosystem, HttpConfig, ManifestSource, Result, ScanKind, ScanResult,
};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Directories probed one level deep in deep mode.
pub const COMMON_DIRS: &[&str] = &[
    "src/", "lib/", "app/", "web/", "public/", "static/", "api/", "backend/", "frontend/",
    "client/", "server/",
];

#[derive(Debug, Clone)]
pub struct WebOptions {
    pub ecosystems: Vec<Ecosystem>,
    pub deep: bool,
    /// `0` disables directory probing even in deep mode.
    pub max_depth: usize,
    /// Extra paths to probe, relative to the target.
    pub wordlist: Vec<String>,
}

impl Default for WebOptions {
    fn default() -> Self {
        Self {
            ecosystems: Ecosystem::ALL.to_vec(),
            deep: false,
            max_depth: 3,
            wordlist: Vec::new(),
        }
    }
}

/// A path to probe and the ecosystem its filename belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: String,
    pub ecosystem: Ecosystem,
}

#[derive(Clone)]
pub struct WebScanner {
    client: Client,
    scanner: Scanner,
}

impl WebScanner {
    pub fn new(scanner: Scanner, http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .user_agent(http.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .http1_only()
            .build()?;
        Ok(Self { client, scanner })
    }

    /// Scan every target on a dedicated pool; each worker probes one target
    /// at a time. Targets that fail are logged and contribute nothing.
    pub async fn scan_targets(&self, targets: Vec<String>, options: &WebOptions) -> Vec<ScanResult> {
        let results = Arc::new(Mutex::new(Vec::new()));
        let pool = WorkerPool::started(self.scanner.workers());

        for target in targets {
            let this = self.clone();
            let options = options.clone();
            let results = Arc::clone(&results);
            let submitted = pool
                .submit(async move {
                    match this.scan_target(&target, &options).await {
                        Ok(found) => results.lock().await.extend(found),
                        Err(e) => warn!("Failed to scan {}: {}", target, e),
                    }
                })
                .await;
            if let Err(e) = submitted {
                warn!("Unable to queue web target: {}", e);
                break;
            }
        }
        pool.stop().await;

        let mut results = results.lock().await;
        std::mem::take(&mut *results)
    }

    /// Probe the candidate paths of one target in sequence.
    ///
    /// A transport failure before the host has answered anything means the
    /// host is down; the remaining candidates are not tried.
    pub async fn scan_target(&self, target: &str, options: &WebOptions) -> Result<Vec<ScanResult>> {
        let base = Url::parse(&normalize_target(target))?;
        info!("Scanning web target: {}", base);

        let mut results = Vec::new();
        let mut answered = false;

        for candidate in &candidate_paths(options) {
            match self.probe(&base, candidate).await {
                Probe::Found(result) => {
                    answered = true;
                    results.push(result);
                }
                Probe::Missing => answered = true,
                Probe::Unreachable if !answered => {
                    return Err(ConfusedError::TargetUnreachable {
                        target: base.to_string(),
                        reason: format!("no response for {}", candidate.path),
                    });
                }
                Probe::Unreachable => {}
            }
        }
        Ok(results)
    }

    async fn probe(&self, base: &Url, candidate: &Candidate) -> Probe {
        let file_url = join_path(base, &candidate.path);
        debug!("Checking: {}", file_url);

        let response = match self.client.get(file_url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Request to {} failed: {}", file_url, e);
                return Probe::Unreachable;
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            debug!("{} answered {}", file_url, status);
            return Probe::Missing;
        }

        let content = match response.bytes().await {
            Ok(body) => body.to_vec(),
            Err(e) => {
                debug!("Failed to read {}: {}", file_url, e);
                return Probe::Missing;
            }
        };

        info!("Found {} at {}", candidate.path, file_url);
        let file_size = content.len();
        let source = ManifestSource::new(
            format!("{}:{}", authority(base), candidate.path),
            base_name(&candidate.path),
            candidate.ecosystem,
            content,
        );
        let mut recorder = self.scanner.resolve_source(&source, ScanKind::Web).await;
        recorder.set_metadata("file_path", candidate.path.clone());
        recorder.set_metadata("file_url", file_url.to_string());
        recorder.set_metadata("file_size", file_size);
        recorder.set_metadata("status_code", status.as_u16());
        Probe::Found(self.scanner.finalize(recorder))
    }
}

enum Probe {
    Found(ScanResult),
    Missing,
    Unreachable,
}

/// Prefix `https://` when no scheme is given.
pub fn normalize_target(target: &str) -> String {
    let target = target.trim();
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("https://{}", target)
    }
}

/// Well-known manifest paths for the requested ecosystems, then wordlist
/// entries, then (deep mode) each manifest name under every common directory.
pub fn candidate_paths(options: &WebOptions) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut push = |path: String, ecosystem: Ecosystem| {
        if !candidates.iter().any(|c| c.path == path) {
            candidates.push(Candidate { path, ecosystem });
        }
    };

    let manifest_names: Vec<(&str, Ecosystem)> = options
        .ecosystems
        .iter()
        .flat_map(|eco| eco.manifest_files().iter().map(move |name| (*name, *eco)))
        .collect();

    for (name, ecosystem) in &manifest_names {
        push(name.to_string(), *ecosystem);
    }

    for entry in &options.wordlist {
        let path = entry.trim().trim_start_matches('/');
        if path.is_empty() {
            continue;
        }
        match Ecosystem::from_manifest_name(base_name(path)) {
            Some(ecosystem) if options.ecosystems.contains(&ecosystem) => {
                push(path.to_string(), ecosystem)
            }
            Some(_) => debug!("Wordlist entry {} is outside the requested ecosystems", path),
            None => debug!("Skipping wordlist entry with unknown manifest name: {}", path),
        }
    }

    if options.deep && options.max_depth >= 1 {
        for dir in COMMON_DIRS {
            for (name, ecosystem) in &manifest_names {
                push(format!("{}{}", dir, name), *ecosystem);
            }
        }
    }

    candidates
}

/// Append `path` to the base URL's path.
fn join_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!("{}/{}", base.path().trim_end_matches('/'), path);
    url.set_path(&joined);
    url
}

/// `host[:port]` of the target.
fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}
