//! GitHub repository and organization scanning through the REST API.

use crate::parser::base_name;
use crate::pool::{run_collect, WorkerPool};
use crate::scanner::Scanner;
use crate::types::{
    ConfusedError, Ecosystem, HttpConfig, ManifestSource, Result, ScanKind, ScanResult,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

/// What to look for and how far to go.
#[derive(Debug, Clone)]
pub struct GithubOptions {
    pub ecosystems: Vec<Ecosystem>,
    /// Also scan every non-default branch.
    pub deep: bool,
    /// Cap on repositories taken from an organization listing.
    pub max_repos: usize,
}

impl Default for GithubOptions {
    fn default() -> Self {
        Self {
            ecosystems: Ecosystem::ALL.to_vec(),
            deep: false,
            max_repos: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    full_name: String,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BranchInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

/// A manifest found in a branch tree.
#[derive(Debug, Clone)]
struct ManifestEntry {
    branch: String,
    path: String,
    sha: String,
    size: Option<u64>,
    ecosystem: Ecosystem,
}

#[derive(Clone)]
pub struct GithubScanner {
    client: Client,
    api_base: String,
    scanner: Scanner,
}

impl GithubScanner {
    /// Create a scanner for api.github.com. Without a token requests are
    /// unauthenticated and heavily rate limited.
    pub fn new(scanner: Scanner, http: &HttpConfig, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));

        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => {
                info!("GitHub token provided, using authenticated requests");
                let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                    ConfusedError::ConfigError("GitHub token is not a valid header value".into())
                })?;
                headers.insert(AUTHORIZATION, value);
            }
            None => {
                warn!("No GitHub token provided, using unauthenticated requests (rate limited)");
            }
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .user_agent(http.user_agent.as_str())
            .default_headers(headers)
            .http1_only()
            .build()?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            scanner,
        })
    }

    /// Point at another API host (GitHub Enterprise or a test server).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Scan one `owner/repo`, fanning its manifests out over a worker pool.
    ///
    /// Failing to read the repository or its default branch is an error;
    /// failures on other branches or single files are logged and skipped.
    pub async fn scan_repository(&self, repo: &str, options: &GithubOptions) -> Result<Vec<ScanResult>> {
        let (owner, name) = split_repo(repo)?;
        info!("Scanning repository: {}/{}", owner, name);

        let entries = self.collect_manifests(owner, name, options).await?;
        info!("Found {} dependency file(s) in {}/{}", entries.len(), owner, name);

        let jobs: Vec<_> = entries
            .into_iter()
            .map(|entry| {
                let this = self.clone();
                let (owner, name) = (owner.to_string(), name.to_string());
                async move { this.scan_manifest(&owner, &name, entry).await }
            })
            .collect();

        Ok(run_collect(self.scanner.workers(), jobs)
            .await
            .into_iter()
            .flatten()
            .collect())
    }

    /// Scan the public repositories of an organization, one pool task per
    /// repository. A repository that fails contributes nothing.
    pub async fn scan_organization(&self, org: &str, options: &GithubOptions) -> Result<Vec<ScanResult>> {
        info!("Scanning organization: {}", org);
        let repos = self.list_org_repos(org, options.max_repos).await?;
        info!("Found {} repositories", repos.len());

        if repos.is_empty() {
            return Ok(Vec::new());
        }

        let (tx, mut rx) = mpsc::channel::<Vec<ScanResult>>(repos.len());
        let pool = WorkerPool::started(self.scanner.workers());

        for repo in repos {
            let this = self.clone();
            let options = options.clone();
            let tx = tx.clone();
            let submitted = pool
                .submit(async move {
                    let results = match this.scan_repository_sequential(&repo, &options).await {
                        Ok(results) => results,
                        Err(e) => {
                            warn!("Failed to scan repository {}: {}", repo, e);
                            Vec::new()
                        }
                    };
                    let _ = tx.send(results).await;
                })
                .await;
            if let Err(e) = submitted {
                warn!("Unable to queue repository scan: {}", e);
                break;
            }
        }
        drop(tx);
        pool.stop().await;

        let mut all = Vec::new();
        while let Some(results) = rx.recv().await {
            all.extend(results);
        }
        Ok(all)
    }

    /// Repository scan used inside an organization worker: files one by one.
    async fn scan_repository_sequential(&self, repo: &str, options: &GithubOptions) -> Result<Vec<ScanResult>> {
        let (owner, name) = split_repo(repo)?;
        let entries = self.collect_manifests(owner, name, options).await?;

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(result) = self.scan_manifest(owner, name, entry).await {
                results.push(result);
            }
        }
        Ok(results)
    }

    /// Manifests of the default branch, plus every other branch in deep mode.
    async fn collect_manifests(
        &self,
        owner: &str,
        name: &str,
        options: &GithubOptions,
    ) -> Result<Vec<ManifestEntry>> {
        let info: RepoInfo = self
            .get_json(&format!("{}/repos/{}/{}", self.api_base, owner, name))
            .await?
            .0;
        let default_branch = info
            .default_branch
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "main".to_string());
        debug!("Repository {} default branch: {}", info.full_name, default_branch);

        let mut entries = self
            .branch_manifests(owner, name, &default_branch, &options.ecosystems)
            .await?;

        if options.deep {
            match self.list_branches(owner, name).await {
                Ok(branches) => {
                    for branch in branches.iter().filter(|b| **b != default_branch) {
                        match self
                            .branch_manifests(owner, name, branch, &options.ecosystems)
                            .await
                        {
                            Ok(found) => entries.extend(found),
                            Err(e) => warn!("Failed to scan branch {}: {}", branch, e),
                        }
                    }
                }
                Err(e) => warn!("Failed to get branches for deep scan: {}", e),
            }
        }

        Ok(entries)
    }

    async fn branch_manifests(
        &self,
        owner: &str,
        name: &str,
        branch: &str,
        ecosystems: &[Ecosystem],
    ) -> Result<Vec<ManifestEntry>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base,
            owner,
            name,
            urlencoding::encode(branch)
        );
        let tree: TreeResponse = self.get_json(&url).await?.0;
        if tree.truncated {
            warn!(
                "Tree listing for {}/{}@{} was truncated, some files may be missed",
                owner, name, branch
            );
        }

        let entries = find_manifests(tree.tree, ecosystems, branch);
        debug!(
            "Found {} dependency file(s) in branch {}",
            entries.len(),
            branch
        );
        Ok(entries)
    }

    /// Fetch, resolve and finalize one manifest. Failures are logged.
    async fn scan_manifest(&self, owner: &str, name: &str, entry: ManifestEntry) -> Option<ScanResult> {
        let content = match self.get_blob(owner, name, &entry.sha).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to fetch {} ({}): {}", entry.path, entry.branch, e);
                return None;
            }
        };

        let source = ManifestSource::new(
            format!("{}/{}@{}:{}", owner, name, entry.branch, entry.path),
            base_name(&entry.path),
            entry.ecosystem,
            content,
        );
        let mut recorder = self.scanner.resolve_source(&source, ScanKind::Github).await;
        recorder.set_metadata("repository", format!("{}/{}", owner, name));
        recorder.set_metadata("branch", entry.branch);
        recorder.set_metadata("file_path", entry.path);
        recorder.set_metadata("file_sha", entry.sha);
        if let Some(size) = entry.size {
            recorder.set_metadata("file_size", size);
        }
        Some(self.scanner.finalize(recorder))
    }

    async fn get_blob(&self, owner: &str, name: &str, sha: &str) -> Result<Vec<u8>> {
        let url = format!("{}/repos/{}/{}/git/blobs/{}", self.api_base, owner, name, sha);
        let blob: BlobResponse = self.get_json(&url).await?.0;
        if blob.encoding == "base64" {
            let compact: String = blob.content.split_whitespace().collect();
            Ok(STANDARD.decode(compact)?)
        } else {
            Ok(blob.content.into_bytes())
        }
    }

    async fn list_branches(&self, owner: &str, name: &str) -> Result<Vec<String>> {
        let first = format!(
            "{}/repos/{}/{}/branches?per_page={}&page=1",
            self.api_base, owner, name, PER_PAGE
        );
        let branches: Vec<BranchInfo> = self.get_paginated(first, usize::MAX).await?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn list_org_repos(&self, org: &str, max_repos: usize) -> Result<Vec<String>> {
        let first = format!(
            "{}/orgs/{}/repos?type=public&per_page={}&page=1",
            self.api_base, org, PER_PAGE
        );
        let repos: Vec<RepoInfo> = self.get_paginated(first, max_repos).await?;
        Ok(repos.into_iter().map(|r| r.full_name).collect())
    }

    /// Follow `Link: rel="next"` until exhausted or `limit` items are collected.
    async fn get_paginated<T: DeserializeOwned>(&self, first: String, limit: usize) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next {
            let (page, link): (Vec<T>, Option<String>) = self.get_json(&url).await?;
            items.extend(page);
            if items.len() >= limit {
                items.truncate(limit);
                break;
            }
            next = link;
        }
        Ok(items)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<(T, Option<String>)> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .is_some_and(|v| v.as_bytes() == b"0");
            if exhausted {
                return Err(ConfusedError::RateLimited(format!("GitHub API ({})", status)));
            }
            return Err(ConfusedError::TargetUnreachable {
                target: url.to_string(),
                reason: status.to_string(),
            });
        }
        let next = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);
        Ok((response.json().await?, next))
    }
}

fn split_repo(repo: &str) -> Result<(&str, &str)> {
    match repo.trim().trim_end_matches('/').split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(ConfusedError::ConfigError(format!(
            "invalid repository format: {} (expected owner/repo)",
            repo
        ))),
    }
}

/// Tree blobs whose base filename is a manifest of a requested ecosystem.
fn find_manifests(tree: Vec<TreeEntry>, ecosystems: &[Ecosystem], branch: &str) -> Vec<ManifestEntry> {
    tree.into_iter()
        .filter(|entry| entry.kind == "blob")
        .filter_map(|entry| {
            let ecosystem = Ecosystem::from_manifest_name(base_name(&entry.path))?;
            ecosystems.contains(&ecosystem).then(|| ManifestEntry {
                branch: branch.to_string(),
                path: entry.path,
                sha: entry.sha,
                size: entry.size,
                ecosystem,
            })
        })
        .collect()
}

/// URL of the `rel="next"` entry of a `Link` header.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (url, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| url.trim().trim_start_matches('<').trim_end_matches('>').to_string())
    })
}
