//! Resolution engine shared by every orchestrator.
//!
//! Turns one manifest into a populated [`ScanRecorder`]: parse, check every
//! reference against its registry, sort the outcome into vulnerable and safe.
//! Orchestrators add their own metadata and finalize the recorder.

use crate::parser::base_name;
use crate::pool::run_collect;
use crate::registry::{resolver_for, PackageResolver, RegistryClient};
use crate::safe_space::SafeSpaces;
use crate::types::{
    Ecosystem, HttpConfig, ManifestSource, PackageReference, ParsedManifest, RegistryCheck,
    Result, ScanKind, ScanRecorder, ScanResult,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cheap to clone; clones share the registry client and safe spaces.
#[derive(Clone)]
pub struct Scanner {
    client: Arc<RegistryClient>,
    safe_spaces: Arc<SafeSpaces>,
    workers: usize,
}

impl Scanner {
    pub fn new(client: Arc<RegistryClient>, safe_spaces: SafeSpaces, workers: usize) -> Self {
        Self {
            client,
            safe_spaces: Arc::new(safe_spaces),
            workers: workers.max(1),
        }
    }

    /// Build a scanner against the public registries.
    pub fn from_config(http: &HttpConfig, safe_spaces: SafeSpaces, workers: usize) -> Result<Self> {
        let client = RegistryClient::new(http)?;
        Ok(Self::new(Arc::new(client), safe_spaces, workers))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn safe_spaces(&self) -> &SafeSpaces {
        &self.safe_spaces
    }

    pub fn resolver(&self, ecosystem: Ecosystem) -> Arc<dyn PackageResolver> {
        resolver_for(ecosystem, Arc::clone(&self.client))
    }

    /// Resolve a manifest inside the calling task, one lookup at a time.
    pub async fn resolve_source(&self, source: &ManifestSource, kind: ScanKind) -> ScanRecorder {
        let resolver = self.resolver(source.ecosystem);
        let parsed = resolver.parse_manifest(source);
        let mut recorder = start_recorder(source, kind, &parsed);

        let mut outcomes = Vec::with_capacity(parsed.packages.len());
        for reference in parsed.packages {
            let check = resolver.check_availability(&reference).await;
            outcomes.push((reference, check));
        }

        record_outcomes(&mut recorder, outcomes);
        recorder
    }

    /// Resolve a manifest with its lookups spread over a worker pool.
    ///
    /// Outcomes are put back in manifest order before recording.
    pub async fn resolve_source_parallel(
        &self,
        source: &ManifestSource,
        kind: ScanKind,
    ) -> ScanRecorder {
        let resolver = self.resolver(source.ecosystem);
        let parsed = resolver.parse_manifest(source);
        let mut recorder = start_recorder(source, kind, &parsed);

        let jobs: Vec<_> = parsed
            .packages
            .into_iter()
            .enumerate()
            .map(|(index, reference)| {
                let resolver = Arc::clone(&resolver);
                async move {
                    let check = resolver.check_availability(&reference).await;
                    (index, reference, check)
                }
            })
            .collect();

        let mut outcomes = run_collect(self.workers, jobs).await;
        outcomes.sort_by_key(|(index, _, _)| *index);

        record_outcomes(
            &mut recorder,
            outcomes.into_iter().map(|(_, reference, check)| (reference, check)),
        );
        recorder
    }

    /// Scan one local manifest file.
    ///
    /// An unreadable file is an error; everything after reading is best effort.
    pub async fn scan_file(&self, path: &Path, ecosystem: Ecosystem) -> Result<ScanResult> {
        let content = tokio::fs::read(path).await?;
        let target = path.display().to_string();
        info!("Scanning {} as {}", target, ecosystem);

        let source = ManifestSource::new(
            target.clone(),
            base_name(&target.replace('\\', "/")),
            ecosystem,
            content,
        );
        let mut recorder = self.resolve_source_parallel(&source, ScanKind::File).await;
        recorder.set_metadata("file_path", target);
        Ok(self.finalize(recorder))
    }

    /// Apply safe spaces and freeze the recorder.
    pub fn finalize(&self, recorder: ScanRecorder) -> ScanResult {
        recorder.finalize(&self.safe_spaces)
    }
}

fn start_recorder(source: &ManifestSource, kind: ScanKind, parsed: &ParsedManifest) -> ScanRecorder {
    let mut recorder = ScanRecorder::new(source.target.clone(), kind, source.ecosystem);
    if !parsed.diagnostics.is_empty() {
        for diagnostic in &parsed.diagnostics {
            warn!("{}: {}", source.target, diagnostic);
        }
        recorder.set_metadata("parse_warnings", parsed.diagnostics.clone());
    }
    debug!(
        "{}: {} package reference(s)",
        source.target,
        parsed.packages.len()
    );
    recorder
}

fn record_outcomes(
    recorder: &mut ScanRecorder,
    outcomes: impl IntoIterator<Item = (PackageReference, RegistryCheck)>,
) {
    let mut trusted = 0usize;
    for (reference, check) in outcomes {
        match check {
            RegistryCheck::Trusted => trusted += 1,
            check if check.is_available() => recorder.add_safe(reference.identifier),
            check => {
                debug!("{} unavailable: {:?}", reference.identifier, check);
                recorder.add_vulnerable(reference.identifier);
            }
        }
    }
    if trusted > 0 {
        recorder.set_metadata("trusted_packages", trusted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OriginKind;

    #[test]
    fn test_record_outcomes_sorts_and_counts_trusted() {
        let mut recorder = ScanRecorder::new("composer.json", ScanKind::File, Ecosystem::Composer);
        record_outcomes(
            &mut recorder,
            vec![
                (
                    PackageReference::registry("monolog/monolog", "^3.0"),
                    RegistryCheck::Available,
                ),
                (
                    PackageReference::new("internal/php-package", "file:./local", OriginKind::LocalPath),
                    RegistryCheck::Trusted,
                ),
                (
                    PackageReference::registry("acme/billing", "^1.0"),
                    RegistryCheck::NotFound { status: 404 },
                ),
                (
                    PackageReference::registry("acme/slow", "^1.0"),
                    RegistryCheck::RateLimited,
                ),
            ],
        );

        let result = recorder.finalize(&SafeSpaces::default());
        assert_eq!(result.safe(), ["monolog/monolog".to_string()]);
        assert_eq!(
            result.vulnerable(),
            ["acme/billing".to_string(), "acme/slow".to_string()]
        );
        assert_eq!(result.total(), 3);
        assert_eq!(result.metadata()["trusted_packages"], 1);
    }

    #[test]
    fn test_parse_warnings_in_metadata() {
        let source = ManifestSource::new("pom.xml", "pom.xml", Ecosystem::Maven, b"<p/>".to_vec());
        let parsed = crate::parser::parse_manifest(&source);
        let recorder = start_recorder(&source, ScanKind::File, &parsed);
        let result = recorder.finalize(&SafeSpaces::default());
        assert_eq!(result.total(), 0);
        assert!(result.metadata().contains_key("parse_warnings"));
    }

    #[tokio::test]
    async fn test_scan_missing_file_is_error() {
        let scanner = Scanner::from_config(&HttpConfig::default(), SafeSpaces::default(), 2).unwrap();
        let err = scanner
            .scan_file(Path::new("/definitely/not/here/package.json"), Ecosystem::Npm)
            .await;
        assert!(matches!(err, Err(crate::types::ConfusedError::IoError(_))));
    }
}
