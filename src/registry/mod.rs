//! Public registry resolvers.
//!
//! Each ecosystem pairs its manifest parser with a lookup against the
//! ecosystem's public registry. References that do not resolve through a
//! registry are trusted and never looked up.

pub mod client;
pub mod maven;
pub mod npm;
pub mod packagist;
pub mod pypi;
pub mod rubygems;
pub mod sleeper;

pub use client::{Lookup, RegistryClient, RegistryEndpoints, RetryPolicy};
pub use maven::MavenResolver;
pub use npm::NpmResolver;
pub use packagist::PackagistResolver;
pub use pypi::PypiResolver;
pub use rubygems::RubygemsResolver;
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};

use crate::parser;
use crate::types::{
    Ecosystem, ManifestSource, PackageReference, ParsedManifest, RegistryCheck, Result,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Parser and registry lookup for one ecosystem.
#[async_trait]
pub trait PackageResolver: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;

    fn parse_manifest(&self, source: &ManifestSource) -> ParsedManifest {
        parser::parse_for(self.ecosystem(), &source.file_name, &source.content)
    }

    /// Query the public registry for a registry reference.
    async fn lookup(&self, reference: &PackageReference) -> RegistryCheck;

    /// Non-registry references short-circuit to [`RegistryCheck::Trusted`].
    async fn check_availability(&self, reference: &PackageReference) -> RegistryCheck {
        if !reference.is_registry() {
            return RegistryCheck::Trusted;
        }
        self.lookup(reference).await
    }

    async fn is_available(&self, reference: &PackageReference) -> bool {
        self.check_availability(reference).await.is_available()
    }
}

/// Resolver for an ecosystem.
pub fn resolver_for(ecosystem: Ecosystem, client: Arc<RegistryClient>) -> Arc<dyn PackageResolver> {
    match ecosystem {
        Ecosystem::Npm => Arc::new(NpmResolver::new(client)),
        Ecosystem::Pip => Arc::new(PypiResolver::new(client)),
        Ecosystem::Composer => Arc::new(PackagistResolver::new(client)),
        Ecosystem::Maven => Arc::new(MavenResolver::new(client)),
        Ecosystem::Rubygems => Arc::new(RubygemsResolver::new(client)),
    }
}

/// Resolver for an ecosystem name; unknown names fail with `UnsupportedEcosystem`.
pub fn resolver_by_name(name: &str, client: Arc<RegistryClient>) -> Result<Arc<dyn PackageResolver>> {
    let ecosystem: Ecosystem = name.parse()?;
    Ok(resolver_for(ecosystem, client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfusedError, HttpConfig, OriginKind};

    fn client() -> Arc<RegistryClient> {
        Arc::new(RegistryClient::new(&HttpConfig::default()).unwrap())
    }

    #[test]
    fn test_factory_covers_every_ecosystem() {
        for ecosystem in Ecosystem::ALL {
            assert_eq!(resolver_for(ecosystem, client()).ecosystem(), ecosystem);
        }
    }

    #[test]
    fn test_factory_rejects_unknown_name() {
        let err = resolver_by_name("cargo", client()).err().unwrap();
        assert!(matches!(err, ConfusedError::UnsupportedEcosystem(_)));
        assert_eq!(
            resolver_by_name("mvn", client()).unwrap().ecosystem(),
            Ecosystem::Maven
        );
    }

    #[tokio::test]
    async fn test_non_registry_reference_is_trusted() {
        // Unroutable endpoint: any request would surface as a network error.
        let client = RegistryClient::new(&HttpConfig::default())
            .unwrap()
            .with_endpoints(RegistryEndpoints::all("http://127.0.0.1:1"));
        let resolver = resolver_for(Ecosystem::Composer, Arc::new(client));
        let reference = PackageReference::new("internal/php-package", "file:./local", OriginKind::LocalPath);
        assert_eq!(
            resolver.check_availability(&reference).await,
            RegistryCheck::Trusted
        );
        assert!(resolver.is_available(&reference).await);
    }

    #[test]
    fn test_parse_manifest_uses_ecosystem_parser() {
        let resolver = resolver_for(Ecosystem::Npm, client());
        let source = ManifestSource::new(
            "package.json",
            "package.json",
            Ecosystem::Npm,
            br#"{"dependencies":{"lodash":"^4.17.21"}}"#.to_vec(),
        );
        let parsed = resolver.parse_manifest(&source);
        assert_eq!(parsed.packages[0].identifier, "lodash");
    }
}
