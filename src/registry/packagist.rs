//! Packagist resolver for Composer packages.

use crate::registry::client::RegistryClient;
use crate::registry::PackageResolver;
use crate::types::{Ecosystem, PackageReference, RegistryCheck};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct PackagistResolver {
    client: Arc<RegistryClient>,
}

impl PackagistResolver {
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }

    /// `vendor/name` maps to `/packages/vendor/name.json`.
    fn package_url(&self, name: &str) -> String {
        let path = name
            .split('/')
            .map(|part| urlencoding::encode(part).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/packages/{}.json",
            self.client.endpoints().packagist.trim_end_matches('/'),
            path
        )
    }
}

#[async_trait]
impl PackageResolver for PackagistResolver {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Composer
    }

    async fn lookup(&self, reference: &PackageReference) -> RegistryCheck {
        if !reference.identifier.contains('/') {
            debug!("Composer package without vendor: {}", reference.identifier);
        }
        let url = self.package_url(&reference.identifier);
        self.client.check(&reference.identifier, &url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpConfig;

    #[test]
    fn test_package_url() {
        let client = Arc::new(RegistryClient::new(&HttpConfig::default()).unwrap());
        assert_eq!(
            PackagistResolver::new(client).package_url("monolog/monolog"),
            "https://packagist.org/packages/monolog/monolog.json"
        );
    }
}
