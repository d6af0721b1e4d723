//! RubyGems resolver.

use crate::registry::client::RegistryClient;
use crate::registry::PackageResolver;
use crate::types::{Ecosystem, PackageReference, RegistryCheck};
use async_trait::async_trait;
use std::sync::Arc;

pub struct RubygemsResolver {
    client: Arc<RegistryClient>,
}

impl RubygemsResolver {
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }

    fn gem_url(&self, name: &str) -> String {
        format!(
            "{}/api/v1/gems/{}.json",
            self.client.endpoints().rubygems.trim_end_matches('/'),
            urlencoding::encode(name)
        )
    }
}

#[async_trait]
impl PackageResolver for RubygemsResolver {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Rubygems
    }

    async fn lookup(&self, reference: &PackageReference) -> RegistryCheck {
        let url = self.gem_url(&reference.identifier);
        self.client.check(&reference.identifier, &url).await
    }
}
