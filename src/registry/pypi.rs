//! PyPI resolver.

use crate::registry::client::RegistryClient;
use crate::registry::PackageResolver;
use crate::types::{Ecosystem, PackageReference, RegistryCheck};
use async_trait::async_trait;
use std::sync::Arc;

pub struct PypiResolver {
    client: Arc<RegistryClient>,
}

impl PypiResolver {
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }

    fn project_url(&self, name: &str) -> String {
        format!(
            "{}/project/{}/",
            self.client.endpoints().pypi.trim_end_matches('/'),
            urlencoding::encode(name)
        )
    }
}

#[async_trait]
impl PackageResolver for PypiResolver {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pip
    }

    async fn lookup(&self, reference: &PackageReference) -> RegistryCheck {
        let url = self.project_url(&reference.identifier);
        self.client.check(&reference.identifier, &url).await
    }
}
