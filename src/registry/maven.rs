//! Maven Central resolver.
//!
//! Availability is judged on the group directory: a group that Maven Central
//! does not know about can be claimed by anyone.

use crate::parser::maven::split_coordinates;
use crate::registry::client::RegistryClient;
use crate::registry::PackageResolver;
use crate::types::{Ecosystem, PackageReference, RegistryCheck};
use async_trait::async_trait;
use std::sync::Arc;

pub struct MavenResolver {
    client: Arc<RegistryClient>,
}

impl MavenResolver {
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }

    fn group_url(&self, group: &str) -> String {
        format!(
            "{}/{}/",
            self.client.endpoints().maven.trim_end_matches('/'),
            group.replace('.', "/")
        )
    }
}

#[async_trait]
impl PackageResolver for MavenResolver {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    async fn lookup(&self, reference: &PackageReference) -> RegistryCheck {
        let (group, _artifact) = split_coordinates(&reference.identifier);
        let url = self.group_url(group);
        self.client.check(&reference.identifier, &url).await
    }
}
