//! npm registry resolver.

use crate::registry::client::{Lookup, RegistryClient};
use crate::registry::PackageResolver;
use crate::types::{Ecosystem, PackageReference, RegistryCheck};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The parts of the npm package document the resolver reads.
#[derive(Debug, Deserialize)]
struct NpmPackageInfo {
    #[serde(default)]
    time: Option<NpmTime>,
}

#[derive(Debug, Deserialize)]
struct NpmTime {
    /// Present once every published version has been unpublished.
    #[serde(default)]
    unpublished: Option<serde_json::Value>,
}

impl NpmPackageInfo {
    fn is_unpublished(&self) -> bool {
        self.time
            .as_ref()
            .is_some_and(|t| t.unpublished.as_ref().is_some_and(|u| !u.is_null()))
    }
}

pub struct NpmResolver {
    client: Arc<RegistryClient>,
}

impl NpmResolver {
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }

    fn package_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.client.endpoints().npm.trim_end_matches('/'),
            name.replace('/', "%2F")
        )
    }
}

#[async_trait]
impl PackageResolver for NpmResolver {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    async fn lookup(&self, reference: &PackageReference) -> RegistryCheck {
        let name = reference.identifier.as_str();
        let url = self.package_url(name);

        let response = match self.client.get(name, &url).await {
            Lookup::Found(response) => response,
            Lookup::Settled(check) => return check,
        };

        match response.json::<NpmPackageInfo>().await {
            Ok(info) if info.is_unpublished() => {
                warn!(
                    "Package {} was found, but all its versions are unpublished",
                    name
                );
                RegistryCheck::Unpublished
            }
            Ok(_) => {
                debug!("Package exists: {}", name);
                RegistryCheck::Available
            }
            Err(e) => {
                trace!("Failed to parse npm response for {}: {}", name, e);
                RegistryCheck::Available
            }
        }
    }
}
