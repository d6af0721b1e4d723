//! confused - dependency confusion scanner.
//!
//! Finds dependency manifests that reference package names missing from
//! their public registry, where an attacker could publish the name and
//! have it installed in place of the private package:
//! - Local manifest files
//! - GitHub repositories and organizations (optionally every branch)
//! - Web endpoints exposing manifests at well-known paths
//!
//! Supported ecosystems: npm, pip, composer, maven and rubygems.
//!
//! # Example
//!
//! ```no_run
//! use confused::{Ecosystem, HttpConfig, SafeSpaces, Scanner};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() {
//!     let safe = SafeSpaces::new(&["@mycompany/*".to_string()]);
//!     let scanner = Scanner::from_config(&HttpConfig::default(), safe, 10).unwrap();
//!     let result = scanner
//!         .scan_file(Path::new("package.json"), Ecosystem::Npm)
//!         .await
//!         .unwrap();
//!     println!("{} package(s) not in the public registry", result.vulnerable().len());
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod notify;
pub mod parser;
pub mod pool;
pub mod registry;
pub mod safe_space;
pub mod scanner;
pub mod types;

pub use config::{Commands, Config, FileConfig, Settings};
pub use discovery::{GithubOptions, GithubScanner, WebOptions, WebScanner};
pub use pool::WorkerPool;
pub use registry::{resolver_by_name, resolver_for, PackageResolver, RegistryClient};
pub use safe_space::SafeSpaces;
pub use scanner::Scanner;
pub use types::{
    ConfusedError, Ecosystem, HttpConfig, ManifestSource, OriginKind, PackageReference,
    ParsedManifest, RegistryCheck, Result, ScanKind, ScanReport, ScanResult,
};
