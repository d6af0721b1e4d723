//! Manifest discovery on remote targets.
//!
//! - GitHub repositories and organizations (REST API, optionally every branch)
//! - Web endpoints (well-known manifest paths, optionally one directory deep)

pub mod github;
pub mod web;

pub use github::{GithubOptions, GithubScanner};
pub use web::{WebOptions, WebScanner};
