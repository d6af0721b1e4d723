//! Manifest parsers.
//!
//! One module per ecosystem turns raw manifest bytes into an ordered list of
//! [`PackageReference`]s. Parsers never fail: content they cannot make sense
//! of yields an empty list plus a diagnostic, so a single bad manifest never
//! aborts a scan. Duplicate references are kept as written.
//!
//! [`PackageReference`]: crate::types::PackageReference

pub mod composer;
pub mod maven;
pub mod npm;
pub mod pip;
pub mod rubygems;

use crate::types::{Ecosystem, ManifestSource, ParsedManifest};
use std::borrow::Cow;

/// Parse a manifest with the parser of its ecosystem.
pub fn parse_manifest(source: &ManifestSource) -> ParsedManifest {
    parse_for(source.ecosystem, &source.file_name, &source.content)
}

/// Parse raw content for the given ecosystem, dispatching on the file name.
pub fn parse_for(ecosystem: Ecosystem, file_name: &str, content: &[u8]) -> ParsedManifest {
    match ecosystem {
        Ecosystem::Npm => npm::parse(file_name, content),
        Ecosystem::Pip => pip::parse(file_name, content),
        Ecosystem::Composer => composer::parse(file_name, content),
        Ecosystem::Maven => maven::parse(content),
        Ecosystem::Rubygems => rubygems::parse(file_name, content),
    }
}

/// Decode manifest bytes, replacing invalid UTF-8 and a leading BOM.
pub(crate) fn decode(content: &[u8]) -> Cow<'_, str> {
    let text = String::from_utf8_lossy(content);
    match text {
        Cow::Borrowed(s) => Cow::Borrowed(s.trim_start_matches('\u{feff}')),
        Cow::Owned(s) => Cow::Owned(s.trim_start_matches('\u{feff}').to_string()),
    }
}

/// Base filename of a `/`-separated path.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("a/b/package.json"), "package.json");
        assert_eq!(base_name("pom.xml"), "pom.xml");
    }

    #[test]
    fn test_decode_strips_bom() {
        let bytes = b"\xEF\xBB\xBF{\"a\":1}";
        assert_eq!(decode(bytes), "{\"a\":1}");
    }

    #[test]
    fn test_dispatch_by_ecosystem() {
        let parsed = parse_for(Ecosystem::Pip, "requirements.txt", b"requests==2.31.0\n");
        assert_eq!(parsed.packages.len(), 1);
        assert_eq!(parsed.packages[0].identifier, "requests");
    }
}
