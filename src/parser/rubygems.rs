//! Bundler manifests: `Gemfile`/`gems.rb` and `Gemfile.lock`/`gems.locked`.

use super::decode;
use crate::types::{OriginKind, PackageReference, ParsedManifest};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

static GEM_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^gem\s*\(?\s*["']([^"']+)["']\s*(.*)$"#).unwrap());

static GIT_OPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[\s,(])(?:git|github|:git|:github)\s*(?::|=>)").unwrap());

static PATH_OPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[\s,(])(?:path|:path)\s*(?::|=>)").unwrap());

static BLOCK_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bdo(\s*\|[^|]*\|)?$").unwrap());

/// Ruby constructs closed by `end` that do not use `do`.
static KEYWORD_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:if|unless|case|while|until|begin|def|class|module)\b").unwrap()
});

static LOCK_SPEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^    ([^\s(]+)(?: \(([^)]*)\))?$").unwrap());

/// Parse a Bundler manifest, choosing the format from the file name.
pub fn parse(file_name: &str, content: &[u8]) -> ParsedManifest {
    match file_name {
        "Gemfile.lock" | "gems.locked" => parse_lockfile(content),
        _ => parse_gemfile(content),
    }
}

fn parse_gemfile(content: &[u8]) -> ParsedManifest {
    let text = decode(content);
    let mut parsed = ParsedManifest::default();
    // Origin imposed by each open `do ... end` block; `None` inherits.
    let mut blocks: Vec<Option<OriginKind>> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line == "end" {
            if blocks.pop().is_none() {
                parsed.diagnostics.push("unbalanced `end` in Gemfile".to_string());
            }
            continue;
        }

        if let Some(caps) = GEM_LINE.captures(line) {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let origin = option_origin(rest)
                .or_else(|| blocks.iter().rev().find_map(|b| *b))
                .unwrap_or(OriginKind::Registry);
            parsed
                .packages
                .push(PackageReference::new(name, constraints(rest), origin));
            if BLOCK_OPEN.is_match(line) {
                blocks.push(None);
            }
            continue;
        }

        if BLOCK_OPEN.is_match(line) {
            blocks.push(block_origin(line));
        } else if KEYWORD_OPEN.is_match(line) {
            blocks.push(None);
        } else {
            trace!("Ignoring Gemfile line: {}", line);
        }
    }

    if !blocks.is_empty() {
        parsed
            .diagnostics
            .push(format!("{} unclosed block(s) in Gemfile", blocks.len()));
    }
    parsed
}

fn block_origin(line: &str) -> Option<OriginKind> {
    let keyword = line
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default();
    match keyword {
        "git" | "github" => Some(OriginKind::GitRef),
        "path" => Some(OriginKind::LocalPath),
        _ => None,
    }
}

fn option_origin(rest: &str) -> Option<OriginKind> {
    if GIT_OPTION.is_match(rest) {
        Some(OriginKind::GitRef)
    } else if PATH_OPTION.is_match(rest) {
        Some(OriginKind::LocalPath)
    } else {
        None
    }
}

/// Leading quoted arguments after the gem name, e.g. `"~> 7.0", ">= 7.0.4"`.
fn constraints(rest: &str) -> String {
    let mut found = Vec::new();
    for arg in rest.trim_start_matches(',').split(',') {
        let arg = arg.trim().trim_end_matches(')').trim();
        let quoted = arg.len() >= 2
            && ((arg.starts_with('"') && arg.ends_with('"'))
                || (arg.starts_with('\'') && arg.ends_with('\'')));
        if !quoted {
            break;
        }
        found.push(&arg[1..arg.len() - 1]);
    }
    found.join(", ")
}

fn parse_lockfile(content: &[u8]) -> ParsedManifest {
    let text = decode(content);
    let mut parsed = ParsedManifest::default();
    let mut section: Option<OriginKind> = None;
    let mut in_specs = false;

    for line in text.lines() {
        if !line.starts_with(' ') {
            section = match line.trim_end() {
                "GEM" => Some(OriginKind::Registry),
                "GIT" => Some(OriginKind::GitRef),
                "PATH" => Some(OriginKind::LocalPath),
                _ => None,
            };
            in_specs = false;
            continue;
        }
        let Some(origin) = section else {
            continue;
        };
        if line.trim_end() == "  specs:" {
            in_specs = true;
            continue;
        }
        if !in_specs {
            continue;
        }
        if let Some(caps) = LOCK_SPEC.captures(line.trim_end()) {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let version = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            parsed
                .packages
                .push(PackageReference::new(name, version, origin));
        }
    }

    if parsed.packages.is_empty() && !text.trim().is_empty() && !text.contains("specs:") {
        parsed
            .diagnostics
            .push("no specs section found in lockfile".to_string());
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(parsed: &ParsedManifest) -> Vec<&str> {
        parsed.packages.iter().map(|p| p.identifier.as_str()).collect()
    }

    const GEMFILE: &str = r#"source "https://rubygems.org"

ruby "3.2.2"

gem "rails", "~> 7.0", ">= 7.0.4"
gem 'pg'
gem "acme-auth", git: "https://github.com/acme/auth.git"
gem "acme-ui", :github => "acme/ui"
gem "shared", path: "../shared"
gem("puma", "~> 6.0", require: false)

group :development, :test do
  gem "rspec-rails"
end

git "https://github.com/acme/tools.git" do
  gem "acme-lint"
  gem "acme-fmt"
end

path "vendor/engines" do
  gem "billing-engine"
end
"#;

    #[test]
    fn test_gemfile_entries_and_origins() {
        let parsed = parse("Gemfile", GEMFILE.as_bytes());
        assert_eq!(
            names(&parsed),
            vec![
                "rails",
                "pg",
                "acme-auth",
                "acme-ui",
                "shared",
                "puma",
                "rspec-rails",
                "acme-lint",
                "acme-fmt",
                "billing-engine",
            ]
        );
        let origins: Vec<OriginKind> = parsed.packages.iter().map(|p| p.origin).collect();
        assert_eq!(
            origins,
            vec![
                OriginKind::Registry,
                OriginKind::Registry,
                OriginKind::GitRef,
                OriginKind::GitRef,
                OriginKind::LocalPath,
                OriginKind::Registry,
                OriginKind::Registry,
                OriginKind::GitRef,
                OriginKind::GitRef,
                OriginKind::LocalPath,
            ]
        );
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn test_gemfile_constraints() {
        let parsed = parse("gems.rb", GEMFILE.as_bytes());
        assert_eq!(parsed.packages[0].version_spec, "~> 7.0, >= 7.0.4");
        assert_eq!(parsed.packages[1].version_spec, "");
        assert_eq!(parsed.packages[5].version_spec, "~> 6.0");
    }

    #[test]
    fn test_gemfile_unclosed_block() {
        let parsed = parse("Gemfile", b"group :test do\n  gem \"rspec\"\n");
        assert_eq!(names(&parsed), vec!["rspec"]);
        assert_eq!(parsed.diagnostics.len(), 1);
    }

    #[test]
    fn test_conditional_inside_git_block_keeps_origin() {
        let gemfile = br#"git "https://github.com/acme/tools.git" do
  if ENV["CI"]
    gem "acme-ci"
  else
    gem "acme-local"
  end
  gem "acme-lint"
end
gem "rake" if RUBY_VERSION >= "3.0"
case RUBY_PLATFORM
when /darwin/
  gem "acme-mac"
end
"#;
        let parsed = parse("Gemfile", gemfile);
        assert!(parsed.diagnostics.is_empty());
        let origins: Vec<(&str, OriginKind)> = parsed
            .packages
            .iter()
            .map(|p| (p.identifier.as_str(), p.origin))
            .collect();
        assert_eq!(
            origins,
            vec![
                ("acme-ci", OriginKind::GitRef),
                ("acme-local", OriginKind::GitRef),
                ("acme-lint", OriginKind::GitRef),
                ("rake", OriginKind::Registry),
                ("acme-mac", OriginKind::Registry),
            ]
        );
    }

    const LOCKFILE: &str = "GIT
  remote: https://github.com/acme/auth.git
  revision: 0123456789abcdef
  specs:
    acme-auth (1.2.0)
      jwt (>= 2.0)

PATH
  remote: ../shared
  specs:
    shared (0.1.0)

GEM
  remote: https://rubygems.org/
  specs:
    jwt (2.7.1)
    nokogiri (1.15.4-x86_64-linux)
      racc (~> 1.4)
    racc (1.7.1)

PLATFORMS
  x86_64-linux

DEPENDENCIES
  acme-auth!
  shared!

BUNDLED WITH
   2.4.19
";

    #[test]
    fn test_lockfile_sections() {
        let parsed = parse("Gemfile.lock", LOCKFILE.as_bytes());
        assert_eq!(
            names(&parsed),
            vec!["acme-auth", "shared", "jwt", "nokogiri", "racc"]
        );
        assert_eq!(parsed.packages[0].origin, OriginKind::GitRef);
        assert_eq!(parsed.packages[1].origin, OriginKind::LocalPath);
        assert_eq!(parsed.packages[2].origin, OriginKind::Registry);
        assert_eq!(parsed.packages[3].version_spec, "1.15.4-x86_64-linux");
    }

    #[test]
    fn test_lockfile_garbage() {
        let parsed = parse("gems.locked", b"not a lockfile");
        assert!(parsed.packages.is_empty());
        assert_eq!(parsed.diagnostics.len(), 1);
    }
}
