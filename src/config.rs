//! Configuration handling for the scanner.
//!
//! Values come from three layers, highest first: command-line flags (with
//! environment fallbacks), an optional TOML file, built-in defaults.

use crate::types::{ConfusedError, Ecosystem, HttpConfig, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_WORKERS: usize = 10;
const DEFAULT_MAX_REPOS: usize = 50;
pub const DEFAULT_CONFIG_FILE: &str = "confused.toml";

/// Written by `config generate`. Every key is optional.
pub const SAMPLE_CONFIG: &str = r#"# confused configuration file.
# Command-line flags take precedence over values set here.

# Concurrent workers
workers = 10
# HTTP request timeout in seconds
timeout = 30
# Registry lookups per second
rate_limit = 100
user_agent = "Confused-DepConfusion-Scanner/2.0"

# Namespace globs never reported as vulnerable, e.g. "@acme/*" or "com.acme:*"
safe_spaces = []

# Package managers scanned when a command names none
languages = ["npm", "pip", "composer", "mvn", "rubygems"]
# Scan every branch (github) or common directories (web)
deep_scan = false
# Repositories taken from an organization listing
max_repos = 50

# Prefer CONFUSED_GITHUB_TOKEN or GITHUB_TOKEN over storing a token here.
# github_token = ""
"#;

/// Dependency confusion scanner for manifests, GitHub repositories and web targets.
#[derive(Parser, Debug, Clone)]
#[command(name = "confused")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Number of concurrent workers [default: 10]
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// HTTP request timeout in seconds [default: 30]
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Comma-separated namespace globs never reported as vulnerable (e.g. "@acme/*")
    #[arg(long, global = true, value_delimiter = ',')]
    pub safe_spaces: Vec<String>,

    /// GitHub API token (falls back to GITHUB_TOKEN)
    #[arg(long, env = "CONFUSED_GITHUB_TOKEN", global = true, hide_env_values = true)]
    pub github_token: Option<String>,

    /// Custom User-Agent string
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Registry lookups per second [default: 100]
    #[arg(long, global = true)]
    pub rate_limit: Option<u32>,

    /// Output results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Write JSON results to this file
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Configuration file (defaults to ./confused.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Scan a local dependency manifest
    Scan(FileArgs),
    /// Scan GitHub repositories
    #[command(subcommand)]
    Github(GithubCommand),
    /// Probe web targets for exposed dependency manifests
    Web(WebArgs),
    /// Generate or check a configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Write a sample configuration file
    Generate(GenerateArgs),
    /// Check the configuration file (--config, else ./confused.toml)
    Validate,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Destination file (falls back to --output, then confused.toml)
    pub file: Option<PathBuf>,

    /// Replace an existing file
    #[arg(long)]
    pub force: bool,
}

impl GenerateArgs {
    pub fn destination(&self, output: Option<&Path>) -> PathBuf {
        self.file
            .clone()
            .or_else(|| output.map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}

#[derive(Args, Debug, Clone)]
pub struct FileArgs {
    /// Manifest file to scan
    pub file: PathBuf,

    /// Package manager of the file (npm, pip, composer, mvn, rubygems)
    #[arg(short, long, default_value = "npm")]
    pub language: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum GithubCommand {
    /// Scan a single repository (owner/repo)
    Repo(GithubRepoArgs),
    /// Scan the public repositories of an organization
    Org(GithubOrgArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GithubRepoArgs {
    /// Repository as owner/repo
    pub repo: String,

    /// Comma-separated package managers to look for [default: all]
    #[arg(short, long, value_delimiter = ',')]
    pub languages: Vec<String>,

    /// Scan every branch, not only the default one
    #[arg(long)]
    pub deep: bool,
}

#[derive(Args, Debug, Clone)]
pub struct GithubOrgArgs {
    /// Organization name
    pub org: String,

    /// Comma-separated package managers to look for [default: all]
    #[arg(short, long, value_delimiter = ',')]
    pub languages: Vec<String>,

    /// Scan every branch of every repository
    #[arg(long)]
    pub deep: bool,

    /// Maximum number of repositories to scan [default: 50]
    #[arg(long)]
    pub max_repos: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct WebArgs {
    /// Target URL(s) to probe
    #[arg(required_unless_present = "target_file")]
    pub targets: Vec<String>,

    /// File containing targets (one per line, # for comments)
    #[arg(short = 'f', long)]
    pub target_file: Option<PathBuf>,

    /// Comma-separated package managers to look for [default: all]
    #[arg(short, long, value_delimiter = ',')]
    pub languages: Vec<String>,

    /// Also probe common directories one level deep
    #[arg(long)]
    pub deep: bool,

    /// Comma-separated extra paths to probe
    #[arg(long, value_delimiter = ',')]
    pub wordlist: Vec<String>,

    /// Directory depth for deep probing; 0 disables it
    #[arg(long, default_value_t = 3)]
    pub max_depth: usize,
}

impl WebArgs {
    /// Positional targets plus those read from the target file.
    pub fn load_targets(&self) -> Result<Vec<String>> {
        let mut targets: Vec<String> = self
            .targets
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if let Some(ref file_path) = self.target_file {
            let content = std::fs::read_to_string(file_path)?;
            for line in content.lines() {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    targets.push(trimmed.to_string());
                }
            }
        }

        Ok(targets)
    }
}

/// Optional TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub workers: Option<usize>,
    pub timeout: Option<u64>,
    pub safe_spaces: Option<Vec<String>>,
    pub github_token: Option<String>,
    pub user_agent: Option<String>,
    pub rate_limit: Option<u32>,
    pub max_repos: Option<usize>,
    pub languages: Option<Vec<String>>,
    pub deep_scan: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfusedError::ConfigError(format!("unable to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ConfusedError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Write [`SAMPLE_CONFIG`] to `path`. An existing file is kept unless `force`.
    pub fn write_sample(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(ConfusedError::ConfigError(format!(
                "{} already exists, use --force to overwrite",
                path.display()
            )));
        }
        std::fs::write(path, SAMPLE_CONFIG)?;
        Ok(())
    }

    /// Load the explicit file, else `./confused.toml` when it exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Effective settings after merging every layer.
#[derive(Debug, Clone)]
pub struct Settings {
    pub workers: usize,
    pub http: HttpConfig,
    pub safe_spaces: Vec<String>,
    pub github_token: Option<String>,
    pub max_repos: usize,
    /// Languages from the config file, used when a command names none.
    pub languages: Option<Vec<String>>,
    pub deep_scan: bool,
}

impl Settings {
    /// Merge CLI flags over the file config over defaults, then validate.
    pub fn resolve(cli: &Config, file: FileConfig) -> Result<Self> {
        let defaults = HttpConfig::default();

        let workers = cli.workers.or(file.workers).unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(ConfusedError::ConfigError("workers must be greater than 0".into()));
        }

        let timeout_secs = cli.timeout.or(file.timeout).unwrap_or(defaults.timeout_secs);
        if timeout_secs == 0 {
            return Err(ConfusedError::ConfigError("timeout must be greater than 0".into()));
        }

        let safe_spaces = if cli.safe_spaces.is_empty() {
            file.safe_spaces.unwrap_or_default()
        } else {
            cli.safe_spaces.clone()
        };

        let github_token = cli
            .github_token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .or(file.github_token)
            .filter(|t| !t.trim().is_empty());

        if let Some(ref languages) = file.languages {
            parse_languages(languages)?;
        }

        Ok(Self {
            workers,
            http: HttpConfig {
                timeout_secs,
                user_agent: cli
                    .user_agent
                    .clone()
                    .or(file.user_agent)
                    .unwrap_or(defaults.user_agent),
                rate_limit: cli.rate_limit.or(file.rate_limit).unwrap_or(defaults.rate_limit),
            },
            safe_spaces,
            github_token,
            max_repos: file.max_repos.unwrap_or(DEFAULT_MAX_REPOS),
            languages: file.languages,
            deep_scan: file.deep_scan.unwrap_or(false),
        })
    }

    /// Ecosystems for a command: its own list, else the file's, else all.
    pub fn ecosystems(&self, requested: &[String]) -> Result<Vec<Ecosystem>> {
        if !requested.is_empty() {
            return parse_languages(requested);
        }
        match self.languages {
            Some(ref languages) => parse_languages(languages),
            None => Ok(Ecosystem::ALL.to_vec()),
        }
    }
}

/// Load and resolve the file `--config` names, else `./confused.toml`.
/// Unlike [`FileConfig::discover`], a missing file is an error.
pub fn validate_file(cli: &Config) -> Result<(PathBuf, Settings)> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if !path.is_file() {
        return Err(ConfusedError::ConfigError(format!(
            "configuration file {} not found",
            path.display()
        )));
    }
    let settings = Settings::resolve(cli, FileConfig::load(&path)?)?;
    Ok((path, settings))
}

/// Parse language names; an empty list or `all` selects every ecosystem.
pub fn parse_languages(names: &[String]) -> Result<Vec<Ecosystem>> {
    let names: Vec<&str> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() || names.iter().any(|n| n.eq_ignore_ascii_case("all")) {
        return Ok(Ecosystem::ALL.to_vec());
    }

    let mut ecosystems = Vec::new();
    for name in names {
        let ecosystem: Ecosystem = name.parse()?;
        if !ecosystems.contains(&ecosystem) {
            ecosystems.push(ecosystem);
        }
    }
    Ok(ecosystems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["confused", "scan", "package.json"]);
        let settings = Settings::resolve(&cli, FileConfig::default()).unwrap();
        assert_eq!(settings.workers, 10);
        assert_eq!(settings.http.timeout_secs, 30);
        assert_eq!(settings.http.rate_limit, 100);
        assert_eq!(settings.http.user_agent, "Confused-DepConfusion-Scanner/2.0");
        assert_eq!(settings.max_repos, 50);
        match cli.command {
            Commands::Scan(args) => assert_eq!(args.language, "npm"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_overrides_file() {
        let cli = parse(&[
            "confused",
            "-w",
            "4",
            "--safe-spaces",
            "@acme/*,com.acme:*",
            "web",
            "example.com",
        ]);
        let file = FileConfig {
            workers: Some(20),
            timeout: Some(5),
            safe_spaces: Some(vec!["@other/*".into()]),
            ..Default::default()
        };
        let settings = Settings::resolve(&cli, file).unwrap();
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.http.timeout_secs, 5);
        assert_eq!(settings.safe_spaces, vec!["@acme/*", "com.acme:*"]);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cli = parse(&["confused", "--workers", "0", "scan", "pom.xml", "-l", "mvn"]);
        assert!(matches!(
            Settings::resolve(&cli, FileConfig::default()),
            Err(ConfusedError::ConfigError(_))
        ));
    }

    #[test]
    fn test_github_subcommands() {
        let cli = parse(&[
            "confused",
            "github",
            "org",
            "acme",
            "--languages",
            "npm,pip",
            "--deep",
            "--max-repos",
            "5",
        ]);
        match cli.command {
            Commands::Github(GithubCommand::Org(args)) => {
                assert_eq!(args.org, "acme");
                assert_eq!(args.languages, vec!["npm", "pip"]);
                assert!(args.deep);
                assert_eq!(args.max_repos, Some(5));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_web_requires_target() {
        assert!(Config::try_parse_from(["confused", "web"]).is_err());
        assert!(Config::try_parse_from(["confused", "web", "-f", "targets.txt"]).is_ok());
    }

    #[test]
    fn test_parse_languages() {
        assert_eq!(parse_languages(&[]).unwrap().len(), 5);
        assert_eq!(parse_languages(&["all".into()]).unwrap().len(), 5);
        assert_eq!(
            parse_languages(&["mvn".into(), "maven".into(), "pip".into()]).unwrap(),
            vec![Ecosystem::Maven, Ecosystem::Pip]
        );
        assert!(matches!(
            parse_languages(&["cargo".into()]),
            Err(ConfusedError::UnsupportedEcosystem(_))
        ));
    }

    #[test]
    fn test_file_config_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "workers = 3\nsafe_spaces = [\"@acme/*\"]\nlanguages = [\"npm\"]\ndeep_scan = true\nmax_repos = 7"
        )
        .unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.max_repos, Some(7));

        let cli = parse(&["confused", "github", "repo", "acme/app"]);
        let settings = Settings::resolve(&cli, config).unwrap();
        assert_eq!(settings.ecosystems(&[]).unwrap(), vec![Ecosystem::Npm]);
        assert_eq!(
            settings.ecosystems(&["pip".to_string()]).unwrap(),
            vec![Ecosystem::Pip]
        );
        assert!(settings.deep_scan);
    }

    #[test]
    fn test_malformed_file_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = \"many\"\nunknown_key = 1").unwrap();
        assert!(matches!(
            FileConfig::load(file.path()),
            Err(ConfusedError::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_targets() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# staging hosts\nexample.com\n\n  https://api.example.com  \n#old.example.com").unwrap();
        let args = WebArgs {
            targets: vec!["first.example.com".into()],
            target_file: Some(file.path().to_path_buf()),
            languages: Vec::new(),
            deep: false,
            wordlist: Vec::new(),
            max_depth: 3,
        };
        assert_eq!(
            args.load_targets().unwrap(),
            vec!["first.example.com", "example.com", "https://api.example.com"]
        );
    }

    #[test]
    fn test_config_subcommands() {
        let cli = parse(&["confused", "config", "generate", "custom.toml", "--force"]);
        match cli.command {
            Commands::Config(ConfigCommand::Generate(ref args)) => {
                assert_eq!(args.destination(None), PathBuf::from("custom.toml"));
                assert!(args.force);
            }
            ref other => panic!("unexpected command {:?}", other),
        }

        let cli = parse(&["confused", "-o", "out.toml", "config", "generate"]);
        match cli.command {
            Commands::Config(ConfigCommand::Generate(ref args)) => {
                assert_eq!(
                    args.destination(cli.output.as_deref()),
                    PathBuf::from("out.toml")
                );
                assert_eq!(args.destination(None), PathBuf::from(DEFAULT_CONFIG_FILE));
            }
            ref other => panic!("unexpected command {:?}", other),
        }

        let cli = parse(&["confused", "config", "validate", "--config", "site.toml"]);
        assert!(matches!(cli.command, Commands::Config(ConfigCommand::Validate)));
        assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
    }

    #[test]
    fn test_generated_sample_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confused.toml");
        FileConfig::write_sample(&path, false).unwrap();

        let config_arg = path.display().to_string();
        let cli = parse(&["confused", "--config", &config_arg, "config", "validate"]);
        let (validated, settings) = validate_file(&cli).unwrap();
        assert_eq!(validated, path);
        assert_eq!(settings.workers, 10);
        assert_eq!(settings.max_repos, 50);
        assert_eq!(settings.ecosystems(&[]).unwrap().len(), 5);
    }

    #[test]
    fn test_generate_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confused.toml");
        std::fs::write(&path, "workers = 2\n").unwrap();

        assert!(matches!(
            FileConfig::write_sample(&path, false),
            Err(ConfusedError::ConfigError(_))
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "workers = 2\n");

        FileConfig::write_sample(&path, true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE_CONFIG);
    }

    #[test]
    fn test_validate_rejects_bad_or_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml").display().to_string();
        let cli = parse(&["confused", "--config", &missing, "config", "validate"]);
        assert!(matches!(validate_file(&cli), Err(ConfusedError::ConfigError(_))));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "workers = 0\n").unwrap();
        let bad_arg = bad.display().to_string();
        let cli = parse(&["confused", "--config", &bad_arg, "config", "validate"]);
        assert!(matches!(validate_file(&cli), Err(ConfusedError::ConfigError(_))));

        std::fs::write(&bad, "languages = [\"cargo\"]\n").unwrap();
        assert!(matches!(
            validate_file(&cli),
            Err(ConfusedError::UnsupportedEcosystem(_))
        ));
    }
}
