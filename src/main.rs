//! confused - dependency confusion scanner.
//!
//! CLI entry point.

use clap::Parser;
use confused::config::{validate_file, ConfigCommand, GithubCommand, Settings};
use confused::notify::{json, ConsoleOutput};
use confused::{
    Commands, Config, ConfusedError, Ecosystem, FileConfig, GithubOptions, GithubScanner, Result,
    SafeSpaces, ScanReport, ScanResult, Scanner, WebOptions, WebScanner,
};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit status for configuration and usage errors.
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Set up logging
    let filter = if config.verbose {
        EnvFilter::new("confused=debug,info")
    } else {
        EnvFilter::new("confused=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Config(command) = &config.command {
        return match run_config(&config, command) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{}", e);
                ExitCode::from(EXIT_USAGE)
            }
        };
    }

    let settings = match FileConfig::discover(config.config.as_deref())
        .and_then(|file| Settings::resolve(&config, file))
    {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let console = ConsoleOutput::new(config.verbose, config.json);
    console.print_banner();

    let results = match run(&config, &settings, &console).await {
        Ok(results) => results,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let report = ScanReport::new(results);
    for result in &report.results {
        console.print_result(result);
    }
    console.print_summary(&report);

    if config.json || config.output.is_some() {
        if let Err(e) = json::write_report(&report, config.output.as_deref()) {
            error!("Failed to write results: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    }

    if report.any_vulnerable() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(config: &Config, settings: &Settings, console: &ConsoleOutput) -> Result<Vec<ScanResult>> {
    let scanner = Scanner::from_config(
        &settings.http,
        SafeSpaces::new(&settings.safe_spaces),
        settings.workers,
    )?;

    match &config.command {
        Commands::Scan(args) => {
            let ecosystem: Ecosystem = args.language.parse()?;
            console.print_scan_start(&args.file.display().to_string());
            Ok(vec![scanner.scan_file(&args.file, ecosystem).await?])
        }
        Commands::Github(command) => {
            let github =
                GithubScanner::new(scanner, &settings.http, settings.github_token.as_deref())?;
            match command {
                GithubCommand::Repo(args) => {
                    let options = GithubOptions {
                        ecosystems: settings.ecosystems(&args.languages)?,
                        deep: args.deep || settings.deep_scan,
                        max_repos: settings.max_repos,
                    };
                    console.print_scan_start(&args.repo);
                    github.scan_repository(&args.repo, &options).await
                }
                GithubCommand::Org(args) => {
                    let options = GithubOptions {
                        ecosystems: settings.ecosystems(&args.languages)?,
                        deep: args.deep || settings.deep_scan,
                        max_repos: args.max_repos.unwrap_or(settings.max_repos),
                    };
                    console.print_scan_start(&args.org);
                    github.scan_organization(&args.org, &options).await
                }
            }
        }
        Commands::Web(args) => {
            let targets = args.load_targets()?;
            if targets.is_empty() {
                return Err(ConfusedError::ConfigError(
                    "no targets specified, use positional arguments or -f <file>".into(),
                ));
            }
            let options = WebOptions {
                ecosystems: settings.ecosystems(&args.languages)?,
                deep: args.deep || settings.deep_scan,
                max_depth: args.max_depth,
                wordlist: args.wordlist.clone(),
            };
            console.print_info(&format!("Probing {} web target(s)", targets.len()));
            let web = WebScanner::new(scanner, &settings.http)?;
            Ok(web.scan_targets(targets, &options).await)
        }
        // Handled before settings are resolved.
        Commands::Config(_) => Ok(Vec::new()),
    }
}

fn run_config(config: &Config, command: &ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Generate(args) => {
            let path = args.destination(config.output.as_deref());
            FileConfig::write_sample(&path, args.force)?;
            info!("Sample configuration written to {}", path.display());
        }
        ConfigCommand::Validate => {
            let (path, settings) = validate_file(config)?;
            info!(
                "Configuration {} is valid: {} workers, {}s timeout, {} safe space(s)",
                path.display(),
                settings.workers,
                settings.http.timeout_secs,
                settings.safe_spaces.len()
            );
        }
    }
    Ok(())
}
