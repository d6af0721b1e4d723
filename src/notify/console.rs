//! Colored console output for scan results.

use crate::types::{ScanKind, ScanReport, ScanResult};
use colored::Colorize;

/// Console output handler with colors and formatting.
pub struct ConsoleOutput {
    verbose: bool,
    json_mode: bool,
}

impl ConsoleOutput {
    pub fn new(verbose: bool, json_mode: bool) -> Self {
        Self { verbose, json_mode }
    }

    pub fn print_banner(&self) {
        if self.json_mode {
            return;
        }
        println!();
        println!("{}", "confused - dependency confusion scanner".bright_cyan().bold());
        println!();
    }

    /// Print scan start message.
    pub fn print_scan_start(&self, target: &str) {
        if self.json_mode {
            return;
        }

        println!("{} Scanning: {}", "[*]".bright_blue(), target.bright_white());
    }

    /// Print info message.
    pub fn print_info(&self, message: &str) {
        if self.json_mode {
            return;
        }

        println!("{} {}", "[*]".bright_blue(), message);
    }

    /// Print one result: vulnerable identifiers always, safe ones in verbose mode.
    pub fn print_result(&self, result: &ScanResult) {
        if self.json_mode {
            return;
        }

        let marker = if result.is_vulnerable() {
            "[!]".red().bold()
        } else {
            "[+]".green()
        };
        println!();
        println!(
            "{} {} [{} / {}]",
            marker,
            result.target().bright_white().bold(),
            format_kind(result.kind()),
            result.ecosystem()
        );

        for name in result.vulnerable() {
            println!("    |-- {} {}", "NOT IN PUBLIC REGISTRY".red().bold(), name);
        }

        if self.verbose {
            for name in result.safe() {
                println!("    |-- {} {}", "public".green(), name.dimmed());
            }
        }

        println!(
            "    +-- {} package(s) checked in {:.2}s",
            result.total(),
            result.duration_secs()
        );
    }

    /// Print scan summary.
    pub fn print_summary(&self, report: &ScanReport) {
        if self.json_mode {
            return;
        }

        let summary = &report.summary;
        println!();
        println!("{}", "=== Scan Summary ===".bright_cyan());
        println!("  Manifests:  {}", summary.total_targets);
        println!("  Public:     {}", summary.safe_count);
        println!("  Duration:   {:.2}s", summary.total_duration_secs);

        if summary.vulnerable_count > 0 {
            println!(
                "  {}",
                format!(
                    "POTENTIAL DEPENDENCY CONFUSION: {} package(s)",
                    summary.vulnerable_count
                )
                .red()
                .bold()
            );
        } else {
            println!("  {}", "No dependency confusion vulnerabilities found.".green());
        }

        println!();
    }
}

fn format_kind(kind: ScanKind) -> colored::ColoredString {
    match kind {
        ScanKind::File => "file".normal(),
        ScanKind::Github => "github".bright_magenta(),
        ScanKind::Web => "web".bright_blue(),
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new(false, false)
    }
}
