//! JSON report output.

use crate::types::{Result, ScanReport};
use std::path::Path;
use tracing::info;

/// Pretty JSON rendering of a report.
pub fn render(report: &ScanReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write the report to `path`, or to stdout when no path is given.
pub fn write_report(report: &ScanReport, path: Option<&Path>) -> Result<()> {
    let json = render(report)?;
    match path {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("Results written to: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safe_space::SafeSpaces;
    use crate::types::{Ecosystem, ScanKind, ScanRecorder};

    #[test]
    fn test_write_report_to_file() {
        let mut recorder = ScanRecorder::new("acme/app@main:package.json", ScanKind::Github, Ecosystem::Npm);
        recorder.add_vulnerable("@acme/internal");
        recorder.set_metadata("branch", "main");
        let report = ScanReport::new(vec![recorder.finalize(&SafeSpaces::default())]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_report(&report, Some(&path)).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["summary"]["vulnerable_count"], 1);
        assert_eq!(written["results"][0]["metadata"]["branch"], "main");
        assert_eq!(written["results"][0]["type"], "github");
    }
}
