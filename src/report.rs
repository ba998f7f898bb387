// File: src/report.rs
//
// Flood Report Snapshots
//
// Serde-derived summaries of flood sessions plus a JSON artifact writer, so
// a failed stress run leaves a reproducible record on disk for triage.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::session::SessionState;

/// Snapshot of one flood session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodSummary {
    /// Target display name
    pub target: String,
    /// "STABLE" or "UNSTABLE" at capture time
    pub stability: String,
    /// Lifecycle state at capture time
    pub state: String,
    /// Worker thread count
    pub threads: usize,
    /// Resource calls per worker
    pub iterations: usize,
    /// Results collected from normally-finished workers
    pub results_collected: usize,
    /// Whether the completion wait was abandoned at the deadline
    pub timed_out: bool,
    /// RFC 3339 capture timestamp
    pub captured_at: String,
}

impl FloodSummary {
    pub(crate) fn capture(
        target: &str,
        unstable: bool,
        state: SessionState,
        threads: usize,
        iterations: usize,
        results_collected: usize,
        timed_out: bool,
    ) -> Self {
        Self {
            target: target.to_string(),
            stability: stability_label(unstable),
            state: state.to_string(),
            threads,
            iterations,
            results_collected,
            timed_out,
            captured_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Snapshot of a torrent and all of its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentSummary {
    /// Coordinator identity
    pub coordinator: String,
    /// Lifecycle state at capture time
    pub state: String,
    /// Sum of child thread counts
    pub total_threads: usize,
    /// Sum of child iteration counts
    pub total_iterations: usize,
    /// Names of children whose target ended UNSTABLE
    pub unstable_targets: Vec<String>,
    /// Per-child snapshots
    pub gates: Vec<FloodSummary>,
    /// RFC 3339 capture timestamp
    pub captured_at: String,
}

impl TorrentSummary {
    pub(crate) fn capture(
        coordinator: &str,
        state: SessionState,
        total_threads: usize,
        total_iterations: usize,
        unstable_targets: Vec<String>,
        gates: Vec<FloodSummary>,
    ) -> Self {
        Self {
            coordinator: coordinator.to_string(),
            state: state.to_string(),
            total_threads,
            total_iterations,
            unstable_targets,
            gates,
            captured_at: Utc::now().to_rfc3339(),
        }
    }
}

fn stability_label(unstable: bool) -> String {
    if unstable { "UNSTABLE" } else { "STABLE" }.to_string()
}

/// Write a summary as pretty-printed JSON under `dir`.
///
/// The file is named `<name>.json` with filesystem-hostile characters
/// replaced. Returns the path written.
///
/// # Errors
///
/// Fails if the directory cannot be created or the file cannot be written.
pub fn write_artifact<S: Serialize>(dir: &Path, name: &str, summary: &S) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create artifact dir {}", dir.display()))?;

    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let path = dir.join(format!("{}.json", safe));

    let json = serde_json::to_string_pretty(summary).context("failed to serialize summary")?;
    fs::write(&path, json)
        .with_context(|| format!("failed to write artifact {}", path.display()))?;

    log::info!("flood artifact written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_labels() {
        let summary = FloodSummary::capture("Counter", false, SessionState::Flooded, 5, 5, 5, false);
        assert_eq!(summary.stability, "STABLE");
        assert_eq!(summary.state, "FLOODED");
        assert!(!summary.captured_at.is_empty());

        let summary = FloodSummary::capture("Counter", true, SessionState::Flooded, 5, 5, 0, true);
        assert_eq!(summary.stability, "UNSTABLE");
        assert!(summary.timed_out);
    }

    #[test]
    fn test_write_artifact_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let summary = FloodSummary::capture("Thing[v1]", false, SessionState::Flooded, 2, 3, 2, false);

        let path = write_artifact(dir.path(), "Thing[v1]", &summary).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with(".json"));

        let raw = fs::read_to_string(&path).unwrap();
        let parsed: FloodSummary = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.target, "Thing[v1]");
        assert_eq!(parsed.threads, 2);
        assert_eq!(parsed.results_collected, 2);
    }
}
