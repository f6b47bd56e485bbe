use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io;
use std::path::{Path, PathBuf};

use super::graph::RecommendationState;

pub const REPORTS_DIR: &str = "recommendations";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportPaths {
    pub number: u32,
    pub dir: PathBuf,
    pub json: PathBuf,
    pub markdown: PathBuf,
    pub metadata: PathBuf,
}

fn report_number(name: &str) -> Option<u32> {
    name.strip_prefix("report_")?.parse().ok()
}

async fn next_number(root: &Path) -> io::Result<u32> {
    let mut highest = 0;
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        if let Some(n) = entry.file_name().to_str().and_then(report_number) {
            highest = highest.max(n);
        }
    }
    Ok(highest + 1)
}

/// Claim the next free `report_<N>` directory. `create_dir` fails on an
/// existing directory, so two concurrent writers never share one.
async fn claim_dir(root: &Path) -> io::Result<(u32, PathBuf)> {
    tokio::fs::create_dir_all(root).await?;
    let mut number = next_number(root).await?;
    loop {
        let dir = root.join(format!("report_{number}"));
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => return Ok((number, dir)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => number += 1,
            Err(err) => return Err(err),
        }
    }
}

pub async fn write_report(output_dir: &Path, state: &RecommendationState) -> io::Result<ReportPaths> {
    let (number, dir) = claim_dir(&output_dir.join(REPORTS_DIR)).await?;
    let paths = ReportPaths {
        number,
        json: dir.join("recommendation.json"),
        markdown: dir.join("recommendation.md"),
        metadata: dir.join("metadata.json"),
        dir,
    };
    let report = state.final_report.clone().unwrap_or_default();
    let patterns = state.matched_patterns.clone().unwrap_or_default();

    let body = json!({
        "insights": state.insights,
        "scores": state.eval_output.unwrap_or_default(),
        "matched_patterns": patterns,
        "refined_statements": state.refined_statements,
        "report": report,
    });
    let metadata = json!({
        "request_id": state.request_id,
        "report_number": number,
        "generated_at": Utc::now().to_rfc3339(),
        "pattern_count": patterns.len(),
        "refined": state.refined_statements.is_some(),
    });
    tokio::fs::write(&paths.json, serde_json::to_vec_pretty(&body)?).await?;
    tokio::fs::write(&paths.markdown, report.as_bytes()).await?;
    tokio::fs::write(&paths.metadata, serde_json::to_vec_pretty(&metadata)?).await?;
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_are_numbered_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(REPORTS_DIR).join("report_4")).unwrap();
        std::fs::create_dir_all(dir.path().join(REPORTS_DIR).join("notes")).unwrap();
        let state = RecommendationState {
            request_id: Some("req-1".to_string()),
            final_report: Some("## Core Hypothesis\n".to_string()),
            ..RecommendationState::default()
        };
        let first = write_report(dir.path(), &state).await.unwrap();
        let second = write_report(dir.path(), &state).await.unwrap();
        assert_eq!((first.number, second.number), (5, 6));
        assert!(first.dir.ends_with("recommendations/report_5"));
        assert_eq!(std::fs::read_to_string(&first.markdown).unwrap(), "## Core Hypothesis\n");
        let meta: serde_json::Value = serde_json::from_slice(&std::fs::read(&first.metadata).unwrap()).unwrap();
        assert_eq!(meta["request_id"], "req-1");
        assert_eq!(meta["refined"], false);
        assert!(first.json.exists());
    }
}
