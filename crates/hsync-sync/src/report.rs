use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hsync_core::SyncOutcome;
use tokio::fs;

use crate::pipeline::RunSummary;

pub fn render_markdown(summary: &RunSummary) -> String {
    let mut out = format!(
        "# hsync run {}\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Dry run: {}\n- Created: {}\n- Updated: {}\n- Unchanged: {}\n- Failed dates: {}\n- Failed containers: {}\n",
        summary.label(),
        summary.run_id,
        summary.started_at,
        summary.finished_at,
        summary.dry_run,
        summary.total(SyncOutcome::Created),
        summary.total(SyncOutcome::Updated),
        summary.total(SyncOutcome::Unchanged),
        summary.date_failures(),
        summary.schema_failures(),
    );
    for container in &summary.containers {
        out.push_str(&format!("\n## {} (`{}`)\n", container.family, container.container_id));
        if let Some(err) = &container.schema_error {
            out.push_str(&format!("\nSkipped: {err}\n"));
            continue;
        }
        if container.dates.is_empty() {
            out.push_str("\nNo dates processed.\n");
            continue;
        }
        out.push_str("\n| date | outcome |\n|------|---------|\n");
        for date in &container.dates {
            out.push_str(&format!("| {} | {} |\n", date.date, date.outcome.replace('|', "\\|")));
        }
    }
    out
}

/// Writes `summary.json` and `summary.md` under `<reports_dir>/<run label>/`.
pub async fn write_run_report(reports_dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    let run_dir = reports_dir.join(summary.label());
    fs::create_dir_all(&run_dir)
        .await
        .with_context(|| format!("creating {}", run_dir.display()))?;

    let json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(run_dir.join("summary.json"), json)
        .await
        .context("writing summary.json")?;
    fs::write(run_dir.join("summary.md"), render_markdown(summary))
        .await
        .context("writing summary.md")?;
    Ok(run_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ContainerSummary, DateSummary};
    use chrono::{NaiveDate, Utc};
    use hsync_core::MetricFamily;
    use uuid::Uuid;

    fn summary() -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            dry_run: false,
            containers: vec![
                ContainerSummary {
                    family: MetricFamily::Steps,
                    container_id: "db-steps".into(),
                    schema_error: None,
                    dates: vec![
                        DateSummary {
                            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                            outcome: "Created".into(),
                            failed: false,
                        },
                        DateSummary {
                            date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
                            outcome: "Failed: fetching steps for 2024-03-02: no steps data for 2024-03-02".into(),
                            failed: true,
                        },
                    ],
                },
                ContainerSummary {
                    family: MetricFamily::Sleep,
                    container_id: "db-sleep".into(),
                    schema_error: Some("container db-sleep has no date-typed column".into()),
                    dates: Vec::new(),
                },
            ],
            report_dir: None,
        }
    }

    #[test]
    fn markdown_lists_every_container() {
        let md = render_markdown(&summary());
        assert!(md.contains("- Created: 1"));
        assert!(md.contains("- Failed dates: 1"));
        assert!(md.contains("## steps (`db-steps`)"));
        assert!(md.contains("| 2024-03-01 | Created |"));
        assert!(md.contains("Skipped: container db-sleep has no date-typed column"));
    }

    #[tokio::test]
    async fn report_files_land_in_a_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let summary = summary();
        let run_dir = write_run_report(dir.path(), &summary).await.unwrap();

        assert!(run_dir.ends_with(summary.label()));
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(run_dir.join("summary.json")).unwrap()).unwrap();
        assert_eq!(json["containers"][0]["family"], "steps");
        assert_eq!(json["containers"][1]["schema_error"], "container db-sleep has no date-typed column");
        assert!(run_dir.join("summary.md").exists());
    }
}
