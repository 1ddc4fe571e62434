//! Per-run report files and the parquet snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, BooleanArray, Float64Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use unirank_core::{PipelineReport, UniversityRecord};

pub const SUMMARY_FILE: &str = "run_summary.md";
pub const REPORT_FILE: &str = "run_report.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

pub fn render_run_summary(report: &PipelineReport) -> String {
    let mut lines = vec![
        "# University Ranking Run".to_string(),
        String::new(),
        format!("- Run ID: `{}`", report.run_id),
        format!("- Started: {}", report.started_at),
        format!("- Finished: {}", report.finished_at),
        format!("- Total records: {}", report.total_records),
        format!("- Created: {}", report.created_count),
        format!("- Updated: {}", report.updated_count),
        format!("- Dropped raw records: {}", report.dropped_records),
        format!("- Synthesized records: {}", report.synthesized_records),
        String::new(),
        "## Per Country".to_string(),
    ];
    lines.extend(report.per_country_counts.iter().map(|(k, v)| format!("- {k}: {v}")));
    lines.push(String::new());
    lines.push("## Raw Records Per Source".to_string());
    lines.extend(report.source_counts.iter().map(|(k, v)| format!("- {k}: {v}")));
    if !report.failures.is_empty() {
        lines.push(String::new());
        lines.push("## Failures".to_string());
        lines.extend(report.failures.iter().map(|f| format!("- {}: {}", f.name, f.message)));
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Writes `<reports_dir>/<run_id>/` with the markdown summary and JSON report.
pub async fn write_run_reports(
    reports_dir: &Path,
    report: &PipelineReport,
    records: &[UniversityRecord],
) -> Result<PathBuf> {
    let run_dir = reports_dir.join(report.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .await
        .with_context(|| format!("creating {}", run_dir.display()))?;

    fs::write(run_dir.join(SUMMARY_FILE), render_run_summary(report))
        .await
        .with_context(|| format!("writing {SUMMARY_FILE}"))?;

    let json = serde_json::to_vec_pretty(&serde_json::json!({
        "report": report,
        "universities": records,
    }))
    .context("serializing run report")?;
    fs::write(run_dir.join(REPORT_FILE), json)
        .await
        .with_context(|| format!("writing {REPORT_FILE}"))?;

    Ok(run_dir)
}

pub const SNAPSHOT_DIR: &str = "snapshots";
pub const SNAPSHOT_FILE: &str = "universities.parquet";
pub const MANIFEST_FILE: &str = "manifest.json";
const SNAPSHOT_SCHEMA_VERSION: u32 = 2;

impl ParquetManifestFile {
    /// Describe an encoded snapshot; `path` is relative to the run directory.
    pub fn describe(name: &str, path: &str, encoded: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            sha256: hex::encode(Sha256::digest(encoded)),
            bytes: encoded.len() as u64,
        }
    }
}

fn snapshot_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        ArrowField::new("id", DataType::Utf8, true),
        ArrowField::new("name", DataType::Utf8, false),
        ArrowField::new("country", DataType::Utf8, false),
        ArrowField::new("city", DataType::Utf8, true),
        ArrowField::new("rank", DataType::UInt32, true),
        ArrowField::new("score", DataType::Float64, true),
        ArrowField::new("rating", DataType::Float64, false),
        ArrowField::new("tuition", DataType::Float64, true),
        ArrowField::new("website", DataType::Utf8, true),
        ArrowField::new("sources", DataType::Utf8, false),
        ArrowField::new("synthetic_only", DataType::Boolean, false),
    ]))
}

/// One row per merged university, sources joined with `;`.
pub fn encode_snapshot(records: &[UniversityRecord]) -> Result<Vec<u8>> {
    let text = |field: fn(&UniversityRecord) -> Option<&str>| -> ArrayRef {
        Arc::new(records.iter().map(field).collect::<StringArray>())
    };
    let number = |field: fn(&UniversityRecord) -> Option<f64>| -> ArrayRef {
        Arc::new(records.iter().map(field).collect::<Float64Array>())
    };
    let ids: StringArray = records.iter().map(|r| r.id.map(|id| id.to_string())).collect();
    let sources: StringArray = records
        .iter()
        .map(|r| Some(r.sources.iter().map(String::as_str).collect::<Vec<_>>().join(";")))
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(ids),
        text(|r| Some(r.name.as_str())),
        text(|r| Some(r.country.as_str())),
        text(|r| r.city.as_deref()),
        Arc::new(records.iter().map(|r| r.rank).collect::<UInt32Array>()),
        number(|r| r.score),
        number(|r| Some(r.rating)),
        number(|r| r.tuition),
        text(|r| r.website.as_deref()),
        Arc::new(sources),
        Arc::new(records.iter().map(|r| Some(r.is_synthetic_only())).collect::<BooleanArray>()),
    ];
    let batch = RecordBatch::try_new(snapshot_schema(), columns).context("assembling snapshot columns")?;

    let mut encoded = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut encoded, batch.schema(), None).context("opening snapshot writer")?;
    writer.write(&batch).context("encoding snapshot rows")?;
    writer.close().context("finishing snapshot")?;
    Ok(encoded)
}

/// Writes `snapshots/universities.parquet` plus a sha256 manifest under `run_dir`.
pub async fn export_parquet_snapshot(run_dir: &Path, records: &[UniversityRecord]) -> Result<PathBuf> {
    let snapshot_dir = run_dir.join(SNAPSHOT_DIR);
    fs::create_dir_all(&snapshot_dir)
        .await
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let encoded = encode_snapshot(records)?;
    fs::write(snapshot_dir.join(SNAPSHOT_FILE), &encoded)
        .await
        .with_context(|| format!("writing {SNAPSHOT_FILE}"))?;

    let manifest = ParquetManifest {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        files: vec![ParquetManifestFile::describe(
            "universities",
            &format!("{SNAPSHOT_DIR}/{SNAPSHOT_FILE}"),
            &encoded,
        )],
    };
    let manifest_path = snapshot_dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)
        .await
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

/// Markdown digest of the latest `runs` run directories under `reports_dir`.
pub fn report_markdown(runs: usize, reports_dir: &Path) -> Result<String> {
    let mut dirs = std::fs::read_dir(reports_dir)
        .with_context(|| format!("reading {}", reports_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter(|entry| entry.path().join(REPORT_FILE).exists())
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# University Ranking Runs".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let report_path = dir.path().join(REPORT_FILE);
        let value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&report_path)
                .with_context(|| format!("reading {}", report_path.display()))?,
        )
        .with_context(|| format!("parsing {}", report_path.display()))?;
        let report: PipelineReport = serde_json::from_value(value.get("report").cloned().unwrap_or_default())
            .with_context(|| format!("decoding report in {}", report_path.display()))?;

        lines.push(format!("## Run `{}`", report.run_id));
        lines.push(format!("- finished: {}", report.finished_at));
        lines.push(format!(
            "- records: {} (created {}, updated {}, failed {})",
            report.total_records,
            report.created_count,
            report.updated_count,
            report.failures.len()
        ));
        lines.push(format!("- synthesized: {}", report.synthesized_records));
        let countries = report
            .per_country_counts
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("- countries: {countries}"));
        let manifest_path = dir.path().join(SNAPSHOT_DIR).join(MANIFEST_FILE);
        if manifest_path.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest_path.display()));
        }
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::Utc;
    use unirank_core::PersistFailure;
    use uuid::Uuid;

    use super::*;

    fn report() -> PipelineReport {
        PipelineReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            total_records: 1,
            per_country_counts: BTreeMap::from([("Japan".to_string(), 1)]),
            created_count: 1,
            updated_count: 0,
            failures: vec![PersistFailure {
                name: "Broken".to_string(),
                message: "record rejected".to_string(),
            }],
            source_counts: BTreeMap::from([("qs-rankings".to_string(), 3)]),
            dropped_records: 2,
            synthesized_records: 0,
        }
    }

    fn record() -> UniversityRecord {
        UniversityRecord {
            id: Some(Uuid::new_v4()),
            name: "Kyoto University".to_string(),
            country: "Japan".to_string(),
            city: Some("Kyoto".to_string()),
            location: None,
            rank: Some(46),
            score: Some(75.6),
            website: None,
            image_url: None,
            description: None,
            sources: BTreeSet::from(["qs-rankings".to_string(), "the-rankings".to_string()]),
            source_urls: vec![],
            rating: 3.78,
            tuition: None,
            majors: None,
            facilities: None,
        }
    }

    #[test]
    fn summary_lists_failures_and_counts() {
        let text = render_run_summary(&report());
        assert!(text.contains("- Japan: 1"));
        assert!(text.contains("- qs-rankings: 3"));
        assert!(text.contains("- Broken: record rejected"));
        assert!(text.contains("- Dropped raw records: 2"));
    }

    #[tokio::test]
    async fn run_reports_and_snapshot_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let report = report();
        let run_dir = write_run_reports(dir.path(), &report, &[record()]).await.unwrap();
        assert!(run_dir.join(SUMMARY_FILE).exists());
        assert!(run_dir.join(REPORT_FILE).exists());

        let manifest_path = export_parquet_snapshot(&run_dir, &[record()]).await.unwrap();
        let manifest: ParquetManifest =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].path, "snapshots/universities.parquet");
        let written = std::fs::read(run_dir.join("snapshots/universities.parquet")).unwrap();
        assert_eq!(manifest.files[0].bytes, written.len() as u64);
        assert_eq!(manifest.files[0].sha256, hex::encode(Sha256::digest(&written)));

        let digest = report_markdown(5, dir.path()).unwrap();
        assert!(digest.contains(&report.run_id.to_string()));
        assert!(digest.contains("created 1, updated 0, failed 1"));
    }
}
