use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::fs;
use unirank_core::UniversityRecord;
use uuid::Uuid;

/// JSON snapshot of the last persisted batch, also readable as a source.
#[derive(Debug, Clone)]
pub struct UniversityCacheFile {
    path: PathBuf,
}

impl UniversityCacheFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Entries as loose JSON objects; non-object entries are skipped.
    pub async fn read_raw(&self) -> anyhow::Result<Vec<serde_json::Value>> {
        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading cache file {}", self.path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing cache file {}", self.path.display()))?;
        let serde_json::Value::Array(entries) = value else {
            anyhow::bail!("cache file {} is not a JSON array", self.path.display());
        };
        Ok(entries.into_iter().filter(|v| v.is_object()).collect())
    }

    pub async fn read_records(&self) -> anyhow::Result<Vec<UniversityRecord>> {
        let entries = self.read_raw().await?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<UniversityRecord>(entry) {
                Ok(record) => out.push(record),
                Err(err) => tracing::debug!(error = %err, "skipping malformed cache entry"),
            }
        }
        Ok(out)
    }

    /// Replace the cache contents via temp-file rename in the same directory.
    pub async fn write(&self, records: &[UniversityRecord]) -> anyhow::Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating cache directory {}", parent.display()))?;

        let bytes = serde_json::to_vec_pretty(records).context("serializing cache records")?;
        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        fs::write(&temp_path, &bytes)
            .await
            .with_context(|| format!("writing temp cache file {}", temp_path.display()))?;

        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "renaming temp cache {} -> {}",
                    temp_path.display(),
                    self.path.display()
                )
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn record(name: &str) -> UniversityRecord {
        UniversityRecord {
            id: None,
            name: name.to_string(),
            country: "Canada".to_string(),
            city: Some("Toronto".to_string()),
            location: None,
            rank: Some(21),
            score: Some(88.0),
            website: None,
            image_url: None,
            description: None,
            sources: BTreeSet::from(["qs-rankings".to_string()]),
            source_urls: vec!["https://www.topuniversities.com/u/toronto".to_string()],
            rating: 4.4,
            tuition: None,
            majors: None,
            facilities: None,
        }
    }

    #[tokio::test]
    async fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UniversityCacheFile::new(dir.path().join("data/universities.json"));
        cache.write(&[record("University of Toronto")]).await.unwrap();

        let records = cache.read_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "University of Toronto");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("data"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("universities.json");
        std::fs::write(
            &path,
            r#"[{"name":"McGill University","country":"Canada","rating":4.1}, 42, {"country":"Nowhere"}]"#,
        )
        .unwrap();
        let cache = UniversityCacheFile::new(&path);
        assert_eq!(cache.read_raw().await.unwrap().len(), 2);
        let records = cache.read_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "McGill University");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UniversityCacheFile::new(dir.path().join("absent.json"));
        assert!(!cache.exists().await);
        assert!(cache.read_raw().await.is_err());
    }
}
