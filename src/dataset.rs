use crate::error::{PipelineError, Result, Stage};
use crate::ml::models::{Label, LEGITIMATE, PHISHING};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// One labeled URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub url: String,
    pub label: Label,
}

impl UrlRecord {
    pub fn new(url: impl Into<String>, label: Label) -> Self {
        Self {
            url: url.into(),
            label,
        }
    }
}

/// Ordered collection of labeled URLs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    records: Vec<UrlRecord>,
}

impl Dataset {
    pub fn new(records: Vec<UrlRecord>) -> Self {
        Self { records }
    }

    /// Pair URLs with labels positionally
    pub fn from_parts(urls: Vec<String>, labels: Vec<Label>) -> Result<Self> {
        if urls.len() != labels.len() {
            return Err(PipelineError::ShapeMismatch {
                stage: Stage::Dataset,
                left: "urls",
                left_rows: urls.len(),
                right: "labels",
                right_rows: labels.len(),
            });
        }
        Ok(Self::new(
            urls.into_iter()
                .zip(labels)
                .map(|(url, label)| UrlRecord { url, label })
                .collect(),
        ))
    }

    /// Assemble a balanced set: up to `size / 2` valid URLs of each class, shuffled
    pub fn balanced(
        phishing: Vec<String>,
        legitimate: Vec<String>,
        size: usize,
        seed: u64,
    ) -> Self {
        let half = size / 2;
        let take = |urls: Vec<String>, label: Label| -> Vec<UrlRecord> {
            urls.into_iter()
                .filter(|u| validate_url(u))
                .take(half)
                .map(|u| UrlRecord::new(u, label))
                .collect()
        };

        let mut records = take(phishing, PHISHING);
        records.extend(take(legitimate, LEGITIMATE));

        let mut dataset = Self::new(records);
        dataset.shuffle(seed);
        dataset
    }

    /// Deterministic in-place shuffle
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        self.records.shuffle(&mut rng);
    }

    /// Every label must be 0 or 1
    pub fn validate(&self) -> Result<()> {
        match self
            .records
            .iter()
            .position(|r| r.label != LEGITIMATE && r.label != PHISHING)
        {
            Some(row) => Err(PipelineError::InvalidLabel {
                stage: Stage::Dataset,
                row,
                label: self.records[row].label,
            }),
            None => Ok(()),
        }
    }

    pub fn records(&self) -> &[UrlRecord] {
        &self.records
    }

    pub fn urls(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.url.as_str()).collect()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.records.iter().map(|r| r.label).collect()
    }

    /// (phishing, legitimate) counts
    pub fn class_counts(&self) -> (usize, usize) {
        let phishing = self.records.iter().filter(|r| r.label == PHISHING).count();
        (phishing, self.records.len() - phishing)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Keep URLs that carry both a scheme and a host
pub fn validate_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => !parsed.scheme().is_empty() && parsed.host_str().map_or(false, |h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Source of labeled URLs
pub trait DatasetProvider: Send + Sync {
    /// Dataset of exactly `size` records
    fn get_dataset(&self, size: usize) -> Result<Dataset>;
}

/// Dataset cached as a JSON array of `{ "url", "label" }` objects
#[derive(Debug, Clone)]
pub struct JsonDatasetStore {
    path: PathBuf,
}

impl JsonDatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cache; `None` when the file does not exist
    pub fn load(&self) -> Result<Option<Dataset>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Dataset file not found");
            return Ok(None);
        }

        let file = File::open(&self.path).map_err(|e| PipelineError::io(Stage::Dataset, e))?;
        let reader = BufReader::new(file);
        let dataset: Dataset = serde_json::from_reader(reader)?;
        dataset.validate()?;

        info!(
            path = %self.path.display(),
            records = dataset.len(),
            "Dataset loaded"
        );
        Ok(Some(dataset))
    }

    /// Write the cache, replacing any previous file
    pub fn save(&self, dataset: &Dataset) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(Stage::Dataset, e))?;
        }
        let file = File::create(&self.path).map_err(|e| PipelineError::io(Stage::Dataset, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, dataset)?;
        writer
            .flush()
            .map_err(|e| PipelineError::io(Stage::Dataset, e))?;

        info!(
            path = %self.path.display(),
            records = dataset.len(),
            "Dataset saved"
        );
        Ok(())
    }
}

impl DatasetProvider for JsonDatasetStore {
    fn get_dataset(&self, size: usize) -> Result<Dataset> {
        match self.load()? {
            Some(dataset) if dataset.len() == size => Ok(dataset),
            Some(dataset) => {
                warn!(
                    path = %self.path.display(),
                    cached = dataset.len(),
                    requested = size,
                    "Cached dataset has the wrong size"
                );
                Err(PipelineError::Dataset(format!(
                    "{} holds {} records, {} requested",
                    self.path.display(),
                    dataset.len(),
                    size
                )))
            }
            None => Err(PipelineError::Dataset(format!(
                "no dataset at {}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Dataset {
        Dataset::new(vec![
            UrlRecord::new("http://paypal-login-secure.badsite.ru/verify", 1),
            UrlRecord::new("https://example.com/", 0),
            UrlRecord::new("http://192.168.1.1/login", 1),
            UrlRecord::new("https://github.com/torvalds/linux", 0),
        ])
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/path"));
        assert!(validate_url("http://192.168.1.1/login"));
        assert!(!validate_url("example.com"));
        assert!(!validate_url("not a url"));
        assert!(!validate_url("mailto:someone@example.com"));
        assert!(!validate_url(""));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonDatasetStore::new(dir.path().join("data").join("dataset.json"));

        assert_eq!(store.load().unwrap(), None);

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[1]["url"], "https://example.com/");
        assert_eq!(value[1]["label"], 0);
    }

    #[test]
    fn test_get_dataset_checks_size() {
        let dir = TempDir::new().unwrap();
        let store = JsonDatasetStore::new(dir.path().join("dataset.json"));

        assert!(matches!(
            store.get_dataset(4),
            Err(PipelineError::Dataset(_))
        ));

        store.save(&sample()).unwrap();
        assert_eq!(store.get_dataset(4).unwrap().len(), 4);

        let err = store.get_dataset(2000).unwrap_err();
        assert_eq!(err.stage(), Stage::Dataset);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_write_is_reported() {
        let err = JsonDatasetStore::new("/dev/full").save(&sample()).unwrap_err();
        assert_eq!(err.stage(), Stage::Dataset);
    }

    #[test]
    fn test_io_errors_are_tagged_dataset() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();

        let err = JsonDatasetStore::new(blocker.join("dataset.json"))
            .save(&sample())
            .unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");
        assert_eq!(err.stage(), Stage::Dataset);

        // A directory in place of the cache file fails on read
        let err = JsonDatasetStore::new(dir.path()).load().unwrap_err();
        assert_eq!(err.stage(), Stage::Dataset);
    }

    #[test]
    fn test_invalid_label_in_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.json");
        fs::write(&path, r#"[{"url": "https://a.com", "label": 0}, {"url": "https://b.com", "label": 3}]"#)
            .unwrap();

        let err = JsonDatasetStore::new(&path).load().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidLabel { row: 1, label: 3, .. }));
    }

    #[test]
    fn test_balanced_assembly() {
        let phishing: Vec<String> = (0..10).map(|i| format!("http://login{}.bad.ru/", i)).collect();
        let mut legitimate: Vec<String> = (0..10).map(|i| format!("https://site{}.org/", i)).collect();
        legitimate.insert(0, "not a url".to_string());

        let dataset = Dataset::balanced(phishing.clone(), legitimate.clone(), 8, 42);
        assert_eq!(dataset.len(), 8);
        assert_eq!(dataset.class_counts(), (4, 4));
        assert!(dataset.urls().iter().all(|u| validate_url(u)));

        let again = Dataset::balanced(phishing, legitimate, 8, 42);
        assert_eq!(dataset, again);
    }

    #[test]
    fn test_from_parts() {
        let dataset = Dataset::from_parts(
            vec!["https://a.com".to_string(), "https://b.com".to_string()],
            vec![0, 1],
        )
        .unwrap();
        assert_eq!(dataset.labels(), vec![0, 1]);

        assert!(Dataset::from_parts(vec!["https://a.com".to_string()], vec![]).is_err());
    }
}
