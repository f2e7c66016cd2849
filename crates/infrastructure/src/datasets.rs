//! File-backed dataset provider.
//!
//! Datasets live in one directory as `<dataset_id>.json`:
//!
//! ```json
//! {
//!   "name": "Capital cities",
//!   "task_type": "qa",
//!   "tasks": [
//!     { "id": "q1", "prompt": "What is the capital of France?", "reference": "Paris" }
//!   ]
//! }
//! ```

use async_trait::async_trait;
use llm_eval_application::ports::DatasetProvider;
use llm_eval_domain::{ConfigurationError, Dataset, DatasetId, DatasetInfo, Task, TaskType};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// On-disk layout; the id comes from the file name
#[derive(Debug, Deserialize)]
struct DatasetFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    task_type: Option<TaskType>,
    tasks: Vec<Task>,
}

impl DatasetFile {
    fn into_dataset(self, id: DatasetId) -> Dataset {
        Dataset {
            name: self.name.unwrap_or_else(|| id.to_string()),
            id,
            task_type: self.task_type,
            tasks: self.tasks,
        }
    }
}

/// Loads datasets from `<dir>/<dataset_id>.json`.
#[derive(Debug, Clone)]
pub struct FileDatasetProvider {
    dir: PathBuf,
}

impl FileDatasetProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, dataset_id: &DatasetId) -> Option<PathBuf> {
        let id = dataset_id.as_str();
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return None;
        }
        Some(self.dir.join(format!("{id}.json")))
    }

    async fn read(path: &Path) -> Result<DatasetFile, ConfigurationError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigurationError::Source(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| ConfigurationError::Source(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl DatasetProvider for FileDatasetProvider {
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn load(&self, dataset_id: &DatasetId) -> Result<Dataset, ConfigurationError> {
        let path = self
            .path_for(dataset_id)
            .ok_or_else(|| ConfigurationError::DatasetNotFound(dataset_id.clone()))?;

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(ConfigurationError::DatasetNotFound(dataset_id.clone())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConfigurationError::DatasetNotFound(dataset_id.clone()));
            }
            Err(e) => {
                return Err(ConfigurationError::Source(format!("{}: {}", path.display(), e)));
            }
        }

        let dataset = Self::read(&path).await?.into_dataset(dataset_id.clone());
        debug!(tasks = dataset.task_count(), "Loaded dataset");
        Ok(dataset)
    }

    /// Every parsable dataset file in the directory, sorted by id. Files that do
    /// not parse are skipped.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn list(&self) -> Result<Vec<DatasetInfo>, ConfigurationError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Dataset directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(ConfigurationError::Source(format!(
                    "{}: {}",
                    self.dir.display(),
                    e
                )));
            }
        };

        let mut datasets = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ConfigurationError::Source(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            match Self::read(&path).await {
                Ok(file) => {
                    let dataset = file.into_dataset(DatasetId::from(stem));
                    datasets.push(DatasetInfo {
                        task_count: dataset.task_count(),
                        id: dataset.id,
                        name: dataset.name,
                        path: Some(path.display().to_string()),
                    });
                }
                Err(e) => warn!(error = %e, "Skipping unreadable dataset"),
            }
        }

        datasets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(datasets)
    }
}
