//! Run storage API.
//!
//! Each run lives in its own directory holding `manifest.json` and
//! `rows.jsonl` (one [`ResultRow`] per line).

use crate::table::{ResultRow, ResultTable};
use crate::types::RunManifest;
use crate::{ResultsError, ResultsResult};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct RunStore {
    root_dir: PathBuf,
}

impl RunStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    /// Store rooted next to a config file, under `.hybrid/runs`.
    pub fn for_config(config_path: &Path) -> ResultsResult<Self> {
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ResultsError::InvalidPath {
                message: "config path has no parent directory".to_string(),
            })?;
        Self::new(config_dir.join(".hybrid").join("runs"))
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(run_id)
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_dir(run_id).join("manifest.json").exists()
    }

    pub fn save_run(&self, manifest: &RunManifest, table: &ResultTable) -> ResultsResult<()> {
        let run_dir = self.run_dir(&manifest.run_id);
        fs::create_dir_all(&run_dir)?;

        let manifest_json = serde_json::to_string_pretty(manifest)?;
        fs::write(run_dir.join("manifest.json"), manifest_json)?;

        let mut content = String::new();
        for row in table.rows() {
            content.push_str(&serde_json::to_string(row)?);
            content.push('\n');
        }
        fs::write(run_dir.join("rows.jsonl"), content)?;

        tracing::debug!(run_id = %manifest.run_id, rows = table.len(), "saved run");
        Ok(())
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        let manifest_path = self.run_dir(run_id).join("manifest.json");
        if !manifest_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(manifest_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load the stored rows back into a table with the manifest's columns.
    pub fn load_table(&self, run_id: &str) -> ResultsResult<ResultTable> {
        let manifest = self.load_manifest(run_id)?;
        let rows_path = self.run_dir(run_id).join("rows.jsonl");
        if !rows_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(rows_path)?;
        let mut rows = Vec::new();
        for line in content.lines() {
            if !line.trim().is_empty() {
                let row: ResultRow = serde_json::from_str(line)?;
                rows.push(row);
            }
        }
        ResultTable::from_rows(manifest.columns, manifest.intermediate_columns, rows)
    }

    /// All stored runs of a model kind, ordered by timestamp.
    pub fn list_runs(&self, model_kind: &str) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();
        if !self.root_dir.exists() {
            return Ok(runs);
        }

        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().to_string();
            if let Ok(manifest) = self.load_manifest(&run_id) {
                if manifest.model_kind == model_kind {
                    runs.push(manifest);
                }
            }
        }
        runs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(runs)
    }

    pub fn delete_run(&self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }
}
