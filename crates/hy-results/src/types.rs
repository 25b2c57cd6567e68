//! Run metadata types.

use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunManifest {
    pub run_id: RunId,
    pub name: String,
    pub model_kind: String,
    pub timestamp: String,
    pub method: String,
    pub run_type: RunType,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intermediate_columns: Vec<String>,
    #[serde(default)]
    pub unstable: bool,
    pub solver_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RunType {
    /// Reporting points supplied up front.
    Grid {
        t_start: f64,
        t_end: f64,
        points: usize,
    },
    /// Reporting points re-initialized from an external schedule.
    Schedule { points: usize },
}

impl RunManifest {
    /// Timestamp in RFC 3339 for a manifest created now.
    pub fn now_timestamp() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}
