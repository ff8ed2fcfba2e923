//! Data flowing through one build cycle, from idea to persisted record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The seed of a cycle, produced by the Scout role.
///
/// Every field is required: Scout output missing any of them is rejected as
/// a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    pub name: String,
    pub problem: String,
    pub solution: String,
    pub stack: String,
    pub monetization: String,
}

impl Idea {
    /// Strict JSON parse of raw Scout output.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Parse {
            role: "scout",
            message: e.to_string(),
        })
    }
}

/// Raw outputs of the four parallel build roles. Opaque text, never
/// cross-validated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildArtifacts {
    pub ui_code: String,
    pub logic_code: String,
    pub configs: String,
    pub growth_plan: String,
}

impl BuildArtifacts {
    /// Interface and logic code joined the way QA and the record see it.
    pub fn combined_code(&self) -> String {
        format!("{}\n\n{}", self.ui_code, self.logic_code)
    }
}

/// Marker QA emits when it finds nothing to complain about.
pub const APPROVAL_MARKER: &str = "APPROVED";

/// QA's advisory verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewResult {
    pub text: String,
}

impl ReviewResult {
    pub fn approved(&self) -> bool {
        self.text.contains(APPROVAL_MARKER)
    }
}

/// The unit of persistence: exactly one per completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub name: String,
    /// JSON encoding of the originating `Idea`.
    pub idea: String,
    pub code: String,
    #[serde(default)]
    pub configs: String,
    #[serde(default)]
    pub growth_plan: String,
    #[serde(default)]
    pub stack: String,
}

impl ProjectRecord {
    pub fn assemble(idea: &Idea, artifacts: &BuildArtifacts) -> Result<Self> {
        let encoded = serde_json::to_string(idea)
            .map_err(|e| Error::Validation(format!("cannot encode idea: {e}")))?;
        Ok(Self {
            name: idea.name.clone(),
            idea: encoded,
            code: artifacts.combined_code(),
            configs: artifacts.configs.clone(),
            growth_plan: artifacts.growth_plan.clone(),
            stack: idea.stack.clone(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Validation(format!("cannot encode project record: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    Completed,
}

/// Where the Closer ended up writing the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    Primary,
    Fallback,
}

/// What a finished cycle hands back to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub status: CycleStatus,
    pub timestamp: DateTime<Utc>,
    pub project: ProjectRecord,
    pub persisted_to: Persistence,
}

/// A `projects` row as returned by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProject {
    pub name: String,
    #[serde(default)]
    pub idea: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub stack: String,
    /// Epoch milliseconds at insert time.
    #[serde(default)]
    pub timestamp: i64,
}
