//! Run identity and the artifact key layout every stage and external tool relies on.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use uuid::Uuid;

const RUN_TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

const WORK_PREFIX: &str = "work";
const OUTPUT_PREFIX: &str = "output";

pub const PROCESSED_ARTIFACT: &str = "processed.npy";
pub const DIGITAL_TWIN_ARTIFACT: &str = "digital_twin.npy";
pub const STATUS_ARTIFACT: &str = "status.json";

/// Generates `run_<YYYYmmdd_HHMMSS>_<6 hex>` from the current UTC time.
pub fn generate_run_id() -> String {
    generate_run_id_at(OffsetDateTime::now_utc())
}

pub fn generate_run_id_at(now: OffsetDateTime) -> String {
    let timestamp = now
        .format(RUN_TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("run_{timestamp}_{}", &suffix[..6])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRunId {
    pub run_id: String,
    pub reason: &'static str,
}

impl fmt::Display for InvalidRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid run id '{}': {}", self.run_id, self.reason)
    }
}

impl std::error::Error for InvalidRunId {}

/// Caller-supplied run ids become path segments, so they must stay inside one segment.
pub fn validate_run_id(run_id: &str) -> Result<(), InvalidRunId> {
    let reason = if run_id.trim().is_empty() {
        Some("run id cannot be blank")
    } else if run_id.contains('/') || run_id.contains('\\') {
        Some("run id cannot contain path separators")
    } else if run_id.contains("..") {
        Some("run id cannot contain '..'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(InvalidRunId {
            run_id: run_id.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Key layout of one run's namespace under `work/<run_id>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    run_id: String,
}

impl RunLayout {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn artifact_key(&self, artifact: &str) -> String {
        format!("{WORK_PREFIX}/{}/{artifact}", self.run_id)
    }

    pub fn processed_key(&self) -> String {
        self.artifact_key(PROCESSED_ARTIFACT)
    }

    pub fn digital_twin_key(&self) -> String {
        self.artifact_key(DIGITAL_TWIN_ARTIFACT)
    }

    pub fn status_key(&self) -> String {
        self.artifact_key(STATUS_ARTIFACT)
    }

    pub fn processed_png_prefix(&self) -> String {
        format!("{WORK_PREFIX}/{}/processed_png/", self.run_id)
    }

    pub fn processed_zip_key(&self) -> String {
        self.artifact_key("processed_preproc.zip")
    }

    pub fn processed_zip_filename(&self) -> String {
        format!("{}_preproc.zip", self.run_id)
    }

    pub fn synthetic_zip_key(&self) -> String {
        self.artifact_key("synthetic.zip")
    }

    pub fn synthetic_zip_filename(&self) -> String {
        format!("{}_synthetic.zip", self.run_id)
    }

    /// Driver-side text outputs live outside the stage namespace.
    pub fn output_key(&self, file_name: &str) -> String {
        format!("{OUTPUT_PREFIX}/{}/{file_name}", self.run_id)
    }
}

/// The artifact a stage inherits when pointed at a prior run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRole {
    /// Preprocess consumes what synthesis persisted.
    Preprocess,
    /// Synthesis consumes what preprocess persisted.
    Synthesis,
}

impl InputRole {
    pub fn inherited_artifact(self) -> &'static str {
        match self {
            InputRole::Preprocess => DIGITAL_TWIN_ARTIFACT,
            InputRole::Synthesis => PROCESSED_ARTIFACT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
    Explicit,
    InheritedRun,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub key: String,
    pub origin: SourceOrigin,
}

/// Picks the input key: an explicit key wins, then the prior run's inherited artifact,
/// then the configured default dataset. Blank strings count as absent.
pub fn resolve_source_key(
    explicit: Option<&str>,
    inherited_run: Option<&str>,
    role: InputRole,
    default_key: &str,
) -> ResolvedSource {
    if let Some(key) = non_blank(explicit) {
        return ResolvedSource {
            key: key.to_string(),
            origin: SourceOrigin::Explicit,
        };
    }

    if let Some(run_id) = non_blank(inherited_run) {
        return ResolvedSource {
            key: RunLayout::new(run_id).artifact_key(role.inherited_artifact()),
            origin: SourceOrigin::InheritedRun,
        };
    }

    ResolvedSource {
        key: default_key.to_string(),
        origin: SourceOrigin::Default,
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}
