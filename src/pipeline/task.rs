//! Task vocabulary: trigger events, task states and reports.

use crate::error::NarratorError;
use crate::publish::UploadResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Pipeline stage-set named by a trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "generateAudioVideo")]
    GenerateAudioVideo,
    #[serde(rename = "mergeAudioVideo")]
    MergeAudioVideo,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GenerateAudioVideo => "generateAudioVideo",
            Action::MergeAudioVideo => "mergeAudioVideo",
        }
    }

    /// Task name used in logs.
    pub fn task_name(&self) -> &'static str {
        match self {
            Action::GenerateAudioVideo => "generate_speech",
            Action::MergeAudioVideo => "merge_audio_video",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = TriggerRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generateAudioVideo" => Ok(Action::GenerateAudioVideo),
            "mergeAudioVideo" => Ok(Action::MergeAudioVideo),
            _ => Err(TriggerRejection::InvalidAction),
        }
    }
}

/// Why a trigger body was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerRejection {
    MissingFields,
    InvalidAction,
}

impl TriggerRejection {
    /// Message returned to the caller.
    pub fn message(&self) -> &'static str {
        match self {
            TriggerRejection::MissingFields => "Missing action or recordId",
            TriggerRejection::InvalidAction => "Invalid action",
        }
    }
}

impl fmt::Display for TriggerRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// An inbound request to run one task for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub action: Action,
    #[serde(rename = "recordId")]
    pub record_id: String,
}

impl TriggerEvent {
    pub fn new(action: Action, record_id: impl Into<String>) -> Self {
        Self {
            action,
            record_id: record_id.into(),
        }
    }

    /// Validate a raw JSON body.
    ///
    /// Missing, non-string or blank `action`/`recordId` is `MissingFields`;
    /// an unrecognised action is `InvalidAction`.
    pub fn from_json(body: &Value) -> Result<Self, TriggerRejection> {
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };
        let (Some(action), Some(record_id)) = (field("action"), field("recordId")) else {
            return Err(TriggerRejection::MissingFields);
        };
        Ok(Self::new(action.parse()?, record_id))
    }
}

/// Single-pass task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Started,
    Fetched,
    Processed,
    Published,
    Updated,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Started => "started",
            TaskState::Fetched => "fetched",
            TaskState::Processed => "processed",
            TaskState::Published => "published",
            TaskState::Updated => "updated",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Updated | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and logs the state of one running task.
#[derive(Debug)]
pub struct TaskProgress {
    action: Action,
    record_id: String,
    state: TaskState,
    started: Instant,
}

impl TaskProgress {
    pub fn start(action: Action, record_id: &str) -> Self {
        tracing::info!(
            task = action.task_name(),
            record_id,
            state = TaskState::Started.as_str(),
            "task state"
        );
        Self {
            action,
            record_id: record_id.to_string(),
            state: TaskState::Started,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn advance(&mut self, state: TaskState) {
        self.state = state;
        tracing::info!(
            task = self.action.task_name(),
            record_id = %self.record_id,
            state = state.as_str(),
            "task state"
        );
    }

    /// Final report for a successful run.
    pub fn succeed(mut self, upload: UploadResult) -> TaskReport {
        self.advance(TaskState::Updated);
        TaskReport {
            action: self.action,
            record_id: self.record_id,
            state: TaskState::Updated,
            failed_at: None,
            upload: Some(upload),
            error: None,
            error_kind: None,
            elapsed: self.started.elapsed(),
        }
    }

    /// Final report for a failed run; remembers the state it failed in.
    pub fn fail(self, error: &NarratorError) -> TaskReport {
        tracing::error!(
            task = self.action.task_name(),
            record_id = %self.record_id,
            state = TaskState::Failed.as_str(),
            failed_at = self.state.as_str(),
            kind = error.kind(),
            error = %error,
            "task failed"
        );
        TaskReport {
            action: self.action,
            record_id: self.record_id,
            state: TaskState::Failed,
            failed_at: Some(self.state),
            upload: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            elapsed: self.started.elapsed(),
        }
    }
}

/// Outcome of one task run, as surfaced on the queue's report channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub action: Action,
    #[serde(rename = "recordId")]
    pub record_id: String,
    pub state: TaskState,
    /// Last state reached before failing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<TaskState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(with = "elapsed_str")]
    pub elapsed: Duration,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.state == TaskState::Updated
    }
}

mod elapsed_str {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }
}
