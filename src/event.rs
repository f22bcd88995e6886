//! Trigger events and the data derived from them.
//!
//! A promotion is started by a `git-promotion.triggered` event. The event is
//! flattened into a [`FieldMap`] for marker substitution and supplies the
//! identifiers used to name the promotion branch and pull request.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type that starts a promotion.
pub const TRIGGERED_EVENT_TYPE: &str = "sh.keptn.event.git-promotion.triggered";

/// Prefix of every promotion pull request title.
pub const PULL_REQUEST_TITLE_PREFIX: &str = "keptn:";

/// Stage promoted to when the caller does not name one.
pub const DEFAULT_NEXT_STAGE: &str = "production";

/// Flattened `parent.child` view of a trigger event.
///
/// Keys are kept ordered so substitution is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMap(BTreeMap<String, String>);

impl FieldMap {
    /// Creates an empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the field map for an event.
    ///
    /// The whole event is flattened under the `data` root, so a payload field
    /// `data.project` becomes `data.data.project`. The top-level `id`,
    /// `source` and `specversion` are added unprefixed.
    pub fn from_event(event: &TriggerEvent) -> Result<Self> {
        let value = serde_json::to_value(event).context("Failed to serialize trigger event")?;
        let mut map = Self::new();
        map.flatten("data", &value);
        map.insert("id", &event.id);
        map.insert("source", &event.source);
        map.insert("specversion", &event.specversion);
        Ok(map)
    }

    /// Flattens a JSON value below `root`. Null values are skipped.
    pub fn flatten(&mut self, root: &str, value: &Value) {
        match value {
            Value::Null => {}
            Value::Object(entries) => {
                for (key, child) in entries {
                    let path = if root.is_empty() {
                        key.clone()
                    } else {
                        format!("{root}.{key}")
                    };
                    self.flatten(&path, child);
                }
            }
            Value::String(s) => self.insert(root, s),
            // Numbers, booleans and arrays keep their JSON text form
            other => self.insert(root, &other.to_string()),
        }
    }

    /// Inserts or overwrites a field.
    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    /// Returns the value of a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterates fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no fields are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Payload of a trigger event.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EventData {
    /// Project the event belongs to.
    #[serde(default)]
    pub project: String,
    /// Stage that finished.
    #[serde(default)]
    pub stage: String,
    /// Service being promoted.
    #[serde(default)]
    pub service: String,
    /// Any further payload fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A CloudEvents-style trigger event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TriggerEvent {
    /// Event identifier.
    pub id: String,
    /// Event producer.
    pub source: String,
    /// CloudEvents version attribute.
    #[serde(default = "default_spec_version")]
    pub specversion: String,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Sequence context shared by all events of one run.
    #[serde(default)]
    pub shkeptncontext: String,
    /// Commit the configuration should be read at, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitcommitid: Option<String>,
    /// Event payload.
    #[serde(default)]
    pub data: EventData,
}

fn default_spec_version() -> String {
    "1.0".to_string()
}

impl TriggerEvent {
    /// Parses an event from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse trigger event")
    }

    /// Reads and parses an event file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read event file: {}", path.as_ref().display()))?;
        Self::from_json(&content)
    }

    /// Returns true if this event should start a promotion.
    pub fn is_promotion_trigger(&self) -> bool {
        self.event_type == TRIGGERED_EVENT_TYPE
    }

    /// Returns the placeholder values used to resolve `${...}` in the config.
    pub fn placeholders(&self, next_stage: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("project".to_string(), self.data.project.clone()),
            ("stage".to_string(), self.data.stage.clone()),
            ("nextstage".to_string(), next_stage.to_string()),
            ("service".to_string(), self.data.service.clone()),
        ])
    }

    /// Returns the promotion branch name, unique per sequence context.
    pub fn branch_name(&self, next_stage: &str) -> String {
        format!(
            "promote/{}_{}-{}",
            self.data.stage, next_stage, self.shkeptncontext
        )
    }

    /// Returns the pull request title.
    pub fn pull_request_title(&self, next_stage: &str) -> String {
        format!(
            "{PULL_REQUEST_TITLE_PREFIX} Promote to stage {next_stage} (ctx: {})",
            self.shkeptncontext
        )
    }

    /// Returns the pull request body linking back to the sequence.
    pub fn pull_request_body(&self, external_url: &str) -> String {
        let ctx = &self.shkeptncontext;
        let project = &self.data.project;
        let service = &self.data.service;
        let stage = &self.data.stage;
        format!(
            "Opened by keptn sequence [{ctx}]({external_url}/bridge/project/{project}/sequence/{ctx}/stage/{stage}).\n\n\
             Project: *{project}* \nService: *{service}* \nStage: *{stage}*"
        )
    }
}

/// Status reported for a handled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The task ran to completion.
    Succeeded,
    /// The task failed with an error.
    Errored,
}

/// Result reported for a handled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskResultKind {
    /// Passed.
    Pass,
    /// Failed.
    Fail,
}

/// Task-finished data sent back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task status.
    pub status: TaskStatus,
    /// Task result.
    pub result: TaskResultKind,
    /// Human readable message.
    pub message: String,
    /// Project of the event.
    pub project: String,
    /// Stage of the event.
    pub stage: String,
    /// Service of the event.
    pub service: String,
}

impl TaskResult {
    /// A passing result for `event`.
    pub fn succeeded(event: &TriggerEvent, message: impl Into<String>) -> Self {
        Self::new(event, TaskStatus::Succeeded, TaskResultKind::Pass, message)
    }

    /// A failing result for `event` carrying the error chain.
    pub fn failed(event: &TriggerEvent, error: &anyhow::Error) -> Self {
        Self::new(
            event,
            TaskStatus::Errored,
            TaskResultKind::Fail,
            format!("{error:#}"),
        )
    }

    fn new(
        event: &TriggerEvent,
        status: TaskStatus,
        result: TaskResultKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            result,
            message: message.into(),
            project: event.data.project.clone(),
            stage: event.data.stage.clone(),
            service: event.data.service.clone(),
        }
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Errored => "errored",
        };
        write!(f, "{status}: {}", self.message)
    }
}
