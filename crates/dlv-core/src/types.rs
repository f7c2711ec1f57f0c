use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{CoreError, DocKind, EventKind, ProjectRef};

// Fields no view keys on are decoded leniently: a value of the wrong shape
// reads as absent instead of failing the whole document.
fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Value::deserialize(d)?;
    Ok(T::deserialize(raw).ok())
}

fn lenient_or_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(d)?.unwrap_or_default())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDoc {
    pub name: String,
    pub version: String,
    pub project: String,
    #[serde(default)]
    pub build_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub uploads: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationDoc {
    pub project: String,
    pub deliverable: String,
    pub stage: String,
    pub timestamp: String,
    #[serde(default)]
    pub configuration: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliverableDoc {
    pub name: String,
    pub project: String,
    pub version: String,
    #[serde(default, deserialize_with = "lenient")]
    pub repository: Option<String>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub artifacts: Vec<String>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub publish: Vec<Value>,
    #[serde(default)]
    pub uploads: Option<Value>,
    #[serde(default)]
    pub build_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<String>,
}

/// `stage: None` marks a build event, `Some(stage)` a publish event for that stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDoc {
    pub event: EventKind,
    pub project: String,
    pub target: String,
    pub version: String,
    #[serde(default)]
    pub stage: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub run_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub config_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub repository: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Document {
    Artifact(ArtifactDoc),
    Configuration(ConfigurationDoc),
    Deliverable(DeliverableDoc),
    Event(EventDoc),
}

impl Document {
    /// `Ok(None)` for bodies whose `type` is missing or unknown; those are
    /// invisible to every view. A known `type` with bad fields is an error.
    pub fn parse(body: &Value) -> Result<Option<Self>, CoreError> {
        let Some(kind) = body.get("type").and_then(Value::as_str).and_then(DocKind::from_tag) else {
            return Ok(None);
        };
        let doc = match kind {
            DocKind::Artifact => Document::Artifact(decode(kind, body)?),
            DocKind::Configuration => Document::Configuration(decode(kind, body)?),
            DocKind::Deliverable => Document::Deliverable(decode(kind, body)?),
            DocKind::Event => Document::Event(decode(kind, body)?),
        };
        Ok(Some(doc))
    }

    pub fn kind(&self) -> DocKind {
        match self {
            Document::Artifact(_) => DocKind::Artifact,
            Document::Configuration(_) => DocKind::Configuration,
            Document::Deliverable(_) => DocKind::Deliverable,
            Document::Event(_) => DocKind::Event,
        }
    }

    pub fn project(&self) -> &str {
        match self {
            Document::Artifact(d) => &d.project,
            Document::Configuration(d) => &d.project,
            Document::Deliverable(d) => &d.project,
            Document::Event(d) => &d.project,
        }
    }

    pub fn project_ref(&self) -> Result<ProjectRef, CoreError> {
        ProjectRef::parse(self.project())
    }
}

fn decode<T: DeserializeOwned>(kind: DocKind, body: &Value) -> Result<T, CoreError> {
    T::deserialize(body).map_err(|e| CoreError::InvalidDocument {
        kind,
        reason: e.to_string(),
    })
}
