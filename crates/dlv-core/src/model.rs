use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    Artifact,
    Configuration,
    Deliverable,
    Event,
}

impl DocKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "artifact" => Some(DocKind::Artifact),
            "configuration" => Some(DocKind::Configuration),
            "deliverable" => Some(DocKind::Deliverable),
            "event" => Some(DocKind::Event),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::Artifact => "artifact",
            DocKind::Configuration => "configuration",
            DocKind::Deliverable => "deliverable",
            DocKind::Event => "event",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Success,
    Failure,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Success => "success",
            EventKind::Failure => "failure",
        }
    }

    /// Upper-case label used by the publish-event index.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Start => "START",
            EventKind::Success => "SUCCESS",
            EventKind::Failure => "FAILURE",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Build,
    Publish,
}

impl RunType {
    /// An empty stage name counts as a build here even though the indexes
    /// only test for presence.
    pub fn from_stage(stage: Option<&str>) -> Self {
        match stage {
            Some(s) if !s.is_empty() => RunType::Publish,
            _ => RunType::Build,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Success,
    Failure,
    TimedOut,
}
