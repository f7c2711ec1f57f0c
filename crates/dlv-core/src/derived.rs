use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{parse_timestamp, EventDoc, EventKind, RunState, RunType};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSlot {
    pub id: String,
    pub timestamp: String,
}

impl EventSlot {
    pub fn parsed(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// All events of one run (events sharing a partial id), folded together.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub run_type: Option<RunType>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<EventSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<EventSlot>,
}

impl EventGroup {
    /// Fold one event in: its slot is filled when the event carries an id,
    /// the scalar fields are always overwritten.
    pub fn absorb(&mut self, id: Option<&str>, ev: &EventDoc) {
        if let Some(id) = id {
            let slot = Some(EventSlot {
                id: id.to_string(),
                timestamp: ev.timestamp.clone(),
            });
            match ev.event {
                EventKind::Start => self.start = slot,
                EventKind::Success => self.success = slot,
                EventKind::Failure => self.failure = slot,
            }
            if self.partial_id.is_none() {
                self.partial_id = Some(crate::partial_id(id).to_string());
            }
        }
        self.run_type = Some(RunType::from_stage(ev.stage.as_deref()));
        self.stage = ev.stage.clone();
        self.version = Some(ev.version.clone());
        self.repository = ev.repository.clone();
    }

    /// Shallow merge of a partial group; fields present in `other` win.
    pub fn merge(&mut self, other: EventGroup) {
        if other.partial_id.is_some() {
            self.partial_id = other.partial_id;
        }
        if other.run_type.is_some() {
            self.run_type = other.run_type;
            self.stage = other.stage;
        }
        if other.version.is_some() {
            self.version = other.version;
        }
        if other.repository.is_some() {
            self.repository = other.repository;
        }
        if other.start.is_some() {
            self.start = other.start;
        }
        if other.success.is_some() {
            self.success = other.success;
        }
        if other.failure.is_some() {
            self.failure = other.failure;
        }
    }

    /// A run ends in exactly one terminal state. If both slots ended up
    /// populated, keep the later one; ties keep the failure.
    pub fn settle_terminal(&mut self) {
        if let (Some(ok), Some(failed)) = (&self.success, &self.failure) {
            if ok.parsed() > failed.parsed() {
                self.failure = None;
            } else {
                self.success = None;
            }
        }
    }

    /// Most recent parsed timestamp over the populated slots.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        [&self.start, &self.success, &self.failure]
            .into_iter()
            .flatten()
            .filter_map(EventSlot::parsed)
            .max()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.start.as_ref().and_then(EventSlot::parsed)
    }

    /// Lifecycle state as seen at `now`. `TimedOut` is only derived here,
    /// never stored.
    pub fn state(&self, now: DateTime<Utc>, timeout: Duration) -> RunState {
        if self.success.is_some() {
            return RunState::Success;
        }
        if self.failure.is_some() {
            return RunState::Failure;
        }
        match self.started_at() {
            Some(started) if now - started > timeout => RunState::TimedOut,
            _ => RunState::Pending,
        }
    }
}

/// Currently published version of one deliverable stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInfo {
    pub stage: String,
    pub latest_version: String,
    pub timestamp: Option<String>,
    pub configuration_id: Option<String>,
    pub repository: Option<String>,
}

/// Flattened deliverable record for free-text search.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEntry {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub project: String,
}

impl SearchEntry {
    pub fn matches(&self, text: &str) -> bool {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let hit = |s: &str| s.to_lowercase().contains(&needle);
        hit(&self.slug)
            || hit(&self.name)
            || self.repository.as_deref().is_some_and(hit)
            || self.artifacts.iter().any(|a| hit(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, ts: &str, stage: Option<&str>) -> EventDoc {
        EventDoc {
            event: kind,
            project: "web@acme".into(),
            target: "api".into(),
            version: "1.0.0".into(),
            stage: stage.map(str::to_string),
            timestamp: ts.into(),
            run_id: None,
            config_id: None,
            repository: Some("git@example.com:acme/web".into()),
        }
    }

    #[test]
    fn absorb_fills_slots_and_overwrites_scalars() {
        let mut g = EventGroup::default();
        g.absorb(Some("run1/start"), &event(EventKind::Start, "2024-01-01T00:00:00Z", None));
        g.absorb(Some("run1/success"), &event(EventKind::Success, "2024-01-01T00:05:00Z", Some("prod")));
        assert_eq!(g.partial_id.as_deref(), Some("run1"));
        assert_eq!(g.start.as_ref().unwrap().id, "run1/start");
        assert_eq!(g.success.as_ref().unwrap().id, "run1/success");
        assert_eq!(g.run_type, Some(RunType::Publish));
        assert_eq!(g.stage.as_deref(), Some("prod"));
    }

    #[test]
    fn state_times_out_only_when_pending() {
        let mut g = EventGroup::default();
        g.absorb(Some("r/start"), &event(EventKind::Start, "2024-01-01T00:00:00Z", None));
        let later = parse_timestamp("2024-01-01T02:00:00Z").unwrap();
        assert_eq!(g.state(later, Duration::hours(3)), RunState::Pending);
        assert_eq!(g.state(later, Duration::hours(1)), RunState::TimedOut);
        g.absorb(Some("r/failure"), &event(EventKind::Failure, "2024-01-01T01:00:00Z", None));
        assert_eq!(g.state(later, Duration::hours(1)), RunState::Failure);
    }

    #[test]
    fn settle_keeps_later_terminal() {
        let mut g = EventGroup::default();
        g.absorb(Some("r/failure"), &event(EventKind::Failure, "2024-01-01T01:00:00Z", None));
        g.absorb(Some("r/success"), &event(EventKind::Success, "2024-01-01T02:00:00Z", None));
        g.settle_terminal();
        assert!(g.success.is_some());
        assert!(g.failure.is_none());
    }

    #[test]
    fn search_matches_any_field() {
        let entry = SearchEntry {
            slug: "acme/web/api".into(),
            name: "api".into(),
            artifacts: vec!["api-server".into()],
            repository: Some("github.com/acme/web".into()),
            project: "web@acme".into(),
        };
        assert!(entry.matches("SERVER"));
        assert!(entry.matches("github"));
        assert!(entry.matches(""));
        assert!(!entry.matches("billing"));
    }
}
