//! Read models over the views: what a dashboard asks for.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dlv_core::{parse_timestamp, Document, EventGroup, EventKind, RunState, SearchEntry, StageInfo};
use dlv_storage::ViewQuery;
use dlv_views::{DELIVERABLES_SEARCH, EVENTS, GROUPED_EVENTS, LATEST_PUBLISHED_VERSION};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::Indexer;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub group: EventGroup,
    pub state: RunState,
}

impl TimelineEntry {
    fn sort_time(&self) -> Option<DateTime<Utc>> {
        self.group.started_at().or_else(|| self.group.latest_timestamp())
    }
}

impl Indexer {
    /// Runs of one target, newest first. Runs without a start sort by their
    /// latest event.
    pub fn timeline(&self, customer: &str, project: &str, target: &str, now: DateTime<Utc>) -> Result<Vec<TimelineEntry>> {
        let q = ViewQuery::prefix(vec![json!(customer), json!(project), json!(target)]).group_level(4);
        let res = self.store.query(GROUPED_EVENTS, &q)?;
        let timeout = self.cfg.timeout();
        let mut entries = res
            .rows
            .into_iter()
            .map(|row| -> Result<TimelineEntry> {
                let group: EventGroup =
                    serde_json::from_value(row.value).with_context(|| format!("decode run {}", row.key))?;
                let state = group.state(now, timeout);
                Ok(TimelineEntry { group, state })
            })
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by(|a, b| b.sort_time().cmp(&a.sort_time()));
        Ok(entries)
    }

    /// Currently published version per stage of one deliverable, with the
    /// details of the publish event that put it there.
    pub fn stages(&self, customer: &str, project: &str, deliverable: &str) -> Result<Vec<StageInfo>> {
        let base = vec![json!(customer), json!(project), json!(deliverable)];
        let latest = self
            .store
            .query(LATEST_PUBLISHED_VERSION, &ViewQuery::prefix(base.clone()).group_level(4))?;

        let mut out = Vec::with_capacity(latest.rows.len());
        for row in latest.rows {
            let (Some(stage), Some(version)) = (row.key.get(3).and_then(Value::as_str), row.value.as_str()) else {
                continue;
            };
            let mut key = base.clone();
            key.extend(version.split('.').map(Value::from));
            let events = self
                .store
                .query(EVENTS, &ViewQuery::exact(Value::Array(key)).reduce(false))?;

            let mut info = StageInfo {
                stage: stage.to_string(),
                latest_version: version.to_string(),
                timestamp: None,
                configuration_id: None,
                repository: None,
            };
            let mut best = None;
            for ev in events.rows {
                let Ok(Some(Document::Event(e))) = Document::parse(&ev.value) else {
                    continue;
                };
                if e.event != EventKind::Success || e.stage.as_deref() != Some(stage) || e.version != version {
                    continue;
                }
                let at = parse_timestamp(&e.timestamp);
                if best.is_none() || at >= best {
                    best = at;
                    info.timestamp = Some(e.timestamp);
                    info.configuration_id = e.config_id;
                    info.repository = e.repository;
                }
            }
            debug!(stage, version, "resolved stage");
            out.push(info);
        }
        Ok(out)
    }

    /// Deliverables of a customer (optionally one project) whose slug, name,
    /// repository or artifacts contain `text`, case-insensitively.
    pub fn search(&self, customer: &str, project: Option<&str>, text: &str) -> Result<Vec<SearchEntry>> {
        let mut prefix = vec![json!(customer)];
        if let Some(p) = project {
            prefix.push(json!(p));
        }
        let res = self
            .store
            .query(DELIVERABLES_SEARCH, &ViewQuery::prefix(prefix).group_level(3))?;
        let mut out = Vec::new();
        for row in res.rows {
            let entry: SearchEntry =
                serde_json::from_value(row.value).with_context(|| format!("decode search entry {}", row.key))?;
            if entry.matches(text) {
                out.push(entry);
            }
        }
        Ok(out)
    }
}
