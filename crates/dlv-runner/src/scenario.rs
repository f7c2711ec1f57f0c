use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use dlv_core::{parse_timestamp, RunState};
use dlv_storage::{InMemoryStore, ViewQuery};
use dlv_views::DesignDoc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{Config, IngestReport, Indexer};

#[derive(Debug, Deserialize)]
pub struct ScenarioExpected {
    pub scenario_id: String,
    /// Clock used to derive timed-out runs.
    pub now: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub ingest: ExpectedIngest,
    #[serde(default)]
    pub timelines: Vec<ExpectedTimeline>,
    #[serde(default)]
    pub stages: Vec<ExpectedStages>,
    #[serde(default)]
    pub counts: Vec<ExpectedCount>,
    #[serde(default)]
    pub searches: Vec<ExpectedSearch>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct ExpectedIngest {
    pub documents: usize,
    pub indexed: usize,
    pub ignored: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
pub struct ExpectedTimeline {
    pub customer: String,
    pub project: String,
    pub target: String,
    /// Run states, newest run first.
    pub states: Vec<RunState>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectedStages {
    pub customer: String,
    pub project: String,
    pub deliverable: String,
    pub versions: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectedCount {
    pub view: String,
    pub prefix: Vec<String>,
    pub group_level: usize,
    pub values: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectedSearch {
    pub customer: String,
    #[serde(default)]
    pub project: Option<String>,
    pub text: String,
    pub slugs: Vec<String>,
}

/// What replaying a scenario produced, in the same shape as the expectations.
#[derive(Debug)]
pub struct ScenarioResult {
    pub report: IngestReport,
    pub timelines: Vec<Vec<RunState>>,
    pub stages: Vec<BTreeMap<String, String>>,
    pub counts: Vec<Vec<Value>>,
    pub searches: Vec<Vec<String>>,
}

pub fn scenario_dir(id: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/scenarios").join(id)
}

pub fn load_expected(dir: &Path) -> Result<ScenarioExpected> {
    let p = dir.join("expected.yaml");
    let s = std::fs::read_to_string(&p).with_context(|| format!("read expected.yaml: {}", p.display()))?;
    let exp: ScenarioExpected = serde_yaml::from_str(&s).with_context(|| "parse expected.yaml")?;
    Ok(exp)
}

/// Replay `documents.jsonl` into a fresh in-memory store, then ask every
/// question `expected.yaml` has an answer for.
pub fn simulate(dir: &Path) -> Result<ScenarioResult> {
    let exp = load_expected(dir)?;
    let now: DateTime<Utc> =
        parse_timestamp(&exp.now).ok_or_else(|| anyhow!("bad `now` in {}: {}", exp.scenario_id, exp.now))?;

    let mut cfg = Config::default_for_repo(&exp.scenario_id);
    cfg.store.backend = "memory".into();
    if let Some(secs) = exp.timeout_secs {
        cfg.events.timeout_secs = secs;
    }
    let store = InMemoryStore::open(DesignDoc::standard(&exp.scenario_id), 2, 2)?;
    let indexer = Indexer::with_store(dir.to_path_buf(), cfg, Box::new(store));

    let report = indexer.ingest_path(&dir.join("documents.jsonl"))?;

    let mut timelines = Vec::new();
    for t in &exp.timelines {
        let entries = indexer.timeline(&t.customer, &t.project, &t.target, now)?;
        timelines.push(entries.into_iter().map(|e| e.state).collect());
    }

    let mut stages = Vec::new();
    for s in &exp.stages {
        let infos = indexer.stages(&s.customer, &s.project, &s.deliverable)?;
        stages.push(infos.into_iter().map(|i| (i.stage, i.latest_version)).collect());
    }

    let mut counts = Vec::new();
    for c in &exp.counts {
        let prefix = c.prefix.iter().map(|p| json!(p)).collect();
        let res = indexer.query(&c.view, &ViewQuery::prefix(prefix).group_level(c.group_level))?;
        counts.push(res.rows.into_iter().map(|r| r.value).collect());
    }

    let mut searches = Vec::new();
    for s in &exp.searches {
        let found = indexer.search(&s.customer, s.project.as_deref(), &s.text)?;
        searches.push(found.into_iter().map(|e| e.slug).collect());
    }

    Ok(ScenarioResult {
        report,
        timelines,
        stages,
        counts,
        searches,
    })
}
