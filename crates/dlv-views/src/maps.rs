//! Map functions. Each is pure: the same document always yields the same
//! emissions, and documents of another kind yield nothing.

use dlv_core::{CoreError, Document};
use serde_json::{json, Value};

use crate::view::{Emit, MapInput};

type MapResult = Result<Vec<Emit>, CoreError>;

fn prefix(doc: &Document) -> Result<Vec<Value>, CoreError> {
    Ok(doc.project_ref()?.key_prefix())
}

fn key(doc: &Document, rest: impl IntoIterator<Item = Value>) -> Result<Vec<Value>, CoreError> {
    let mut key = prefix(doc)?;
    key.extend(rest);
    Ok(key)
}

pub fn artifacts(input: &MapInput<'_>) -> MapResult {
    let Document::Artifact(a) = input.doc else { return Ok(vec![]) };
    let key = key(input.doc, [json!(a.name), json!(a.version)])?;
    Ok(vec![Emit::new(key, json!({ "_id": input.id }))])
}

pub fn configurations(input: &MapInput<'_>) -> MapResult {
    let Document::Configuration(c) = input.doc else { return Ok(vec![]) };
    let key = key(input.doc, [json!(c.deliverable), json!(c.stage)])?;
    Ok(vec![Emit::new(key, json!({ "_id": input.id }))])
}

pub fn configurations_latest(input: &MapInput<'_>) -> MapResult {
    let Document::Configuration(c) = input.doc else { return Ok(vec![]) };
    let key = key(input.doc, [json!(c.deliverable), json!(c.stage)])?;
    Ok(vec![Emit::new(key, json!({ "_id": input.id, "timestamp": c.timestamp }))])
}

pub fn deliverables(input: &MapInput<'_>) -> MapResult {
    let Document::Deliverable(d) = input.doc else { return Ok(vec![]) };
    let key = key(input.doc, [json!(d.name), json!(d.version)])?;
    Ok(vec![Emit::new(key, json!({ "_id": input.id }))])
}

pub fn deliverables_search(input: &MapInput<'_>) -> MapResult {
    let Document::Deliverable(d) = input.doc else { return Ok(vec![]) };
    let project = input.doc.project_ref()?;
    let slug = format!("{}/{}/{}", project.customer, project.project, d.name);
    let mut key = project.key_prefix();
    key.push(json!(d.name));
    Ok(vec![Emit::new(
        key,
        json!({
            "slug": slug,
            "name": d.name,
            "artifacts": d.artifacts,
            "repository": d.repository,
            "project": d.project,
        }),
    )])
}

pub fn events(input: &MapInput<'_>) -> MapResult {
    let Document::Event(e) = input.doc else { return Ok(vec![]) };
    let mut rest = vec![json!(e.target)];
    rest.extend(e.version.split('.').map(Value::from));
    Ok(vec![Emit::new(key(input.doc, rest)?, input.body.clone())])
}

pub fn events_build(input: &MapInput<'_>) -> MapResult {
    let Document::Event(e) = input.doc else { return Ok(vec![]) };
    if e.stage.is_some() {
        return Ok(vec![]);
    }
    let key = key(input.doc, [json!(e.target), json!(e.timestamp)])?;
    Ok(vec![Emit::new(key, json!(1))])
}

pub fn events_publish(input: &MapInput<'_>) -> MapResult {
    let Document::Event(e) = input.doc else { return Ok(vec![]) };
    let Some(stage) = &e.stage else { return Ok(vec![]) };
    if e.event == dlv_core::EventKind::Start {
        return Ok(vec![]);
    }
    let key = key(input.doc, [json!(e.target), json!(stage), json!(e.timestamp)])?;
    Ok(vec![Emit::new(key, json!(e.event.label()))])
}

pub fn grouped_events(input: &MapInput<'_>) -> MapResult {
    let Document::Event(e) = input.doc else { return Ok(vec![]) };
    if input.body.get("_id").and_then(Value::as_str).is_none() {
        return Ok(vec![]);
    }
    let key = key(input.doc, [json!(e.target), json!(input.id.partial_id())])?;
    Ok(vec![Emit::new(key, input.body.clone())])
}

pub fn latest_published_version(input: &MapInput<'_>) -> MapResult {
    let Document::Event(e) = input.doc else { return Ok(vec![]) };
    let Some(stage) = &e.stage else { return Ok(vec![]) };
    if e.event != dlv_core::EventKind::Success {
        return Ok(vec![]);
    }
    let key = key(input.doc, [json!(e.target), json!(stage)])?;
    Ok(vec![Emit::new(key, json!(e.version))])
}
