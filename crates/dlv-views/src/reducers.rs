//! Reduce functions. Every reducer accepts its own output when called with
//! `rereduce = true`, so the engine can fold partial results in any tree shape.

use dlv_core::{epoch, max_version, parse_timestamp, Document, EventGroup};
use serde_json::{Map, Value};

/// Value with the greatest `timestamp`; ties go to the later value.
/// Unparseable timestamps never win. `null` when nothing qualifies.
pub fn latest_configuration(values: &[Value], _rereduce: bool) -> Value {
    let mut latest_at = epoch();
    let mut latest: Option<&Value> = None;
    for value in values {
        let Some(at) = value.get("timestamp").and_then(Value::as_str).and_then(parse_timestamp) else {
            continue;
        };
        if at >= latest_at {
            latest_at = at;
            latest = Some(value);
        }
    }
    latest.cloned().unwrap_or(Value::Null)
}

/// Shallow merge of object values in order; later fields overwrite earlier ones.
pub fn merge_objects(values: &[Value], _rereduce: bool) -> Value {
    let mut out = Map::new();
    for value in values {
        if let Value::Object(fields) = value {
            for (k, v) in fields {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    Value::Object(out)
}

/// Highest version string among the values, starting from `0.0.0`.
/// Non-string values are ignored.
pub fn latest_version(values: &[Value], _rereduce: bool) -> Value {
    Value::from(max_version(values.iter().filter_map(Value::as_str)))
}

/// Fold the events of one run into an [`EventGroup`].
///
/// Leaf inputs are event documents and are ordered by parsed timestamp
/// before folding, so the scalar fields reflect the chronologically last
/// event rather than whatever order the engine handed over. Re-reduce inputs
/// are partial groups, ordered by their latest slot before merging.
pub fn group_events(values: &[Value], rereduce: bool) -> Value {
    let mut group = if rereduce { merge_groups(values) } else { fold_events(values) };
    group.settle_terminal();
    serde_json::to_value(group).unwrap_or(Value::Null)
}

fn fold_events(values: &[Value]) -> EventGroup {
    let mut events: Vec<_> = values
        .iter()
        .filter_map(|v| match Document::parse(v) {
            Ok(Some(Document::Event(ev))) => {
                let id = v.get("_id").and_then(Value::as_str);
                Some((parse_timestamp(&ev.timestamp), id, ev))
            }
            _ => None,
        })
        .collect();
    events.sort_by_key(|(at, _, _)| *at);

    let mut group = EventGroup::default();
    for (_, id, ev) in &events {
        group.absorb(*id, ev);
    }
    group
}

fn merge_groups(values: &[Value]) -> EventGroup {
    let mut partials: Vec<EventGroup> = values
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect();
    partials.sort_by_key(EventGroup::latest_timestamp);

    let mut group = EventGroup::default();
    for partial in partials {
        group.merge(partial);
    }
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlv_core::RunType;
    use serde_json::json;

    fn event(id: &str, kind: &str, ts: &str, stage: Option<&str>) -> Value {
        json!({
            "_id": id,
            "type": "event",
            "event": kind,
            "project": "web@acme",
            "target": "api",
            "version": "1.0.0",
            "stage": stage,
            "timestamp": ts,
            "repository": "github.com/acme/web"
        })
    }

    #[test]
    fn latest_configuration_picks_max_timestamp() {
        let values = vec![
            json!({"_id": "c1", "timestamp": "2024-01-02T00:00:00Z"}),
            json!({"_id": "c2", "timestamp": "2024-01-03T00:00:00Z"}),
            json!({"_id": "c3", "timestamp": "2024-01-01T00:00:00Z"}),
        ];
        assert_eq!(latest_configuration(&values, false)["_id"], json!("c2"));
    }

    #[test]
    fn latest_configuration_tie_goes_to_later_value() {
        let values = vec![
            json!({"_id": "c1", "timestamp": "2024-01-03T00:00:00Z"}),
            json!({"_id": "c2", "timestamp": "2024-01-03T00:00:00Z"}),
        ];
        assert_eq!(latest_configuration(&values, false)["_id"], json!("c2"));
    }

    #[test]
    fn latest_configuration_rereduces_its_output() {
        let a = latest_configuration(&[json!({"_id": "c1", "timestamp": "2024-01-01T00:00:00Z"})], false);
        let b = latest_configuration(&[json!({"_id": "c2", "timestamp": "2024-02-01T00:00:00Z"})], false);
        assert_eq!(latest_configuration(&[b, a], true)["_id"], json!("c2"));
        assert_eq!(latest_configuration(&[json!({"_id": "x", "timestamp": "never"})], false), Value::Null);
    }

    #[test]
    fn merge_objects_later_fields_win() {
        let merged = merge_objects(&[json!({"name": "a"}), json!({"repository": "r"})], false);
        assert_eq!(merged, json!({"name": "a", "repository": "r"}));
        let merged = merge_objects(&[json!({"name": "a"}), json!({"name": "b"})], true);
        assert_eq!(merged, json!({"name": "b"}));
    }

    #[test]
    fn latest_version_ignores_non_strings() {
        let values = vec![json!("0.0.0"), json!("2.0.0"), json!(7), json!("1.9.0"), json!(null)];
        assert_eq!(latest_version(&values, false), json!("2.0.0"));
        assert_eq!(latest_version(&[], false), json!("0.0.0"));
        assert_eq!(latest_version(&[json!("1.2.3"), json!("1.2.3-rc1")], true), json!("1.2.3"));
    }

    #[test]
    fn group_events_leaf_fold() {
        let values = vec![
            event("run1/start", "start", "2024-01-01T00:00:00Z", None),
            event("run1/success", "success", "2024-01-01T00:10:00Z", Some("prod")),
        ];
        let group: EventGroup = serde_json::from_value(group_events(&values, false)).unwrap();
        assert_eq!(group.start.unwrap().timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(group.success.unwrap().id, "run1/success");
        assert!(group.failure.is_none());
        assert_eq!(group.run_type, Some(RunType::Publish));
        assert_eq!(group.stage.as_deref(), Some("prod"));
        assert_eq!(group.partial_id.as_deref(), Some("run1"));
    }

    #[test]
    fn group_events_leaf_orders_by_timestamp() {
        // success handed over before start: scalars still come from the success
        let values = vec![
            event("run1/success", "success", "2024-01-01T00:10:00Z", Some("prod")),
            event("run1/start", "start", "2024-01-01T00:00:00Z", None),
        ];
        let group: EventGroup = serde_json::from_value(group_events(&values, false)).unwrap();
        assert_eq!(group.stage.as_deref(), Some("prod"));
    }

    #[test]
    fn group_events_rereduce_merges_partials() {
        let start = group_events(&[event("run1/start", "start", "2024-01-01T00:00:00Z", None)], false);
        let done = group_events(&[event("run1/failure", "failure", "2024-01-01T00:02:00Z", None)], false);
        let group: EventGroup = serde_json::from_value(group_events(&[done, start], true)).unwrap();
        assert!(group.start.is_some());
        assert!(group.failure.is_some());
        assert_eq!(group.run_type, Some(RunType::Build));
        assert_eq!(group.stage, None);
    }

    #[test]
    fn group_events_skips_foreign_values() {
        let values = vec![json!(1), json!({"type": "artifact"}), event("r/start", "start", "2024-01-01T00:00:00Z", None)];
        let group: EventGroup = serde_json::from_value(group_events(&values, false)).unwrap();
        assert!(group.start.is_some());
    }
}
