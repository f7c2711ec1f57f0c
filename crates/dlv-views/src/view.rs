use dlv_core::{CoreError, DocId, Document};
use serde_json::{json, Value};

use crate::{maps, reducers};

pub const ARTIFACTS: &str = "artifacts";
pub const CONFIGURATIONS: &str = "configurations";
pub const CONFIGURATIONS_LATEST: &str = "configurations-latest";
pub const DELIVERABLES: &str = "deliverables";
pub const DELIVERABLES_SEARCH: &str = "deliverables-search";
pub const EVENTS: &str = "events";
pub const EVENTS_BUILD: &str = "events-build";
pub const EVENTS_PUBLISH: &str = "events-publish";
pub const GROUPED_EVENTS: &str = "grouped-events";
pub const LATEST_PUBLISHED_VERSION: &str = "latest-published-version";

/// One `(key, value)` pair produced by a map function.
#[derive(Clone, Debug, PartialEq)]
pub struct Emit {
    pub key: Value,
    pub value: Value,
}

impl Emit {
    pub fn new(key: Vec<Value>, value: Value) -> Self {
        Self {
            key: Value::Array(key),
            value,
        }
    }
}

/// What a map function sees: the typed document plus the raw stored body
/// (which carries `_id`).
#[derive(Clone, Copy, Debug)]
pub struct MapInput<'a> {
    pub id: &'a DocId,
    pub doc: &'a Document,
    pub body: &'a Value,
}

pub type MapFn = fn(&MapInput<'_>) -> Result<Vec<Emit>, CoreError>;

/// `rereduce == false`: values are map outputs. `rereduce == true`: values
/// are outputs of this same function.
pub type ReduceFn = fn(&[Value], bool) -> Value;

#[derive(Clone, Copy, Debug)]
pub enum Reducer {
    /// Built-in `_count`.
    Count,
    Custom { name: &'static str, f: ReduceFn },
}

impl Reducer {
    pub fn name(&self) -> &'static str {
        match self {
            Reducer::Count => "_count",
            Reducer::Custom { name, .. } => *name,
        }
    }

    pub fn apply(&self, values: &[Value], rereduce: bool) -> Value {
        match self {
            Reducer::Count if rereduce => json!(values.iter().filter_map(Value::as_u64).sum::<u64>()),
            Reducer::Count => json!(values.len()),
            Reducer::Custom { f, .. } => f(values, rereduce),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        if name == "_count" {
            return Some(Reducer::Count);
        }
        VIEWS
            .iter()
            .filter_map(|v| v.reduce)
            .find(|r| r.name() == name)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct View {
    pub name: &'static str,
    pub map: MapFn,
    pub reduce: Option<Reducer>,
}

impl View {
    pub fn emit(&self, input: &MapInput<'_>) -> Result<Vec<Emit>, CoreError> {
        (self.map)(input)
    }
}

pub static VIEWS: [View; 10] = [
    View { name: ARTIFACTS, map: maps::artifacts, reduce: None },
    View { name: CONFIGURATIONS, map: maps::configurations, reduce: None },
    View {
        name: CONFIGURATIONS_LATEST,
        map: maps::configurations_latest,
        reduce: Some(Reducer::Custom { name: "latest_configuration", f: reducers::latest_configuration }),
    },
    View { name: DELIVERABLES, map: maps::deliverables, reduce: Some(Reducer::Count) },
    View {
        name: DELIVERABLES_SEARCH,
        map: maps::deliverables_search,
        reduce: Some(Reducer::Custom { name: "merge_objects", f: reducers::merge_objects }),
    },
    View { name: EVENTS, map: maps::events, reduce: Some(Reducer::Count) },
    View { name: EVENTS_BUILD, map: maps::events_build, reduce: Some(Reducer::Count) },
    View { name: EVENTS_PUBLISH, map: maps::events_publish, reduce: Some(Reducer::Count) },
    View {
        name: GROUPED_EVENTS,
        map: maps::grouped_events,
        reduce: Some(Reducer::Custom { name: "group_events", f: reducers::group_events }),
    },
    View {
        name: LATEST_PUBLISHED_VERSION,
        map: maps::latest_published_version,
        reduce: Some(Reducer::Custom { name: "latest_version", f: reducers::latest_version }),
    },
];

pub fn find_view(name: &str) -> Option<&'static View> {
    VIEWS.iter().find(|v| v.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_reduces_and_rereduces() {
        let leaf = Reducer::Count.apply(&[json!({"a": 1}), json!(2), json!(null)], false);
        assert_eq!(leaf, json!(3));
        assert_eq!(Reducer::Count.apply(&[json!(3), json!(4)], true), json!(7));
    }

    #[test]
    fn view_names_are_unique() {
        let mut names: Vec<_> = VIEWS.iter().map(|v| v.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), VIEWS.len());
    }

    #[test]
    fn reducers_resolve_by_name() {
        assert!(matches!(Reducer::by_name("_count"), Some(Reducer::Count)));
        assert_eq!(Reducer::by_name("group_events").map(|r| r.name()), Some("group_events"));
        assert!(Reducer::by_name("_sum").is_none());
    }
}
