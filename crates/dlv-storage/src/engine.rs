//! Incremental view maintenance.
//!
//! Every view keeps its emitted rows sorted by collated key (ties by doc id),
//! and a reverse index remembers which rows each document produced, so an
//! update replaces exactly the rows of the previous revision. Reduction runs
//! as a tree: leaf reduces over fixed-size chunks, then re-reduces over the
//! partials until one value is left. Reductions of whole groups are cached
//! per view until a row of that group changes.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{self, Excluded, Included, Unbounded};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use dlv_core::{collate, CoreError, DocId, Document, ViewKey};
use dlv_views::{DesignDoc, Emit, MapInput, Reducer, View, VIEWS};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{StoreError, ViewQuery, ViewResult, ViewRow};

pub const DEFAULT_LEAF_SIZE: usize = 64;

/// Stored rows sort as `Row`. `Low` and `High` only appear in range bounds,
/// placed before and after every row sharing their key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Edge {
    Low,
    Row,
    High,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RowKey {
    key: ViewKey,
    edge: Edge,
    id: DocId,
    ordinal: usize,
}

impl RowKey {
    fn bound(key: &Value, edge: Edge) -> Self {
        Self {
            key: ViewKey(key.clone()),
            edge,
            id: DocId(String::new()),
            ordinal: 0,
        }
    }
}

/// Reductions of whole groups: group level, then canonical group key.
/// Level `None` holds the reduction over the entire view.
#[derive(Default)]
struct ReduceCache {
    groups: HashMap<Option<usize>, HashMap<String, Value>>,
}

struct ViewIndex {
    name: String,
    view: View,
    rows: BTreeMap<RowKey, Value>,
    cache: Mutex<ReduceCache>,
}

impl ViewIndex {
    fn cache(&self) -> MutexGuard<'_, ReduceCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget every cached group a row with `key` belongs to.
    fn invalidate(&mut self, key: &ViewKey) {
        let cache = self.cache.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (level, groups) in cache.groups.iter_mut() {
            groups.remove(&cache_slot(&group_of(key, *level)));
        }
    }

    /// True when no stored row outside `first..=last` falls in the same group.
    fn whole_group(&self, level: Option<usize>, group_key: &Value, first: &RowKey, last: &RowKey) -> bool {
        let in_group = |rk: &RowKey| collate(&group_of(&rk.key, level), group_key) == Ordering::Equal;
        let before = self.rows.range(..first.clone()).next_back();
        let after = self.rows.range((Excluded(last.clone()), Unbounded)).next();
        !before.is_some_and(|(rk, _)| in_group(rk)) && !after.is_some_and(|(rk, _)| in_group(rk))
    }
}

fn group_of(key: &ViewKey, level: Option<usize>) -> Value {
    match level {
        Some(level) => key.prefix(level),
        None => Value::Null,
    }
}

/// Collation treats `1` and `1.0` as one key; so must the cache.
fn cache_slot(group_key: &Value) -> String {
    fn canonical(v: &Value) -> Value {
        match v {
            Value::Number(n) => n
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map_or_else(|| v.clone(), Value::Number),
            Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
            Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), canonical(v))).collect()),
            other => other.clone(),
        }
    }
    canonical(group_key).to_string()
}

/// Rows one document emitted, tagged with the position of their view.
pub type Emissions = Vec<(usize, Emit)>;

pub type Mapped = Result<Option<Emissions>, CoreError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed { rows: usize },
    /// Not a known document kind; no view looks at it.
    Ignored,
    /// Known kind but malformed; dropped from every view.
    Skipped { reason: String },
}

/// A row in storable form.
#[derive(Clone, Debug, PartialEq)]
pub struct EmittedRow {
    pub view: String,
    pub key: Value,
    pub value: Value,
}

pub struct ViewSet {
    indexes: Vec<ViewIndex>,
    by_doc: HashMap<DocId, Vec<(usize, RowKey)>>,
    leaf_size: usize,
}

impl ViewSet {
    pub fn new(design: &DesignDoc, leaf_size: usize) -> Result<Self> {
        let views = design.resolve()?;
        Ok(Self::from_views(views, leaf_size))
    }

    /// Built-in view set, no design document lookup.
    pub fn standard(leaf_size: usize) -> Self {
        Self::from_views(VIEWS.iter().map(|v| (v.name.to_string(), *v)).collect(), leaf_size)
    }

    fn from_views(views: Vec<(String, View)>, leaf_size: usize) -> Self {
        let indexes = views
            .into_iter()
            .map(|(name, view)| ViewIndex {
                name,
                view,
                rows: BTreeMap::new(),
                cache: Mutex::default(),
            })
            .collect();
        Self {
            indexes,
            by_doc: HashMap::new(),
            // a chunk size of one would never shrink the partial list
            leaf_size: leaf_size.max(2),
        }
    }

    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.iter().map(|ix| ix.name.as_str())
    }

    fn position(&self, view: &str) -> Result<usize, StoreError> {
        self.indexes
            .iter()
            .position(|ix| ix.name == view)
            .ok_or_else(|| StoreError::UnknownView(view.to_string()))
    }

    /// Run every map over one document. Pure; touches no rows.
    pub fn map_document(&self, id: &DocId, body: &Value) -> Mapped {
        let Some(doc) = Document::parse(body)? else {
            return Ok(None);
        };
        let input = MapInput { id, doc: &doc, body };
        let mut out = Vec::new();
        for (pos, ix) in self.indexes.iter().enumerate() {
            out.extend(ix.view.emit(&input)?.into_iter().map(|e| (pos, e)));
        }
        Ok(Some(out))
    }

    /// Map a batch across up to `workers` scoped threads. Results keep input order.
    pub fn map_batch(&self, docs: &[(DocId, Value)], workers: usize) -> Vec<Mapped> {
        if workers <= 1 || docs.len() < 2 {
            return docs.iter().map(|(id, body)| self.map_document(id, body)).collect();
        }
        let chunk = docs.len().div_ceil(workers);
        std::thread::scope(|s| {
            let handles: Vec<_> = docs
                .chunks(chunk)
                .map(|part| {
                    s.spawn(move || {
                        part.iter()
                            .map(|(id, body)| self.map_document(id, body))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    }

    /// Replace the rows of `id` with a fresh map result.
    pub fn apply(&mut self, id: &DocId, mapped: Mapped) -> IndexOutcome {
        self.remove(id);
        match mapped {
            Err(err) => {
                warn!(doc_id = %id, error = %err, "skipping document");
                IndexOutcome::Skipped { reason: err.to_string() }
            }
            Ok(None) => IndexOutcome::Ignored,
            Ok(Some(emissions)) => {
                let rows = emissions.len();
                for (pos, emit) in emissions {
                    self.insert_row(pos, id.clone(), emit.key, emit.value);
                }
                debug!(doc_id = %id, rows, "indexed document");
                IndexOutcome::Indexed { rows }
            }
        }
    }

    /// The rows `apply` would insert for this map result, in storable form.
    pub fn preview(&self, mapped: &Mapped) -> Vec<EmittedRow> {
        match mapped {
            Ok(Some(emissions)) => emissions
                .iter()
                .map(|(pos, emit)| EmittedRow {
                    view: self.indexes[*pos].name.clone(),
                    key: emit.key.clone(),
                    value: emit.value.clone(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn index(&mut self, id: &DocId, body: &Value) -> IndexOutcome {
        let mapped = self.map_document(id, body);
        self.apply(id, mapped)
    }

    /// Drop every row `id` emitted. Returns how many went.
    pub fn remove(&mut self, id: &DocId) -> usize {
        let Some(owned) = self.by_doc.remove(id) else {
            return 0;
        };
        let n = owned.len();
        for (pos, rk) in owned {
            let ix = &mut self.indexes[pos];
            ix.rows.remove(&rk);
            ix.invalidate(&rk.key);
        }
        n
    }

    fn insert_row(&mut self, pos: usize, id: DocId, key: Value, value: Value) {
        let owned = self.by_doc.entry(id.clone()).or_default();
        let ordinal = owned.iter().filter(|(p, _)| *p == pos).count();
        let rk = RowKey {
            key: ViewKey(key),
            edge: Edge::Row,
            id,
            ordinal,
        };
        owned.push((pos, rk.clone()));
        let ix = &mut self.indexes[pos];
        ix.invalidate(&rk.key);
        ix.rows.insert(rk, value);
    }

    /// Restore a previously persisted row without re-running the map.
    pub fn load_row(&mut self, id: DocId, row: EmittedRow) -> Result<(), StoreError> {
        let pos = self.position(&row.view)?;
        self.insert_row(pos, id, row.key, row.value);
        Ok(())
    }

    pub fn rows_of(&self, id: &DocId) -> Vec<EmittedRow> {
        self.by_doc
            .get(id)
            .map(|owned| {
                owned
                    .iter()
                    .filter_map(|(pos, rk)| {
                        let ix = &self.indexes[*pos];
                        ix.rows.get(rk).map(|value| EmittedRow {
                            view: ix.name.clone(),
                            key: rk.key.0.clone(),
                            value: value.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn total_rows(&self, view: &str) -> Result<usize, StoreError> {
        Ok(self.indexes[self.position(view)?].rows.len())
    }

    pub fn clear(&mut self) {
        for ix in &mut self.indexes {
            ix.rows.clear();
            *ix.cache.get_mut().unwrap_or_else(PoisonError::into_inner) = ReduceCache::default();
        }
        self.by_doc.clear();
    }

    pub fn query(&self, view: &str, q: &ViewQuery) -> Result<ViewResult, StoreError> {
        let ix = &self.indexes[self.position(view)?];
        let invalid = |reason: &str| StoreError::InvalidQuery {
            view: view.to_string(),
            reason: reason.to_string(),
        };

        let reduce = q.reduce.unwrap_or(ix.view.reduce.is_some());
        let grouped = q.group || q.group_level.is_some();
        if reduce && ix.view.reduce.is_none() {
            return Err(invalid("reduce requested on a view without a reducer"));
        }
        if !reduce && grouped {
            return Err(invalid("grouping requires reduce"));
        }

        let selected = select(ix, q);
        let limit = q.limit.unwrap_or(usize::MAX);

        if !reduce {
            let rows = selected
                .into_iter()
                .skip(q.skip)
                .take(limit)
                .map(|(rk, value)| ViewRow {
                    id: Some(rk.id.0.clone()),
                    key: rk.key.0.clone(),
                    value: value.clone(),
                })
                .collect();
            return Ok(ViewResult {
                total_rows: Some(ix.rows.len()),
                offset: Some(q.skip),
                rows,
            });
        }

        let Some(reducer) = ix.view.reduce else {
            return Err(invalid("reduce requested on a view without a reducer"));
        };
        let level = grouped.then(|| if q.group { usize::MAX } else { q.group_level.unwrap_or(0) });
        let mut rows = Vec::new();
        let mut current: Option<(Value, Vec<(&RowKey, &Value)>)> = None;
        for (rk, value) in selected {
            let group_key = group_of(&rk.key, level);
            let same = matches!(&current, Some((k, _)) if collate(k, &group_key) == Ordering::Equal);
            if same {
                if let Some((_, members)) = current.as_mut() {
                    members.push((rk, value));
                }
            } else if let Some((key, members)) = current.replace((group_key, vec![(rk, value)])) {
                rows.push(self.reduce_group(ix, reducer, level, key, members, q.descending));
            }
        }
        if let Some((key, members)) = current {
            rows.push(self.reduce_group(ix, reducer, level, key, members, q.descending));
        }

        Ok(ViewResult {
            total_rows: None,
            offset: None,
            rows: rows.into_iter().skip(q.skip).take(limit).collect(),
        })
    }

    /// Reduce one group in ascending key order. Groups the query range does
    /// not cut are served from, and stored into, the view's cache.
    fn reduce_group(
        &self,
        ix: &ViewIndex,
        reducer: Reducer,
        level: Option<usize>,
        key: Value,
        mut members: Vec<(&RowKey, &Value)>,
        descending: bool,
    ) -> ViewRow {
        if descending {
            members.reverse();
        }
        let whole = match (members.first(), members.last()) {
            (Some((first, _)), Some((last, _))) => ix.whole_group(level, &key, first, last),
            _ => false,
        };
        let slot = cache_slot(&key);
        if whole {
            if let Some(value) = ix.cache().groups.get(&level).and_then(|g| g.get(&slot)) {
                return ViewRow {
                    id: None,
                    key,
                    value: value.clone(),
                };
            }
        }
        let values: Vec<Value> = members.into_iter().map(|(_, v)| v.clone()).collect();
        let value = reduce_tree(reducer, &values, self.leaf_size);
        if whole {
            ix.cache().groups.entry(level).or_default().insert(slot, value.clone());
        }
        ViewRow { id: None, key, value }
    }
}

/// Rows inside the query range, in scan order. Only the range is visited.
fn select<'a>(ix: &'a ViewIndex, q: &ViewQuery) -> Vec<(&'a RowKey, &'a Value)> {
    let (start, end) = match &q.key {
        Some(k) => (Some(k), Some(k)),
        None => (q.start_key.as_ref(), q.end_key.as_ref()),
    };
    let inclusive_end = q.inclusive_end || q.key.is_some();
    let end_bound = |e: &Value, toward: Edge, past: Edge| {
        if inclusive_end {
            Included(RowKey::bound(e, toward))
        } else {
            Excluded(RowKey::bound(e, past))
        }
    };
    // in ascending terms: `lower` is where the scan starts, `upper` where it stops
    let (lower, upper) = if q.descending {
        (
            end.map(|e| end_bound(e, Edge::Low, Edge::High)),
            start.map(|s| Included(RowKey::bound(s, Edge::High))),
        )
    } else {
        (
            start.map(|s| Included(RowKey::bound(s, Edge::Low))),
            end.map(|e| end_bound(e, Edge::High, Edge::Low)),
        )
    };
    let lower = lower.unwrap_or(Unbounded);
    let upper = upper.unwrap_or(Unbounded);
    if let (Included(lo) | Excluded(lo), Included(hi) | Excluded(hi)) = (&lower, &upper) {
        if lo > hi {
            return Vec::new();
        }
    }
    let rows = ix.rows.range::<RowKey, (Bound<RowKey>, Bound<RowKey>)>((lower, upper));
    if q.descending {
        rows.rev().collect()
    } else {
        rows.collect()
    }
}

/// Leaf-reduce `values` in chunks of `leaf_size`, then re-reduce the partials
/// level by level.
pub fn reduce_tree(reducer: Reducer, values: &[Value], leaf_size: usize) -> Value {
    let leaf_size = leaf_size.max(2);
    if values.is_empty() {
        return reducer.apply(&[], false);
    }
    let mut level: Vec<Value> = values.chunks(leaf_size).map(|c| reducer.apply(c, false)).collect();
    while level.len() > 1 {
        level = level.chunks(leaf_size).map(|c| reducer.apply(c, true)).collect();
    }
    level.pop().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str, kind: &str, ts: &str, stage: Option<&str>) -> (DocId, Value) {
        (
            DocId::from_str(id),
            json!({
                "_id": id,
                "type": "event",
                "event": kind,
                "project": "web@acme",
                "target": "api",
                "version": "1.0.0",
                "stage": stage,
                "timestamp": ts
            }),
        )
    }

    #[test]
    fn update_replaces_previous_rows() {
        let mut set = ViewSet::standard(DEFAULT_LEAF_SIZE);
        let (id, body) = event("r/start", "start", "2024-01-01T00:00:00Z", None);
        set.index(&id, &body);
        assert_eq!(set.total_rows("events-build").unwrap(), 1);

        let (_, published) = event("r/start", "start", "2024-01-01T00:00:00Z", Some("prod"));
        set.index(&id, &published);
        assert_eq!(set.total_rows("events-build").unwrap(), 0);
        assert_eq!(set.total_rows("events").unwrap(), 1);
    }

    #[test]
    fn malformed_document_is_skipped_everywhere() {
        let mut set = ViewSet::standard(DEFAULT_LEAF_SIZE);
        let (id, mut body) = event("r/start", "start", "2024-01-01T00:00:00Z", None);
        set.index(&id, &body);
        body["project"] = json!("no-customer");
        let outcome = set.index(&id, &body);
        assert!(matches!(outcome, IndexOutcome::Skipped { .. }));
        assert!(set.rows_of(&id).is_empty());
        assert_eq!(set.total_rows("events").unwrap(), 0);
    }

    #[test]
    fn unknown_kind_is_ignored() {
        let mut set = ViewSet::standard(DEFAULT_LEAF_SIZE);
        let outcome = set.index(&DocId::from_str("x"), &json!({"type": "note", "project": "web@acme"}));
        assert_eq!(outcome, IndexOutcome::Ignored);
        for name in set.view_names().map(str::to_string).collect::<Vec<_>>() {
            assert_eq!(set.total_rows(&name).unwrap(), 0);
        }
    }

    #[test]
    fn reduce_tree_matches_flat_count() {
        let values: Vec<Value> = (0..1000).map(|i| json!(i)).collect();
        assert_eq!(reduce_tree(Reducer::Count, &values, 7), json!(1000));
        assert_eq!(reduce_tree(Reducer::Count, &values, 1), json!(1000));
        assert_eq!(reduce_tree(Reducer::Count, &[], 7), json!(0));
    }

    #[test]
    fn grouped_query_yields_one_row_per_run() {
        let mut set = ViewSet::standard(2);
        for (id, body) in [
            event("run1/start", "start", "2024-01-01T00:00:00Z", None),
            event("run1/success", "success", "2024-01-01T00:01:00Z", None),
            event("run2/start", "start", "2024-01-01T00:02:00Z", None),
        ] {
            set.index(&id, &body);
        }
        let res = set
            .query("grouped-events", &ViewQuery::prefix(vec![json!("acme"), json!("web")]).group_level(4))
            .unwrap();
        assert_eq!(res.rows.len(), 2);
        assert_eq!(res.rows[0].key, json!(["acme", "web", "api", "run1"]));
        assert!(res.rows[0].value.get("success").is_some());
        assert!(res.rows[1].value.get("success").is_none());
    }

    #[test]
    fn range_descending_and_limits() {
        let mut set = ViewSet::standard(DEFAULT_LEAF_SIZE);
        for (id, body) in [
            event("a/1", "start", "2024-01-01T00:00:00Z", None),
            event("b/1", "start", "2024-01-02T00:00:00Z", None),
            event("c/1", "start", "2024-01-03T00:00:00Z", None),
        ] {
            set.index(&id, &body);
        }
        let q = ViewQuery::prefix(vec![json!("acme"), json!("web"), json!("api")]).reduce(false);
        let asc = set.query("events-build", &q).unwrap();
        assert_eq!(asc.rows.len(), 3);
        assert_eq!(asc.total_rows, Some(3));
        assert_eq!(asc.rows[0].id.as_deref(), Some("a/1"));

        let desc = set.query("events-build", &q.clone().descending().limit(2)).unwrap();
        assert_eq!(desc.rows.len(), 2);
        assert_eq!(desc.rows[0].id.as_deref(), Some("c/1"));

        let mut exclusive = q.clone();
        exclusive.end_key = Some(json!(["acme", "web", "api", "2024-01-03T00:00:00Z"]));
        exclusive.inclusive_end = false;
        assert_eq!(set.query("events-build", &exclusive).unwrap().rows.len(), 2);
    }

    #[test]
    fn invalid_queries_are_rejected() {
        let set = ViewSet::standard(DEFAULT_LEAF_SIZE);
        assert!(matches!(
            set.query("artifacts", &ViewQuery::default().reduce(true)),
            Err(StoreError::InvalidQuery { .. })
        ));
        assert!(matches!(
            set.query("events", &ViewQuery::default().reduce(false).group_level(2)),
            Err(StoreError::InvalidQuery { .. })
        ));
        assert_eq!(
            set.query("nope", &ViewQuery::default()),
            Err(StoreError::UnknownView("nope".into()))
        );
    }

    #[test]
    fn map_batch_keeps_order() {
        let set = ViewSet::standard(DEFAULT_LEAF_SIZE);
        let docs: Vec<(DocId, Value)> = (0..20)
            .map(|i| event(&format!("r{i}/start"), "start", "2024-01-01T00:00:00Z", None))
            .collect();
        let mapped = set.map_batch(&docs, 4);
        assert_eq!(mapped.len(), 20);
        for (i, m) in mapped.iter().enumerate() {
            let emissions = m.as_ref().unwrap().as_ref().unwrap();
            let (_, grouped) = emissions
                .iter()
                .find(|(pos, _)| set.indexes[*pos].name == "grouped-events")
                .unwrap();
            assert_eq!(grouped.key[3], json!(format!("r{i}")));
        }
    }

    fn build_key(target: &str, ts: &str) -> Value {
        json!(["acme", "web", target, ts])
    }

    #[test]
    fn range_scan_honours_bounds_in_both_directions() {
        let mut set = ViewSet::standard(DEFAULT_LEAF_SIZE);
        for (i, target) in ["aaa", "api", "zzz"].iter().enumerate() {
            for day in 1..=4 {
                let id = format!("{target}/{day}");
                let (_, mut body) = event(&id, "start", &format!("2024-01-0{day}T00:00:00Z"), None);
                body["target"] = json!(target);
                set.index(&DocId::from_str(&id), &body);
            }
            assert_eq!(set.total_rows("events-build").unwrap(), (i + 1) * 4);
        }
        let ts = |day: u32| format!("2024-01-0{day}T00:00:00Z");

        let mut q = ViewQuery::default().reduce(false);
        q.start_key = Some(build_key("api", &ts(2)));
        q.end_key = Some(build_key("api", &ts(3)));
        let ids: Vec<_> = set.query("events-build", &q).unwrap().rows.into_iter().filter_map(|r| r.id).collect();
        assert_eq!(ids, ["api/2", "api/3"]);

        let mut desc = q.clone().descending();
        desc.inclusive_end = false;
        let ids: Vec<_> = set.query("events-build", &desc).unwrap().rows.into_iter().filter_map(|r| r.id).collect();
        assert_eq!(ids, ["api/3"]);

        let exact = ViewQuery::exact(build_key("api", &ts(4))).reduce(false);
        let ids: Vec<_> = set.query("events-build", &exact).unwrap().rows.into_iter().filter_map(|r| r.id).collect();
        assert_eq!(ids, ["api/4"]);

        // start past end selects nothing instead of panicking
        let mut inverted = ViewQuery::default().reduce(false);
        inverted.start_key = Some(build_key("zzz", &ts(1)));
        inverted.end_key = Some(build_key("aaa", &ts(1)));
        assert!(set.query("events-build", &inverted).unwrap().rows.is_empty());

        let mut span = ViewQuery::default().reduce(false);
        span.start_key = Some(build_key("aaa", &ts(1)));
        span.end_key = Some(build_key("zzz", &ts(1)));
        assert_eq!(set.query("events-build", &span).unwrap().rows.len(), 9);
        let desc = set.query("events-build", &span.descending()).unwrap();
        assert_eq!(desc.rows.len(), 9);
        assert_eq!(desc.rows[0].id.as_deref(), Some("zzz/1"));
        assert_eq!(desc.rows[8].id.as_deref(), Some("aaa/1"));
    }

    #[test]
    fn whole_groups_are_cached_until_their_rows_change() {
        let mut set = ViewSet::standard(2);
        for (id, body) in [
            event("run1/start", "start", "2024-01-01T00:00:00Z", None),
            event("run2/start", "start", "2024-01-01T00:02:00Z", None),
        ] {
            set.index(&id, &body);
        }
        let pos = set.position("grouped-events").unwrap();
        let q = ViewQuery::prefix(vec![json!("acme"), json!("web")]).group_level(4);
        let first = set.query("grouped-events", &q).unwrap();
        assert_eq!(set.indexes[pos].cache().groups.get(&Some(4)).map(HashMap::len), Some(2));
        assert_eq!(set.query("grouped-events", &q).unwrap(), first);

        let (id, body) = event("run1/success", "success", "2024-01-01T00:01:00Z", None);
        set.index(&id, &body);
        assert_eq!(set.indexes[pos].cache().groups.get(&Some(4)).map(HashMap::len), Some(1));
        let after = set.query("grouped-events", &q).unwrap();
        assert!(after.rows[0].value.get("success").is_some());
        assert_eq!(after.rows[1], first.rows[1]);

        set.remove(&id);
        assert_eq!(set.query("grouped-events", &q).unwrap(), first);
    }

    #[test]
    fn cut_groups_are_not_cached() {
        let mut set = ViewSet::standard(DEFAULT_LEAF_SIZE);
        for day in 1..=3 {
            let (id, body) = event(&format!("r{day}/start"), "start", &format!("2024-01-0{day}T00:00:00Z"), None);
            set.index(&id, &body);
        }
        let pos = set.position("events-build").unwrap();
        let mut q = ViewQuery::default().group_level(3);
        q.start_key = Some(build_key("api", "2024-01-02T00:00:00Z"));
        assert_eq!(set.query("events-build", &q).unwrap().rows[0].value, json!(2));
        assert!(set.indexes[pos].cache().groups.values().all(HashMap::is_empty));

        let whole = ViewQuery::default().group_level(3);
        assert_eq!(set.query("events-build", &whole).unwrap().rows[0].value, json!(3));
        assert_eq!(set.indexes[pos].cache().groups.get(&Some(3)).map(HashMap::len), Some(1));
        assert_eq!(set.query("events-build", &ViewQuery::default()).unwrap().rows[0].value, json!(3));
        assert!(set.indexes[pos].cache().groups.contains_key(&None));
    }
}
