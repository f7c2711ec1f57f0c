use dlv_core::DocId;
use dlv_views::DesignDoc;
use serde_json::Value;

use crate::{IndexOutcome, StoreError, ViewQuery, ViewResult};

#[derive(Clone, Debug, PartialEq)]
pub struct StoredDoc {
    pub id: DocId,
    pub seq: u64,
    pub body: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PutOutcome {
    pub id: DocId,
    pub seq: u64,
    /// A document with this id already existed.
    pub updated: bool,
    pub index: IndexOutcome,
}

pub trait DocumentStore: Send + Sync {
    fn design(&self) -> &DesignDoc;

    /// Insert or replace a document and bring every view up to date with it.
    /// A missing `_id` is generated.
    fn put(&self, body: Value) -> anyhow::Result<PutOutcome>;

    fn put_batch(&self, bodies: Vec<Value>) -> anyhow::Result<Vec<PutOutcome>> {
        bodies.into_iter().map(|b| self.put(b)).collect()
    }

    fn get(&self, id: &DocId) -> anyhow::Result<Option<StoredDoc>>;

    /// Returns false when there was nothing to remove.
    fn remove(&self, id: &DocId) -> anyhow::Result<bool>;

    fn doc_count(&self) -> anyhow::Result<usize>;

    fn query(&self, view: &str, q: &ViewQuery) -> anyhow::Result<ViewResult>;

    fn query_batch(&self, view: &str, queries: &[ViewQuery]) -> anyhow::Result<Vec<ViewResult>> {
        queries.iter().map(|q| self.query(view, q)).collect()
    }
}

/// Validate a raw body and pin its `_id`, generating one when absent.
pub fn prepare_document(mut body: Value) -> Result<(DocId, Value), StoreError> {
    let Value::Object(fields) = &mut body else {
        return Err(StoreError::NotAnObject);
    };
    let id = match fields.get("_id") {
        None | Some(Value::Null) => DocId::new(),
        Some(Value::String(s)) if !s.is_empty() => DocId::from_str(s.clone()),
        Some(_) => return Err(StoreError::BadId),
    };
    fields.insert("_id".to_string(), Value::String(id.0.clone()));
    Ok((id, body))
}
