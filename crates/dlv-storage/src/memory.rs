use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use dlv_core::DocId;
use dlv_views::DesignDoc;
use serde_json::Value;
use tracing::debug;

use crate::engine::{ViewSet, DEFAULT_LEAF_SIZE};
use crate::traits::{prepare_document, DocumentStore, PutOutcome, StoredDoc};
use crate::{ViewQuery, ViewResult};

pub const DEFAULT_DESIGN_NAME: &str = "default";

/// In-memory store for tests and fixture replay. Not durable.
pub struct InMemoryStore {
    design: DesignDoc,
    workers: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    docs: HashMap<DocId, StoredDoc>,
    seq: u64,
    views: ViewSet,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            design: DesignDoc::standard(DEFAULT_DESIGN_NAME),
            workers: 1,
            inner: Mutex::new(Inner {
                docs: HashMap::new(),
                seq: 0,
                views: ViewSet::standard(DEFAULT_LEAF_SIZE),
            }),
        }
    }

    pub fn open(design: DesignDoc, leaf_size: usize, workers: usize) -> anyhow::Result<Self> {
        let views = ViewSet::new(&design, leaf_size)?;
        Ok(Self {
            design,
            workers: workers.max(1),
            inner: Mutex::new(Inner {
                docs: HashMap::new(),
                seq: 0,
                views,
            }),
        })
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn store(&mut self, id: DocId, body: Value, mapped: crate::Mapped) -> PutOutcome {
        self.seq += 1;
        let index = self.views.apply(&id, mapped);
        let updated = self
            .docs
            .insert(id.clone(), StoredDoc { id: id.clone(), seq: self.seq, body })
            .is_some();
        PutOutcome { id, seq: self.seq, updated, index }
    }
}

impl DocumentStore for InMemoryStore {
    fn design(&self) -> &DesignDoc {
        &self.design
    }

    fn put(&self, body: Value) -> anyhow::Result<PutOutcome> {
        let (id, body) = prepare_document(body)?;
        let mut inner = self.lock()?;
        let mapped = inner.views.map_document(&id, &body);
        Ok(inner.store(id, body, mapped))
    }

    fn put_batch(&self, bodies: Vec<Value>) -> anyhow::Result<Vec<PutOutcome>> {
        let docs = bodies
            .into_iter()
            .map(prepare_document)
            .collect::<Result<Vec<_>, _>>()?;
        let mut inner = self.lock()?;
        let mapped = inner.views.map_batch(&docs, self.workers);
        debug!(docs = docs.len(), workers = self.workers, "mapped batch");
        Ok(docs
            .into_iter()
            .zip(mapped)
            .map(|((id, body), m)| inner.store(id, body, m))
            .collect())
    }

    fn get(&self, id: &DocId) -> anyhow::Result<Option<StoredDoc>> {
        Ok(self.lock()?.docs.get(id).cloned())
    }

    fn remove(&self, id: &DocId) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        inner.views.remove(id);
        Ok(inner.docs.remove(id).is_some())
    }

    fn doc_count(&self) -> anyhow::Result<usize> {
        Ok(self.lock()?.docs.len())
    }

    fn query(&self, view: &str, q: &ViewQuery) -> anyhow::Result<ViewResult> {
        Ok(self.lock()?.views.query(view, q)?)
    }
}
