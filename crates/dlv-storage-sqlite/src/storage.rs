use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use dlv_core::DocId;
use dlv_storage::{
    prepare_document, DocumentStore, EmittedRow, Mapped, PutOutcome, StoredDoc, ViewQuery, ViewResult, ViewSet,
};
use dlv_views::DesignDoc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::Value;
use tracing::info;

const DESIGN_DIGEST: &str = "design_digest";
const LAST_SEQ: &str = "last_seq";

/// Documents and their emitted view rows, both durable. Rows are loaded back
/// on open without re-running any map, unless the view definitions changed.
pub struct SqliteStore {
    design: DesignDoc,
    workers: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    conn: Connection,
    views: ViewSet,
}

impl SqliteStore {
    pub fn open(db_path: &Path, design: DesignDoc, leaf_size: usize, workers: usize) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let mut conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql)?;

        let mut views = ViewSet::new(&design, leaf_size)?;
        let digest = design.digest();
        let stored = read_meta(&conn, DESIGN_DIGEST)?;
        if stored.as_deref() == Some(digest.as_str()) {
            load_rows(&conn, &mut views)?;
        } else {
            reindex_all(&mut conn, &mut views, &digest)?;
        }

        Ok(Self {
            design,
            workers: workers.max(1),
            inner: Mutex::new(Inner { conn, views }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| anyhow!("sqlite store lock poisoned"))
    }
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM meta WHERE key=?1", params![key], |r| r.get(0))
        .optional()?)
}

fn write_meta(tx: &Transaction<'_>, key: &str, value: &str) -> Result<()> {
    tx.execute(
        "INSERT INTO meta(key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn next_seq(tx: &Transaction<'_>) -> Result<u64> {
    let last: Option<String> = tx
        .query_row("SELECT value FROM meta WHERE key=?1", params![LAST_SEQ], |r| r.get(0))
        .optional()?;
    let last = last.map(|s| s.parse::<u64>()).transpose().context("parse last_seq")?.unwrap_or(0);
    let seq = last + 1;
    write_meta(tx, LAST_SEQ, &seq.to_string())?;
    Ok(seq)
}

fn write_rows(tx: &Transaction<'_>, id: &DocId, rows: &[EmittedRow]) -> Result<()> {
    tx.execute("DELETE FROM view_rows WHERE doc_id=?1", params![id.as_str()])?;
    let mut stmt = tx.prepare("INSERT INTO view_rows(view, doc_id, key_json, value_json) VALUES (?1, ?2, ?3, ?4)")?;
    for row in rows {
        stmt.execute(params![
            row.view,
            id.as_str(),
            serde_json::to_string(&row.key)?,
            serde_json::to_string(&row.value)?
        ])?;
    }
    Ok(())
}

fn load_rows(conn: &Connection, views: &mut ViewSet) -> Result<()> {
    let mut stmt = conn.prepare("SELECT view, doc_id, key_json, value_json FROM view_rows ORDER BY rowid")?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
        ))
    })?;
    let mut n = 0usize;
    for row in rows {
        let (view, doc_id, key_json, value_json) = row?;
        let row = EmittedRow {
            view,
            key: serde_json::from_str(&key_json).context("parse stored view key")?,
            value: serde_json::from_str(&value_json).context("parse stored view value")?,
        };
        views.load_row(DocId::from_str(doc_id), row)?;
        n += 1;
    }
    info!(rows = n, "loaded view rows");
    Ok(())
}

/// Re-map every stored document; used when the view definitions changed.
fn reindex_all(conn: &mut Connection, views: &mut ViewSet, digest: &str) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM view_rows", [])?;
    views.clear();
    let docs = {
        let mut stmt = tx.prepare("SELECT id, body_json FROM documents")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        let mut docs = Vec::new();
        for row in rows {
            let (id, body_json) = row?;
            let body: Value = serde_json::from_str(&body_json).with_context(|| format!("parse stored document {id}"))?;
            docs.push((DocId::from_str(id), body));
        }
        docs
    };
    for (id, body) in &docs {
        views.index(id, body);
        write_rows(&tx, id, &views.rows_of(id))?;
    }
    write_meta(&tx, DESIGN_DIGEST, digest)?;
    tx.commit()?;
    info!(documents = docs.len(), "reindexed views");
    Ok(())
}

impl Inner {
    fn store(&mut self, docs: Vec<(DocId, Value)>, mapped: Vec<Mapped>) -> Result<Vec<PutOutcome>> {
        let tx = self.conn.transaction()?;
        let mut staged = Vec::with_capacity(docs.len());
        for ((id, body), m) in docs.into_iter().zip(mapped) {
            let seq = next_seq(&tx)?;
            let updated = tx
                .query_row("SELECT 1 FROM documents WHERE id=?1", params![id.as_str()], |_| Ok(()))
                .optional()?
                .is_some();
            tx.execute(
                "INSERT INTO documents(id, seq, body_json) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET seq=excluded.seq, body_json=excluded.body_json",
                params![id.as_str(), seq as i64, serde_json::to_string(&body)?],
            )?;
            write_rows(&tx, &id, &self.views.preview(&m))?;
            staged.push((id, seq, updated, m));
        }
        tx.commit()?;

        Ok(staged
            .into_iter()
            .map(|(id, seq, updated, m)| {
                let index = self.views.apply(&id, m);
                PutOutcome { id, seq, updated, index }
            })
            .collect())
    }
}

impl DocumentStore for SqliteStore {
    fn design(&self) -> &DesignDoc {
        &self.design
    }

    fn put(&self, body: Value) -> Result<PutOutcome> {
        let (id, body) = prepare_document(body)?;
        let mut inner = self.lock()?;
        let mapped = inner.views.map_document(&id, &body);
        inner
            .store(vec![(id, body)], vec![mapped])?
            .pop()
            .ok_or_else(|| anyhow!("put produced no outcome"))
    }

    fn put_batch(&self, bodies: Vec<Value>) -> Result<Vec<PutOutcome>> {
        let docs = bodies
            .into_iter()
            .map(prepare_document)
            .collect::<Result<Vec<_>, _>>()?;
        let mut inner = self.lock()?;
        let mapped = inner.views.map_batch(&docs, self.workers);
        inner.store(docs, mapped)
    }

    fn get(&self, id: &DocId) -> Result<Option<StoredDoc>> {
        let inner = self.lock()?;
        let row: Option<(i64, String)> = inner
            .conn
            .query_row(
                "SELECT seq, body_json FROM documents WHERE id=?1",
                params![id.as_str()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        row.map(|(seq, body_json)| -> Result<StoredDoc> {
            Ok(StoredDoc {
                id: id.clone(),
                seq: seq as u64,
                body: serde_json::from_str(&body_json)?,
            })
        })
        .transpose()
    }

    fn remove(&self, id: &DocId) -> Result<bool> {
        let mut inner = self.lock()?;
        let tx = inner.conn.transaction()?;
        tx.execute("DELETE FROM view_rows WHERE doc_id=?1", params![id.as_str()])?;
        let n = tx.execute("DELETE FROM documents WHERE id=?1", params![id.as_str()])?;
        tx.commit()?;
        inner.views.remove(id);
        Ok(n > 0)
    }

    fn doc_count(&self) -> Result<usize> {
        let inner = self.lock()?;
        let n: i64 = inner.conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    fn query(&self, view: &str, q: &ViewQuery) -> Result<ViewResult> {
        Ok(self.lock()?.views.query(view, q)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlv_storage::{IndexOutcome, DEFAULT_LEAF_SIZE};
    use dlv_views::ViewSpec;
    use serde_json::json;
    use tempfile::tempdir;

    fn open(path: &Path, name: &str) -> SqliteStore {
        SqliteStore::open(path, DesignDoc::standard(name), DEFAULT_LEAF_SIZE, 1).unwrap()
    }

    fn event(id: &str, kind: &str, ts: &str) -> Value {
        json!({
            "_id": id,
            "type": "event",
            "event": kind,
            "project": "web@acme",
            "target": "api",
            "version": "1.0.0",
            "stage": null,
            "timestamp": ts
        })
    }

    #[test]
    fn sqlite_open_and_migrate() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("dlv.db");
        let store = open(&db_path, "alice");
        assert_eq!(store.doc_count().unwrap(), 0);
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("dlv.db");
        {
            let store = open(&db_path, "alice");
            store.put(event("run1/start", "start", "2024-01-01T00:00:00Z")).unwrap();
            store.put(event("run1/success", "success", "2024-01-01T00:01:00Z")).unwrap();
        }
        let store = open(&db_path, "alice");
        assert_eq!(store.doc_count().unwrap(), 2);
        let res = store
            .query("grouped-events", &ViewQuery::exact(json!(["acme", "web", "api", "run1"])).group_level(4))
            .unwrap();
        assert!(res.rows[0].value.get("success").is_some());
        let doc = store.get(&DocId::from_str("run1/start")).unwrap().unwrap();
        assert_eq!(doc.body["event"], json!("start"));
    }

    #[test]
    fn changed_design_triggers_reindex() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("dlv.db");
        {
            let store = open(&db_path, "alice");
            store.put(event("run1/start", "start", "2024-01-01T00:00:00Z")).unwrap();
        }
        let mut slim = DesignDoc::standard("alice");
        slim.views.retain(|name, _| name == "events-build");
        slim.views.insert("builds".into(), ViewSpec { map: "events-build".into(), reduce: Some("_count".into()) });
        let store = SqliteStore::open(&db_path, slim, DEFAULT_LEAF_SIZE, 1).unwrap();
        let res = store.query("builds", &ViewQuery::default()).unwrap();
        assert_eq!(res.reduced(), Some(&json!(1)));
        assert!(store.query("events", &ViewQuery::default()).is_err());
    }

    #[test]
    fn update_and_remove_are_durable() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("dlv.db");
        {
            let store = open(&db_path, "alice");
            let first = store.put(event("r/1", "start", "2024-01-01T00:00:00Z")).unwrap();
            let second = store.put(event("r/1", "start", "2024-02-01T00:00:00Z")).unwrap();
            assert!(second.updated);
            assert!(second.seq > first.seq);
            store.put(event("r/2", "start", "2024-03-01T00:00:00Z")).unwrap();
            assert!(store.remove(&DocId::from_str("r/2")).unwrap());
        }
        let store = open(&db_path, "alice");
        let rows = store
            .query("events-build", &ViewQuery::default().reduce(false))
            .unwrap()
            .rows;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key[3], json!("2024-02-01T00:00:00Z"));
        let next = store.put(event("r/3", "start", "2024-04-01T00:00:00Z")).unwrap();
        assert_eq!(next.seq, 4);
    }

    #[test]
    fn batch_put_skips_malformed() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("dlv.db"), DesignDoc::standard("a"), 4, 2).unwrap();
        let mut bad = event("bad/1", "start", "2024-01-01T00:00:00Z");
        bad["project"] = json!("nocustomer");
        let outcomes = store
            .put_batch(vec![event("ok/1", "start", "2024-01-01T00:00:00Z"), bad])
            .unwrap();
        assert!(matches!(outcomes[0].index, IndexOutcome::Indexed { .. }));
        assert!(matches!(outcomes[1].index, IndexOutcome::Skipped { .. }));
        assert_eq!(store.doc_count().unwrap(), 2);
    }
}
