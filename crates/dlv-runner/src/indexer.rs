use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dlv_storage::{prepare_document, BatchQuery, DocumentStore, InMemoryStore, IndexOutcome, ViewQuery, ViewResult};
use dlv_storage_sqlite::SqliteStore;
use dlv_views::{DesignDoc, VIEWS_VERSION};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{util::parse_documents, Backend, Config};

const INGEST_BATCH: usize = 1000;

pub struct Indexer {
    pub repo_root: PathBuf,
    pub cfg: Config,
    pub store: Box<dyn DocumentStore>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub indexed: usize,
    /// Not one of the known document kinds.
    pub ignored: usize,
    /// Known kind but malformed; no view holds rows for it.
    pub skipped: usize,
    /// Not storable at all (not an object, or a bad `_id`).
    pub rejected: usize,
    pub updated: usize,
    pub rows: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Status {
    pub design: String,
    pub digest: String,
    pub documents: usize,
    pub views: BTreeMap<String, usize>,
}

impl Indexer {
    pub fn open(repo_root: PathBuf) -> Result<Self> {
        let cfg_path = Config::config_path(&repo_root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_repo(repo_name(&repo_root));
            cfg.save_to(&cfg_path)?;
            cfg
        };

        let design = load_design(&repo_root, &cfg)?;
        let store: Box<dyn DocumentStore> = match cfg.backend()? {
            Backend::Sqlite => Box::new(SqliteStore::open(
                &cfg.store_path(&repo_root),
                design,
                cfg.views.leaf_size,
                cfg.views.workers,
            )?),
            Backend::Memory => Box::new(InMemoryStore::open(design, cfg.views.leaf_size, cfg.views.workers)?),
        };
        Ok(Self::with_store(repo_root, cfg, store))
    }

    pub fn with_store(repo_root: PathBuf, cfg: Config, store: Box<dyn DocumentStore>) -> Self {
        Self { repo_root, cfg, store }
    }

    pub fn init(repo_root: &Path) -> Result<()> {
        std::fs::create_dir_all(repo_root.join(".dlv")).ok();
        let cfg_path = Config::config_path(repo_root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_repo(repo_name(repo_root));
            cfg.save_to(&cfg_path)?;
            cfg
        };
        let design_path = Config::design_path(repo_root);
        if !design_path.exists() {
            DesignDoc::standard(&cfg.views.design_name).save(&design_path)?;
        }
        // create db
        let _ = Self::open(repo_root.to_path_buf())?;
        Ok(())
    }

    pub fn ingest_path(&self, path: &Path) -> Result<IngestReport> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let docs = parse_documents(&raw).with_context(|| format!("parse {}", path.display()))?;
        let report = self.ingest(docs)?;
        info!(path = %path.display(), ?report, "ingested");
        Ok(report)
    }

    pub fn ingest(&self, docs: Vec<Value>) -> Result<IngestReport> {
        let mut report = IngestReport {
            documents: docs.len(),
            ..IngestReport::default()
        };
        let mut accepted = Vec::with_capacity(docs.len());
        for (i, doc) in docs.into_iter().enumerate() {
            match prepare_document(doc) {
                Ok((_, body)) => accepted.push(body),
                Err(err) => {
                    warn!(position = i, error = %err, "rejecting document");
                    report.rejected += 1;
                }
            }
        }

        while !accepted.is_empty() {
            let rest = accepted.split_off(accepted.len().min(INGEST_BATCH));
            for outcome in self.store.put_batch(std::mem::replace(&mut accepted, rest))? {
                if outcome.updated {
                    report.updated += 1;
                }
                match outcome.index {
                    IndexOutcome::Indexed { rows } => {
                        report.indexed += 1;
                        report.rows += rows;
                    }
                    IndexOutcome::Ignored => report.ignored += 1,
                    IndexOutcome::Skipped { .. } => report.skipped += 1,
                }
            }
        }
        Ok(report)
    }

    pub fn query(&self, view: &str, q: &ViewQuery) -> Result<ViewResult> {
        self.store.query(view, q)
    }

    /// Run several queries against one view; results keep request order.
    pub fn query_batch(&self, view: &str, batch: &BatchQuery) -> Result<Vec<ViewResult>> {
        self.store.query_batch(view, &batch.queries)
    }

    /// Document count plus the number of rows each view holds.
    pub fn status(&self) -> Result<Status> {
        let design = self.store.design();
        let mut views = BTreeMap::new();
        let count_only = ViewQuery::default().reduce(false).limit(0);
        for name in design.views.keys() {
            let res = self.store.query(name, &count_only)?;
            views.insert(name.clone(), res.total_rows.unwrap_or(0));
        }
        Ok(Status {
            design: design.id(),
            digest: design.digest(),
            documents: self.store.doc_count()?,
            views,
        })
    }
}

fn repo_name(repo_root: &Path) -> &str {
    repo_root.file_name().and_then(|s| s.to_str()).unwrap_or("default")
}

fn load_design(repo_root: &Path, cfg: &Config) -> Result<DesignDoc> {
    let path = Config::design_path(repo_root);
    if path.exists() {
        let design = DesignDoc::load(&path)?;
        if design.views_version != VIEWS_VERSION {
            warn!(
                path = %path.display(),
                written = design.views_version,
                running = VIEWS_VERSION,
                "design doc written by another views version; rows will be rebuilt"
            );
        }
        Ok(design)
    } else {
        Ok(DesignDoc::standard(&cfg.views.design_name))
    }
}
