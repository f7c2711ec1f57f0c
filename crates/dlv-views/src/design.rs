use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::view::{find_view, Reducer, View, VIEWS};

pub const LANGUAGE: &str = "rust";

/// Revision of the built-in map and reduce functions. Bump it whenever one of
/// them changes what it emits, so stores built by an older binary reindex.
pub const VIEWS_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub map: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

/// Named bundle of views, `_design/<name>`. Map and reduce entries name
/// built-in functions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignDoc {
    pub name: String,
    pub language: String,
    /// `VIEWS_VERSION` of the binary that wrote the document.
    #[serde(default)]
    pub views_version: u32,
    pub views: BTreeMap<String, ViewSpec>,
}

impl DesignDoc {
    /// The full view set under the given name.
    pub fn standard(name: &str) -> Self {
        let views = VIEWS
            .iter()
            .map(|v| {
                (
                    v.name.to_string(),
                    ViewSpec {
                        map: v.name.to_string(),
                        reduce: v.reduce.map(|r| r.name().to_string()),
                    },
                )
            })
            .collect();
        Self {
            name: name.to_string(),
            language: LANGUAGE.to_string(),
            views_version: VIEWS_VERSION,
            views,
        }
    }

    pub fn id(&self) -> String {
        format!("_design/{}", self.name)
    }

    /// Hex SHA-256 over the canonical JSON form and the running binary's
    /// `VIEWS_VERSION`. Two documents with the same digest index identically.
    pub fn digest(&self) -> String {
        self.digest_for(VIEWS_VERSION)
    }

    fn digest_for(&self, views_version: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(self).unwrap_or_default());
        hasher.update(views_version.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Bind every entry to its built-in map and reducer, keyed by the
    /// entry's view name.
    pub fn resolve(&self) -> Result<Vec<(String, View)>> {
        if self.language != LANGUAGE {
            return Err(anyhow!("design doc {} uses unsupported language {}", self.id(), self.language));
        }
        self.views
            .iter()
            .map(|(name, spec)| {
                let base = find_view(&spec.map)
                    .ok_or_else(|| anyhow!("design doc {}: unknown map `{}` for view {}", self.id(), spec.map, name))?;
                let reduce = match &spec.reduce {
                    Some(r) => Some(
                        Reducer::by_name(r)
                            .ok_or_else(|| anyhow!("design doc {}: unknown reduce `{}` for view {}", self.id(), r, name))?,
                    ),
                    None => None,
                };
                Ok((name.clone(), View { name: base.name, map: base.map, reduce }))
            })
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read design doc {}", path.display()))?;
        let doc: Self = serde_json::from_slice(&bytes).with_context(|| format!("parse design doc {}", path.display()))?;
        Ok(doc)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes).with_context(|| format!("write design doc {}", path.display()))?;
        Ok(())
    }
}
