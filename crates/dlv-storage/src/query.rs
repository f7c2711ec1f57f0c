use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Query options for one view. Mirrors the usual document-store view API:
/// key ranges, exact key, grouping by key prefix, and reduce on/off.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewQuery {
    pub key: Option<Value>,
    pub start_key: Option<Value>,
    pub end_key: Option<Value>,
    pub inclusive_end: bool,
    pub descending: bool,
    pub skip: usize,
    pub limit: Option<usize>,
    /// `None` reduces whenever the view has a reducer.
    pub reduce: Option<bool>,
    pub group: bool,
    pub group_level: Option<usize>,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            key: None,
            start_key: None,
            end_key: None,
            inclusive_end: true,
            descending: false,
            skip: 0,
            limit: None,
            reduce: None,
            group: false,
            group_level: None,
        }
    }
}

impl ViewQuery {
    /// Every key starting with `parts`: `[..parts]` through `[..parts, {}]`.
    pub fn prefix(parts: Vec<Value>) -> Self {
        let mut end = parts.clone();
        end.push(json!({}));
        Self {
            start_key: Some(Value::Array(parts)),
            end_key: Some(Value::Array(end)),
            ..Self::default()
        }
    }

    pub fn exact(key: Value) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }

    pub fn group_level(mut self, level: usize) -> Self {
        self.group_level = Some(level);
        self
    }

    pub fn reduce(mut self, reduce: bool) -> Self {
        self.reduce = Some(reduce);
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        // a descending scan walks from the high bound to the low one
        std::mem::swap(&mut self.start_key, &mut self.end_key);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Batched form: `{"queries": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchQuery {
    pub queries: Vec<ViewQuery>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub key: Value,
    pub value: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    pub rows: Vec<ViewRow>,
}

impl ViewResult {
    /// Value of the single reduced row, if any.
    pub fn reduced(&self) -> Option<&Value> {
        self.rows.first().map(|r| &r.value)
    }
}
