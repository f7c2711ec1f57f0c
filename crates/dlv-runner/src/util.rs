use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Split raw input into documents: a JSON array, a single object, or one
/// value per line.
pub fn parse_documents(raw: &str) -> Result<Vec<Value>> {
    if raw.trim_start().starts_with('[') {
        return serde_json::from_str(raw).with_context(|| "parse JSON array");
    }
    serde_json::Deserializer::from_str(raw)
        .into_iter::<Value>()
        .enumerate()
        .map(|(i, v)| v.with_context(|| format!("parse document #{}", i + 1)))
        .collect()
}

/// Key arguments are JSON; anything that does not parse is taken as a bare string.
pub fn parse_key_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
