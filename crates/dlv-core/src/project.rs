use std::fmt;

use serde_json::Value;

use crate::CoreError;

/// Split form of the composite `<project>@<customer>` identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProjectRef {
    pub customer: String,
    pub project: String,
}

impl ProjectRef {
    /// Extra `@` segments past the customer are ignored.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let (project, rest) = raw
            .split_once('@')
            .ok_or_else(|| CoreError::MalformedProject(raw.to_string()))?;
        let customer = rest.split('@').next().unwrap_or_default();
        Ok(Self {
            customer: customer.to_string(),
            project: project.to_string(),
        })
    }

    /// `[customer, project]`, the prefix of every view key.
    pub fn key_prefix(&self) -> Vec<Value> {
        vec![Value::from(self.customer.as_str()), Value::from(self.project.as_str())]
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.project, self.customer)
    }
}
