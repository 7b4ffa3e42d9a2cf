pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum FetchOutcome {
    Value(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchResult {
    pub source_label: String,
    pub variable_id: String,
    pub outcome: FetchOutcome,
}

impl FetchResult {
    pub fn value(
        source_label: impl Into<String>,
        variable_id: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            source_label: source_label.into(),
            variable_id: variable_id.into(),
            outcome: FetchOutcome::Value(value.into()),
        }
    }

    pub fn failed(
        source_label: impl Into<String>,
        variable_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_label: source_label.into(),
            variable_id: variable_id.into(),
            outcome: FetchOutcome::Failed(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Value(_))
    }

    pub fn value_str(&self) -> Option<&str> {
        match &self.outcome {
            FetchOutcome::Value(value) => Some(value),
            FetchOutcome::Failed(_) => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            FetchOutcome::Value(_) => None,
            FetchOutcome::Failed(reason) => Some(reason),
        }
    }
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, base_url: &str, source_label: &str, variable_id: &str) -> FetchResult;
}

pub fn variable_endpoint(base_url: &str, source_label: &str, variable_id: &str) -> String {
    format!(
        "{base_url}/api/variable/{}/{}/value",
        urlencoding::encode(source_label),
        urlencoding::encode(variable_id)
    )
}
