use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonRule {
    NumericTolerance,
    NumericExact,
    StringEquality,
}

impl Display for ComparisonRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::NumericTolerance => "numeric (tolerance)",
            Self::NumericExact => "numeric (exact)",
            Self::StringEquality => "text",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedVariable {
    pub id: String,
    pub display_prefix: String,
    pub setting_label: String,
    pub rule: ComparisonRule,
}

impl TrackedVariable {
    pub fn new(
        id: impl Into<String>,
        display_prefix: impl Into<String>,
        setting_label: impl Into<String>,
        rule: ComparisonRule,
    ) -> Self {
        Self {
            id: id.into(),
            display_prefix: display_prefix.into(),
            setting_label: setting_label.into(),
            rule,
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown variable id: {0}")]
pub struct VariableParseError(pub String);

#[derive(Debug, Clone)]
pub struct VariableRegistry {
    variables: Vec<Arc<TrackedVariable>>,
}

impl VariableRegistry {
    pub fn with_defaults() -> Self {
        Self::new(vec![
            TrackedVariable::new(
                "e_time",
                "Time elapsed:",
                "Running time elapsed (`e_time`)",
                ComparisonRule::NumericTolerance,
            ),
            TrackedVariable::new(
                "r_name",
                "Cue name:",
                "Cue name (`r_name`)",
                ComparisonRule::StringEquality,
            ),
            TrackedVariable::new(
                "r_left",
                "Time left:",
                "Time left (`r_left`)",
                ComparisonRule::NumericExact,
            ),
            TrackedVariable::new(
                "n_name",
                "Playhead:",
                "Playhead (`n_name`)",
                ComparisonRule::StringEquality,
            ),
        ])
    }

    pub fn new(variables: Vec<TrackedVariable>) -> Self {
        let mut out: Vec<Arc<TrackedVariable>> = Vec::with_capacity(variables.len());
        for variable in variables {
            if out.iter().any(|existing| existing.id == variable.id) {
                continue;
            }
            out.push(Arc::new(variable));
        }
        Self { variables: out }
    }

    pub fn extended(self, extra: Vec<TrackedVariable>) -> Self {
        let mut all = self
            .variables
            .iter()
            .map(|v| v.as_ref().clone())
            .collect::<Vec<_>>();
        all.extend(extra);
        Self::new(all)
    }

    pub fn variables(&self) -> &[Arc<TrackedVariable>] {
        &self.variables
    }

    pub fn by_id(&self, id: &str) -> Option<Arc<TrackedVariable>> {
        self.variables.iter().find(|v| v.id == id).cloned()
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<TrackedVariable>, VariableParseError> {
        self.by_id(id.trim())
            .ok_or_else(|| VariableParseError(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.variables.iter().any(|v| v.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
