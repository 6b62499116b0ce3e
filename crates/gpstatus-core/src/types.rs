use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Status prefix the service uses while a row waits on the slow LLM check.
pub const LLM_VALIDATION_STATUS_PREFIX: &str = "LLM Validation";

// ─── Roll number ──────────────────────────────────────────────────

/// Validated student identifier. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RollNumber(String);

impl RollNumber {
    /// Validate operator input. Surrounding whitespace is not part of the id.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::EmptyRollNumber);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RollNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Verdict ──────────────────────────────────────────────────────

/// Terminal per-project outcome assigned by the evaluation service.
///
/// Unknown labels are kept verbatim so they still count as "evaluated".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Verdict {
    Pass,
    Fail,
    /// Certificate link rejected before any matching was attempted.
    Invalid,
    Other(String),
}

impl Verdict {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Invalid => "INVALID",
            Self::Other(s) => s,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl From<String> for Verdict {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PASS" => Self::Pass,
            "FAIL" => Self::Fail,
            "INVALID" => Self::Invalid,
            _ => Self::Other(s),
        }
    }
}

impl From<Verdict> for String {
    fn from(v: Verdict) -> Self {
        v.as_str().to_owned()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `null`, missing and `""` all mean "no verdict yet".
fn deserialize_verdict<'de, D>(deserializer: D) -> Result<Option<Verdict>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(Verdict::from))
}

// ─── Result & Row ─────────────────────────────────────────────────

/// Judgement attached to a row once the service has evaluated it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Project name; absent for INVALID results.
    #[serde(default)]
    pub project: String,
    #[serde(default, deserialize_with = "deserialize_verdict")]
    pub verdict: Option<Verdict>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<String>,
}

/// One project's evaluation entry for the current roll number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationRow {
    pub row_index: u64,
    pub status: String,
    pub result: Option<EvaluationResult>,
    pub updated_at: DateTime<Utc>,
}

impl EvaluationRow {
    pub fn new(row_index: u64, status: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            row_index,
            status: status.into(),
            result: None,
            updated_at: now,
        }
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        self.result.as_ref().and_then(|r| r.verdict.as_ref())
    }

    pub fn has_verdict(&self) -> bool {
        self.verdict().is_some()
    }

    pub fn is_pass(&self) -> bool {
        self.verdict().is_some_and(Verdict::is_pass)
    }

    /// True while the row sits in the slow LLM validation step.
    pub fn is_slow_validation(&self) -> bool {
        self.status.starts_with(LLM_VALIDATION_STATUS_PREFIX)
    }
}
