#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    Strict,
    Hardened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Allow,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The operation has no native backend form and must run client-side.
    FallbackRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityIssue {
    pub kind: IssueKind,
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub ts_unix_ms: u64,
    pub mode: RuntimeMode,
    pub action: DecisionAction,
    pub issue: CompatibilityIssue,
}

/// Backend round-trips an evaluation would issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendOpKind {
    Query,
    Join,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendOp {
    pub kind: BackendOpKind,
    pub operation: String,
    pub detail: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCounts {
    #[serde(default)]
    pub queries: usize,
    #[serde(default)]
    pub joins: usize,
    #[serde(default)]
    pub fallbacks: usize,
}

/// Caller-owned record of backend operations and policy decisions.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLedger {
    ops: Vec<BackendOp>,
    decisions: Vec<DecisionRecord>,
}

impl ExecutionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            decisions: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        kind: BackendOpKind,
        operation: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.ops.push(BackendOp {
            kind,
            operation: operation.into(),
            detail: detail.into(),
        });
    }

    pub fn push_decision(&mut self, record: DecisionRecord) {
        self.decisions.push(record);
    }

    #[must_use]
    pub fn ops(&self) -> &[BackendOp] {
        &self.ops
    }

    #[must_use]
    pub fn decisions(&self) -> &[DecisionRecord] {
        &self.decisions
    }

    #[must_use]
    pub fn counts(&self) -> ExecutionCounts {
        let mut counts = ExecutionCounts::default();
        for op in &self.ops {
            match op.kind {
                BackendOpKind::Query => counts.queries += 1,
                BackendOpKind::Join => counts.joins += 1,
                BackendOpKind::Fallback => counts.fallbacks += 1,
            }
        }
        counts
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.decisions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePolicy {
    pub mode: RuntimeMode,
    /// Largest row count a client-side fallback may pull in hardened mode.
    pub fallback_row_cap: Option<usize>,
}

impl RuntimePolicy {
    #[must_use]
    pub fn strict() -> Self {
        Self {
            mode: RuntimeMode::Strict,
            fallback_row_cap: None,
        }
    }

    #[must_use]
    pub fn hardened(fallback_row_cap: Option<usize>) -> Self {
        Self {
            mode: RuntimeMode::Hardened,
            fallback_row_cap,
        }
    }

    /// Admit or refuse a client-side fallback over `rows` rows. Strict mode
    /// matches pandas and always admits; hardened mode enforces the cap.
    pub fn decide_fallback(
        &self,
        subject: impl Into<String>,
        rows: usize,
        ledger: &mut ExecutionLedger,
    ) -> DecisionAction {
        let cap = self.fallback_row_cap.unwrap_or(usize::MAX);
        let action = match self.mode {
            RuntimeMode::Hardened if rows > cap => DecisionAction::Reject,
            RuntimeMode::Strict | RuntimeMode::Hardened => DecisionAction::Allow,
        };

        ledger.push_decision(DecisionRecord {
            ts_unix_ms: now_unix_ms().unwrap_or_default(),
            mode: self.mode,
            action,
            issue: CompatibilityIssue {
                kind: IssueKind::FallbackRequired,
                subject: subject.into(),
                detail: format!("rows={rows} cap={}", display_cap(self.fallback_row_cap)),
            },
        });
        action
    }
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self::strict()
    }
}

fn display_cap(cap: Option<usize>) -> String {
    cap.map_or_else(|| "none".to_owned(), |c| c.to_string())
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("system clock is before UNIX_EPOCH")]
    ClockSkew,
}

pub fn now_unix_ms() -> Result<u64, RuntimeError> {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| RuntimeError::ClockSkew)?
        .as_millis();
    Ok(ms as u64)
}
