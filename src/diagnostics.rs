//! Non-fatal per-block solve diagnostics (spec §7).
//!
//! `did-not-converge` and `singular-jacobian` both produce one of these; the
//! difference is that `singular-jacobian` additionally stops the Period
//! Driver and is surfaced to the caller as `Err(ModelError::SingularJacobian)`
//! as well. `SolveDiagnostic` itself is never an error — it's a report.

use serde::Serialize;

use crate::solver::SolveStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    DidNotConverge,
    SingularJacobian,
}

impl From<SolveStatus> for Option<DiagnosticKind> {
    fn from(status: SolveStatus) -> Self {
        match status {
            SolveStatus::Converged => None,
            SolveStatus::DidNotConverge => Some(DiagnosticKind::DidNotConverge),
            SolveStatus::SingularJacobian => Some(DiagnosticKind::SingularJacobian),
        }
    }
}

/// A structured report of one failed block-solve attempt: which block, at
/// which period, what it was solving for, what it was given, and the
/// numeric values in play when it gave up.
#[derive(Debug, Clone, Serialize)]
pub struct SolveDiagnostic {
    pub block: usize,
    pub period: usize,
    pub kind: DiagnosticKind,
    pub endogenous: Vec<String>,
    pub exogenous: Vec<String>,
    pub endogenous_values: Vec<f64>,
    pub exogenous_values: Vec<f64>,
}

impl SolveDiagnostic {
    pub fn is_fatal(&self) -> bool {
        self.kind == DiagnosticKind::SingularJacobian
    }
}
