//! The refinement checker's error taxonomy.
//!
//! Every variant here corresponds to one of the ways `verify()` can end
//! without proving refinement: a structural reason the functions can't
//! even be compared (loop, OOM), a solver-level reason a query couldn't
//! be answered (invalid expression, timeout), or one of the three
//! refinement obligations actually failing, each carrying the rendered
//! counterexample text from [`crate::reporter`]. An unsatisfiable joint
//! typing isn't one of these: [`crate::check::TypingAssignments`] simply
//! yields no models, matching a caller enumerating typings directly
//! rather than invoking `verify()`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefinementError {
    #[error("Loops are not supported yet! Skipping function.")]
    LoopInCfg,

    #[error("Out of memory; skipping function.")]
    OutOfMemory,

    #[error("Invalid expr")]
    InvalidExpr,

    #[error("Timeout")]
    Timeout,

    #[error("Source is more defined than target{}", format_counterexample(.counterexample))]
    SourceMoreDefined { counterexample: String },

    #[error("Target is more poisonous than source{}", format_counterexample(.counterexample))]
    TargetMorePoisonous { counterexample: String },

    #[error("Value mismatch{}", format_counterexample(.counterexample))]
    ValueMismatch { counterexample: String },

    #[error("Source returns but target doesn't")]
    SourceReturnsTargetDoesnt,

    #[error("Target returns but source doesn't")]
    TargetReturnsSourceDoesnt,
}

fn format_counterexample(counterexample: &str) -> String {
    if counterexample.is_empty() {
        String::new()
    } else {
        format!("\n\n{counterexample}")
    }
}

/// An ordered collection of refinement errors, mirroring the checker's
/// own "collect everything found on this path, stop at the first
/// failure within a single obligation group" behavior. Only ever
/// non-empty when `verify()` found a concrete problem.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Errors(pub Vec<RefinementError>);

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: RefinementError) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<RefinementError> for Errors {
    fn from(err: RefinementError) -> Self {
        Errors(vec![err])
    }
}
