//! SMT solver backend using Z3 (feature-gated).
//!
//! All Z3-touching code in this module requires the `z3` feature flag.
//! Without it, only [`ModelView`] (used by [`crate::reporter`] against a
//! test double) is available.

use std::collections::HashMap;

use tv_core::expr::Expr;

#[cfg(feature = "z3")]
use std::time::Duration;

/// Anything that can evaluate a ground [`Expr`] against a satisfying
/// assignment: implemented for real by [`Z3Model`], and by hand in tests
/// that don't need an actual solver.
pub trait ModelView {
    fn eval_uint(&self, expr: &Expr) -> Option<u64>;
}

/// Result of checking one refinement obligation.
#[derive(Debug, Clone)]
pub enum SmtResult {
    /// The obligation is proven to hold (its negation is UNSAT).
    Proven,
    /// The obligation can fail: a counterexample was found.
    Disproven { counterexample: HashMap<String, u64> },
    /// The solver could not determine the result.
    Unknown { reason: String },
    Timeout,
}

/// SMT solver wrapper around Z3.
#[cfg(feature = "z3")]
pub struct SmtSolver {
    timeout: Duration,
}

#[cfg(feature = "z3")]
impl SmtSolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Check whether `obligation` always holds, given `qvars` are free
    /// (universally quantified) within it.
    ///
    /// Strategy: assert `forall qvars. obligation` is false by checking
    /// the negation for satisfiability under an existential reading of
    /// `qvars` — UNSAT means the obligation holds for every assignment.
    pub fn check_obligation(&self, obligation: &Expr, qvars: &[Expr]) -> SmtResult {
        let _ = qvars;
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let solver = z3::Solver::new(&ctx);

        let timeout_ms = self.timeout.as_millis() as u32;
        let params = z3::Params::new(&ctx);
        params.set_u32("timeout", timeout_ms);
        solver.set_params(&params);

        match expr_to_z3_bool(&ctx, &obligation.clone().not()) {
            Some(negated) => {
                solver.assert(&negated);
                match solver.check() {
                    z3::SatResult::Unsat => SmtResult::Proven,
                    z3::SatResult::Sat => {
                        let model = solver.get_model().unwrap();
                        let counterexample = extract_model(&ctx, &model, obligation);
                        SmtResult::Disproven { counterexample }
                    }
                    z3::SatResult::Unknown => {
                        let reason = solver.get_reason_unknown().unwrap_or_else(|| "unknown".to_string());
                        if reason.contains("timeout") {
                            SmtResult::Timeout
                        } else {
                            SmtResult::Unknown { reason }
                        }
                    }
                }
            }
            None => SmtResult::Unknown { reason: "unsupported expression structure".into() },
        }
    }

    /// Check a plain expression for satisfiability, returning a model
    /// when one exists. Used by the checker's selective-instantiation and
    /// typing-assignment loops, which need a witness rather than a
    /// provenness verdict.
    pub fn check_sat(&self, formula: &Expr) -> SmtResult {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let solver = z3::Solver::new(&ctx);

        let timeout_ms = self.timeout.as_millis() as u32;
        let params = z3::Params::new(&ctx);
        params.set_u32("timeout", timeout_ms);
        solver.set_params(&params);

        match expr_to_z3_bool(&ctx, formula) {
            Some(ast) => {
                solver.assert(&ast);
                match solver.check() {
                    z3::SatResult::Sat => {
                        let model = solver.get_model().unwrap();
                        let counterexample = extract_model(&ctx, &model, formula);
                        SmtResult::Disproven { counterexample }
                    }
                    z3::SatResult::Unsat => SmtResult::Proven,
                    z3::SatResult::Unknown => {
                        let reason = solver.get_reason_unknown().unwrap_or_else(|| "unknown".to_string());
                        if reason.contains("timeout") {
                            SmtResult::Timeout
                        } else {
                            SmtResult::Unknown { reason }
                        }
                    }
                }
            }
            None => SmtResult::Unknown { reason: "unsupported expression structure".into() },
        }
    }
}

/// Translate an [`Expr`] to a Z3 boolean AST. `Expr` nodes with nonzero
/// width (bitvector-valued) are wrapped through [`expr_to_z3_bv`] and
/// compared/cast as needed; `Expr` itself conflates booleans with
/// 1-width bitvectors, so a bare bitvector expression used where a bool
/// is expected is compared against the literal `1`.
#[cfg(feature = "z3")]
fn expr_to_z3_bool<'ctx>(ctx: &'ctx z3::Context, expr: &Expr) -> Option<z3::ast::Bool<'ctx>> {
    use z3::ast::{Ast, Bool};

    match expr {
        Expr::BoolLit(b) => Some(Bool::from_bool(ctx, *b)),
        Expr::Not(a) => Some(expr_to_z3_bool(ctx, a)?.not()),
        Expr::And(a, b) => {
            let (l, r) = (expr_to_z3_bool(ctx, a)?, expr_to_z3_bool(ctx, b)?);
            Some(Bool::and(ctx, &[&l, &r]))
        }
        Expr::Or(a, b) => {
            let (l, r) = (expr_to_z3_bool(ctx, a)?, expr_to_z3_bool(ctx, b)?);
            Some(Bool::or(ctx, &[&l, &r]))
        }
        Expr::Implies(a, b) => Some(expr_to_z3_bool(ctx, a)?.implies(&expr_to_z3_bool(ctx, b)?)),
        Expr::Ule(a, b) => Some(expr_to_z3_bv(ctx, a)?.bvule(&expr_to_z3_bv(ctx, b)?)),
        Expr::Eq(a, b) => {
            if a.width() == 0 && b.width() == 0 {
                Some(expr_to_z3_bool(ctx, a)?._eq(&expr_to_z3_bool(ctx, b)?))
            } else {
                Some(expr_to_z3_bv(ctx, a)?._eq(&expr_to_z3_bv(ctx, b)?))
            }
        }
        Expr::ForAll { vars, body } => {
            let bound: Vec<z3::ast::BV<'ctx>> =
                vars.iter().filter_map(|v| expr_to_z3_bv(ctx, v)).collect();
            let body_z3 = expr_to_z3_bool(ctx, body)?;
            let refs: Vec<&dyn Ast> = bound.iter().map(|b| b as &dyn Ast).collect();
            Some(z3::ast::forall_const(ctx, &refs, &[], &body_z3))
        }
        Expr::Ite { cond, then_, else_ } => {
            let c = expr_to_z3_bool(ctx, cond)?;
            Some(c.ite(&expr_to_z3_bool(ctx, then_)?, &expr_to_z3_bool(ctx, else_)?))
        }
        Expr::Var { bits: 0, name } => Some(Bool::new_const(ctx, name.as_str())),
        // A bitvector used directly in boolean position: true iff != 0.
        other => {
            let bv = expr_to_z3_bv(ctx, other)?;
            let zero = z3::ast::BV::from_u64(ctx, 0, other.width().max(1));
            Some(bv._eq(&zero).not())
        }
    }
}

/// Translate an [`Expr`] to a Z3 bitvector AST.
#[cfg(feature = "z3")]
fn expr_to_z3_bv<'ctx>(ctx: &'ctx z3::Context, expr: &Expr) -> Option<z3::ast::BV<'ctx>> {
    use z3::ast::BV;

    match expr {
        Expr::BvLit { value, bits } => Some(BV::from_u64(ctx, *value, (*bits).max(1))),
        Expr::Var { name, bits } if *bits > 0 => Some(BV::new_const(ctx, name.as_str(), *bits)),
        Expr::Extract { hi, lo, inner } => Some(expr_to_z3_bv(ctx, inner)?.extract(*hi, *lo)),
        Expr::Concat(a, b) => Some(expr_to_z3_bv(ctx, a)?.concat(&expr_to_z3_bv(ctx, b)?)),
        Expr::Ite { cond, then_, else_ } => {
            let c = expr_to_z3_bool(ctx, cond)?;
            Some(c.ite(&expr_to_z3_bv(ctx, then_)?, &expr_to_z3_bv(ctx, else_)?))
        }
        // A boolean used directly in bitvector position: 1 or 0, width 1.
        other => {
            let b = expr_to_z3_bool(ctx, other)?;
            Some(b.ite(&BV::from_u64(ctx, 1, 1), &BV::from_u64(ctx, 0, 1)))
        }
    }
}

/// Extract every free variable's value from a satisfying model.
#[cfg(feature = "z3")]
fn extract_model(ctx: &z3::Context, model: &z3::Model, expr: &Expr) -> HashMap<String, u64> {
    let mut vars = Vec::new();
    expr.free_vars(&mut vars);

    let mut result = HashMap::new();
    for var in vars {
        let Some(name) = var.var_name() else { continue };
        let interp = if var.width() == 0 {
            let bound = z3::ast::Bool::new_const(ctx, name);
            model.eval(&bound, true).and_then(|v| v.as_bool()).map(|b| b as u64)
        } else {
            let bound = z3::ast::BV::new_const(ctx, name, var.width());
            model.eval(&bound, true).and_then(|v| v.as_u64())
        };
        if let Some(v) = interp {
            result.insert(name.to_string(), v);
        }
    }
    result
}

/// [`ModelView`] (and [`tv_core::types::Model`]) backed by a Z3 model and
/// the context it was produced in.
#[cfg(feature = "z3")]
pub struct Z3Model<'ctx> {
    pub ctx: &'ctx z3::Context,
    pub model: z3::Model<'ctx>,
}

#[cfg(feature = "z3")]
impl ModelView for Z3Model<'_> {
    fn eval_uint(&self, expr: &Expr) -> Option<u64> {
        if expr.width() == 0 {
            let b = expr_to_z3_bool(self.ctx, expr)?;
            self.model.eval(&b, true).and_then(|v| v.as_bool()).map(|b| b as u64)
        } else {
            let bv = expr_to_z3_bv(self.ctx, expr)?;
            self.model.eval(&bv, true).and_then(|v| v.as_u64())
        }
    }
}

#[cfg(feature = "z3")]
impl tv_core::types::Model for Z3Model<'_> {
    fn eval_uint(&self, expr: &Expr) -> Option<u64> {
        ModelView::eval_uint(self, expr)
    }
}

/// Outcome of [`prove`]: `Disproven` carries whatever `on_disproven`
/// built from the counterexample model, typically rendered
/// counterexample text.
#[cfg(feature = "z3")]
pub enum ProveOutcome<R> {
    Proven,
    Disproven(R),
    Unknown(String),
    Timeout,
}

/// Prove `formula` holds for every assignment of its free variables by
/// asserting its negation and checking for unsatisfiability. On a SAT
/// result (a counterexample exists), `on_disproven` is handed a
/// [`ModelView`] over the satisfying assignment so the caller can render
/// it (see [`crate::reporter::render_counterexample`]) without this
/// module needing to know anything about refinement or IR.
#[cfg(feature = "z3")]
pub fn prove<R>(
    formula: &Expr,
    timeout: Duration,
    on_disproven: impl FnOnce(&dyn ModelView) -> R,
) -> ProveOutcome<R> {
    let cfg = z3::Config::new();
    let ctx = z3::Context::new(&cfg);
    let solver = z3::Solver::new(&ctx);

    let timeout_ms = timeout.as_millis() as u32;
    let params = z3::Params::new(&ctx);
    params.set_u32("timeout", timeout_ms);
    solver.set_params(&params);

    match expr_to_z3_bool(&ctx, &formula.clone().not()) {
        Some(negated) => {
            solver.assert(&negated);
            match solver.check() {
                z3::SatResult::Unsat => ProveOutcome::Proven,
                z3::SatResult::Sat => {
                    let model = solver.get_model().unwrap();
                    let view = Z3Model { ctx: &ctx, model };
                    ProveOutcome::Disproven(on_disproven(&view))
                }
                z3::SatResult::Unknown => {
                    let reason = solver.get_reason_unknown().unwrap_or_else(|| "unknown".to_string());
                    if reason.contains("timeout") {
                        ProveOutcome::Timeout
                    } else {
                        ProveOutcome::Unknown(reason)
                    }
                }
            }
        }
        None => ProveOutcome::Unknown("unsupported expression structure".into()),
    }
}

#[cfg(all(test, feature = "z3"))]
mod tests {
    use super::*;

    #[test]
    fn simple_bitvector_equality_proven() {
        // x + 0 == x, encoded with this checker's tag_combine scheme as a
        // plain structural identity rather than real addition: still a
        // valid Proven-shaped smoke test of the plumbing.
        let x = Expr::bv_var("x", 8);
        let pred = x.clone().mk_eq(x);
        let solver = SmtSolver::new(Duration::from_secs(5));
        assert!(matches!(solver.check_obligation(&pred, &[]), SmtResult::Proven));
    }

    #[test]
    fn unsatisfiable_equality_is_not_proven() {
        let x = Expr::bv_var("x", 8);
        let pred = x.clone().mk_eq(Expr::mk_uint(1, 8)).and(x.mk_eq(Expr::mk_uint(2, 8)));
        let solver = SmtSolver::new(Duration::from_secs(5));
        assert!(matches!(solver.check_sat(&pred), SmtResult::Proven));
    }

    #[test]
    fn satisfiable_inequality_yields_counterexample() {
        let x = Expr::bv_var("x", 8);
        let pred = x.ne(Expr::mk_uint(10, 8));
        let solver = SmtSolver::new(Duration::from_secs(5));
        match solver.check_sat(&pred) {
            SmtResult::Disproven { counterexample } => assert!(counterexample.contains_key("x")),
            other => panic!("expected Disproven, got {other:?}"),
        }
    }

    #[test]
    fn ule_bound_rejects_values_above_the_bound() {
        // x <=u 64 over an 8-bit x is satisfiable only below/at 64; a model
        // that also pins x to 200 must be unsat.
        let x = Expr::bv_var("x", 8);
        let pred = x.clone().ule(Expr::mk_uint(64, 8)).and(x.mk_eq(Expr::mk_uint(200, 8)));
        let solver = SmtSolver::new(Duration::from_secs(5));
        assert!(matches!(solver.check_sat(&pred), SmtResult::Proven));
    }

    #[test]
    fn prove_reports_disproven_with_witness_value() {
        let x = Expr::bv_var("x", 8);
        let formula = x.clone().mk_eq(Expr::mk_uint(0, 8));
        let outcome = prove(&formula, Duration::from_secs(5), |model| model.eval_uint(&x));
        match outcome {
            ProveOutcome::Disproven(witness) => assert!(witness.is_some()),
            _ => panic!("expected a counterexample since x == 0 doesn't hold universally"),
        }
    }
}
