//! Counterexample rendering.
//!
//! Produces the textual "Example:" block shown alongside a refinement
//! failure: every input's value (or `poison`/`undef`), then a walk of
//! each state's named, non-input values up to (not including) the
//! variable under inspection, and finally the source/target value of
//! that variable itself when the caller asks for it.

use std::fmt::Write as _;

use tv_core::expr::Expr;
use tv_core::types::StateValue;
use tv_core::Function;

use crate::smt::ModelView;
use crate::symexec::State;

/// Render one value's printed form given a satisfying model: `poison` if
/// the model couldn't confirm non-poison, `undef` if it's an input whose
/// `ty_var` selected the undef lane (or whose evaluated value isn't
/// itself a constant), otherwise the concrete value, with a trailing
/// `[based on undef value]` marker when the value's free variables still
/// mention an `undef_`-prefixed name after model evaluation.
pub fn print_varval(model: &dyn ModelView, val: &StateValue) -> String {
    match model.eval_uint(&val.non_poison) {
        Some(1) => {}
        _ => return "poison".to_string(),
    }

    let evaluated = model.eval_uint(&val.value);
    let Some(n) = evaluated else {
        return "undef".to_string();
    };

    let mut out = format!("{n:#x}");

    let mut free = Vec::new();
    val.value.free_vars(&mut free);
    let based_on_undef = free.iter().any(|v| v.var_name().map(|n| n.starts_with("undef_")).unwrap_or(false));
    if based_on_undef {
        out.push_str("\t[based on undef value]");
    }
    out
}

/// Whether an input's `ty_var` model assignment selected the "undef"
/// lane (`1`), used by [`print_varval`]'s caller to special-case inputs.
pub fn input_is_undef(model: &dyn ModelView, ty_var: &Expr) -> bool {
    model.eval_uint(ty_var) == Some(1)
}

/// Build the full counterexample block `check_refinement` attaches to a
/// failing obligation.
///
/// `var_name` is `None` for a whole-function (return-value) obligation
/// and `Some(name)` for a per-instruction one; in the latter case the
/// per-state walk stops at (and does not print) that instruction, and —
/// when `print_values` is set — the source/target value of that
/// instruction is appended at the end.
pub fn render_counterexample(
    model: &dyn ModelView,
    src: &Function,
    src_state: &State,
    tgt: &Function,
    tgt_state: &State,
    var_name: Option<&str>,
    print_values: bool,
    check_each_var: bool,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Example:");

    for input in &src.inputs {
        let Some((sv, _)) = src_state.get(&input.name) else { continue };
        let rendered = if input_is_undef(model, &input.ty_var()) {
            "undef".to_string()
        } else {
            print_varval(model, sv)
        };
        let _ = writeln!(out, "{} = {}", input.name, rendered);
    }

    let mut seen = std::collections::BTreeSet::new();
    for (func, state, label) in [(src, src_state, "Source"), (tgt, tgt_state, "Target")] {
        if !check_each_var {
            let _ = writeln!(out, "\n{label}:");
        }
        for name in func.named_values() {
            if Some(name) == var_name {
                break;
            }
            if !name.starts_with('%') || func.inputs.iter().any(|i| i.name == name) {
                continue;
            }
            if check_each_var && !seen.insert(name.to_string()) {
                continue;
            }
            if let Some((sv, _)) = state.get(name) {
                let _ = writeln!(out, "{} = {}", name, print_varval(model, sv));
            }
        }
    }

    if print_values {
        if let Some(name) = var_name {
            if let Some((sv, _)) = src_state.get(name) {
                let _ = write!(out, "Source value: {}\n", print_varval(model, sv));
            }
            if let Some((sv, _)) = tgt_state.get(name) {
                let _ = write!(out, "Target value: {}\n", print_varval(model, sv));
            }
        }
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tv_core::expr::Expr;
    use tv_core::types::IdGen;
    use tv_core::{Op, Operand, Type};

    struct FakeModel(HashMap<String, u64>);

    impl ModelView for FakeModel {
        fn eval_uint(&self, e: &Expr) -> Option<u64> {
            match e {
                Expr::BvLit { value, .. } => Some(*value),
                Expr::Var { name, bits } => {
                    let v = *self.0.get(name)?;
                    if *bits == 0 {
                        Some(v)
                    } else {
                        Some(v)
                    }
                }
                Expr::Eq(a, b) => {
                    let (av, bv) = (self.eval_uint(a)?, self.eval_uint(b)?);
                    Some((av == bv) as u64)
                }
                Expr::Not(a) => Some(1 - self.eval_uint(a)?),
                _ => None,
            }
        }
    }

    #[test]
    fn poison_value_renders_as_poison() {
        let model = FakeModel(HashMap::new());
        let sv = StateValue::new(Expr::mk_uint(0, 8), Expr::BoolLit(false));
        assert_eq!(print_varval(&model, &sv), "poison");
    }

    #[test]
    fn defined_value_renders_hex() {
        let model = FakeModel(HashMap::new());
        let sv = StateValue::new(Expr::mk_uint(10, 8), Expr::BoolLit(true));
        assert_eq!(print_varval(&model, &sv), "0xa");
    }

    #[test]
    fn counterexample_lists_inputs_first() {
        let mut gen = IdGen::new();
        let src = Function::new("f", Type::int(&mut gen, 8))
            .with_input("%a", Type::int(&mut gen, 8))
            .with_instr("%r", Type::int(&mut gen, 8), Op::Cast, vec![Operand::Input("%a".into())])
            .returning("%r");
        let tgt = src.clone();
        let src_state = crate::symexec::sym_exec(&src, true).unwrap();
        let tgt_state = crate::symexec::sym_exec(&tgt, false).unwrap();

        let mut vals = HashMap::new();
        vals.insert("tyvar_%a".to_string(), 0);
        let model = FakeModel(vals);

        let text = render_counterexample(&model, &src, &src_state, &tgt, &tgt_state, None, false, false);
        assert!(text.starts_with("Example:\n%a ="));
    }
}
