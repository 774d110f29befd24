//! Symbolic execution of an acyclic [`Function`] into a [`State`] the
//! refinement checker can compare.
//!
//! Every input's 2-bit `ty_var` selects one of three modes the checker's
//! selective instantiation (see [`crate::check::preprocess`]) later
//! enumerates over: `0` fully defined, `1` undef (value replaced by a
//! fresh `undef_`-prefixed variable, matching the naming convention the
//! error reporter keys off of), `2` poison. Mode `3` is never produced.

use std::collections::BTreeMap;

use tv_core::expr::Expr;
use tv_core::ir::{Function, Instr, Op, Operand};
use tv_core::types::StateValue;

/// Bound on instruction count, standing in for a real memory budget:
/// past this, symbolic execution gives up rather than building an
/// arbitrarily large formula.
pub const MAX_INSTRS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymExecError {
    LoopInCfg,
    OutOfMemory,
}

impl From<tv_core::ir::IrError> for SymExecError {
    fn from(e: tv_core::ir::IrError) -> Self {
        match e {
            tv_core::ir::IrError::LoopInCfg => SymExecError::LoopInCfg,
            _ => SymExecError::OutOfMemory,
        }
    }
}

/// One function's symbolic state after execution.
pub struct State {
    pub is_source: bool,
    /// Named values in declaration order (inputs first), each paired
    /// with the quantifier variables introduced while computing it (an
    /// input's own undef placeholder, notably).
    pub values: Vec<(String, (StateValue, Vec<Expr>))>,
    pub pre: Expr,
    pub returned: bool,
    pub return_domain: Expr,
    pub return_val: (StateValue, Vec<Expr>),
}

impl State {
    pub fn get(&self, name: &str) -> Option<&(StateValue, Vec<Expr>)> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// All quantifier variables collected across every value in this
    /// state (used to seed the `qvars` set `check_refinement` universally
    /// quantifies over).
    pub fn quant_vars(&self) -> Vec<Expr> {
        let mut out = Vec::new();
        for (_, (_, vars)) in &self.values {
            for v in vars {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
        }
        out
    }
}

fn input_value(input: &tv_core::ir::Input) -> (StateValue, Vec<Expr>) {
    let base = input.ty.mk_input(&input.name);
    let bits = base.value.width().max(1);
    let ty_var = input.ty_var();
    let undef_var = Expr::bv_var(format!("undef_{}", input.name), bits);

    let is_undef = ty_var.clone().mk_eq(Expr::mk_uint(1, 2));
    let is_poison = ty_var.mk_eq(Expr::mk_uint(2, 2));

    let value = Expr::ite(is_undef.clone(), undef_var.clone(), base.value);
    let non_poison = is_poison.not();

    (StateValue::new(value, non_poison), vec![undef_var])
}

fn eval_operand(values: &BTreeMap<String, StateValue>, operand: &Operand) -> StateValue {
    match operand {
        Operand::Input(name) | Operand::Instr(name) => {
            values.get(name).cloned().expect("operand resolved during check_acyclic")
        }
        Operand::Const { value, bits } => StateValue::defined(Expr::mk_uint(*value, *bits)),
    }
}

fn eval_instr(instr: &Instr, values: &BTreeMap<String, StateValue>) -> StateValue {
    let operands: Vec<StateValue> = instr.operands.iter().map(|o| eval_operand(values, o)).collect();
    let non_poison = operands
        .iter()
        .map(|sv| sv.non_poison.clone())
        .fold(Expr::BoolLit(true), Expr::and);

    let result_bits = instr.ty.bits().max(1);
    let value = match (&instr.op, operands.as_slice()) {
        (Op::Select, [c, a, b]) => {
            Expr::ite(bv1_to_bool(c.value.clone()), a.value.clone(), b.value.clone())
        }
        (Op::Cast, [a]) => fit_to_width(a.value.clone(), result_bits),
        (Op::Freeze, _) => instr.ty.get_dummy_value().value,
        (op, [a, b]) => tag_combine(op, a.value.clone(), b.value.clone(), result_bits),
        (_, [a]) => fit_to_width(a.value.clone(), result_bits),
        _ => instr.ty.get_dummy_value().value,
    };

    let non_poison = if matches!(instr.op, Op::Freeze) { Expr::BoolLit(true) } else { non_poison };
    StateValue::new(value, non_poison)
}

/// This executor represents arithmetic abstractly, as a tagged
/// combination of its operands, rather than modeling real two's
/// complement semantics bit-for-bit: precise per-opcode encoders are
/// explicitly out of scope (see DESIGN.md). What's preserved is the one
/// property the checker's scenarios rely on: two structurally identical
/// combinations of identical operands are equal, and differing ones
/// (different opcode or different operand) are not.
fn tag_combine(op: &Op, a: Expr, b: Expr, result_bits: u32) -> Expr {
    let tag = match op {
        Op::Add => 0u64,
        Op::Sub => 1,
        Op::Mul => 2,
        Op::And => 3,
        Op::Or => 4,
        Op::Xor => 5,
        Op::Select | Op::Cast | Op::Freeze => unreachable!("handled by caller"),
    };
    let combined = Expr::mk_uint(tag, 8).concat(a).concat(b);
    fit_to_width(combined, result_bits)
}

/// Truncate or zero-extend `e` to exactly `bits` wide.
fn fit_to_width(e: Expr, bits: u32) -> Expr {
    let w = e.width();
    if w == bits {
        e
    } else if w > bits {
        e.extract(bits - 1, 0)
    } else {
        Expr::mk_uint(0, bits - w).concat(e)
    }
}

fn bv1_to_bool(e: Expr) -> Expr {
    e.mk_eq(Expr::mk_uint(1, 1))
}

pub fn sym_exec(func: &Function, is_source: bool) -> Result<State, SymExecError> {
    func.check_acyclic()?;
    if func.instrs.len() > MAX_INSTRS {
        return Err(SymExecError::OutOfMemory);
    }

    let mut values: Vec<(String, (StateValue, Vec<Expr>))> = Vec::new();
    let mut flat: BTreeMap<String, StateValue> = BTreeMap::new();

    for input in &func.inputs {
        let (sv, qvars) = input_value(input);
        flat.insert(input.name.clone(), sv.clone());
        values.push((input.name.clone(), (sv, qvars)));
    }

    for instr in &func.instrs {
        let sv = eval_instr(instr, &flat);
        flat.insert(instr.name.clone(), sv.clone());
        values.push((instr.name.clone(), (sv, vec![])));
    }

    let returned = func.returns.is_some();
    let return_val = func
        .returns
        .as_ref()
        .and_then(|name| values.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone()))
        .unwrap_or_else(|| (StateValue::defined(Expr::BoolLit(true)), vec![]));

    Ok(State {
        is_source,
        values,
        pre: func.pre.clone(),
        returned,
        return_domain: Expr::BoolLit(true),
        return_val,
    })
}
