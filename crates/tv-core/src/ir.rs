//! A minimal in-memory IR: just enough shape for a [`Transform`] to exist
//! and be walked by a symbolic executor, without parsing any concrete
//! textual syntax (out of scope) or modeling memory/pointers beyond the
//! flat encoding the type lattice already gives pointers.
//!
//! Every function body here is required to be acyclic; detecting and
//! rejecting a cycle is `tv-verify`'s symbolic executor's job, not this
//! module's — this module only stores instructions in the order they
//! were added, it does not run them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::Expr;
use crate::types::{check, IdGen, Type};

/// An opcode covering the arithmetic/comparison/selection operations
/// needed to drive the refinement checker's concrete scenarios. Adding a
/// new opcode here means teaching `tv-verify`'s symbolic executor its
/// semantics; this module only records *that* an instruction exists and
/// what it's named.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Select,
    /// Reinterpret/widen/narrow a value to `target`, no-op at the value
    /// level beyond width (poison if the source was poison).
    Cast,
    /// Always-poison, used to construct scenarios where a branch of the
    /// program degrades definedness.
    Freeze,
}

/// A named operand: either a function input or a previously computed
/// instruction result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Input(String),
    Instr(String),
    /// A literal constant of the given bit width.
    Const { value: u64, bits: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instr {
    pub name: String,
    pub ty: Type,
    pub op: Op,
    pub operands: Vec<Operand>,
}

/// A function parameter. The 2-bit `ty_var` lets the checker's selective
/// instantiation treat `0` = defined, `1` = undef, `2` = poison-tainted
/// as the three input "modes" it enumerates over; `3` is never produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    pub ty: Type,
}

impl Input {
    pub fn ty_var(&self) -> Expr {
        Expr::bv_var(format!("tyvar_{}", self.name), 2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub inputs: Vec<Input>,
    pub instrs: Vec<Instr>,
    /// Name of the instruction (or input) returned by this function, if
    /// it returns on every path. `None` models a function with no
    /// reachable return (matches the "doesn't return" side of the
    /// return-path mismatch check).
    pub returns: Option<String>,
    pub return_ty: Type,
    /// The domain predicate this function assumes before its entry block
    /// (e.g. a `udiv`'s implicit "divisor is nonzero"). Conjoined with the
    /// other function's own precondition by `check_refinement`'s `pre`;
    /// `true` by default, matching a function with no assumed predicate.
    pub pre: Expr,
}

#[derive(Debug, Error)]
pub enum IrError {
    #[error("loops are not supported yet; skipping function")]
    LoopInCfg,
    #[error("out of memory; skipping function")]
    OutOfMemory,
    #[error("operand `{0}` is not defined before its use")]
    UndefinedOperand(String),
    #[error("duplicate instruction name `{0}`")]
    DuplicateName(String),
}

impl Function {
    pub fn new(name: impl Into<String>, return_ty: Type) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            instrs: Vec::new(),
            returns: None,
            return_ty,
            pre: Expr::BoolLit(true),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.inputs.push(Input { name: name.into(), ty });
        self
    }

    /// Assume `pred` holds at this function's entry, e.g. a caller-side
    /// invariant like "the divisor argument is nonzero". Conjoined into
    /// `check_refinement`'s `pre` alongside the other function's own.
    pub fn with_precondition(mut self, pred: Expr) -> Self {
        self.pre = self.pre.and(pred);
        self
    }

    pub fn with_instr(mut self, name: impl Into<String>, ty: Type, op: Op, operands: Vec<Operand>) -> Self {
        self.instrs.push(Instr { name: name.into(), ty, op, operands });
        self
    }

    pub fn returning(mut self, name: impl Into<String>) -> Self {
        self.returns = Some(name.into());
        self
    }

    pub fn has_return(&self) -> bool {
        self.returns.is_some()
    }

    /// All names bound by this function, inputs first, in declaration
    /// order — the order counterexample rendering walks them in.
    pub fn named_values(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|i| i.name.as_str()).chain(self.instrs.iter().map(|i| i.name.as_str()))
    }

    /// Verify the instruction list is acyclic and every operand refers
    /// to something already defined (inputs, or an earlier instruction):
    /// a stand-in for the "fails cleanly on non-acyclic control flow"
    /// requirement without a real CFG to walk.
    pub fn check_acyclic(&self) -> Result<(), IrError> {
        let mut defined: BTreeSet<&str> = self.inputs.iter().map(|i| i.name.as_str()).collect();
        let mut seen_names: BTreeSet<&str> = defined.clone();
        for instr in &self.instrs {
            if !seen_names.insert(instr.name.as_str()) {
                return Err(IrError::DuplicateName(instr.name.clone()));
            }
            for operand in &instr.operands {
                match operand {
                    Operand::Input(n) | Operand::Instr(n) => {
                        if !defined.contains(n.as_str()) {
                            // A reference to a name not yet defined can
                            // only mean a back-edge: this is this IR's
                            // only possible source of a cycle, since
                            // instructions are otherwise a flat list.
                            return Err(IrError::LoopInCfg);
                        }
                    }
                    Operand::Const { .. } => {}
                }
            }
            defined.insert(instr.name.as_str());
        }
        if let Some(ret) = &self.returns {
            if !defined.contains(ret.as_str()) {
                return Err(IrError::UndefinedOperand(ret.clone()));
            }
        }
        Ok(())
    }

    pub fn get_type_constraints(&self) -> Expr {
        let mut c = self.return_ty.get_type_constraints();
        for input in &self.inputs {
            c = c.and(input.ty.get_type_constraints());
        }
        for instr in &self.instrs {
            c = c.and(instr.ty.get_type_constraints());
        }
        c
    }

    pub fn fixup_types(&mut self, model: &dyn crate::types::Model) {
        self.return_ty.fixup(model);
        for input in &mut self.inputs {
            input.ty.fixup(model);
        }
        for instr in &mut self.instrs {
            instr.ty.fixup(model);
        }
    }

    pub fn instr_named(&self, name: &str) -> Option<&Instr> {
        self.instrs.iter().find(|i| i.name == name)
    }
}

/// A source/target pair to be checked for refinement: does every
/// observable behavior of `tgt` refine some behavior of `src`?
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transform {
    pub name: String,
    pub src: Function,
    pub tgt: Function,
}

impl Transform {
    pub fn new(name: impl Into<String>, src: Function, tgt: Function) -> Self {
        Self { name: name.into(), src, tgt }
    }

    /// The joint type-constraint formula a [`crate::types::Model`] must
    /// satisfy for both functions to have a consistent typing: both
    /// functions' own constraints, agreement on the return type, and
    /// agreement on every input shared by name.
    pub fn typing_constraints(&self, check_each_var: bool) -> Expr {
        let mut c = self.src.get_type_constraints().and(self.tgt.get_type_constraints());
        c = c.and(check::eq_type(&self.src.return_ty, &self.tgt.return_ty));

        for src_in in &self.src.inputs {
            if let Some(tgt_in) = self.tgt.inputs.iter().find(|i| i.name == src_in.name) {
                c = c.and(check::eq_type(&src_in.ty, &tgt_in.ty));
            }
        }

        if check_each_var {
            for src_instr in &self.src.instrs {
                if let Some(tgt_instr) = self.tgt.instr_named(&src_instr.name) {
                    c = c.and(check::eq_type(&src_instr.ty, &tgt_instr.ty));
                }
            }
        }
        c
    }

    pub fn fixup_types(&mut self, model: &dyn crate::types::Model) {
        self.src.fixup_types(model);
        self.tgt.fixup_types(model);
    }
}

/// Convenience: a fresh [`IdGen`] scoped to building one `Transform`,
/// rather than a global mutable id counter shared across builds.
pub fn new_type_id_gen() -> IdGen {
    IdGen::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FloatKind;

    fn build(mut gen: IdGen) -> Function {
        Function::new("f", Type::int(&mut gen, 32))
            .with_input("%a", Type::int(&mut gen, 32))
            .with_instr(
                "%r",
                Type::int(&mut gen, 32),
                Op::Add,
                vec![Operand::Input("%a".into()), Operand::Const { value: 1, bits: 32 }],
            )
            .returning("%r")
    }

    #[test]
    fn acyclic_function_passes_check() {
        let f = build(IdGen::new());
        assert!(f.check_acyclic().is_ok());
    }

    #[test]
    fn forward_reference_is_rejected_as_loop() {
        let mut gen = IdGen::new();
        let f = Function::new("f", Type::int(&mut gen, 32))
            .with_instr(
                "%a",
                Type::int(&mut gen, 32),
                Op::Add,
                vec![Operand::Instr("%b".into())],
            )
            .with_instr("%b", Type::int(&mut gen, 32), Op::Add, vec![]);
        assert!(matches!(f.check_acyclic(), Err(IrError::LoopInCfg)));
    }

    #[test]
    fn duplicate_instruction_name_rejected() {
        let mut gen = IdGen::new();
        let f = Function::new("f", Type::int(&mut gen, 32))
            .with_instr("%a", Type::int(&mut gen, 32), Op::Add, vec![])
            .with_instr("%a", Type::int(&mut gen, 32), Op::Add, vec![]);
        assert!(matches!(f.check_acyclic(), Err(IrError::DuplicateName(_))));
    }

    #[test]
    fn default_precondition_is_true() {
        let f = build(IdGen::new());
        assert!(f.pre.is_true());
    }

    #[test]
    fn with_precondition_conjoins_onto_default_true() {
        let mut gen = IdGen::new();
        let pred = Type::int(&mut gen, 32).size_var().mk_eq(Expr::mk_uint(32, 8));
        let f = build(IdGen::new()).with_precondition(pred.clone());
        assert_eq!(f.pre, pred);
    }

    #[test]
    fn typing_constraints_links_shared_inputs() {
        let mut gen = IdGen::new();
        let src = build(IdGen::new());
        let tgt = Function::new("f", Type::int(&mut gen, 32))
            .with_input("%a", Type::float(&mut gen, FloatKind::Float))
            .returning("%a");
        let t = Transform::new("t", src, tgt);
        let c = t.typing_constraints(false);
        // int vs float input types can never agree.
        assert!(c.is_false());
    }
}
