//! A minimal symbolic-expression AST standing in for the SMT term layer.
//!
//! `Expr` is solver-independent: it is built and manipulated by the type
//! lattice and the refinement checker without ever touching Z3 directly.
//! Only `tv-verify`'s `smt` module (feature-gated on `z3`) knows how to turn
//! an `Expr` into an actual solver query. Keeping the AST here, rather than
//! behind the solver, is what lets the type lattice and its tests run
//! without the `z3` feature enabled at all.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A boolean- or bitvector-valued symbolic term.
///
/// Booleans are bitvectors of width 1 by convention, matching the
/// typical SMT-LIB encoding of `Bool` as `(_ BitVec 1)` where it
/// simplifies the quantifier/substitution code below to treat both
/// uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// A literal boolean.
    BoolLit(bool),
    /// A literal bitvector of the given width.
    BvLit { value: u64, bits: u32 },
    /// A free variable: `name` must be unique within a query, `bits` is 0
    /// for a boolean variable and the bitvector width otherwise.
    Var { name: String, bits: u32 },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    /// Unsigned `lhs <= rhs` over two equal-width bitvectors.
    Ule(Box<Expr>, Box<Expr>),
    /// Bit range `[hi:lo]` inclusive, LLVM/SMT-LIB convention.
    Extract { hi: u32, lo: u32, inner: Box<Expr> },
    /// `lhs` in the high bits, `rhs` in the low bits.
    Concat(Box<Expr>, Box<Expr>),
    ForAll { vars: Vec<Expr>, body: Box<Expr> },
    /// `if cond then then_ else else_`, `cond` boolean-valued.
    Ite { cond: Box<Expr>, then_: Box<Expr>, else_: Box<Expr> },
}

impl Expr {
    pub fn bool_var(name: impl Into<String>) -> Self {
        Expr::Var { name: name.into(), bits: 0 }
    }

    pub fn bv_var(name: impl Into<String>, bits: u32) -> Self {
        Expr::Var { name: name.into(), bits }
    }

    pub fn mk_uint(value: u64, bits: u32) -> Self {
        Expr::BvLit { value, bits }
    }

    pub fn and(self, other: Expr) -> Expr {
        match (&self, &other) {
            (Expr::BoolLit(true), _) => other,
            (_, Expr::BoolLit(true)) => self,
            (Expr::BoolLit(false), _) | (_, Expr::BoolLit(false)) => Expr::BoolLit(false),
            _ => Expr::And(Box::new(self), Box::new(other)),
        }
    }

    pub fn or(self, other: Expr) -> Expr {
        match (&self, &other) {
            (Expr::BoolLit(false), _) => other,
            (_, Expr::BoolLit(false)) => self,
            (Expr::BoolLit(true), _) | (_, Expr::BoolLit(true)) => Expr::BoolLit(true),
            _ => Expr::Or(Box::new(self), Box::new(other)),
        }
    }

    pub fn not(self) -> Expr {
        match self {
            Expr::BoolLit(b) => Expr::BoolLit(!b),
            Expr::Not(inner) => *inner,
            other => Expr::Not(Box::new(other)),
        }
    }

    pub fn implies(self, other: Expr) -> Expr {
        match &self {
            Expr::BoolLit(true) => other,
            Expr::BoolLit(false) => Expr::BoolLit(true),
            _ => Expr::Implies(Box::new(self), Box::new(other)),
        }
    }

    /// `self` holds but `other` does not: `self && !other`.
    pub fn not_implies(self, other: Expr) -> Expr {
        self.and(other.not())
    }

    pub fn mk_eq(self, other: Expr) -> Expr {
        if self == other {
            return Expr::BoolLit(true);
        }
        Expr::Eq(Box::new(self), Box::new(other))
    }

    pub fn ne(self, other: Expr) -> Expr {
        self.mk_eq(other).not()
    }

    /// Unsigned `self <= other`, folding when both sides are literal.
    pub fn ule(self, other: Expr) -> Expr {
        if let (Expr::BvLit { value: a, .. }, Expr::BvLit { value: b, .. }) = (&self, &other) {
            return Expr::BoolLit(a <= b);
        }
        Expr::Ule(Box::new(self), Box::new(other))
    }

    pub fn extract(self, hi: u32, lo: u32) -> Expr {
        if let Expr::BvLit { value, .. } = &self {
            let mask = if hi - lo + 1 >= 64 { u64::MAX } else { (1u64 << (hi - lo + 1)) - 1 };
            return Expr::BvLit { value: (value >> lo) & mask, bits: hi - lo + 1 };
        }
        // A range that falls entirely within one side of a concatenation
        // is that side's own sub-extract: keeps aggregate `extract` after
        // `mk_input`/`to_bv` readable instead of an opaque nested term.
        if let Expr::Concat(a, b) = &self {
            let bw = b.width();
            if hi < bw {
                return b.as_ref().clone().extract(hi, lo);
            }
            if lo >= bw {
                return a.as_ref().clone().extract(hi - bw, lo - bw);
            }
        }
        if hi - lo + 1 == self.width() && lo == 0 {
            return self;
        }
        Expr::Extract { hi, lo, inner: Box::new(self) }
    }

    pub fn concat(self, other: Expr) -> Expr {
        Expr::Concat(Box::new(self), Box::new(other))
    }

    pub fn mk_forall(vars: Vec<Expr>, body: Expr) -> Expr {
        if vars.is_empty() {
            return body;
        }
        Expr::ForAll { vars, body: Box::new(body) }
    }

    pub fn ite(cond: Expr, then_: Expr, else_: Expr) -> Expr {
        match cond {
            Expr::BoolLit(true) => then_,
            Expr::BoolLit(false) => else_,
            _ if then_ == else_ => then_,
            _ => Expr::Ite { cond: Box::new(cond), then_: Box::new(then_), else_: Box::new(else_) },
        }
    }

    /// Fold the usual binary-or reduction used to combine per-element
    /// obligations across an aggregate's fields.
    pub fn mk_or_fold(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        exprs.into_iter().fold(Expr::BoolLit(false), Expr::or)
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Expr::BoolLit(_) | Expr::BvLit { .. })
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expr::BoolLit(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Expr::BoolLit(false))
    }

    pub fn width(&self) -> u32 {
        match self {
            Expr::BoolLit(_) => 0,
            Expr::BvLit { bits, .. } => *bits,
            Expr::Var { bits, .. } => *bits,
            Expr::Not(_) | Expr::And(..) | Expr::Or(..) | Expr::Implies(..) | Expr::Eq(..)
            | Expr::Ule(..) | Expr::ForAll { .. } => 0,
            Expr::Extract { hi, lo, .. } => hi - lo + 1,
            Expr::Concat(l, r) => l.width() + r.width(),
            Expr::Ite { then_, .. } => then_.width(),
        }
    }

    /// Substitute every occurrence of `var` (matched by name) with
    /// `replacement`. Mirrors the single-variable substitution used by
    /// the checker's selective-instantiation loop.
    pub fn subst(&self, var: &Expr, replacement: &Expr) -> Expr {
        if self == var {
            return replacement.clone();
        }
        match self {
            Expr::BoolLit(_) | Expr::BvLit { .. } | Expr::Var { .. } => self.clone(),
            Expr::Not(a) => a.subst(var, replacement).not(),
            Expr::And(a, b) => a.subst(var, replacement).and(b.subst(var, replacement)),
            Expr::Or(a, b) => a.subst(var, replacement).or(b.subst(var, replacement)),
            Expr::Implies(a, b) => a.subst(var, replacement).implies(b.subst(var, replacement)),
            Expr::Eq(a, b) => a.subst(var, replacement).mk_eq(b.subst(var, replacement)),
            Expr::Ule(a, b) => a.subst(var, replacement).ule(b.subst(var, replacement)),
            Expr::Extract { hi, lo, inner } => inner.subst(var, replacement).extract(*hi, *lo),
            Expr::Concat(a, b) => a.subst(var, replacement).concat(b.subst(var, replacement)),
            Expr::ForAll { vars, body } => {
                Expr::ForAll { vars: vars.clone(), body: Box::new(body.subst(var, replacement)) }
            }
            Expr::Ite { cond, then_, else_ } => Expr::ite(
                cond.subst(var, replacement),
                then_.subst(var, replacement),
                else_.subst(var, replacement),
            ),
        }
    }

    /// Local constant folding; not a full decision procedure, just enough
    /// to let the selective-instantiation loop drop obviously-dead
    /// branches without invoking the solver.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Not(a) => a.simplify().not(),
            Expr::And(a, b) => a.simplify().and(b.simplify()),
            Expr::Or(a, b) => a.simplify().or(b.simplify()),
            Expr::Implies(a, b) => a.simplify().implies(b.simplify()),
            Expr::Eq(a, b) => {
                let (a, b) = (a.simplify(), b.simplify());
                match (&a, &b) {
                    (Expr::BvLit { value: v1, .. }, Expr::BvLit { value: v2, .. }) => {
                        Expr::BoolLit(v1 == v2)
                    }
                    _ => a.mk_eq(b),
                }
            }
            Expr::Ule(a, b) => {
                let (a, b) = (a.simplify(), b.simplify());
                match (&a, &b) {
                    (Expr::BvLit { value: v1, .. }, Expr::BvLit { value: v2, .. }) => {
                        Expr::BoolLit(v1 <= v2)
                    }
                    _ => a.ule(b),
                }
            }
            Expr::Extract { hi, lo, inner } => inner.simplify().extract(*hi, *lo),
            Expr::Concat(a, b) => a.simplify().concat(b.simplify()),
            Expr::ForAll { vars, body } => Expr::mk_forall(vars.clone(), body.simplify()),
            Expr::Ite { cond, then_, else_ } => {
                Expr::ite(cond.simplify(), then_.simplify(), else_.simplify())
            }
            other => other.clone(),
        }
    }

    /// Collect the free variables appearing in this expression, in
    /// first-occurrence order, without duplicates.
    pub fn free_vars(&self, out: &mut Vec<Expr>) {
        match self {
            Expr::Var { .. } => {
                if !out.contains(self) {
                    out.push(self.clone());
                }
            }
            Expr::BoolLit(_) | Expr::BvLit { .. } => {}
            Expr::Not(a) => a.free_vars(out),
            Expr::And(a, b)
            | Expr::Or(a, b)
            | Expr::Implies(a, b)
            | Expr::Eq(a, b)
            | Expr::Ule(a, b)
            | Expr::Concat(a, b) => {
                a.free_vars(out);
                b.free_vars(out);
            }
            Expr::Extract { inner, .. } => inner.free_vars(out),
            Expr::ForAll { vars, body } => {
                body.free_vars(out);
                out.retain(|v| !vars.contains(v));
            }
            Expr::Ite { cond, then_, else_ } => {
                cond.free_vars(out);
                then_.free_vars(out);
                else_.free_vars(out);
            }
        }
    }

    pub fn var_name(&self) -> Option<&str> {
        match self {
            Expr::Var { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BoolLit(b) => write!(f, "{b}"),
            Expr::BvLit { value, bits } => write!(f, "{value:#x}:i{bits}"),
            Expr::Var { name, .. } => write!(f, "{name}"),
            Expr::Not(a) => write!(f, "!({a})"),
            Expr::And(a, b) => write!(f, "({a} && {b})"),
            Expr::Or(a, b) => write!(f, "({a} || {b})"),
            Expr::Implies(a, b) => write!(f, "({a} => {b})"),
            Expr::Eq(a, b) => write!(f, "({a} == {b})"),
            Expr::Ule(a, b) => write!(f, "({a} <=u {b})"),
            Expr::Extract { hi, lo, inner } => write!(f, "{inner}[{hi}:{lo}]"),
            Expr::Concat(a, b) => write!(f, "({a} ++ {b})"),
            Expr::ForAll { vars, body } => {
                write!(f, "forall ")?;
                for (i, v) in vars.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ". {body}")
            }
            Expr::Ite { cond, then_, else_ } => write!(f, "({cond} ? {then_} : {else_})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_simplifies_with_true() {
        let x = Expr::bool_var("x");
        assert_eq!(Expr::BoolLit(true).and(x.clone()), x.clone());
        assert_eq!(x.clone().and(Expr::BoolLit(true)), x);
    }

    #[test]
    fn and_short_circuits_on_false() {
        let x = Expr::bool_var("x");
        assert_eq!(x.clone().and(Expr::BoolLit(false)), Expr::BoolLit(false));
        assert_eq!(Expr::BoolLit(false).and(x), Expr::BoolLit(false));
    }

    #[test]
    fn extract_folds_literals() {
        let lit = Expr::mk_uint(0b1011, 4);
        assert_eq!(lit.extract(1, 1), Expr::BvLit { value: 1, bits: 1 });
        assert_eq!(lit.extract(3, 2), Expr::BvLit { value: 0b10, bits: 2 });
    }

    #[test]
    fn ule_folds_literals() {
        assert_eq!(Expr::mk_uint(3, 8).ule(Expr::mk_uint(4, 8)), Expr::BoolLit(true));
        assert_eq!(Expr::mk_uint(5, 8).ule(Expr::mk_uint(4, 8)), Expr::BoolLit(false));
        assert_eq!(Expr::mk_uint(4, 8).ule(Expr::mk_uint(4, 8)), Expr::BoolLit(true));
    }

    #[test]
    fn ule_of_variables_stays_symbolic_until_simplified() {
        let v = Expr::bv_var("v", 8);
        let c = v.clone().ule(Expr::mk_uint(64, 8));
        assert!(!c.is_const());
        assert_eq!(c.simplify(), v.ule(Expr::mk_uint(64, 8)));
    }

    #[test]
    fn subst_replaces_matching_var() {
        let ty_var = Expr::bv_var("ty_0", 2);
        let body = ty_var.clone().ne(Expr::mk_uint(1, 2));
        let subst = body.subst(&ty_var, &Expr::mk_uint(0, 2));
        assert_eq!(subst, Expr::BvLit { value: 0, bits: 2 }.ne(Expr::mk_uint(1, 2)));
    }

    #[test]
    fn simplify_folds_equal_literals() {
        let e = Expr::mk_uint(3, 4).mk_eq(Expr::mk_uint(3, 4));
        assert_eq!(e.simplify(), Expr::BoolLit(true));
        let e2 = Expr::mk_uint(3, 4).mk_eq(Expr::mk_uint(4, 4));
        assert_eq!(e2.simplify(), Expr::BoolLit(false));
    }

    #[test]
    fn free_vars_deduplicates_and_skips_bound() {
        let x = Expr::bool_var("x");
        let y = Expr::bool_var("y");
        let body = x.clone().and(x.clone()).and(y.clone());
        let mut vars = Vec::new();
        body.free_vars(&mut vars);
        assert_eq!(vars, vec![x.clone(), y.clone()]);

        let quantified = Expr::mk_forall(vec![x.clone()], x.and(y.clone()));
        let mut vars2 = Vec::new();
        quantified.free_vars(&mut vars2);
        assert_eq!(vars2, vec![y]);
    }

    #[test]
    fn mk_or_fold_of_empty_is_false() {
        assert_eq!(Expr::mk_or_fold(std::iter::empty()), Expr::BoolLit(false));
    }

    #[test]
    fn ite_folds_on_const_condition() {
        let a = Expr::mk_uint(1, 8);
        let b = Expr::mk_uint(2, 8);
        assert_eq!(Expr::ite(Expr::BoolLit(true), a.clone(), b.clone()), a);
        assert_eq!(Expr::ite(Expr::BoolLit(false), a, b.clone()), b);
    }
}
