//! Small helpers layered on top of [`super::Type`] for the
//! per-instruction and input/input type-matching checks the refinement
//! driver needs.

use super::{Expr, Type};

/// The SMT constraint that two (possibly symbolic) types resolve to the
/// same shape. Thin wrapper over [`Type::structural_eq`] kept in its own
/// function so callers outside this module don't need to know the
/// lattice's internal equality dispatch.
pub fn eq_type(a: &Type, b: &Type) -> Expr {
    a.structural_eq(b)
}

/// Whether `a` and `b` could possibly denote the same type regardless of
/// how any symbolic slots resolve — a cheap shape-only check used to
/// short-circuit before building an SMT query.
pub fn types_compatible(a: &Type, b: &Type) -> bool {
    a.same_shape(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IdGen;

    #[test]
    fn concrete_mismatched_ints_incompatible_constraint_is_false() {
        let mut gen = IdGen::new();
        let a = Type::int(&mut gen, 8);
        let b = Type::int(&mut gen, 16);
        assert!(eq_type(&a, &b).is_false());
    }

    #[test]
    fn symbolic_always_shape_compatible() {
        let mut gen = IdGen::new();
        let sym = Type::symbolic(&mut gen);
        let concrete = Type::int(&mut gen, 32);
        assert!(types_compatible(&sym, &concrete));
    }

    #[test]
    fn struct_vs_int_shape_incompatible() {
        let mut gen = IdGen::new();
        let s = Type::structure(&mut gen, vec![Type::int(&mut gen, 8)]);
        let i = Type::int(&mut gen, 8);
        assert!(!types_compatible(&s, &i));
    }
}
