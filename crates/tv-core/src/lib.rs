//! Polymorphic IR type lattice and the minimal acyclic instruction graph
//! a translation-validation checker needs to exercise it.
//!
//! This crate has no dependency on a solver: [`expr::Expr`] is a plain
//! AST, and [`types::Model`] is a trait a solver-backed crate implements
//! to let the lattice read back a satisfying assignment. `tv-verify` is
//! where Z3 actually enters the picture.

pub mod expr;
pub mod ir;
pub mod types;

pub use expr::Expr;
pub use ir::{Function, Input, IrError, Op, Operand, Transform};
pub use types::{FloatKind, IdGen, Model, StateValue, Type, TypeKind};
