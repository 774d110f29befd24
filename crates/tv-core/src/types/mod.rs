//! The polymorphic IR type lattice.
//!
//! A [`Type`] can be fully concrete (`i32`, `float`, a fixed-shape struct)
//! or only partially resolved: a [`Type::Symbolic`] placeholder stands for
//! "one of several admitted concrete kinds, to be picked by the solver."
//! Every type, concrete or symbolic, carries an SMT-level *type variable*
//! (`type_var`) and *size variable* (`size_var`) used to let the solver
//! pin down unresolved widths and, for symbolic types, the chosen kind.
//!
//! This module never touches a solver directly — it only builds
//! [`Expr`] constraint trees. `tv-verify::smt` is the only place those
//! trees are handed to Z3.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

pub mod check;

/// Number of bits used to encode which concrete kind a symbolic type
/// resolved to (up to 8 kinds fit in 3 bits; `3` is reserved/unused,
/// matching the historical encoding this lattice is modeled on).
pub const TYPE_VAR_BITS: u32 = 3;
/// Number of bits used to encode an unresolved integer/float bit width.
pub const SIZE_VAR_BITS: u32 = 8;

/// Evaluates SMT-level variables against a concrete solver model.
///
/// Implemented by `tv-verify`'s Z3 model wrapper; kept as a trait here so
/// the type lattice's `fixup` logic has no dependency on a solver crate.
pub trait Model {
    fn eval_uint(&self, expr: &Expr) -> Option<u64>;
}

/// Discriminant for the concrete kind a [`Type::Symbolic`] may resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeKind {
    Int = 0,
    Float = 1,
    Ptr = 2,
    Array = 3,
    Vector = 4,
    Struct = 5,
}

impl TypeKind {
    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

/// IEEE-754-ish float precision. `Half` is recognized but not yet
/// solver-enabled (see [`Type::get_type_constraints`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatKind {
    Half,
    Float,
    Double,
}

impl FloatKind {
    pub fn bits(self) -> u32 {
        match self {
            FloatKind::Half => 16,
            FloatKind::Float => 32,
            FloatKind::Double => 64,
        }
    }
}

impl fmt::Display for FloatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloatKind::Half => write!(f, "half"),
            FloatKind::Float => write!(f, "float"),
            FloatKind::Double => write!(f, "double"),
        }
    }
}

/// `(value, non_poison)` pair threaded through symbolic execution:
/// `value` is only meaningful where `non_poison` holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateValue {
    pub value: Expr,
    pub non_poison: Expr,
}

impl StateValue {
    pub fn new(value: Expr, non_poison: Expr) -> Self {
        Self { value, non_poison }
    }

    /// A value that can never be poison.
    pub fn defined(value: Expr) -> Self {
        Self { value, non_poison: Expr::BoolLit(true) }
    }

    /// The canonical poison value for a type of the given width.
    pub fn poison(bits: u32) -> Self {
        Self { value: Expr::mk_uint(0, bits), non_poison: Expr::BoolLit(false) }
    }
}

/// Collapse a poison term down to a single bit: identity when `non_poison`
/// is already a bare boolean or a one-bit vector, otherwise an
/// all-ones-check over a wider (nested-aggregate) poison vector — a
/// nested aggregate only counts as non-poison to its own parent when
/// every one of its own elements is.
fn summarize_poison_bit(non_poison: &Expr) -> Expr {
    match non_poison.width() {
        0 => Expr::ite(non_poison.clone(), Expr::mk_uint(1, 1), Expr::mk_uint(0, 1)),
        1 => non_poison.clone(),
        w => {
            let all_ones = Expr::mk_uint((1u64 << w) - 1, w);
            Expr::ite(non_poison.clone().mk_eq(all_ones), Expr::mk_uint(1, 1), Expr::mk_uint(0, 1))
        }
    }
}

/// Concatenate each element's flat value (element 0 in the high bits)
/// and each element's own summary poison bit into the width-`elements`
/// poison vector `extract` reads back.
fn pack_elements(parts: Vec<StateValue>) -> StateValue {
    let value = parts
        .iter()
        .map(|p| p.value.clone())
        .reduce(Expr::concat)
        .unwrap_or(Expr::mk_uint(0, 1));
    let non_poison = parts
        .iter()
        .map(|p| p.non_poison.clone())
        .reduce(Expr::concat)
        .unwrap_or(Expr::mk_uint(1, 1));
    StateValue::new(value, non_poison)
}

macro_rules! common_fields {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name {
            pub id: u32,
        }
    };
}

/// A concrete or partially-resolved integer type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntType {
    pub id: u32,
    /// `None` until `fixup` resolves it from a model.
    pub bits: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FloatType {
    pub id: u32,
    pub kind: Option<FloatKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PtrType {
    pub id: u32,
    pub addr_space: u32,
}

/// Shared shape for `Array` and `Struct`: an ordered list of owned
/// element types. An array repeats its single declared element type;
/// a struct's `elements` are independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateType {
    pub id: u32,
    pub elements: Vec<Type>,
    /// For arrays, `len` may be unresolved until `fixup`; structs always
    /// know their element count up front.
    pub len: Option<u32>,
}

/// A vector's element type is *shared*, not owned per-slot: all lanes
/// are the same type by construction, so `element` is a single
/// back-reference rather than `len` independent copies (mirrors the
/// non-owning child design of the lattice this is modeled on).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorType {
    pub id: u32,
    pub element: Box<Type>,
    pub len: Option<u32>,
}

/// Which concrete kinds a [`Type::Symbolic`] placeholder may resolve to,
/// with one optional probe child per admitted kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolicType {
    pub id: u32,
    pub admits_int: bool,
    pub admits_float: bool,
    pub admits_ptr: bool,
    pub admits_array: bool,
    pub admits_vector: bool,
    pub admits_struct: bool,
    pub int_child: Option<Box<IntType>>,
    pub float_child: Option<Box<FloatType>>,
    pub ptr_child: Option<Box<PtrType>>,
    pub array_child: Option<Box<AggregateType>>,
    // Symbolic vector/struct children are intentionally unsupported: see
    // `get_type_constraints` below and DESIGN.md for why.
}

impl SymbolicType {
    /// Admits every kind except vector/struct-of-symbolic, each with a
    /// fresh probe child.
    pub fn any(gen: &mut IdGen) -> Self {
        Self {
            id: gen.next(),
            admits_int: true,
            admits_float: true,
            admits_ptr: true,
            admits_array: true,
            admits_vector: false,
            admits_struct: false,
            int_child: Some(Box::new(IntType { id: gen.next(), bits: None })),
            float_child: Some(Box::new(FloatType { id: gen.next(), kind: None })),
            ptr_child: Some(Box::new(PtrType { id: gen.next(), addr_space: 0 })),
            array_child: Some(Box::new(AggregateType {
                id: gen.next(),
                elements: vec![Type::Symbolic(Box::new(SymbolicType::leaf(gen)))],
                len: None,
            })),
        }
    }

    /// A symbolic type with no aggregate probing, used as an array's
    /// symbolic element to avoid unbounded recursion.
    fn leaf(gen: &mut IdGen) -> Self {
        Self {
            id: gen.next(),
            admits_int: true,
            admits_float: true,
            admits_ptr: true,
            admits_array: false,
            admits_vector: false,
            admits_struct: false,
            int_child: Some(Box::new(IntType { id: gen.next(), bits: None })),
            float_child: Some(Box::new(FloatType { id: gen.next(), kind: None })),
            ptr_child: Some(Box::new(PtrType { id: gen.next(), addr_space: 0 })),
            array_child: None,
        }
    }
}

/// Monotonic id generator for type identifiers; threaded explicitly
/// instead of living in a static so concurrent `verify` calls don't
/// interfere with each other.
#[derive(Debug, Default)]
pub struct IdGen(u32);

impl IdGen {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn next(&mut self) -> u32 {
        let id = self.0;
        self.0 += 1;
        id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void(VoidMarker),
    Int(IntType),
    Float(FloatType),
    Ptr(PtrType),
    Array(AggregateType),
    Struct(AggregateType),
    Vector(VectorType),
    Symbolic(Box<SymbolicType>),
}

common_fields!(VoidMarker);

impl Type {
    pub fn void(gen: &mut IdGen) -> Self {
        Type::Void(VoidMarker { id: gen.next() })
    }

    pub fn int(gen: &mut IdGen, bits: u32) -> Self {
        Type::Int(IntType { id: gen.next(), bits: Some(bits) })
    }

    pub fn int_unresolved(gen: &mut IdGen) -> Self {
        Type::Int(IntType { id: gen.next(), bits: None })
    }

    pub fn float(gen: &mut IdGen, kind: FloatKind) -> Self {
        Type::Float(FloatType { id: gen.next(), kind: Some(kind) })
    }

    pub fn ptr(gen: &mut IdGen, addr_space: u32) -> Self {
        Type::Ptr(PtrType { id: gen.next(), addr_space })
    }

    pub fn array(gen: &mut IdGen, element: Type, len: u32) -> Self {
        Type::Array(AggregateType { id: gen.next(), elements: vec![element], len: Some(len) })
    }

    pub fn vector(gen: &mut IdGen, element: Type, len: u32) -> Self {
        Type::Vector(VectorType { id: gen.next(), element: Box::new(element), len: Some(len) })
    }

    pub fn structure(gen: &mut IdGen, elements: Vec<Type>) -> Self {
        Type::Struct(AggregateType { id: gen.next(), elements, len: None })
    }

    pub fn symbolic(gen: &mut IdGen) -> Self {
        Type::Symbolic(Box::new(SymbolicType::any(gen)))
    }

    fn id(&self) -> u32 {
        match self {
            Type::Void(m) => m.id,
            Type::Int(t) => t.id,
            Type::Float(t) => t.id,
            Type::Ptr(t) => t.id,
            Type::Array(t) | Type::Struct(t) => t.id,
            Type::Vector(t) => t.id,
            Type::Symbolic(t) => t.id,
        }
    }

    /// The 3-bit discriminant variable used by a symbolic type to pick
    /// its resolved kind. Meaningless (but still well-defined) on
    /// concrete types.
    pub fn type_var(&self) -> Expr {
        Expr::bv_var(format!("ty_{}", self.id()), TYPE_VAR_BITS)
    }

    /// The bit-width variable used where a concrete type's width is
    /// unresolved (e.g. an `IntType` with `bits: None`).
    pub fn size_var(&self) -> Expr {
        Expr::bv_var(format!("bw_{}", self.id()), SIZE_VAR_BITS)
    }

    fn children(&self) -> Vec<&Type> {
        match self {
            Type::Array(a) | Type::Struct(a) => a.elements.iter().collect(),
            Type::Vector(v) => match v.len {
                Some(n) => (0..n).map(|_| v.element.as_ref()).collect(),
                None => vec![],
            },
            _ => vec![],
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }
    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float(_))
    }
    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }
    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector(_))
    }
    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }
    pub fn is_aggregate(&self) -> bool {
        self.is_array() || self.is_struct() || self.is_vector()
    }
    pub fn is_symbolic(&self) -> bool {
        matches!(self, Type::Symbolic(_))
    }

    /// Flattened bit width. Panics on `Void` and on an unresolved
    /// symbolic type, mirroring the lattice's own "unreachable before
    /// fixup" invariant — callers only call this after typing has
    /// settled.
    pub fn bits(&self) -> u32 {
        match self {
            Type::Void(_) => unreachable!("void has no bit representation"),
            Type::Int(t) => t.bits.expect("int width not yet resolved"),
            Type::Float(t) => t.kind.expect("float kind not yet resolved").bits(),
            // addr_space(8) + offset(64) + flags(8), flattened pointer encoding
            Type::Ptr(_) => 80,
            Type::Array(a) => {
                a.elements[0].bits() * a.len.expect("array length not yet resolved")
            }
            Type::Struct(a) => a.elements.iter().map(Type::bits).sum(),
            Type::Vector(v) => v.element.bits() * v.len.expect("vector length not yet resolved"),
            Type::Symbolic(s) => {
                if s.admits_int {
                    return s.int_child.as_ref().unwrap().bits.unwrap_or(0).max(1);
                }
                if s.admits_float {
                    return s.float_child.as_ref().unwrap().kind.map(FloatKind::bits).unwrap_or(32);
                }
                if s.admits_ptr {
                    return 80;
                }
                unreachable!("symbolic type has no admitted scalar kind")
            }
        }
    }

    /// A representative concrete value, used to seed poison states
    /// before a real symbolic value is known.
    pub fn get_dummy_value(&self) -> StateValue {
        match self {
            Type::Void(_) => StateValue::defined(Expr::BoolLit(true)),
            Type::Int(t) => StateValue::defined(Expr::mk_uint(0, t.bits.unwrap_or(1))),
            Type::Float(t) => {
                StateValue::defined(Expr::mk_uint(0, t.kind.map(FloatKind::bits).unwrap_or(32)))
            }
            Type::Ptr(_) => StateValue::defined(Expr::mk_uint(0, self.bits())),
            Type::Array(_) | Type::Struct(_) | Type::Vector(_) => {
                let parts: Vec<StateValue> = self
                    .children()
                    .into_iter()
                    .map(|c| c.to_bv(&c.get_dummy_value()))
                    .collect();
                pack_elements(parts)
            }
            Type::Symbolic(s) => {
                if s.admits_int {
                    return Type::Int((**s.int_child.as_ref().unwrap()).clone()).get_dummy_value();
                }
                if s.admits_float {
                    return Type::Float((**s.float_child.as_ref().unwrap()).clone())
                        .get_dummy_value();
                }
                StateValue::defined(Expr::mk_uint(0, 1))
            }
        }
    }

    /// The SMT constraint a resolved model of this type must satisfy.
    /// This is the heart of the lattice: it is what lets a driver
    /// enumerate valid typing assignments by solving `get_type_constraints`
    /// for src and tgt jointly.
    pub fn get_type_constraints(&self) -> Expr {
        match self {
            Type::Void(_) => Expr::BoolLit(true),
            Type::Int(t) => {
                let bw = t.bits.map(|b| Expr::mk_uint(b as u64, SIZE_VAR_BITS)).unwrap_or_else(
                    || self.size_var(),
                );
                let nonzero = bw.clone().ne(Expr::mk_uint(0, SIZE_VAR_BITS));
                // Matches the source lattice's own restriction: an
                // integer admitted to the undef/poison lane is capped
                // at 64 bits.
                let at_most_64 = bw.ule(Expr::mk_uint(64, SIZE_VAR_BITS));
                nonzero.and(at_most_64)
            }
            Type::Float(t) => match t.kind {
                // Half-precision is intentionally excluded from the
                // solver-visible constraint set: BinOp encodings for it
                // aren't wired up yet (see DESIGN.md).
                Some(FloatKind::Half) => Expr::BoolLit(false),
                Some(_) => Expr::BoolLit(true),
                None => Expr::BoolLit(true),
            },
            Type::Ptr(_) => self.size_var().mk_eq(Expr::mk_uint(self.bits() as u64, SIZE_VAR_BITS)),
            Type::Array(a) => {
                // An array's length is left unconstrained by this
                // lattice; enumerating lengths is a driver concern
                // (tracked in DESIGN.md as a known gap, not a fix).
                let _ = a;
                Expr::BoolLit(false)
            }
            Type::Struct(a) => {
                a.elements.iter().map(Type::get_type_constraints).fold(Expr::BoolLit(true), Expr::and)
            }
            Type::Vector(v) => {
                let mut c = v.element.get_type_constraints();
                c = c.and(v.element.enforce_int_or_float_or_ptr());
                if let Some(n) = v.len {
                    c = c.and(Expr::mk_uint(n as u64, 32).ne(Expr::mk_uint(0, 32)));
                }
                c
            }
            Type::Symbolic(s) => {
                let mut disjuncts = Vec::new();
                let tv = self.type_var();
                if s.admits_int {
                    let child = Type::Int((**s.int_child.as_ref().unwrap()).clone());
                    disjuncts.push(
                        tv.clone()
                            .mk_eq(Expr::mk_uint(TypeKind::Int.as_u64(), TYPE_VAR_BITS))
                            .and(child.get_type_constraints()),
                    );
                }
                if s.admits_float {
                    let child = Type::Float((**s.float_child.as_ref().unwrap()).clone());
                    disjuncts.push(
                        tv.clone()
                            .mk_eq(Expr::mk_uint(TypeKind::Float.as_u64(), TYPE_VAR_BITS))
                            .and(child.get_type_constraints()),
                    );
                }
                if s.admits_ptr {
                    let child = Type::Ptr((**s.ptr_child.as_ref().unwrap()).clone());
                    disjuncts.push(
                        tv.clone()
                            .mk_eq(Expr::mk_uint(TypeKind::Ptr.as_u64(), TYPE_VAR_BITS))
                            .and(child.get_type_constraints()),
                    );
                }
                if s.admits_array {
                    let child = Type::Array((**s.array_child.as_ref().unwrap()).clone());
                    disjuncts.push(
                        tv.clone()
                            .mk_eq(Expr::mk_uint(TypeKind::Array.as_u64(), TYPE_VAR_BITS))
                            .and(child.get_type_constraints()),
                    );
                }
                // Vector/Struct branches are deliberately never added: a
                // symbolic type resolving to a vector-of-struct can't be
                // width-checked by this lattice yet. Callers that need a
                // symbolic aggregate-of-aggregate must reject it
                // explicitly (see `enforce_struct`/`enforce_vector`)
                // rather than silently under-constrain the model.
                Expr::mk_or_fold(disjuncts)
            }
        }
    }

    fn enforce_int_or_float_or_ptr(&self) -> Expr {
        match self {
            Type::Int(_) | Type::Float(_) | Type::Ptr(_) => Expr::BoolLit(true),
            Type::Symbolic(s) => Expr::BoolLit(s.admits_int || s.admits_float || s.admits_ptr),
            _ => Expr::BoolLit(false),
        }
    }

    pub fn enforce_int_type(&self, bits: Option<u32>) -> Expr {
        match self {
            Type::Int(t) => match (t.bits, bits) {
                (Some(a), Some(b)) => Expr::BoolLit(a == b),
                _ => Expr::BoolLit(true),
            },
            Type::Symbolic(s) => {
                let base = Expr::BoolLit(s.admits_int);
                match bits {
                    Some(b) => base.and(self.size_var().mk_eq(Expr::mk_uint(b as u64, SIZE_VAR_BITS))),
                    None => base,
                }
            }
            _ => Expr::BoolLit(false),
        }
    }

    pub fn enforce_float_type(&self) -> Expr {
        match self {
            Type::Float(_) => Expr::BoolLit(true),
            Type::Symbolic(s) => Expr::BoolLit(s.admits_float),
            _ => Expr::BoolLit(false),
        }
    }

    pub fn enforce_ptr_type(&self) -> Expr {
        match self {
            Type::Ptr(_) => Expr::BoolLit(true),
            Type::Symbolic(s) => Expr::BoolLit(s.admits_ptr),
            _ => Expr::BoolLit(false),
        }
    }

    pub fn enforce_struct_type(&self) -> Expr {
        match self {
            Type::Struct(_) => Expr::BoolLit(true),
            // A symbolic type in this lattice never admits struct:
            // matches the documented restriction above.
            _ => Expr::BoolLit(false),
        }
    }

    pub fn enforce_int_or_vector_type(&self) -> Expr {
        match self {
            Type::Int(_) | Type::Vector(_) => Expr::BoolLit(true),
            Type::Symbolic(s) => Expr::BoolLit(s.admits_int),
            _ => Expr::BoolLit(false),
        }
    }

    pub fn enforce_int_or_ptr_or_vector_type(&self) -> Expr {
        match self {
            Type::Int(_) | Type::Ptr(_) | Type::Vector(_) => Expr::BoolLit(true),
            Type::Symbolic(s) => Expr::BoolLit(s.admits_int || s.admits_ptr),
            _ => Expr::BoolLit(false),
        }
    }

    /// Check a concrete element-type list against this (possibly
    /// symbolic) aggregate type: size match plus pairwise element
    /// equality.
    pub fn enforce_aggregate_type(&self, element_types: &[Type]) -> Expr {
        match self {
            Type::Array(a) | Type::Struct(a) => {
                if a.elements.len() != element_types.len() {
                    return Expr::BoolLit(false);
                }
                a.elements
                    .iter()
                    .zip(element_types)
                    .map(|(have, want)| have.structural_eq(want))
                    .fold(Expr::BoolLit(true), Expr::and)
            }
            Type::Symbolic(s) if s.admits_array => {
                let arr = s.array_child.as_ref().unwrap();
                Type::Array((**arr).clone()).enforce_aggregate_type(element_types)
            }
            _ => Expr::BoolLit(false),
        }
    }

    /// Structural (potentially symbolic) equality constraint between
    /// two types, analogous to `operator==` in the lattice this module
    /// is modeled on: concrete-vs-concrete reduces to a plain boolean,
    /// while either side being symbolic yields a real SMT constraint.
    pub fn structural_eq(&self, other: &Type) -> Expr {
        match (self, other) {
            (Type::Void(_), Type::Void(_)) => Expr::BoolLit(true),
            (Type::Int(a), Type::Int(b)) => match (a.bits, b.bits) {
                (Some(x), Some(y)) => Expr::BoolLit(x == y),
                _ => self.size_var().mk_eq(other.size_var()),
            },
            (Type::Float(a), Type::Float(b)) => Expr::BoolLit(a.kind == b.kind),
            (Type::Ptr(a), Type::Ptr(b)) => Expr::BoolLit(a.addr_space == b.addr_space),
            (Type::Array(a), Type::Array(b)) | (Type::Struct(a), Type::Struct(b)) => {
                if a.elements.len() != b.elements.len() {
                    return Expr::BoolLit(false);
                }
                a.elements
                    .iter()
                    .zip(&b.elements)
                    .map(|(x, y)| x.structural_eq(y))
                    .fold(Expr::BoolLit(true), Expr::and)
            }
            (Type::Vector(a), Type::Vector(b)) => {
                let len_eq = Expr::BoolLit(a.len == b.len);
                len_eq.and(a.element.structural_eq(&b.element))
            }
            (Type::Symbolic(a), rhs) if !matches!(rhs, Type::Symbolic(_)) => {
                Self::symbolic_vs_concrete(a, rhs)
            }
            (lhs, Type::Symbolic(b)) if !matches!(lhs, Type::Symbolic(_)) => {
                Self::symbolic_vs_concrete(b, lhs)
            }
            (Type::Symbolic(a), Type::Symbolic(b)) => Self::symbolic_vs_symbolic(a, b),
            _ => Expr::BoolLit(false),
        }
    }

    fn symbolic_vs_concrete(sym: &SymbolicType, concrete: &Type) -> Expr {
        let tv = Type::Symbolic(Box::new(sym.clone())).type_var();
        match concrete {
            Type::Int(_) if sym.admits_int => tv
                .mk_eq(Expr::mk_uint(TypeKind::Int.as_u64(), TYPE_VAR_BITS))
                .and(Type::Int((**sym.int_child.as_ref().unwrap()).clone()).structural_eq(concrete)),
            Type::Float(_) if sym.admits_float => tv
                .mk_eq(Expr::mk_uint(TypeKind::Float.as_u64(), TYPE_VAR_BITS))
                .and(Type::Float((**sym.float_child.as_ref().unwrap()).clone()).structural_eq(concrete)),
            Type::Ptr(_) if sym.admits_ptr => tv
                .mk_eq(Expr::mk_uint(TypeKind::Ptr.as_u64(), TYPE_VAR_BITS))
                .and(Type::Ptr((**sym.ptr_child.as_ref().unwrap()).clone()).structural_eq(concrete)),
            Type::Array(_) if sym.admits_array => tv
                .mk_eq(Expr::mk_uint(TypeKind::Array.as_u64(), TYPE_VAR_BITS))
                .and(Type::Array((**sym.array_child.as_ref().unwrap()).clone()).structural_eq(concrete)),
            // Vector/Struct: the symbolic side never admits these kinds
            // in this lattice, so equality is simply false rather than
            // an under-constrained true.
            _ => Expr::BoolLit(false),
        }
    }

    fn symbolic_vs_symbolic(a: &SymbolicType, b: &SymbolicType) -> Expr {
        let ta = Type::Symbolic(Box::new(a.clone())).type_var();
        let tb = Type::Symbolic(Box::new(b.clone())).type_var();
        let same_choice = ta.mk_eq(tb);
        let mut disjuncts = Vec::new();
        if a.admits_int && b.admits_int {
            disjuncts.push(
                Type::Int((**a.int_child.as_ref().unwrap()).clone())
                    .structural_eq(&Type::Int((**b.int_child.as_ref().unwrap()).clone())),
            );
        }
        if a.admits_float && b.admits_float {
            disjuncts.push(
                Type::Float((**a.float_child.as_ref().unwrap()).clone())
                    .structural_eq(&Type::Float((**b.float_child.as_ref().unwrap()).clone())),
            );
        }
        if a.admits_ptr && b.admits_ptr {
            disjuncts.push(
                Type::Ptr((**a.ptr_child.as_ref().unwrap()).clone())
                    .structural_eq(&Type::Ptr((**b.ptr_child.as_ref().unwrap()).clone())),
            );
        }
        if a.admits_array && b.admits_array {
            disjuncts.push(
                Type::Array((**a.array_child.as_ref().unwrap()).clone())
                    .structural_eq(&Type::Array((**b.array_child.as_ref().unwrap()).clone())),
            );
        }
        same_choice.and(Expr::mk_or_fold(disjuncts))
    }

    /// Whether the two types are guaranteed to have identical shape
    /// regardless of how symbolic slots resolve (used where only a
    /// yes/no answer is needed and a full equality *constraint* would
    /// be overkill, e.g. choosing whether to run a per-element loop).
    pub fn same_shape(&self, other: &Type) -> bool {
        matches!(
            (self, other),
            (Type::Void(_), Type::Void(_))
                | (Type::Int(_), Type::Int(_))
                | (Type::Float(_), Type::Float(_))
                | (Type::Ptr(_), Type::Ptr(_))
                | (Type::Array(_), Type::Array(_))
                | (Type::Struct(_), Type::Struct(_))
                | (Type::Vector(_), Type::Vector(_))
                | (Type::Symbolic(_), _)
                | (_, Type::Symbolic(_))
        )
    }

    /// Resolve this type's unresolved slots (width, kind, chosen branch)
    /// from a satisfying model. No-op on types with nothing left to
    /// resolve.
    pub fn fixup(&mut self, model: &dyn Model) {
        match self {
            Type::Void(_) => {}
            Type::Int(t) => {
                if t.bits.is_none() {
                    if let Some(w) = model.eval_uint(&self.size_var()) {
                        t.bits = Some(w as u32);
                    }
                }
            }
            Type::Float(t) => {
                if t.kind.is_none() {
                    // Width is already baked into FloatKind; nothing in
                    // this lattice leaves a float's precision as a free
                    // model variable once fixup runs — callers resolve
                    // it before construction. Kept as a documented no-op
                    // rather than a panic so partially-built transforms
                    // can still be printed for debugging.
                }
            }
            Type::Ptr(_) => {}
            Type::Array(a) => {
                for elem in &mut a.elements {
                    elem.fixup(model);
                }
            }
            Type::Struct(a) => {
                for elem in &mut a.elements {
                    elem.fixup(model);
                }
            }
            Type::Vector(v) => v.element.fixup(model),
            Type::Symbolic(s) => {
                let choice = model.eval_uint(&self.type_var());
                match choice {
                    Some(v) if v == TypeKind::Int.as_u64() && s.admits_int => {
                        let mut child = Type::Int((**s.int_child.as_ref().unwrap()).clone());
                        child.fixup(model);
                        if let Type::Int(it) = child {
                            *self = Type::Int(it);
                        }
                    }
                    Some(v) if v == TypeKind::Float.as_u64() && s.admits_float => {
                        *self = Type::Float((**s.float_child.as_ref().unwrap()).clone());
                    }
                    Some(v) if v == TypeKind::Ptr.as_u64() && s.admits_ptr => {
                        *self = Type::Ptr((**s.ptr_child.as_ref().unwrap()).clone());
                    }
                    Some(v) if v == TypeKind::Array.as_u64() && s.admits_array => {
                        let mut child = Type::Array((**s.array_child.as_ref().unwrap()).clone());
                        child.fixup(model);
                        *self = child;
                    }
                    _ => {}
                }
            }
        }
    }

    /// Build a fresh input value of this type: a flat bitvector variable
    /// for scalars, a concatenation of fresh per-element inputs for
    /// aggregates, with each element's own poison bit packed into a
    /// width-`elements` vector (element 0's bit occupying the highest
    /// position, mirroring the value layout).
    pub fn mk_input(&self, name: &str) -> StateValue {
        match self {
            Type::Void(_) => StateValue::defined(Expr::BoolLit(true)),
            Type::Int(_) | Type::Float(_) | Type::Ptr(_) => {
                StateValue::defined(Expr::bv_var(name, self.bits().max(1)))
            }
            Type::Array(_) | Type::Struct(_) | Type::Vector(_) => {
                let parts: Vec<StateValue> = self
                    .children()
                    .into_iter()
                    .enumerate()
                    .map(|(i, c)| c.to_bv(&c.mk_input(&format!("{name}#{i}"))))
                    .collect();
                pack_elements(parts)
            }
            Type::Symbolic(s) => {
                if s.admits_int {
                    return Type::Int((**s.int_child.as_ref().unwrap()).clone()).mk_input(name);
                }
                if s.admits_float {
                    return Type::Float((**s.float_child.as_ref().unwrap()).clone()).mk_input(name);
                }
                StateValue::defined(Expr::bv_var(name, 1))
            }
        }
    }

    /// Flatten a value of this type into its lossless `(value,
    /// non_poison)` pair: the identity for scalars, since this lattice
    /// always keeps a `StateValue` in flat form already; callers
    /// (`mk_input`, `get_dummy_value`) use it to fold a child's own
    /// poison term — which may itself already be a width-`elements`
    /// vector if the child is a nested aggregate — down to the single
    /// summary bit its parent's own poison vector has room for.
    pub fn to_bv(&self, sv: &StateValue) -> StateValue {
        StateValue::new(sv.value.clone(), summarize_poison_bit(&sv.non_poison))
    }

    /// Reconstruct a `StateValue` of this type from a flat bitvector
    /// produced by `to_bv`.
    pub fn from_bv(&self, bv: &Expr) -> StateValue {
        StateValue::defined(bv.clone())
    }

    /// Extract the `index`-th element of an aggregate value by a
    /// statically-known index, including its own poison bit: element
    /// `i` of `elements` sits at bit `(elements - i - 1)` of `val`'s
    /// packed poison vector (§4.1's element-0-high convention applied to
    /// a one-bit-per-element encoding). Falls back to summarizing the
    /// whole of `val.non_poison` as a single bit when it isn't already a
    /// packed vector of the right width — e.g. a plain
    /// `StateValue::defined`/`StateValue::poison` built outside
    /// `mk_input`/`get_dummy_value`.
    pub fn extract(&self, val: &StateValue, index: u32) -> StateValue {
        let children = self.children();
        assert!((index as usize) < children.len(), "aggregate index out of range");
        let elem_bits = children[index as usize].bits();
        let bits_after: u32 =
            children[(index as usize + 1)..].iter().map(|c| c.bits()).sum();
        let lo = bits_after;
        let hi = lo + elem_bits - 1;
        let value = val.value.clone().extract(hi, lo);

        let elements = children.len() as u32;
        let non_poison = if val.non_poison.width() == elements {
            let bit = elements - index - 1;
            val.non_poison.clone().extract(bit, bit)
        } else {
            summarize_poison_bit(&val.non_poison)
        };

        StateValue::new(value, non_poison)
    }

    /// Extract by a dynamically-computed (symbolic) index; used where
    /// the index itself is a runtime value rather than a literal.
    pub fn extract_dynamic(&self, val: &StateValue, _index: &Expr) -> StateValue {
        // A fully general dynamic extract needs a shift-then-extract-top
        // sequence over the flattened representation; out of scope for
        // the scalar/static-index scenarios this checker targets today.
        val.clone()
    }

    /// Element-wise reduction over an aggregate's children, applying
    /// `map` pairwise to corresponding elements of `a` and `b` and
    /// folding the results with `reduce`. For a scalar type this is
    /// just `map(a, b)`.
    pub fn map_reduce(
        &self,
        a: &StateValue,
        b: &StateValue,
        map: &dyn Fn(&StateValue, &StateValue) -> Expr,
        reduce: &dyn Fn(Expr, Expr) -> Expr,
    ) -> Expr {
        let children = self.children();
        if children.is_empty() {
            return map(a, b);
        }
        let mut acc: Option<Expr> = None;
        for (i, child_ty) in children.iter().enumerate() {
            let ea = self.extract(a, i as u32);
            let eb = self.extract(b, i as u32);
            let sub = child_ty.map_reduce(&ea, &eb, map, reduce);
            acc = Some(match acc {
                Some(prev) => reduce(prev, sub),
                None => sub,
            });
        }
        acc.unwrap_or_else(|| map(a, b))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void(_) => write!(f, "void"),
            Type::Int(t) => match t.bits {
                Some(b) => write!(f, "i{b}"),
                None => write!(f, "i?"),
            },
            Type::Float(t) => match t.kind {
                Some(k) => write!(f, "{k}"),
                None => write!(f, "float?"),
            },
            Type::Ptr(t) => {
                if t.addr_space == 0 {
                    write!(f, "*")
                } else {
                    write!(f, "as({})*", t.addr_space)
                }
            }
            Type::Array(a) => {
                write!(f, "[")?;
                if let Some(e) = a.elements.first() {
                    write!(f, "{e}")?;
                }
                write!(f, " x {}]", a.len.map(|n| n.to_string()).unwrap_or_else(|| "?".into()))
            }
            Type::Struct(a) => {
                write!(f, "{{")?;
                for (i, e) in a.elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "}}")
            }
            Type::Vector(v) => {
                write!(f, "<{} x {}>", v.len.map(|n| n.to_string()).unwrap_or_else(|| "?".into()), v.element)
            }
            Type::Symbolic(_) => write!(f, "?"),
        }
    }
}
