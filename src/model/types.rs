//! Core types shared by the symbolic model and the method builder.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::symbolic::{free_symbols_all, Expr, Symbol};

/// A named symbolic quantity: one expression or an ordered list of them.
#[derive(Debug, Clone, PartialEq)]
pub enum NamedExpr {
    /// Scalar-valued expression
    Scalar(Expr),
    /// Vector-valued expression (may be empty)
    Vector(Vec<Expr>),
}

impl NamedExpr {
    /// Components as a slice (one element for scalars).
    pub fn components(&self) -> &[Expr] {
        match self {
            Self::Scalar(e) => std::slice::from_ref(e),
            Self::Vector(v) => v,
        }
    }

    /// Whether the quantity is vector-valued.
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }

    /// Apply `f` to every component, preserving the shape.
    pub fn map(&self, f: impl Fn(&Expr) -> Expr) -> Self {
        match self {
            Self::Scalar(e) => Self::Scalar(f(e)),
            Self::Vector(v) => Self::Vector(v.iter().map(f).collect()),
        }
    }

    /// Union of the free symbols of all components.
    pub fn free_symbols(&self) -> std::collections::BTreeSet<Symbol> {
        free_symbols_all(self.components())
    }
}

impl fmt::Display for NamedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(e) => write!(f, "{}", e),
            Self::Vector(v) => {
                f.write_str("[")?;
                for (i, e) in v.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Insertion-ordered registry of named expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExprRegistry {
    entries: Vec<(String, NamedExpr)>,
}

impl ExprRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an expression.
    pub fn insert(&mut self, name: impl Into<String>, expr: NamedExpr) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, e)) => *e = expr,
            None => self.entries.push((name, expr)),
        }
    }

    /// Look up an expression by name.
    pub fn get(&self, name: &str) -> Option<&NamedExpr> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    /// Registered names, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// `(name, expr)` pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NamedExpr)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e))
    }

    /// Number of registered expressions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Dimensions of a port-Hamiltonian system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dims {
    /// Number of states
    pub x: usize,
    /// Number of dissipation variables
    pub w: usize,
    /// Number of ports (inputs = outputs)
    pub y: usize,
    /// Number of runtime parameters
    pub p: usize,
}

impl Dims {
    /// Size of the square structure matrix.
    pub fn structure(&self) -> usize {
        self.x + self.w + self.y
    }
}

/// Which block of the structure matrix a variable belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    /// Storage rows/columns (`dx/dt` and `dxH`)
    Storage,
    /// Dissipation rows/columns (`w` and `z`)
    Dissipation,
    /// Port rows/columns (`-y` and `u`)
    Port,
}

/// Anything that exposes a finalized registry of named expressions over a
/// canonical argument list.
///
/// Implemented by the symbolic core and by the discrete-time method; the
/// numerical evaluation layer only depends on this trait.
pub trait ExprSource: Clone {
    /// Canonical ordered list of all argument symbols.
    fn args(&self) -> Vec<Symbol>;

    /// Named expression registry.
    fn registry(&self) -> &ExprRegistry;

    /// Substitutions still to be applied before numerical evaluation.
    fn subs(&self) -> &BTreeMap<Symbol, f64>;

    /// Whether the registry has been finalized.
    fn is_built(&self) -> bool;

    /// Finalize the registry. Idempotent.
    fn build_exprs(&mut self) -> Result<()>;
}
