//! Symbolic algebra used to describe and discretize port-Hamiltonian systems.
//!
//! The algebra is intentionally small: expression trees with a canonical
//! form, differentiation and substitution ([`expr`]), plus dense symbolic
//! matrices with guarded inversion and matrix-vector products
//! ([`matrix`]).

mod expr;
mod matrix;

pub use expr::{canonical_cmp, free_symbols_all, norm2, Expr, Func, Symbol};
pub use matrix::{inverse, matvecprod, SymMatrix};
