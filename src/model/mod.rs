//! Symbolic port-Hamiltonian core model.
//!
//! This module provides the symbolic representation of a system before
//! discretization. The [`PhsCore`] struct holds the state, dissipation, port
//! and parameter symbols, the storage and dissipation functions, and the
//! structure matrix entries. Calling [`ExprSource::build_exprs`] validates
//! the model and fills its registry of named expressions (`H`, `dxH`, `z`,
//! `y`).

mod from_ast;
mod system;
mod types;
mod validate;

pub use system::{PhsCore, INCREMENT_PREFIX};
pub use types::{Block, Dims, ExprRegistry, ExprSource, NamedExpr};
pub use validate::validate_core;
