//! Numerical evaluation and runtime.
//!
//! [`NumericalEval`] compiles every named expression of an
//! [`ExprSource`](crate::model::ExprSource) into stack bytecode bound to the
//! canonical argument list. [`NumericalCore`] owns the flat argument vector
//! and executes a [`Method`](crate::method::Method)'s action list once per
//! sample.

mod bytecode;
mod eval;
mod runtime;
mod value;

pub use bytecode::Program;
pub use eval::{CompiledExpr, NumericalEval};
pub use runtime::{ArgGroup, NumericalCore, StepReport};
pub use value::Value;
