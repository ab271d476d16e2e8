//! Compilation of named expressions into numeric evaluators.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{instrument, trace};

use super::bytecode::Program;
use super::value::Value;
use crate::error::{PhsError, Result};
use crate::model::{ExprSource, NamedExpr};
use crate::symbolic::{Expr, Symbol};

/// A named expression compiled against the canonical argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    programs: Vec<Program>,
    vector: bool,
    args: Vec<Symbol>,
    inds: Vec<usize>,
}

impl CompiledExpr {
    /// Compile `expr` against `canonical`, after substituting `subs`.
    ///
    /// The evaluator only consumes the free symbols of the expression, in
    /// canonical order; `inds` holds their canonical positions.
    pub fn compile(
        expr: &NamedExpr,
        canonical: &[Symbol],
        subs: &BTreeMap<Symbol, f64>,
    ) -> Result<Self> {
        let components: Vec<Expr> = expr.components().iter().map(|e| e.subs_num(subs)).collect();

        let mut free = BTreeSet::new();
        for c in &components {
            c.collect_symbols(&mut free);
        }
        if let Some(missing) = free.iter().find(|s| !canonical.contains(s)) {
            let owner = components.iter().find(|c| c.contains(missing));
            return Err(PhsError::unresolved(
                missing.name(),
                owner.map(|c| c.to_string()).unwrap_or_default(),
            ));
        }

        let (inds, args): (Vec<usize>, Vec<Symbol>) = canonical
            .iter()
            .enumerate()
            .filter(|(_, s)| free.contains(*s))
            .map(|(i, s)| (i, s.clone()))
            .unzip();

        let slot = |s: &Symbol| args.iter().position(|a| a == s);
        let programs = components
            .iter()
            .map(|c| Program::compile(c, &slot))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            programs,
            vector: expr.is_vector(),
            args,
            inds,
        })
    }

    /// Ordered argument symbols consumed by [`Self::call`].
    pub fn args(&self) -> &[Symbol] {
        &self.args
    }

    /// Canonical positions of [`Self::args`].
    pub fn inds(&self) -> &[usize] {
        &self.inds
    }

    pub fn is_vector(&self) -> bool {
        self.vector
    }

    /// Evaluate with `values` laid out as [`Self::args`].
    pub fn call(&self, values: &[f64]) -> Value {
        let out: Vec<f64> = self.programs.iter().map(|p| p.eval(values)).collect();
        if self.vector {
            Value::Vector(out)
        } else {
            Value::Scalar(out.first().copied().unwrap_or(f64::NAN))
        }
    }

    /// Gather the arguments from a full canonical vector and evaluate.
    pub fn eval_at(&self, canonical_values: &[f64]) -> Value {
        let values: Vec<f64> = self.inds.iter().map(|&i| canonical_values[i]).collect();
        self.call(&values)
    }
}

/// Compiled evaluators for every named expression of a source.
#[derive(Debug, Clone)]
pub struct NumericalEval {
    args: Vec<Symbol>,
    exprs: Vec<(String, CompiledExpr)>,
}

impl NumericalEval {
    /// Compile every expression of `source`.
    ///
    /// The source is snapshotted; if it is not built yet, it is built once
    /// on the snapshot.
    #[instrument(skip_all)]
    pub fn new<S: ExprSource>(source: &S) -> Result<Self> {
        let mut source = source.clone();
        if !source.is_built() {
            source.build_exprs()?;
            if !source.is_built() {
                return Err(PhsError::build("expressions are still not built after build_exprs"));
            }
        }

        let args = source.args();
        let mut exprs = Vec::with_capacity(source.registry().len());
        for (name, expr) in source.registry().iter() {
            let compiled = CompiledExpr::compile(expr, &args, source.subs())?;
            trace!(name, nargs = compiled.args().len(), "compiled expression");
            exprs.push((name.to_string(), compiled));
        }
        Ok(Self { args, exprs })
    }

    /// Canonical argument list.
    pub fn args(&self) -> &[Symbol] {
        &self.args
    }

    /// Compiled expression by name.
    pub fn get(&self, name: &str) -> Option<&CompiledExpr> {
        self.exprs.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// `(name, compiled)` pairs in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CompiledExpr)> {
        self.exprs.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}
