//! Core validation.

use std::collections::BTreeSet;

use crate::error::{PhsError, Result};
use crate::symbolic::{Expr, Symbol};

use super::PhsCore;

/// Validate a core before its expressions are built.
///
/// Checks:
/// - the storage function only depends on states, parameters and constants
/// - each dissipation function only depends on dissipation variables,
///   parameters and constants
/// - structure-matrix entries only depend on parameters and constants
pub fn validate_core(core: &PhsCore) -> Result<()> {
    let constants: Vec<Symbol> = core.constants().keys().cloned().collect();

    let storage_scope: BTreeSet<&Symbol> = core.x().iter().chain(core.p()).chain(&constants).collect();
    check_scope(core.h(), &storage_scope)?;

    let dissipation_scope: BTreeSet<&Symbol> = core.w().iter().chain(core.p()).chain(&constants).collect();
    for z in core.z() {
        check_scope(z, &dissipation_scope)?;
    }

    let structure_scope: BTreeSet<&Symbol> = core.p().iter().chain(&constants).collect();
    let m = core.structure_matrix()?;
    for i in 0..m.rows() {
        for entry in m.row(i) {
            check_scope(entry, &structure_scope)?;
        }
    }

    Ok(())
}

fn check_scope(expr: &Expr, scope: &BTreeSet<&Symbol>) -> Result<()> {
    match expr.free_symbols().into_iter().find(|s| !scope.contains(s)) {
        Some(s) => Err(PhsError::unresolved(s.name(), expr.to_string())),
        None => Ok(()),
    }
}
