//! Linear/nonlinear partition of states and dissipation variables.

use crate::symbolic::{SymMatrix, Symbol};

/// Flag each variable as linear (`true`) or nonlinear (`false`).
///
/// `jac` is the Jacobian of the variable's constitutive law with respect to
/// `vars` (the Hessian of `H` for states, the Jacobian of `z` for
/// dissipation variables). A variable is linear when its Jacobian row does
/// not depend on `vars` and has no structural coupling with a nonlinear
/// variable. The second condition is applied until a fixed point is reached,
/// so nonlinearity spreads along coupling chains.
pub(crate) fn linear_mask(jac: &SymMatrix, vars: &[Symbol]) -> Vec<bool> {
    let n = vars.len();
    let mut linear: Vec<bool> = (0..n).map(|i| !jac.row(i).iter().any(|e| e.contains_any(vars))).collect();

    loop {
        let mut changed = false;
        for i in 0..n {
            if !linear[i] {
                continue;
            }
            let coupled = (0..n).any(|j| !linear[j] && (!jac.get(i, j).is_zero() || !jac.get(j, i).is_zero()));
            if coupled {
                linear[i] = false;
                changed = true;
            }
        }
        if !changed {
            return linear;
        }
    }
}
