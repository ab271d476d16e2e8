//! Discrete gradients of the storage function.

use std::collections::BTreeMap;

use crate::config::GradientScheme;
use crate::symbolic::{Expr, Symbol};

/// Storage function and its continuous gradient over states `x` with
/// increments `dx`.
pub(crate) struct Storage<'a> {
    pub h: &'a Expr,
    pub grad: &'a [Expr],
    pub x: &'a [Symbol],
    pub dx: &'a [Symbol],
}

impl Storage<'_> {
    /// Map every state `x_i` to `x_i + factor * dx_i`.
    fn shift(&self, factor: f64) -> BTreeMap<Symbol, Expr> {
        self.x
            .iter()
            .zip(self.dx)
            .map(|(x, dx)| (x.clone(), Expr::sym(x) + Expr::num(factor) * Expr::sym(dx)))
            .collect()
    }

    fn gradient_at(&self, shift: &BTreeMap<Symbol, Expr>) -> Vec<Expr> {
        self.grad.iter().map(|g| g.subs(shift)).collect()
    }

    /// Discrete gradient for the chosen scheme.
    ///
    /// `linear[i]` marks states whose gradient is affine; for the discrete
    /// scheme those use the midpoint rule, which is exact for quadratic
    /// storage. Nonlinear states use a sequential difference quotient so
    /// that `sum(dxH_i * dx_i) == H(x + dx) - H(x)`. Increments smaller than
    /// `eps` fall back to the midpoint gradient.
    pub fn discrete_gradient(&self, scheme: GradientScheme, theta: f64, linear: &[bool], eps: f64) -> Vec<Expr> {
        match scheme {
            GradientScheme::Theta => self.gradient_at(&self.shift(theta)),
            GradientScheme::Trapezoidal => {
                let after = self.gradient_at(&self.shift(1.0));
                self.grad
                    .iter()
                    .zip(after)
                    .map(|(g0, g1)| Expr::num(0.5) * (g0.clone() + g1))
                    .collect()
            }
            GradientScheme::Discrete => self.itoh_abe(linear, eps),
        }
    }

    fn itoh_abe(&self, linear: &[bool], eps: f64) -> Vec<Expr> {
        let mut out = self.gradient_at(&self.shift(0.5));
        let mut advanced: BTreeMap<Symbol, Expr> = BTreeMap::new();

        for i in (0..self.x.len()).filter(|&i| !linear[i]) {
            let (x, dx) = (&self.x[i], &self.dx[i]);
            let before = self.h.subs(&advanced);

            let mut midpoint = advanced.clone();
            midpoint.insert(x.clone(), Expr::sym(x) + Expr::num(0.5) * Expr::sym(dx));
            let fallback = self.grad[i].subs(&midpoint);

            advanced.insert(x.clone(), Expr::sym(x) + Expr::sym(dx));
            let after = self.h.subs(&advanced);

            let quotient = (after - before) / Expr::sym(dx);
            out[i] = Expr::select(Expr::sym(dx).abs() - Expr::num(eps), quotient, fallback);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(e: &Expr, vals: &BTreeMap<Symbol, f64>) -> f64 {
        e.subs_num(vals).as_num().expect("numeric")
    }

    fn values(pairs: &[(&str, f64)]) -> BTreeMap<Symbol, f64> {
        pairs.iter().map(|(n, v)| (Symbol::new(n), *v)).collect()
    }

    #[test]
    fn test_discrete_gradient_is_energy_exact() {
        let x = vec![Symbol::new("a"), Symbol::new("b")];
        let dx = vec![Symbol::new("da"), Symbol::new("db")];
        let (a, b) = (Expr::var("a"), Expr::var("b"));
        let h = a.clone().powi(4) / Expr::num(4.0) + a.clone() * b.clone().powi(2) + Expr::call(crate::symbolic::Func::Cosh, b);
        let grad: Vec<Expr> = x.iter().map(|s| h.diff(s)).collect();
        let storage = Storage { h: &h, grad: &grad, x: &x, dx: &dx };

        let dxh = storage.discrete_gradient(GradientScheme::Discrete, 0.0, &[false, false], 1e-12);

        let vals = values(&[("a", 0.3), ("b", -0.7), ("da", 0.05), ("db", 0.11)]);
        let lhs = eval(&dxh[0], &vals) * 0.05 + eval(&dxh[1], &vals) * 0.11;
        let after = values(&[("a", 0.35), ("b", -0.59)]);
        let before = values(&[("a", 0.3), ("b", -0.7)]);
        assert_relative_eq!(lhs, eval(&h, &after) - eval(&h, &before), epsilon = 1e-12);
    }

    #[test]
    fn test_small_increment_falls_back_to_midpoint() {
        let x = vec![Symbol::new("a")];
        let dx = vec![Symbol::new("da")];
        let h = Expr::var("a").powi(4) / Expr::num(4.0);
        let grad: Vec<Expr> = vec![h.diff(&x[0])];
        let storage = Storage { h: &h, grad: &grad, x: &x, dx: &dx };

        let dxh = storage.discrete_gradient(GradientScheme::Discrete, 0.0, &[false], 1e-9);
        let vals = values(&[("a", 2.0), ("da", 0.0)]);
        assert_relative_eq!(eval(&dxh[0], &vals), 8.0);
    }

    #[test]
    fn test_linear_state_uses_midpoint() {
        let x = vec![Symbol::new("q")];
        let dx = vec![Symbol::new("dq")];
        let h = Expr::num(5.0) * Expr::var("q").powi(2);
        let grad: Vec<Expr> = vec![h.diff(&x[0])];
        let storage = Storage { h: &h, grad: &grad, x: &x, dx: &dx };

        let dxh = storage.discrete_gradient(GradientScheme::Discrete, 0.0, &[true], 1e-9);
        assert!(!matches!(dxh[0], Expr::Select { .. }));
        // 10 * (q + dq / 2)
        assert_relative_eq!(eval(&dxh[0], &values(&[("q", 1.0), ("dq", 0.4)])), 12.0);
    }

    #[test]
    fn test_theta_and_trapezoidal() {
        let x = vec![Symbol::new("a")];
        let dx = vec![Symbol::new("da")];
        let h = Expr::var("a").powi(3);
        let grad: Vec<Expr> = vec![h.diff(&x[0])];
        let storage = Storage { h: &h, grad: &grad, x: &x, dx: &dx };
        let vals = values(&[("a", 1.0), ("da", 2.0)]);

        let theta = storage.discrete_gradient(GradientScheme::Theta, 0.25, &[false], 0.0);
        // 3 * (1 + 0.5)^2
        assert_relative_eq!(eval(&theta[0], &vals), 6.75);

        let trapez = storage.discrete_gradient(GradientScheme::Trapezoidal, 0.0, &[false], 0.0);
        // (3 * 1 + 3 * 9) / 2
        assert_relative_eq!(eval(&trapez[0], &vals), 15.0);
    }
}
