//! Live numeric state and step driver.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::eval::{CompiledExpr, NumericalEval};
use super::value::Value;
use crate::config::SimulationConfig;
use crate::error::{PhsError, Result};
use crate::method::{Action, Command, Method};

/// Index positions of a named group in the argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgGroup {
    pub inds: Vec<usize>,
}

/// A compiled expression bound to its last evaluated value.
#[derive(Debug, Clone)]
struct FuncSlot {
    compiled: CompiledExpr,
    cached: Value,
}

/// Outcome of one call to [`NumericalCore::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Rounds run by each iterative action, in action order.
    pub iterations: Vec<usize>,
    /// Whether every iterative action stopped on tolerance rather than on
    /// the iteration cap.
    pub converged: bool,
}

impl StepReport {
    /// Largest round count over the iterative actions.
    pub fn max_iterations(&self) -> usize {
        self.iterations.iter().copied().max().unwrap_or(0)
    }
}

/// Runtime of a discrete-time method.
///
/// Holds a single flat argument vector; groups are fixed index views into
/// it and expressions are compiled evaluators with a cached last value.
/// Hitting `maxit` in an iterative action is not an error: the loop stops
/// with whatever state it reached and [`StepReport::converged`] is false.
#[derive(Debug, Clone)]
pub struct NumericalCore {
    config: SimulationConfig,
    args: Vec<f64>,
    groups: BTreeMap<String, ArgGroup>,
    funcs: BTreeMap<String, FuncSlot>,
    actions: Arc<[Action]>,
    nx: usize,
    ny: usize,
    np: usize,
}

impl NumericalCore {
    /// Compile `method` and set up a zeroed state.
    pub fn new(method: &Method) -> Result<Self> {
        let eval = NumericalEval::new(method)?;
        let args = vec![0.0; eval.args().len()];

        let mut groups = BTreeMap::new();
        for (name, inds) in method.groups() {
            if let Some(&bad) = inds.iter().find(|&&i| i >= args.len()) {
                return Err(PhsError::dimension(format!("group '{}' index", name), args.len(), bad));
            }
            groups.insert(name.clone(), ArgGroup { inds: inds.clone() });
        }

        let mut funcs = BTreeMap::new();
        for (name, compiled) in eval.iter() {
            if groups.contains_key(name) {
                return Err(PhsError::DuplicateSymbol { name: name.to_string() });
            }
            let cached = compiled.eval_at(&args);
            funcs.insert(
                name.to_string(),
                FuncSlot {
                    compiled: compiled.clone(),
                    cached,
                },
            );
        }

        for action in method.actions() {
            for command in action.commands() {
                if !funcs.contains_key(command.source()) {
                    return Err(PhsError::unknown_field(command.source()));
                }
                if !funcs.contains_key(command.target()) && !groups.contains_key(command.target()) {
                    return Err(PhsError::unknown_field(command.target()));
                }
            }
        }

        debug!(
            label = method.label(),
            nargs = args.len(),
            nexprs = funcs.len(),
            "numerical core ready"
        );

        Ok(Self {
            config: method.config().clone(),
            args,
            groups,
            funcs,
            actions: method.actions().into(),
            nx: method.nx(),
            ny: method.ny(),
            np: method.np(),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The whole argument vector.
    pub fn args(&self) -> &[f64] {
        &self.args
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn np(&self) -> usize {
        self.np
    }

    /// Current values of a group (empty for an empty group).
    pub fn get(&self, name: &str) -> Result<Vec<f64>> {
        let group = self.group(name)?;
        Ok(group.inds.iter().map(|&i| self.args[i]).collect())
    }

    /// Scatter `values` into a group.
    pub fn set(&mut self, name: &str, values: &[f64]) -> Result<()> {
        let group = self.groups.get(name).ok_or_else(|| PhsError::unknown_field(name))?;
        if group.inds.len() != values.len() {
            return Err(PhsError::dimension(name, group.inds.len(), values.len()));
        }
        for (&i, &v) in group.inds.iter().zip(values) {
            self.args[i] = v;
        }
        Ok(())
    }

    /// Evaluate an expression at the current state, without caching.
    pub fn evaluate(&self, name: &str) -> Result<Value> {
        Ok(self.slot(name)?.compiled.eval_at(&self.args))
    }

    /// Last cached value of an expression.
    pub fn value(&self, name: &str) -> Result<&Value> {
        Ok(&self.slot(name)?.cached)
    }

    /// Overwrite the cached value of an expression.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<()> {
        let slot = self
            .funcs
            .get_mut(name)
            .ok_or_else(|| PhsError::unknown_field(name))?;
        if slot.cached.is_vector() != value.is_vector() || slot.cached.len() != value.len() {
            return Err(PhsError::DimensionError {
                what: name.to_string(),
                expected: shape(&slot.cached),
                actual: shape(&value),
            });
        }
        slot.cached = value;
        Ok(())
    }

    /// Store `value` into a group (scatter) or an expression cache.
    pub fn store(&mut self, target: &str, value: Value) -> Result<()> {
        if self.groups.contains_key(target) {
            self.set(target, value.as_slice())
        } else {
            self.set_value(target, value)
        }
    }

    /// Set the state vector.
    pub fn init_state(&mut self, x0: &[f64]) -> Result<()> {
        if x0.len() != self.nx {
            return Err(PhsError::dimension("x0", self.nx, x0.len()));
        }
        self.set("x", x0)
    }

    /// Advance the system by one sample.
    ///
    /// `None` inputs or parameters default to zeros.
    pub fn update(&mut self, u: Option<&[f64]>, p: Option<&[f64]>) -> Result<StepReport> {
        let u = checked_input("u", u, self.ny)?;
        let p = checked_input("p", p, self.np)?;
        self.set("u", &u)?;
        self.set("p", &p)?;

        let mut report = StepReport {
            iterations: Vec::new(),
            converged: true,
        };
        let actions = Arc::clone(&self.actions);
        for action in actions.iter() {
            match action {
                Action::Evaluate(commands) => self.exec(commands)?,
                Action::IterateUntilConverged {
                    commands,
                    residual,
                    step,
                } => {
                    let (rounds, converged) = self.iterate(commands, residual, step)?;
                    report.iterations.push(rounds);
                    report.converged &= converged;
                }
            }
        }
        Ok(report)
    }

    fn exec(&mut self, commands: &[Command]) -> Result<()> {
        for command in commands {
            let value = self.evaluate(command.source())?;
            self.store(command.target(), value)?;
        }
        Ok(())
    }

    fn iterate(&mut self, commands: &[Command], residual: &str, step: &str) -> Result<(usize, bool)> {
        let eps = self.config.eps;
        let maxit = self.config.maxit;
        let step_one = self.value(step)?.zeroed();
        self.set_value(step, fill(step_one, 1.0))?;

        let mut res = self.value(residual)?.magnitude();
        let mut delta = self.value(step)?.magnitude();
        let mut it = 0;
        while res > eps && delta > eps && it < maxit {
            self.exec(commands)?;
            it += 1;
            res = self.value(residual)?.magnitude();
            delta = self.value(step)?.magnitude();
        }

        let converged = res <= eps || delta <= eps;
        if !converged {
            debug!(iterations = it, residual = res, step = delta, "iteration stopped before convergence");
        }
        Ok((it, converged))
    }

    fn group(&self, name: &str) -> Result<&ArgGroup> {
        self.groups.get(name).ok_or_else(|| PhsError::unknown_field(name))
    }

    fn slot(&self, name: &str) -> Result<&FuncSlot> {
        self.funcs.get(name).ok_or_else(|| PhsError::unknown_field(name))
    }
}

fn checked_input(what: &str, values: Option<&[f64]>, n: usize) -> Result<Vec<f64>> {
    let values = values.map_or_else(|| vec![0.0; n], <[f64]>::to_vec);
    if values.len() != n {
        return Err(PhsError::dimension(what, n, values.len()));
    }
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(PhsError::DimensionError {
            what: what.to_string(),
            expected: "finite values".to_string(),
            actual: bad.to_string(),
        });
    }
    Ok(values)
}

fn fill(value: Value, with: f64) -> Value {
    match value {
        Value::Scalar(_) => Value::Scalar(with),
        Value::Vector(v) => Value::Vector(vec![with; v.len()]),
    }
}

fn shape(value: &Value) -> String {
    match value {
        Value::Scalar(_) => "scalar".to_string(),
        Value::Vector(v) => format!("vector of length {}", v.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GradientScheme;
    use crate::model::{ExprRegistry, NamedExpr, PhsCore};
    use crate::symbolic::{Expr, Symbol};
    use approx::assert_relative_eq;

    /// A runtime over a single counter `c` with `inc = c + 1` and a constant
    /// residual.
    fn counter(residual: f64, maxit: usize) -> NumericalCore {
        let mut exprs = ExprRegistry::new();
        exprs.insert("inc", NamedExpr::Vector(vec![Expr::var("c") + Expr::one()]));
        exprs.insert("res", NamedExpr::Scalar(Expr::num(residual)));
        exprs.insert("step", NamedExpr::Scalar(Expr::one()));
        let groups: BTreeMap<String, Vec<usize>> = [
            ("c".to_string(), vec![0]),
            ("u".to_string(), Vec::new()),
            ("p".to_string(), Vec::new()),
        ]
        .into();
        let actions = vec![Action::IterateUntilConverged {
            commands: vec![Command::cross_update("c", "inc")],
            residual: "res".to_string(),
            step: "step".to_string(),
        }];
        let config = SimulationConfig::new().with_max_iterations(maxit);
        let method = Method::from_parts("counter", vec![Symbol::new("c")], exprs, groups, actions, config);
        NumericalCore::new(&method).unwrap()
    }

    fn lc(fs: f64) -> NumericalCore {
        let mut core = PhsCore::new("lc");
        core.set_const("C", 2.0).unwrap();
        core.set_const("L", 0.5).unwrap();
        core.add_storage("q", Expr::var("q").powi(2) / (Expr::num(2.0) * Expr::var("C")))
            .unwrap();
        core.add_storage("phi", Expr::var("phi").powi(2) / (Expr::num(2.0) * Expr::var("L")))
            .unwrap();
        core.connect("q", "phi", Expr::one()).unwrap();
        let method = Method::new(&core, &SimulationConfig::new().with_sample_rate(fs)).unwrap();
        NumericalCore::new(&method).unwrap()
    }

    fn hardening_spring(config: &SimulationConfig) -> NumericalCore {
        let mut core = PhsCore::new("spring");
        core.set_const("k", 100.0).unwrap();
        core.add_storage(
            "xs",
            Expr::var("k") * (Expr::var("xs").powi(2) / Expr::num(2.0) + Expr::var("xs").powi(4) / Expr::num(4.0)),
        )
        .unwrap();
        core.add_storage("pm", Expr::var("pm").powi(2) / Expr::num(2.0)).unwrap();
        core.connect("xs", "pm", Expr::one()).unwrap();
        let method = Method::new(&core, config).unwrap();
        NumericalCore::new(&method).unwrap()
    }

    #[test]
    fn test_converged_loop_runs_zero_rounds() {
        let mut num = counter(0.0, 10);
        let report = num.update(None, None).unwrap();
        assert_eq!(report.iterations, vec![0]);
        assert!(report.converged);
        assert_eq!(num.get("c").unwrap(), vec![0.0]);
    }

    #[test]
    fn test_stuck_loop_stops_at_cap_without_error() {
        let mut num = counter(1.0, 7);
        let report = num.update(None, None).unwrap();
        assert_eq!(report.iterations, vec![7]);
        assert!(!report.converged);
        assert_eq!(num.get("c").unwrap(), vec![7.0]);
    }

    #[test]
    fn test_zero_cap_skips_iteration() {
        let mut num = counter(1.0, 0);
        let report = num.update(None, None).unwrap();
        assert_eq!(report.iterations, vec![0]);
        assert!(!report.converged);
        assert_eq!(num.get("c").unwrap(), vec![0.0]);
    }

    #[test]
    fn test_small_step_stops_loop() {
        // the step collapses after one round while the residual stays at 1
        let mut exprs = ExprRegistry::new();
        exprs.insert("inc", NamedExpr::Vector(vec![Expr::var("c") + Expr::one()]));
        exprs.insert("res", NamedExpr::Scalar(Expr::one()));
        exprs.insert("step", NamedExpr::Scalar(Expr::zero()));
        let groups: BTreeMap<String, Vec<usize>> = [
            ("c".to_string(), vec![0]),
            ("u".to_string(), Vec::new()),
            ("p".to_string(), Vec::new()),
        ]
        .into();
        let actions = vec![Action::IterateUntilConverged {
            commands: vec![Command::self_update("step"), Command::cross_update("c", "inc")],
            residual: "res".to_string(),
            step: "step".to_string(),
        }];
        let config = SimulationConfig::new().with_max_iterations(10);
        let method = Method::from_parts("shrinking", vec![Symbol::new("c")], exprs, groups, actions, config);
        let mut num = NumericalCore::new(&method).unwrap();

        let report = num.update(None, None).unwrap();
        assert_eq!(report.iterations, vec![1]);
        assert!(report.converged);
        assert_eq!(num.get("c").unwrap(), vec![1.0]);
        assert_eq!(num.value("res").unwrap(), &Value::Scalar(1.0));
    }

    #[test]
    fn test_set_scatters_into_group() {
        let mut num = lc(100.0);
        num.set("x", &[0.25, -0.5]).unwrap();
        assert_eq!(num.get("x").unwrap(), vec![0.25, -0.5]);
        assert_eq!(num.get("dx").unwrap(), vec![0.0, 0.0]);
        num.set("u", &[]).unwrap();
    }

    #[test]
    fn test_unknown_names() {
        let mut num = lc(100.0);
        assert!(matches!(num.get("bogus"), Err(PhsError::UnknownField { .. })));
        assert!(matches!(num.set("bogus", &[]), Err(PhsError::UnknownField { .. })));
        assert!(matches!(num.evaluate("bogus"), Err(PhsError::UnknownField { .. })));
        assert!(matches!(num.value("bogus"), Err(PhsError::UnknownField { .. })));
    }

    #[test]
    fn test_dimension_errors() {
        let mut num = lc(100.0);
        assert!(matches!(num.set("x", &[1.0]), Err(PhsError::DimensionError { .. })));
        assert!(matches!(num.update(Some(&[1.0][..]), None), Err(PhsError::DimensionError { .. })));
        assert!(matches!(num.init_state(&[1.0, 2.0, 3.0]), Err(PhsError::DimensionError { .. })));
        assert!(matches!(
            num.set_value("H", Value::Vector(vec![1.0])),
            Err(PhsError::DimensionError { .. })
        ));
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut exprs = ExprRegistry::new();
        exprs.insert("y", NamedExpr::Vector(vec![Expr::var("u")]));
        let groups: BTreeMap<String, Vec<usize>> =
            [("u".to_string(), vec![0]), ("p".to_string(), Vec::new())].into();
        let method = Method::from_parts(
            "wire",
            vec![Symbol::new("u")],
            exprs,
            groups,
            vec![Action::Evaluate(vec![Command::self_update("y")])],
            SimulationConfig::default(),
        );
        let mut num = NumericalCore::new(&method).unwrap();
        assert!(matches!(
            num.update(Some(&[f64::NAN][..]), None),
            Err(PhsError::DimensionError { .. })
        ));
        num.update(Some(&[2.5][..]), None).unwrap();
        assert_eq!(num.value("y").unwrap(), &Value::Vector(vec![2.5]));
    }

    #[test]
    fn test_empty_group_reads_empty() {
        let num = lc(100.0);
        assert!(num.get("u").unwrap().is_empty());
        assert!(num.get("vnl").unwrap().is_empty());
    }

    #[test]
    fn test_lossless_storage_without_ports_stays_put() {
        let mut core = PhsCore::new("capacitor");
        core.add_storage("q", Expr::var("q").powi(2) / Expr::num(2.0)).unwrap();
        let method = Method::new(&core, &SimulationConfig::default()).unwrap();
        let mut num = NumericalCore::new(&method).unwrap();
        num.init_state(&[0.7]).unwrap();
        for _ in 0..10 {
            num.update(None, None).unwrap();
        }
        assert_relative_eq!(num.get("x").unwrap()[0], 0.7);
    }

    #[test]
    fn test_linear_oscillator_conserves_energy() {
        let mut num = lc(1000.0);
        num.init_state(&[1.0, 0.0]).unwrap();
        let e0 = num.evaluate("H").unwrap().magnitude();
        for _ in 0..200 {
            let report = num.update(None, None).unwrap();
            assert!(report.iterations.is_empty());
        }
        let e1 = num.evaluate("H").unwrap().magnitude();
        assert_relative_eq!(e1, e0, max_relative = 1e-10);
        assert!((num.get("x").unwrap()[0] - 1.0).abs() > 1e-3);
    }

    #[test]
    fn test_power_balance_per_step() {
        // dtE = dxH . dx * fs vanishes for a lossless autonomous system
        let mut num = lc(500.0);
        num.init_state(&[0.2, 0.9]).unwrap();
        num.update(None, None).unwrap();
        let dxh = num.value("dxH").unwrap().as_slice().to_vec();
        let dx = num.get("dx").unwrap();
        let de: f64 = dxh.iter().zip(&dx).map(|(a, b)| a * b).sum();
        assert!(de.abs() < 1e-12);
    }

    #[test]
    fn test_nonlinear_spring_conserves_energy() {
        let config = SimulationConfig::new().with_sample_rate(2000.0).with_tolerance(1e-13).with_max_iterations(50);
        let mut num = hardening_spring(&config);
        num.init_state(&[0.5, 0.0]).unwrap();
        let e0 = num.evaluate("H").unwrap().magnitude();
        for _ in 0..100 {
            let report = num.update(None, None).unwrap();
            assert!(report.converged);
            assert!(report.max_iterations() <= 50);
        }
        let e1 = num.evaluate("H").unwrap().magnitude();
        assert_relative_eq!(e1, e0, max_relative = 1e-8);
    }

    #[test]
    fn test_update_is_deterministic() {
        let config = SimulationConfig::new()
            .with_gradient(GradientScheme::Trapezoidal)
            .with_tolerance(1e-12);
        let mut a = hardening_spring(&config);
        let mut b = hardening_spring(&config);
        a.init_state(&[0.3, 0.1]).unwrap();
        b.init_state(&[0.3, 0.1]).unwrap();
        for _ in 0..20 {
            assert_eq!(a.update(None, None).unwrap(), b.update(None, None).unwrap());
        }
        assert_eq!(a.args(), b.args());
    }

    #[test]
    fn test_store_routes_groups_and_expressions() {
        let mut num = lc(100.0);
        num.store("x", Value::Vector(vec![1.0, 2.0])).unwrap();
        assert_eq!(num.get("x").unwrap(), vec![1.0, 2.0]);
        num.store("H", Value::Scalar(42.0)).unwrap();
        assert_eq!(num.value("H").unwrap(), &Value::Scalar(42.0));
        // The raw evaluator ignores the cache
        assert_relative_eq!(num.evaluate("H").unwrap().magnitude(), 0.25 + 4.0);
    }
}
