//! The symbolic port-Hamiltonian core.

use std::collections::BTreeMap;

use tracing::debug;

use super::types::{Block, Dims, ExprRegistry, ExprSource, NamedExpr};
use super::validate::validate_core;
use crate::error::{PhsError, Result};
use crate::symbolic::{matvecprod, Expr, SymMatrix, Symbol};

/// Prefix of state-increment symbols (`x` → `dx`).
pub const INCREMENT_PREFIX: &str = "d";

/// A port-Hamiltonian system described symbolically.
///
/// ```text
/// [ dx/dt ]       [ dxH(x) ]
/// [   w   ] = M · [  z(w)  ]
/// [  -y   ]       [   u    ]
/// ```
///
/// Structure-matrix entries are stored by variable name and assembled on
/// demand, so variables may be declared in any order before building.
#[derive(Debug, Clone)]
pub struct PhsCore {
    label: String,
    x: Vec<Symbol>,
    h: Expr,
    w: Vec<Symbol>,
    z: Vec<Expr>,
    u: Vec<Symbol>,
    y: Vec<Symbol>,
    p: Vec<Symbol>,
    subs: BTreeMap<Symbol, f64>,
    entries: BTreeMap<(Symbol, Symbol), Expr>,
    exprs: ExprRegistry,
    built: bool,
}

impl PhsCore {
    /// Create an empty core.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            x: Vec::new(),
            h: Expr::zero(),
            w: Vec::new(),
            z: Vec::new(),
            u: Vec::new(),
            y: Vec::new(),
            p: Vec::new(),
            subs: BTreeMap::new(),
            entries: BTreeMap::new(),
            exprs: ExprRegistry::new(),
            built: false,
        }
    }

    /// Model label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Add a storage component: declares state `name` and adds `h` to the
    /// storage function.
    pub fn add_storage(&mut self, name: &str, h: Expr) -> Result<Symbol> {
        let increment = format!("{}{}", INCREMENT_PREFIX, name);
        if self.is_taken(&Symbol::new(&increment)) {
            return Err(PhsError::DuplicateSymbol { name: increment });
        }
        let s = self.declare(name)?;
        self.x.push(s.clone());
        self.h = self.h.clone() + h;
        Ok(s)
    }

    /// Add a dissipative component: declares variable `name` with
    /// dissipation function `z`.
    pub fn add_dissipation(&mut self, name: &str, z: Expr) -> Result<Symbol> {
        let s = self.declare(name)?;
        self.w.push(s.clone());
        self.z.push(z);
        Ok(s)
    }

    /// Add an external port with input `u` and output `y`.
    pub fn add_port(&mut self, u: &str, y: &str) -> Result<(Symbol, Symbol)> {
        let su = self.declare(u)?;
        let sy = self.declare(y)?;
        self.u.push(su.clone());
        self.y.push(sy.clone());
        Ok((su, sy))
    }

    /// Add a runtime parameter.
    pub fn add_parameter(&mut self, name: &str) -> Result<Symbol> {
        let s = self.declare(name)?;
        self.p.push(s.clone());
        Ok(s)
    }

    /// Set (or overwrite) a constant substituted before numerical evaluation.
    pub fn set_const(&mut self, name: &str, value: f64) -> Result<Symbol> {
        let s = Symbol::new(name);
        if !self.subs.contains_key(&s) {
            self.declare(name)?;
        }
        self.subs.insert(s.clone(), value);
        self.built = false;
        Ok(s)
    }

    /// Skew-symmetric interconnection: `M[a, b] = coef`, `M[b, a] = -coef`.
    pub fn connect(&mut self, a: &str, b: &str, coef: Expr) -> Result<()> {
        self.set_entry(a, b, coef.clone())?;
        self.set_entry(b, a, -coef)
    }

    /// Set a single structure-matrix entry `M[a, b]`.
    pub fn set_entry(&mut self, a: &str, b: &str, value: Expr) -> Result<()> {
        let (sa, sb) = (Symbol::new(a), Symbol::new(b));
        self.slot(&sa)?;
        self.slot(&sb)?;
        self.entries.insert((sa, sb), value);
        self.built = false;
        Ok(())
    }

    /// Add a dissipative (symmetric) entry: `M[a, b] -= r`, `M[b, a] -= r`
    /// when `a != b`, `M[a, a] -= r` otherwise.
    pub fn add_dissipative_entry(&mut self, a: &str, b: &str, r: Expr) -> Result<()> {
        let (sa, sb) = (Symbol::new(a), Symbol::new(b));
        self.slot(&sa)?;
        self.slot(&sb)?;
        let mut pairs = vec![(sa.clone(), sb.clone())];
        if sa != sb {
            pairs.push((sb, sa));
        }
        for key in pairs {
            let prev = self.entries.remove(&key).unwrap_or_else(Expr::zero);
            self.entries.insert(key, prev - r.clone());
        }
        self.built = false;
        Ok(())
    }

    /// States.
    pub fn x(&self) -> &[Symbol] {
        &self.x
    }

    /// Dissipation variables.
    pub fn w(&self) -> &[Symbol] {
        &self.w
    }

    /// Inputs.
    pub fn u(&self) -> &[Symbol] {
        &self.u
    }

    /// Outputs.
    pub fn y(&self) -> &[Symbol] {
        &self.y
    }

    /// Parameters.
    pub fn p(&self) -> &[Symbol] {
        &self.p
    }

    /// Storage function.
    pub fn h(&self) -> &Expr {
        &self.h
    }

    /// Dissipation functions, one per dissipation variable.
    pub fn z(&self) -> &[Expr] {
        &self.z
    }

    /// Constant substitutions.
    pub fn constants(&self) -> &BTreeMap<Symbol, f64> {
        &self.subs
    }

    /// State-increment symbols, one per state.
    pub fn dx(&self) -> Vec<Symbol> {
        self.x
            .iter()
            .map(|s| Symbol::new(format!("{}{}", INCREMENT_PREFIX, s.name())))
            .collect()
    }

    /// System dimensions.
    pub fn dims(&self) -> Dims {
        Dims {
            x: self.x.len(),
            w: self.w.len(),
            y: self.y.len(),
            p: self.p.len(),
        }
    }

    /// Gradient of the storage function.
    pub fn dxh(&self) -> Vec<Expr> {
        self.x.iter().map(|s| self.h.diff(s)).collect()
    }

    /// Hessian of the storage function.
    pub fn hessian(&self) -> SymMatrix {
        SymMatrix::jacobian(&self.dxh(), &self.x)
    }

    /// Jacobian of the dissipation functions.
    pub fn jacobian_z(&self) -> SymMatrix {
        SymMatrix::jacobian(&self.z, &self.w)
    }

    /// Assemble the square structure matrix.
    pub fn structure_matrix(&self) -> Result<SymMatrix> {
        let n = self.dims().structure();
        let mut m = SymMatrix::zeros(n, n);
        for ((a, b), value) in &self.entries {
            m.set(self.slot(a)?, self.slot(b)?, value.clone());
        }
        Ok(m)
    }

    /// Block of the structure matrix.
    pub fn m_block(&self, rows: Block, cols: Block) -> Result<SymMatrix> {
        let m = self.structure_matrix()?;
        Ok(m.submatrix(&self.block_range(rows), &self.block_range(cols)))
    }

    /// Index range of a block in the structure matrix.
    pub fn block_range(&self, block: Block) -> Vec<usize> {
        let d = self.dims();
        match block {
            Block::Storage => (0..d.x).collect(),
            Block::Dissipation => (d.x..d.x + d.w).collect(),
            Block::Port => (d.x + d.w..d.structure()).collect(),
        }
    }

    /// Structure-matrix index of a variable (state, dissipation variable,
    /// input or output).
    pub fn slot(&self, symbol: &Symbol) -> Result<usize> {
        let d = self.dims();
        if let Some(i) = self.x.iter().position(|s| s == symbol) {
            return Ok(i);
        }
        if let Some(i) = self.w.iter().position(|s| s == symbol) {
            return Ok(d.x + i);
        }
        if let Some(i) = self
            .u
            .iter()
            .position(|s| s == symbol)
            .or_else(|| self.y.iter().position(|s| s == symbol))
        {
            return Ok(d.x + d.w + i);
        }
        Err(PhsError::unknown_field(symbol.name()))
    }

    /// Continuous-time output `y = -(Myx dxH + Myw z + Myy u)`.
    pub fn output(&self) -> Result<Vec<Expr>> {
        let dxh = self.dxh();
        let u: Vec<Expr> = self.u.iter().map(Expr::sym).collect();
        let parts = [
            matvecprod(&self.m_block(Block::Port, Block::Storage)?, &dxh)?,
            matvecprod(&self.m_block(Block::Port, Block::Dissipation)?, &self.z)?,
            matvecprod(&self.m_block(Block::Port, Block::Port)?, &u)?,
        ];
        Ok((0..self.y.len())
            .map(|i| -Expr::sum(parts.iter().map(|part| part[i].clone())))
            .collect())
    }

    fn is_taken(&self, s: &Symbol) -> bool {
        let increments = self.dx();
        self.x
            .iter()
            .chain(&self.w)
            .chain(&self.u)
            .chain(&self.y)
            .chain(&self.p)
            .chain(self.subs.keys())
            .chain(&increments)
            .any(|t| t == s)
    }

    fn declare(&mut self, name: &str) -> Result<Symbol> {
        let s = Symbol::new(name);
        if name.is_empty() || self.is_taken(&s) {
            return Err(PhsError::DuplicateSymbol {
                name: name.to_string(),
            });
        }
        self.built = false;
        Ok(s)
    }
}

impl ExprSource for PhsCore {
    fn args(&self) -> Vec<Symbol> {
        let mut args = self.x.clone();
        args.extend(self.dx());
        args.extend(self.w.iter().cloned());
        args.extend(self.u.iter().cloned());
        args.extend(self.p.iter().cloned());
        args
    }

    fn registry(&self) -> &ExprRegistry {
        &self.exprs
    }

    fn subs(&self) -> &BTreeMap<Symbol, f64> {
        &self.subs
    }

    fn is_built(&self) -> bool {
        self.built
    }

    fn build_exprs(&mut self) -> Result<()> {
        if self.built {
            return Ok(());
        }
        validate_core(self)?;

        let mut exprs = ExprRegistry::new();
        exprs.insert("H", NamedExpr::Scalar(self.h.clone()));
        exprs.insert("dxH", NamedExpr::Vector(self.dxh()));
        exprs.insert("z", NamedExpr::Vector(self.z.clone()));
        exprs.insert("y", NamedExpr::Vector(self.output()?));
        self.exprs = exprs;
        self.built = true;

        debug!(
            label = %self.label,
            nx = self.x.len(),
            nw = self.w.len(),
            ny = self.y.len(),
            np = self.p.len(),
            "core expressions built"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oscillator() -> PhsCore {
        let mut core = PhsCore::new("oscillator");
        core.set_const("C", 1e-6).unwrap();
        core.set_const("L", 1e-3).unwrap();
        core.add_storage("q", Expr::var("q").powi(2) / (Expr::num(2.0) * Expr::var("C")))
            .unwrap();
        core.add_storage("phi", Expr::var("phi").powi(2) / (Expr::num(2.0) * Expr::var("L")))
            .unwrap();
        core.connect("q", "phi", Expr::one()).unwrap();
        core
    }

    #[test]
    fn test_args_are_canonically_ordered() {
        let mut core = oscillator();
        core.add_dissipation("w", Expr::var("w")).unwrap();
        core.add_port("u", "y").unwrap();
        core.add_parameter("g").unwrap();
        let names: Vec<String> = core.args().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["q", "phi", "dq", "dphi", "w", "u", "g"]);
    }

    #[test]
    fn test_structure_matrix_is_skew() {
        let core = oscillator();
        let m = core.structure_matrix().unwrap();
        assert_eq!(m.get(0, 1), &Expr::one());
        assert_eq!(m.get(1, 0), &Expr::num(-1.0));
        assert!(m.get(0, 0).is_zero());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut core = oscillator();
        assert!(matches!(
            core.add_dissipation("q", Expr::zero()),
            Err(PhsError::DuplicateSymbol { .. })
        ));
        assert!(matches!(
            core.add_parameter("dq"),
            Err(PhsError::DuplicateSymbol { .. })
        ));
        assert!(matches!(
            core.add_parameter("C"),
            Err(PhsError::DuplicateSymbol { .. })
        ));
    }

    #[test]
    fn test_connect_unknown_variable() {
        let mut core = oscillator();
        assert!(matches!(
            core.connect("q", "nowhere", Expr::one()),
            Err(PhsError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_build_registers_expressions() {
        let mut core = oscillator();
        core.build_exprs().unwrap();
        assert!(core.is_built());
        let names: Vec<&str> = core.registry().names().collect();
        assert_eq!(names, vec!["H", "dxH", "z", "y"]);
        assert_eq!(core.registry().get("dxH").unwrap().components().len(), 2);
    }

    #[test]
    fn test_mutation_invalidates_build() {
        let mut core = oscillator();
        core.build_exprs().unwrap();
        core.add_port("v", "i").unwrap();
        assert!(!core.is_built());
    }

    #[test]
    fn test_output_of_port() {
        // Source driving a resistor: w = u, y = -z(w) contribution
        let mut core = PhsCore::new("load");
        core.add_dissipation("w", Expr::var("w") * Expr::num(2.0)).unwrap();
        core.add_port("u", "y").unwrap();
        core.connect("w", "u", Expr::one()).unwrap();
        let y = core.output().unwrap();
        assert_eq!(y, vec![Expr::num(2.0) * Expr::var("w")]);
    }

    #[test]
    fn test_dissipative_entry() {
        let mut core = oscillator();
        core.add_dissipative_entry("phi", "phi", Expr::var("R")).unwrap();
        let m = core.structure_matrix().unwrap();
        assert_eq!(m.get(1, 1), &(-Expr::var("R")));
    }
}
