//! Discrete-time method derivation.
//!
//! [`Method::new`] turns a symbolic [`PhsCore`] into the set of named
//! expressions, group index maps and [`Action`] list that advance the system
//! by one sample:
//!
//! 1. states and dissipation variables are split into a linear part, solved
//!    in closed form, and a nonlinear part, solved by Newton iteration
//! 2. the storage gradient is replaced by a discrete gradient so that the
//!    discrete power balance holds
//! 3. the discrete system is assembled and solved symbolically for the
//!    linear unknowns, then differentiated for the Newton update
//!
//! The method keeps the core's constants pending; they are substituted by
//! the evaluation layer.

mod actions;
mod gradient;
mod split;

pub use actions::{Action, Command};

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::model::{Block, Dims, ExprRegistry, ExprSource, NamedExpr, PhsCore};
use crate::symbolic::{inverse, matvecprod, norm2, Expr, SymMatrix, Symbol};

use gradient::Storage;
use split::linear_mask;

/// Group names recognised by the runtime, in canonical order.
pub const GROUP_NAMES: [&str; 13] = [
    "x", "dx", "w", "u", "p", "xl", "xnl", "dxl", "dxnl", "wl", "wnl", "vl", "vnl",
];

/// A discrete-time numerical method derived from a [`PhsCore`].
#[derive(Debug, Clone)]
pub struct Method {
    label: String,
    config: SimulationConfig,
    dims: Dims,
    args: Vec<Symbol>,
    subs: BTreeMap<Symbol, f64>,
    exprs: ExprRegistry,
    groups: BTreeMap<String, Vec<usize>>,
    actions: Vec<Action>,
}

impl Method {
    /// Derive the method for `core` under `config`.
    ///
    /// The core is cloned and finalized; the caller's copy is never mutated.
    #[instrument(skip_all, fields(label = %core.label()))]
    pub fn new(core: &PhsCore, config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut core = core.clone();
        core.build_exprs()?;

        let dims = core.dims();
        let x = core.x().to_vec();
        let dx = core.dx();
        let w = core.w().to_vec();

        let (x_linear, w_linear) = if config.split {
            (linear_mask(&core.hessian(), &x), linear_mask(&core.jacobian_z(), &w))
        } else {
            (vec![false; dims.x], vec![false; dims.w])
        };

        let grad = core.dxh();
        let storage = Storage {
            h: core.h(),
            grad: &grad,
            x: &x,
            dx: &dx,
        };
        let dxh = storage.discrete_gradient(config.grad, config.theta, &x_linear, config.eps);
        let z = core.z().to_vec();
        let u: Vec<Expr> = core.u().iter().map(Expr::sym).collect();

        // [dx; w; -y] = [T Mx; Mw; My] [dxH; z; u]
        let period = Expr::num(config.dt());
        let rhs_dx: Vec<Expr> = block_rhs(&core, Block::Storage, &dxh, &z, &u)?
            .into_iter()
            .map(|e| period.clone() * e)
            .collect();
        let rhs_w = block_rhs(&core, Block::Dissipation, &dxh, &z, &u)?;
        let y: Vec<Expr> = block_rhs(&core, Block::Port, &dxh, &z, &u)?
            .into_iter()
            .map(|e| -e)
            .collect();

        let unknowns: Vec<Symbol> = dx.iter().chain(&w).cloned().collect();
        let rhs: Vec<Expr> = rhs_dx.into_iter().chain(rhs_w).collect();
        let linear: Vec<bool> = x_linear.iter().chain(&w_linear).copied().collect();

        let (vl, rhs_l): (Vec<Symbol>, Vec<Expr>) = unknowns
            .iter()
            .zip(&rhs)
            .zip(&linear)
            .filter(|(_, lin)| **lin)
            .map(|((v, r), _)| (v.clone(), r.clone()))
            .unzip();
        let (vnl, rhs_nl): (Vec<Symbol>, Vec<Expr>) = unknowns
            .iter()
            .zip(&rhs)
            .zip(&linear)
            .filter(|(_, lin)| !**lin)
            .map(|((v, r), _)| (v.clone(), r.clone()))
            .unzip();

        let mut exprs = ExprRegistry::new();
        exprs.insert("H", NamedExpr::Scalar(core.h().clone()));
        exprs.insert("dxH", NamedExpr::Vector(dxh));
        exprs.insert("z", NamedExpr::Vector(z));
        exprs.insert("y", NamedExpr::Vector(y));
        exprs.insert(
            "ud_x",
            NamedExpr::Vector(x.iter().zip(&dx).map(|(x, dx)| Expr::sym(x) + Expr::sym(dx)).collect()),
        );

        // Linear part: vl = Al vl + bl, with Al independent of vl
        let ud_vl = if vl.is_empty() {
            Vec::new()
        } else {
            let al = SymMatrix::jacobian(&rhs_l, &vl);
            let at_zero: BTreeMap<Symbol, Expr> = vl.iter().map(|s| (s.clone(), Expr::zero())).collect();
            let bl: Vec<Expr> = rhs_l.iter().map(|e| e.subs(&at_zero)).collect();
            let system = SymMatrix::identity(vl.len()).sub(&al)?;
            let ud_vl = matvecprod(&inverse(&system, true)?, &bl)?;
            exprs.insert("ud_vl", NamedExpr::Vector(ud_vl.clone()));
            ud_vl
        };

        // Nonlinear part: Newton update on fnl(vnl) = vnl - rhs_nl(ud_vl(vnl), vnl)
        if !vnl.is_empty() {
            let eliminate: BTreeMap<Symbol, Expr> = vl.iter().cloned().zip(ud_vl).collect();
            let fnl: Vec<Expr> = vnl
                .iter()
                .zip(&rhs_nl)
                .map(|(v, r)| Expr::sym(v) - r.subs(&eliminate))
                .collect();
            let jf = SymMatrix::jacobian(&fnl, &vnl);
            let delta = matvecprod(&inverse(&jf, true)?, &fnl)?;
            let ud_vnl: Vec<Expr> = vnl.iter().zip(&delta).map(|(v, d)| Expr::sym(v) - d.clone()).collect();
            exprs.insert("ud_vnl", NamedExpr::Vector(ud_vnl));
            exprs.insert("res_vnl", NamedExpr::Scalar(norm2(&fnl)));
            exprs.insert("step_vnl", NamedExpr::Scalar(norm2(&delta)));
        }

        let groups = group_indices(&dims, &x_linear, &w_linear);
        let actions = action_list(!vl.is_empty(), !vnl.is_empty());

        debug!(
            nl = vl.len(),
            nnl = vnl.len(),
            grad = ?config.grad,
            actions = actions.len(),
            "method built"
        );

        Ok(Self {
            label: core.label().to_string(),
            config: config.clone(),
            dims,
            args: core.args(),
            subs: core.constants().clone(),
            exprs,
            groups,
            actions,
        })
    }

    /// Assemble a method from precomputed parts.
    ///
    /// Dimensions are taken from the `x`, `w`, `u` and `p` groups.
    #[cfg(test)]
    pub(crate) fn from_parts(
        label: impl Into<String>,
        args: Vec<Symbol>,
        exprs: ExprRegistry,
        groups: BTreeMap<String, Vec<usize>>,
        actions: Vec<Action>,
        config: SimulationConfig,
    ) -> Self {
        let len = |name: &str| groups.get(name).map_or(0, Vec::len);
        let dims = Dims {
            x: len("x"),
            w: len("w"),
            y: len("u"),
            p: len("p"),
        };
        Self {
            label: label.into(),
            config,
            dims,
            args,
            subs: BTreeMap::new(),
            exprs,
            groups,
            actions,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Configuration the method was derived with.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn nx(&self) -> usize {
        self.dims.x
    }

    pub fn nw(&self) -> usize {
        self.dims.w
    }

    pub fn ny(&self) -> usize {
        self.dims.y
    }

    pub fn np(&self) -> usize {
        self.dims.p
    }

    /// Index map of every group into the argument vector.
    pub fn groups(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.groups
    }

    /// Index positions of a single group.
    pub fn group(&self, name: &str) -> Option<&[usize]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Per-step action list.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

impl ExprSource for Method {
    fn args(&self) -> Vec<Symbol> {
        self.args.clone()
    }

    fn registry(&self) -> &ExprRegistry {
        &self.exprs
    }

    fn subs(&self) -> &BTreeMap<Symbol, f64> {
        &self.subs
    }

    fn is_built(&self) -> bool {
        true
    }

    fn build_exprs(&mut self) -> Result<()> {
        Ok(())
    }
}

/// `M[rows, x] dxH + M[rows, w] z + M[rows, y] u`
fn block_rhs(core: &PhsCore, rows: Block, dxh: &[Expr], z: &[Expr], u: &[Expr]) -> Result<Vec<Expr>> {
    let parts = [
        matvecprod(&core.m_block(rows, Block::Storage)?, dxh)?,
        matvecprod(&core.m_block(rows, Block::Dissipation)?, z)?,
        matvecprod(&core.m_block(rows, Block::Port)?, u)?,
    ];
    let n = core.block_range(rows).len();
    Ok((0..n)
        .map(|i| Expr::sum(parts.iter().map(|part| part[i].clone())))
        .collect())
}

fn group_indices(dims: &Dims, x_linear: &[bool], w_linear: &[bool]) -> BTreeMap<String, Vec<usize>> {
    let x: Vec<usize> = (0..dims.x).collect();
    let dx: Vec<usize> = (dims.x..2 * dims.x).collect();
    let w_start = 2 * dims.x;
    let w: Vec<usize> = (w_start..w_start + dims.w).collect();
    let u_start = w_start + dims.w;
    let u: Vec<usize> = (u_start..u_start + dims.y).collect();
    let p: Vec<usize> = (u_start + dims.y..u_start + dims.y + dims.p).collect();

    let xl = pick(&x, x_linear, true);
    let xnl = pick(&x, x_linear, false);
    let dxl = pick(&dx, x_linear, true);
    let dxnl = pick(&dx, x_linear, false);
    let wl = pick(&w, w_linear, true);
    let wnl = pick(&w, w_linear, false);
    let vl: Vec<usize> = dxl.iter().chain(&wl).copied().collect();
    let vnl: Vec<usize> = dxnl.iter().chain(&wnl).copied().collect();

    GROUP_NAMES
        .iter()
        .map(|s| s.to_string())
        .zip([x, dx, w, u, p, xl, xnl, dxl, dxnl, wl, wnl, vl, vnl])
        .collect()
}

fn pick(inds: &[usize], mask: &[bool], linear: bool) -> Vec<usize> {
    inds.iter().zip(mask).filter(|(_, m)| **m == linear).map(|(i, _)| *i).collect()
}

fn action_list(has_linear: bool, has_nonlinear: bool) -> Vec<Action> {
    let mut actions = Vec::new();
    if has_nonlinear {
        actions.push(Action::Evaluate(vec![Command::self_update("res_vnl")]));
        actions.push(Action::IterateUntilConverged {
            commands: vec![
                Command::self_update("step_vnl"),
                Command::cross_update("vnl", "ud_vnl"),
                Command::self_update("res_vnl"),
            ],
            residual: "res_vnl".to_string(),
            step: "step_vnl".to_string(),
        });
    }
    if has_linear {
        actions.push(Action::Evaluate(vec![Command::cross_update("vl", "ud_vl")]));
    }
    actions.push(Action::Evaluate(vec![
        Command::self_update("dxH"),
        Command::self_update("z"),
        Command::self_update("y"),
        Command::cross_update("x", "ud_x"),
    ]));
    actions
}
