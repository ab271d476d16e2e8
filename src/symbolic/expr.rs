//! Symbolic expression trees.
//!
//! Expressions are immutable trees built through smart constructors
//! ([`Expr::sum`], [`Expr::product`], [`Expr::power`], [`Expr::call`],
//! [`Expr::select`]) which keep every tree in a light canonical form:
//!
//! - nested sums and products are flattened
//! - numeric constants are folded
//! - neutral elements (`+0`, `*1`, `^1`) disappear and `*0` collapses
//! - like terms are collected (`2x + 3x → 5x`) and like bases merged
//!   (`x·x → x^2`, `x·x^-1 → 1`)
//! - terms and factors are sorted, so `a + b` and `b + a` are the same tree
//!
//! This is not a computer-algebra system: there is no expansion, no
//! factoring and no rational-function cancellation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

/// A named scalar variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Create a symbol with the given name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The symbol's name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Elementary functions of one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Abs,
    Sign,
    Tanh,
    Sinh,
    Cosh,
}

impl Func {
    /// Look up a function by its name in the description language.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sin" => Some(Self::Sin),
            "cos" => Some(Self::Cos),
            "tan" => Some(Self::Tan),
            "exp" => Some(Self::Exp),
            "log" | "ln" => Some(Self::Log),
            "sqrt" => Some(Self::Sqrt),
            "abs" => Some(Self::Abs),
            "sign" | "sgn" => Some(Self::Sign),
            "tanh" => Some(Self::Tanh),
            "sinh" => Some(Self::Sinh),
            "cosh" => Some(Self::Cosh),
            _ => None,
        }
    }

    /// Function name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
            Self::Sign => "sign",
            Self::Tanh => "tanh",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
        }
    }

    /// Evaluate the function numerically.
    pub fn apply(&self, v: f64) -> f64 {
        match self {
            Self::Sin => v.sin(),
            Self::Cos => v.cos(),
            Self::Tan => v.tan(),
            Self::Exp => v.exp(),
            Self::Log => v.ln(),
            Self::Sqrt => v.sqrt(),
            Self::Abs => v.abs(),
            Self::Sign => {
                if v > 0.0 {
                    1.0
                } else if v < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            Self::Tanh => v.tanh(),
            Self::Sinh => v.sinh(),
            Self::Cosh => v.cosh(),
        }
    }

    /// Derivative of the function, evaluated at `arg`.
    fn derivative(&self, arg: &Expr) -> Expr {
        let a = arg.clone();
        match self {
            Self::Sin => Expr::call(Self::Cos, a),
            Self::Cos => -Expr::call(Self::Sin, a),
            Self::Tan => Expr::num(1.0) + Expr::power(Expr::call(Self::Tan, a), Expr::num(2.0)),
            Self::Exp => Expr::call(Self::Exp, a),
            Self::Log => Expr::power(a, Expr::num(-1.0)),
            Self::Sqrt => Expr::num(0.5) * Expr::power(a, Expr::num(-0.5)),
            Self::Abs => Expr::call(Self::Sign, a),
            Self::Sign => Expr::zero(),
            Self::Tanh => Expr::num(1.0) - Expr::power(Expr::call(Self::Tanh, a), Expr::num(2.0)),
            Self::Sinh => Expr::call(Self::Cosh, a),
            Self::Cosh => Expr::call(Self::Sinh, a),
        }
    }
}

/// A symbolic scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric constant
    Num(f64),
    /// Free symbol
    Sym(Symbol),
    /// Sum of terms (at least two, constant first if any)
    Add(Vec<Expr>),
    /// Product of factors (at least two, coefficient first if any)
    Mul(Vec<Expr>),
    /// Base raised to an exponent
    Pow(Box<Expr>, Box<Expr>),
    /// Elementary function call
    Call(Func, Box<Expr>),
    /// `positive` when `test > 0`, `otherwise` else
    Select {
        test: Box<Expr>,
        positive: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// Numeric constant.
    pub fn num(value: f64) -> Self {
        Self::Num(value)
    }

    /// The constant zero.
    pub fn zero() -> Self {
        Self::Num(0.0)
    }

    /// The constant one.
    pub fn one() -> Self {
        Self::Num(1.0)
    }

    /// Symbol reference.
    pub fn sym(symbol: &Symbol) -> Self {
        Self::Sym(symbol.clone())
    }

    /// Symbol reference created from a name.
    pub fn var(name: &str) -> Self {
        Self::Sym(Symbol::new(name))
    }

    /// Value of a constant expression.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether this is the constant zero.
    pub fn is_zero(&self) -> bool {
        matches!(self, Self::Num(v) if *v == 0.0)
    }

    /// Whether this is the constant one.
    pub fn is_one(&self) -> bool {
        matches!(self, Self::Num(v) if *v == 1.0)
    }

    /// Canonical sum of terms.
    pub fn sum(terms: impl IntoIterator<Item = Expr>) -> Self {
        let mut constant = 0.0;
        let mut collected: Vec<(Expr, f64)> = Vec::new();

        let mut stack: Vec<Expr> = terms.into_iter().collect();
        stack.reverse();
        while let Some(term) = stack.pop() {
            match term {
                Expr::Num(v) => constant += v,
                Expr::Add(inner) => stack.extend(inner.into_iter().rev()),
                other => {
                    let (coef, rest) = split_coefficient(other);
                    // c·(a + b) is stored as c·a + c·b
                    if let Expr::Add(inner) = rest {
                        stack.extend(
                            inner
                                .into_iter()
                                .rev()
                                .map(|t| Expr::product([Expr::Num(coef), t])),
                        );
                        continue;
                    }
                    match collected.iter_mut().find(|(r, _)| *r == rest) {
                        Some((_, c)) => *c += coef,
                        None => collected.push((rest, coef)),
                    }
                }
            }
        }

        let mut out: Vec<Expr> = collected
            .into_iter()
            .filter(|(_, c)| *c != 0.0)
            .map(|(rest, coef)| {
                if coef == 1.0 {
                    rest
                } else {
                    Expr::product([Expr::Num(coef), rest])
                }
            })
            .collect();
        out.sort_by(canonical_cmp);

        if constant != 0.0 || out.is_empty() {
            out.insert(0, Expr::Num(constant));
        }
        match out.len() {
            1 => out.pop().unwrap_or_else(Expr::zero),
            _ => Expr::Add(out),
        }
    }

    /// Canonical product of factors.
    pub fn product(factors: impl IntoIterator<Item = Expr>) -> Self {
        let mut coef = 1.0;
        let mut bases: Vec<(Expr, Vec<Expr>)> = Vec::new();

        let mut stack: Vec<Expr> = factors.into_iter().collect();
        stack.reverse();
        while let Some(factor) = stack.pop() {
            match factor {
                Expr::Num(v) => coef *= v,
                Expr::Mul(inner) => stack.extend(inner.into_iter().rev()),
                Expr::Pow(base, exp) => push_base(&mut bases, *base, *exp),
                other => push_base(&mut bases, other, Expr::one()),
            }
        }
        if coef == 0.0 {
            return Expr::zero();
        }

        let mut out = Vec::with_capacity(bases.len());
        for (base, exps) in bases {
            match Expr::power(base, Expr::sum(exps)) {
                Expr::Num(v) => coef *= v,
                Expr::Mul(inner) => {
                    for f in inner {
                        match f {
                            Expr::Num(v) => coef *= v,
                            f => out.push(f),
                        }
                    }
                }
                f => out.push(f),
            }
        }
        if coef == 0.0 {
            return Expr::zero();
        }
        out.sort_by(canonical_cmp);

        if coef != 1.0 || out.is_empty() {
            out.insert(0, Expr::Num(coef));
        }
        match out.len() {
            1 => out.pop().unwrap_or_else(Expr::one),
            _ => Expr::Mul(out),
        }
    }

    /// Canonical power `base ^ exp`.
    pub fn power(base: Expr, exp: Expr) -> Self {
        if exp.is_zero() || base.is_one() {
            return Expr::one();
        }
        if exp.is_one() {
            return base;
        }
        match (&base, exp.as_num()) {
            (Expr::Num(b), Some(e)) => {
                let v = b.powf(e);
                if v.is_finite() {
                    return Expr::Num(v);
                }
            }
            (Expr::Pow(inner, a), Some(e)) if is_integer(e) => {
                let exp = Expr::product([(**a).clone(), Expr::Num(e)]);
                return Expr::power((**inner).clone(), exp);
            }
            (Expr::Mul(factors), Some(e)) if is_integer(e) => {
                return Expr::product(
                    factors
                        .iter()
                        .map(|f| Expr::power(f.clone(), Expr::Num(e))),
                );
            }
            _ => {}
        }
        Expr::Pow(Box::new(base), Box::new(exp))
    }

    /// Canonical function call.
    pub fn call(func: Func, arg: Expr) -> Self {
        if let Expr::Num(v) = arg {
            let r = func.apply(v);
            if r.is_finite() {
                return Expr::Num(r);
            }
        }
        Expr::Call(func, Box::new(arg))
    }

    /// Canonical conditional: `positive` when `test > 0`, else `otherwise`.
    pub fn select(test: Expr, positive: Expr, otherwise: Expr) -> Self {
        if let Expr::Num(t) = test {
            return if t > 0.0 { positive } else { otherwise };
        }
        if positive == otherwise {
            return positive;
        }
        Expr::Select {
            test: Box::new(test),
            positive: Box::new(positive),
            otherwise: Box::new(otherwise),
        }
    }

    /// Square root.
    pub fn sqrt(self) -> Self {
        Expr::call(Func::Sqrt, self)
    }

    /// Absolute value.
    pub fn abs(self) -> Self {
        Expr::call(Func::Abs, self)
    }

    /// Integer power shorthand.
    pub fn powi(self, n: i32) -> Self {
        Expr::power(self, Expr::Num(n as f64))
    }

    /// Whether `symbol` occurs in the expression.
    pub fn contains(&self, symbol: &Symbol) -> bool {
        match self {
            Expr::Num(_) => false,
            Expr::Sym(s) => s == symbol,
            Expr::Add(items) | Expr::Mul(items) => items.iter().any(|e| e.contains(symbol)),
            Expr::Pow(b, e) => b.contains(symbol) || e.contains(symbol),
            Expr::Call(_, a) => a.contains(symbol),
            Expr::Select {
                test,
                positive,
                otherwise,
            } => test.contains(symbol) || positive.contains(symbol) || otherwise.contains(symbol),
        }
    }

    /// Whether any of `symbols` occurs in the expression.
    pub fn contains_any(&self, symbols: &[Symbol]) -> bool {
        symbols.iter().any(|s| self.contains(s))
    }

    /// Set of free symbols.
    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    /// Add the free symbols of this expression to `out`.
    pub fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Expr::Num(_) => {}
            Expr::Sym(s) => {
                out.insert(s.clone());
            }
            Expr::Add(items) | Expr::Mul(items) => {
                for e in items {
                    e.collect_symbols(out);
                }
            }
            Expr::Pow(b, e) => {
                b.collect_symbols(out);
                e.collect_symbols(out);
            }
            Expr::Call(_, a) => a.collect_symbols(out),
            Expr::Select {
                test,
                positive,
                otherwise,
            } => {
                test.collect_symbols(out);
                positive.collect_symbols(out);
                otherwise.collect_symbols(out);
            }
        }
    }

    /// Replace symbols by expressions, re-simplifying the result.
    pub fn subs(&self, map: &BTreeMap<Symbol, Expr>) -> Expr {
        self.rebuild(&|s| map.get(s).cloned())
    }

    /// Replace symbols by numeric values, re-simplifying the result.
    pub fn subs_num(&self, map: &BTreeMap<Symbol, f64>) -> Expr {
        self.rebuild(&|s| map.get(s).map(|v| Expr::Num(*v)))
    }

    /// Rebuild the tree bottom-up through the smart constructors.
    pub fn simplify(&self) -> Expr {
        self.rebuild(&|_| None)
    }

    fn rebuild(&self, replace: &dyn Fn(&Symbol) -> Option<Expr>) -> Expr {
        match self {
            Expr::Num(v) => Expr::Num(*v),
            Expr::Sym(s) => replace(s).unwrap_or_else(|| Expr::Sym(s.clone())),
            Expr::Add(items) => Expr::sum(items.iter().map(|e| e.rebuild(replace))),
            Expr::Mul(items) => Expr::product(items.iter().map(|e| e.rebuild(replace))),
            Expr::Pow(b, e) => Expr::power(b.rebuild(replace), e.rebuild(replace)),
            Expr::Call(f, a) => Expr::call(*f, a.rebuild(replace)),
            Expr::Select {
                test,
                positive,
                otherwise,
            } => Expr::select(
                test.rebuild(replace),
                positive.rebuild(replace),
                otherwise.rebuild(replace),
            ),
        }
    }

    /// Partial derivative with respect to `symbol`.
    pub fn diff(&self, symbol: &Symbol) -> Expr {
        if !self.contains(symbol) {
            return Expr::zero();
        }
        match self {
            Expr::Num(_) => Expr::zero(),
            Expr::Sym(s) => {
                if s == symbol {
                    Expr::one()
                } else {
                    Expr::zero()
                }
            }
            Expr::Add(items) => Expr::sum(items.iter().map(|e| e.diff(symbol))),
            Expr::Mul(items) => {
                let mut terms = Vec::new();
                for (i, f) in items.iter().enumerate() {
                    let df = f.diff(symbol);
                    if df.is_zero() {
                        continue;
                    }
                    let others = items
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, g)| g.clone());
                    terms.push(Expr::product(others.chain(std::iter::once(df))));
                }
                Expr::sum(terms)
            }
            Expr::Pow(b, e) => {
                let db = b.diff(symbol);
                if !e.contains(symbol) {
                    // d(b^e) = e b^(e-1) db
                    let lowered = Expr::power((**b).clone(), Expr::sum([(**e).clone(), Expr::Num(-1.0)]));
                    Expr::product([(**e).clone(), lowered, db])
                } else {
                    // d(b^e) = b^e (de log b + e db / b)
                    let de = e.diff(symbol);
                    let log_term = Expr::product([de, Expr::call(Func::Log, (**b).clone())]);
                    let base_term = Expr::product([
                        (**e).clone(),
                        db,
                        Expr::power((**b).clone(), Expr::Num(-1.0)),
                    ]);
                    Expr::product([self.clone(), Expr::sum([log_term, base_term])])
                }
            }
            Expr::Call(f, a) => Expr::product([f.derivative(a), a.diff(symbol)]),
            Expr::Select {
                test,
                positive,
                otherwise,
            } => Expr::select((**test).clone(), positive.diff(symbol), otherwise.diff(symbol)),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Expr::Num(_) => 0,
            Expr::Sym(_) => 1,
            Expr::Pow(..) => 2,
            Expr::Mul(_) => 3,
            Expr::Add(_) => 4,
            Expr::Call(..) => 5,
            Expr::Select { .. } => 6,
        }
    }
}

fn is_integer(v: f64) -> bool {
    v.fract() == 0.0 && v.is_finite()
}

/// Split a non-constant term into numeric coefficient and remainder.
fn split_coefficient(term: Expr) -> (f64, Expr) {
    match term {
        Expr::Mul(mut factors) => match factors.first() {
            Some(Expr::Num(c)) => {
                let c = *c;
                factors.remove(0);
                let rest = if factors.len() == 1 {
                    factors.pop().unwrap_or_else(Expr::one)
                } else {
                    Expr::Mul(factors)
                };
                (c, rest)
            }
            _ => (1.0, Expr::Mul(factors)),
        },
        other => (1.0, other),
    }
}

fn push_base(bases: &mut Vec<(Expr, Vec<Expr>)>, base: Expr, exp: Expr) {
    match bases.iter_mut().find(|(b, _)| *b == base) {
        Some((_, exps)) => exps.push(exp),
        None => bases.push((base, vec![exp])),
    }
}

/// Total order used to sort terms and factors.
pub fn canonical_cmp(a: &Expr, b: &Expr) -> Ordering {
    match a.rank().cmp(&b.rank()) {
        Ordering::Equal => {}
        other => return other,
    }
    match (a, b) {
        (Expr::Num(x), Expr::Num(y)) => x.total_cmp(y),
        (Expr::Sym(x), Expr::Sym(y)) => x.cmp(y),
        (Expr::Pow(b1, e1), Expr::Pow(b2, e2)) => {
            canonical_cmp(b1, b2).then_with(|| canonical_cmp(e1, e2))
        }
        (Expr::Add(x), Expr::Add(y)) | (Expr::Mul(x), Expr::Mul(y)) => cmp_slices(x, y),
        (Expr::Call(f1, a1), Expr::Call(f2, a2)) => f1.cmp(f2).then_with(|| canonical_cmp(a1, a2)),
        (
            Expr::Select {
                test: t1,
                positive: p1,
                otherwise: o1,
            },
            Expr::Select {
                test: t2,
                positive: p2,
                otherwise: o2,
            },
        ) => canonical_cmp(t1, t2)
            .then_with(|| canonical_cmp(p1, p2))
            .then_with(|| canonical_cmp(o1, o2)),
        _ => Ordering::Equal,
    }
}

fn cmp_slices(a: &[Expr], b: &[Expr]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match canonical_cmp(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Euclidean norm of a vector of expressions.
pub fn norm2(items: &[Expr]) -> Expr {
    Expr::sum(items.iter().map(|e| e.clone().powi(2))).sqrt()
}

/// Free symbols of a list of expressions (union).
pub fn free_symbols_all(items: &[Expr]) -> BTreeSet<Symbol> {
    let mut out = BTreeSet::new();
    for e in items {
        e.collect_symbols(&mut out);
    }
    out
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::sum([self, rhs])
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::sum([self, -rhs])
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::product([self, rhs])
    }
}

impl Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::product([self, Expr::power(rhs, Expr::Num(-1.0))])
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::product([Expr::Num(-1.0), self])
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Num(v)
    }
}

impl From<&Symbol> for Expr {
    fn from(s: &Symbol) -> Self {
        Expr::Sym(s.clone())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(v) => write!(f, "{}", v),
            Expr::Sym(s) => write!(f, "{}", s),
            Expr::Add(items) => {
                for (i, e) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" + ")?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
            Expr::Mul(items) => {
                for (i, e) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str("*")?;
                    }
                    write_operand(f, e)?;
                }
                Ok(())
            }
            Expr::Pow(b, e) => {
                write_operand(f, b)?;
                f.write_str("^")?;
                write_operand(f, e)
            }
            Expr::Call(func, a) => write!(f, "{}({})", func.name(), a),
            Expr::Select {
                test,
                positive,
                otherwise,
            } => write!(f, "select({}, {}, {})", test, positive, otherwise),
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    match e {
        Expr::Add(_) | Expr::Mul(_) | Expr::Pow(..) => write!(f, "({})", e),
        Expr::Num(v) if *v < 0.0 => write!(f, "({})", v),
        _ => write!(f, "{}", e),
    }
}
