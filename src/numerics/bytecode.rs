//! Stack bytecode for compiled expressions.

use crate::error::{PhsError, Result};
use crate::symbolic::{Expr, Func, Symbol};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Instr {
    Const(f64),
    /// Push the k-th argument of the evaluator's ordered argument list.
    Load(usize),
    Neg,
    Add,
    Mul,
    Div,
    Pow,
    Powi(i32),
    Call(Func),
    /// Jump to absolute instruction index if condition (popped) is <= 0.
    Jz(usize),
    /// Unconditional jump to absolute instruction index.
    Jmp(usize),
}

/// A compiled scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    code: Vec<Instr>,
}

impl Program {
    /// Compile `expr`; `slot` maps each free symbol to its argument index.
    pub fn compile(expr: &Expr, slot: &dyn Fn(&Symbol) -> Option<usize>) -> Result<Self> {
        let mut code = Vec::new();
        emit(expr, expr, slot, &mut code)?;
        Ok(Self { code })
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Evaluate with `vars` laid out in argument order.
    pub fn eval(&self, vars: &[f64]) -> f64 {
        let mut stack: Vec<f64> = Vec::with_capacity(16);
        let mut ip = 0usize;
        while ip < self.code.len() {
            match self.code[ip] {
                Instr::Const(v) => stack.push(v),
                Instr::Load(i) => stack.push(vars.get(i).copied().unwrap_or(f64::NAN)),
                Instr::Neg => {
                    let a = pop(&mut stack);
                    stack.push(-a);
                }
                Instr::Add => bin2(&mut stack, |a, b| a + b),
                Instr::Mul => bin2(&mut stack, |a, b| a * b),
                Instr::Div => bin2(&mut stack, |a, b| a / b),
                Instr::Pow => bin2(&mut stack, f64::powf),
                Instr::Powi(n) => {
                    let a = pop(&mut stack);
                    stack.push(a.powi(n));
                }
                Instr::Call(f) => {
                    let a = pop(&mut stack);
                    stack.push(f.apply(a));
                }
                Instr::Jz(target) => {
                    if pop(&mut stack) <= 0.0 {
                        ip = target;
                        continue;
                    }
                }
                Instr::Jmp(target) => {
                    ip = target;
                    continue;
                }
            }
            ip += 1;
        }
        pop(&mut stack)
    }
}

fn emit(root: &Expr, e: &Expr, slot: &dyn Fn(&Symbol) -> Option<usize>, out: &mut Vec<Instr>) -> Result<()> {
    match e {
        Expr::Num(v) => out.push(Instr::Const(*v)),
        Expr::Sym(s) => {
            let k = slot(s).ok_or_else(|| PhsError::unresolved(s.name(), root.to_string()))?;
            out.push(Instr::Load(k));
        }
        Expr::Add(items) => match items.split_first() {
            Some((first, rest)) => {
                emit(root, first, slot, out)?;
                for item in rest {
                    emit(root, item, slot, out)?;
                    out.push(Instr::Add);
                }
            }
            None => out.push(Instr::Const(0.0)),
        },
        Expr::Mul(items) => {
            // Factors with a negative integer exponent become divisions
            let (den, mut num): (Vec<&Expr>, Vec<&Expr>) = items.iter().partition(|f| reciprocal_exponent(f).is_some());
            let negate = num.len() > 1 && num[0].as_num() == Some(-1.0);
            if negate {
                num.remove(0);
            }
            match num.split_first() {
                Some((first, rest)) => {
                    emit(root, first, slot, out)?;
                    for f in rest {
                        emit(root, f, slot, out)?;
                        out.push(Instr::Mul);
                    }
                }
                None => out.push(Instr::Const(1.0)),
            }
            for f in den {
                if let (Expr::Pow(base, _), Some(n)) = (f, reciprocal_exponent(f)) {
                    emit(root, base, slot, out)?;
                    if n != 1 {
                        out.push(Instr::Powi(n));
                    }
                    out.push(Instr::Div);
                }
            }
            if negate {
                out.push(Instr::Neg);
            }
        }
        Expr::Pow(base, exp) => {
            emit(root, base, slot, out)?;
            match exp.as_num() {
                Some(n) if n.fract() == 0.0 && n.abs() <= i32::MAX as f64 => out.push(Instr::Powi(n as i32)),
                _ => {
                    emit(root, exp, slot, out)?;
                    out.push(Instr::Pow);
                }
            }
        }
        Expr::Call(f, arg) => {
            emit(root, arg, slot, out)?;
            out.push(Instr::Call(*f));
        }
        Expr::Select {
            test,
            positive,
            otherwise,
        } => {
            emit(root, test, slot, out)?;
            let jz_pos = out.len();
            out.push(Instr::Jz(0));
            emit(root, positive, slot, out)?;
            let jmp_pos = out.len();
            out.push(Instr::Jmp(0));
            let else_start = out.len();
            emit(root, otherwise, slot, out)?;
            let end = out.len();
            out[jz_pos] = Instr::Jz(else_start);
            out[jmp_pos] = Instr::Jmp(end);
        }
    }
    Ok(())
}

/// `n` when `e` is `base^(-n)` for a positive integer `n`.
fn reciprocal_exponent(e: &Expr) -> Option<i32> {
    match e {
        Expr::Pow(_, exp) => exp
            .as_num()
            .filter(|n| *n < 0.0 && n.fract() == 0.0 && *n >= -(i32::MAX as f64))
            .map(|n| -n as i32),
        _ => None,
    }
}

fn pop(stack: &mut Vec<f64>) -> f64 {
    stack.pop().unwrap_or(f64::NAN)
}

fn bin2(stack: &mut Vec<f64>, f: impl FnOnce(f64, f64) -> f64) {
    let b = pop(stack);
    let a = pop(stack);
    stack.push(f(a, b));
}
